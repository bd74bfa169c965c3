//! picsort - file photos into a date-based library tree
//!
//! This library provides:
//! - Capture time resolution from EXIF, folder names and a sentinel bucket
//! - `<root>/<year>/<MM>/<day>` destination planning
//! - SHA-256 content fingerprints for duplicate detection
//! - A placement engine that moves, deduplicates or keeps variants
//! - A sequential driver with dry-run support and JSON run reports

pub mod cli;
pub mod config;
pub mod error;
pub mod hash;
pub mod placement;
pub mod plan;
pub mod process;
pub mod time;

pub use cli::Cli;
pub use config::{BadDatePolicy, Config, ConfigError, VariantNaming};
pub use error::{Error, Result};
pub use hash::{Fingerprint, fingerprint};
pub use placement::{Placement, PlacementEngine, PlacementOutcome};
pub use plan::{DestinationPlan, PathPlanner};
pub use process::{DecisionSink, FileResult, ProcessingStats, Processor, RunReport};
pub use time::{DateResolver, ResolvedTime, TimeSource};
