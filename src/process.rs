//! Sequential run driver
//!
//! Handles the core loop of:
//! - Scanning the source tree for photos
//! - Resolving each photo's capture time
//! - Planning its library destination
//! - Deciding, announcing and applying the placement
//!
//! One file is finished completely before the next one starts, so an
//! interrupted run leaves every file either fully placed or untouched.

use crate::config::{BadDatePolicy, Config};
use crate::error::{Error, Result};
use crate::placement::{Placement, PlacementEngine, PlacementOutcome};
use crate::plan::PathPlanner;
use crate::time::{
    DateResolver, ExifReader, FilenameInferer, MetadataSource, ResolvedTime, parent_dir_name,
};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{Level, debug, info, span, warn};
use walkdir::WalkDir;

/// Result of processing a single file
#[derive(Debug, Clone, Serialize)]
pub struct FileResult {
    /// Source file path
    pub source: PathBuf,
    /// Destination, or the retained copy for duplicates
    pub destination: Option<PathBuf>,
    /// Resolved capture time
    pub time: Option<ResolvedTime>,
    /// Placement outcome; `None` when the file was skipped
    pub outcome: Option<PlacementOutcome>,
    /// Reason the file was skipped
    pub error: Option<String>,
}

impl FileResult {
    fn placed(source: &Path, time: ResolvedTime, placement: Placement) -> Self {
        Self {
            source: source.to_path_buf(),
            destination: Some(placement.destination),
            time: Some(time),
            outcome: Some(placement.outcome),
            error: None,
        }
    }

    fn skipped(source: &Path, error: &Error) -> Self {
        Self {
            source: source.to_path_buf(),
            destination: None,
            time: None,
            outcome: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.outcome.is_none()
    }
}

/// Processing statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingStats {
    pub total_files: usize,
    pub moved: usize,
    pub variants: usize,
    pub duplicates: usize,
    pub skipped: usize,
}

impl ProcessingStats {
    fn record(&mut self, result: &FileResult) {
        match result.outcome {
            Some(PlacementOutcome::MovedNew) => self.moved += 1,
            Some(PlacementOutcome::CopiedAsVariant) => self.variants += 1,
            Some(PlacementOutcome::RemovedAsDuplicate) => self.duplicates += 1,
            None => self.skipped += 1,
        }
    }

    pub fn processed(&self) -> usize {
        self.moved + self.variants + self.duplicates + self.skipped
    }

    pub fn summary(&self) -> String {
        format!(
            "Total: {}, Moved: {}, Variants: {}, Duplicates: {}, Skipped: {}",
            self.total_files, self.moved, self.variants, self.duplicates, self.skipped
        )
    }
}

/// Everything a run produced, in processing order
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    pub stats: ProcessingStats,
    pub results: Vec<FileResult>,
}

impl RunReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    fn push(&mut self, result: FileResult) {
        self.stats.record(&result);
        self.results.push(result);
    }

    /// Outcomes in processing order, skipped files as `None`
    pub fn outcomes(&self) -> Vec<Option<PlacementOutcome>> {
        self.results.iter().map(|r| r.outcome).collect()
    }

    /// Sources that are no longer at their original path
    pub fn relocated(&self) -> impl Iterator<Item = &Path> {
        self.results
            .iter()
            .filter(|r| {
                matches!(
                    r.outcome,
                    Some(PlacementOutcome::MovedNew | PlacementOutcome::RemovedAsDuplicate)
                )
            })
            .map(|r| r.source.as_path())
    }

    /// Write the report as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| Error::mutation("create report", path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|source| Error::Serialization {
            path: path.to_path_buf(),
            source,
        })?;
        writer
            .flush()
            .map_err(|e| Error::mutation("write report", path, e))
    }
}

/// Receives one notification per file, before anything on disk changes
pub trait DecisionSink {
    fn announce(&mut self, source: &Path, placement: &Placement, dry_run: bool);

    fn skipped(&mut self, source: &Path, error: &Error);
}

/// Main processor for filing photos into the library
pub struct Processor<M = ExifReader> {
    config: Config,
    resolver: DateResolver<M>,
    planner: PathPlanner,
    engine: PlacementEngine,
    target_abs: Option<PathBuf>,
}

impl Processor<ExifReader> {
    /// Create a processor that reads dates from EXIF
    pub fn new(config: Config) -> Self {
        Self::with_metadata(config, ExifReader)
    }
}

impl<M: MetadataSource> Processor<M> {
    /// Create a processor with a custom metadata source
    pub fn with_metadata(config: Config, metadata: M) -> Self {
        let resolver = DateResolver::new(metadata, FilenameInferer::default())
            .infer_from_file_name(config.infer_from_file_name);
        let planner = PathPlanner::new(&config.target_dir);
        let engine = PlacementEngine::new(config.variant_naming, config.dry_run)
            .preserve_mtime(config.preserve_mtime);
        let target_abs = config.target_dir.canonicalize().ok();

        Self {
            config,
            resolver,
            planner,
            engine,
            target_abs,
        }
    }

    /// Run over the whole source tree, appending to `report`.
    ///
    /// On a fatal error the report still holds every file finished so far.
    pub fn run(&mut self, sink: &mut dyn DecisionSink, report: &mut RunReport) -> Result<()> {
        let _span = span!(Level::INFO, "processor_run").entered();

        info!(source = %self.config.source_dir.display(), "Scanning source directory...");
        let files = self.collect_files()?;
        info!(count = files.len(), "Found photos");
        report.stats.total_files += files.len();

        for path in &files {
            let result = self.process_file(path, sink)?;
            report.push(result);
        }

        info!("{}", report.stats.summary());
        Ok(())
    }

    /// Resolve, plan and place a single file
    pub fn process_file(&mut self, path: &Path, sink: &mut dyn DecisionSink) -> Result<FileResult> {
        let _file_span = span!(Level::DEBUG, "process_file", ?path).entered();

        let time = match self.resolver.resolve(path) {
            Ok(time) => time,
            Err(e) if e.is_unresolvable_date() && self.config.on_bad_date == BadDatePolicy::Skip => {
                warn!(?path, error = %e, "Skipping file with unresolvable date");
                sink.skipped(path, &e);
                return Ok(FileResult::skipped(path, &e));
            }
            Err(e) => return Err(e),
        };

        let file_name = path
            .file_name()
            .ok_or_else(|| Error::Config(format!("Invalid source filename: {}", path.display())))?;
        let plan = self
            .planner
            .plan(&time.timestamp, parent_dir_name(path), file_name);
        debug!(?path, destination = ?plan.path(), source = ?time.source, "Planned destination");

        let placement = self.engine.decide(path, &plan)?;
        sink.announce(path, &placement, self.engine.is_dry_run());
        self.engine.execute(path, &placement)?;

        info!(
            source = ?path,
            destination = ?placement.destination,
            outcome = ?placement.outcome,
            timestamp = %time.timestamp,
            "Processed file"
        );
        Ok(FileResult::placed(path, time, placement))
    }

    /// Collect candidate photos below the source directory in a stable order
    pub fn collect_files(&self) -> Result<Vec<PathBuf>> {
        let source = &self.config.source_dir;
        if !source.is_dir() {
            return Err(Error::Config(format!(
                "Source directory does not exist: {}",
                source.display()
            )));
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(source)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !(e.file_type().is_dir() && self.is_excluded_dir(e.path())));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Unreadable entry, skipping");
                    continue;
                }
            };
            let path = entry.path();
            if entry.file_type().is_file()
                && let Some(ext) = path.extension().and_then(|e| e.to_str())
                && self.config.is_supported(ext)
            {
                files.push(path.to_path_buf());
            }
        }

        Ok(files)
    }

    /// The library itself and any configured exclusions are never scanned
    fn is_excluded_dir(&self, path: &Path) -> bool {
        if let Some(ref target) = self.target_abs
            && path.canonicalize().is_ok_and(|p| &p == target)
        {
            debug!(?path, "Skipping target library inside source tree");
            return true;
        }

        for exclude in &self.config.exclude_dirs {
            if exclude.is_absolute() {
                if path.starts_with(exclude) {
                    debug!(?path, ?exclude, "Excluding directory (absolute path match)");
                    return true;
                }
            } else if let Some(exclude_name) = exclude.file_name()
                && path.file_name() == Some(exclude_name)
            {
                debug!(?path, ?exclude, "Excluding directory (folder name match)");
                return true;
            }
        }

        false
    }
}
