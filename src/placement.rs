//! Placement engine: decides and performs the move/copy/remove for one photo
//!
//! Deciding is a pure function of what the destination looks like, reached
//! through the [`Inspector`] trait. Executing the decision is a separate step,
//! so the console line can be printed before anything on disk changes and so
//! a dry run can reuse the exact same decision logic.
//!
//! Equality is decided by content only: identical bytes are always treated as
//! a duplicate, and a same-named file with different bytes is never
//! overwritten.

use crate::config::VariantNaming;
use crate::error::{Error, Result};
use crate::hash::{Fingerprint, fingerprint};
use crate::plan::{DestinationPlan, MAX_VARIANT};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, trace, warn};

/// What happened (or would happen) to a candidate file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlacementOutcome {
    /// Identical content already in the library; the source is deleted
    RemovedAsDuplicate,
    /// Destination was free; the source is moved there
    MovedNew,
    /// Name taken by different content; the source is copied under a variant name
    CopiedAsVariant,
}

impl fmt::Display for PlacementOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlacementOutcome::RemovedAsDuplicate => "duplicate removed",
            PlacementOutcome::MovedNew => "moved",
            PlacementOutcome::CopiedAsVariant => "copied as variant",
        })
    }
}

/// A decision together with the path it concerns.
///
/// For `RemovedAsDuplicate` the destination is the retained copy of record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub outcome: PlacementOutcome,
    pub destination: PathBuf,
}

impl Placement {
    fn new(outcome: PlacementOutcome, destination: PathBuf) -> Self {
        Self {
            outcome,
            destination,
        }
    }
}

/// Read-only view of the destination side of the filesystem
pub trait Inspector {
    fn exists(&self, path: &Path) -> bool;

    fn fingerprint(&self, path: &Path) -> Result<Fingerprint>;
}

/// Inspector backed by the real filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsInspector;

impl Inspector for FsInspector {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn fingerprint(&self, path: &Path) -> Result<Fingerprint> {
        fingerprint(path)
    }
}

/// Real filesystem plus the files a dry run pretends to have written
struct Staged<'a> {
    fs: FsInspector,
    staged: &'a HashMap<PathBuf, Fingerprint>,
}

impl Inspector for Staged<'_> {
    fn exists(&self, path: &Path) -> bool {
        self.staged.contains_key(path) || self.fs.exists(path)
    }

    fn fingerprint(&self, path: &Path) -> Result<Fingerprint> {
        match self.staged.get(path) {
            Some(fp) => Ok(*fp),
            None => self.fs.fingerprint(path),
        }
    }
}

/// Decide where `source` goes given its plan.
///
/// Free destination: move. Occupied by identical content: duplicate.
/// Occupied by different content: the first free variant name, unless one
/// of the variants already holds the same bytes.
pub fn decide(
    source: &Path,
    plan: &DestinationPlan,
    naming: VariantNaming,
    inspector: &dyn Inspector,
) -> Result<Placement> {
    let target = plan.path();
    if !inspector.exists(&target) {
        trace!(?source, ?target, "Destination absent");
        return Ok(Placement::new(PlacementOutcome::MovedNew, target));
    }

    let source_fp = inspector.fingerprint(source)?;
    if inspector.fingerprint(&target)? == source_fp {
        trace!(?source, ?target, "Destination holds identical content");
        return Ok(Placement::new(PlacementOutcome::RemovedAsDuplicate, target));
    }

    for n in 1..=MAX_VARIANT {
        let variant = plan.variant_path(n, naming);
        if !inspector.exists(&variant) {
            trace!(?source, ?variant, "Name collision, using variant");
            return Ok(Placement::new(PlacementOutcome::CopiedAsVariant, variant));
        }
        if inspector.fingerprint(&variant)? == source_fp {
            trace!(?source, ?variant, "Variant holds identical content");
            return Ok(Placement::new(PlacementOutcome::RemovedAsDuplicate, variant));
        }
    }

    Err(Error::VariantsExhausted { path: target })
}

/// Filesystem calls a move is built from
#[derive(Debug, Clone, Copy)]
struct MoveOps {
    rename: fn(&Path, &Path) -> io::Result<()>,
    remove: fn(&Path) -> io::Result<()>,
}

impl Default for MoveOps {
    fn default() -> Self {
        Self {
            rename: |from, to| fs::rename(from, to),
            remove: |path| fs::remove_file(path),
        }
    }
}

/// Applies placement decisions to the filesystem, or simulates them in a dry run
#[derive(Debug)]
pub struct PlacementEngine {
    naming: VariantNaming,
    dry_run: bool,
    preserve_mtime: bool,
    staged: HashMap<PathBuf, Fingerprint>,
    ops: MoveOps,
}

impl PlacementEngine {
    pub fn new(naming: VariantNaming, dry_run: bool) -> Self {
        Self {
            naming,
            dry_run,
            preserve_mtime: true,
            staged: HashMap::new(),
            ops: MoveOps::default(),
        }
    }

    pub fn preserve_mtime(mut self, enabled: bool) -> Self {
        self.preserve_mtime = enabled;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Decide without touching the filesystem
    pub fn decide(&self, source: &Path, plan: &DestinationPlan) -> Result<Placement> {
        if self.dry_run {
            let staged = Staged {
                fs: FsInspector,
                staged: &self.staged,
            };
            decide(source, plan, self.naming, &staged)
        } else {
            decide(source, plan, self.naming, &FsInspector)
        }
    }

    /// Carry out a decision made by [`PlacementEngine::decide`]
    pub fn execute(&mut self, source: &Path, placement: &Placement) -> Result<()> {
        let dest = &placement.destination;

        if self.dry_run {
            if placement.outcome != PlacementOutcome::RemovedAsDuplicate {
                self.staged.insert(dest.clone(), fingerprint(source)?);
            }
            debug!(?source, ?dest, outcome = ?placement.outcome, "Dry run, nothing changed");
            return Ok(());
        }

        match placement.outcome {
            PlacementOutcome::RemovedAsDuplicate => {
                ensure_distinct(source, dest)?;
                fs::remove_file(source).map_err(|e| Error::mutation("remove", source, e))?;
            }
            PlacementOutcome::MovedNew => {
                create_parent(dest)?;
                self.move_file(source, dest)?;
            }
            PlacementOutcome::CopiedAsVariant => {
                create_parent(dest)?;
                self.copy_verified(source, dest)?;
            }
        }

        debug!(?source, ?dest, outcome = ?placement.outcome, "Placement applied");
        Ok(())
    }

    /// Decide and execute in one step
    pub fn place(&mut self, source: &Path, plan: &DestinationPlan) -> Result<Placement> {
        let placement = self.decide(source, plan)?;
        self.execute(source, &placement)?;
        Ok(placement)
    }

    /// Rename, or copy then delete when the library is on another filesystem.
    ///
    /// Either way the file ends up in exactly one of the two places.
    fn move_file(&self, source: &Path, dest: &Path) -> Result<()> {
        match (self.ops.rename)(source, dest) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == ErrorKind::CrossesDevices => {
                debug!(?source, ?dest, error = %e, "Cross-device move, copying instead");
            }
            Err(e) => return Err(Error::mutation("move", source, e)),
        }

        self.copy_verified(source, dest)?;
        if let Err(e) = (self.ops.remove)(source) {
            if let Err(undo) = fs::remove_file(dest) {
                warn!(?dest, error = %undo, "Could not remove copy after failed move");
            }
            return Err(Error::mutation("remove", source, e));
        }
        Ok(())
    }

    /// Copy into a temp file beside `dest`, check its digest, then rename into place.
    ///
    /// `dest` is never overwritten and never holds a partial file.
    fn copy_verified(&self, source: &Path, dest: &Path) -> Result<()> {
        let dir = dest.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp =
            NamedTempFile::new_in(dir).map_err(|e| Error::mutation("create temp file in", dir, e))?;

        copy_into(source, tmp.as_file_mut()).map_err(|e| Error::mutation("copy", source, e))?;

        if fingerprint(tmp.path())? != fingerprint(source)? {
            return Err(Error::VerifyFailed {
                path: dest.to_path_buf(),
            });
        }

        tmp.persist_noclobber(dest)
            .map_err(|e| Error::mutation("write", dest, e.error))?;

        if self.preserve_mtime {
            let mtime = fs::metadata(source).and_then(|m| m.modified());
            if let Err(e) = mtime.and_then(|t| {
                filetime::set_file_mtime(dest, filetime::FileTime::from_system_time(t))
            }) {
                warn!(?dest, error = %e, "Failed to preserve modification time");
            }
        }

        Ok(())
    }
}

fn create_parent(dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| Error::mutation("create directory", parent, e))?;
    }
    Ok(())
}

/// Refuse to delete a source that is itself the retained copy
fn ensure_distinct(source: &Path, retained: &Path) -> Result<()> {
    if let (Ok(a), Ok(b)) = (source.canonicalize(), retained.canonicalize())
        && a == b
    {
        return Err(Error::RetainedCopy {
            path: source.to_path_buf(),
        });
    }
    Ok(())
}

/// Buffered copy of `source` into an open file
fn copy_into(source: &Path, dest: &mut File) -> std::io::Result<()> {
    let mut reader = BufReader::with_capacity(256 * 1024, File::open(source)?);
    let mut writer = BufWriter::with_capacity(256 * 1024, &mut *dest);
    std::io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    drop(writer);
    dest.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PathPlanner;
    use chrono::NaiveDate;
    use std::collections::HashSet;
    use std::ffi::OsStr;
    use tempfile::TempDir;

    /// In-memory destination tree keyed by path
    #[derive(Default)]
    struct MemTree {
        files: HashMap<PathBuf, Fingerprint>,
    }

    impl MemTree {
        fn with(mut self, path: &str, content: &[u8]) -> Self {
            self.files.insert(PathBuf::from(path), Fingerprint::of_bytes(content));
            self
        }
    }

    impl Inspector for MemTree {
        fn exists(&self, path: &Path) -> bool {
            self.files.contains_key(path)
        }

        fn fingerprint(&self, path: &Path) -> Result<Fingerprint> {
            self.files.get(path).copied().ok_or_else(|| Error::HashComputation {
                path: path.to_path_buf(),
                message: "not in tree".into(),
            })
        }
    }

    fn plan_for(name: &str) -> DestinationPlan {
        let ts = NaiveDate::from_ymd_opt(2020, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        PathPlanner::new("/lib").plan(&ts, None, OsStr::new(name))
    }

    #[test]
    fn test_absent_destination_moves() {
        let tree = MemTree::default().with("/src/b.jpg", b"b");
        let p = decide(Path::new("/src/b.jpg"), &plan_for("b.jpg"), VariantNaming::Legacy, &tree)
            .unwrap();
        assert_eq!(p.outcome, PlacementOutcome::MovedNew);
        assert_eq!(p.destination, PathBuf::from("/lib/2020/01/2/b.jpg"));
    }

    #[test]
    fn test_identical_destination_is_duplicate() {
        let tree = MemTree::default()
            .with("/src/b.jpg", b"same")
            .with("/lib/2020/01/2/b.jpg", b"same");
        let p = decide(Path::new("/src/b.jpg"), &plan_for("b.jpg"), VariantNaming::Legacy, &tree)
            .unwrap();
        assert_eq!(p.outcome, PlacementOutcome::RemovedAsDuplicate);
        assert_eq!(p.destination, PathBuf::from("/lib/2020/01/2/b.jpg"));
    }

    #[test]
    fn test_different_destination_gets_variant() {
        let tree = MemTree::default()
            .with("/src/b.jpg", b"new")
            .with("/lib/2020/01/2/b.jpg", b"old");
        let p = decide(Path::new("/src/b.jpg"), &plan_for("b.jpg"), VariantNaming::Legacy, &tree)
            .unwrap();
        assert_eq!(p.outcome, PlacementOutcome::CopiedAsVariant);
        assert_eq!(p.destination, PathBuf::from("/lib/2020/01/2/b_01.jpgb"));
    }

    #[test]
    fn test_occupied_variant_advances_or_dedups() {
        let tree = MemTree::default()
            .with("/src/b.jpg", b"third")
            .with("/lib/2020/01/2/b.jpg", b"first")
            .with("/lib/2020/01/2/b_01.jpg", b"second");
        let p = decide(Path::new("/src/b.jpg"), &plan_for("b.jpg"), VariantNaming::Suffix, &tree)
            .unwrap();
        assert_eq!(p.outcome, PlacementOutcome::CopiedAsVariant);
        assert_eq!(p.destination, PathBuf::from("/lib/2020/01/2/b_02.jpg"));

        let tree = tree.with("/src/b.jpg", b"second");
        let p = decide(Path::new("/src/b.jpg"), &plan_for("b.jpg"), VariantNaming::Suffix, &tree)
            .unwrap();
        assert_eq!(p.outcome, PlacementOutcome::RemovedAsDuplicate);
        assert_eq!(p.destination, PathBuf::from("/lib/2020/01/2/b_01.jpg"));
    }

    #[test]
    fn test_variants_exhausted() {
        let mut tree = MemTree::default()
            .with("/src/b.jpg", b"x")
            .with("/lib/2020/01/2/b.jpg", b"0");
        let plan = plan_for("b.jpg");
        for n in 1..=MAX_VARIANT {
            tree.files.insert(
                plan.variant_path(n, VariantNaming::Suffix),
                Fingerprint::of_bytes(n.to_string().as_bytes()),
            );
        }
        let err = decide(Path::new("/src/b.jpg"), &plan, VariantNaming::Suffix, &tree).unwrap_err();
        assert!(matches!(err, Error::VariantsExhausted { .. }));
    }

    fn write(path: &Path, content: &[u8]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn files_under(root: &Path) -> HashSet<PathBuf> {
        walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .collect()
    }

    fn real_plan(lib: &Path, name: &str) -> DestinationPlan {
        let ts = NaiveDate::from_ymd_opt(2021, 7, 4)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        PathPlanner::new(lib).plan(&ts, None, OsStr::new(name))
    }

    #[test]
    fn test_execute_move_creates_directories() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("in/a.jpg");
        write(&src, b"alpha");
        let lib = dir.path().join("lib");

        let mut engine = PlacementEngine::new(VariantNaming::Legacy, false);
        let p = engine.place(&src, &real_plan(&lib, "a.jpg")).unwrap();

        assert_eq!(p.outcome, PlacementOutcome::MovedNew);
        assert_eq!(p.destination, lib.join("2021/07/4/a.jpg"));
        assert!(!src.exists());
        assert_eq!(fs::read(&p.destination).unwrap(), b"alpha");
    }

    #[test]
    fn test_execute_duplicate_leaves_destination() {
        let dir = TempDir::new().unwrap();
        let lib = dir.path().join("lib");
        let kept = lib.join("2021/07/4/a.jpg");
        write(&kept, b"alpha");
        let src = dir.path().join("in/a.jpg");
        write(&src, b"alpha");

        let mut engine = PlacementEngine::new(VariantNaming::Legacy, false);
        let p = engine.place(&src, &real_plan(&lib, "a.jpg")).unwrap();

        assert_eq!(p.outcome, PlacementOutcome::RemovedAsDuplicate);
        assert!(!src.exists());
        assert_eq!(fs::read(&kept).unwrap(), b"alpha");
    }

    #[test]
    fn test_execute_variant_copies_and_keeps_source() {
        let dir = TempDir::new().unwrap();
        let lib = dir.path().join("lib");
        let kept = lib.join("2021/07/4/a.jpg");
        write(&kept, b"original");
        let src = dir.path().join("in/a.jpg");
        write(&src, b"different");

        let mut engine = PlacementEngine::new(VariantNaming::Legacy, false);
        let p = engine.place(&src, &real_plan(&lib, "a.jpg")).unwrap();

        assert_eq!(p.outcome, PlacementOutcome::CopiedAsVariant);
        assert_eq!(p.destination, lib.join("2021/07/4/a_01.jpga"));
        assert_eq!(fs::read(&p.destination).unwrap(), b"different");
        assert_eq!(fs::read(&kept).unwrap(), b"original");
        assert!(src.exists());
        // No temp files left behind
        assert_eq!(files_under(&lib).len(), 2);
    }

    fn cross_device(_: &Path, _: &Path) -> io::Result<()> {
        Err(io::Error::from(ErrorKind::CrossesDevices))
    }

    fn engine_with(ops: MoveOps) -> PlacementEngine {
        PlacementEngine {
            ops,
            ..PlacementEngine::new(VariantNaming::Legacy, false)
        }
    }

    fn set_mtime(path: &Path, secs: i64) -> filetime::FileTime {
        let t = filetime::FileTime::from_unix_time(secs, 0);
        filetime::set_file_mtime(path, t).unwrap();
        t
    }

    fn mtime(path: &Path) -> filetime::FileTime {
        filetime::FileTime::from_last_modification_time(&fs::metadata(path).unwrap())
    }

    #[test]
    fn test_variant_keeps_source_mtime() {
        let dir = TempDir::new().unwrap();
        let lib = dir.path().join("lib");
        write(&lib.join("2021/07/4/a.jpg"), b"original");
        let src = dir.path().join("in/a.jpg");
        write(&src, b"different");
        let taken = set_mtime(&src, 1_500_000_000);

        let mut engine = PlacementEngine::new(VariantNaming::Legacy, false);
        let p = engine.place(&src, &real_plan(&lib, "a.jpg")).unwrap();

        assert_eq!(p.outcome, PlacementOutcome::CopiedAsVariant);
        assert_eq!(mtime(&p.destination), taken);
    }

    #[test]
    fn test_variant_mtime_not_kept_when_disabled() {
        let dir = TempDir::new().unwrap();
        let lib = dir.path().join("lib");
        write(&lib.join("2021/07/4/a.jpg"), b"original");
        let src = dir.path().join("in/a.jpg");
        write(&src, b"different");
        let taken = set_mtime(&src, 1_500_000_000);

        let mut engine = PlacementEngine::new(VariantNaming::Legacy, false).preserve_mtime(false);
        let p = engine.place(&src, &real_plan(&lib, "a.jpg")).unwrap();

        assert_ne!(mtime(&p.destination), taken);
    }

    #[test]
    fn test_cross_device_move_copies_then_removes_source() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("in/a.jpg");
        write(&src, b"alpha");
        let taken = set_mtime(&src, 1_400_000_000);
        let lib = dir.path().join("lib");

        let mut engine = engine_with(MoveOps {
            rename: cross_device,
            ..MoveOps::default()
        });
        let p = engine.place(&src, &real_plan(&lib, "a.jpg")).unwrap();

        assert_eq!(p.outcome, PlacementOutcome::MovedNew);
        assert!(!src.exists());
        assert_eq!(fs::read(&p.destination).unwrap(), b"alpha");
        assert_eq!(mtime(&p.destination), taken);
        assert_eq!(files_under(&lib).len(), 1);
    }

    #[test]
    fn test_failed_source_removal_undoes_the_copy() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("in/a.jpg");
        write(&src, b"alpha");
        let lib = dir.path().join("lib");

        let mut engine = engine_with(MoveOps {
            rename: cross_device,
            remove: |_| Err(io::Error::from(ErrorKind::PermissionDenied)),
        });
        let err = engine.place(&src, &real_plan(&lib, "a.jpg")).unwrap_err();

        assert!(matches!(err, Error::Mutation { op: "remove", .. }));
        assert!(err.to_string().contains("a.jpg"));
        assert_eq!(fs::read(&src).unwrap(), b"alpha");
        assert!(files_under(&lib).is_empty());
    }

    #[test]
    fn test_other_rename_errors_do_not_fall_back() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("in/a.jpg");
        write(&src, b"alpha");
        let lib = dir.path().join("lib");

        let mut engine = engine_with(MoveOps {
            rename: |_, _| Err(io::Error::from(ErrorKind::PermissionDenied)),
            ..MoveOps::default()
        });
        let err = engine.place(&src, &real_plan(&lib, "a.jpg")).unwrap_err();

        assert!(matches!(err, Error::Mutation { op: "move", .. }));
        assert!(src.exists());
        assert!(files_under(&lib).is_empty());
    }

    #[test]
    fn test_refuses_to_delete_the_retained_copy() {
        let dir = TempDir::new().unwrap();
        let kept = dir.path().join("lib/2021/07/4/a.jpg");
        write(&kept, b"alpha");

        let mut engine = PlacementEngine::new(VariantNaming::Legacy, false);
        let placement = Placement::new(PlacementOutcome::RemovedAsDuplicate, kept.clone());
        let err = engine.execute(&kept, &placement).unwrap_err();

        assert!(matches!(err, Error::RetainedCopy { .. }));
        assert!(kept.exists());
    }

    #[test]
    fn test_dry_run_changes_nothing_but_tracks_staged_files() {
        let dir = TempDir::new().unwrap();
        let lib = dir.path().join("lib");
        let first = dir.path().join("in/one/a.jpg");
        let second = dir.path().join("in/two/a.jpg");
        let third = dir.path().join("in/three/a.jpg");
        write(&first, b"alpha");
        write(&second, b"beta");
        write(&third, b"alpha");

        let mut engine = PlacementEngine::new(VariantNaming::Legacy, true);
        let plan = real_plan(&lib, "a.jpg");
        let outcomes: Vec<_> = [&first, &second, &third]
            .into_iter()
            .map(|src| engine.place(src, &plan).unwrap().outcome)
            .collect();

        assert_eq!(
            outcomes,
            vec![
                PlacementOutcome::MovedNew,
                PlacementOutcome::CopiedAsVariant,
                PlacementOutcome::RemovedAsDuplicate,
            ]
        );
        assert!(!lib.exists());
        assert!(first.exists() && second.exists() && third.exists());
    }
}
