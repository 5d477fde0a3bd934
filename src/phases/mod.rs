//! Implementation of the 5 phases of the compose operation.
//!
//! ## Overview
//!
//! The compose operation follows 5 phases:
//! 1. Dependency Resolution - Walk nested manifests and fetch every package
//! 2. Determining Merge Order - Deterministic topological order of packages
//! 3. Local Baseline - Collect the entries of the working directory
//! 4. Package Merging - Merge every package into the plan, applying strategies
//! 5. Writing to Disk - Materialize the winning entries in the output directory
//!
//! Phases 3 to 5 work on a [`MergePlan`]: an ordered list of [`FsEntry`]
//! values with exactly one entry per destination path.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::manifest::Package;

// Phase modules
pub mod baseline;
pub mod merge;
pub mod orchestrator;
pub mod ordering;
pub mod resolve;
pub mod write;

pub use baseline as phase3;
pub use merge as phase4;
pub use ordering as phase2;
pub use resolve as phase1;
pub use write as phase5;

/// Output of dependency resolution.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Every discovered package, children before their parents.
    pub packages: Vec<Package>,
    /// Credentials entered during the run that the store does not know yet.
    pub captured: Vec<Credentials>,
}

/// The kind of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File,
    Symlink,
}

/// Where an entry comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// The working directory.
    Local,
    /// A package, by name.
    Package(String),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Local => write!(f, "local"),
            Origin::Package(name) => write!(f, "{}", name),
        }
    }
}

/// A single entry of the merged tree.
#[derive(Debug, Clone)]
pub struct FsEntry {
    /// Root directory the source path is relative to.
    pub prefix: PathBuf,
    /// Path inside `prefix`.
    pub src_path: PathBuf,
    /// Path inside the output directory.
    pub dst_path: PathBuf,
    pub kind: EntryKind,
    pub permissions: fs::Permissions,
    pub origin: Origin,
}

impl FsEntry {
    /// Builds an entry for a walked path, with `dst_path` equal to the
    /// source path.
    pub(crate) fn from_walk(root: &Path, entry: &walkdir::DirEntry, origin: Origin) -> Result<Self> {
        let path = relative_path(root, entry.path())?;
        let metadata = entry.metadata().map_err(|e| Error::Filesystem {
            message: format!("Failed to read metadata of '{}': {}", entry.path().display(), e),
        })?;

        let file_type = entry.file_type();
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        };

        Ok(Self {
            prefix: root.to_path_buf(),
            src_path: path.clone(),
            dst_path: path,
            kind,
            permissions: metadata.permissions(),
            origin,
        })
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    /// Absolute location of the source.
    pub fn source(&self) -> PathBuf {
        self.prefix.join(&self.src_path)
    }
}

/// Which side won a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// The entry already in the plan was kept.
    Local,
    /// A package strategy replaced the existing entry.
    Package,
}

/// A destination path written by more than one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRecord {
    pub path: String,
    /// The package whose entry collided.
    pub package: String,
    /// Origin of the entry that ended up in the plan.
    pub selected: Origin,
    pub resolution: ConflictResolution,
}

impl fmt::Display for ConflictRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] - {} > Selected from {}",
            self.package, self.path, self.selected
        )
    }
}

/// Ordered entries keyed by destination path.
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    entries: Vec<FsEntry>,
    index: HashMap<PathBuf, usize>,
    conflicts: Vec<ConflictRecord>,
}

impl MergePlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries in the order they will be written.
    pub fn entries(&self) -> &[FsEntry] {
        &self.entries
    }

    pub fn conflicts(&self) -> &[ConflictRecord] {
        &self.conflicts
    }

    pub fn into_conflicts(self) -> Vec<ConflictRecord> {
        self.conflicts
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get<P: AsRef<Path>>(&self, dst_path: P) -> Option<&FsEntry> {
        self.index.get(dst_path.as_ref()).map(|&i| &self.entries[i])
    }

    pub fn contains<P: AsRef<Path>>(&self, dst_path: P) -> bool {
        self.index.contains_key(dst_path.as_ref())
    }

    /// Adds `entry` unless its destination is taken. Returns whether it was
    /// added.
    pub fn insert(&mut self, entry: FsEntry) -> bool {
        if self.index.contains_key(&entry.dst_path) {
            return false;
        }
        self.index.insert(entry.dst_path.clone(), self.entries.len());
        self.entries.push(entry);
        true
    }

    /// Replaces the entry at the same destination in place, or adds it.
    /// Returns whether an existing entry was replaced.
    pub fn replace(&mut self, entry: FsEntry) -> bool {
        match self.index.get(&entry.dst_path) {
            Some(&i) => {
                self.entries[i] = entry;
                true
            }
            None => {
                self.insert(entry);
                false
            }
        }
    }

    /// Keeps only the entries matching `keep`.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&FsEntry) -> bool,
    {
        self.entries.retain(|e| keep(e));
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.dst_path.clone(), i))
            .collect();
    }

    pub fn record_conflict(&mut self, record: ConflictRecord) {
        self.conflicts.push(record);
    }
}

/// `path` relative to `root`. Names are kept byte for byte.
pub(crate) fn relative_path(root: &Path, path: &Path) -> Result<PathBuf> {
    let relative = path.strip_prefix(root).map_err(|_| Error::Filesystem {
        message: format!("Failed to make path relative: {}", path.display()),
    })?;

    Ok(relative.components().collect())
}

/// `/`-separated rendering of a relative path, for strategy matching and
/// conflict reports. Names that are not valid UTF-8 are rendered lossily.
pub fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub(crate) fn walk_error(root: &Path, e: walkdir::Error) -> Error {
    Error::Filesystem {
        message: format!("Failed to walk '{}': {}", root.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(dst: &str, origin: Origin) -> FsEntry {
        FsEntry {
            prefix: PathBuf::from("/src"),
            src_path: PathBuf::from(dst),
            dst_path: PathBuf::from(dst),
            kind: EntryKind::File,
            permissions: fs::metadata(".").unwrap().permissions(),
            origin,
        }
    }

    #[test]
    fn test_first_insert_wins() {
        let mut plan = MergePlan::new();
        assert!(plan.insert(entry("a.yaml", Origin::Local)));
        assert!(!plan.insert(entry("a.yaml", Origin::Package("core".into()))));
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.get("a.yaml").unwrap().origin, Origin::Local);
    }

    #[test]
    fn test_replace_keeps_position() {
        let mut plan = MergePlan::new();
        plan.insert(entry("a", Origin::Local));
        plan.insert(entry("b", Origin::Local));

        assert!(plan.replace(entry("a", Origin::Package("core".into()))));
        assert!(!plan.replace(entry("c", Origin::Package("core".into()))));

        let order: Vec<_> = plan.entries().iter().map(|e| e.dst_path.to_str().unwrap()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(plan.get("a").unwrap().origin, Origin::Package("core".into()));
    }

    #[test]
    fn test_retain_rebuilds_index() {
        let mut plan = MergePlan::new();
        plan.insert(entry("a", Origin::Local));
        plan.insert(entry("b", Origin::Local));
        plan.retain(|e| e.dst_path != Path::new("a"));

        assert!(!plan.contains("a"));
        assert_eq!(plan.get("b").unwrap().dst_path, Path::new("b"));
        assert!(plan.insert(entry("a", Origin::Local)));
    }

    #[test]
    fn test_conflict_display() {
        let record = ConflictRecord {
            path: "cfg/a.yaml".to_string(),
            package: "core".to_string(),
            selected: Origin::Local,
            resolution: ConflictResolution::Local,
        };
        assert_eq!(record.to_string(), "[core] - cfg/a.yaml > Selected from local");
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(Path::new("/root"), Path::new("/root/a/b.txt")).unwrap(),
            Path::new("a/b.txt")
        );
        assert!(relative_path(Path::new("/root"), Path::new("/other")).is_err());
    }

    #[test]
    fn test_slash_path() {
        assert_eq!(slash_path(&Path::new("a").join("b").join("c.txt")), "a/b/c.txt");
        assert_eq!(slash_path(Path::new("")), "");
    }

    #[cfg(unix)]
    #[test]
    fn test_plan_keys_keep_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let root = Path::new("/root");
        let name = Path::new("cfg").join(OsStr::from_bytes(b"caf\xe9.yaml"));
        let relative = relative_path(root, &root.join(&name)).unwrap();
        assert_eq!(relative, name);

        assert_eq!(slash_path(&relative), "cfg/caf\u{fffd}.yaml");

        let mut plan = MergePlan::new();
        let mut exact = entry("cfg/a.yaml", Origin::Local);
        exact.src_path = relative.clone();
        exact.dst_path = relative.clone();

        assert!(plan.insert(entry("cfg/caf\u{fffd}.yaml", Origin::Local)));
        assert!(plan.insert(exact));
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.get(&relative).unwrap().dst_path, relative);
    }
}
