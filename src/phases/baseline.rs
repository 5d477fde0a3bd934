//! Phase 3: Local Baseline
//!
//! This is the third phase of the compose pipeline. Its main responsibility is
//! to seed the merge plan with the entries of the working directory, which take
//! precedence over package files unless a strategy says otherwise.
//!
//! ## Process
//!
//! 1.  **Walk**: The working directory is walked in file name order.
//!
//! 2.  **Exclusions**: Manifest files, the reserved `.plasma` directory and
//!     the packages/output directories (when inside the working tree) are
//!     skipped.
//!
//! 3.  **Versioned Filter**: With `skip_unversioned`, only paths tracked in
//!     `HEAD` are kept, plus everything under `.git`. A directory counts as
//!     tracked when any file below it is. If the tracked set cannot be read,
//!     the filter is turned off with a warning.
//!
//! Baseline entries keep their path: `src_path == dst_path`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use walkdir::WalkDir;

use super::{relative_path, walk_error, FsEntry, MergePlan, Origin};
use crate::defaults::RESERVED_DIR;
use crate::error::Result;
use crate::git::GitOperations;
use crate::manifest::MANIFEST_FILE;

const GIT_DIR: &str = ".git";

/// Inputs of the baseline walk.
pub struct BaselineOptions<'a> {
    pub working_dir: &'a Path,
    /// Directories never collected, typically the packages and output dirs.
    pub excluded_dirs: Vec<PathBuf>,
    pub skip_unversioned: bool,
}

/// Execute Phase 3: collect the working directory into a new plan.
pub fn execute(options: &BaselineOptions<'_>, git: &dyn GitOperations) -> Result<MergePlan> {
    let root = options.working_dir;
    let excluded: Vec<PathBuf> = options
        .excluded_dirs
        .iter()
        .filter_map(|dir| relative_path(root, dir).ok())
        .filter(|rel| !rel.as_os_str().is_empty())
        .collect();

    let versioned = if options.skip_unversioned {
        tracked_paths(root, git)
    } else {
        None
    };

    let mut plan = MergePlan::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_excluded(root, e, &excluded));

    for entry in walker {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        let fs_entry = FsEntry::from_walk(root, &entry, Origin::Local)?;

        if let Some(versioned) = &versioned {
            if !is_git_path(&fs_entry.src_path) && !versioned.contains(&fs_entry.src_path) {
                continue;
            }
        }

        plan.insert(fs_entry);
    }

    debug!("collected {} local entries", plan.len());
    Ok(plan)
}

fn is_excluded(root: &Path, entry: &walkdir::DirEntry, excluded: &[PathBuf]) -> bool {
    let name = entry.file_name();
    if entry.depth() == 1 && name == RESERVED_DIR {
        return true;
    }
    if !entry.file_type().is_dir() && name == MANIFEST_FILE {
        return true;
    }
    entry.file_type().is_dir()
        && relative_path(root, entry.path()).is_ok_and(|rel| excluded.contains(&rel))
}

fn is_git_path(path: &Path) -> bool {
    path.starts_with(GIT_DIR)
}

/// Tracked files and all their ancestor directories.
fn tracked_paths(root: &Path, git: &dyn GitOperations) -> Option<HashSet<PathBuf>> {
    let files = match git.tracked_files(root) {
        Ok(files) => files,
        Err(e) => {
            let location = root.display().to_string();
            warn!(
                "can't read versioned files of {}, including all files: {}",
                location,
                e.into_error(&location)
            );
            return None;
        }
    };

    let mut paths = HashSet::new();
    for file in files {
        let file = PathBuf::from(file);
        paths.extend(
            file.ancestors()
                .skip(1)
                .filter(|dir| !dir.as_os_str().is_empty())
                .map(Path::to_path_buf),
        );
        paths.insert(file);
    }
    Some(paths)
}
