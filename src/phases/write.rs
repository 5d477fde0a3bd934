//! Phase 5: Writing to Disk
//!
//! This is the final phase of the compose pipeline. Its main responsibility is
//! to materialize the merge plan in the output directory.
//!
//! ## Process
//!
//! 1.  **Iterate Entries**: Entries are written in plan order, so a directory
//!     is normally created before its content.
//!
//! 2.  **Directories**: Created recursively (idempotent) with the source
//!     permissions.
//!
//! 3.  **Symlinks**: Recreated pointing at the original target. A link whose
//!     source can no longer be read is skipped.
//!
//! 4.  **Files**: Copied byte for byte, then given the source permissions.
//!     Missing parent directories are created.
//!
//! Any error aborts the phase; files written so far are left in place.

use std::fs;
use std::io;
use std::path::Path;

use log::debug;

use super::{EntryKind, FsEntry, MergePlan};
use crate::error::{Error, Result};

/// Execute Phase 5: write every entry of `plan` below `output_path`.
pub fn execute(plan: &MergePlan, output_path: &Path) -> Result<()> {
    fs::create_dir_all(output_path).map_err(|e| Error::Filesystem {
        message: format!("Failed to create directory '{}': {}", output_path.display(), e),
    })?;

    for entry in plan.entries() {
        let destination = output_path.join(&entry.dst_path);
        match entry.kind {
            EntryKind::Dir => write_dir(entry, &destination)?,
            EntryKind::Symlink => write_symlink(entry, &destination)?,
            EntryKind::File => write_file(entry, &destination)?,
        }
    }

    Ok(())
}

fn write_dir(entry: &FsEntry, destination: &Path) -> Result<()> {
    fs::create_dir_all(destination).map_err(|e| Error::Filesystem {
        message: format!("Failed to create directory '{}': {}", destination.display(), e),
    })?;
    set_permissions(entry, destination)
}

fn write_file(entry: &FsEntry, destination: &Path) -> Result<()> {
    create_parent(destination)?;
    let source = entry.source();
    fs::copy(&source, destination).map_err(|e| Error::Filesystem {
        message: format!(
            "Failed to copy '{}' to '{}': {}",
            source.display(),
            destination.display(),
            e
        ),
    })?;
    set_permissions(entry, destination)
}

fn write_symlink(entry: &FsEntry, destination: &Path) -> Result<()> {
    let source = entry.source();
    let target = match fs::read_link(&source) {
        Ok(target) => target,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("skipping unreadable link {}", source.display());
            return Ok(());
        }
        Err(e) => {
            return Err(Error::Filesystem {
                message: format!("Failed to read link '{}': {}", source.display(), e),
            })
        }
    };

    create_parent(destination)?;
    symlink(&target, destination).map_err(|e| Error::Filesystem {
        message: format!("Failed to create link '{}': {}", destination.display(), e),
    })
}

#[cfg(unix)]
fn symlink(target: &Path, destination: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, destination)
}

#[cfg(windows)]
fn symlink(target: &Path, destination: &Path) -> io::Result<()> {
    let resolved = destination.parent().map(|p| p.join(target));
    if resolved.is_some_and(|p| p.is_dir()) {
        std::os::windows::fs::symlink_dir(target, destination)
    } else {
        std::os::windows::fs::symlink_file(target, destination)
    }
}

#[cfg(not(any(unix, windows)))]
fn symlink(_target: &Path, _destination: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symbolic links are not supported on this platform",
    ))
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::Filesystem {
            message: format!("Failed to create directory '{}': {}", parent.display(), e),
        })?;
    }
    Ok(())
}

fn set_permissions(entry: &FsEntry, destination: &Path) -> Result<()> {
    fs::set_permissions(destination, entry.permissions.clone()).map_err(|e| Error::Filesystem {
        message: format!(
            "Failed to set permissions on '{}': {}",
            destination.display(),
            e
        ),
    })
}
