//! Phase 4: Package Merging
//!
//! This is the fourth phase of the compose pipeline. Its main responsibility is
//! to merge the files of every package into the plan built from the local
//! baseline.
//!
//! ## Process
//!
//! 1.  **Local Strategies**: `remove-extra-local-files` prefixes from all
//!     packages drop matching baseline entries, whether or not a package
//!     provides a replacement.
//!
//! 2.  **Layout**: For each package in merge order, the layout is detected.
//!     Legacy packages get their layer directories moved under `src/`.
//!
//! 3.  **Walk**: The package is walked in file name order, skipping its `.git`
//!     directory. Destination paths are normalized (`roles` stripped,
//!     `group_vars` renamed).
//!
//! 4.  **Placement**: Without strategies the first writer of a path wins.
//!     Otherwise the package's strategies are evaluated in declaration order
//!     and the first one that applies decides.
//!
//! Collisions on files are recorded as `ConflictRecord`s.

use std::path::Path;

use log::{debug, info};
use walkdir::WalkDir;

use super::{slash_path, walk_error, ConflictRecord, ConflictResolution, FsEntry, MergePlan, Origin};
use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::fetch::package_path;
use crate::layout;
use crate::manifest::Package;
use crate::strategy::{MergeStrategy, PackageStrategies};

const GIT_DIR: &str = ".git";

/// Execute Phase 4: merge `packages`, already in merge order, into `plan`.
pub fn execute(
    mut plan: MergePlan,
    packages: &[Package],
    packages_dir: &Path,
    cancel: &CancellationToken,
) -> Result<MergePlan> {
    let strategies: Vec<PackageStrategies> = packages
        .iter()
        .map(|p| PackageStrategies::from_specs(p.name(), p.strategies()))
        .collect();

    let local: Vec<&MergeStrategy> = strategies.iter().flat_map(|s| s.local.iter()).collect();
    remove_local_entries(&mut plan, &local);

    for (package, strategies) in packages.iter().zip(&strategies) {
        cancel.check()?;
        merge_package(&mut plan, package, &package_path(packages_dir, package), &strategies.package)?;
        info!("  ✓ {}", package.identifier());
    }

    Ok(plan)
}

/// Drops local entries matched by a local strategy.
pub fn remove_local_entries(plan: &mut MergePlan, local: &[&MergeStrategy]) {
    if local.is_empty() {
        return;
    }
    plan.retain(|entry| {
        entry.origin != Origin::Local
            || !local
                .iter()
                .any(|s| matches!(s, MergeStrategy::RemoveExtra(paths) if paths.matches_prefix(&slash_path(&entry.dst_path))))
    });
}

/// Merges the package stored at `root` into `plan`.
pub fn merge_package(
    plan: &mut MergePlan,
    package: &Package,
    root: &Path,
    strategies: &[MergeStrategy],
) -> Result<()> {
    let modern = layout::has_modern_layout(root);
    if modern {
        debug!("package '{}' has modern layout with src/", package.name());
    } else {
        debug!("package '{}' has legacy layout, normalizing layers to src/", package.name());
    }

    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(e.depth() == 1 && e.file_name() == GIT_DIR));

    for entry in walker {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        let mut fs_entry = FsEntry::from_walk(root, &entry, Origin::Package(package.name().to_string()))?;
        fs_entry.dst_path = layout::destination_path(&fs_entry.src_path, modern);

        let path = fs_entry.dst_path.clone();
        let is_dir = fs_entry.is_dir();
        let resolution = place(plan, strategies, fs_entry);

        if let (Some(resolution), false) = (resolution, is_dir) {
            if let Some(selected) = plan.get(&path).map(|e| e.origin.clone()) {
                plan.record_conflict(ConflictRecord {
                    path: slash_path(&path),
                    package: package.name().to_string(),
                    selected,
                    resolution,
                });
            }
        }
    }

    Ok(())
}

/// Places one package entry. Returns how a collision was resolved, if there
/// was one.
fn place(plan: &mut MergePlan, strategies: &[MergeStrategy], entry: FsEntry) -> Option<ConflictResolution> {
    let path = slash_path(&entry.dst_path);
    let path = path.as_str();
    for strategy in strategies {
        match strategy {
            MergeStrategy::Overwrite(paths) if paths.matches_prefix(path) => {
                return plan.replace(entry).then_some(ConflictResolution::Package);
            }
            MergeStrategy::Filter(paths) => {
                let wanted = paths.matches_prefix(path) || (entry.is_dir() && paths.contains(path));
                if wanted && !plan.contains(&entry.dst_path) {
                    plan.insert(entry);
                }
                return None;
            }
            MergeStrategy::IgnoreExtra(paths) if paths.matches_prefix(path) => return None,
            _ => continue,
        }
    }

    first_writer(plan, entry)
}

fn first_writer(plan: &mut MergePlan, entry: FsEntry) -> Option<ConflictResolution> {
    if plan.insert(entry) {
        None
    } else {
        Some(ConflictResolution::Local)
    }
}
