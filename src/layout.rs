//! Package layout detection and destination path normalization.
//!
//! Packages come in two shapes. A *modern* package keeps its layers under
//! `src/`, a *legacy* package has them at its root. Destination paths are
//! normalized so both end up in the same place in the merged tree.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Recognized layer directory names.
pub const LAYER_NAMES: [&str; 7] = [
    "platform",
    "interaction",
    "integration",
    "cognition",
    "conversation",
    "stabilization",
    "foundation",
];

const SRC_DIR: &str = "src";

/// Whether `name` is a recognized layer.
pub fn is_layer(name: &str) -> bool {
    LAYER_NAMES.contains(&name)
}

/// Whether the first segment of `path` is a layer.
pub fn starts_with_layer(path: &Path) -> bool {
    match path.components().find(|c| *c != Component::CurDir) {
        Some(Component::Normal(name)) => name.to_str().is_some_and(is_layer),
        _ => false,
    }
}

/// A package has the modern layout when `src/` contains at least one layer
/// directory.
pub fn has_modern_layout(package_root: &Path) -> bool {
    let src = package_root.join(SRC_DIR);
    if !src.is_dir() {
        return false;
    }
    LAYER_NAMES.iter().any(|layer| src.join(layer).exists())
}

/// Removes the first `roles` segment: `layer/kind/roles/name` becomes
/// `layer/kind/name`.
pub fn strip_roles(path: &Path) -> PathBuf {
    replace_segment(path, "roles", None)
}

/// Renames the first `group_vars` segment to `variables`.
pub fn group_vars_to_variables(path: &Path) -> PathBuf {
    replace_segment(path, "group_vars", Some("variables"))
}

/// Replaces the first inner `<segment>`, or else a leading one. The segment
/// must be followed by at least one more.
fn replace_segment(path: &Path, segment: &str, replacement: Option<&str>) -> PathBuf {
    let parts: Vec<&OsStr> = path.iter().collect();
    let last = parts.len().saturating_sub(1);
    let position = (1..last)
        .find(|&i| parts[i] == segment)
        .or_else(|| (last > 0 && parts[0] == segment).then_some(0));

    match position {
        Some(position) => parts
            .iter()
            .enumerate()
            .filter_map(|(i, part)| if i == position { replacement.map(OsStr::new) } else { Some(*part) })
            .collect(),
        None => path.to_path_buf(),
    }
}

/// Computes where a package entry lands in the merged tree.
pub fn destination_path(path: &Path, modern: bool) -> PathBuf {
    let path = group_vars_to_variables(&strip_roles(path));
    if !modern && starts_with_layer(&path) {
        Path::new(SRC_DIR).join(path)
    } else {
        path
    }
}
