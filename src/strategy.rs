//! Path-scoped merge strategies.
//!
//! Manifest strategies are converted into the closed `MergeStrategy` type.
//! Each variant carries a `PathSet` of normalized prefixes: cleaned and
//! terminated by exactly one `/` so that `cfg/` never matches `cfg-extra/`.

use log::warn;

use crate::manifest::StrategySpec;

pub const OVERWRITE_LOCAL_FILE: &str = "overwrite-local-file";
pub const REMOVE_EXTRA_LOCAL_FILES: &str = "remove-extra-local-files";
pub const IGNORE_EXTRA_PACKAGE_FILES: &str = "ignore-extra-package-files";
pub const FILTER_PACKAGE_FILES: &str = "filter-package-files";

/// A set of normalized path prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PathSet {
    prefixes: Vec<String>,
}

impl PathSet {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            prefixes: paths
                .into_iter()
                .map(|p| normalize_prefix(p.as_ref()))
                .collect(),
        }
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// True when `path` starts with one of the prefixes.
    pub fn matches_prefix(&self, path: &str) -> bool {
        self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    /// True when one of the prefixes contains `path` as a substring.
    ///
    /// Used for directories, so that `a` and `a/b` are kept for a prefix
    /// `a/b/c/`.
    pub fn contains(&self, path: &str) -> bool {
        self.prefixes.iter().any(|p| p.contains(path))
    }
}

/// Cleans a strategy path and terminates it with a single `/`.
pub fn normalize_prefix(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !path.starts_with('/') {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let mut cleaned = String::new();
    if path.starts_with('/') {
        cleaned.push('/');
    }
    cleaned.push_str(&parts.join("/"));
    if cleaned.is_empty() {
        cleaned.push('.');
    }
    if !cleaned.ends_with('/') {
        cleaned.push('/');
    }
    cleaned
}

/// A merge strategy with the paths it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Package files replace existing entries under the paths.
    Overwrite(PathSet),
    /// Local baseline entries under the paths are dropped before merging.
    RemoveExtra(PathSet),
    /// Package files under the paths are never merged.
    IgnoreExtra(PathSet),
    /// Only package files under the paths are merged.
    Filter(PathSet),
}

impl MergeStrategy {
    /// Converts a manifest entry. Unknown names yield `None`.
    pub fn from_spec(spec: &StrategySpec) -> Option<Self> {
        let paths = PathSet::new(&spec.paths);
        match spec.name.as_str() {
            OVERWRITE_LOCAL_FILE => Some(MergeStrategy::Overwrite(paths)),
            REMOVE_EXTRA_LOCAL_FILES => Some(MergeStrategy::RemoveExtra(paths)),
            IGNORE_EXTRA_PACKAGE_FILES => Some(MergeStrategy::IgnoreExtra(paths)),
            FILTER_PACKAGE_FILES => Some(MergeStrategy::Filter(paths)),
            _ => None,
        }
    }

    /// Whether the strategy targets the local baseline rather than the
    /// package's own files.
    pub fn is_local(&self) -> bool {
        matches!(self, MergeStrategy::RemoveExtra(_))
    }

    pub fn paths(&self) -> &PathSet {
        match self {
            MergeStrategy::Overwrite(p)
            | MergeStrategy::RemoveExtra(p)
            | MergeStrategy::IgnoreExtra(p)
            | MergeStrategy::Filter(p) => p,
        }
    }
}

/// Strategies of one package, split by what they target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageStrategies {
    /// Strategies applied to the local baseline.
    pub local: Vec<MergeStrategy>,
    /// Strategies applied to the package's files, in declaration order.
    pub package: Vec<MergeStrategy>,
}

impl PackageStrategies {
    pub fn from_specs(owner: &str, specs: &[StrategySpec]) -> Self {
        let mut strategies = Self::default();
        for spec in specs {
            match MergeStrategy::from_spec(spec) {
                Some(s) if s.is_local() => strategies.local.push(s),
                Some(s) => strategies.package.push(s),
                None => warn!(
                    "unknown merge strategy '{}' in package '{}', skipping",
                    spec.name, owner
                ),
            }
        }
        strategies
    }
}
