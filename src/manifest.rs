//! # Composition Manifest
//!
//! This module defines the data structures behind `compose.yaml`, the file
//! that declares which packages make up a composition, and the logic for
//! reading it.
//!
//! ## Key Components
//!
//! - **`Composition`**: The root of a manifest: a name and its dependencies.
//! - **`Dependency`** / **`Source`**: A named package and where to fetch it
//!   from (`git` or `http`, a URL, an optional ref and merge strategies).
//! - **`Package`**: The runtime node built from a dependency during
//!   resolution. It knows its target version, its children and the order in
//!   which it was discovered.
//!
//! ## Example
//!
//! ```yaml
//! name: my-platform
//! dependencies:
//!   - name: core
//!     source:
//!       type: git
//!       url: https://example.com/org/core.git
//!       ref: v1.0.0
//!       strategy:
//!         - name: overwrite-local-file
//!           path: ["cfg/"]
//! ```

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of the manifest file looked up in every directory level.
pub const MANIFEST_FILE: &str = "compose.yaml";

/// Target used for packages declared without a ref.
pub const TARGET_LATEST: &str = "latest";

/// A composition: the root of a manifest file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    /// Name of the composition.
    #[serde(default)]
    pub name: String,
    /// Packages this composition depends on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Dependency>,
}

/// A named dependency entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    /// Package name, unique within one manifest.
    pub name: String,
    /// Where to fetch the package from.
    #[serde(default)]
    pub source: Source,
}

/// Package source definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Source type (`git` or `http`). Defaults to git.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Location of the package.
    #[serde(default)]
    pub url: String,
    /// Tag or branch to fetch. Empty means the default branch.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub r#ref: String,
    /// Merge strategies applied to this package's files.
    #[serde(rename = "strategy", default, skip_serializing_if = "Vec::is_empty")]
    pub strategies: Vec<StrategySpec>,
    /// Deprecated predecessor of `ref`. Only reported, never used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// A merge strategy as written in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySpec {
    /// Strategy name, e.g. `overwrite-local-file`.
    pub name: String,
    /// Path prefixes the strategy applies to.
    #[serde(rename = "path", default)]
    pub paths: Vec<String>,
}

/// Supported source types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceType {
    Git,
    Http,
}

impl SourceType {
    /// Parses a source type name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "git" => Some(SourceType::Git),
            "http" => Some(SourceType::Http),
            _ => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Git => write!(f, "git"),
            SourceType::Http => write!(f, "http"),
        }
    }
}

impl Source {
    /// Returns the declared source type, falling back to git.
    pub fn source_type(&self) -> SourceType {
        match self.kind.as_deref() {
            None | Some("") => SourceType::Git,
            Some(name) => SourceType::from_name(name).unwrap_or_else(|| {
                warn!("unknown source type '{}', falling back to git", name);
                SourceType::Git
            }),
        }
    }
}

/// A resolved dependency node.
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    name: String,
    source: Source,
    dependencies: Vec<String>,
    ordinal: usize,
}

impl Package {
    /// Builds a package from a dependency, remembering when it was
    /// discovered.
    pub fn from_dependency(dependency: &Dependency, ordinal: usize) -> Self {
        Self {
            name: dependency.name.clone(),
            source: dependency.source.clone(),
            dependencies: Vec::new(),
            ordinal,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn url(&self) -> &str {
        &self.source.url
    }

    /// The declared ref, possibly empty.
    pub fn git_ref(&self) -> &str {
        &self.source.r#ref
    }

    pub fn source_type(&self) -> SourceType {
        self.source.source_type()
    }

    pub fn strategies(&self) -> &[StrategySpec] {
        &self.source.strategies
    }

    /// Names of the packages this package declared in its own manifest.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Records a child dependency name.
    pub fn add_dependency(&mut self, name: &str) {
        self.dependencies.push(name.to_string());
    }

    /// Position of this package in discovery order.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// The version to fetch: the ref if set, otherwise `latest`.
    pub fn target(&self) -> &str {
        if self.source.r#ref.is_empty() {
            TARGET_LATEST
        } else {
            &self.source.r#ref
        }
    }

    /// Human readable identifier, `host/path[@ref]`.
    ///
    /// Falls back to `name[@ref]` when the URL cannot be parsed.
    pub fn identifier(&self) -> String {
        let base = match url::Url::parse(&self.source.url) {
            Ok(parsed) => {
                let path = parsed.path().trim_start_matches('/');
                let path = path.strip_suffix(".git").unwrap_or(path);
                format!("{}/{}", parsed.host_str().unwrap_or_default(), path)
            }
            Err(_) => self.name.clone(),
        };

        if self.source.r#ref.is_empty() {
            base
        } else {
            format!("{}@{}", base, self.source.r#ref)
        }
    }
}

/// Reads and parses the manifest in `dir`.
///
/// Returns `Error::ManifestNotFound` when the file does not exist, which
/// callers may treat as "nothing to compose".
pub fn lookup(dir: &Path) -> Result<Composition> {
    let path = dir.join(MANIFEST_FILE);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(Error::ManifestNotFound {
                path: path.display().to_string(),
            })
        }
        Err(e) => return Err(Error::Io(e)),
    };

    parse(&content).map_err(|e| match e {
        Error::ManifestParse { message, hint, .. } => Error::ManifestParse {
            path: path.display().to_string(),
            message,
            hint,
        },
        other => other,
    })
}

/// Parses manifest content.
pub fn parse(content: &str) -> Result<Composition> {
    if content.trim().is_empty() {
        return Ok(Composition::default());
    }

    let composition: Composition =
        serde_yaml::from_str(content).map_err(|e| Error::ManifestParse {
            path: MANIFEST_FILE.to_string(),
            message: e.to_string(),
            hint: Some("Ensure the file has 'name' and a 'dependencies' list".to_string()),
        })?;

    let mut seen = HashSet::new();
    for dependency in &composition.dependencies {
        if !seen.insert(dependency.name.as_str()) {
            return Err(Error::ManifestParse {
                path: MANIFEST_FILE.to_string(),
                message: format!("duplicate dependency name '{}'", dependency.name),
                hint: Some("Dependency names must be unique within one manifest".to_string()),
            });
        }

        validate_location(dependency)?;

        if dependency.source.tag.is_some() {
            warn!(
                "found deprecated field `tag` in `{}` dependency. Use `ref` field for tags or branches.",
                dependency.name
            );
        }
    }

    Ok(composition)
}

/// Names and refs become directories of the packages cache, so they must
/// stay inside it.
fn validate_location(dependency: &Dependency) -> Result<()> {
    let invalid = |field: &str, value: &str, hint: &str| Error::ManifestParse {
        path: MANIFEST_FILE.to_string(),
        message: format!("invalid {} '{}' in dependency '{}'", field, value, dependency.name),
        hint: Some(hint.to_string()),
    };

    let segments: Vec<Component<'_>> = Path::new(&dependency.name).components().collect();
    if dependency.name.contains(['/', '\\']) || !matches!(segments[..], [Component::Normal(_)]) {
        return Err(invalid(
            "name",
            &dependency.name,
            "Dependency names must be a single plain word, without '/', '\\' or '..'",
        ));
    }

    let r#ref = &dependency.source.r#ref;
    let plain = Path::new(r#ref)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if r#ref.contains('\\') || !plain {
        return Err(invalid(
            "ref",
            r#ref,
            "Refs must be relative tag or branch names without '..'",
        ));
    }

    Ok(())
}
