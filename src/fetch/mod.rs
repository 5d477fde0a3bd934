//! # Source Fetchers
//!
//! A `Fetcher` knows how to bring one kind of source onto disk. Two
//! implementations exist:
//!
//! - **`GitFetcher`** (`git`): clones tags or branches with the system `git`
//!   and runs every network operation through the authentication pipeline.
//! - **`HttpFetcher`** (`http`): downloads and unpacks a tar archive.
//!
//! `FetcherRegistry` picks the fetcher for a package and applies the common
//! flow: skip the download when the local copy is current, otherwise replace
//! it, and never leave a partial download behind.

pub mod git;
pub mod http;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::auth::AuthSession;
use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::manifest::{Package, SourceType};

pub use self::git::GitFetcher;
pub use self::http::HttpFetcher;

/// Per-run state handed to fetchers.
pub struct FetchContext<'s, 'a> {
    pub auth: &'s mut AuthSession<'a>,
    pub cancel: &'s CancellationToken,
}

/// Downloads packages of one source type.
pub trait Fetcher {
    /// Whether the copy at `local_path` is already the requested version.
    fn ensure_latest(&self, package: &Package, local_path: &Path, ctx: &mut FetchContext<'_, '_>) -> Result<bool>;

    /// Downloads the package into `target_dir`.
    fn download(&self, package: &Package, target_dir: &Path, ctx: &mut FetchContext<'_, '_>) -> Result<()>;
}

/// Where a package lives in the packages cache: `<packages>/<name>/<target>`.
pub fn package_path(packages_dir: &Path, package: &Package) -> PathBuf {
    packages_dir.join(package.name()).join(package.target())
}

/// Whether `dir` is missing, empty, or holds nothing but `.git`.
pub fn is_empty_dir(dir: &Path) -> Result<bool> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        if entry?.file_name() != ".git" {
            return Ok(false);
        }
    }
    Ok(true)
}

fn remove_dir_if_exists(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Maps source types to fetchers.
pub struct FetcherRegistry {
    git: Box<dyn Fetcher>,
    http: Box<dyn Fetcher>,
}

impl Default for FetcherRegistry {
    fn default() -> Self {
        Self::new(Box::new(GitFetcher::default()), Box::new(HttpFetcher::default()))
    }
}

impl FetcherRegistry {
    /// Creates a registry with custom fetchers. Primarily used by tests.
    pub fn new(git: Box<dyn Fetcher>, http: Box<dyn Fetcher>) -> Self {
        Self { git, http }
    }

    pub fn fetcher_for(&self, source_type: SourceType) -> &dyn Fetcher {
        match source_type {
            SourceType::Git => self.git.as_ref(),
            SourceType::Http => self.http.as_ref(),
        }
    }

    /// Makes `package` available in the packages cache and returns its path.
    ///
    /// A current local copy is kept. Otherwise the stale copy is removed and
    /// the package downloaded again; a failed download is cleaned up before
    /// the error is returned.
    pub fn download_package(
        &self,
        package: &Package,
        packages_dir: &Path,
        ctx: &mut FetchContext<'_, '_>,
    ) -> Result<PathBuf> {
        let fetcher = self.fetcher_for(package.source_type());
        let path = package_path(packages_dir, package);

        if fetcher.ensure_latest(package, &path, ctx)? {
            debug!("package '{}' is up to date at {}", package.name(), path.display());
            return Ok(path);
        }

        remove_dir_if_exists(&path)?;

        if let Err(e) = fetcher.download(package, &path, ctx) {
            if let Err(cleanup) = remove_dir_if_exists(&path) {
                debug!("error cleaning package folder {}: {}", path.display(), cleanup);
            }
            return Err(e);
        }

        info!("  ✓ {}", package.identifier());
        Ok(path)
    }
}
