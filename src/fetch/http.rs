//! HTTP archive fetcher.
//!
//! Packages are tar archives, optionally gzip-compressed, served over plain
//! or pre-authorized URLs. There is no credential chain for this source type.

use std::fs;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use log::debug;

use super::{is_empty_dir, FetchContext, Fetcher};
use crate::error::{Error, Result};
use crate::manifest::Package;

const USER_AGENT: &str = concat!("model-compose/", env!("CARGO_PKG_VERSION"));

/// Supported archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Tar,
}

impl ArchiveFormat {
    /// Detects the format from the content, falling back to the URL suffix.
    pub fn detect(url: &str, bytes: &[u8]) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        if bytes.starts_with(&[0x1f, 0x8b]) || path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if bytes.get(257..262) == Some(b"ustar".as_slice()) || path.ends_with(".tar") {
            Some(ArchiveFormat::Tar)
        } else {
            None
        }
    }
}

/// Downloads packages from HTTP archives.
#[derive(Debug, Default)]
pub struct HttpFetcher;

impl HttpFetcher {
    fn get(&self, url: &str) -> Result<Vec<u8>> {
        let network = |e: reqwest::Error| Error::Network {
            url: url.to_string(),
            message: e.to_string(),
        };

        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(network)?;
        let response = client.get(url).send().map_err(network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Network {
                url: url.to_string(),
                message: format!("unexpected status {}", status),
            });
        }

        let bytes = response.bytes().map_err(network)?;
        Ok(bytes.to_vec())
    }
}

/// Unpacks an archive into `target`, hoisting a single top-level directory.
pub fn unpack(url: &str, bytes: &[u8], target: &Path) -> Result<()> {
    let format = ArchiveFormat::detect(url, bytes).ok_or_else(|| Error::Archive {
        url: url.to_string(),
        message: "unsupported archive format, expected tar or tar.gz".to_string(),
    })?;

    fs::create_dir_all(target)?;
    let reader: Box<dyn Read + '_> = match format {
        ArchiveFormat::TarGz => Box::new(GzDecoder::new(bytes)),
        ArchiveFormat::Tar => Box::new(bytes),
    };
    tar::Archive::new(reader)
        .unpack(target)
        .map_err(|e| Error::Archive {
            url: url.to_string(),
            message: e.to_string(),
        })?;

    hoist_single_root(target)
}

/// Replaces `target` with its only child when that child is a directory.
fn hoist_single_root(target: &Path) -> Result<()> {
    let mut entries = fs::read_dir(target)?.collect::<std::io::Result<Vec<_>>>()?;
    if entries.len() != 1 || !entries[0].file_type()?.is_dir() {
        return Ok(());
    }

    let root = entries.remove(0).path();
    let mut staging = target.as_os_str().to_os_string();
    staging.push(".unpack");
    let staging = Path::new(&staging);

    // Left behind by an interrupted run.
    if let Ok(metadata) = fs::symlink_metadata(staging) {
        debug!("removing stale {}", staging.display());
        if metadata.is_dir() {
            fs::remove_dir_all(staging)?;
        } else {
            fs::remove_file(staging)?;
        }
    }

    debug!("hoisting {} into {}", root.display(), target.display());
    fs::rename(&root, staging)?;
    fs::remove_dir(target)?;
    fs::rename(staging, target)?;
    Ok(())
}

impl Fetcher for HttpFetcher {
    fn ensure_latest(&self, package: &Package, local_path: &Path, _ctx: &mut FetchContext<'_, '_>) -> Result<bool> {
        // Archives have no revision to compare; only pinned versions are kept.
        Ok(!package.git_ref().is_empty() && !is_empty_dir(local_path)?)
    }

    fn download(&self, package: &Package, target_dir: &Path, ctx: &mut FetchContext<'_, '_>) -> Result<()> {
        let url = package.url();
        if url.is_empty() {
            return Err(Error::MissingSourceUrl {
                name: package.name().to_string(),
            });
        }

        let bytes = self.get(url)?;
        ctx.cancel.check()?;
        unpack(url, &bytes, target_dir)
    }
}
