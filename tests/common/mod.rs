//! Shared test utilities for integration and E2E tests.
//!
//! Add `mod common;` to a test file and `use common::prelude::*;`.
//!
//! - `TestFixture`: a temporary working directory with a `compose.yaml`.
//! - `GitRepo`: a local git repository usable as a package source through a
//!   `file://` URL.
//! - `DirFetcher`: a `Fetcher` that copies packages from local directories,
//!   for library tests that should not depend on `git`.

#![allow(dead_code)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_fs::prelude::*;
use model_compose::credentials::{CredentialStore, Credentials, Prompter};
use model_compose::error::{Error, Result};
use model_compose::fetch::{FetchContext, Fetcher, FetcherRegistry};
use model_compose::manifest::Package;
use walkdir::WalkDir;

pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    pub use predicates::prelude::*;

    pub use super::{DirFetcher, GitRepo, NoCredentials, NoPrompt, TestFixture};
}

/// A temporary working directory.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Writes `compose.yaml`.
    pub fn with_manifest(self, content: &str) -> Self {
        self.with_file("compose.yaml", content)
    }

    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.path().join(".plasma/model/compose/packages")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path().join(".plasma/model/compose/merged")
    }

    /// A `model-compose` command running in this directory, with its own
    /// credentials file.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("model-compose");
        cmd.current_dir(self.path())
            .env("MODEL_COMPOSE_CREDENTIALS", self.path().join("credentials.yaml"))
            .env_remove("MODEL_COMPOSE_PACKAGES_DIR")
            .env_remove("MODEL_COMPOSE_OUTPUT")
            .env_remove("MODEL_COMPOSE_INTERACTIVE");
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads every file below `root` as `(relative path, content)`, sorted.
pub fn read_tree(root: &Path) -> Vec<(String, String)> {
    let mut files: Vec<(String, String)> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            (rel, fs::read_to_string(e.path()).unwrap_or_default())
        })
        .collect();
    files.sort();
    files
}

/// A local git repository.
pub struct GitRepo {
    temp_dir: assert_fs::TempDir,
}

impl GitRepo {
    /// Initializes a repository on branch `main`.
    pub fn new() -> Self {
        let repo = Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        };
        repo.git(&["init", "--quiet", "--initial-branch=main"]);
        repo.git(&["config", "user.email", "test@example.com"]);
        repo.git(&["config", "user.name", "Test"]);
        repo.git(&["config", "commit.gpgsign", "false"]);
        repo
    }

    pub fn git(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.temp_dir.path())
            .output()
            .expect("Failed to run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// Writes the files and commits them.
    pub fn commit(&self, files: &[(&str, &str)], message: &str) -> &Self {
        for (path, content) in files {
            self.temp_dir.child(path).write_str(content).unwrap();
        }
        self.git(&["add", "--all"]);
        self.git(&["commit", "--quiet", "-m", message]);
        self
    }

    pub fn tag(&self, name: &str) -> &Self {
        self.git(&["tag", name]);
        self
    }

    pub fn branch(&self, name: &str) -> &Self {
        self.git(&["branch", name]);
        self
    }

    pub fn head(&self) -> String {
        self.git(&["rev-parse", "HEAD"])
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn url(&self) -> String {
        url::Url::from_directory_path(self.path())
            .expect("absolute path")
            .to_string()
    }
}

impl Default for GitRepo {
    fn default() -> Self {
        Self::new()
    }
}

/// Copies packages from `<root>/<package name>`.
#[derive(Default)]
pub struct DirFetcher {
    pub root: PathBuf,
    /// Cancel the run once this many packages were copied.
    pub cancel_after: Option<usize>,
    pub downloads: RefCell<Vec<String>>,
}

impl DirFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    /// A registry using this fetcher for both source types.
    pub fn registry(root: &Path) -> FetcherRegistry {
        FetcherRegistry::new(Box::new(Self::new(root)), Box::new(Self::new(root)))
    }
}

impl Fetcher for DirFetcher {
    fn ensure_latest(&self, _: &Package, _: &Path, _: &mut FetchContext<'_, '_>) -> Result<bool> {
        Ok(false)
    }

    fn download(&self, package: &Package, target_dir: &Path, ctx: &mut FetchContext<'_, '_>) -> Result<()> {
        let source = self.root.join(package.name());
        if !source.is_dir() {
            return Err(Error::Network {
                url: package.url().to_string(),
                message: "not found".to_string(),
            });
        }

        for entry in WalkDir::new(&source).min_depth(1) {
            let entry = entry.map_err(|e| Error::Filesystem {
                message: e.to_string(),
            })?;
            let target = target_dir.join(entry.path().strip_prefix(&source).unwrap());
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)?;
            } else {
                fs::create_dir_all(target.parent().unwrap())?;
                fs::copy(entry.path(), &target)?;
            }
        }
        fs::create_dir_all(target_dir)?;

        let mut downloads = self.downloads.borrow_mut();
        downloads.push(package.name().to_string());
        if self.cancel_after == Some(downloads.len()) {
            ctx.cancel.cancel();
        }
        Ok(())
    }
}

/// A credential store that knows nothing.
#[derive(Default)]
pub struct NoCredentials {
    pub saved: Vec<Credentials>,
}

impl CredentialStore for NoCredentials {
    fn get_for_url(&self, _: &str) -> Result<Option<Credentials>> {
        Ok(None)
    }

    fn add_item(&mut self, credentials: Credentials) -> Result<()> {
        self.saved.push(credentials);
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A prompter that refuses to prompt.
pub struct NoPrompt;

impl Prompter for NoPrompt {
    fn prompt_credentials(&self, url: &str) -> Result<Credentials> {
        Err(Error::Credentials {
            message: format!("unexpected prompt for {}", url),
        })
    }
}
