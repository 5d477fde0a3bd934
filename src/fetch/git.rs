//! Git source fetcher.
//!
//! Refs are tried as a tag first and as a branch only when no tag of that
//! name exists. Freshness checks fetch just the one ref and compare hashes.

use std::path::Path;

use log::{debug, info, warn};

use super::{is_empty_dir, FetchContext, Fetcher};
use crate::auth::AuthOutcome;
use crate::error::{Error, Result};
use crate::git::{GitFailure, GitOperations, RefKind, SystemGit};
use crate::manifest::Package;

/// Fetches packages from git repositories.
pub struct GitFetcher {
    git: Box<dyn GitOperations>,
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self::new(Box::new(SystemGit))
    }
}

impl GitFetcher {
    /// Creates a fetcher with custom git operations. Primarily used by tests.
    pub fn new(git: Box<dyn GitOperations>) -> Self {
        Self { git }
    }

    fn outcome_error(outcome: AuthOutcome<GitFailure>, url: &str, ctx: &FetchContext<'_, '_>) -> Error {
        if ctx.cancel.is_cancelled() {
            return Error::Cancelled;
        }
        match outcome {
            AuthOutcome::Failed(failure) => failure.into_error(url),
            AuthOutcome::Exhausted => ctx.auth.exhausted_error(url),
            AuthOutcome::Aborted(e) => e,
        }
    }

    fn fetch(&self, repo: &Path, url: &str, refspec: &str, ctx: &mut FetchContext<'_, '_>) -> Result<()> {
        let git = self.git.as_ref();
        ctx.auth
            .run(url, |creds| git.fetch_ref(repo, url, refspec, creds))
            .map_err(|outcome| Self::outcome_error(outcome, url, ctx))
    }

    fn resolve(&self, repo: &Path, url: &str, rev: &str) -> Result<String> {
        match self.git.resolve(repo, rev) {
            Ok(Some(hash)) => Ok(hash),
            Ok(None) => Err(Error::GitCommand {
                command: "rev-parse".to_string(),
                url: url.to_string(),
                stderr: format!("unknown revision {}", rev),
            }),
            Err(failure) => Err(failure.into_error(url)),
        }
    }

    fn is_latest_branch(&self, repo: &Path, url: &str, branch: &str, ctx: &mut FetchContext<'_, '_>) -> Result<bool> {
        let remote_ref = format!("refs/remotes/origin/{}", branch);
        self.fetch(repo, url, &format!("+refs/heads/{}:{}", branch, remote_ref), ctx)?;

        let local = self.resolve(repo, url, &format!("refs/heads/{}", branch))?;
        let remote = self.resolve(repo, url, &remote_ref)?;
        Ok(local == remote)
    }

    fn is_latest_tag(
        &self,
        repo: &Path,
        url: &str,
        tag: &str,
        head: &str,
        ctx: &mut FetchContext<'_, '_>,
    ) -> Result<bool> {
        let tag_ref = format!("refs/tags/{}", tag);
        let before = self.resolve(repo, url, &tag_ref)?;
        self.fetch(repo, url, &format!("+{0}:{0}", tag_ref), ctx)?;
        let after = self.resolve(repo, url, &tag_ref)?;
        if before != after {
            return Ok(false);
        }

        let commit = self.resolve(repo, url, &format!("{}^{{commit}}", tag_ref))?;
        Ok(commit == head)
    }

    fn clone_as(
        &self,
        package: &Package,
        kind: RefKind,
        target_dir: &Path,
        ctx: &mut FetchContext<'_, '_>,
    ) -> std::result::Result<(), AuthOutcome<GitFailure>> {
        let git = self.git.as_ref();
        let url = package.url();
        let name = package.git_ref();
        ctx.auth
            .run(url, |creds| git.clone_ref(url, kind, name, target_dir, creds))
    }
}

impl Fetcher for GitFetcher {
    fn ensure_latest(&self, package: &Package, local_path: &Path, ctx: &mut FetchContext<'_, '_>) -> Result<bool> {
        if is_empty_dir(local_path)? {
            return Ok(false);
        }

        if !self.git.is_repository(local_path) {
            debug!("{} is not a git repository", local_path.display());
            return Ok(false);
        }

        let url = package.url();
        let head = match self.git.resolve(local_path, "HEAD") {
            Ok(Some(head)) => head,
            _ => {
                return Err(Error::GitCommand {
                    command: "rev-parse HEAD".to_string(),
                    url: url.to_string(),
                    stderr: format!("can't get HEAD of '{}', ensure package is valid", package.name()),
                })
            }
        };

        let branch = match self.git.current_branch(local_path) {
            Ok(branch) => branch,
            Err(failure) => {
                debug!("cannot read checked out branch: {:?}", failure);
                None
            }
        };

        let ref_name = if package.git_ref().is_empty() {
            match &branch {
                Some(branch) => branch.clone(),
                None => return Ok(false),
            }
        } else {
            package.git_ref().to_string()
        };

        let (kind, checked) = if branch.as_deref() == Some(ref_name.as_str()) {
            ("branch", self.is_latest_branch(local_path, url, &ref_name, ctx))
        } else {
            ("tag", self.is_latest_tag(local_path, url, &ref_name, &head, ctx))
        };

        match checked {
            Ok(true) => Ok(true),
            Ok(false) => {
                info!(
                    "Pulling new changes from {} '{}' of {} package",
                    kind,
                    ref_name,
                    package.name()
                );
                Ok(false)
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                warn!(
                    "Couldn't check local {}, marking package {}({}) as outdated",
                    kind,
                    package.name(),
                    ref_name
                );
                debug!("ensure {} error: {}", kind, e);
                Ok(false)
            }
        }
    }

    fn download(&self, package: &Package, target_dir: &Path, ctx: &mut FetchContext<'_, '_>) -> Result<()> {
        let url = package.url();
        if url.is_empty() {
            return Err(Error::MissingSourceUrl {
                name: package.name().to_string(),
            });
        }

        if package.git_ref().is_empty() {
            let git = self.git.as_ref();
            return ctx
                .auth
                .run(url, |creds| git.clone_default(url, target_dir, creds))
                .map_err(|outcome| Self::outcome_error(outcome, url, ctx));
        }

        let outcome = match self.clone_as(package, RefKind::Tag, target_dir, ctx) {
            Err(AuthOutcome::Failed(GitFailure::NoMatchingRef { .. })) => {
                debug!("no tag '{}' in {}, trying branch", package.git_ref(), url);
                self.clone_as(package, RefKind::Branch, target_dir, ctx)
            }
            other => other,
        };

        match outcome {
            Ok(()) => Ok(()),
            Err(AuthOutcome::Failed(GitFailure::NoMatchingRef { .. })) => Err(Error::RefNotFound {
                url: url.to_string(),
                r#ref: package.git_ref().to_string(),
            }),
            Err(outcome) => Err(Self::outcome_error(outcome, url, ctx)),
        }
    }
}
