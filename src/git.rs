//! # Git Operations
//!
//! All repository access goes through the `GitOperations` trait so the
//! fetcher logic can be tested with mocks. `SystemGit` implements it with
//! the system `git` command, which picks up SSH keys, credential helpers and
//! anything else configured in `~/.gitconfig`.
//!
//! Credentials from the authentication pipeline are passed per invocation as
//! an `http.extraHeader` set through `GIT_CONFIG_COUNT` environment
//! variables (git 2.31+). They never end up in `.git/config` or on the
//! command line, where other users could read them. Git's own
//! terminal prompt is disabled; a missing credential surfaces as a
//! `GitFailure::AuthenticationRequired` instead of blocking on stdin.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use crate::auth::AuthFailure;
use crate::credentials::Credentials;
use crate::error::Error;

/// Stderr fragments that mean the remote wants (other) credentials.
const AUTH_PATTERNS: [&str; 8] = [
    "could not read Username",
    "could not read Password",
    "terminal prompts disabled",
    "Authentication failed",
    "HTTP Basic: Access denied",
    "returned error: 401",
    "returned error: 403",
    "Permission denied (publickey)",
];

/// Stderr fragments that mean the requested ref does not exist upstream.
const NO_REF_PATTERNS: [&str; 3] = [
    "not found in upstream",
    "couldn't find remote ref",
    "Could not find remote branch",
];

/// Why a git invocation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitFailure {
    /// The remote requires credentials or refused the ones given.
    AuthenticationRequired { stderr: String },
    /// The requested tag or branch does not exist upstream.
    NoMatchingRef { stderr: String },
    /// Any other failure.
    Command { command: String, stderr: String },
}

impl GitFailure {
    /// Classifies the stderr of a failed command.
    pub fn classify(command: &str, stderr: &str) -> Self {
        let stderr = stderr.trim().to_string();
        if AUTH_PATTERNS.iter().any(|p| stderr.contains(p)) {
            GitFailure::AuthenticationRequired { stderr }
        } else if NO_REF_PATTERNS.iter().any(|p| stderr.contains(p)) {
            GitFailure::NoMatchingRef { stderr }
        } else {
            GitFailure::Command {
                command: command.to_string(),
                stderr,
            }
        }
    }

    /// Converts the failure into a crate error for `url`.
    pub fn into_error(self, url: &str) -> Error {
        let (command, stderr) = match self {
            GitFailure::AuthenticationRequired { stderr } => ("authenticate".to_string(), stderr),
            GitFailure::NoMatchingRef { stderr } => ("fetch ref".to_string(), stderr),
            GitFailure::Command { command, stderr } => (command, stderr),
        };
        Error::GitCommand {
            command,
            url: url.to_string(),
            stderr,
        }
    }
}

impl AuthFailure for GitFailure {
    fn is_auth_failure(&self) -> bool {
        matches!(self, GitFailure::AuthenticationRequired { .. })
    }
}

pub type GitResult<T> = std::result::Result<T, GitFailure>;

/// How a ref name is interpreted when cloning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Tag,
    Branch,
}

/// Trait for git operations - allows mocking in tests
pub trait GitOperations {
    /// Clones the default branch, single-branch with full history.
    fn clone_default(&self, url: &str, target: &Path, auth: Option<&Credentials>) -> GitResult<()>;

    /// Clones `name` interpreted as `kind`. The target is emptied first.
    fn clone_ref(
        &self,
        url: &str,
        kind: RefKind,
        name: &str,
        target: &Path,
        auth: Option<&Credentials>,
    ) -> GitResult<()>;

    /// Fetches a single refspec from `url` into `repo`.
    fn fetch_ref(&self, repo: &Path, url: &str, refspec: &str, auth: Option<&Credentials>) -> GitResult<()>;

    /// Whether `path` is the root of a git repository.
    fn is_repository(&self, path: &Path) -> bool;

    /// The checked-out branch, `None` when HEAD is detached.
    fn current_branch(&self, repo: &Path) -> GitResult<Option<String>>;

    /// Resolves a revision to a hash, `None` when it does not exist.
    fn resolve(&self, repo: &Path, rev: &str) -> GitResult<Option<String>>;

    /// Files tracked in the `HEAD` tree, as `/`-separated relative paths.
    fn tracked_files(&self, repo: &Path) -> GitResult<Vec<String>>;
}

/// The default implementation of `GitOperations`, backed by the `git`
/// executable.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemGit;

impl SystemGit {
    fn command(dir: Option<&Path>, auth: Option<&Credentials>) -> Command {
        let mut cmd = Command::new("git");
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        if let Some(creds) = auth {
            cmd.env("GIT_CONFIG_COUNT", "1")
                .env("GIT_CONFIG_KEY_0", "http.extraHeader")
                .env("GIT_CONFIG_VALUE_0", auth_header(creds));
        }
        cmd
    }

    /// Runs git and returns its output, even when it exited with an error.
    fn output(dir: Option<&Path>, args: &[&str], auth: Option<&Credentials>) -> GitResult<Output> {
        Self::command(dir, auth)
            .args(args)
            .output()
            .map_err(|e| GitFailure::Command {
                command: label(args),
                stderr: e.to_string(),
            })
    }

    /// Runs git and returns trimmed stdout, classifying any failure.
    fn run(dir: Option<&Path>, args: &[&str], auth: Option<&Credentials>) -> GitResult<String> {
        let output = Self::output(dir, args, auth)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitFailure::classify(&label(args), &stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

fn label(args: &[&str]) -> String {
    args.iter()
        .take_while(|a| !a.contains("://"))
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

/// The `http.extraHeader` value that authenticates a single invocation.
pub fn auth_header(creds: &Credentials) -> String {
    let token = base64::encode(format!("{}:{}", creds.username, creds.password));
    format!("Authorization: Basic {}", token)
}

fn reset_dir(target: &Path) -> GitResult<()> {
    let io_failure = |e: std::io::Error| GitFailure::Command {
        command: "prepare target".to_string(),
        stderr: format!("{}: {}", target.display(), e),
    };
    if target.exists() {
        fs::remove_dir_all(target).map_err(io_failure)?;
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(io_failure)?;
    }
    Ok(())
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl GitOperations for SystemGit {
    fn clone_default(&self, url: &str, target: &Path, auth: Option<&Credentials>) -> GitResult<()> {
        reset_dir(target)?;
        let target = path_arg(target);
        Self::run(None, &["clone", "--quiet", "--single-branch", url, target.as_str()], auth)?;
        Ok(())
    }

    fn clone_ref(
        &self,
        url: &str,
        kind: RefKind,
        name: &str,
        target: &Path,
        auth: Option<&Credentials>,
    ) -> GitResult<()> {
        reset_dir(target)?;
        match kind {
            RefKind::Branch => {
                let target = path_arg(target);
                Self::run(
                    None,
                    &["clone", "--quiet", "--single-branch", "--branch", name, url, target.as_str()],
                    auth,
                )?;
            }
            RefKind::Tag => {
                fs::create_dir_all(target).map_err(|e| GitFailure::Command {
                    command: "prepare target".to_string(),
                    stderr: e.to_string(),
                })?;
                let refspec = format!("+refs/tags/{0}:refs/tags/{0}", name);
                Self::run(Some(target), &["init", "--quiet"], None)?;
                Self::run(Some(target), &["remote", "add", "origin", url], None)?;
                Self::run(Some(target), &["fetch", "--quiet", "origin", refspec.as_str()], auth)?;
                let tag_ref = format!("refs/tags/{}", name);
                Self::run(Some(target), &["checkout", "--quiet", tag_ref.as_str()], None)?;
            }
        }
        Ok(())
    }

    fn fetch_ref(&self, repo: &Path, url: &str, refspec: &str, auth: Option<&Credentials>) -> GitResult<()> {
        Self::run(Some(repo), &["fetch", "--quiet", url, refspec], auth)?;
        Ok(())
    }

    fn is_repository(&self, path: &Path) -> bool {
        path.join(".git").exists() && Self::run(Some(path), &["rev-parse", "--git-dir"], None).is_ok()
    }

    fn current_branch(&self, repo: &Path) -> GitResult<Option<String>> {
        let output = Self::output(Some(repo), &["symbolic-ref", "--short", "-q", "HEAD"], None)?;
        match output.status.code() {
            Some(0) => Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string())),
            // Exit code 1 means HEAD is detached.
            Some(1) => Ok(None),
            _ => Err(GitFailure::classify(
                "symbolic-ref HEAD",
                &String::from_utf8_lossy(&output.stderr),
            )),
        }
    }

    fn resolve(&self, repo: &Path, rev: &str) -> GitResult<Option<String>> {
        let output = Self::output(Some(repo), &["rev-parse", "--verify", "-q", rev], None)?;
        match output.status.code() {
            Some(0) => Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string())),
            Some(1) => Ok(None),
            _ => Err(GitFailure::classify(
                "rev-parse",
                &String::from_utf8_lossy(&output.stderr),
            )),
        }
    }

    fn tracked_files(&self, repo: &Path) -> GitResult<Vec<String>> {
        let output = Self::output(Some(repo), &["ls-tree", "-r", "-z", "--name-only", "HEAD"], None)?;
        if !output.status.success() {
            return Err(GitFailure::classify(
                "ls-tree HEAD",
                &String::from_utf8_lossy(&output.stderr),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect())
    }
}
