//! # Error Handling
//!
//! This module defines the centralized error type for `model-compose`. It uses
//! `thiserror` to describe every failure the resolver, the fetchers and the
//! merge builder can report.
//!
//! ## Key Components
//!
//! - **`Error`**: The enum of all failure modes. Variants carry the context
//!   needed to act on the failure (the package name, URL or ref involved).
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! Not every variant is fatal for a caller. `ManifestNotFound` means "nothing
//! to compose" and `Cancelled` is a graceful stop; both can be checked with
//! the helper predicates on `Error`.

use thiserror::Error;

/// Main error type for model-compose operations
#[derive(Error, Debug)]
pub enum Error {
    /// The manifest file does not exist in the given directory.
    #[error("Manifest not found: {path}")]
    ManifestNotFound { path: String },

    /// The manifest exists but is not a valid composition.
    #[error("Manifest parsing error in {path}: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ManifestParse {
        path: String,
        message: String,
        /// Optional hint for how to fix the manifest
        hint: Option<String>,
    },

    /// A dependency was declared without `source.url`.
    #[error("Dependency '{name}' has no source url")]
    MissingSourceUrl { name: String },

    /// Neither a tag nor a branch with the requested name exists upstream.
    #[error("Couldn't find remote ref {r#ref} for {url}")]
    RefNotFound { url: String, r#ref: String },

    /// Every authentication step was tried and none was accepted.
    #[error("Authentication failed for {url}: no more credentials to try{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    AuthenticationExhausted {
        url: String,
        /// Optional hint, e.g. to re-run interactively
        hint: Option<String>,
    },

    /// A git command failed for a reason other than authentication or a
    /// missing ref.
    #[error("Git command failed for {url}: {command} - {stderr}")]
    GitCommand {
        command: String,
        url: String,
        stderr: String,
    },

    /// An HTTP download failed.
    #[error("Network operation error: {url} - {message}")]
    Network { url: String, message: String },

    /// A downloaded archive could not be unpacked.
    #[error("Archive error for {url}: {message}")]
    Archive { url: String, message: String },

    /// The credential store could not be read, prompted or saved.
    #[error("Credentials error: {message}")]
    Credentials { message: String },

    /// A filesystem operation failed while walking or materializing trees.
    #[error("Filesystem operation error: {message}")]
    Filesystem { message: String },

    /// A circular dependency was detected between packages.
    #[error("Cycle detected in package dependencies: {cycle}")]
    CycleDetected { cycle: String },

    /// The run was interrupted by a cancellation request.
    #[error("Operation cancelled")]
    Cancelled,

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl Error {
    /// Whether this error only signals a missing root manifest.
    pub fn is_manifest_not_found(&self) -> bool {
        matches!(self, Error::ManifestNotFound { .. })
    }

    /// Whether this error is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
