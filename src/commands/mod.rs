//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the
//! `model-compose` command-line tool, one file per subcommand.
//!
//! Each command module contains:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that takes the parsed `Args` and calls into the
//!   `model_compose` library.

pub mod completions;
pub mod compose;
pub mod tree;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::warn;
use model_compose::cancel::CancellationToken;

/// Absolute form of the `--dir` argument.
pub(crate) fn working_dir(dir: &Path) -> Result<PathBuf> {
    dir.canonicalize()
        .with_context(|| format!("Failed to access directory '{}'", dir.display()))
}

/// A token cancelled on Ctrl-C.
pub(crate) fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let handler_token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_token.cancel()) {
        warn!("can't install interrupt handler: {}", e);
    }
    token
}
