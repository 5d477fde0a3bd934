//! # Model Compose CLI
//!
//! Binary entry point for `model-compose`. Arguments are parsed with `clap`
//! and dispatched to the command modules, which are thin wrappers over the
//! `model_compose` library. Errors surface through `anyhow` with their full
//! context chain.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    cli::Cli::parse().execute()
}
