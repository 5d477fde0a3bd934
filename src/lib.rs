//! # Model Compose Library
//!
//! This library composes a platform model from a local directory and a tree of
//! packages fetched from git repositories or HTTP archives. It is designed to
//! be used by the `model-compose` command-line tool but can also be embedded
//! by other tools that need the same merge rules.
//!
//! ## Quick Example
//!
//! ```
//! use model_compose::manifest;
//!
//! let composition = manifest::parse(r#"
//! name: platform
//! dependencies:
//!   - name: core
//!     source:
//!       url: https://github.com/example/core.git
//!       ref: v1.0.0
//!       strategy:
//!         - name: overwrite-local-file
//!           path: ["cfg/"]
//! "#).unwrap();
//!
//! assert_eq!(composition.dependencies.len(), 1);
//! assert_eq!(composition.dependencies[0].source.r#ref, "v1.0.0");
//! ```
//!
//! ## Core Concepts
//!
//! - **Manifest (`manifest`)**: The `compose.yaml` schema, packages and their
//!   fetch targets.
//! - **Fetchers (`fetch`, `git`)**: Bring packages into the packages cache,
//!   skipping downloads when the local copy is current.
//! - **Authentication (`auth`, `credentials`)**: An ordered chain of
//!   credential providers tried for every git network operation.
//! - **Strategies and Layout (`strategy`, `layout`)**: Per-package merge
//!   rules and the normalization of legacy package layouts.
//! - **Phases (`phases`)**: The pipeline that resolves, orders, merges and
//!   writes everything.
//!
//! ## Execution Flow
//!
//! The main entry point is `phases::orchestrator::Composer`, which executes
//! the following steps:
//!
//! 1.  **Resolution**: Walk nested manifests and fetch every package.
//! 2.  **Ordering**: Order packages deterministically, parents first.
//! 3.  **Baseline**: Collect the local files.
//! 4.  **Merging**: Merge package files, applying strategies.
//! 5.  **Disk Output**: Write the merged tree to the output directory.

pub mod auth;
pub mod cancel;
pub mod credentials;
pub mod defaults;
pub mod error;
pub mod fetch;
pub mod git;
pub mod layout;
pub mod manifest;
pub mod output;
pub mod phases;
pub mod strategy;

#[cfg(test)]
mod layout_proptest;
