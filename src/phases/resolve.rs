//! Phase 1: Dependency Resolution
//!
//! This is the first phase of the compose pipeline. Its main responsibility is
//! to discover every package reachable from the root manifest and to bring
//! each one into the packages cache.
//!
//! ## Process
//!
//! 1.  **Worklist**: Manifests are processed with an explicit stack of frames.
//!     Each frame owns the dependencies of one manifest that are still pending
//!     and the package that manifest belongs to (none for the root).
//!
//! 2.  **Fetching**: Each dependency is turned into a `Package`, recorded as a
//!     child of the frame's package, and downloaded through the
//!     `FetcherRegistry` into `<packages>/<name>/<target>`.
//!
//! 3.  **Nesting**: A downloaded package that carries its own `compose.yaml`
//!     pushes a new frame. A package is appended to the result once all of
//!     its own dependencies are done, so children precede their parents.
//!
//! 4.  **Safety**: A dependency already present on the ancestor chain aborts
//!     with `CycleDetected`. Cancellation is checked before every dependency.
//!
//! Credentials entered while fetching are returned with the packages so the
//! caller can persist them once.

use std::collections::VecDeque;
use std::path::Path;

use log::debug;

use super::Resolution;
use crate::auth::AuthSession;
use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::fetch::{FetchContext, FetcherRegistry};
use crate::manifest::{self, Composition, Dependency, Package, MANIFEST_FILE};

/// Dependencies of one manifest still waiting to be resolved.
struct Frame {
    package: Option<Package>,
    pending: VecDeque<Dependency>,
}

impl Frame {
    fn new(package: Option<Package>, composition: Composition) -> Self {
        Self {
            package,
            pending: composition.dependencies.into(),
        }
    }
}

/// Execute Phase 1: resolve and fetch the dependency tree of `composition`.
pub fn execute(
    composition: &Composition,
    registry: &FetcherRegistry,
    packages_dir: &Path,
    mut session: AuthSession<'_>,
    cancel: &CancellationToken,
) -> Result<Resolution> {
    let mut packages = Vec::new();
    let mut ordinal = 0;
    let mut stack = vec![Frame::new(None, composition.clone())];

    while let Some(frame) = stack.last_mut() {
        let dependency = match frame.pending.pop_front() {
            Some(dependency) => dependency,
            None => {
                if let Some(package) = stack.pop().and_then(|f| f.package) {
                    packages.push(package);
                }
                continue;
            }
        };

        cancel.check()?;

        let package = Package::from_dependency(&dependency, ordinal);
        ordinal += 1;
        if let Some(parent) = frame.package.as_mut() {
            parent.add_dependency(package.name());
        }

        check_cycle(&stack, package.name())?;

        if package.url().is_empty() {
            return Err(Error::MissingSourceUrl {
                name: package.name().to_string(),
            });
        }

        let mut ctx = FetchContext {
            auth: &mut session,
            cancel,
        };
        let path = match registry.download_package(&package, packages_dir, &mut ctx) {
            Ok(path) => path,
            Err(_) if cancel.is_cancelled() => return Err(Error::Cancelled),
            Err(e) => return Err(e),
        };

        if path.join(MANIFEST_FILE).is_file() {
            debug!("package '{}' declares its own dependencies", package.name());
            let nested = manifest::lookup(&path)?;
            stack.push(Frame::new(Some(package), nested));
        } else {
            packages.push(package);
        }
    }

    Ok(Resolution {
        packages,
        captured: session.into_captured(),
    })
}

fn check_cycle(stack: &[Frame], name: &str) -> Result<()> {
    let chain: Vec<&str> = stack
        .iter()
        .filter_map(|f| f.package.as_ref().map(Package::name))
        .collect();

    match chain.iter().position(|n| *n == name) {
        Some(start) => {
            let mut cycle: Vec<&str> = chain[start..].to_vec();
            cycle.push(name);
            Err(Error::CycleDetected {
                cycle: cycle.join(" -> "),
            })
        }
        None => Ok(()),
    }
}
