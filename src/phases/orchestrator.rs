//! Orchestrator for the complete compose operation
//!
//! This module coordinates all phases to provide a clean API for the CLI.
//! `Composer::resolve` runs Phase 1 on its own (used by `tree`),
//! `Composer::compose` runs Phases 1-5.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use log::{debug, info};

use super::baseline::BaselineOptions;
use super::{phase1, phase2, phase3, phase4, phase5, ConflictRecord};
use crate::auth::AuthSession;
use crate::cancel::CancellationToken;
use crate::credentials::{CredentialStore, Prompter};
use crate::defaults;
use crate::error::{Error, Result};
use crate::fetch::FetcherRegistry;
use crate::git::GitOperations;
use crate::manifest::{self, Composition, Package};

/// Options of one compose run.
#[derive(Debug, Clone)]
pub struct ComposeOptions {
    working_dir: PathBuf,
    packages_dir: PathBuf,
    output_dir: PathBuf,
    /// Also wipe the packages cache before fetching.
    pub clean: bool,
    /// Leave out local files not tracked by git.
    pub skip_unversioned: bool,
    /// Log every conflicting path and its winner.
    pub log_conflicts: bool,
    /// Allow prompting for credentials.
    pub interactive: bool,
}

impl ComposeOptions {
    /// Options with the default packages and output directories.
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        Self {
            packages_dir: defaults::default_packages_dir(&working_dir),
            output_dir: defaults::default_output_dir(&working_dir),
            working_dir,
            clean: false,
            skip_unversioned: false,
            log_conflicts: false,
            interactive: false,
        }
    }

    /// Relative paths are taken from the working directory.
    pub fn with_packages_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.packages_dir = self.working_dir.join(dir);
        self
    }

    /// Relative paths are taken from the working directory.
    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.output_dir = self.working_dir.join(dir);
        self
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn packages_dir(&self) -> &Path {
        &self.packages_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Checks that the directories this run may delete are neither the
    /// working directory nor one of its ancestors.
    pub fn validate(&self) -> Result<()> {
        let working_dir = absolute(&self.working_dir)?;
        for (label, dir) in [("output", &self.output_dir), ("packages", &self.packages_dir)] {
            if working_dir.starts_with(absolute(dir)?) {
                return Err(Error::Filesystem {
                    message: format!(
                        "{} directory '{}' contains the working directory '{}', refusing to remove it",
                        label,
                        dir.display(),
                        self.working_dir.display()
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Canonical form of `path`, which may not exist yet: the deepest existing
/// ancestor is canonicalized and the rest is normalized lexically.
fn absolute(path: &Path) -> Result<PathBuf> {
    let mut existing = path;
    let mut rest = Vec::new();
    let base = loop {
        if existing.as_os_str().is_empty() {
            break std::env::current_dir()?;
        }
        match existing.canonicalize() {
            Ok(base) => break base,
            Err(_) => match (existing.parent(), existing.components().next_back()) {
                (Some(parent), Some(last)) => {
                    rest.push(last.as_os_str().to_os_string());
                    existing = parent;
                }
                _ => {
                    return Err(Error::Filesystem {
                        message: format!("Failed to resolve '{}'", path.display()),
                    })
                }
            },
        }
    };

    let mut resolved = base;
    for name in rest.iter().rev() {
        match Path::new(name).components().next() {
            Some(Component::ParentDir) => {
                resolved.pop();
            }
            Some(Component::CurDir) | None => {}
            Some(_) => resolved.push(name),
        }
    }
    Ok(resolved)
}

/// What a compose run produced.
#[derive(Debug, Default)]
pub struct ComposeReport {
    /// Packages in merge order.
    pub packages: Vec<Package>,
    pub conflicts: Vec<ConflictRecord>,
}

/// Runs the compose pipeline with the given collaborators.
pub struct Composer<'a> {
    options: ComposeOptions,
    registry: &'a FetcherRegistry,
    git: &'a dyn GitOperations,
    store: &'a mut dyn CredentialStore,
    prompter: &'a dyn Prompter,
    cancel: CancellationToken,
}

impl<'a> Composer<'a> {
    pub fn new(
        options: ComposeOptions,
        registry: &'a FetcherRegistry,
        git: &'a dyn GitOperations,
        store: &'a mut dyn CredentialStore,
        prompter: &'a dyn Prompter,
    ) -> Self {
        Self {
            options,
            registry,
            git,
            store,
            prompter,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `cancel` instead of a private token, e.g. one set by a signal
    /// handler.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &ComposeOptions {
        &self.options
    }

    /// Resolves and fetches all packages (Phase 1), returning them in
    /// resolution order. Newly entered credentials are saved.
    pub fn resolve(&mut self) -> Result<Vec<Package>> {
        let composition = manifest::lookup(&self.options.working_dir)?;
        self.options.validate()?;
        self.fetch(&composition)
    }

    fn fetch(&mut self, composition: &Composition) -> Result<Vec<Package>> {
        self.store.unlock()?;
        info!("Fetching packages...");

        let session = AuthSession::new(&*self.store, self.prompter, self.options.interactive);
        let resolution = phase1::execute(
            composition,
            self.registry,
            &self.options.packages_dir,
            session,
            &self.cancel,
        )?;

        if !resolution.captured.is_empty() {
            debug!("saving {} new credential(s)", resolution.captured.len());
            for credentials in resolution.captured {
                self.store.add_item(credentials)?;
            }
            self.store.save()?;
        }

        Ok(resolution.packages)
    }

    /// Execute the complete compose operation (Phases 1-5)
    ///
    /// 1. Resolve and fetch packages
    /// 2. Determine merge order
    /// 3. Collect the local baseline
    /// 4. Merge packages into the plan
    /// 5. Write the plan to the output directory
    pub fn compose(&mut self) -> Result<ComposeReport> {
        let composition = manifest::lookup(&self.options.working_dir)?;
        self.options.validate()?;

        remove_dir_if_exists(&self.options.output_dir)?;
        if self.options.clean {
            remove_dir_if_exists(&self.options.packages_dir)?;
        }

        // Phase 1: Dependency Resolution
        let packages = match self.fetch(&composition) {
            Ok(packages) => packages,
            Err(Error::Cancelled) => {
                remove_dir_if_exists(&self.options.output_dir)?;
                return Err(Error::Cancelled);
            }
            Err(e) => return Err(e),
        };

        // Phase 2: Determining Merge Order
        let ordered = phase2::execute(&packages)?;

        info!("Merging packages...");

        // Phase 3: Local Baseline
        let baseline = BaselineOptions {
            working_dir: &self.options.working_dir,
            excluded_dirs: vec![self.options.packages_dir.clone(), self.options.output_dir.clone()],
            skip_unversioned: self.options.skip_unversioned,
        };
        let plan = phase3::execute(&baseline, self.git)?;

        // Phase 4: Package Merging
        let plan = phase4::execute(plan, &ordered, &self.options.packages_dir, &self.cancel)?;

        if self.options.log_conflicts && !plan.conflicts().is_empty() {
            info!("Conflicting files:");
            for conflict in plan.conflicts() {
                info!("{}", conflict);
            }
        }

        // Phase 5: Writing to Disk
        phase5::execute(&plan, &self.options.output_dir)?;

        info!("Composition completed.");
        Ok(ComposeReport {
            packages: ordered,
            conflicts: plan.into_conflicts(),
        })
    }
}

fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(Error::Filesystem {
            message: format!("Failed to remove '{}': {}", dir.display(), e),
        }),
        _ => Ok(()),
    }
}
