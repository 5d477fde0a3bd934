//! Compose command implementation
//!
//! Runs the full pipeline: resolve and fetch packages, order them, merge them
//! over the local files and write the result to the output directory.
//! A directory without `compose.yaml` is not an error: there is simply
//! nothing to compose.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Args;

use model_compose::credentials::{FileCredentialStore, TerminalPrompter};
use model_compose::defaults;
use model_compose::fetch::FetcherRegistry;
use model_compose::git::SystemGit;
use model_compose::output::{emoji, OutputConfig};
use model_compose::phases::orchestrator::{ComposeOptions, ComposeReport, Composer};

/// Arguments for the compose command
#[derive(Args, Debug)]
pub struct ComposeArgs {
    /// Directory containing compose.yaml
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Where packages are downloaded to
    #[arg(long, value_name = "DIR", env = "MODEL_COMPOSE_PACKAGES_DIR")]
    pub packages_dir: Option<PathBuf>,

    /// Where the composed model is written to
    #[arg(short, long, value_name = "DIR", env = "MODEL_COMPOSE_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Remove downloaded packages before fetching
    #[arg(long)]
    pub clean: bool,

    /// Leave out local files that are not committed to git
    #[arg(long)]
    pub skip_not_versioned: bool,

    /// List every conflicting file and where it was taken from
    #[arg(long)]
    pub conflicts_verbosity: bool,

    /// Prompt for credentials when a repository rejects the known ones
    #[arg(short, long, env = "MODEL_COMPOSE_INTERACTIVE")]
    pub interactive: bool,

    /// Credentials file, defaults to the user config directory
    #[arg(long, value_name = "FILE")]
    pub credentials: Option<PathBuf>,
}

impl ComposeArgs {
    fn options(&self, working_dir: PathBuf) -> ComposeOptions {
        let mut options = ComposeOptions::new(working_dir);
        if let Some(dir) = &self.packages_dir {
            options = options.with_packages_dir(dir);
        }
        if let Some(dir) = &self.output {
            options = options.with_output_dir(dir);
        }
        options.clean = self.clean;
        options.skip_unversioned = self.skip_not_versioned;
        options.log_conflicts = self.conflicts_verbosity;
        options.interactive = self.interactive;
        options
    }
}

/// Execute the compose command
pub fn execute(args: ComposeArgs, output: OutputConfig) -> Result<()> {
    let start_time = Instant::now();
    let options = args.options(super::working_dir(&args.dir)?);
    let output_dir = options.output_dir().to_path_buf();

    let registry = FetcherRegistry::default();
    let mut store = FileCredentialStore::new(
        args.credentials
            .clone()
            .unwrap_or_else(defaults::default_credentials_path),
    );
    let prompter = TerminalPrompter;

    let result = Composer::new(options, &registry, &SystemGit, &mut store, &prompter)
        .with_cancellation(super::interrupt_token())
        .compose();

    match result {
        Ok(report) => {
            print_summary(&report, &args, output, &output_dir, start_time);
            Ok(())
        }
        Err(e) if e.is_manifest_not_found() => {
            println!("{} nothing to compose", emoji(&output, "ℹ️ ", "[INFO]"));
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            anyhow::bail!("{} Composition cancelled", emoji(&output, "⛔", "[CANCELLED]"))
        }
        Err(e) => Err(e.into()),
    }
}

fn print_summary(
    report: &ComposeReport,
    args: &ComposeArgs,
    output: OutputConfig,
    output_dir: &std::path::Path,
    start_time: Instant,
) {
    println!(
        "{} Composed {} package(s) into {} in {:.2}s",
        emoji(&output, "✅", "[OK]"),
        report.packages.len(),
        output_dir.display(),
        start_time.elapsed().as_secs_f64()
    );

    if !report.conflicts.is_empty() && !args.conflicts_verbosity {
        println!(
            "{} {} conflicting file(s), re-run with --conflicts-verbosity to list them",
            emoji(&output, "⚠️ ", "[WARN]"),
            report.conflicts.len()
        );
    }
}
