//! CLI argument parsing and command dispatch

use std::io::Write;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{Level, LevelFilter};

use crate::commands;
use model_compose::output::OutputConfig;

/// Model Compose - Compose a platform model from packages
#[derive(Parser, Debug)]
#[command(name = "model-compose")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch packages and compose them with the local model
    Compose(commands::compose::ComposeArgs),

    /// Resolve packages and display the dependency tree
    Tree(commands::tree::TreeArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        let output = OutputConfig::from_env_and_flag(&self.color);
        output.apply();
        init_logging(&self.log_level, output);

        match self.command {
            Commands::Compose(args) => commands::compose::execute(args, output),
            Commands::Tree(args) => commands::tree::execute(args, output),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}

/// Parses `--log-level`, falling back to `info` for unknown values.
fn parse_level(level: &str) -> LevelFilter {
    level.parse().unwrap_or(LevelFilter::Info)
}

/// Progress (`info`) goes out as plain lines; other levels carry a prefix.
fn init_logging(level: &str, output: OutputConfig) {
    let style = if output.use_color {
        env_logger::WriteStyle::Always
    } else {
        env_logger::WriteStyle::Never
    };

    let _ = env_logger::Builder::new()
        .filter_level(parse_level(level))
        .write_style(style)
        .format(move |buf, record| {
            let prefix = match record.level() {
                Level::Info => return writeln!(buf, "{}", record.args()),
                Level::Error => console::style("error").red().bold(),
                Level::Warn => console::style("warning").yellow().bold(),
                Level::Debug => console::style("debug").dim(),
                Level::Trace => console::style("trace").dim(),
            };
            writeln!(buf, "{}: {}", prefix, record.args())
        })
        .try_init();
}
