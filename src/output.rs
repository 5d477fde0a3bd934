//! # Output Configuration
//!
//! Decides once per run whether the CLI decorates what it prints. The same
//! decision drives three things:
//!
//! - the status markers of `compose` and `tree` (emoji or bracketed words),
//! - the `console` styling used by the log prefixes and the dependency tree,
//! - the `env_logger` write style.
//!
//! ## Precedence
//!
//! An explicit `--color=always` or `--color=never` is final. With
//! `--color=auto` (the default) the environment is consulted in this order:
//!
//! 1. `NO_COLOR` set to anything, even empty, turns decoration off
//!    (see https://no-color.org/).
//! 2. `CLICOLOR=0` turns it off.
//! 3. `CLICOLOR_FORCE` set to a non-empty value other than `0` turns it on,
//!    even when stdout is not a terminal.
//! 4. `TERM=dumb` turns it off.
//! 5. Otherwise stdout must be a terminal that supports colors.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use model_compose::output::{emoji, OutputConfig};
//!
//! let config = OutputConfig::from_env_and_flag("auto");
//! config.apply();
//!
//! // Falls back to "[OK]" in CI logs and pipes
//! println!("{} Composition completed", emoji(&config, "✅", "[OK]"));
//! ```

use std::env;

/// Whether output is decorated with colors and emojis.
///
/// The value is `Copy` so commands can take it by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConfig {
    /// Whether colors and emojis should be used in output.
    pub use_color: bool,
}

impl OutputConfig {
    /// Create an output configuration from environment and CLI flag.
    ///
    /// # Arguments
    /// * `color_flag` - value of `--color`, compared case-insensitively
    ///
    /// # Behavior
    /// - `always`: decoration on, whatever the environment says
    /// - `never`: decoration off
    /// - anything else: auto-detection, following the precedence in the
    ///   module documentation
    pub fn from_env_and_flag(color_flag: &str) -> Self {
        let use_color = match color_flag.to_lowercase().as_str() {
            "always" => true,
            "never" => false,
            _ => Self::detect_color_support(),
        };

        Self { use_color }
    }

    /// Auto-detection for `--color=auto`.
    fn detect_color_support() -> bool {
        // Presence is enough, the value is ignored
        if env::var_os("NO_COLOR").is_some() {
            return false;
        }

        if env::var("CLICOLOR").is_ok_and(|v| v == "0") {
            return false;
        }

        if env::var("CLICOLOR_FORCE").is_ok_and(|v| v != "0" && !v.is_empty()) {
            return true;
        }

        if env::var("TERM").is_ok_and(|v| v == "dumb") {
            return false;
        }

        console::Term::stdout().features().colors_supported()
    }

    /// Applies the choice to `console` styling.
    ///
    /// `console` otherwise runs its own detection per stream, which would let
    /// stderr log prefixes disagree with stdout markers. Call this before
    /// logging is initialized.
    pub fn apply(&self) {
        console::set_colors_enabled(self.use_color);
        console::set_colors_enabled_stderr(self.use_color);
    }

    #[cfg(test)]
    pub fn with_color() -> Self {
        Self { use_color: true }
    }

    #[cfg(test)]
    pub fn without_color() -> Self {
        Self { use_color: false }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self::from_env_and_flag("auto")
    }
}

/// Picks the decorated or the plain variant of a status marker.
///
/// # Arguments
/// * `config` - the output configuration of the run
/// * `emoji_str` - marker used when decoration is on
/// * `plain` - ASCII marker used otherwise, typically a bracketed word
///   such as `[OK]` so logs stay greppable
pub fn emoji<'a>(config: &OutputConfig, emoji_str: &'a str, plain: &'a str) -> &'a str {
    if config.use_color {
        emoji_str
    } else {
        plain
    }
}
