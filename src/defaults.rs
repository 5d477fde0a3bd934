//! Default locations used by model-compose.
//!
//! Working directories are resolved relative to the composition root, the
//! credential file lives in the user's configuration directory.

use std::env;
use std::path::{Path, PathBuf};

/// Reserved folder for internal state, never merged from the baseline.
pub const RESERVED_DIR: &str = ".plasma";

/// Environment variable overriding the credential file location.
pub const CREDENTIALS_ENV: &str = "MODEL_COMPOSE_CREDENTIALS";

/// Default packages cache, relative to the working directory.
pub fn default_packages_dir(working_dir: &Path) -> PathBuf {
    working_dir.join(RESERVED_DIR).join("model/compose/packages")
}

/// Default merged output directory, relative to the working directory.
pub fn default_output_dir(working_dir: &Path) -> PathBuf {
    working_dir.join(RESERVED_DIR).join("model/compose/merged")
}

/// Returns the credential file path.
///
/// Uses `MODEL_COMPOSE_CREDENTIALS` when set, otherwise the platform config
/// directory:
/// - Linux: `~/.config/model-compose/credentials.yaml`
/// - macOS: `~/Library/Application Support/model-compose/credentials.yaml`
/// - Windows: `{FOLDERID_RoamingAppData}\model-compose\credentials.yaml`
///
/// Falls back to `.model-compose` in the current directory if the platform
/// config directory cannot be determined.
pub fn default_credentials_path() -> PathBuf {
    if let Some(path) = env::var_os(CREDENTIALS_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }

    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".model-compose"))
        .join("model-compose")
        .join("credentials.yaml")
}
