//! # Credential Storage
//!
//! Credentials for private package sources are kept in a small YAML file and
//! looked up by URL. Two traits make the storage and the interactive prompt
//! replaceable:
//!
//! - **`CredentialStore`**: lookup, queueing, persisting and unlocking.
//! - **`Prompter`**: asks the user for a username and password.
//!
//! `FileCredentialStore` and `TerminalPrompter` are the implementations used
//! by the CLI. Tests substitute in-memory versions.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use dialoguer::{theme::ColorfulTheme, Input, Password};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A username/password pair bound to a URL.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(url: &str, username: &str, password: &str) -> Self {
        Self {
            url: url.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Storage of credentials keyed by URL.
pub trait CredentialStore {
    /// Returns the credentials stored for exactly `url`, if any.
    fn get_for_url(&self, url: &str) -> Result<Option<Credentials>>;

    /// Adds or replaces the entry for `credentials.url`. Not persisted until
    /// `save` is called.
    fn add_item(&mut self, credentials: Credentials) -> Result<()>;

    /// Persists all entries.
    fn save(&mut self) -> Result<()>;

    /// Makes the store readable. Called once before resolution starts.
    fn unlock(&mut self) -> Result<()>;
}

/// Asks the user for credentials.
pub trait Prompter {
    fn prompt_credentials(&self, url: &str) -> Result<Credentials>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    items: Vec<Credentials>,
}

/// A YAML file backed credential store.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    items: Vec<Credentials>,
    unlocked: bool,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            items: Vec::new(),
            unlocked: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(&self) -> Result<Vec<Credentials>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::Credentials {
                    message: format!("cannot read {}: {}", self.path.display(), e),
                })
            }
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let file: CredentialFile = serde_yaml::from_str(&content).map_err(|e| Error::Credentials {
            message: format!("malformed credential file {}: {}", self.path.display(), e),
        })?;
        Ok(file.items)
    }
}

impl CredentialStore for FileCredentialStore {
    fn get_for_url(&self, url: &str) -> Result<Option<Credentials>> {
        if !self.unlocked {
            return Err(Error::Credentials {
                message: "credential store is locked".to_string(),
            });
        }
        Ok(self.items.iter().find(|c| c.url == url).cloned())
    }

    fn add_item(&mut self, credentials: Credentials) -> Result<()> {
        self.items.retain(|c| c.url != credentials.url);
        self.items.push(credentials);
        Ok(())
    }

    fn save(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = CredentialFile {
            items: self.items.clone(),
        };
        let content = serde_yaml::to_string(&file)?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut handle = options.open(&self.path)?;

        // The mode only applies to new files; tighten an existing one before
        // writing the secrets.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            handle.set_permissions(fs::Permissions::from_mode(0o600))?;
        }

        handle.write_all(content.as_bytes())?;
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        if !self.unlocked {
            let mut stored = self.read_file()?;
            // Entries added before unlocking take precedence.
            stored.retain(|s| !self.items.iter().any(|c| c.url == s.url));
            stored.append(&mut self.items);
            self.items = stored;
            self.unlocked = true;
        }
        Ok(())
    }
}

/// Prompts on the terminal with dialoguer.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn prompt_credentials(&self, url: &str) -> Result<Credentials> {
        let theme = ColorfulTheme::default();
        let prompt_error = |e: dialoguer::Error| Error::Credentials {
            message: format!("cannot prompt for credentials: {}", e),
        };

        eprintln!("Please enter credentials for {}", url);
        let username: String = Input::with_theme(&theme)
            .with_prompt("Username")
            .interact_text()
            .map_err(prompt_error)?;
        let password = Password::with_theme(&theme)
            .with_prompt("Password")
            .interact()
            .map_err(prompt_error)?;

        Ok(Credentials::new(url, &username, &password))
    }
}
