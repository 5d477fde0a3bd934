//! # Authentication Pipeline
//!
//! Private sources are fetched by trying a fixed sequence of credential
//! providers until one is accepted:
//!
//! 1. **Anonymous**: no credentials at all.
//! 2. **HostCredentials**: stored credentials for `scheme://host`, shared by
//!    every repository on that host.
//! 3. **UrlCredentials**: stored credentials for the exact URL. When none are
//!    stored and the session is interactive, the user is asked and the answer
//!    is captured for persisting.
//! 4. **ManualPrompt**: a final interactive prompt, only in interactive mode.
//!
//! The pipeline only advances when an attempt reports that authentication was
//! required or refused. Any other failure is returned to the caller at once.
//!
//! Credentials captured interactively are kept in the `AuthSession` and
//! handed back to the caller, which persists them once at the end of a run.

use log::debug;

use crate::credentials::{CredentialStore, Credentials, Prompter};
use crate::error::{Error, Result};

/// One provider in the authentication pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStep {
    Anonymous,
    HostCredentials,
    UrlCredentials,
    ManualPrompt,
}

/// Order in which the providers are tried.
pub const AUTH_PIPELINE: [AuthStep; 4] = [
    AuthStep::Anonymous,
    AuthStep::HostCredentials,
    AuthStep::UrlCredentials,
    AuthStep::ManualPrompt,
];

/// What a provider decided for one URL.
#[derive(Debug)]
pub enum StepDecision {
    /// The provider has nothing to offer, move on.
    TryNext,
    /// Attempt the operation with these credentials.
    Use(Option<Credentials>),
    /// Stop the pipeline with an error.
    Fatal(Error),
}

/// Errors of an authenticated operation.
pub trait AuthFailure {
    /// Whether the failure means credentials are missing or were refused.
    fn is_auth_failure(&self) -> bool;
}

/// Why the pipeline did not produce a result.
#[derive(Debug)]
pub enum AuthOutcome<E> {
    /// The operation failed for a reason unrelated to authentication.
    Failed(E),
    /// Every provider was tried and none was accepted.
    Exhausted,
    /// A provider failed, e.g. the credential store is unreadable.
    Aborted(Error),
}

/// Derives the host-level lookup key, `scheme://host`.
///
/// The scheme defaults to `https` when the URL has none.
pub fn base_url(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw)
        .ok()
        .filter(|u| u.has_host())
        .or_else(|| url::Url::parse(&format!("https://{}", raw)).ok())?;

    let host = parsed.host_str()?;
    match parsed.port() {
        Some(port) => Some(format!("{}://{}:{}", parsed.scheme(), host, port)),
        None => Some(format!("{}://{}", parsed.scheme(), host)),
    }
}

/// State shared by every authenticated operation of one run.
pub struct AuthSession<'a> {
    store: &'a dyn CredentialStore,
    prompter: &'a dyn Prompter,
    interactive: bool,
    captured: Vec<Credentials>,
}

impl<'a> AuthSession<'a> {
    pub fn new(store: &'a dyn CredentialStore, prompter: &'a dyn Prompter, interactive: bool) -> Self {
        Self {
            store,
            prompter,
            interactive,
            captured: Vec::new(),
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Credentials entered by the user during this session.
    pub fn captured(&self) -> &[Credentials] {
        &self.captured
    }

    pub fn into_captured(self) -> Vec<Credentials> {
        self.captured
    }

    fn lookup(&self, url: &str) -> Result<Option<Credentials>> {
        if let Some(found) = self.captured.iter().rev().find(|c| c.url == url) {
            return Ok(Some(found.clone()));
        }
        self.store.get_for_url(url)
    }

    fn capture(&mut self, credentials: Credentials) {
        self.captured.retain(|c| c.url != credentials.url);
        self.captured.push(credentials);
    }

    fn prompt_and_capture(&mut self, url: &str) -> StepDecision {
        match self.prompter.prompt_credentials(url) {
            Ok(credentials) => {
                self.capture(credentials.clone());
                StepDecision::Use(Some(credentials))
            }
            Err(e) => StepDecision::Fatal(e),
        }
    }

    /// Asks one provider for credentials for `url`.
    pub fn decide(&mut self, step: AuthStep, url: &str) -> StepDecision {
        match step {
            AuthStep::Anonymous => StepDecision::Use(None),
            AuthStep::HostCredentials => {
                let Some(key) = base_url(url) else {
                    return StepDecision::TryNext;
                };
                match self.lookup(&key) {
                    Ok(Some(credentials)) => StepDecision::Use(Some(credentials)),
                    Ok(None) => StepDecision::TryNext,
                    Err(e) => StepDecision::Fatal(e),
                }
            }
            AuthStep::UrlCredentials => match self.lookup(url) {
                Ok(Some(credentials)) => StepDecision::Use(Some(credentials)),
                Ok(None) if self.interactive => self.prompt_and_capture(url),
                Ok(None) => StepDecision::TryNext,
                Err(e) => StepDecision::Fatal(e),
            },
            AuthStep::ManualPrompt => {
                if self.interactive {
                    self.prompt_and_capture(url)
                } else {
                    StepDecision::TryNext
                }
            }
        }
    }

    /// Runs `attempt` with each provider's credentials until it succeeds or
    /// fails for a reason other than authentication.
    pub fn run<T, E, F>(&mut self, url: &str, mut attempt: F) -> std::result::Result<T, AuthOutcome<E>>
    where
        E: AuthFailure,
        F: FnMut(Option<&Credentials>) -> std::result::Result<T, E>,
    {
        for step in AUTH_PIPELINE {
            let credentials = match self.decide(step, url) {
                StepDecision::TryNext => continue,
                StepDecision::Use(credentials) => credentials,
                StepDecision::Fatal(e) => return Err(AuthOutcome::Aborted(e)),
            };

            match attempt(credentials.as_ref()) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_auth_failure() => {
                    debug!("authentication step {:?} was rejected for {}", step, url);
                }
                Err(e) => return Err(AuthOutcome::Failed(e)),
            }
        }

        Err(AuthOutcome::Exhausted)
    }

    /// The error reported once the pipeline is exhausted for `url`.
    pub fn exhausted_error(&self, url: &str) -> Error {
        let hint = if self.interactive {
            None
        } else {
            Some("Re-run with --interactive to enter credentials".to_string())
        };
        Error::AuthenticationExhausted {
            url: url.to_string(),
            hint,
        }
    }
}
