//! Runtime settings for mail retrieval
//!
//! Settings come from environment variables, falling back to defaults that
//! point at Gmail's IMAP endpoint and the mailfetch config directory:
//!
//! | Variable                   | Meaning                                  |
//! |----------------------------|------------------------------------------|
//! | `MAIL_USER`                | IMAP username (required)                 |
//! | `TOKEN_JSON_B64`           | base64 credential JSON (optional)        |
//! | `MAILFETCH_TOKEN_FILE`     | persisted credential path                |
//! | `MAILFETCH_CLIENT_SECRETS` | OAuth client secrets path                |
//!
//! The client secrets file uses the Google Cloud Console format and is only
//! read when an interactive grant or a refresh needs the client identity.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::MailError;

/// Persisted credential filename in the mailfetch config directory
const TOKEN_FILE: &str = "token.json";

/// Client secrets filename in the mailfetch config directory
const CLIENT_SECRETS_FILE: &str = "credentials.json";

/// Environment variable carrying the inline credential blob
pub const INLINE_TOKEN_VAR: &str = "TOKEN_JSON_B64";

/// Environment variable carrying the IMAP username
pub const USER_VAR: &str = "MAIL_USER";

const TOKEN_FILE_VAR: &str = "MAILFETCH_TOKEN_FILE";
const CLIENT_SECRETS_VAR: &str = "MAILFETCH_CLIENT_SECRETS";

/// Everything one fetch or listing operation needs to know
#[derive(Debug, Clone)]
pub struct Settings {
    /// IMAP username, also the XOAUTH2 `user=` value
    pub username: String,
    pub host: String,
    pub port: u16,
    /// Mailbox selected before searching
    pub mailbox: String,
    /// Where the credential is persisted after refresh or grant
    pub token_path: PathBuf,
    /// Google Cloud Console client secrets
    pub client_secrets_path: PathBuf,
    /// Raw value of `TOKEN_JSON_B64`, if set
    pub inline_token: Option<String>,
    /// Fixed localhost port for the OAuth redirect
    pub callback_port: u16,
}

impl Settings {
    pub const DEFAULT_HOST: &'static str = "imap.gmail.com";
    pub const DEFAULT_PORT: u16 = 993;
    pub const DEFAULT_MAILBOX: &'static str = "INBOX";
    pub const DEFAULT_CALLBACK_PORT: u16 = 8080;

    /// Create settings for a user with every other value at its default
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            host: Self::DEFAULT_HOST.to_string(),
            port: Self::DEFAULT_PORT,
            mailbox: Self::DEFAULT_MAILBOX.to_string(),
            token_path: default_path(TOKEN_FILE),
            client_secrets_path: default_path(CLIENT_SECRETS_FILE),
            inline_token: None,
            callback_port: Self::DEFAULT_CALLBACK_PORT,
        }
    }

    /// Load settings from the process environment
    ///
    /// Fails with [`MailError::Config`] when `MAIL_USER` is unset or empty.
    pub fn from_env() -> Result<Self, MailError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through a variable lookup, as [`Settings::from_env`] does
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, MailError> {
        let username = lookup(USER_VAR)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| MailError::Config(format!("{} is not set", USER_VAR)))?;

        let mut settings = Self::new(username);
        settings.inline_token = lookup(INLINE_TOKEN_VAR);
        if let Some(path) = lookup(TOKEN_FILE_VAR) {
            settings.token_path = PathBuf::from(path);
        }
        if let Some(path) = lookup(CLIENT_SECRETS_VAR) {
            settings.client_secrets_path = PathBuf::from(path);
        }
        Ok(settings)
    }

    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    pub fn with_client_secrets_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.client_secrets_path = path.into();
        self
    }

    pub fn with_inline_token(mut self, encoded: impl Into<String>) -> Self {
        self.inline_token = Some(encoded.into());
        self
    }

    pub fn with_mailbox(mut self, mailbox: impl Into<String>) -> Self {
        self.mailbox = mailbox.into();
        self
    }
}

/// Path inside the config directory, or the working directory if there is none
fn default_path(filename: &str) -> PathBuf {
    config::config_path(filename).unwrap_or_else(|| PathBuf::from(filename))
}

/// OAuth client identity used by the grant and refresh flows
#[derive(Debug, Clone)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    /// Token endpoint declared by the file, if any
    pub token_uri: Option<String>,
}

/// Google Cloud Console credential file format (installed app)
#[derive(Deserialize)]
struct GoogleCredentialFile {
    installed: Option<InstalledCredentials>,
    web: Option<InstalledCredentials>,
}

#[derive(Deserialize)]
struct InstalledCredentials {
    client_id: String,
    client_secret: String,
    token_uri: Option<String>,
}

impl ClientSecrets {
    /// Load client secrets from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let creds: GoogleCredentialFile = config::load_json_file(path)?;
        Self::from_credential_file(creds)
            .with_context(|| format!("Invalid client secrets file: {}", path.display()))
    }

    /// Parse client secrets from a JSON string (Google Cloud Console format)
    pub fn from_json(json: &str) -> Result<Self> {
        let creds: GoogleCredentialFile =
            serde_json::from_str(json).context("Failed to parse client secrets JSON")?;
        Self::from_credential_file(creds)
    }

    fn from_credential_file(creds: GoogleCredentialFile) -> Result<Self> {
        // Support both "installed" (desktop) and "web" credential types
        let installed = creds
            .installed
            .or(creds.web)
            .context("Credentials file missing 'installed' or 'web' section")?;

        Ok(Self {
            client_id: installed.client_id,
            client_secret: installed.client_secret,
            token_uri: installed.token_uri,
        })
    }
}
