//! Credential resolution and persistence
//!
//! Sources are tried in order (inline blob, then the token file) and the
//! first one that yields a credential wins. If that credential isn't usable
//! it is refreshed or replaced by a fresh interactive grant, and the result
//! is written back to the token file.
//!
//! The token file is not locked. Two processes refreshing at the same time
//! may race on the write; the last writer wins.

use chrono::Utc;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

use super::credential::{Credential, CredentialState};
use super::oauth::GoogleOAuth;
use crate::config::Settings;
use crate::error::{MailError, Result};

/// A place a credential may already be stored
pub trait CredentialSource {
    /// Short name used in log messages
    fn name(&self) -> &str;

    /// Load a credential, or `None` if this source has nothing usable.
    /// Failures are logged and reported as `None`.
    fn load(&self) -> Option<Credential>;
}

/// Exchanges a refresh token for a new access token
pub trait TokenRefresher {
    /// Update `credential` in place with a newly issued access token
    fn refresh(&self, credential: &mut Credential) -> anyhow::Result<()>;
}

/// Obtains a brand-new credential with the user's consent
pub trait AuthorizationGrant {
    fn authorize(&self) -> anyhow::Result<Credential>;
}

/// Credential carried inline as base64 JSON (usually `TOKEN_JSON_B64`)
pub struct InlineSource {
    encoded: Option<String>,
}

impl InlineSource {
    pub fn new(encoded: Option<String>) -> Self {
        Self { encoded }
    }
}

impl CredentialSource for InlineSource {
    fn name(&self) -> &str {
        "inline token"
    }

    fn load(&self) -> Option<Credential> {
        let encoded = self.encoded.as_deref().filter(|e| !e.trim().is_empty())?;
        match Credential::from_base64(encoded) {
            Ok(credential) => Some(credential),
            Err(e) => {
                warn!("Could not decode inline token, ignoring it: {:#}", e);
                None
            }
        }
    }
}

/// Credential persisted as JSON on disk
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CredentialSource for FileSource {
    fn name(&self) -> &str {
        "token file"
    }

    fn load(&self) -> Option<Credential> {
        if !self.path.exists() {
            debug!("No token file at {}", self.path.display());
            return None;
        }
        match config::load_json_file::<Credential>(&self.path) {
            Ok(credential) => Some(credential),
            Err(e) => {
                warn!("Ignoring unreadable token file: {:#}", e);
                None
            }
        }
    }
}

/// Resolves a usable credential from an ordered chain of sources
pub struct CredentialStore {
    sources: Vec<Box<dyn CredentialSource>>,
    token_path: PathBuf,
    refresher: Box<dyn TokenRefresher>,
    grant: Box<dyn AuthorizationGrant>,
}

impl CredentialStore {
    /// Create a store with no sources that persists to `token_path`
    pub fn new(
        token_path: impl Into<PathBuf>,
        refresher: Box<dyn TokenRefresher>,
        grant: Box<dyn AuthorizationGrant>,
    ) -> Self {
        Self {
            sources: Vec::new(),
            token_path: token_path.into(),
            refresher,
            grant,
        }
    }

    /// Standard chain: inline blob, then the token file, backed by Google OAuth
    pub fn from_settings(settings: &Settings) -> Self {
        let oauth = GoogleOAuth::new(settings.client_secrets_path.clone(), settings.callback_port);
        Self::new(
            settings.token_path.clone(),
            Box::new(oauth.clone()),
            Box::new(oauth),
        )
        .with_source(InlineSource::new(settings.inline_token.clone()))
        .with_source(FileSource::new(settings.token_path.clone()))
    }

    /// Append a source to the end of the chain
    pub fn with_source(mut self, source: impl CredentialSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// Resolve a credential that is valid right now
    ///
    /// Refresh or grant failure is fatal. Failure to persist the result is
    /// logged and otherwise ignored.
    pub fn resolve(&self) -> Result<Credential> {
        let loaded = self.load_first();

        let credential = match (CredentialState::inspect(loaded.as_ref(), Utc::now()), loaded) {
            (CredentialState::Valid, Some(credential)) => return Ok(credential),
            (CredentialState::ExpiredRefreshable, Some(mut credential)) => {
                info!("Access token expired, refreshing");
                self.refresher
                    .refresh(&mut credential)
                    .map_err(MailError::credential)?;
                credential
            }
            _ => {
                info!("No usable credential, starting interactive authorization");
                self.grant.authorize().map_err(MailError::credential)?
            }
        };

        if !credential.is_valid() {
            return Err(MailError::Credential(
                "token endpoint returned an unusable credential".to_string(),
            ));
        }

        self.persist(&credential);
        Ok(credential)
    }

    /// Delete the persisted credential, if any
    pub fn logout(&self) -> Result<()> {
        if self.token_path.exists() {
            fs::remove_file(&self.token_path).map_err(|e| {
                MailError::Config(format!(
                    "Failed to remove {}: {}",
                    self.token_path.display(),
                    e
                ))
            })?;
            info!("Removed {}", self.token_path.display());
        }
        Ok(())
    }

    fn load_first(&self) -> Option<Credential> {
        self.sources.iter().find_map(|source| {
            let credential = source.load()?;
            debug!("Loaded credential from {}", source.name());
            Some(credential)
        })
    }

    fn persist(&self, credential: &Credential) {
        match config::save_json_file(&self.token_path, credential) {
            Ok(()) => debug!("Saved credential to {}", self.token_path.display()),
            Err(e) => warn!("Could not persist refreshed credential: {:#}", e),
        }
    }
}
