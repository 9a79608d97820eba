//! OAuth2 credential model
//!
//! The serialized shape follows Google's "authorized user" JSON, so a token
//! produced by other Google tooling can be dropped into `token.json` or
//! `TOKEN_JSON_B64` as-is.

use anyhow::{Context, Result};
use base64::prelude::*;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Safety margin before `expiry` at which a token already counts as expired
const EXPIRY_MARGIN_SECS: i64 = 300;

/// A bearer token plus what is needed to refresh it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(
        rename = "token",
        alias = "access_token",
        default,
        deserialize_with = "null_as_empty"
    )]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
}

/// Outcome of inspecting a (possibly absent) credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// Usable as-is
    Valid,
    /// Past its expiry but carries a refresh token
    ExpiredRefreshable,
    /// Absent, tokenless, or expired without a refresh token
    MissingOrUnrefreshable,
}

impl CredentialState {
    /// Classify a credential at the given instant
    pub fn inspect(credential: Option<&Credential>, now: DateTime<Utc>) -> Self {
        match credential {
            Some(c) if c.is_valid_at(now) => Self::Valid,
            Some(c) if c.is_expired_at(now) && c.has_refresh_token() => Self::ExpiredRefreshable,
            _ => Self::MissingOrUnrefreshable,
        }
    }
}

impl Credential {
    /// Create a credential from a freshly issued token
    pub fn new(access_token: impl Into<String>, expiry: Option<DateTime<Utc>>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expiry,
            token_uri: None,
            client_id: None,
            client_secret: None,
            scopes: Vec::new(),
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// A credential without an expiry never expires
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .is_some_and(|expiry| expiry <= now + Duration::seconds(EXPIRY_MARGIN_SECS))
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && !self.is_expired_at(now)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn state(&self) -> CredentialState {
        CredentialState::inspect(Some(self), Utc::now())
    }

    /// Parse a credential from its JSON form
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse credential JSON")
    }

    /// Decode a base64-wrapped credential JSON (the `TOKEN_JSON_B64` form)
    ///
    /// Whitespace inside the blob is ignored, so wrapped output from
    /// `base64` without `-w0` still decodes.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = BASE64_STANDARD
            .decode(compact.as_bytes())
            .context("Inline credential is not valid base64")?;
        let json = String::from_utf8(bytes).context("Inline credential is not UTF-8")?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize credential")
    }
}

/// Google writes `"token": null` for credentials that were never used
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}
