//! Error taxonomy for mail retrieval
//!
//! Every failure that prevents an operation from completing is surfaced as
//! one of these kinds. Recoverable conditions (an undecodable inline token,
//! a missing token file, bytes that don't fit a charset) are absorbed where
//! they occur and never show up here. Nothing in this crate retries.

/// Errors surfaced by credential resolution and mailbox operations
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// No usable bearer token could be produced
    #[error("No usable credential: {0}")]
    Credential(String),

    /// Network or TLS failure talking to the mail server
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The server rejected the token-auth blob
    #[error("Authentication rejected: {0}")]
    Auth(String),

    /// Mailbox missing, inaccessible, or could not be listed
    #[error("Mailbox error: {0}")]
    Mailbox(String),

    /// Search or fetch failed, or there was nothing to fetch
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// Required settings are missing or unreadable
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session driven out of order
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl MailError {
    /// Build a credential error from an `anyhow` chain, keeping every cause
    pub(crate) fn credential(err: anyhow::Error) -> Self {
        Self::Credential(format!("{:#}", err))
    }
}

/// Result alias used throughout the crate
pub type Result<T, E = MailError> = std::result::Result<T, E>;
