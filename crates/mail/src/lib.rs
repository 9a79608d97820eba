//! mailfetch - latest Gmail message body over IMAP
//!
//! This crate provides:
//! - OAuth2 credential resolution (inline blob, token file, refresh,
//!   interactive grant) with persistence
//! - XOAUTH2 authentication and an IMAP session state machine
//! - Gmail `X-GM-RAW` search with charset-aware encoding
//! - MIME tree parsing and HTML body extraction
//!
//! Everything is synchronous; each operation blocks until the server
//! answers or the transport gives up.

pub mod auth;
pub mod config;
pub mod error;
pub mod fetch;
pub mod mailbox;
pub mod mime;
pub mod models;

pub use auth::{Credential, CredentialState, CredentialStore, GoogleOAuth};
pub use crate::config::{ClientSecrets, Settings};
pub use error::{MailError, Result};
pub use fetch::{fetch_latest_html, fetch_latest_html_with, list_mailboxes, list_mailboxes_with};
pub use mailbox::{InMemoryServer, MailboxSession, SearchQuery, SessionState};
pub use mime::{MimeNode, extract_first_html};
pub use models::MailboxDescriptor;
