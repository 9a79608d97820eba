//! IMAP mailbox access
//!
//! This module provides:
//! - Search criteria built from Gmail filters (`X-GM-RAW`)
//! - The session state machine driving one retrieval
//! - The connection trait, its TLS implementation, and an in-memory server

mod connection;
mod memory;
mod query;
mod session;

pub use connection::{CommandError, Connector, ImapConnection, TlsConnection, TlsConnector};
pub use memory::{InMemoryConnection, InMemoryServer};
pub use query::SearchQuery;
pub use session::{MailboxSession, SessionState};
