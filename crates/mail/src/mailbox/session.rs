//! One connect → authenticate → select → search → fetch → logout lifecycle
//!
//! A [`MailboxSession`] tracks which commands are legal. Commands issued in
//! the wrong state fail without touching the connection. A transport failure
//! moves the session to [`SessionState::Failed`] and abandons the connection.
//! Dropping the session closes it, so every exit path releases the server's
//! connection slot.

use log::{debug, info, warn};
use std::fmt;

use super::connection::{CommandError, Connector, ImapConnection};
use super::query::SearchQuery;
use crate::auth::xoauth2;
use crate::error::{MailError, Result};
use crate::models::MailboxDescriptor;

/// Lifecycle state of a [`MailboxSession`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Authenticated,
    /// Holds the selected mailbox name
    MailboxSelected(String),
    Closed,
    Failed,
}

impl SessionState {
    fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated | Self::MailboxSelected(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connected => write!(f, "connected"),
            Self::Authenticated => write!(f, "authenticated"),
            Self::MailboxSelected(name) => write!(f, "selected {}", name),
            Self::Closed => write!(f, "closed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// An IMAP session owned by a single operation
pub struct MailboxSession<C: ImapConnection> {
    connection: Option<C>,
    state: SessionState,
}

impl<C: ImapConnection> MailboxSession<C> {
    /// Create a session that has not connected yet
    pub fn new() -> Self {
        Self {
            connection: None,
            state: SessionState::Disconnected,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Open the connection. No retry on failure.
    pub fn connect<K>(&mut self, connector: &K, host: &str, port: u16) -> Result<()>
    where
        K: Connector<Connection = C>,
    {
        if self.state != SessionState::Disconnected {
            return Err(self.out_of_order("connect"));
        }
        match connector.connect(host, port) {
            Ok(connection) => {
                self.connection = Some(connection);
                self.state = SessionState::Connected;
                info!("Connected to {}:{}", host, port);
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Failed;
                Err(MailError::Connection(format!("{}:{}: {}", host, port, e)))
            }
        }
    }

    /// Authenticate with a prepared XOAUTH2 blob
    ///
    /// A rejected blob is reported as [`MailError::Auth`] and leaves the
    /// session connected; getting a new token is the caller's business.
    pub fn authenticate(&mut self, auth_blob: &[u8]) -> Result<()> {
        if self.state != SessionState::Connected {
            return Err(self.out_of_order("authenticate"));
        }
        self.run(
            |c| c.authenticate(xoauth2::MECHANISM, auth_blob),
            MailError::Auth,
        )?;
        self.state = SessionState::Authenticated;
        debug!("Authenticated with {}", xoauth2::MECHANISM);
        Ok(())
    }

    /// Select a mailbox; re-selecting from a selected state is allowed
    pub fn select_mailbox(&mut self, name: &str) -> Result<()> {
        if !self.state.is_authenticated() {
            return Err(self.out_of_order("select"));
        }
        self.run(|c| c.select(name), |msg| {
            MailError::Mailbox(format!("{}: {}", name, msg))
        })?;
        self.state = SessionState::MailboxSelected(name.to_string());
        Ok(())
    }

    /// Search the selected mailbox
    ///
    /// Identifiers come back in ascending order. No match is an empty list.
    pub fn search(&mut self, query: &SearchQuery) -> Result<Vec<u32>> {
        if !matches!(self.state, SessionState::MailboxSelected(_)) {
            return Err(self.out_of_order("search"));
        }
        let criteria = query.criteria();
        debug!("SEARCH {}", criteria);
        let mut ids = self.run(|c| c.search(&criteria), MailError::Fetch)?;
        ids.sort_unstable();
        ids.dedup();
        debug!("Search matched {} messages", ids.len());
        Ok(ids)
    }

    /// Fetch the full raw message with the highest identifier
    ///
    /// An empty identifier list is a [`MailError::Fetch`]; callers check for
    /// "no match" before getting here.
    pub fn fetch_highest(&mut self, ids: &[u32]) -> Result<Vec<u8>> {
        if !matches!(self.state, SessionState::MailboxSelected(_)) {
            return Err(self.out_of_order("fetch"));
        }
        let Some(&id) = ids.iter().max() else {
            return Err(MailError::Fetch("no message identifiers to fetch".to_string()));
        };
        debug!("Fetching message {}", id);
        self.run(|c| c.fetch_rfc822(id), MailError::Fetch)?
            .ok_or_else(|| MailError::Fetch(format!("message {} has no body", id)))
    }

    /// List mailboxes in server order; no selection needed
    pub fn list_mailboxes(&mut self) -> Result<Vec<MailboxDescriptor>> {
        if !self.state.is_authenticated() {
            return Err(self.out_of_order("list"));
        }
        self.run(|c| c.list(), MailError::Mailbox)
    }

    /// Log out and release the connection. Never fails; safe to call twice.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.logout() {
                warn!("Logout failed: {}", e);
            } else {
                debug!("Logged out");
            }
        }
        self.state = SessionState::Closed;
    }

    /// Run a command, mapping a rejection with `rejected` and moving to
    /// `Failed` on transport errors
    fn run<T>(
        &mut self,
        command: impl FnOnce(&mut C) -> Result<T, CommandError>,
        rejected: impl FnOnce(String) -> MailError,
    ) -> Result<T> {
        let Some(connection) = self.connection.as_mut() else {
            self.state = SessionState::Failed;
            return Err(MailError::Protocol("session has no connection".to_string()));
        };
        match command(connection) {
            Ok(value) => Ok(value),
            Err(CommandError::Rejected(msg)) => Err(rejected(msg)),
            Err(CommandError::Transport(msg)) => {
                warn!("Connection lost: {}", msg);
                // Nothing can be said on a broken connection, not even LOGOUT
                self.connection = None;
                self.state = SessionState::Failed;
                Err(MailError::Connection(msg))
            }
        }
    }

    fn out_of_order(&self, command: &str) -> MailError {
        MailError::Protocol(format!("cannot {} while {}", command, self.state))
    }
}

impl<C: ImapConnection> Default for MailboxSession<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ImapConnection> Drop for MailboxSession<C> {
    fn drop(&mut self) {
        self.close();
    }
}
