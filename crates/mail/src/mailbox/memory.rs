//! In-memory IMAP server for testing
//!
//! Implements [`Connector`] without any network access. Messages are stored
//! per mailbox; sequence numbers are 1-based positions. `SEARCH ALL` returns
//! every sequence number, other criteria return whatever was registered with
//! [`InMemoryServer::with_search_result`]. Every command is recorded in a
//! journal that tests can inspect after the session is gone.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::connection::{CommandError, Connector, ImapConnection};
use crate::models::MailboxDescriptor;

#[derive(Default)]
struct ServerState {
    mailboxes: Vec<(MailboxDescriptor, Vec<Vec<u8>>)>,
    searches: HashMap<String, Vec<u32>>,
    accepted_response: Option<Vec<u8>>,
    refuse_connections: bool,
    drop_on: Option<String>,
    journal: Vec<String>,
    connections: usize,
}

/// Scriptable IMAP server shared between a test and its connections
#[derive(Clone, Default)]
pub struct InMemoryServer {
    state: Arc<Mutex<ServerState>>,
}

impl InMemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mailbox holding `messages` in arrival order
    pub fn with_mailbox(self, name: &str, messages: Vec<Vec<u8>>) -> Self {
        self.lock()
            .mailboxes
            .push((MailboxDescriptor::new(name), messages));
        self
    }

    /// Answer `SEARCH <criteria>` with `ids`
    pub fn with_search_result(self, criteria: &str, ids: Vec<u32>) -> Self {
        self.lock().searches.insert(criteria.to_string(), ids);
        self
    }

    /// Only accept this exact authentication response
    pub fn accepting(self, initial_response: Vec<u8>) -> Self {
        self.lock().accepted_response = Some(initial_response);
        self
    }

    /// Fail every connection attempt
    pub fn refusing_connections(self) -> Self {
        self.lock().refuse_connections = true;
        self
    }

    /// Lose the connection when a command starting with `verb` is issued
    pub fn dropping_connection_on(self, verb: &str) -> Self {
        self.lock().drop_on = Some(verb.to_string());
        self
    }

    /// Commands received so far, in order
    pub fn journal(&self) -> Vec<String> {
        self.lock().journal.clone()
    }

    /// Number of connections opened so far
    pub fn connections(&self) -> usize {
        self.lock().connections
    }

    /// How many times `LOGOUT` was received
    pub fn logouts(&self) -> usize {
        self.lock()
            .journal
            .iter()
            .filter(|c| c.as_str() == "LOGOUT")
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        // A panicking test thread must not hide the journal from the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Connector for InMemoryServer {
    type Connection = InMemoryConnection;

    fn connect(&self, host: &str, port: u16) -> Result<InMemoryConnection, CommandError> {
        let mut state = self.lock();
        if state.refuse_connections {
            return Err(CommandError::Transport(format!(
                "connection to {}:{} refused",
                host, port
            )));
        }
        state.connections += 1;
        Ok(InMemoryConnection {
            server: self.clone(),
            authenticated: false,
            selected: None,
        })
    }
}

/// Connection handed out by [`InMemoryServer`]
pub struct InMemoryConnection {
    server: InMemoryServer,
    authenticated: bool,
    selected: Option<usize>,
}

impl InMemoryConnection {
    /// Journal the command and apply connection-drop scripting
    fn record(&self, command: String) -> Result<MutexGuard<'_, ServerState>, CommandError> {
        let mut state = self.server.lock();
        let dropped = state
            .drop_on
            .as_deref()
            .is_some_and(|verb| command.starts_with(verb));
        state.journal.push(command);
        if dropped {
            return Err(CommandError::Transport("connection reset by peer".to_string()));
        }
        Ok(state)
    }

    fn require_auth(&self) -> Result<(), CommandError> {
        if self.authenticated {
            Ok(())
        } else {
            Err(CommandError::Rejected("Command invalid in this state".to_string()))
        }
    }
}

impl ImapConnection for InMemoryConnection {
    fn authenticate(
        &mut self,
        mechanism: &str,
        initial_response: &[u8],
    ) -> Result<(), CommandError> {
        let state = self.record(format!("AUTHENTICATE {}", mechanism))?;
        let accepted = state
            .accepted_response
            .as_deref()
            .is_none_or(|expected| expected == initial_response);
        drop(state);

        if !accepted {
            return Err(CommandError::Rejected(
                "[AUTHENTICATIONFAILED] Invalid credentials (Failure)".to_string(),
            ));
        }
        self.authenticated = true;
        Ok(())
    }

    fn select(&mut self, mailbox: &str) -> Result<(), CommandError> {
        let state = self.record(format!("SELECT {}", mailbox))?;
        self.require_auth()?;
        let index = state
            .mailboxes
            .iter()
            .position(|(m, _)| m.name == mailbox)
            .ok_or_else(|| CommandError::Rejected(format!("[NONEXISTENT] Unknown Mailbox: {}", mailbox)))?;
        drop(state);
        self.selected = Some(index);
        Ok(())
    }

    fn search(&mut self, criteria: &str) -> Result<Vec<u32>, CommandError> {
        let state = self.record(format!("SEARCH {}", criteria))?;
        self.require_auth()?;
        let index = self
            .selected
            .ok_or_else(|| CommandError::Rejected("No mailbox selected".to_string()))?;

        if let Some(ids) = state.searches.get(criteria) {
            return Ok(ids.clone());
        }
        if criteria == "ALL" {
            let count = state.mailboxes[index].1.len() as u32;
            return Ok((1..=count).collect());
        }
        Ok(Vec::new())
    }

    fn fetch_rfc822(&mut self, id: u32) -> Result<Option<Vec<u8>>, CommandError> {
        let state = self.record(format!("FETCH {} RFC822", id))?;
        self.require_auth()?;
        let index = self
            .selected
            .ok_or_else(|| CommandError::Rejected("No mailbox selected".to_string()))?;

        let messages = &state.mailboxes[index].1;
        match (id as usize).checked_sub(1).and_then(|i| messages.get(i)) {
            Some(message) => Ok(Some(message.clone())),
            None => Err(CommandError::Rejected(format!("Invalid sequence set: {}", id))),
        }
    }

    fn list(&mut self) -> Result<Vec<MailboxDescriptor>, CommandError> {
        let state = self.record("LIST \"\" *".to_string())?;
        self.require_auth()?;
        Ok(state.mailboxes.iter().map(|(m, _)| m.clone()).collect())
    }

    fn logout(&mut self) -> Result<(), CommandError> {
        self.record("LOGOUT".to_string())?;
        self.authenticated = false;
        self.selected = None;
        Ok(())
    }
}
