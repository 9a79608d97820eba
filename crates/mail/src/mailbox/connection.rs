//! IMAP connection abstraction
//!
//! [`ImapConnection`] is the small set of commands a [`super::MailboxSession`]
//! needs. The production implementation drives the `imap` crate over
//! native-tls; [`super::InMemoryServer`] implements the same trait for tests.

use std::net::TcpStream;

use ::imap::types::NameAttribute;
use log::debug;
use native_tls::TlsStream;

use crate::models::MailboxDescriptor;

/// Failure of a single IMAP command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// Server answered `NO` or `BAD`; the connection is still usable
    #[error("server rejected command: {0}")]
    Rejected(String),

    /// I/O, TLS, or parse failure; the connection must be abandoned
    #[error("transport failure: {0}")]
    Transport(String),
}

impl From<::imap::Error> for CommandError {
    fn from(err: ::imap::Error) -> Self {
        match err {
            ::imap::Error::No(msg) | ::imap::Error::Bad(msg) => Self::Rejected(msg),
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Commands issued on an open IMAP connection
pub trait ImapConnection {
    /// `AUTHENTICATE <mechanism>` with `initial_response` as the client answer
    fn authenticate(&mut self, mechanism: &str, initial_response: &[u8])
    -> Result<(), CommandError>;

    fn select(&mut self, mailbox: &str) -> Result<(), CommandError>;

    /// `SEARCH <criteria>`, returning sequence numbers in any order
    fn search(&mut self, criteria: &str) -> Result<Vec<u32>, CommandError>;

    /// `FETCH <id> RFC822`; `None` when the server sent no body
    fn fetch_rfc822(&mut self, id: u32) -> Result<Option<Vec<u8>>, CommandError>;

    /// `LIST "" *`
    fn list(&mut self) -> Result<Vec<MailboxDescriptor>, CommandError>;

    fn logout(&mut self) -> Result<(), CommandError>;
}

/// Opens connections to an IMAP server
pub trait Connector {
    type Connection: ImapConnection;

    fn connect(&self, host: &str, port: u16) -> Result<Self::Connection, CommandError>;
}

/// Implicit-TLS connector (port 993) using the platform TLS stack
#[derive(Debug, Clone, Copy, Default)]
pub struct TlsConnector;

impl Connector for TlsConnector {
    type Connection = TlsConnection;

    fn connect(&self, host: &str, port: u16) -> Result<TlsConnection, CommandError> {
        let tls = native_tls::TlsConnector::builder()
            .build()
            .map_err(|e| CommandError::Transport(format!("TLS setup failed: {}", e)))?;
        let client = ::imap::connect((host, port), host, &tls)
            .map_err(|e| CommandError::Transport(e.to_string()))?;
        debug!("Connected to {}:{}", host, port);
        Ok(TlsConnection {
            inner: Inner::Connected(client),
        })
    }
}

type Stream = TlsStream<TcpStream>;

enum Inner {
    Connected(::imap::Client<Stream>),
    Authenticated(::imap::Session<Stream>),
    /// Transient placeholder while the client is moved into a session
    Detached,
}

/// A TLS connection that is either pre- or post-authentication
pub struct TlsConnection {
    inner: Inner,
}

impl TlsConnection {
    fn session(&mut self) -> Result<&mut ::imap::Session<Stream>, CommandError> {
        match &mut self.inner {
            Inner::Authenticated(session) => Ok(session),
            _ => Err(CommandError::Transport("connection is not authenticated".to_string())),
        }
    }
}

/// Answers the first (empty) challenge with the prepared blob. Any later
/// challenge is Gmail's JSON error report, which must be acknowledged with an
/// empty response before the server sends its tagged `NO`.
struct InitialResponse(Vec<u8>);

impl ::imap::Authenticator for InitialResponse {
    type Response = Vec<u8>;

    fn process(&self, challenge: &[u8]) -> Self::Response {
        if challenge.is_empty() {
            self.0.clone()
        } else {
            debug!(
                "Authentication challenge: {}",
                String::from_utf8_lossy(challenge)
            );
            Vec::new()
        }
    }
}

impl ImapConnection for TlsConnection {
    fn authenticate(
        &mut self,
        mechanism: &str,
        initial_response: &[u8],
    ) -> Result<(), CommandError> {
        match std::mem::replace(&mut self.inner, Inner::Detached) {
            Inner::Connected(client) => {
                let auth = InitialResponse(initial_response.to_vec());
                match client.authenticate(mechanism, &auth) {
                    Ok(session) => {
                        self.inner = Inner::Authenticated(session);
                        Ok(())
                    }
                    Err((err, client)) => {
                        self.inner = Inner::Connected(client);
                        Err(err.into())
                    }
                }
            }
            other => {
                self.inner = other;
                Err(CommandError::Transport(
                    "connection is already authenticated".to_string(),
                ))
            }
        }
    }

    fn select(&mut self, mailbox: &str) -> Result<(), CommandError> {
        let mailbox = self.session()?.select(mailbox)?;
        debug!("Selected mailbox with {} messages", mailbox.exists);
        Ok(())
    }

    fn search(&mut self, criteria: &str) -> Result<Vec<u32>, CommandError> {
        let ids = self.session()?.search(criteria)?;
        Ok(ids.into_iter().collect())
    }

    fn fetch_rfc822(&mut self, id: u32) -> Result<Option<Vec<u8>>, CommandError> {
        let fetches = self.session()?.fetch(id.to_string(), "RFC822")?;
        Ok(fetches
            .iter()
            .find_map(|fetch| fetch.body())
            .map(<[u8]>::to_vec))
    }

    fn list(&mut self) -> Result<Vec<MailboxDescriptor>, CommandError> {
        let names = self.session()?.list(Some(""), Some("*"))?;
        Ok(names
            .iter()
            .map(|name| MailboxDescriptor {
                name: name.name().to_string(),
                delimiter: name.delimiter().map(str::to_string),
                attributes: name.attributes().iter().map(attribute_text).collect(),
            })
            .collect())
    }

    fn logout(&mut self) -> Result<(), CommandError> {
        match &mut self.inner {
            Inner::Authenticated(session) => session.logout().map_err(Into::into),
            // Unauthenticated clients are released by dropping the socket
            _ => Ok(()),
        }
    }
}

fn attribute_text(attribute: &NameAttribute<'_>) -> String {
    match attribute {
        NameAttribute::NoInferiors => "\\Noinferiors".to_string(),
        NameAttribute::NoSelect => "\\Noselect".to_string(),
        NameAttribute::Marked => "\\Marked".to_string(),
        NameAttribute::Unmarked => "\\Unmarked".to_string(),
        NameAttribute::Custom(text) => text.to_string(),
        #[allow(unreachable_patterns)]
        other => format!("{:?}", other),
    }
}
