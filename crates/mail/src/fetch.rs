//! Caller-facing operations
//!
//! Each call resolves its own credential and owns its own session; nothing is
//! shared between calls except the token file.

use log::info;

use crate::auth::{Credential, CredentialStore, xoauth2};
use crate::config::Settings;
use crate::error::{MailError, Result};
use crate::mailbox::{Connector, MailboxSession, SearchQuery, TlsConnector};
use crate::mime;
use crate::models::MailboxDescriptor;

/// HTML body of the most recent message matching a Gmail filter
///
/// `Ok(None)` when nothing matches or the newest match has no HTML part.
pub fn fetch_latest_html(settings: &Settings, filter: Option<&str>) -> Result<Option<String>> {
    let store = CredentialStore::from_settings(settings);
    fetch_latest_html_with(&TlsConnector, &store, settings, filter)
}

/// Every mailbox (Gmail label) visible to the user, in server order
pub fn list_mailboxes(settings: &Settings) -> Result<Vec<MailboxDescriptor>> {
    let store = CredentialStore::from_settings(settings);
    list_mailboxes_with(&TlsConnector, &store, settings)
}

/// [`fetch_latest_html`] with explicit collaborators
pub fn fetch_latest_html_with<K: Connector>(
    connector: &K,
    store: &CredentialStore,
    settings: &Settings,
    filter: Option<&str>,
) -> Result<Option<String>> {
    let query = SearchQuery::new(filter)?;
    let credential = store.resolve()?;
    let mut session = open_session(connector, settings, &credential)?;

    session.select_mailbox(&settings.mailbox)?;
    let ids = session.search(&query)?;
    if ids.is_empty() {
        info!("No message matched the filter");
        session.close();
        return Ok(None);
    }

    let raw = session.fetch_highest(&ids)?;
    session.close();

    let html = mime::extract_first_html(&raw);
    if html.is_none() {
        info!("Latest matching message has no HTML body");
    }
    Ok(html)
}

/// [`list_mailboxes`] with explicit collaborators
pub fn list_mailboxes_with<K: Connector>(
    connector: &K,
    store: &CredentialStore,
    settings: &Settings,
) -> Result<Vec<MailboxDescriptor>> {
    let credential = store.resolve()?;
    let mut session = open_session(connector, settings, &credential)?;
    let mailboxes = session.list_mailboxes()?;
    session.close();
    Ok(mailboxes)
}

/// Connect and authenticate; the returned session logs out when dropped
fn open_session<K: Connector>(
    connector: &K,
    settings: &Settings,
    credential: &Credential,
) -> Result<MailboxSession<K::Connection>> {
    if !credential.is_valid() {
        return Err(MailError::Credential(
            "refusing to authenticate with an expired or empty token".to_string(),
        ));
    }
    let mut session = MailboxSession::new();
    session.connect(connector, &settings.host, settings.port)?;
    session.authenticate(&xoauth2::encode(&settings.username, &credential.access_token))?;
    Ok(session)
}
