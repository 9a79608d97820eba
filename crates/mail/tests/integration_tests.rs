//! Integration tests for the mailfetch crate
//!
//! These tests run the complete flow (credential resolution, XOAUTH2,
//! search, fetch, extraction) against the in-memory IMAP server.

use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

use base64::prelude::*;
use chrono::{Duration, Utc};
use mailfetch::auth::{
    AuthorizationGrant, FileSource, InlineSource, TokenRefresher, xoauth2,
};
use mailfetch::{
    Credential, CredentialStore, InMemoryServer, MailError, Settings, fetch_latest_html_with,
    list_mailboxes_with,
};
use tempfile::TempDir;

const USER: &str = "someone@gmail.com";

/// Counts calls and hands out a fixed token
struct CountingGrant {
    calls: Rc<Cell<u32>>,
    token: &'static str,
}

impl AuthorizationGrant for CountingGrant {
    fn authorize(&self) -> anyhow::Result<Credential> {
        self.calls.set(self.calls.get() + 1);
        Ok(Credential::new(self.token, Some(Utc::now() + Duration::hours(1)))
            .with_refresh_token("refresh-from-grant"))
    }
}

struct CountingRefresher {
    calls: Rc<Cell<u32>>,
    token: &'static str,
}

impl TokenRefresher for CountingRefresher {
    fn refresh(&self, credential: &mut Credential) -> anyhow::Result<()> {
        self.calls.set(self.calls.get() + 1);
        credential.access_token = self.token.to_string();
        credential.expiry = Some(Utc::now() + Duration::hours(1));
        Ok(())
    }
}

struct Harness {
    _dir: TempDir,
    settings: Settings,
    refreshes: Rc<Cell<u32>>,
    grants: Rc<Cell<u32>>,
}

impl Harness {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let settings = Settings::new(USER).with_token_path(dir.path().join("token.json"));
        Self {
            _dir: dir,
            settings,
            refreshes: Rc::new(Cell::new(0)),
            grants: Rc::new(Cell::new(0)),
        }
    }

    fn token_path(&self) -> &Path {
        &self.settings.token_path
    }

    /// Store with the standard inline-then-file chain and counting collaborators
    fn store(&self) -> CredentialStore {
        CredentialStore::new(
            self.token_path(),
            Box::new(CountingRefresher {
                calls: self.refreshes.clone(),
                token: "refreshed-token",
            }),
            Box::new(CountingGrant {
                calls: self.grants.clone(),
                token: "granted-token",
            }),
        )
        .with_source(InlineSource::new(self.settings.inline_token.clone()))
        .with_source(FileSource::new(self.token_path()))
    }

    fn write_token(&self, credential: &Credential) {
        std::fs::write(self.token_path(), credential.to_json().unwrap()).unwrap();
    }
}

fn html_message(body: &str) -> Vec<u8> {
    format!(
        "From: reservation@example.com\r\nSubject: Booking\r\nContent-Type: text/html; charset=utf-8\r\n\r\n{}",
        body
    )
    .into_bytes()
}

fn server_for(token: &str, messages: Vec<Vec<u8>>) -> InMemoryServer {
    InMemoryServer::new()
        .with_mailbox("INBOX", messages)
        .with_mailbox("[Gmail]/Sent Mail", vec![])
        .accepting(xoauth2::encode(USER, token))
}

#[test]
fn test_fetch_latest_html_end_to_end() {
    let harness = Harness::new();
    let server = server_for(
        "granted-token",
        vec![html_message("<p>old</p>"), html_message("<p>new</p>")],
    );

    let html = fetch_latest_html_with(&server, &harness.store(), &harness.settings, None).unwrap();

    assert_eq!(html.as_deref(), Some("<p>new</p>"));
    assert_eq!(harness.grants.get(), 1);
    assert_eq!(
        server.journal(),
        vec![
            "AUTHENTICATE XOAUTH2",
            "SELECT INBOX",
            "SEARCH ALL",
            "FETCH 2 RFC822",
            "LOGOUT"
        ]
    );
}

#[test]
fn test_filter_search_fetches_highest_match() {
    let harness = Harness::new();
    let server = server_for(
        "granted-token",
        vec![
            html_message("<p>one</p>"),
            html_message("<p>two</p>"),
            html_message("<p>three</p>"),
        ],
    )
    .with_search_result("X-GM-RAW \"from:(reservation@example.com)\"", vec![2, 1]);

    let html = fetch_latest_html_with(
        &server,
        &harness.store(),
        &harness.settings,
        Some("from:(reservation@example.com)"),
    )
    .unwrap();

    assert_eq!(html.as_deref(), Some("<p>two</p>"));
}

#[test]
fn test_no_match_is_not_an_error() {
    let harness = Harness::new();
    let server = server_for("granted-token", vec![html_message("<p>x</p>")]);

    let html = fetch_latest_html_with(
        &server,
        &harness.store(),
        &harness.settings,
        Some("from:(nobody@example.invalid)"),
    )
    .unwrap();

    assert_eq!(html, None);
    let journal = server.journal();
    assert!(journal.contains(&"SEARCH X-GM-RAW \"from:(nobody@example.invalid)\"".to_string()));
    assert!(!journal.iter().any(|c| c.starts_with("FETCH")));
    assert_eq!(server.logouts(), 1);
}

#[test]
fn test_plain_text_only_message_yields_none() {
    let harness = Harness::new();
    let plain = b"Subject: hi\r\nContent-Type: text/plain\r\n\r\nonly text".to_vec();
    let server = server_for("granted-token", vec![plain]);

    let html = fetch_latest_html_with(&server, &harness.store(), &harness.settings, None).unwrap();
    assert_eq!(html, None);
}

#[test]
fn test_invalid_utf8_body_is_replaced() {
    let harness = Harness::new();
    let raw = b"Content-Type: text/html\r\n\r\n<p>\xFF</p>".to_vec();
    let server = server_for("granted-token", vec![raw]);

    let html = fetch_latest_html_with(&server, &harness.store(), &harness.settings, None)
        .unwrap()
        .unwrap();
    assert!(html.contains("<p>\u{FFFD}</p>"), "{:?}", html);
}

#[test]
fn test_cached_credential_skips_grant_on_second_resolve() {
    let harness = Harness::new();
    let store = harness.store();

    let first = store.resolve().unwrap();
    let second = store.resolve().unwrap();

    assert_eq!(harness.grants.get(), 1);
    assert_eq!(first.access_token, second.access_token);
}

#[test]
fn test_refreshed_credential_round_trips_through_file() {
    let harness = Harness::new();
    harness.write_token(
        &Credential::new("stale-token", Some(Utc::now() - Duration::hours(2)))
            .with_refresh_token("refresh"),
    );

    let refreshed = harness.store().resolve().unwrap();
    assert_eq!(refreshed.access_token, "refreshed-token");
    assert_eq!(harness.refreshes.get(), 1);

    // A fresh store reading only the file sees the same token
    let reread = harness.store().resolve().unwrap();
    assert_eq!(reread.access_token, refreshed.access_token);
    assert_eq!(reread.refresh_token.as_deref(), Some("refresh"));
    assert_eq!(harness.refreshes.get(), 1);
    assert_eq!(harness.grants.get(), 0);
}

#[test]
fn test_inline_token_takes_precedence_over_file() {
    let mut harness = Harness::new();
    harness.write_token(&Credential::new("file-token", Some(Utc::now() + Duration::hours(1))));
    let inline = Credential::new("inline-token", Some(Utc::now() + Duration::hours(1)));
    harness.settings = harness
        .settings
        .clone()
        .with_inline_token(BASE64_STANDARD.encode(inline.to_json().unwrap()));

    let resolved = harness.store().resolve().unwrap();
    assert_eq!(resolved.access_token, "inline-token");
}

#[test]
fn test_bad_inline_token_falls_through_to_file() {
    let mut harness = Harness::new();
    harness.write_token(&Credential::new("file-token", Some(Utc::now() + Duration::hours(1))));
    harness.settings = harness.settings.clone().with_inline_token("this is not base64!");

    let resolved = harness.store().resolve().unwrap();
    assert_eq!(resolved.access_token, "file-token");
    assert_eq!(harness.grants.get(), 0);
}

#[test]
fn test_rejected_token_surfaces_auth_error_and_logs_out() {
    let harness = Harness::new();
    let server = server_for("some-other-token", vec![html_message("<p>x</p>")]);

    let err = fetch_latest_html_with(&server, &harness.store(), &harness.settings, None)
        .unwrap_err();

    assert!(matches!(err, MailError::Auth(_)));
    assert_eq!(server.journal(), vec!["AUTHENTICATE XOAUTH2", "LOGOUT"]);
}

#[test]
fn test_missing_mailbox_is_mailbox_error() {
    let harness = Harness::new();
    let server = server_for("granted-token", vec![]);
    let settings = harness.settings.clone().with_mailbox("Receipts");

    let err = fetch_latest_html_with(&server, &harness.store(), &settings, None).unwrap_err();

    assert!(matches!(err, MailError::Mailbox(_)));
    // The session was still closed on the error path
    assert_eq!(server.logouts(), 1);
}

#[test]
fn test_connection_failure() {
    let harness = Harness::new();
    let server = server_for("granted-token", vec![]).refusing_connections();

    let err = fetch_latest_html_with(&server, &harness.store(), &harness.settings, None)
        .unwrap_err();
    assert!(matches!(err, MailError::Connection(_)));
}

#[test]
fn test_list_mailboxes() {
    let harness = Harness::new();
    let server = server_for("granted-token", vec![]);

    let mailboxes = list_mailboxes_with(&server, &harness.store(), &harness.settings).unwrap();

    let names: Vec<&str> = mailboxes.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["INBOX", "[Gmail]/Sent Mail"]);
    assert_eq!(
        server.journal(),
        vec!["AUTHENTICATE XOAUTH2", "LIST \"\" *", "LOGOUT"]
    );
}

#[test]
fn test_utf8_filter_end_to_end() {
    let harness = Harness::new();
    let server = server_for("granted-token", vec![html_message("<p>été</p>")])
        .with_search_result("CHARSET UTF-8 X-GM-RAW \"subject:été\"", vec![1]);

    let html = fetch_latest_html_with(
        &server,
        &harness.store(),
        &harness.settings,
        Some("subject:été"),
    )
    .unwrap();

    assert_eq!(html.as_deref(), Some("<p>été</p>"));
}

#[test]
fn test_filter_with_line_break_is_refused_before_connecting() {
    let harness = Harness::new();
    let server = server_for("granted-token", vec![html_message("<p>x</p>")]);

    let err = fetch_latest_html_with(
        &server,
        &harness.store(),
        &harness.settings,
        Some("subject:x\r\nA1 DELETE INBOX"),
    )
    .unwrap_err();

    assert!(matches!(err, MailError::Fetch(_)));
    assert_eq!(server.connections(), 0);
    assert!(server.journal().is_empty());
    assert_eq!(harness.grants.get(), 0);
}

#[test]
fn test_multi_phrase_filter_is_sent_as_one_string() {
    let harness = Harness::new();
    let server = server_for(
        "granted-token",
        vec![html_message("<p>one</p>"), html_message("<p>two</p>")],
    )
    .with_search_result("X-GM-RAW \"\\\"a b\\\" OR \\\"c d\\\"\"", vec![1]);

    let html = fetch_latest_html_with(
        &server,
        &harness.store(),
        &harness.settings,
        Some("\"a b\" OR \"c d\""),
    )
    .unwrap();

    assert_eq!(html.as_deref(), Some("<p>one</p>"));
}
