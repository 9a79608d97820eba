//! Google OAuth2 token exchange
//!
//! Implements the refresh-token exchange and the installed-app authorization
//! code flow. The flow listens on a fixed localhost port for the redirect.
//! Uses synchronous HTTP (ureq) to stay executor-agnostic.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::Deserialize;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::PathBuf;

use super::credential::Credential;
use super::store::{AuthorizationGrant, TokenRefresher};
use crate::config::ClientSecrets;

/// Token response from Google
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
    #[allow(dead_code)]
    token_type: String,
}

/// OAuth2 client for Google accounts, backed by a client secrets file
#[derive(Debug, Clone)]
pub struct GoogleOAuth {
    client_secrets_path: PathBuf,
    callback_port: u16,
}

impl GoogleOAuth {
    const AUTH_URL: &'static str = "https://accounts.google.com/o/oauth2/v2/auth";
    const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    /// Full IMAP access requires the mail.google.com scope
    pub const MAIL_SCOPE: &'static str = "https://mail.google.com/";

    pub fn new(client_secrets_path: PathBuf, callback_port: u16) -> Self {
        Self {
            client_secrets_path,
            callback_port,
        }
    }

    fn client_secrets(&self) -> Result<ClientSecrets> {
        ClientSecrets::from_file(&self.client_secrets_path)
    }

    /// Wait for the browser redirect and return the authorization code
    fn wait_for_callback(&self, listener: TcpListener) -> Result<String> {
        let (mut stream, _) = listener.accept().context("Failed to accept connection")?;

        let mut reader = BufReader::new(&stream);
        let mut request_line = String::new();
        reader
            .read_line(&mut request_line)
            .context("Failed to read request")?;

        let result = parse_callback(&request_line);

        let (status, body) = if result.is_ok() {
            ("200 OK", "Authentication successful! You can close this window.")
        } else {
            ("400 Bad Request", "Authentication failed. Please try again.")
        };
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n<html><body><h1>{}</h1></body></html>",
            status, body
        );
        stream.write_all(response.as_bytes()).ok();

        result
    }

    fn exchange_code(
        &self,
        secrets: &ClientSecrets,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse> {
        let token_url = secrets.token_uri.as_deref().unwrap_or(Self::TOKEN_URL);
        let mut response = ureq::post(token_url)
            .send_form([
                ("client_id", secrets.client_id.as_str()),
                ("client_secret", secrets.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri),
            ])
            .context("Failed to exchange authorization code")?;

        response
            .body_mut()
            .read_json()
            .context("Failed to parse token response")
    }
}

impl TokenRefresher for GoogleOAuth {
    /// Refresh using the client identity stored in the credential, falling
    /// back to the client secrets file for credentials that don't carry one
    fn refresh(&self, credential: &mut Credential) -> Result<()> {
        let refresh_token = credential
            .refresh_token
            .clone()
            .context("Credential has no refresh token")?;

        let (client_id, client_secret) =
            match (credential.client_id.clone(), credential.client_secret.clone()) {
                (Some(id), Some(secret)) => (id, secret),
                _ => {
                    let secrets = self.client_secrets()?;
                    (secrets.client_id, secrets.client_secret)
                }
            };
        let token_url = credential
            .token_uri
            .clone()
            .unwrap_or_else(|| Self::TOKEN_URL.to_string());

        debug!("Refreshing access token at {}", token_url);
        let response = ureq::post(token_url.as_str())
            .send_form([
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .context("Failed to refresh access token")?;

        let token: TokenResponse = response
            .into_body()
            .read_json()
            .context("Failed to parse refresh token response")?;

        apply_token_response(credential, token, Utc::now());
        Ok(())
    }
}

impl AuthorizationGrant for GoogleOAuth {
    fn authorize(&self) -> Result<Credential> {
        let secrets = self.client_secrets()?;

        // Step 1: Bind the callback port before sending the user anywhere
        let listener = TcpListener::bind(("127.0.0.1", self.callback_port))
            .with_context(|| format!("Could not bind callback port {}", self.callback_port))?;
        let redirect_uri = format!("http://localhost:{}/", self.callback_port);

        // Step 2: Build authorization URL
        let auth_url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
            Self::AUTH_URL,
            urlencoding::encode(&secrets.client_id),
            urlencoding::encode(&redirect_uri),
            urlencoding::encode(Self::MAIL_SCOPE),
        );

        info!("Opening browser for Google authorization");
        info!("If the browser doesn't open, visit: {}", auth_url);
        if let Err(e) = open::that(&auth_url) {
            warn!("Failed to open browser: {}. Please open the URL manually.", e);
        }

        // Step 3: Wait for callback with authorization code
        let code = self.wait_for_callback(listener)?;

        // Step 4: Exchange code for tokens
        let token = self.exchange_code(&secrets, &code, &redirect_uri)?;
        info!("Authorization successful");

        let mut credential = Credential::new(String::new(), None);
        credential.client_id = Some(secrets.client_id);
        credential.client_secret = Some(secrets.client_secret);
        credential.token_uri = Some(
            secrets
                .token_uri
                .unwrap_or_else(|| Self::TOKEN_URL.to_string()),
        );
        credential.scopes = vec![Self::MAIL_SCOPE.to_string()];
        apply_token_response(&mut credential, token, Utc::now());
        Ok(credential)
    }
}

/// Fold a token endpoint response into a credential
///
/// Google omits the refresh token on refresh; the existing one is kept.
fn apply_token_response(credential: &mut Credential, token: TokenResponse, now: DateTime<Utc>) {
    credential.access_token = token.access_token;
    credential.expiry = token.expires_in.map(|secs| now + Duration::seconds(secs));
    if let Some(refresh_token) = token.refresh_token {
        credential.refresh_token = Some(refresh_token);
    }
    if let Some(scope) = token.scope {
        credential.scopes = scope.split_whitespace().map(str::to_string).collect();
    }
}

/// Extract the authorization code from the redirect's request line
///
/// Format: `GET /?code=AUTH_CODE&scope=... HTTP/1.1`
fn parse_callback(request_line: &str) -> Result<String> {
    let query = request_line
        .split_whitespace()
        .nth(1)
        .and_then(|path| path.split_once('?'))
        .map(|(_, query)| query)
        .unwrap_or_default();

    let param = |name: &str| {
        query.split('&').find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == name).then(|| {
                urlencoding::decode(value)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| value.to_string())
            })
        })
    };

    if let Some(err) = param("error") {
        anyhow::bail!("OAuth error: {}", err);
    }
    param("code").context("No authorization code received")
}
