//! OAuth2 credentials for IMAP access
//!
//! This module provides:
//! - The credential model and its validity rules
//! - Resolution of a usable credential from inline, file, refresh, and
//!   interactive-grant sources
//! - Google's token endpoint client
//! - The XOAUTH2 wire blob

mod credential;
mod oauth;
mod store;
pub mod xoauth2;

pub use credential::{Credential, CredentialState};
pub use oauth::GoogleOAuth;
pub use store::{
    AuthorizationGrant, CredentialSource, CredentialStore, FileSource, InlineSource,
    TokenRefresher,
};
