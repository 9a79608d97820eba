//! XOAUTH2 SASL initial response
//!
//! Format: `user={username}\x01auth=Bearer {token}\x01\x01`

/// SASL mechanism name sent with `AUTHENTICATE`
pub const MECHANISM: &str = "XOAUTH2";

/// Build the XOAUTH2 blob for a user and access token
///
/// The IMAP layer base64-encodes this on the wire; the bytes here are the
/// unencoded payload, with no trailing newline.
pub fn encode(username: &str, access_token: &str) -> Vec<u8> {
    format!("user={}\x01auth=Bearer {}\x01\x01", username, access_token).into_bytes()
}
