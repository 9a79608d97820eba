//! HTML body extraction
//!
//! Decoding never fails: unknown charsets fall back to UTF-8 and bytes that
//! don't decode become U+FFFD. `us-ascii` is strict: the WHATWG label table
//! maps it to windows-1252, so it is handled here and any byte above 0x7F
//! becomes U+FFFD.

use log::debug;

use super::tree::MimeNode;

/// Media type of the part we're after
pub const HTML_MEDIA_TYPE: &str = "text/html";

/// Return the first `text/html` leaf of a raw message, decoded to text
///
/// `None` when the message has no HTML part or can't be parsed at all;
/// plain-text-only mail is a normal outcome, not an error.
pub fn extract_first_html(raw: &[u8]) -> Option<String> {
    let tree = match MimeNode::parse(raw) {
        Ok(tree) => tree,
        Err(e) => {
            debug!("Could not parse message: {}", e);
            return None;
        }
    };
    first_html(&tree)
}

/// First HTML leaf of an already-built tree, in pre-order
pub fn first_html(tree: &MimeNode) -> Option<String> {
    tree.find_first(&|node| node.is_leaf() && node.content_type == HTML_MEDIA_TYPE)
        .map(|node| decode_payload(&node.payload, node.charset.as_deref()))
}

/// Decode text with its declared charset, UTF-8 when absent or unknown
pub fn decode_payload(payload: &[u8], charset: Option<&str>) -> String {
    if let Some(label) = charset {
        if is_us_ascii(label) {
            return payload
                .iter()
                .map(|&b| if b.is_ascii() { char::from(b) } else { '\u{FFFD}' })
                .collect();
        }
        match charset::Charset::for_label(label.trim().as_bytes()) {
            Some(encoding) => {
                let (text, had_errors) = encoding.decode_without_bom_handling(payload);
                if had_errors {
                    debug!("Replaced undecodable bytes in {} payload", label);
                }
                return text.into_owned();
            }
            None => debug!("Unknown charset {:?}, decoding as UTF-8", label),
        }
    }
    String::from_utf8_lossy(payload).into_owned()
}

fn is_us_ascii(label: &str) -> bool {
    let label = label.trim();
    label.eq_ignore_ascii_case("us-ascii") || label.eq_ignore_ascii_case("ascii")
}
