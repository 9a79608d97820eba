//! MIME parsing and body extraction

mod extract;
mod tree;

pub use extract::{HTML_MEDIA_TYPE, decode_payload, extract_first_html, first_html};
pub use tree::MimeNode;
