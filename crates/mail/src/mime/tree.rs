//! MIME tree built from a raw RFC 822 message

use log::debug;
use mailparse::{MailParseError, ParsedMail};

/// One node of a message's MIME structure
///
/// Leaves carry their payload with the transfer encoding already undone.
/// Containers (`multipart/*`) carry their parts in `children` and an empty
/// payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimeNode {
    /// Lowercased media type, e.g. `text/html`
    pub content_type: String,
    /// Declared charset parameter, if any
    pub charset: Option<String>,
    pub payload: Vec<u8>,
    pub children: Vec<MimeNode>,
}

impl MimeNode {
    /// Parse raw message bytes into a tree
    pub fn parse(raw: &[u8]) -> Result<Self, MailParseError> {
        let parsed = mailparse::parse_mail(raw)?;
        Ok(Self::from_parsed(&parsed))
    }

    /// Build a leaf node
    pub fn leaf(
        content_type: impl Into<String>,
        charset: Option<&str>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            content_type: content_type.into().to_ascii_lowercase(),
            charset: charset.map(str::to_string),
            payload: payload.into(),
            children: Vec::new(),
        }
    }

    /// Build a container node
    pub fn container(content_type: impl Into<String>, children: Vec<MimeNode>) -> Self {
        Self {
            content_type: content_type.into().to_ascii_lowercase(),
            charset: None,
            payload: Vec::new(),
            children,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty() && !self.content_type.starts_with("multipart/")
    }

    /// Depth-first, pre-order, left-to-right search
    pub fn find_first(&self, predicate: &dyn Fn(&MimeNode) -> bool) -> Option<&MimeNode> {
        if predicate(self) {
            return Some(self);
        }
        self.children
            .iter()
            .find_map(|child| child.find_first(predicate))
    }

    fn from_parsed(mail: &ParsedMail<'_>) -> Self {
        let content_type = mail.ctype.mimetype.to_ascii_lowercase();
        let charset = mail
            .ctype
            .params
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("charset"))
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty());

        if !mail.subparts.is_empty() || content_type.starts_with("multipart/") {
            let children = mail.subparts.iter().map(Self::from_parsed).collect();
            return Self {
                content_type,
                charset,
                payload: Vec::new(),
                children,
            };
        }

        let payload = mail.get_body_raw().unwrap_or_else(|e| {
            debug!("Undecodable {} body, treating as empty: {}", content_type, e);
            Vec::new()
        });
        Self {
            content_type,
            charset,
            payload,
            children: Vec::new(),
        }
    }
}
