//! Mailbox descriptor as reported by IMAP LIST

use serde::{Deserialize, Serialize};
use std::fmt;

/// One entry of a mailbox listing (a Gmail label, from IMAP's point of view)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxDescriptor {
    /// Full mailbox name, e.g. "INBOX" or "[Gmail]/Sent Mail"
    pub name: String,
    /// Hierarchy delimiter, absent for flat namespaces
    pub delimiter: Option<String>,
    /// Name attributes such as `\HasNoChildren` or `\Noselect`
    pub attributes: Vec<String>,
}

impl MailboxDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delimiter: Some("/".to_string()),
            attributes: Vec::new(),
        }
    }

    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the mailbox can be selected (no `\Noselect` attribute)
    pub fn is_selectable(&self) -> bool {
        !self
            .attributes
            .iter()
            .any(|a| a.eq_ignore_ascii_case("\\Noselect"))
    }
}

/// Renders the way the server's LIST response does
impl fmt::Display for MailboxDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) ", self.attributes.join(" "))?;
        match &self.delimiter {
            Some(d) => write!(f, "\"{}\" ", d)?,
            None => write!(f, "NIL ")?,
        }
        write!(f, "\"{}\"", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_list_line() {
        let mailbox = MailboxDescriptor::new("[Gmail]/All Mail")
            .with_attributes(["\\All", "\\HasNoChildren"]);
        assert_eq!(
            mailbox.to_string(),
            r#"(\All \HasNoChildren) "/" "[Gmail]/All Mail""#
        );
    }

    #[test]
    fn test_display_without_delimiter() {
        let mut mailbox = MailboxDescriptor::new("INBOX");
        mailbox.delimiter = None;
        assert_eq!(mailbox.to_string(), r#"() NIL "INBOX""#);
    }

    #[test]
    fn test_selectable() {
        assert!(MailboxDescriptor::new("INBOX").is_selectable());
        assert!(
            !MailboxDescriptor::new("[Gmail]")
                .with_attributes(["\\NoSelect", "\\HasChildren"])
                .is_selectable()
        );
    }
}
