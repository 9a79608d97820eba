//! Search criteria built from a Gmail filter
//!
//! A filter is passed to Gmail's `X-GM-RAW` extension as one quoted string.
//! Filters containing non-ASCII characters need an explicit
//! `CHARSET UTF-8` directive, otherwise Gmail's parser rejects or mangles them.
//! CR, LF and NUL cannot appear in an IMAP quoted string, so filters carrying
//! them are refused before anything is sent.

use crate::error::{MailError, Result};

/// Immutable search request derived from an optional caller filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    raw_filter: Option<String>,
    needs_quoting: bool,
    requires_utf8_charset: bool,
}

impl SearchQuery {
    /// Match every message in the mailbox
    pub fn all() -> Self {
        Self {
            raw_filter: None,
            needs_quoting: false,
            requires_utf8_charset: false,
        }
    }

    /// Build a query from a Gmail search filter; empty means "all messages"
    ///
    /// Fails with [`MailError::Fetch`] when the filter contains CR, LF or NUL.
    pub fn new(filter: Option<&str>) -> Result<Self> {
        let Some(filter) = filter.filter(|f| !f.is_empty()) else {
            return Ok(Self::all());
        };
        if filter.contains(['\r', '\n', '\0']) {
            return Err(MailError::Fetch(
                "search filter must not contain line breaks or NUL".to_string(),
            ));
        }
        Ok(Self {
            raw_filter: Some(filter.to_string()),
            needs_quoting: !is_quoted(filter),
            requires_utf8_charset: !filter.is_ascii(),
        })
    }

    pub fn raw_filter(&self) -> Option<&str> {
        self.raw_filter.as_deref()
    }

    pub fn needs_quoting(&self) -> bool {
        self.needs_quoting
    }

    pub fn requires_utf8_charset(&self) -> bool {
        self.requires_utf8_charset
    }

    /// The filter as an IMAP quoted string
    pub fn quoted_filter(&self) -> Option<String> {
        let filter = self.raw_filter.as_deref()?;
        if !self.needs_quoting {
            return Some(filter.to_string());
        }
        let escaped = filter.replace('\\', "\\\\").replace('"', "\\\"");
        Some(format!("\"{}\"", escaped))
    }

    /// Criteria following the `SEARCH` keyword
    pub fn criteria(&self) -> String {
        match self.quoted_filter() {
            None => "ALL".to_string(),
            Some(quoted) if self.requires_utf8_charset => {
                format!("CHARSET UTF-8 X-GM-RAW {}", quoted)
            }
            Some(quoted) => format!("X-GM-RAW {}", quoted),
        }
    }
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self::all()
    }
}

/// Already one IMAP quoted string: enclosed in `"` with every interior `"`
/// and `\` escaped by a backslash
fn is_quoted(filter: &str) -> bool {
    let Some(inner) = filter
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return false;
    };
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if !matches!(chars.next(), Some('\\' | '"')) {
                    return false;
                }
            }
            '"' => return false,
            _ => {}
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_filter_searches_all() {
        assert_eq!(SearchQuery::new(None).unwrap().criteria(), "ALL");
        assert_eq!(SearchQuery::new(Some("")).unwrap().criteria(), "ALL");
        assert_eq!(SearchQuery::all(), SearchQuery::default());
    }

    #[test]
    fn test_ascii_filter_uses_default_charset() {
        let filters = [
            "from:(reservation@example.com)",
            "subject:invoice newer_than:2d",
            "label:receipts -{\"Spam\"}",
            "\"already quoted\"",
        ];
        for filter in filters {
            let query = SearchQuery::new(Some(filter)).unwrap();
            assert!(!query.requires_utf8_charset(), "{}", filter);
            assert!(query.criteria().starts_with("X-GM-RAW "), "{}", filter);
        }
    }

    #[test]
    fn test_non_ascii_filter_uses_utf8_charset() {
        let filters = ["subject:réservation", "from:\u{00FF}", "日本語", "a\u{0080}"];
        for filter in filters {
            let query = SearchQuery::new(Some(filter)).unwrap();
            assert!(query.requires_utf8_charset(), "{}", filter);
            assert!(
                query.criteria().starts_with("CHARSET UTF-8 X-GM-RAW "),
                "{}",
                filter
            );
        }
    }

    #[test]
    fn test_wraps_unquoted_filter() {
        let query = SearchQuery::new(Some("from:(nobody@example.invalid)")).unwrap();
        assert!(query.needs_quoting());
        assert_eq!(
            query.criteria(),
            "X-GM-RAW \"from:(nobody@example.invalid)\""
        );
    }

    #[test]
    fn test_keeps_caller_quotes() {
        let query = SearchQuery::new(Some("\"has:attachment\"")).unwrap();
        assert!(!query.needs_quoting());
        assert_eq!(query.criteria(), "X-GM-RAW \"has:attachment\"");
    }

    #[test]
    fn test_leading_quote_alone_is_not_quoted() {
        let query = SearchQuery::new(Some("\"Spam\" label:inbox")).unwrap();
        assert!(query.needs_quoting());
        assert_eq!(
            query.criteria(),
            "X-GM-RAW \"\\\"Spam\\\" label:inbox\""
        );

        assert!(SearchQuery::new(Some("\"")).unwrap().needs_quoting());
    }

    #[test]
    fn test_several_quoted_phrases_are_wrapped() {
        let query = SearchQuery::new(Some("\"a b\" OR \"c d\"")).unwrap();
        assert!(query.needs_quoting());
        assert_eq!(
            query.criteria(),
            "X-GM-RAW \"\\\"a b\\\" OR \\\"c d\\\"\""
        );
    }

    #[test]
    fn test_escaped_quoted_string_is_kept() {
        let filter = "\"subject:\\\"x\\\" a\\\\b\"";
        let query = SearchQuery::new(Some(filter)).unwrap();
        assert!(!query.needs_quoting());
        assert_eq!(query.criteria(), format!("X-GM-RAW {}", filter));

        // A trailing backslash escapes the closing quote
        assert!(SearchQuery::new(Some("\"a\\\"")).unwrap().needs_quoting());
    }

    #[test]
    fn test_rejects_line_breaks_and_nul() {
        for filter in [
            "subject:x\r\nA1 DELETE INBOX",
            "subject:x\nlabel:y",
            "\"quoted\r\"",
            "a\0b",
        ] {
            let err = SearchQuery::new(Some(filter)).unwrap_err();
            assert!(matches!(err, MailError::Fetch(_)), "{:?}", filter);
        }
    }

    #[test]
    fn test_escapes_backslash() {
        let query = SearchQuery::new(Some("a\\b")).unwrap();
        assert_eq!(query.quoted_filter().unwrap(), "\"a\\\\b\"");
    }

    #[test]
    fn test_utf8_criteria_text() {
        let query = SearchQuery::new(Some("subject:café")).unwrap();
        assert_eq!(query.criteria(), "CHARSET UTF-8 X-GM-RAW \"subject:café\"");
        assert_eq!(query.raw_filter(), Some("subject:café"));
    }
}
