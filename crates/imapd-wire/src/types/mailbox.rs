//! Mailbox names.

use std::borrow::Cow;

/// Mailbox name as sent by the client.
///
/// Names are kept byte-for-byte; only `INBOX` is case-insensitive and is
/// stored in its canonical upper-case spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mailbox(Vec<u8>);

impl Mailbox {
    /// Canonical spelling of the inbox.
    pub const INBOX: &'static [u8] = b"INBOX";

    /// Creates a mailbox name, canonicalizing any case of `INBOX`.
    #[must_use]
    pub fn from_wire(name: Vec<u8>) -> Self {
        if name.eq_ignore_ascii_case(Self::INBOX) {
            Self::inbox()
        } else {
            Self(name)
        }
    }

    /// The INBOX mailbox.
    #[must_use]
    pub fn inbox() -> Self {
        Self(Self::INBOX.to_vec())
    }

    /// Returns true if this is the inbox.
    #[must_use]
    pub fn is_inbox(&self) -> bool {
        self.0 == Self::INBOX
    }

    /// Returns the raw name.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the name as text, replacing invalid UTF-8.
    #[must_use]
    pub fn to_str_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.0)
    }
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_str_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbox_any_case() {
        for name in ["inbox", "InBoX", "INBOX", "iNBOX"] {
            let mailbox = Mailbox::from_wire(name.as_bytes().to_vec());
            assert!(mailbox.is_inbox());
            assert_eq!(mailbox.as_bytes(), b"INBOX");
        }
    }

    #[test]
    fn test_other_names_untouched() {
        for name in ["Inbox2", "INBOX.Sent", "Archive", "inbo"] {
            let mailbox = Mailbox::from_wire(name.as_bytes().to_vec());
            assert!(!mailbox.is_inbox());
            assert_eq!(mailbox.as_bytes(), name.as_bytes());
        }
    }

    #[test]
    fn test_display_lossy() {
        let mailbox = Mailbox::from_wire(vec![b'a', 0xFF]);
        assert_eq!(mailbox.to_string(), "a\u{FFFD}");
    }
}
