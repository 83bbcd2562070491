//! Core IMAP identifiers.

/// IMAP command tag.
///
/// Tags are client-chosen prefixes that identify commands. The server echoes
/// the tag in the completion response so the client can correlate it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(pub String);

impl Tag {
    /// Creates a new tag from a string.
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Builds a tag from parsed bytes.
    ///
    /// Tag bytes are restricted to 7-bit astring characters by the grammar,
    /// so the lossy conversion never actually replaces anything.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
