//! Literal payloads lifted out of a command line.
//!
//! The line reader swaps each `{N}\r\n` marker plus its payload for a short
//! placeholder and keeps the payload here. Placeholders are `NUL index NUL`:
//! NUL cannot legally appear in a command line outside a literal, so the
//! line reader refuses client input containing it and a placeholder can
//! never be forged.

use bytes::Bytes;

/// Largest literal the server accepts, exclusive.
pub const MAX_LITERAL_SIZE: usize = 30 * 1024 * 1024;

/// Reference to an extracted literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Placeholder(u32);

impl Placeholder {
    /// Byte that opens and closes a placeholder.
    pub const DELIMITER: u8 = 0;

    /// Creates a placeholder for the literal at `index`.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the position of the literal in its line.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Appends the wire form of this placeholder.
    pub fn write_to(self, buf: &mut Vec<u8>) {
        buf.push(Self::DELIMITER);
        buf.extend_from_slice(self.0.to_string().as_bytes());
        buf.push(Self::DELIMITER);
    }

    /// Returns the wire form of this placeholder.
    #[must_use]
    pub fn to_bytes(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12);
        self.write_to(&mut buf);
        buf
    }
}

/// Literal payloads of one logical line, in the order they were read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Literals {
    entries: Vec<Bytes>,
}

impl Literals {
    /// Creates an empty table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Stores a payload and returns its placeholder.
    pub fn push(&mut self, payload: impl Into<Bytes>) -> Placeholder {
        let index = u32::try_from(self.entries.len()).unwrap_or(u32::MAX);
        self.entries.push(payload.into());
        Placeholder(index)
    }

    /// Looks up the payload a placeholder stands for.
    #[must_use]
    pub fn get(&self, placeholder: Placeholder) -> Option<&Bytes> {
        self.entries.get(placeholder.0 as usize)
    }

    /// Iterates placeholders and payloads in reading order.
    pub fn iter(&self) -> impl Iterator<Item = (Placeholder, &Bytes)> {
        (0..).map(Placeholder).zip(self.entries.iter())
    }

    /// Returns the number of literals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the line carried no literals.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
