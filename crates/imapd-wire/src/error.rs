//! Error types for the wire layer.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::parser::{Token, TokenKind};
use crate::response::MergeClass;

/// Errors that can occur while framing, parsing or flushing IMAP traffic.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the underlying connection.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS configuration error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Certificate or key could not be read from PEM.
    #[error("PEM error: {0}")]
    Pem(#[from] rustls::pki_types::pem::Error),

    /// Malformed token sequence.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A logical line was read in full but cannot be accepted.
    ///
    /// The connection is still in sync; the session should answer with a
    /// tagged BAD built from `line` and keep going.
    #[error("line rejected: {reason}")]
    Rejected {
        /// Everything read for the logical line so far.
        line: Vec<u8>,
        /// Why it was rejected.
        reason: Rejection,
    },

    /// A single line segment exceeded the framing limit.
    #[error("line too long")]
    LineTooLong,

    /// A mergeable response went backwards within an uninterrupted run.
    ///
    /// This is a bug in whatever produced the responses, never a client
    /// condition.
    #[error("merge invariant violated: {class:?} went from {previous} to {next}")]
    MergeInvariant {
        /// Counter that regressed.
        class: MergeClass,
        /// Value already queued.
        previous: u32,
        /// Smaller value that followed it.
        next: u32,
    },

    /// Invalid state for the requested operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Protocol violation or unexpected data.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Returns true if the input simply ran out.
    ///
    /// A parse error at end of input may only mean more bytes are needed,
    /// which calls for different recovery than a syntax violation.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        match self {
            Self::Io(e) => e.kind() == io::ErrorKind::UnexpectedEof,
            Self::Parse(e) => e.is_eof(),
            _ => false,
        }
    }

    /// Returns true if the connection cannot continue after this error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Parse(_) | Self::Rejected { .. })
    }
}

/// Reason a logical line was refused by the line reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    /// Literal length outside `1..MAX_LITERAL_SIZE`.
    #[error("literal size {0} out of range")]
    LiteralSize(u64),
    /// A NUL byte appeared outside of a literal.
    #[error("NUL byte outside literal")]
    NulByte,
    /// The literals of one command would exceed the size cap.
    #[error("command larger than {0} octets")]
    CommandTooLarge(usize),
}

/// Syntax error raised by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {} (found {:?})", .token.offset, .token.kind)]
pub struct ParseError {
    /// Token the parser was looking at.
    pub token: Token,
    /// What was expected.
    pub message: String,
}

impl ParseError {
    /// Creates a parse error for the given token.
    #[must_use]
    pub fn new(token: Token, message: impl Into<String>) -> Self {
        Self {
            token,
            message: message.into(),
        }
    }

    /// Returns true if the offending token is end of input.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.token.kind == TokenKind::Eof
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_eof_detection() {
        let eof = ParseError::new(Token::new(TokenKind::Eof, 0, 7), "expected atom");
        assert!(eof.is_eof());
        assert!(Error::from(eof).is_eof());

        let bad = ParseError::new(Token::new(TokenKind::RightParen, b')', 3), "expected atom");
        assert!(!bad.is_eof());

        let io = Error::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "short"));
        assert!(io.is_eof());
    }

    #[test]
    fn test_fatality() {
        let parse = Error::from(ParseError::new(
            Token::new(TokenKind::Space, b' ', 0),
            "expected atom",
        ));
        assert!(!parse.is_fatal());
        assert!(
            !Error::Rejected {
                line: Vec::new(),
                reason: Rejection::NulByte,
            }
            .is_fatal()
        );
        assert!(Error::LineTooLong.is_fatal());
    }

    #[test]
    fn test_display() {
        let err = ParseError::new(Token::new(TokenKind::Space, b' ', 4), "expected atom");
        assert_eq!(err.to_string(), "expected atom at offset 4 (found Space)");
    }
}
