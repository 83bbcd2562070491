//! Byte scanner for IMAP command input.
//!
//! The scanner hands out one classified byte per call. It keeps the most
//! recently consumed byte so a literal whose first octet was already pulled
//! into the parser's lookahead can still be copied out whole.

#![allow(clippy::missing_errors_doc)]

mod token;

pub use token::{Token, TokenKind};

use std::io::{self, BufRead};

use crate::Result;

/// Scanner state over a buffered byte source.
pub struct Scanner<R> {
    reader: R,
    current: Option<u8>,
    offset: usize,
}

impl<R: BufRead> Scanner<R> {
    /// Creates a new scanner for the given reader.
    pub const fn new(reader: R) -> Self {
        Self {
            reader,
            current: None,
            offset: 0,
        }
    }

    /// Returns the number of bytes consumed since the last reset.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Restarts offset counting from zero.
    pub const fn reset_offset(&mut self) {
        self.offset = 0;
    }

    /// Returns the most recently consumed byte, if any.
    #[must_use]
    pub const fn current_byte(&self) -> Option<u8> {
        self.current
    }

    /// Reads and classifies the next byte.
    ///
    /// End of input yields an [`TokenKind::Eof`] token rather than an error.
    pub fn scan_token(&mut self) -> Result<Token> {
        match self.read_byte()? {
            Some(byte) => {
                let token = Token::from_byte(byte, self.offset);
                self.current = Some(byte);
                self.offset += 1;
                Ok(token)
            }
            None => {
                self.current = None;
                Ok(Token::eof(self.offset))
            }
        }
    }

    /// Fills `dest` with raw bytes, starting with the current byte.
    ///
    /// The first slot receives the byte most recently returned by
    /// [`scan_token`](Self::scan_token); the rest is read in one go. Running
    /// out of input is reported as `UnexpectedEof`.
    pub fn consume_bytes(&mut self, dest: &mut [u8]) -> Result<()> {
        let Some((first, rest)) = dest.split_first_mut() else {
            return Ok(());
        };
        *first = self.current.ok_or_else(unexpected_eof)?;

        match self.reader.read_exact(rest) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                self.current = None;
                return Err(unexpected_eof().into());
            }
            Err(e) => return Err(e.into()),
        }

        self.offset += rest.len();
        self.current = dest.last().copied();
        Ok(())
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        loop {
            match self.reader.fill_buf() {
                Ok(buf) => {
                    let Some(&byte) = buf.first() else {
                        return Ok(None);
                    };
                    self.reader.consume(1);
                    return Ok(Some(byte));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }
}

fn unexpected_eof() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "input ended inside literal")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::unreadable_literal)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn kinds(input: &[u8]) -> Vec<TokenKind> {
        let mut scanner = Scanner::new(input);
        let mut out = Vec::new();
        loop {
            let token = scanner.scan_token().unwrap();
            out.push(token.kind);
            if token.kind == TokenKind::Eof {
                return out;
            }
        }
    }

    #[test]
    fn test_scan_command_line() {
        assert_eq!(
            kinds(b"a1 NOOP\r\n"),
            vec![
                TokenKind::Char,
                TokenKind::Digit,
                TokenKind::Space,
                TokenKind::Char,
                TokenKind::Char,
                TokenKind::Char,
                TokenKind::Char,
                TokenKind::Cr,
                TokenKind::Lf,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_offsets_and_reset() {
        let mut scanner = Scanner::new(&b"ab{"[..]);
        assert_eq!(scanner.scan_token().unwrap(), Token::new(TokenKind::Char, b'a', 0));
        assert_eq!(scanner.scan_token().unwrap().offset, 1);
        scanner.reset_offset();
        assert_eq!(
            scanner.scan_token().unwrap(),
            Token::new(TokenKind::LeftBrace, b'{', 0)
        );
        assert_eq!(scanner.scan_token().unwrap(), Token::eof(1));
        // Eof is sticky and does not advance.
        assert_eq!(scanner.scan_token().unwrap(), Token::eof(1));
    }

    #[test]
    fn test_consume_bytes_includes_current() {
        let mut scanner = Scanner::new(&b"hello world"[..]);
        let first = scanner.scan_token().unwrap();
        assert_eq!(first.value, b'h');

        let mut dest = [0u8; 5];
        scanner.consume_bytes(&mut dest).unwrap();
        assert_eq!(&dest, b"hello");
        assert_eq!(scanner.current_byte(), Some(b'o'));
        assert_eq!(scanner.offset(), 5);
        assert_eq!(scanner.scan_token().unwrap().kind, TokenKind::Space);
    }

    #[test]
    fn test_consume_bytes_crosses_line_terminators() {
        let mut scanner = Scanner::new(&b"ab\r\ncd!"[..]);
        scanner.scan_token().unwrap();
        let mut dest = [0u8; 6];
        scanner.consume_bytes(&mut dest).unwrap();
        assert_eq!(&dest, b"ab\r\ncd");
        assert_eq!(scanner.scan_token().unwrap().value, b'!');
    }

    #[test]
    fn test_consume_bytes_short_read() {
        let mut scanner = Scanner::new(&b"abc"[..]);
        scanner.scan_token().unwrap();
        let mut dest = [0u8; 10];
        let err = scanner.consume_bytes(&mut dest).unwrap_err();
        assert!(err.is_eof());
    }

    #[test]
    fn test_consume_bytes_without_current() {
        let mut scanner = Scanner::new(&b""[..]);
        assert_eq!(scanner.scan_token().unwrap().kind, TokenKind::Eof);
        let mut dest = [0u8; 1];
        assert!(scanner.consume_bytes(&mut dest).unwrap_err().is_eof());
    }

    proptest! {
        #[test]
        fn classification_ignores_position(prefix in proptest::collection::vec(any::<u8>(), 0..64), byte in any::<u8>()) {
            let mut input = prefix.clone();
            input.push(byte);
            let mut scanner = Scanner::new(input.as_slice());
            for _ in &prefix {
                scanner.scan_token().unwrap();
            }
            let token = scanner.scan_token().unwrap();
            prop_assert_eq!(token.kind, TokenKind::of(byte));
            prop_assert_eq!(token.value, byte);
            prop_assert_eq!(token.offset, prefix.len());
        }
    }
}
