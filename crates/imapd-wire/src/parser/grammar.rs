//! RFC 3501 lexical productions.

use std::io::BufRead;

use super::{Parser, Token, TokenKind};
use crate::error::ParseError;
use crate::literal::{MAX_LITERAL_SIZE, Placeholder};
use crate::types::Mailbox;
use crate::Result;

/// Longest digit run accepted for a literal size or placeholder index.
///
/// Nine digits cannot overflow `usize` anywhere and already exceed the
/// literal ceiling.
const MAX_SIZE_DIGITS: usize = 9;

const fn is_digit(token: Token) -> bool {
    matches!(token.kind, TokenKind::Digit)
}

const fn is_placeholder_delimiter(token: Token) -> bool {
    matches!(token.kind, TokenKind::Ctl) && token.value == Placeholder::DELIMITER
}

fn accumulate(digits: &[u8]) -> u64 {
    digits.iter().fold(0u64, |n, d| {
        n.wrapping_mul(10).wrapping_add(u64::from(d - b'0'))
    })
}

impl<R: BufRead> Parser<'_, R> {
    /// Parses an atom.
    ///
    /// ```text
    /// atom = 1*ATOM-CHAR
    /// ```
    pub fn atom(&mut self) -> Result<Vec<u8>> {
        let atom = self.collect_bytes_while_matches(|t| t.kind.is_atom())?;
        if atom.is_empty() {
            return Err(self.error("expected atom"));
        }
        Ok(atom)
    }

    /// Parses a quoted string and returns its unescaped content.
    ///
    /// ```text
    /// quoted = DQUOTE *QUOTED-CHAR DQUOTE
    /// QUOTED-CHAR = <any TEXT-CHAR except quoted-specials> /
    ///               "\" quoted-specials
    /// ```
    pub fn quoted(&mut self) -> Result<Vec<u8>> {
        self.consume(TokenKind::DoubleQuote, "expected '\"'")?;

        let mut content = Vec::new();
        loop {
            let token = self.current();
            match token.kind {
                TokenKind::DoubleQuote => {
                    self.advance()?;
                    return Ok(content);
                }
                TokenKind::Backslash => {
                    self.advance()?;
                    let escaped = self.consume_with(
                        |t| matches!(t.kind, TokenKind::DoubleQuote | TokenKind::Backslash),
                        "invalid escape in quoted string",
                    )?;
                    content.push(escaped.value);
                }
                kind if kind.is_quoted() => {
                    content.push(token.value);
                    self.advance()?;
                }
                _ => return Err(self.error("unterminated quoted string")),
            }
        }
    }

    /// Parses a synchronizing literal and returns its payload.
    ///
    /// ```text
    /// literal = "{" number "}" CRLF *CHAR8
    /// ```
    ///
    /// Sizes outside `1..MAX_LITERAL_SIZE` are refused before any payload
    /// is read. The continuation hook, if any, runs after the header and
    /// before the first payload byte is pulled from the scanner.
    pub fn literal(&mut self) -> Result<Vec<u8>> {
        self.consume(TokenKind::LeftBrace, "expected '{'")?;
        let digits = self.collect_bytes_while_matches(is_digit)?;
        if digits.is_empty() {
            return Err(self.error("expected literal size"));
        }
        self.consume(TokenKind::RightBrace, "expected '}'")?;

        let size = if digits.len() > MAX_SIZE_DIGITS {
            None
        } else {
            usize::try_from(accumulate(&digits))
                .ok()
                .filter(|&n| n > 0 && n < MAX_LITERAL_SIZE)
        };
        let Some(size) = size else {
            return Err(ParseError::new(self.previous(), "literal size out of range").into());
        };

        self.consume(TokenKind::Cr, "expected CRLF after literal size")?;
        if !self.check(TokenKind::Lf) {
            return Err(self.error("expected CRLF after literal size"));
        }

        if let Some(hook) = self.continuation.as_mut() {
            hook()?;
        }

        // Pulls the first payload byte into the window; the scanner copies
        // it back out as the first byte of the literal.
        self.advance()?;
        let mut payload = vec![0u8; size];
        self.scanner.consume_bytes(&mut payload)?;
        if let Some(&last) = payload.last() {
            self.current = Token::from_byte(last, self.scanner.offset().saturating_sub(1));
        }
        self.advance()?;

        Ok(payload)
    }

    /// Parses a string.
    ///
    /// ```text
    /// string = quoted / literal
    /// ```
    ///
    /// When a literal table is attached, a placeholder left by the line
    /// reader is accepted wherever a literal is.
    pub fn string(&mut self) -> Result<Vec<u8>> {
        match self.current().kind {
            TokenKind::DoubleQuote => self.quoted(),
            TokenKind::LeftBrace => self.literal(),
            _ if self.literals.is_some() && self.check_with(is_placeholder_delimiter) => {
                self.placeholder()
            }
            _ => Err(self.error("expected quoted string or literal")),
        }
    }

    /// Parses an astring.
    ///
    /// ```text
    /// astring = 1*ASTRING-CHAR / string
    /// ```
    pub fn astring(&mut self) -> Result<Vec<u8>> {
        if self.check_with(|t| t.kind.is_astring()) {
            return self.collect_bytes_while_matches(|t| t.kind.is_astring());
        }
        self.string()
    }

    /// Parses a mailbox name; any case of `INBOX` comes back as `INBOX`.
    pub fn mailbox(&mut self) -> Result<Mailbox> {
        self.astring().map(Mailbox::from_wire)
    }

    /// Parses one or more digits.
    ///
    /// Magnitude is not checked; callers bound it from grammar context.
    pub fn number(&mut self) -> Result<u64> {
        let digits = self.collect_bytes_while_matches(is_digit)?;
        if digits.is_empty() {
            return Err(self.error("expected number"));
        }
        Ok(accumulate(&digits))
    }

    /// Parses exactly `width` digits.
    pub fn number_width(&mut self, width: usize) -> Result<u64> {
        let mut n = 0u64;
        for _ in 0..width {
            let digit = self.consume(TokenKind::Digit, "expected digit")?;
            n = n.wrapping_mul(10).wrapping_add(u64::from(digit.value - b'0'));
        }
        Ok(n)
    }

    fn placeholder(&mut self) -> Result<Vec<u8>> {
        self.consume_with(is_placeholder_delimiter, "expected literal placeholder")?;
        let digits = self.collect_bytes_while_matches(is_digit)?;
        let start = self.current();
        self.consume_with(is_placeholder_delimiter, "malformed literal placeholder")?;

        let payload = (!digits.is_empty() && digits.len() <= MAX_SIZE_DIGITS)
            .then(|| u32::try_from(accumulate(&digits)).ok())
            .flatten()
            .and_then(|index| self.literals?.get(Placeholder::new(index)));

        payload
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| ParseError::new(start, "unknown literal placeholder").into())
    }
}
