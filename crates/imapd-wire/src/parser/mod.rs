//! IMAP command parser primitives.
//!
//! The parser is split into two layers:
//!
//! - **Scanner**: classifies each input byte into a [`TokenKind`]
//! - **Parser**: a two-token lookahead window over the scanner with
//!   combinators and the RFC 3501 lexical productions (atom, quoted,
//!   literal, string, astring, mailbox, number)
//!
//! Full command grammars are built on top of these primitives.
//!
//! # Example
//!
//! ```
//! use imapd_wire::parser::Parser;
//!
//! let mut parser = Parser::new(&b"\"a\\\"b\" rest"[..]);
//! parser.advance().unwrap();
//! assert_eq!(parser.astring().unwrap(), b"a\"b");
//! ```

#![allow(clippy::missing_errors_doc)]

mod grammar;
pub mod scanner;

pub use scanner::{Scanner, Token, TokenKind};

use std::fmt;
use std::io::BufRead;

use crate::error::ParseError;
use crate::literal::Literals;
use crate::{Error, Result};

type Continuation<'a> = Box<dyn FnMut() -> Result<()> + 'a>;

/// Lookahead parser over a [`Scanner`].
///
/// [`advance`](Self::advance) must be called once to prime the window before
/// any other operation.
pub struct Parser<'a, R> {
    scanner: Scanner<R>,
    previous: Token,
    current: Token,
    continuation: Option<Continuation<'a>>,
    literals: Option<&'a Literals>,
}

impl<'a, R: BufRead> Parser<'a, R> {
    /// Creates a parser reading from `reader`.
    pub fn new(reader: R) -> Self {
        Self::from_scanner(Scanner::new(reader))
    }

    /// Creates a parser over an existing scanner.
    pub fn from_scanner(scanner: Scanner<R>) -> Self {
        Self {
            scanner,
            previous: Token::none(),
            current: Token::none(),
            continuation: None,
            literals: None,
        }
    }

    /// Installs the hook run once per literal, after its `{N}\r\n` header
    /// and before its payload is read.
    #[must_use]
    pub fn with_continuation(mut self, hook: impl FnMut() -> Result<()> + 'a) -> Self {
        self.continuation = Some(Box::new(hook));
        self
    }

    /// Resolves literal placeholders against `literals`.
    #[must_use]
    pub fn with_literals(mut self, literals: &'a Literals) -> Self {
        self.literals = Some(literals);
        self
    }

    /// Token under the cursor.
    #[must_use]
    pub const fn current(&self) -> Token {
        self.current
    }

    /// Token consumed most recently.
    #[must_use]
    pub const fn previous(&self) -> Token {
        self.previous
    }

    /// Mutable access to the scanner, e.g. to reset its offset.
    pub const fn scanner_mut(&mut self) -> &mut Scanner<R> {
        &mut self.scanner
    }

    /// Shifts the window by one token.
    pub fn advance(&mut self) -> Result<()> {
        let next = self.scanner.scan_token()?;
        self.previous = std::mem::replace(&mut self.current, next);
        Ok(())
    }

    /// Returns true if the current token is of `kind`.
    #[must_use]
    pub fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    /// Returns true if the current token satisfies `predicate`.
    pub fn check_with(&self, predicate: impl Fn(Token) -> bool) -> bool {
        predicate(self.current)
    }

    /// Consumes a token of `kind` or fails with `message`.
    pub fn consume(&mut self, kind: TokenKind, message: &str) -> Result<Token> {
        self.consume_with(|token| token.kind == kind, message)
    }

    /// Consumes a token satisfying `predicate` or fails with `message`.
    pub fn consume_with(
        &mut self,
        predicate: impl Fn(Token) -> bool,
        message: &str,
    ) -> Result<Token> {
        if !predicate(self.current) {
            return Err(self.error(message));
        }
        let token = self.current;
        self.advance()?;
        Ok(token)
    }

    /// Consumes a token of `kind` if present.
    pub fn matches(&mut self, kind: TokenKind) -> Result<bool> {
        self.matches_with(|token| token.kind == kind)
    }

    /// Consumes a token satisfying `predicate` if present.
    pub fn matches_with(&mut self, predicate: impl Fn(Token) -> bool) -> Result<bool> {
        if !predicate(self.current) {
            return Ok(false);
        }
        self.advance()?;
        Ok(true)
    }

    /// Greedily consumes matching tokens and returns their bytes.
    pub fn collect_bytes_while_matches(
        &mut self,
        predicate: impl Fn(Token) -> bool,
    ) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.collect_into(&mut bytes, predicate)?;
        Ok(bytes)
    }

    /// Like [`collect_bytes_while_matches`](Self::collect_bytes_while_matches)
    /// but starts with the token consumed just before the call.
    pub fn collect_bytes_while_matches_with_prev(
        &mut self,
        predicate: impl Fn(Token) -> bool,
    ) -> Result<Vec<u8>> {
        let mut bytes = vec![self.previous.value];
        self.collect_into(&mut bytes, predicate)?;
        Ok(bytes)
    }

    /// Builds a parse error at the current token.
    #[must_use]
    pub fn error(&self, message: impl Into<String>) -> Error {
        ParseError::new(self.current, message).into()
    }

    fn collect_into(&mut self, bytes: &mut Vec<u8>, predicate: impl Fn(Token) -> bool) -> Result<()> {
        while predicate(self.current) {
            bytes.push(self.current.value);
            self.advance()?;
        }
        Ok(())
    }
}

impl<R> fmt::Debug for Parser<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parser")
            .field("previous", &self.previous)
            .field("current", &self.current)
            .field("continuation", &self.continuation.is_some())
            .field("literals", &self.literals.map(Literals::len))
            .finish_non_exhaustive()
    }
}
