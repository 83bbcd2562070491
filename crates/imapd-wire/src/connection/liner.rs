//! Literal-aware line reader.
//!
//! A logical IMAP command line may be split by any number of synchronizing
//! literals: `... {N}\r\n` ends a segment, the server answers with a
//! continuation request and the client then sends exactly N raw octets
//! before the line resumes. [`Liner::read_line`] hides this and hands back
//! one [`Line`] with every literal lifted out into a [`Literals`] table.

#![allow(clippy::missing_errors_doc)]

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::literal::{Literals, MAX_LITERAL_SIZE, Placeholder};
use crate::parser::Parser;
use crate::response::Response;
use crate::{Error, Rejection, Result};

/// Default buffer size for reading.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum length of one segment between literals.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Default cap on one logical line, literal payloads included.
pub const MAX_COMMAND_SIZE: usize = 64 * 1024 * 1024;

/// Text of the continuation request sent by [`ContinuationReply`].
pub const CONTINUATION_TEXT: &str = "Ready for literal data";

/// Invoked once per literal, before its payload is read.
///
/// Implementations must write exactly one continuation request to
/// `stream` and flush it.
#[allow(async_fn_in_trait)]
pub trait ContinuationHook<S> {
    /// Asks the client to send a literal of `size` octets.
    async fn request_literal(&mut self, stream: &mut S, size: usize) -> Result<()>;
}

/// Hook that sends the standard `+ Ready for literal data` reply.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContinuationReply;

impl<S: AsyncWrite + Unpin> ContinuationHook<S> for ContinuationReply {
    async fn request_literal(&mut self, stream: &mut S, size: usize) -> Result<()> {
        tracing::trace!(size, "requesting literal");
        let reply = Response::Continuation(CONTINUATION_TEXT.to_string()).to_bytes();
        stream.write_all(&reply).await?;
        stream.flush().await?;
        Ok(())
    }
}

/// One logical command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Line {
    /// Line bytes with each literal replaced by its placeholder.
    pub text: Vec<u8>,
    /// Literal payloads in the order they were read.
    pub literals: Literals,
}

impl Line {
    /// Returns a parser over this line that resolves its placeholders.
    ///
    /// The parser is not primed.
    #[must_use]
    pub fn parser(&self) -> Parser<'_, &[u8]> {
        Parser::new(self.text.as_slice()).with_literals(&self.literals)
    }
}

/// Reads logical command lines from a connection.
pub struct Liner<S> {
    reader: BufReader<S>,
    max_command_size: usize,
}

impl<S> Liner<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new line reader.
    pub fn new(stream: S) -> Self {
        Self {
            reader: BufReader::with_capacity(DEFAULT_BUFFER_SIZE, stream),
            max_command_size: MAX_COMMAND_SIZE,
        }
    }

    /// Sets the cap on one logical line, literal payloads included.
    #[must_use]
    pub const fn with_max_command_size(mut self, limit: usize) -> Self {
        self.max_command_size = limit;
        self
    }

    /// Reads the next logical line.
    ///
    /// Returns `Ok(None)` when the peer closed the connection between
    /// lines. Lines that cannot be accepted but leave the connection in
    /// sync come back as [`Error::Rejected`]: a literal size outside
    /// `1..MAX_LITERAL_SIZE` (refused before `hook` runs and before any
    /// payload is read), a literal that would take the whole line past
    /// the command size cap (also refused before `hook` runs) or a NUL
    /// byte outside a literal.
    pub async fn read_line<H>(&mut self, hook: &mut H) -> Result<Option<Line>>
    where
        H: ContinuationHook<S>,
    {
        let mut line = Line::default();
        let mut literal_bytes = 0usize;

        loop {
            let start = line.text.len();
            if !self.read_segment(&mut line.text).await? {
                if line.text.is_empty() {
                    return Ok(None);
                }
                return Err(unexpected_eof("connection closed mid-line").into());
            }

            if line.text[start..].contains(&Placeholder::DELIMITER) {
                return Err(Error::Rejected {
                    line: line.text,
                    reason: Rejection::NulByte,
                });
            }

            let Some((marker, size)) = literal_marker(&line.text[start..]) else {
                return Ok(Some(line));
            };
            let size = match usize::try_from(size) {
                Ok(n) if n > 0 && n < MAX_LITERAL_SIZE => n,
                _ => {
                    return Err(Error::Rejected {
                        line: line.text,
                        reason: Rejection::LiteralSize(size),
                    });
                }
            };

            let total = line.text.len().saturating_add(literal_bytes).saturating_add(size);
            if total > self.max_command_size {
                return Err(Error::Rejected {
                    line: line.text,
                    reason: Rejection::CommandTooLarge(self.max_command_size),
                });
            }
            literal_bytes += size;

            hook.request_literal(self.reader.get_mut(), size).await?;

            let mut payload = vec![0u8; size];
            self.reader.read_exact(&mut payload).await?;

            line.text.truncate(start + marker);
            line.literals.push(payload).write_to(&mut line.text);
        }
    }

    /// Discards bytes buffered but not yet returned and reports how many.
    ///
    /// Called after the byte source changes underneath, e.g. once a
    /// STARTTLS handshake completes: anything read before the upgrade
    /// must not be interpreted after it.
    pub fn reset(&mut self) -> usize {
        let stale = self.reader.buffer().len();
        self.reader.consume(stale);
        if stale > 0 {
            tracing::debug!(stale, "discarded buffered input");
        }
        stale
    }

    /// Gets a reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        self.reader.get_ref()
    }

    /// Gets a mutable reference to the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        self.reader.get_mut()
    }

    /// Consumes the reader and returns the inner stream.
    ///
    /// Note: Any buffered data will be lost.
    pub fn into_inner(self) -> S {
        self.reader.into_inner()
    }

    /// Appends bytes up to and including the next LF.
    ///
    /// Returns false if the stream ended before a complete segment.
    async fn read_segment(&mut self, out: &mut Vec<u8>) -> Result<bool> {
        let mut read = 0usize;

        loop {
            let buf = self.reader.fill_buf().await?;
            if buf.is_empty() {
                if read > 0 {
                    return Err(unexpected_eof("connection closed mid-line").into());
                }
                return Ok(false);
            }

            let (chunk, done) = match buf.iter().position(|&b| b == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (buf.len(), false),
            };

            if read + chunk > MAX_LINE_LENGTH {
                return Err(Error::LineTooLong);
            }
            out.extend_from_slice(&buf[..chunk]);
            self.reader.consume(chunk);
            read += chunk;

            if done {
                return Ok(true);
            }
        }
    }
}

impl<S: AsyncRead> std::fmt::Debug for Liner<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Liner")
            .field("buffered", &self.reader.buffer().len())
            .finish_non_exhaustive()
    }
}

fn unexpected_eof(message: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, message)
}

/// Finds a trailing `{digits}\r\n` marker.
///
/// Returns the offset of `{` within `segment` and the declared size,
/// saturated at `u64::MAX`.
fn literal_marker(segment: &[u8]) -> Option<(usize, u64)> {
    let body = segment.strip_suffix(b"}\r\n")?;
    let open = body.iter().rposition(|&b| b == b'{')?;
    let digits = &body[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let size = digits.iter().fold(0u64, |n, d| {
        n.saturating_mul(10).saturating_add(u64::from(d - b'0'))
    });
    Some((open, size))
}
