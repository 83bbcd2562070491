//! Server responses and the outbound queue.
//!
//! Command handlers push [`Response`] values into an [`Outbox`]. When the
//! session flushes, the batch is compacted by [`merge`] and rendered to the
//! wire in order.

#![allow(clippy::missing_errors_doc)]

mod merge;

pub use merge::{MergeClass, merge};

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::Result;
use crate::types::{Status, Tag};

/// One line of server output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// `* n EXISTS`: message count.
    Exists(u32),
    /// `* n RECENT`: recent count.
    Recent(u32),
    /// `* n EXPUNGE`: a message was removed and later sequence numbers shifted.
    Expunge(u32),
    /// `* FLAGS (...)`.
    Flags(Vec<String>),
    /// `* CAPABILITY ...`.
    Capability(Vec<String>),
    /// Tagged or untagged condition response.
    Status {
        /// Tag of the completed command; `None` for `*`.
        tag: Option<Tag>,
        /// Condition.
        status: Status,
        /// Bracketed response code without the brackets.
        code: Option<String>,
        /// Human-readable text.
        text: String,
    },
    /// `+ text`: continuation request.
    Continuation(String),
    /// Opaque untagged data, rendered as `* ` followed by the bytes.
    Data(Vec<u8>),
}

impl Response {
    /// Tagged completion.
    #[must_use]
    pub fn tagged(tag: Tag, status: Status, text: impl Into<String>) -> Self {
        Self::Status {
            tag: Some(tag),
            status,
            code: None,
            text: text.into(),
        }
    }

    /// Untagged condition.
    #[must_use]
    pub fn untagged(status: Status, text: impl Into<String>) -> Self {
        Self::Status {
            tag: None,
            status,
            code: None,
            text: text.into(),
        }
    }

    /// Adds a response code to a condition response.
    #[must_use]
    pub fn with_code(mut self, new_code: impl Into<String>) -> Self {
        if let Self::Status { code, .. } = &mut self {
            *code = Some(new_code.into());
        }
        self
    }

    /// Returns the merge class of this response.
    #[must_use]
    pub const fn merge_class(&self) -> MergeClass {
        match self {
            Self::Exists(_) => MergeClass::MessageCount,
            Self::Recent(_) => MergeClass::RecentCount,
            _ => MergeClass::Atomic,
        }
    }

    /// Appends the wire form, including CRLF.
    pub fn write_to(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Exists(n) => buf.extend_from_slice(format!("* {n} EXISTS").as_bytes()),
            Self::Recent(n) => buf.extend_from_slice(format!("* {n} RECENT").as_bytes()),
            Self::Expunge(n) => buf.extend_from_slice(format!("* {n} EXPUNGE").as_bytes()),
            Self::Flags(flags) => {
                buf.extend_from_slice(b"* FLAGS (");
                write_joined(buf, flags);
                buf.push(b')');
            }
            Self::Capability(caps) => {
                buf.extend_from_slice(b"* CAPABILITY ");
                write_joined(buf, caps);
            }
            Self::Status {
                tag,
                status,
                code,
                text,
            } => {
                match tag {
                    Some(tag) => buf.extend_from_slice(tag.as_str().as_bytes()),
                    None => buf.push(b'*'),
                }
                buf.push(b' ');
                buf.extend_from_slice(status.as_str().as_bytes());
                if let Some(code) = code {
                    buf.extend_from_slice(b" [");
                    buf.extend_from_slice(code.as_bytes());
                    buf.push(b']');
                }
                buf.push(b' ');
                write_text(buf, text);
            }
            Self::Continuation(text) => {
                buf.extend_from_slice(b"+ ");
                write_text(buf, text);
            }
            Self::Data(data) => {
                buf.extend_from_slice(b"* ");
                buf.extend_from_slice(data);
            }
        }
        buf.extend_from_slice(b"\r\n");
    }

    /// Returns the wire form, including CRLF.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_to(&mut buf);
        buf
    }
}

fn write_joined(buf: &mut Vec<u8>, items: &[String]) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            buf.push(b' ');
        }
        buf.extend_from_slice(item.as_bytes());
    }
}

/// Writes human-readable text, dropping bytes that would break the line.
fn write_text(buf: &mut Vec<u8>, text: &str) {
    buf.extend(text.bytes().filter(|&b| b != b'\r' && b != b'\n'));
}

/// Responses waiting to be written.
#[derive(Debug, Default)]
pub struct Outbox {
    pending: Vec<Response>,
}

impl Outbox {
    /// Creates an empty outbox.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Queues a response.
    pub fn push(&mut self, response: Response) {
        self.pending.push(response);
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Merges the queue, writes it and flushes `writer`.
    ///
    /// The queue is emptied even on error.
    pub async fn flush<W>(&mut self, writer: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let batch = std::mem::take(&mut self.pending);
        if batch.is_empty() {
            return Ok(());
        }
        let queued = batch.len();
        let merged = merge(batch)?;
        if merged.len() < queued {
            tracing::trace!(queued, written = merged.len(), "merged responses");
        }

        let mut buf = Vec::new();
        for response in &merged {
            response.write_to(&mut buf);
        }
        writer.write_all(&buf).await?;
        writer.flush().await?;
        Ok(())
    }
}
