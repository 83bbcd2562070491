//! # imapd-wire
//!
//! The wire layer of an IMAP4rev1 (RFC 3501) server: everything between raw
//! connection bytes and structured commands on the way in, and between
//! queued responses and bytes on the way out.
//!
//! ## Features
//!
//! - **Byte scanner and lexical parser**: atoms, quoted strings, literals,
//!   astrings, mailbox names and numbers over a two-token lookahead window
//! - **Literal-aware line reader**: chained `{N}` literals are absorbed
//!   behind a continuation hook, with size bounds checked before any
//!   payload is read
//! - **TLS via rustls**: implicit TLS detected from the first byte on a
//!   shared port, plus STARTTLS
//! - **Response merging**: redundant `EXISTS`/`RECENT` updates collapse
//!   without crossing `EXPUNGE` or any other response
//!
//! ## Quick Start
//!
//! ```ignore
//! use imapd_wire::{ContinuationReply, ImapStream, Liner, Outbox, Response, Status};
//!
//! let mut liner = Liner::new(ImapStream::new(tcp, Some(acceptor)));
//! while let Some(line) = liner.read_line(&mut ContinuationReply).await? {
//!     let request = imapd_wire::parse_request(&line)?;
//!     let mut outbox = Outbox::new();
//!     outbox.push(Response::tagged(request.tag, Status::Ok, "done"));
//!     outbox.flush(liner.get_mut()).await?;
//! }
//! ```
//!
//! ## Modules
//!
//! - [`parser`]: Scanner and lexical productions
//! - [`literal`]: Literal payload table and placeholders
//! - [`connection`]: Line reader, TLS sniffing stream, TLS setup
//! - [`command`]: Command line parsing
//! - [`response`]: Server responses, merging and the outbox
//! - [`types`]: Tags, mailbox names, statuses

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod literal;
pub mod parser;
pub mod response;
pub mod types;

pub use command::{Command, Request, parse_request, request_tag};
pub use connection::{
    ContinuationHook, ContinuationReply, ImapStream, Line, Liner, load_tls_acceptor,
};
pub use error::{Error, ParseError, Rejection, Result};
pub use literal::{Literals, MAX_LITERAL_SIZE, Placeholder};
pub use parser::{Parser, Scanner, Token, TokenKind};
pub use response::{MergeClass, Outbox, Response, merge};
pub use types::{Mailbox, Status, Tag};

/// IMAP protocol version served.
pub const IMAP_VERSION: &str = "IMAP4rev1";
