//! Core IMAP types.
//!
//! This module defines the small set of protocol values the wire layer hands
//! to the session: command tags, mailbox names and completion statuses,
//! following RFC 3501 (`IMAP4rev1`).

#![allow(clippy::missing_const_for_fn)]

mod identifiers;
mod mailbox;
mod status;

pub use identifiers::Tag;
pub use mailbox::Mailbox;
pub use status::Status;
