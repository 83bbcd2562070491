//! Connection handling for the server side of IMAP.
//!
//! This module provides:
//! - TLS sniffing and STARTTLS on accepted connections
//! - Literal-aware reading of logical command lines
//! - TLS acceptor construction from PEM files

mod liner;
mod stream;
mod tls;

pub use liner::{
    CONTINUATION_TEXT, ContinuationHook, ContinuationReply, Line, Liner, MAX_COMMAND_SIZE,
    MAX_LINE_LENGTH,
};
pub use stream::{ImapStream, Prefixed, TLS_HANDSHAKE_RECORD};
pub use tls::{load_tls_acceptor, tls_acceptor_from_pem};
