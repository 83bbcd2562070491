//! Client command lines.
//!
//! Only the commands the front end answers itself are given structure here.
//! Everything else is recognized by name so the session can refuse it with
//! the right tag.

#![allow(clippy::missing_errors_doc)]

use std::fmt;

use crate::Result;
use crate::connection::Line;
use crate::parser::{Parser, TokenKind};
use crate::types::{Mailbox, Tag};

/// A parsed client command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Client tag.
    pub tag: Tag,
    /// Command and arguments.
    pub command: Command,
}

/// Client commands.
#[derive(Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPABILITY.
    Capability,
    /// NOOP.
    Noop,
    /// LOGOUT.
    Logout,
    /// STARTTLS.
    StartTls,
    /// LOGIN userid password.
    Login {
        /// User name.
        username: Vec<u8>,
        /// Password.
        password: Vec<u8>,
    },
    /// SELECT mailbox.
    Select(Mailbox),
    /// EXAMINE mailbox.
    Examine(Mailbox),
    /// Any other command, by upper-cased name. Arguments are not parsed.
    Other(String),
}

impl Command {
    /// Returns the command name as sent on the wire.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Capability => "CAPABILITY",
            Self::Noop => "NOOP",
            Self::Logout => "LOGOUT",
            Self::StartTls => "STARTTLS",
            Self::Login { .. } => "LOGIN",
            Self::Select(_) => "SELECT",
            Self::Examine(_) => "EXAMINE",
            Self::Other(name) => name,
        }
    }
}

// Keeps passwords out of logs.
impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login { username, .. } => f
                .debug_struct("Login")
                .field("username", &String::from_utf8_lossy(username))
                .field("password", &"<redacted>")
                .finish(),
            Self::Select(mailbox) => f.debug_tuple("Select").field(mailbox).finish(),
            Self::Examine(mailbox) => f.debug_tuple("Examine").field(mailbox).finish(),
            Self::Other(name) => f.debug_tuple("Other").field(name).finish(),
            other => f.write_str(other.name()),
        }
    }
}

const fn is_tag_byte(byte: u8) -> bool {
    TokenKind::of(byte).is_astring() && byte != b'+'
}

/// Parses one logical line into a request.
///
/// ```text
/// command = tag SP (command-any / command-auth / command-nonauth) CRLF
/// tag     = 1*<any ASTRING-CHAR except "+">
/// ```
pub fn parse_request(line: &Line) -> Result<Request> {
    let mut p = line.parser();
    p.advance()?;

    let tag = p.collect_bytes_while_matches(|t| t.kind.is_astring() && t.value != b'+')?;
    if tag.is_empty() {
        return Err(p.error("expected tag"));
    }
    let tag = Tag::from_bytes(&tag);
    p.consume(TokenKind::Space, "expected SP after tag")?;

    let name = String::from_utf8_lossy(&p.atom()?).to_ascii_uppercase();
    let command = match name.as_str() {
        "CAPABILITY" => Command::Capability,
        "NOOP" => Command::Noop,
        "LOGOUT" => Command::Logout,
        "STARTTLS" => Command::StartTls,
        "LOGIN" => {
            p.consume(TokenKind::Space, "expected SP")?;
            let username = p.astring()?;
            p.consume(TokenKind::Space, "expected SP")?;
            let password = p.astring()?;
            Command::Login { username, password }
        }
        "SELECT" | "EXAMINE" => {
            p.consume(TokenKind::Space, "expected SP")?;
            let mailbox = p.mailbox()?;
            if name == "SELECT" {
                Command::Select(mailbox)
            } else {
                Command::Examine(mailbox)
            }
        }
        _ => return Ok(Request { tag, command: Command::Other(name) }),
    };
    end_of_line(&mut p)?;

    Ok(Request { tag, command })
}

fn end_of_line(p: &mut Parser<'_, &[u8]>) -> Result<()> {
    p.matches(TokenKind::Cr)?;
    p.consume(TokenKind::Lf, "expected CRLF")?;
    if !p.check(TokenKind::Eof) {
        return Err(p.error("unexpected data after CRLF"));
    }
    Ok(())
}

/// Recovers the tag of a line that could not be parsed, if it has one.
#[must_use]
pub fn request_tag(line: &[u8]) -> Option<Tag> {
    let end = line.iter().position(|&b| !is_tag_byte(b))?;
    (end > 0 && line[end] == b' ').then(|| Tag::from_bytes(&line[..end]))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::literal::Literals;

    fn line(text: &[u8]) -> Line {
        Line {
            text: text.to_vec(),
            literals: Literals::new(),
        }
    }

    fn parse(text: &[u8]) -> Result<Request> {
        parse_request(&line(text))
    }

    #[test]
    fn test_simple_commands() {
        let req = parse(b"a1 capability\r\n").unwrap();
        assert_eq!(req.tag.as_str(), "a1");
        assert_eq!(req.command, Command::Capability);

        assert_eq!(parse(b"a2 NOOP\r\n").unwrap().command, Command::Noop);
        assert_eq!(parse(b"a3 Logout\r\n").unwrap().command, Command::Logout);
        assert_eq!(parse(b"a4 STARTTLS\r\n").unwrap().command, Command::StartTls);
    }

    #[test]
    fn test_login() {
        let req = parse(b"a1 LOGIN fred \"s3 cret\"\r\n").unwrap();
        assert_eq!(
            req.command,
            Command::Login {
                username: b"fred".to_vec(),
                password: b"s3 cret".to_vec(),
            }
        );
    }

    #[test]
    fn test_login_with_literal() {
        let mut literals = Literals::new();
        let mut text = b"tag1 login ".to_vec();
        literals.push(&b"abcde"[..]).write_to(&mut text);
        text.extend_from_slice(b" pass\r\n");

        let req = parse_request(&Line { text, literals }).unwrap();
        assert_eq!(
            req.command,
            Command::Login {
                username: b"abcde".to_vec(),
                password: b"pass".to_vec(),
            }
        );
    }

    #[test]
    fn test_select_canonicalizes_inbox() {
        let req = parse(b"a1 SELECT inbox\r\n").unwrap();
        assert_eq!(req.command, Command::Select(Mailbox::inbox()));

        let req = parse(b"a1 EXAMINE \"Sent Items\"\r\n").unwrap();
        assert_eq!(req.command.name(), "EXAMINE");
        match req.command {
            Command::Examine(mailbox) => assert_eq!(mailbox.as_bytes(), b"Sent Items"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_other_command_keeps_tag() {
        let req = parse(b"x9 fetch 1:* (FLAGS)\r\n").unwrap();
        assert_eq!(req.tag.as_str(), "x9");
        assert_eq!(req.command, Command::Other("FETCH".to_string()));
    }

    #[test]
    fn test_bare_lf_accepted() {
        assert_eq!(parse(b"a1 NOOP\n").unwrap().command, Command::Noop);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(parse(b"+1 NOOP\r\n"), Err(Error::Parse(_))));
        assert!(matches!(parse(b"a1\r\n"), Err(Error::Parse(_))));
        assert!(matches!(parse(b"a1 NOOP extra\r\n"), Err(Error::Parse(_))));
        assert!(matches!(parse(b"a1 LOGIN onlyuser\r\n"), Err(Error::Parse(_))));
        assert!(matches!(parse(b"a1 SELECT \"open\r\n"), Err(Error::Parse(_))));
    }

    #[test]
    fn test_truncated_line_is_eof() {
        let err = parse(b"a1 LOGIN fred").unwrap_err();
        assert!(err.is_eof());
    }

    #[test]
    fn test_request_tag() {
        assert_eq!(request_tag(b"a1 LOGIN {0}\r\n"), Some(Tag::new("a1")));
        assert_eq!(request_tag(b"tag.2 \x00x\r\n"), Some(Tag::new("tag.2")));
        assert_eq!(request_tag(b" NOOP\r\n"), None);
        assert_eq!(request_tag(b"+ NOOP\r\n"), None);
        assert_eq!(request_tag(b"a1\r\n"), None);
        assert_eq!(request_tag(b"a1"), None);
    }

    #[test]
    fn test_debug_redacts_password() {
        let command = Command::Login {
            username: b"fred".to_vec(),
            password: b"hunter2".to_vec(),
        };
        let shown = format!("{command:?}");
        assert!(shown.contains("fred"));
        assert!(!shown.contains("hunter2"));
        assert_eq!(format!("{:?}", Command::Noop), "NOOP");
    }
}
