//! Byte-level token types.

/// Class of a single input byte.
///
/// Every byte value maps to exactly one kind, and the mapping depends only on
/// the value. Printable punctuation gets one variant per character so grammar
/// code can match on kinds instead of raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// `0`-`9`.
    Digit,
    /// ASCII letter.
    Char,
    /// Byte with the high bit set.
    Extended,
    /// Carriage return.
    Cr,
    /// Line feed.
    Lf,
    /// Any other control byte, including NUL and DEL.
    Ctl,
    /// Space.
    Space,
    /// End of input.
    Eof,
    /// No token (window not yet primed).
    Error,
    /// `!`
    Exclamation,
    /// `"`
    DoubleQuote,
    /// `#`
    Hash,
    /// `$`
    Dollar,
    /// `%`
    Percent,
    /// `&`
    Ampersand,
    /// `'`
    Apostrophe,
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// `*`
    Asterisk,
    /// `+`
    Plus,
    /// `,`
    Comma,
    /// `-`
    Minus,
    /// `.`
    Period,
    /// `/`
    Slash,
    /// `:`
    Colon,
    /// `;`
    Semicolon,
    /// `<`
    LessThan,
    /// `=`
    Equals,
    /// `>`
    GreaterThan,
    /// `?`
    Question,
    /// `@`
    At,
    /// `[`
    LeftBracket,
    /// `\`
    Backslash,
    /// `]`
    RightBracket,
    /// `^`
    Caret,
    /// `_`
    Underscore,
    /// `` ` ``
    Backtick,
    /// `{`
    LeftBrace,
    /// `|`
    Pipe,
    /// `}`
    RightBrace,
    /// `~`
    Tilde,
}

impl TokenKind {
    /// Classifies a byte.
    #[must_use]
    pub const fn of(byte: u8) -> Self {
        match byte {
            b'0'..=b'9' => Self::Digit,
            b'A'..=b'Z' | b'a'..=b'z' => Self::Char,
            0x80..=0xFF => Self::Extended,
            b'\r' => Self::Cr,
            b'\n' => Self::Lf,
            0x00..=0x1F | 0x7F => Self::Ctl,
            b' ' => Self::Space,
            b'!' => Self::Exclamation,
            b'"' => Self::DoubleQuote,
            b'#' => Self::Hash,
            b'$' => Self::Dollar,
            b'%' => Self::Percent,
            b'&' => Self::Ampersand,
            b'\'' => Self::Apostrophe,
            b'(' => Self::LeftParen,
            b')' => Self::RightParen,
            b'*' => Self::Asterisk,
            b'+' => Self::Plus,
            b',' => Self::Comma,
            b'-' => Self::Minus,
            b'.' => Self::Period,
            b'/' => Self::Slash,
            b':' => Self::Colon,
            b';' => Self::Semicolon,
            b'<' => Self::LessThan,
            b'=' => Self::Equals,
            b'>' => Self::GreaterThan,
            b'?' => Self::Question,
            b'@' => Self::At,
            b'[' => Self::LeftBracket,
            b'\\' => Self::Backslash,
            b']' => Self::RightBracket,
            b'^' => Self::Caret,
            b'_' => Self::Underscore,
            b'`' => Self::Backtick,
            b'{' => Self::LeftBrace,
            b'|' => Self::Pipe,
            b'}' => Self::RightBrace,
            b'~' => Self::Tilde,
        }
    }

    /// Returns true for bytes that may appear in an atom.
    ///
    /// Bytes above 0x7F are accepted so 8-bit names pass through unquoted.
    ///
    /// ```text
    /// ATOM-CHAR    = <any CHAR except atom-specials>
    /// atom-specials = "(" / ")" / "{" / SP / CTL / list-wildcards /
    ///                 quoted-specials / resp-specials
    /// ```
    #[must_use]
    pub const fn is_atom(self) -> bool {
        !matches!(
            self,
            Self::LeftParen
                | Self::RightParen
                | Self::LeftBrace
                | Self::Space
                | Self::Cr
                | Self::Lf
                | Self::Ctl
                | Self::Asterisk
                | Self::Percent
                | Self::DoubleQuote
                | Self::Backslash
                | Self::RightBracket
                | Self::Eof
                | Self::Error
        )
    }

    /// Returns true for bytes that may appear in an unquoted astring.
    #[must_use]
    pub const fn is_astring(self) -> bool {
        self.is_atom() || matches!(self, Self::RightBracket)
    }

    /// Returns true for bytes that may appear unescaped inside a quoted string.
    #[must_use]
    pub const fn is_quoted(self) -> bool {
        !matches!(
            self,
            Self::DoubleQuote | Self::Backslash | Self::Cr | Self::Lf | Self::Eof | Self::Error
        )
    }
}

/// One classified input byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    /// Byte class.
    pub kind: TokenKind,
    /// The raw byte (0 for [`TokenKind::Eof`] and [`TokenKind::Error`]).
    pub value: u8,
    /// Position relative to the last offset reset.
    pub offset: usize,
}

impl Token {
    /// Creates a token.
    #[must_use]
    pub const fn new(kind: TokenKind, value: u8, offset: usize) -> Self {
        Self {
            kind,
            value,
            offset,
        }
    }

    /// Classifies `value` found at `offset`.
    #[must_use]
    pub const fn from_byte(value: u8, offset: usize) -> Self {
        Self::new(TokenKind::of(value), value, offset)
    }

    /// End-of-input marker at `offset`.
    #[must_use]
    pub const fn eof(offset: usize) -> Self {
        Self::new(TokenKind::Eof, 0, offset)
    }

    /// Placeholder used before the parser window is primed.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(TokenKind::Error, 0, 0)
    }
}
