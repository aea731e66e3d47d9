//! Public token model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::rc::Rc;
use thiserror::Error;

/// Separator family used by a formula's locale.
///
/// | Culture        | decimal | list | chaining |
/// |----------------|---------|------|----------|
/// | `Invariant`    | `.`     | `,`  | `;`      |
/// | `CommaDecimal` | `,`     | `;`  | `;;`     |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Culture {
    #[default]
    Invariant,
    CommaDecimal,
}

/// Why a stretch of input could not be tokenized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated block comment")]
    UnterminatedComment,
    #[error("unterminated quoted identifier")]
    UnterminatedIdentifier,
    #[error("separator '{0}' is not valid in this culture")]
    MisplacedSeparator(char),
}

/// A token with its byte span in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

impl Token {
    pub fn new(kind: TokenKind, span: Range<usize>) -> Self {
        Self { kind, span }
    }
}

/// Token kinds produced by the [`Tokenizer`](crate::Tokenizer).
///
/// Numeric literals keep their normalized source text (always `.` as decimal
/// separator) so the parser can decide between float and decimal
/// representation from its own options.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // === Literals ===
    Number(Rc<str>),
    Str(Rc<str>),
    /// Identifier; `quoted` is set for `'Display Name'` forms.
    Ident { name: Rc<str>, quoted: bool },

    // === String interpolation ===
    /// `$"` opening an interpolated string.
    InterpStart,
    /// Literal text run between islands.
    InterpText(Rc<str>),
    /// `{` opening an island inside an interpolated string.
    IslandStart,
    /// `}` closing an island.
    IslandEnd,
    /// Closing `"` of an interpolated string.
    InterpEnd,

    // === Trivia ===
    Comment(Rc<str>),

    // === Keywords ===
    True,
    False,
    And,
    Or,
    Not,
    In,
    ExactIn,
    As,
    SelfKw,
    Parent,

    // === Operators ===
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Ampersand,
    Percent,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AmpAmp,
    PipePipe,
    Bang,
    Dot,
    At,
    Colon,

    // === Separators (already resolved against the culture) ===
    ListSep,
    ChainSep,

    // === Delimiters ===
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    Error(LexError),
}

impl TokenKind {
    pub fn is_trivia(&self) -> bool {
        matches!(self, TokenKind::Comment(_))
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Number(n) => return write!(f, "{n}"),
            TokenKind::Str(s) => return write!(f, "\"{s}\""),
            TokenKind::Ident { name, quoted: true } => return write!(f, "'{name}'"),
            TokenKind::Ident { name, .. } => return write!(f, "{name}"),
            TokenKind::InterpText(s) => return write!(f, "{s}"),
            TokenKind::Comment(c) => return write!(f, "{c}"),
            TokenKind::Error(e) => return write!(f, "<{e}>"),
            TokenKind::InterpStart => "$\"",
            TokenKind::IslandStart => "{",
            TokenKind::IslandEnd => "}",
            TokenKind::InterpEnd => "\"",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::And => "And",
            TokenKind::Or => "Or",
            TokenKind::Not => "Not",
            TokenKind::In => "in",
            TokenKind::ExactIn => "exactin",
            TokenKind::As => "As",
            TokenKind::SelfKw => "Self",
            TokenKind::Parent => "Parent",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Caret => "^",
            TokenKind::Ampersand => "&",
            TokenKind::Percent => "%",
            TokenKind::Eq => "=",
            TokenKind::NotEq => "<>",
            TokenKind::Lt => "<",
            TokenKind::LtEq => "<=",
            TokenKind::Gt => ">",
            TokenKind::GtEq => ">=",
            TokenKind::AmpAmp => "&&",
            TokenKind::PipePipe => "||",
            TokenKind::Bang => "!",
            TokenKind::Dot => ".",
            TokenKind::At => "@",
            TokenKind::Colon => ":",
            TokenKind::ListSep => "<list separator>",
            TokenKind::ChainSep => "<chain separator>",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
        };
        f.write_str(s)
    }
}
