//! Raw logos token set.
//!
//! These are the culture-independent lexical atoms. Separators, string bodies,
//! quoted identifiers and block comments are finished by the mode-aware
//! [`Tokenizer`](crate::Tokenizer), which needs context logos cannot carry.

use logos::Logos;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\u{00A0}]+")]
pub(crate) enum Raw {
    // === Trivia and bodies finished by the tokenizer ===
    #[regex(r"//[^\n]*")]
    LineComment,
    #[token("/*")]
    BlockCommentStart,
    #[token("\"")]
    Quote,
    #[token("$\"")]
    InterpStart,
    #[token("'")]
    SingleQuote,

    // === Literals ===
    #[regex(r"[0-9]+(\.[0-9]+)?([eE][+-]?[0-9]+)?")]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?")]
    Number,
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,

    // === Keywords ===
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("And")]
    And,
    #[token("Or")]
    Or,
    #[token("Not")]
    Not,
    #[token("in")]
    In,
    #[token("exactin")]
    ExactIn,
    #[token("As")]
    As,
    #[token("Self")]
    SelfKw,
    #[token("Parent")]
    Parent,

    // === Operators ===
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("^")]
    Caret,
    #[token("&")]
    Ampersand,
    #[token("%")]
    Percent,
    #[token("=")]
    Eq,
    #[token("<>")]
    NotEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,
    #[token("!")]
    Bang,
    #[token(".")]
    Dot,
    #[token("@")]
    At,
    #[token(":")]
    Colon,

    // === Separators (meaning depends on culture) ===
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(";;")]
    DoubleSemicolon,

    // === Delimiters ===
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
}
