// Lexer for type expressions.
//
// Tokenizes the type syntax used by graph documents and by `Type`'s
// `Display` (`&mut Option<i32>`, `LockingCell<Vec<bool>>`, ...).
// Uses the `logos` crate for DFA-based lexing.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters produce `LexError`; lexing continues.
// Side effects: none.

use logos::Logos;
use std::fmt;

/// Byte-offset span in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// Type-expression tokens. Type constructor names are keywords; any other
/// identifier lexes as `Ident` and is rejected by the parser.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    // ── Scalars ──
    #[token("void")]
    Void,
    #[token("bool")]
    Bool,
    #[token("i32")]
    I32,

    // ── Constructors ──
    #[token("Option")]
    Option,
    #[token("Vec")]
    Vec,
    #[token("Iterator")]
    Iterator,
    #[token("LockingCell")]
    LockingCell,
    #[token("NonLockingCell")]
    NonLockingCell,

    // ── References ──
    #[token("&")]
    Amp,
    #[token("mut")]
    Mut,

    // ── Delimiters ──
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Void => write!(f, "void"),
            Token::Bool => write!(f, "bool"),
            Token::I32 => write!(f, "i32"),
            Token::Option => write!(f, "Option"),
            Token::Vec => write!(f, "Vec"),
            Token::Iterator => write!(f, "Iterator"),
            Token::LockingCell => write!(f, "LockingCell"),
            Token::NonLockingCell => write!(f, "NonLockingCell"),
            Token::Amp => write!(f, "&"),
            Token::Mut => write!(f, "mut"),
            Token::Lt => write!(f, "<"),
            Token::Gt => write!(f, ">"),
            Token::Ident(name) => write!(f, "{name}"),
        }
    }
}

/// Lex a type expression into tokens.
pub fn lex(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span {
            start: range.start,
            end: range.end,
        };
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unexpected character: {:?}", &source[span.start..span.end]),
            }),
        }
    }

    LexResult { tokens, errors }
}

// ── Tests ──
