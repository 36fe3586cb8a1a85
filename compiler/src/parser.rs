// Parser for type expressions.
//
// Parses a token stream (from the lexer) into a `Type`. Grammar:
//
//   type    := scalar | '&' 'mut'? type | ctor '<' type '>'
//   scalar  := 'void' | 'bool' | 'i32'
//   ctor    := 'Option' | 'Vec' | 'Iterator' | 'LockingCell' | 'NonLockingCell'
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns a `Type` plus any parse errors.
// Failure modes: syntax errors produce `Rich` diagnostics.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::lexer::Token;
use crate::types::Type;

/// Result of parsing: the type (if parsing succeeded) plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub ty: Option<Type>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse a type expression. Lexes then parses.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let (ty, parse_errors) = type_parser()
        .then_ignore(end())
        .parse(stream)
        .into_output_errors();

    let mut errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect();
    errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult { ty, errors }
}

/// Parse a type expression, folding any errors into one message.
pub fn parse_type(source: &str) -> Result<Type, String> {
    let result = parse(source);
    match (result.ty, result.errors.is_empty()) {
        (Some(ty), true) => Ok(ty),
        (_, false) => Err(result
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")),
        (None, true) => Err("empty type expression".to_string()),
    }
}

fn type_parser<'tokens, I>(
) -> impl Parser<'tokens, I, Type, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    recursive(|ty| {
        let scalar = select! {
            Token::Void => Type::Void,
            Token::Bool => Type::Boolean,
            Token::I32 => Type::Int32,
        };

        let generic = |keyword: Token, build: fn(Type) -> Type| {
            just(keyword)
                .ignore_then(ty.clone().delimited_by(just(Token::Lt), just(Token::Gt)))
                .map(build)
        };

        let reference = just(Token::Amp)
            .ignore_then(just(Token::Mut).or_not())
            .then(ty.clone())
            .map(|(mutable, inner)| Type::reference(inner, mutable.is_some()));

        choice((
            scalar,
            reference,
            generic(Token::Option, Type::option),
            generic(Token::Vec, Type::vector),
            generic(Token::Iterator, Type::iterator),
            generic(Token::LockingCell, Type::locking_cell),
            generic(Token::NonLockingCell, Type::non_locking_cell),
        ))
    })
}

// ── Tests ──
