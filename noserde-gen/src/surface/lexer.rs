use logos::{Filter, Logos};

use crate::reporting::ParseMessage;
use crate::source::{BytePos, ByteRange};

/// Tokens of the host language that the generator cares about.
///
/// Comments are skipped and quoted literals are consumed whole, so an
/// annotation, brace or separator inside either never shows up as a token.
/// Characters that mean nothing to the generator come through as
/// [`Token::Error`], which is only an error inside an annotated struct.
#[derive(Clone, Debug, PartialEq, Eq, Logos)]
pub enum Token<'source> {
    #[token("[[noserde]]")]
    Attribute,
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Name(&'source str),
    #[regex(r"[0-9][a-zA-Z0-9_.]*")]
    NumberLiteral(&'source str),
    #[token("\"", |lex| quoted(lex, '"'))]
    StringLiteral,
    #[token("'", |lex| quoted(lex, '\''))]
    CharLiteral,

    #[token("&")]
    Ampersand,
    #[token("*")]
    Star,
    #[token("=")]
    Equals,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("::")]
    ColonColon,
    #[token(";")]
    Semicolon,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("{")]
    OpenBrace,
    #[token("}")]
    CloseBrace,
    #[token("[")]
    OpenBracket,
    #[token("]")]
    CloseBracket,
    #[token("(")]
    OpenParen,
    #[token(")")]
    CloseParen,

    #[token("/*", block_comment)]
    UnterminatedBlockComment(ByteRange),

    #[error]
    #[regex(r"\p{Whitespace}", logos::skip)]
    #[regex(r"//[^\n]*", logos::skip)]
    Error,
}

const OPEN: &str = "/*";
const CLOSE: &str = "*/";

fn block_comment<'source>(lexer: &mut logos::Lexer<'source, Token<'source>>) -> Filter<ByteRange> {
    let start = lexer.span().start as BytePos;
    match lexer.remainder().find(CLOSE) {
        Some(index) => {
            lexer.bump(index + CLOSE.len());
            Filter::Skip
        }
        None => {
            lexer.bump(lexer.remainder().len());
            Filter::Emit(ByteRange::new(start, start + OPEN.len() as BytePos))
        }
    }
}

/// Consume a quoted literal up to and including its closing quote. A
/// backslash always takes the following character with it. An unterminated
/// literal runs to the end of the source.
fn quoted<'source>(lexer: &mut logos::Lexer<'source, Token<'source>>, quote: char) -> bool {
    let remainder = lexer.remainder();
    let mut end = remainder.len();
    let mut chars = remainder.char_indices();
    while let Some((index, ch)) = chars.next() {
        if ch == '\\' {
            chars.next();
        } else if ch == quote {
            end = index + ch.len_utf8();
            break;
        }
    }
    lexer.bump(end);
    true
}

pub type Spanned<Tok, Loc> = (Loc, Tok, Loc);

/// Lex the whole source up front.
pub fn tokens(source: &str) -> Result<Vec<Spanned<Token<'_>, BytePos>>, ParseMessage> {
    assert!(
        source.len() <= u32::MAX as usize,
        "`source` must be less than 4GiB in length"
    );

    Token::lexer(source)
        .spanned()
        .map(|(token, range)| match token {
            Token::UnterminatedBlockComment(range) => {
                Err(ParseMessage::UnterminatedBlockComment { range })
            }
            token => Ok((range.start as BytePos, token, range.end as BytePos)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token<'_>> {
        tokens(source)
            .unwrap()
            .into_iter()
            .map(|(_, token, _)| token)
            .collect()
    }

    #[test]
    fn attribute_in_code() {
        assert_eq!(
            kinds("[[noserde]] struct A {};"),
            vec![
                Token::Attribute,
                Token::Name("struct"),
                Token::Name("A"),
                Token::OpenBrace,
                Token::CloseBrace,
                Token::Semicolon,
            ],
        );
    }

    #[test]
    fn attribute_in_comments_and_literals_is_hidden() {
        let source = "// [[noserde]]\n/* [[noserde]] */ \"[[noserde]]\" '[' x";
        assert_eq!(
            kinds(source),
            vec![Token::StringLiteral, Token::CharLiteral, Token::Name("x")],
        );
    }

    #[test]
    fn escaped_quote_does_not_end_literal() {
        let source = r#""a \" { [[noserde]]" }"#;
        assert_eq!(kinds(source), vec![Token::StringLiteral, Token::CloseBrace]);
    }

    #[test]
    fn unterminated_literal_runs_to_end() {
        assert_eq!(kinds("x \"abc { ;"), vec![Token::Name("x"), Token::StringLiteral]);
    }

    #[test]
    fn unterminated_block_comment_is_pinned_to_start() {
        let error = tokens("int x; /* never closed").unwrap_err();
        assert_eq!(
            error,
            ParseMessage::UnterminatedBlockComment {
                range: ByteRange::new(7, 9)
            },
        );
    }

    #[test]
    fn unknown_characters_are_not_fatal() {
        assert_eq!(
            kinds("#include <noserde.hpp>"),
            vec![
                Token::Error,
                Token::Name("include"),
                Token::Less,
                Token::Name("noserde"),
                Token::Error,
                Token::Name("hpp"),
                Token::Greater,
            ],
        );
    }
}
