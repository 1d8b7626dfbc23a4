//! Parsing struct bodies into field declarations.

use fxhash::FxHashSet;
use itertools::Itertools;

use crate::reporting::ParseMessage;
use crate::source::{BytePos, ByteRange};
use crate::surface::lexer::{Spanned, Token};
use crate::surface::scan::matching_brace;
use crate::surface::{Alternative, AlternativeType, Field, FieldType, InlineStruct, UnionDecl};

type Tok<'source> = Spanned<Token<'source>, BytePos>;

const ACCESS_SPECIFIERS: &[&str] = &["public", "private", "protected"];
const UNSUPPORTED_TYPE_KEYWORDS: &[&str] = &["bitfield", "class", "template", "union"];

/// Parse the tokens between a struct's braces.
pub fn parse_fields(source: &str, tokens: &[Tok<'_>]) -> Result<Vec<Field>, ParseMessage> {
    let mut names = FxHashSet::default();
    let mut fields = Vec::new();

    for decl in split_decls(tokens)? {
        let decl = strip_access_specifiers(decl);
        if decl.is_empty() {
            continue;
        }

        let field = match decl[0].1 {
            Token::Name("union") => parse_union(source, decl)?,
            _ => {
                let (name, r#type) = parse_member(source, decl)?;
                let r#type = match r#type {
                    AlternativeType::Named(type_name) => FieldType::Named(type_name),
                    AlternativeType::Inline(inline) => FieldType::Inline(inline),
                };
                Field {
                    range: decl_range(decl),
                    name,
                    r#type,
                }
            }
        };

        if !names.insert(field.name.clone()) {
            return Err(ParseMessage::DuplicateField {
                range: field.range,
                name: field.name,
            });
        }
        fields.push(field);
    }

    Ok(fields)
}

/// Split on `;` outside nested braces.
fn split_decls<'a, 'source>(tokens: &'a [Tok<'source>]) -> Result<Vec<&'a [Tok<'source>]>, ParseMessage> {
    let mut decls = Vec::new();
    let mut start = 0;
    let mut depth = 0_usize;

    for (index, (token_start, token, token_end)) in tokens.iter().enumerate() {
        match token {
            Token::OpenBrace => depth += 1,
            Token::CloseBrace => {
                depth = depth
                    .checked_sub(1)
                    .ok_or(ParseMessage::UnexpectedCloseBrace {
                        range: ByteRange::new(*token_start, *token_end),
                    })?;
            }
            Token::Semicolon if depth == 0 => {
                if index > start {
                    decls.push(&tokens[start..index]);
                }
                start = index + 1;
            }
            _ => {}
        }
    }

    match tokens.get(start..) {
        Some(trailing) if !trailing.is_empty() => Err(ParseMessage::ExpectedDeclTerminator {
            range: decl_range(trailing),
        }),
        _ => Ok(decls),
    }
}

fn strip_access_specifiers<'a, 'source>(mut decl: &'a [Tok<'source>]) -> &'a [Tok<'source>] {
    while let [(_, Token::Name(name), _), (_, Token::Colon, _), rest @ ..] = decl {
        if !ACCESS_SPECIFIERS.contains(name) {
            break;
        }
        decl = rest;
    }
    decl
}

fn decl_range(decl: &[Tok<'_>]) -> ByteRange {
    match (decl.first(), decl.last()) {
        (Some((start, _, _)), Some((_, _, end))) => ByteRange::new(*start, *end),
        _ => ByteRange::empty(0),
    }
}

fn token_range((start, _, end): &Tok<'_>) -> ByteRange {
    ByteRange::new(*start, *end)
}

/// Tokens of `decl` that are not inside a nested `{ ... }`.
fn top_level<'a, 'source>(decl: &'a [Tok<'source>]) -> impl Iterator<Item = &'a Tok<'source>> {
    let mut depth = 0_usize;
    decl.iter().filter(move |(_, token, _)| match token {
        Token::OpenBrace => {
            depth += 1;
            false
        }
        Token::CloseBrace => {
            depth = depth.saturating_sub(1);
            false
        }
        _ => depth == 0,
    })
}

/// Reject the field shapes that have no fixed-layout encoding.
fn check_field_shape(decl: &[Tok<'_>]) -> Result<(), ParseMessage> {
    let find = |predicate: fn(&Token<'_>) -> bool| top_level(decl).find(|(_, token, _)| predicate(token));

    if let Some(token) = find(|token| matches!(token, Token::Equals)) {
        return Err(ParseMessage::DefaultInitializer {
            range: token_range(token),
        });
    }
    if let Some(token) = find(|token| matches!(token, Token::Star | Token::Ampersand)) {
        return Err(ParseMessage::PointerOrReference {
            range: token_range(token),
        });
    }
    if let Some(token) = find(|token| matches!(token, Token::OpenBracket | Token::CloseBracket)) {
        return Err(ParseMessage::Array {
            range: token_range(token),
        });
    }
    if let Some(token) = find(|token| matches!(token, Token::Colon)) {
        return Err(ParseMessage::BitField {
            range: token_range(token),
        });
    }
    Ok(())
}

/// Parse a leaf field or an inline nested struct.
fn parse_member(source: &str, decl: &[Tok<'_>]) -> Result<(String, AlternativeType), ParseMessage> {
    check_field_shape(decl)?;

    if let Token::Name("struct") = decl[0].1 {
        let (name, inline) = parse_inline_struct(source, decl)?;
        return Ok((name, AlternativeType::Inline(inline)));
    }

    let range = decl_range(decl);
    let (name, type_tokens) = match decl.split_last() {
        Some(((_, Token::Name(name), _), type_tokens)) if !type_tokens.is_empty() => {
            (name.to_string(), type_tokens)
        }
        _ => return Err(ParseMessage::ExpectedDeclaration { range }),
    };

    for token in type_tokens {
        match &token.1 {
            Token::Name("struct") => {
                return Err(ParseMessage::NamedStructSpelling {
                    range: token_range(token),
                });
            }
            Token::Name(word) if UNSUPPORTED_TYPE_KEYWORDS.contains(word) => {
                return Err(ParseMessage::UnsupportedTypeDeclaration {
                    range: token_range(token),
                });
            }
            Token::OpenBrace | Token::CloseBrace => {
                return Err(ParseMessage::UnsupportedTypeDeclaration {
                    range: token_range(token),
                });
            }
            _ => {}
        }
    }

    let type_range = decl_range(type_tokens);
    let type_name = source
        .get(std::ops::Range::<usize>::from(type_range))
        .map(normalize_type)
        .ok_or(ParseMessage::ExpectedDeclaration { range })?;

    Ok((name, AlternativeType::Named(type_name)))
}

/// Collapse runs of whitespace in a type spelling to single spaces.
pub fn normalize_type(type_name: &str) -> String {
    type_name.split_whitespace().join(" ")
}

/// `struct Name { ... } field`
fn parse_inline_struct(source: &str, decl: &[Tok<'_>]) -> Result<(String, InlineStruct), ParseMessage> {
    let range = decl_range(decl);

    let name = match decl.get(1) {
        Some((_, Token::OpenBrace, _)) => return Err(ParseMessage::AnonymousStruct { range }),
        Some((_, Token::Name(name), _)) => name.to_string(),
        _ => return Err(ParseMessage::ExpectedNestedStructName { range }),
    };
    if !matches!(decl.get(2), Some((_, Token::OpenBrace, _))) {
        return Err(ParseMessage::NamedStructSpelling { range });
    }

    let close = matching_brace(decl, 2).ok_or(ParseMessage::UnbalancedBraces {
        range: token_range(&decl[2]),
    })?;
    let field_name = match &decl[(close + 1)..] {
        [(_, Token::Name(field_name), _)] => field_name.to_string(),
        [.., (_, Token::Name(_), _)] => return Err(ParseMessage::InlineStructTrailingTokens { range }),
        _ => return Err(ParseMessage::ExpectedDeclaration { range }),
    };

    let fields = parse_fields(source, &decl[3..close])?;
    Ok((field_name, InlineStruct { range, name, fields }))
}

/// `union Name { alternative; ... } field`
fn parse_union(source: &str, decl: &[Tok<'_>]) -> Result<Field, ParseMessage> {
    let range = decl_range(decl);
    check_field_shape(decl)?;

    let union_name = match (decl.get(1), decl.get(2)) {
        (Some((_, Token::OpenBrace, _)), _) => return Err(ParseMessage::AnonymousUnion { range }),
        (Some((_, Token::Name(name), _)), Some((_, Token::OpenBrace, _))) => name.to_string(),
        _ => return Err(ParseMessage::ExpectedNamedUnion { range }),
    };

    let close = matching_brace(decl, 2).ok_or(ParseMessage::UnbalancedBraces {
        range: token_range(&decl[2]),
    })?;
    let field_name = match &decl[(close + 1)..] {
        [(_, Token::Name(field_name), _)] => field_name.to_string(),
        [] => {
            return Err(ParseMessage::ExpectedUnionFieldName {
                range: ByteRange::empty(decl[close].2),
            });
        }
        after => {
            return Err(ParseMessage::ExpectedUnionFieldName {
                range: decl_range(after),
            });
        }
    };

    let alternative_decls = (split_decls(&decl[3..close])?.into_iter())
        .map(strip_access_specifiers)
        .filter(|alternative_decl| !alternative_decl.is_empty())
        .collect::<Vec<_>>();
    if alternative_decls.is_empty() {
        return Err(ParseMessage::EmptyUnion {
            range: token_range(&decl[2]),
        });
    }

    let mut alternative_names = FxHashSet::default();
    let mut inline_names = FxHashSet::default();
    let mut alternatives = Vec::with_capacity(alternative_decls.len());
    for alternative_decl in alternative_decls {
        let alternative_range = decl_range(alternative_decl);
        if let Token::Name("union") = alternative_decl[0].1 {
            return Err(ParseMessage::NestedUnion {
                range: alternative_range,
            });
        }

        let (name, r#type) = parse_member(source, alternative_decl)?;
        if let AlternativeType::Inline(inline) = &r#type {
            if !inline_names.insert(inline.name.clone()) {
                return Err(ParseMessage::DuplicateInlineName {
                    range: alternative_range,
                    name: inline.name.clone(),
                    union_name,
                });
            }
        }
        if !alternative_names.insert(name.clone()) {
            return Err(ParseMessage::DuplicateAlternative {
                range: alternative_range,
                name,
                union_name,
            });
        }

        alternatives.push(Alternative {
            range: alternative_range,
            name,
            r#type,
        });
    }

    Ok(Field {
        range,
        name: field_name,
        r#type: FieldType::Union(UnionDecl {
            name: union_name,
            alternatives,
        }),
    })
}
