//! Locating annotated structs in the token stream.

use std::ops::Range;

use crate::reporting::ParseMessage;
use crate::source::{BytePos, ByteRange};
use crate::surface::lexer::{Spanned, Token};

type Tok<'source> = Spanned<Token<'source>, BytePos>;

const STRUCT_KEYWORD: &str = "struct";

/// An annotated struct located in the source, before its body is parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSpan {
    pub name: String,
    pub name_range: ByteRange,
    /// Bytes to replace, up to and including the terminating `;`.
    pub range: ByteRange,
    /// Token indices strictly between the braces.
    pub body: Range<usize>,
}

/// Indices of the annotation tokens, in source order. Comments and quoted
/// literals never produce tokens, so every index here is in code.
pub fn attribute_positions(tokens: &[Tok<'_>]) -> Vec<usize> {
    (tokens.iter().enumerate())
        .filter(|(_, (_, token, _))| *token == Token::Attribute)
        .map(|(index, _)| index)
        .collect()
}

/// Find the `}` matching the `{` at `open`.
pub fn matching_brace(tokens: &[Tok<'_>], open: usize) -> Option<usize> {
    let mut depth = 0_usize;
    for (index, (_, token, _)) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::OpenBrace => depth += 1,
            Token::CloseBrace => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract every annotated struct. Annotations that fall inside a struct
/// that was already extracted are ignored.
pub fn extract_blocks(tokens: &[Tok<'_>], source_len: usize) -> Result<Vec<BlockSpan>, ParseMessage> {
    let eof = ByteRange::empty(source_len as BytePos);
    let range_at = |index: usize| match tokens.get(index) {
        Some((start, _, end)) => ByteRange::new(*start, *end),
        None => eof,
    };

    let mut blocks = Vec::new();
    let mut consumed_until = 0;

    for attribute in attribute_positions(tokens) {
        if attribute < consumed_until {
            continue;
        }

        // `struct [[noserde]] Name { ... };`
        let previous = (attribute > consumed_until).then(|| &tokens[attribute - 1]);
        let (start, name_index) = match previous {
            Some((start, Token::Name(STRUCT_KEYWORD), _)) => (*start, attribute + 1),
            _ => {
                let keyword = attribute + 1;
                match tokens.get(keyword) {
                    Some((_, Token::Name(STRUCT_KEYWORD), _)) => {}
                    Some((_, Token::Name(name), _)) if name.starts_with(STRUCT_KEYWORD) => {
                        return Err(ParseMessage::ExpectedStructKeyword {
                            range: range_at(keyword),
                        });
                    }
                    _ => {
                        return Err(ParseMessage::ExpectedStructAfterAttribute {
                            range: range_at(keyword),
                        });
                    }
                }
                (tokens[attribute].0, keyword + 1)
            }
        };

        let name = match tokens.get(name_index) {
            Some((_, Token::Name(name), _)) => name.to_string(),
            _ => {
                return Err(ParseMessage::ExpectedIdentifier {
                    range: range_at(name_index),
                });
            }
        };

        let open = name_index + 1;
        if !matches!(tokens.get(open), Some((_, Token::OpenBrace, _))) {
            return Err(ParseMessage::ExpectedStructBody {
                range: range_at(open),
            });
        }
        let close = matching_brace(tokens, open).ok_or(ParseMessage::UnbalancedBraces {
            range: range_at(open),
        })?;

        let terminator = close + 1;
        let end = match tokens.get(terminator) {
            Some((_, Token::Semicolon, end)) => *end,
            _ => {
                return Err(ParseMessage::ExpectedStructTerminator {
                    range: range_at(terminator),
                });
            }
        };

        blocks.push(BlockSpan {
            name,
            name_range: range_at(name_index),
            range: ByteRange::new(start, end),
            body: (open + 1)..close,
        });
        consumed_until = terminator + 1;
    }

    Ok(blocks)
}
