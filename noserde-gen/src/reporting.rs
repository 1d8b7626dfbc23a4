//! Diagnostic messages produced by the generator pipeline.
//!
//! Every stage fails with a [`ParseMessage`], which can be converted to a
//! [`Diagnostic`] in order to present it to the user. Messages that do not
//! stop the pipeline are [`WarningMessage`]s.

use codespan_reporting::diagnostic::{Diagnostic, Label};
use std::fmt;

use crate::source::ByteRange;
use crate::ATTRIBUTE_TOKEN;

/// Messages that abort the current invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseMessage {
    UnterminatedBlockComment {
        range: ByteRange,
    },
    ExpectedStructAfterAttribute {
        range: ByteRange,
    },
    ExpectedStructKeyword {
        range: ByteRange,
    },
    ExpectedIdentifier {
        range: ByteRange,
    },
    ExpectedStructBody {
        range: ByteRange,
    },
    ExpectedStructTerminator {
        range: ByteRange,
    },
    UnbalancedBraces {
        range: ByteRange,
    },
    UnexpectedCloseBrace {
        range: ByteRange,
    },
    ExpectedDeclTerminator {
        range: ByteRange,
    },
    DuplicateStruct {
        range: ByteRange,
        name: String,
    },
    DefaultInitializer {
        range: ByteRange,
    },
    PointerOrReference {
        range: ByteRange,
    },
    Array {
        range: ByteRange,
    },
    BitField {
        range: ByteRange,
    },
    UnsupportedTypeDeclaration {
        range: ByteRange,
    },
    ExpectedDeclaration {
        range: ByteRange,
    },
    AnonymousStruct {
        range: ByteRange,
    },
    ExpectedNestedStructName {
        range: ByteRange,
    },
    NamedStructSpelling {
        range: ByteRange,
    },
    InlineStructTrailingTokens {
        range: ByteRange,
    },
    AnonymousUnion {
        range: ByteRange,
    },
    ExpectedNamedUnion {
        range: ByteRange,
    },
    ExpectedUnionFieldName {
        range: ByteRange,
    },
    EmptyUnion {
        range: ByteRange,
    },
    NestedUnion {
        range: ByteRange,
    },
    DuplicateInlineName {
        range: ByteRange,
        name: String,
        union_name: String,
    },
    DuplicateField {
        range: ByteRange,
        name: String,
    },
    DuplicateAlternative {
        range: ByteRange,
        name: String,
        union_name: String,
    },
    RecursiveLayout {
        range: ByteRange,
        name: String,
    },
}

impl ParseMessage {
    /// The source range the message is pinned to.
    pub fn range(&self) -> ByteRange {
        match self {
            ParseMessage::UnterminatedBlockComment { range }
            | ParseMessage::ExpectedStructAfterAttribute { range }
            | ParseMessage::ExpectedStructKeyword { range }
            | ParseMessage::ExpectedIdentifier { range }
            | ParseMessage::ExpectedStructBody { range }
            | ParseMessage::ExpectedStructTerminator { range }
            | ParseMessage::UnbalancedBraces { range }
            | ParseMessage::UnexpectedCloseBrace { range }
            | ParseMessage::ExpectedDeclTerminator { range }
            | ParseMessage::DuplicateStruct { range, .. }
            | ParseMessage::DefaultInitializer { range }
            | ParseMessage::PointerOrReference { range }
            | ParseMessage::Array { range }
            | ParseMessage::BitField { range }
            | ParseMessage::UnsupportedTypeDeclaration { range }
            | ParseMessage::ExpectedDeclaration { range }
            | ParseMessage::AnonymousStruct { range }
            | ParseMessage::ExpectedNestedStructName { range }
            | ParseMessage::NamedStructSpelling { range }
            | ParseMessage::InlineStructTrailingTokens { range }
            | ParseMessage::AnonymousUnion { range }
            | ParseMessage::ExpectedNamedUnion { range }
            | ParseMessage::ExpectedUnionFieldName { range }
            | ParseMessage::EmptyUnion { range }
            | ParseMessage::NestedUnion { range }
            | ParseMessage::DuplicateInlineName { range, .. }
            | ParseMessage::DuplicateField { range, .. }
            | ParseMessage::DuplicateAlternative { range, .. }
            | ParseMessage::RecursiveLayout { range, .. } => *range,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic<()> {
        let label = Label::primary((), self.range());
        let label = match self {
            ParseMessage::UnterminatedBlockComment { .. } => label.with_message("comment starts here"),
            ParseMessage::UnbalancedBraces { .. } => label.with_message("unclosed brace"),
            ParseMessage::RecursiveLayout { name, .. } => {
                label.with_message(format!("`{name}` is contained by value"))
            }
            _ => label,
        };

        Diagnostic::error()
            .with_message(self.to_string())
            .with_labels(vec![label])
    }
}

impl fmt::Display for ParseMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseMessage::UnterminatedBlockComment { .. } => f.write_str("unterminated block comment"),
            ParseMessage::ExpectedStructAfterAttribute { .. } => {
                write!(f, "expected 'struct' after {ATTRIBUTE_TOKEN}")
            }
            ParseMessage::ExpectedStructKeyword { .. } => f.write_str("expected 'struct' keyword"),
            ParseMessage::ExpectedIdentifier { .. } => f.write_str("expected identifier"),
            ParseMessage::ExpectedStructBody { .. } => f.write_str("expected '{' to open struct body"),
            ParseMessage::ExpectedStructTerminator { .. } => {
                f.write_str("expected ';' after struct declaration")
            }
            ParseMessage::UnbalancedBraces { .. } => f.write_str("unbalanced braces"),
            ParseMessage::UnexpectedCloseBrace { .. } => f.write_str("unexpected closing brace"),
            ParseMessage::ExpectedDeclTerminator { .. } => {
                f.write_str("expected ';' after declaration")
            }
            ParseMessage::DuplicateStruct { name, .. } => {
                write!(f, "duplicate {ATTRIBUTE_TOKEN} struct '{name}'")
            }
            ParseMessage::DefaultInitializer { .. } => {
                f.write_str("default field initializers are not supported")
            }
            ParseMessage::PointerOrReference { .. } => {
                f.write_str("pointers/references are not supported")
            }
            ParseMessage::Array { .. } => f.write_str("arrays are not supported"),
            ParseMessage::BitField { .. } => f.write_str("bit-fields are not supported"),
            ParseMessage::UnsupportedTypeDeclaration { .. } => {
                f.write_str("inline aggregate/type declarations are not supported")
            }
            ParseMessage::ExpectedDeclaration { .. } => {
                f.write_str("expected '<type> <name>' declaration")
            }
            ParseMessage::AnonymousStruct { .. } => f.write_str(
                "anonymous nested structs are not supported; use 'struct Name { ... } member;'",
            ),
            ParseMessage::ExpectedNestedStructName { .. } => {
                f.write_str("expected nested struct name after 'struct'")
            }
            ParseMessage::NamedStructSpelling { .. } => f.write_str(
                "named 'struct T' type spellings are not supported; use plain type names",
            ),
            ParseMessage::InlineStructTrailingTokens { .. } => {
                f.write_str("inline struct field type contains unexpected trailing tokens")
            }
            ParseMessage::AnonymousUnion { .. } => f.write_str(
                "anonymous unions are not supported; use 'union Name { ... } field;'",
            ),
            ParseMessage::ExpectedNamedUnion { .. } => {
                f.write_str("expected named union declaration: 'union Name { ... } field;'")
            }
            ParseMessage::ExpectedUnionFieldName { .. } => {
                f.write_str("expected union field name after '}'")
            }
            ParseMessage::EmptyUnion { .. } => {
                f.write_str("union must contain at least one alternative")
            }
            ParseMessage::NestedUnion { .. } => {
                f.write_str("unions cannot be nested directly inside another union")
            }
            ParseMessage::DuplicateInlineName {
                name, union_name, ..
            } => write!(f, "duplicate inline type name '{name}' in union '{union_name}'"),
            ParseMessage::DuplicateField { name, .. } => write!(f, "duplicate field name '{name}'"),
            ParseMessage::DuplicateAlternative {
                name, union_name, ..
            } => write!(f, "duplicate alternative name '{name}' in union '{union_name}'"),
            ParseMessage::RecursiveLayout { name, .. } => {
                write!(f, "recursive record layout: '{name}' contains itself by value")
            }
        }
    }
}

/// Messages that are reported but do not change the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningMessage {
    /// A scalar type name that is one or two edits away from a record.
    SimilarRecordName {
        range: ByteRange,
        type_name: String,
        suggestion: String,
    },
}

impl WarningMessage {
    pub fn to_diagnostic(&self) -> Diagnostic<()> {
        match self {
            WarningMessage::SimilarRecordName {
                range,
                type_name,
                suggestion,
            } => Diagnostic::warning()
                .with_message(format!(
                    "`{type_name}` is not a {ATTRIBUTE_TOKEN} struct and will be treated as a scalar wire type"
                ))
                .with_labels(vec![
                    Label::primary((), *range).with_message(format!("did you mean `{suggestion}`?"))
                ]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_rejected_shape() {
        let range = ByteRange::new(3, 4);
        assert_eq!(
            ParseMessage::PointerOrReference { range }.to_string(),
            "pointers/references are not supported",
        );
        assert_eq!(
            ParseMessage::ExpectedStructAfterAttribute { range }.to_string(),
            "expected 'struct' after [[noserde]]",
        );
        assert_eq!(
            ParseMessage::DuplicateInlineName {
                range,
                name: "Words".to_owned(),
                union_name: "Value".to_owned(),
            }
            .to_string(),
            "duplicate inline type name 'Words' in union 'Value'",
        );
    }

    #[test]
    fn diagnostic_is_pinned_to_range() {
        let range = ByteRange::new(10, 12);
        let diagnostic = ParseMessage::Array { range }.to_diagnostic();
        assert_eq!(diagnostic.message, "arrays are not supported");
        assert_eq!(diagnostic.labels.len(), 1);
        assert_eq!(diagnostic.labels[0].range, 10..12);
    }
}
