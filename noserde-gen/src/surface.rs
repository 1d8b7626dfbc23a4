//! Surface language: annotated structs as they are written in the source.
//!
//! The surface tree still contains inline nested structs. It is flattened
//! into [`crate::core`] by [`crate::pass::surface_to_core`].

use fxhash::FxHashSet;

use crate::reporting::ParseMessage;
use crate::source::ByteRange;

pub mod lexer;
mod parser;
pub mod scan;

/// The annotated structs of one source file, in source order.
#[derive(Debug, Clone)]
pub struct Module {
    pub structs: Vec<StructBlock>,
}

/// A `[[noserde]] struct Name { ... };` declaration.
#[derive(Debug, Clone)]
pub struct StructBlock {
    pub name: String,
    pub name_range: ByteRange,
    /// The bytes replaced by generated code, from the attribute (or the
    /// leading `struct` keyword) up to and including the final `;`.
    pub range: ByteRange,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub range: ByteRange,
    pub name: String,
    pub r#type: FieldType,
}

#[derive(Debug, Clone)]
pub enum FieldType {
    /// A plain type name, resolved later to a record or a scalar.
    Named(String),
    /// `struct Name { ... } field`
    Inline(InlineStruct),
    /// `union Name { ... } field`
    Union(UnionDecl),
}

#[derive(Debug, Clone)]
pub struct InlineStruct {
    pub range: ByteRange,
    pub name: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone)]
pub struct UnionDecl {
    pub name: String,
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone)]
pub struct Alternative {
    pub range: ByteRange,
    pub name: String,
    pub r#type: AlternativeType,
}

#[derive(Debug, Clone)]
pub enum AlternativeType {
    Named(String),
    Inline(InlineStruct),
}

impl Module {
    /// Parse every annotated struct in `source`.
    pub fn parse(source: &str) -> Result<Module, ParseMessage> {
        let tokens = lexer::tokens(source)?;
        let spans = scan::extract_blocks(&tokens, source.len())?;
        tracing::debug!(count = spans.len(), "extracted annotated structs");

        let mut seen = FxHashSet::default();
        let mut structs = Vec::with_capacity(spans.len());
        for span in spans {
            if !seen.insert(span.name.clone()) {
                return Err(ParseMessage::DuplicateStruct {
                    range: span.name_range,
                    name: span.name,
                });
            }

            let fields = parser::parse_fields(source, &tokens[span.body])?;
            tracing::trace!(name = %span.name, fields = fields.len(), "parsed struct body");
            structs.push(StructBlock {
                name: span.name,
                name_range: span.name_range,
                range: span.range,
                fields,
            });
        }

        Ok(Module { structs })
    }
}
