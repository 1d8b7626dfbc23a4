//! Core language: flat records with every field classified.
//!
//! Inline nested structs from the surface language have been hoisted into
//! helper records, so each record only refers to other records by name.

use crate::source::ByteRange;

pub mod hash;
pub mod layout;

/// The annotated structs of one source file, in source order.
#[derive(Debug, Clone)]
pub struct Module {
    pub blocks: Vec<Block>,
}

/// One annotated struct together with the helpers hoisted out of it.
#[derive(Debug, Clone)]
pub struct Block {
    /// The bytes replaced by the generated code.
    pub range: ByteRange,
    /// Hoisted helpers, innermost first.
    pub helpers: Vec<Record>,
    pub record: Record,
}

/// A fixed-layout record.
#[derive(Debug, Clone)]
pub struct Record {
    pub name: String,
    /// Where the record was declared: the struct name of an annotated struct,
    /// or the whole declaration of an inline nested struct.
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
    Value(ValueType),
    Union(Union),
}

/// The type of a field or union alternative that is stored by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    /// Any type that is not a known record, encoded by the runtime's wire traits.
    Scalar(String),
    /// Another record, embedded at its own fixed size.
    Record(String),
}

/// A tagged union field: a 32-bit tag followed by a payload sized for the
/// largest alternative.
#[derive(Debug, Clone)]
pub struct Union {
    /// The name of the scope struct that holds inline alternative aliases.
    pub type_name: String,
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone)]
pub struct Alternative {
    pub range: ByteRange,
    pub name: String,
    pub r#type: ValueType,
    /// The name an inline alternative was written with, which stays usable
    /// inside the union's scope struct.
    pub alias: Option<String>,
}

impl Module {
    /// Every record in emission order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.blocks.iter().flat_map(Block::records)
    }
}

impl Block {
    /// Helpers first, then the annotated struct itself.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.helpers.iter().chain(std::iter::once(&self.record))
    }
}

impl Record {
    pub fn unions(&self) -> impl Iterator<Item = (&Field, &Union)> {
        self.fields.iter().filter_map(|field| match &field.r#type {
            FieldType::Union(union) => Some((field, union)),
            FieldType::Value(_) => None,
        })
    }
}

impl ValueType {
    pub fn name(&self) -> &str {
        match self {
            ValueType::Scalar(name) | ValueType::Record(name) => name,
        }
    }

    pub fn is_record(&self) -> bool {
        matches!(self, ValueType::Record(_))
    }

    pub fn record_name(&self) -> Option<&str> {
        match self {
            ValueType::Record(name) => Some(name),
            ValueType::Scalar(_) => None,
        }
    }

    /// The type used for this value in a record's owning `Data` struct.
    pub fn data_type(&self) -> String {
        match self {
            ValueType::Scalar(name) => name.clone(),
            ValueType::Record(name) => format!("{name}::Data"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, r#type: FieldType) -> Field {
        Field {
            range: ByteRange::empty(0),
            name: name.to_owned(),
            r#type,
        }
    }

    #[test]
    fn unions_are_listed_with_their_fields() {
        let record = Record {
            name: "Outer".to_owned(),
            range: ByteRange::empty(0),
            fields: vec![
                field("a", FieldType::Value(ValueType::Record("Inner".to_owned()))),
                field("b", FieldType::Value(ValueType::Scalar("int".to_owned()))),
                field(
                    "c",
                    FieldType::Union(Union {
                        type_name: "Choice".to_owned(),
                        alternatives: vec![
                            Alternative {
                                range: ByteRange::empty(0),
                                name: "x".to_owned(),
                                r#type: ValueType::Scalar("float".to_owned()),
                                alias: None,
                            },
                            Alternative {
                                range: ByteRange::empty(0),
                                name: "y".to_owned(),
                                r#type: ValueType::Record("Other".to_owned()),
                                alias: None,
                            },
                        ],
                    }),
                ),
            ],
        };

        let unions = record.unions().collect::<Vec<_>>();
        assert_eq!(unions.len(), 1);
        assert_eq!(unions[0].0.name, "c");
        assert_eq!(unions[0].1.type_name, "Choice");
        assert_eq!(unions[0].1.alternatives[1].r#type.record_name(), Some("Other"));
    }

    #[test]
    fn record_data_type() {
        assert_eq!(ValueType::Record("Point".to_owned()).data_type(), "Point::Data");
        assert_eq!(ValueType::Scalar("std::int32_t".to_owned()).data_type(), "std::int32_t");
    }
}
