//! Schema fingerprints.
//!
//! A record's fingerprint covers its name and the name, kind and type of
//! every field and union alternative, in order. It does not cover the
//! layouts of nested records.

use sha2::{Digest, Sha256};

use crate::core::{FieldType, Record, ValueType};

fn kind(r#type: &ValueType) -> &'static str {
    match r#type {
        ValueType::Scalar(_) => "scalar",
        ValueType::Record(_) => "record",
    }
}

/// The lines that are hashed to produce the fingerprint.
pub fn description(record: &Record) -> Vec<String> {
    let mut lines = vec![record.name.clone()];

    for field in &record.fields {
        match &field.r#type {
            FieldType::Value(r#type) => {
                lines.push(format!("{}:{}:{}", kind(r#type), r#type.name(), field.name));
            }
            FieldType::Union(union) => {
                lines.push(format!("union:{}", field.name));
                for alt in &union.alternatives {
                    lines.push(format!(
                        "alt:{}:{}:{}",
                        alt.r#type.name(),
                        alt.name,
                        u8::from(alt.r#type.is_record()),
                    ));
                }
            }
        }
    }

    lines
}

/// The first eight bytes of the SHA-256 of the description, little endian.
pub fn schema_hash(record: &Record) -> u64 {
    let digest = Sha256::digest(description(record).join("\n").as_bytes());
    let mut prefix = [0; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Alternative, Field, Union};
    use crate::source::ByteRange;

    fn demo(alternatives: &[(&str, ValueType)]) -> Record {
        Record {
            name: "Demo".to_owned(),
            range: ByteRange::empty(0),
            fields: vec![
                Field {
                    range: ByteRange::empty(0),
                    name: "id".to_owned(),
                    r#type: FieldType::Value(ValueType::Scalar("std::uint32_t".to_owned())),
                },
                Field {
                    range: ByteRange::empty(0),
                    name: "value".to_owned(),
                    r#type: FieldType::Union(Union {
                        type_name: "Value".to_owned(),
                        alternatives: (alternatives.iter())
                            .map(|(name, r#type)| Alternative {
                                range: ByteRange::empty(0),
                                name: (*name).to_owned(),
                                r#type: r#type.clone(),
                                alias: None,
                            })
                            .collect(),
                    }),
                },
            ],
        }
    }

    fn scalar(name: &str) -> ValueType {
        ValueType::Scalar(name.to_owned())
    }

    #[test]
    fn description_lines() {
        let record = demo(&[
            ("as_int", scalar("std::int32_t")),
            ("point", ValueType::Record("Point".to_owned())),
        ]);
        assert_eq!(
            description(&record),
            [
                "Demo",
                "scalar:std::uint32_t:id",
                "union:value",
                "alt:std::int32_t:as_int:0",
                "alt:Point:point:1",
            ],
        );
    }

    fn plain(fields: &[(&str, ValueType)]) -> Record {
        Record {
            name: "Demo".to_owned(),
            range: ByteRange::empty(0),
            fields: (fields.iter())
                .map(|(name, r#type)| Field {
                    range: ByteRange::empty(0),
                    name: (*name).to_owned(),
                    r#type: FieldType::Value(r#type.clone()),
                })
                .collect(),
        }
    }

    #[test]
    fn known_hash() {
        let record = plain(&[("id", scalar("std::uint32_t"))]);
        assert_eq!(schema_hash(&record), 0x64ee760ae270201c);
    }

    #[test]
    fn stable_for_identical_records() {
        let alternatives = [("a", scalar("std::int16_t")), ("b", scalar("float"))];
        assert_eq!(schema_hash(&demo(&alternatives)), schema_hash(&demo(&alternatives)));
    }

    #[test]
    fn sensitive_to_alternative_changes() {
        let original = schema_hash(&demo(&[("a", scalar("std::int16_t")), ("b", scalar("float"))]));
        let reordered = schema_hash(&demo(&[("b", scalar("float")), ("a", scalar("std::int16_t"))]));
        let renamed = schema_hash(&demo(&[("a", scalar("std::int16_t")), ("c", scalar("float"))]));
        let retyped = schema_hash(&demo(&[("a", scalar("std::int32_t")), ("b", scalar("float"))]));

        assert_ne!(original, reordered);
        assert_ne!(original, renamed);
        assert_ne!(original, retyped);
    }

    #[test]
    fn sensitive_to_field_changes() {
        let original = schema_hash(&plain(&[("id", scalar("std::uint32_t")), ("flag", scalar("bool"))]));
        let reordered = schema_hash(&plain(&[("flag", scalar("bool")), ("id", scalar("std::uint32_t"))]));
        let renamed = schema_hash(&plain(&[("key", scalar("std::uint32_t")), ("flag", scalar("bool"))]));
        let reclassified = schema_hash(&plain(&[
            ("id", ValueType::Record("std::uint32_t".to_owned())),
            ("flag", scalar("bool")),
        ]));

        assert_ne!(original, reordered);
        assert_ne!(original, renamed);
        assert_ne!(original, reclassified);
    }
}
