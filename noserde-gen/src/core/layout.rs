//! Fixed byte layouts of records.
//!
//! Fields are packed in declaration order with no padding. Scalar sizes are
//! only known to the runtime, so offsets are planned symbolically and
//! rendered as C++ constant expressions. A layout can also be evaluated
//! against a [`WireSizes`] table when every scalar it uses has a known size.

use fxhash::{FxHashMap, FxHashSet};
use itertools::Itertools;
use once_cell::sync::Lazy;
use std::fmt;

use crate::core::{FieldType, Module, Record, ValueType};
use crate::reporting::ParseMessage;

/// The wire type of a union tag.
pub const TAG_TYPE: &str = "std::uint32_t";

/// A size, as a C++ constant expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Size {
    /// `noserde::wire_sizeof<T>()`
    Wire(String),
    /// `noserde::record_sizeof<T>()`
    Record(String),
    /// A constant declared earlier in the same `__layout` struct.
    Constant(String),
    /// `noserde::max_size(...)`
    Max(Vec<Size>),
}

/// An offset, as a C++ constant expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offset {
    Start,
    /// `base + size`, where `base` names an earlier layout constant.
    After { base: String, size: Size },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldLayout {
    Value {
        name: String,
        offset: Offset,
        size: Size,
    },
    Union {
        name: String,
        tag_offset: Offset,
        payload_size: Size,
    },
}

/// The planned layout of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    pub name: String,
    pub fields: Vec<FieldLayout>,
    pub size: Offset,
}

impl Size {
    fn of(r#type: &ValueType) -> Size {
        match r#type {
            ValueType::Scalar(name) => Size::Wire(name.clone()),
            ValueType::Record(name) => Size::Record(name.clone()),
        }
    }

    pub fn tag() -> Size {
        Size::Wire(TAG_TYPE.to_owned())
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Size::Wire(name) => write!(f, "noserde::wire_sizeof<{name}>()"),
            Size::Record(name) => write!(f, "noserde::record_sizeof<{name}>()"),
            Size::Constant(name) => f.write_str(name),
            Size::Max(sizes) => write!(f, "noserde::max_size({})", sizes.iter().format(", ")),
        }
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Offset::Start => f.write_str("0"),
            Offset::After { base, size } => write!(f, "{base} + {size}"),
        }
    }
}

impl FieldLayout {
    pub fn name(&self) -> &str {
        match self {
            FieldLayout::Value { name, .. } | FieldLayout::Union { name, .. } => name,
        }
    }

    /// The layout constants this field declares, in order.
    pub fn constants(&self) -> Vec<(String, String)> {
        match self {
            FieldLayout::Value { name, offset, .. } => {
                vec![(offset_constant(name), offset.to_string())]
            }
            FieldLayout::Union {
                name,
                tag_offset,
                payload_size,
            } => vec![
                (tag_offset_constant(name), tag_offset.to_string()),
                (
                    payload_offset_constant(name),
                    payload_offset(name).to_string(),
                ),
                (payload_size_constant(name), payload_size.to_string()),
            ],
        }
    }

    /// Where the next field starts.
    fn end(&self) -> Offset {
        match self {
            FieldLayout::Value { name, size, .. } => Offset::After {
                base: offset_constant(name),
                size: size.clone(),
            },
            FieldLayout::Union { name, .. } => Offset::After {
                base: payload_offset_constant(name),
                size: Size::Constant(payload_size_constant(name)),
            },
        }
    }
}

pub fn offset_constant(field: &str) -> String {
    format!("{field}_offset")
}

pub fn tag_offset_constant(field: &str) -> String {
    format!("{field}_tag_offset")
}

pub fn payload_offset_constant(field: &str) -> String {
    format!("{field}_payload_offset")
}

pub fn payload_size_constant(field: &str) -> String {
    format!("{field}_payload_size")
}

fn payload_offset(field: &str) -> Offset {
    Offset::After {
        base: tag_offset_constant(field),
        size: Size::tag(),
    }
}

/// Plan the layout of a single record.
pub fn plan(record: &Record) -> RecordLayout {
    let mut cursor = Offset::Start;
    let mut fields = Vec::with_capacity(record.fields.len());

    for field in &record.fields {
        let layout = match &field.r#type {
            FieldType::Value(r#type) => FieldLayout::Value {
                name: field.name.clone(),
                offset: cursor,
                size: Size::of(r#type),
            },
            FieldType::Union(union) => FieldLayout::Union {
                name: field.name.clone(),
                tag_offset: cursor,
                payload_size: Size::Max(
                    (union.alternatives.iter())
                        .map(|alt| Size::of(&alt.r#type))
                        .collect(),
                ),
            },
        };
        cursor = layout.end();
        fields.push(layout);
    }

    RecordLayout {
        name: record.name.clone(),
        fields,
        size: cursor,
    }
}

/// The planned layouts of every record in a module.
#[derive(Debug, Clone)]
pub struct Layouts {
    layouts: Vec<RecordLayout>,
    index: FxHashMap<String, usize>,
}

impl Layouts {
    /// Plan every record, rejecting records that contain themselves by value.
    pub fn new(module: &Module) -> Result<Layouts, ParseMessage> {
        check_acyclic(module)?;

        let layouts = module.records().map(plan).collect::<Vec<_>>();
        let index = (layouts.iter().enumerate())
            .map(|(position, layout)| (layout.name.clone(), position))
            .collect();

        Ok(Layouts { layouts, index })
    }

    pub fn get(&self, name: &str) -> Option<&RecordLayout> {
        self.index.get(name).map(|&position| &self.layouts[position])
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordLayout> {
        self.layouts.iter()
    }

    /// The size of a record in bytes, if every scalar it uses is in `sizes`.
    pub fn size_of(&self, name: &str, sizes: &WireSizes) -> Option<u64> {
        Some(self.evaluate(name, sizes)?.1)
    }

    /// The byte offset of every field of a record, followed by its size.
    /// Union fields report the offset of their tag.
    pub fn evaluate(&self, name: &str, sizes: &WireSizes) -> Option<(Vec<(&str, u64)>, u64)> {
        let layout = self.get(name)?;
        let mut cursor = 0;
        let mut offsets = Vec::with_capacity(layout.fields.len());

        for field in &layout.fields {
            offsets.push((field.name(), cursor));
            cursor += match field {
                FieldLayout::Value { size, .. } => self.evaluate_size(size, sizes)?,
                FieldLayout::Union { payload_size, .. } => {
                    sizes.get(TAG_TYPE)? + self.evaluate_size(payload_size, sizes)?
                }
            };
        }

        Some((offsets, cursor))
    }

    fn evaluate_size(&self, size: &Size, sizes: &WireSizes) -> Option<u64> {
        match size {
            Size::Wire(name) => sizes.get(name),
            Size::Record(name) => self.size_of(name, sizes),
            // Only produced for the cursor after a union, which `evaluate`
            // walks without going through the constant.
            Size::Constant(_) => None,
            Size::Max(alternatives) => (alternatives.iter())
                .map(|size| self.evaluate_size(size, sizes))
                .fold_options(0, u64::max),
        }
    }
}

impl<'a> std::ops::Index<&'a str> for Layouts {
    type Output = RecordLayout;

    /// Every record of the planned module has a layout.
    fn index(&self, name: &'a str) -> &RecordLayout {
        &self.layouts[self.index[name]]
    }
}

/// Reject records that contain themselves, directly or through other
/// records and union alternatives.
fn check_acyclic(module: &Module) -> Result<(), ParseMessage> {
    let records = module
        .records()
        .map(|record| (record.name.as_str(), record))
        .collect::<FxHashMap<_, _>>();

    let mut visiting = FxHashSet::default();
    let mut done = FxHashSet::default();
    for record in module.records() {
        visit(&records, record, &mut visiting, &mut done)?;
    }
    Ok(())
}

fn visit<'a>(
    records: &FxHashMap<&'a str, &'a Record>,
    record: &'a Record,
    visiting: &mut FxHashSet<&'a str>,
    done: &mut FxHashSet<&'a str>,
) -> Result<(), ParseMessage> {
    if done.contains(record.name.as_str()) {
        return Ok(());
    }
    visiting.insert(record.name.as_str());

    for field in &record.fields {
        let dependencies = match &field.r#type {
            FieldType::Value(r#type) => vec![r#type],
            FieldType::Union(union) => union.alternatives.iter().map(|alt| &alt.r#type).collect(),
        };

        for name in dependencies.into_iter().filter_map(ValueType::record_name) {
            if visiting.contains(name) {
                return Err(ParseMessage::RecursiveLayout {
                    range: field.range,
                    name: name.to_owned(),
                });
            }
            if let Some(&dependency) = records.get(name) {
                visit(records, dependency, visiting, done)?;
            }
        }
    }

    visiting.remove(record.name.as_str());
    done.insert(record.name.as_str());
    Ok(())
}

/// Known wire sizes of scalar types.
#[derive(Debug, Clone, Default)]
pub struct WireSizes {
    sizes: FxHashMap<String, u64>,
}

static STANDARD_WIRE_SIZES: Lazy<WireSizes> = Lazy::new(|| {
    let mut sizes = WireSizes::default();
    for (names, size) in [
        (&["bool", "char", "std::int8_t", "std::uint8_t", "int8_t", "uint8_t"][..], 1),
        (&["std::int16_t", "std::uint16_t", "int16_t", "uint16_t"][..], 2),
        (&["std::int32_t", "std::uint32_t", "int32_t", "uint32_t", "float"][..], 4),
        (&["std::int64_t", "std::uint64_t", "int64_t", "uint64_t", "double"][..], 8),
    ] {
        for name in names {
            sizes.insert(*name, size);
        }
    }
    sizes
});

impl WireSizes {
    /// The fixed-width integer types, `bool`, `char`, `float` and `double`.
    pub fn standard() -> &'static WireSizes {
        &STANDARD_WIRE_SIZES
    }

    pub fn insert(&mut self, name: impl Into<String>, size: u64) {
        self.sizes.insert(name.into(), size);
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.sizes.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sizes.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Alternative, Block, Field, Union};
    use crate::source::ByteRange;

    fn value(name: &str, r#type: ValueType) -> Field {
        Field {
            range: ByteRange::empty(0),
            name: name.to_owned(),
            r#type: FieldType::Value(r#type),
        }
    }

    fn scalar(name: &str) -> ValueType {
        ValueType::Scalar(name.to_owned())
    }

    fn record_type(name: &str) -> ValueType {
        ValueType::Record(name.to_owned())
    }

    fn record(name: &str, fields: Vec<Field>) -> Record {
        Record {
            name: name.to_owned(),
            range: ByteRange::empty(0),
            fields,
        }
    }

    fn module(records: Vec<Record>) -> Module {
        Module {
            blocks: (records.into_iter())
                .map(|record| Block {
                    range: ByteRange::empty(0),
                    helpers: Vec::new(),
                    record,
                })
                .collect(),
        }
    }

    fn union_field(name: &str, alternatives: &[(&str, ValueType)]) -> Field {
        Field {
            range: ByteRange::new(5, 9),
            name: name.to_owned(),
            r#type: FieldType::Union(Union {
                type_name: "Choice".to_owned(),
                alternatives: (alternatives.iter())
                    .map(|(name, r#type)| Alternative {
                        range: ByteRange::empty(0),
                        name: (*name).to_owned(),
                        r#type: r#type.clone(),
                        alias: None,
                    })
                    .collect(),
            }),
        }
    }

    #[test]
    fn single_field() {
        let module = module(vec![record("Demo", vec![value("id", scalar("std::uint32_t"))])]);
        let layouts = Layouts::new(&module).unwrap();
        let layout = layouts.get("Demo").unwrap();
        assert_eq!(&layouts["Demo"], layout);

        assert_eq!(layout.fields[0].constants(), [("id_offset".to_owned(), "0".to_owned())]);
        assert_eq!(
            layout.size.to_string(),
            "id_offset + noserde::wire_sizeof<std::uint32_t>()",
        );
        assert_eq!(
            layouts.evaluate("Demo", WireSizes::standard()),
            Some((vec![("id", 0)], 4)),
        );
    }

    #[test]
    fn union_payload_is_largest_alternative() {
        let module = module(vec![record(
            "Demo",
            vec![union_field(
                "value",
                &[("small", scalar("std::int16_t")), ("large", scalar("std::int32_t"))],
            )],
        )]);
        let layouts = Layouts::new(&module).unwrap();
        let layout = layouts.get("Demo").unwrap();

        assert_eq!(
            layout.fields[0].constants(),
            [
                ("value_tag_offset".to_owned(), "0".to_owned()),
                (
                    "value_payload_offset".to_owned(),
                    "value_tag_offset + noserde::wire_sizeof<std::uint32_t>()".to_owned(),
                ),
                (
                    "value_payload_size".to_owned(),
                    "noserde::max_size(noserde::wire_sizeof<std::int16_t>(), noserde::wire_sizeof<std::int32_t>())"
                        .to_owned(),
                ),
            ],
        );
        assert_eq!(
            layout.size.to_string(),
            "value_payload_offset + value_payload_size",
        );
        assert_eq!(layouts.size_of("Demo", WireSizes::standard()), Some(8));
    }

    #[test]
    fn nested_record_contributes_its_size() {
        let module = module(vec![
            record(
                "Point",
                vec![value("x", scalar("std::int32_t")), value("y", scalar("std::int32_t"))],
            ),
            record(
                "Segment",
                vec![
                    value("flag", scalar("bool")),
                    value("start", record_type("Point")),
                    value("end", record_type("Point")),
                ],
            ),
        ]);
        let layouts = Layouts::new(&module).unwrap();

        assert_eq!(
            layouts.evaluate("Segment", WireSizes::standard()),
            Some((vec![("flag", 0), ("start", 1), ("end", 9)], 17)),
        );
        let segment = layouts.get("Segment").unwrap();
        assert_eq!(
            segment.fields[2].constants()[0].1,
            "start_offset + noserde::record_sizeof<Point>()",
        );
    }

    #[test]
    fn unknown_scalars_are_not_evaluated() {
        let module = module(vec![record("Demo", vec![value("x", scalar("Vendor"))])]);
        let layouts = Layouts::new(&module).unwrap();
        assert_eq!(layouts.size_of("Demo", WireSizes::standard()), None);

        let mut sizes = WireSizes::standard().clone();
        sizes.insert("Vendor", 3);
        assert_eq!(layouts.size_of("Demo", &sizes), Some(3));
    }

    #[test]
    fn recursive_layouts_are_rejected() {
        let module = module(vec![
            record("A", vec![value("b", record_type("B"))]),
            record("B", vec![union_field("a", &[("x", scalar("int")), ("y", record_type("A"))])]),
        ]);
        let error = Layouts::new(&module).unwrap_err();
        assert_eq!(
            error.to_string(),
            "recursive record layout: 'A' contains itself by value",
        );
        assert_eq!(error.range(), ByteRange::new(5, 9));
    }

    #[test]
    fn self_containment_is_rejected() {
        let module = module(vec![record("Node", vec![value("next", record_type("Node"))])]);
        assert!(matches!(
            Layouts::new(&module),
            Err(ParseMessage::RecursiveLayout { name, .. }) if name == "Node",
        ));
    }
}
