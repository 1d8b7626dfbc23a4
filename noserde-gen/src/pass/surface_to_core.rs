//! Lowering from the surface language into the core language.
//!
//! Performs the following:
//!
//! - hoisting of inline nested structs into named helper records
//! - classification of named field types as records or scalars

use fxhash::FxHashSet;
use itertools::Itertools;

use crate::core::layout::WireSizes;
use crate::core::{self, ValueType};
use crate::reporting::WarningMessage;
use crate::source::ByteRange;
use crate::surface::{self, AlternativeType, InlineStruct};

/// Scalar names that are never reported as misspelled records.
const FUNDAMENTAL_TYPES: &[&str] = &["int", "short", "long", "signed", "unsigned"];

const MAX_SUGGESTION_DISTANCE: usize = 2;

/// Contextual information to be used during lowering.
pub struct Context {
    /// Names of every annotated struct and hoisted helper in the module.
    record_names: FxHashSet<String>,
    /// Warnings collected during classification.
    warnings: Vec<WarningMessage>,
}

impl Context {
    pub fn new() -> Context {
        Context {
            record_names: FxHashSet::default(),
            warnings: Vec::new(),
        }
    }

    /// Drain the collected warnings from the context.
    pub fn drain_warnings(&mut self) -> impl '_ + Iterator<Item = WarningMessage> {
        self.warnings.drain(..)
    }

    /// Translate a surface module into a core module.
    pub fn from_module(&mut self, surface_module: &surface::Module) -> core::Module {
        // Helpers must not take the name of any annotated struct, nor of a
        // helper minted for an earlier struct.
        let mut reserved = (surface_module.structs.iter())
            .map(|block| block.name.clone())
            .collect::<FxHashSet<_>>();
        let mut blocks = (surface_module.structs.iter())
            .map(|block| hoist_block(block, &mut reserved))
            .collect::<Vec<_>>();

        self.record_names = (blocks.iter())
            .flat_map(core::Block::records)
            .map(|record| record.name.clone())
            .collect();

        for block in &mut blocks {
            for helper in &mut block.helpers {
                self.classify_record(helper);
            }
            self.classify_record(&mut block.record);
        }

        core::Module { blocks }
    }

    fn classify_record(&mut self, record: &mut core::Record) {
        for field in &mut record.fields {
            match &mut field.r#type {
                core::FieldType::Value(r#type) => self.classify(field.range, r#type),
                core::FieldType::Union(union) => {
                    for alt in &mut union.alternatives {
                        self.classify(alt.range, &mut alt.r#type);
                    }
                }
            }
        }
    }

    /// A named type is a record exactly when it names a known record.
    fn classify(&mut self, range: ByteRange, r#type: &mut ValueType) {
        if let ValueType::Scalar(name) = r#type {
            if self.record_names.contains(name.as_str()) {
                *r#type = ValueType::Record(std::mem::take(name));
            } else if let Some(suggestion) = self.suggest_record(name) {
                tracing::debug!(%name, %suggestion, "scalar type resembles a record");
                self.warnings.push(WarningMessage::SimilarRecordName {
                    range,
                    type_name: name.clone(),
                    suggestion,
                });
            }
        }
    }

    fn suggest_record(&self, name: &str) -> Option<String> {
        let is_bare_identifier = name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
        if !is_bare_identifier
            || name.len() <= MAX_SUGGESTION_DISTANCE
            || FUNDAMENTAL_TYPES.contains(&name)
            || WireSizes::standard().contains(name)
        {
            return None;
        }

        (self.record_names.iter())
            .map(|record_name| (levenshtein::levenshtein(name, record_name), record_name))
            .filter(|(distance, _)| *distance <= MAX_SUGGESTION_DISTANCE)
            .min()
            .map(|(_, record_name)| record_name.clone())
    }
}

impl Default for Context {
    fn default() -> Context {
        Context::new()
    }
}

fn hoist_block(block: &surface::StructBlock, reserved: &mut FxHashSet<String>) -> core::Block {
    let mut hoister = Hoister {
        reserved,
        helpers: Vec::new(),
    };
    let path = [block.name.as_str()];
    let fields = hoister.fields(&block.fields, &path);

    tracing::debug!(
        block = %block.name,
        helpers = %hoister.helpers.iter().map(|helper| &helper.name).join(", "),
        "hoisted inline structs",
    );

    core::Block {
        range: block.range,
        helpers: hoister.helpers,
        record: core::Record {
            name: block.name.clone(),
            range: block.name_range,
            fields,
        },
    }
}

/// Hoists the inline structs of one annotated struct into helper records
/// named after their path from the annotated struct.
struct Hoister<'a> {
    /// Record names already taken anywhere in the module.
    reserved: &'a mut FxHashSet<String>,
    /// Hoisted helpers, innermost first.
    helpers: Vec<core::Record>,
}

impl<'a> Hoister<'a> {
    /// Join `path` with `__`, adding `_2`, `_3`, ... until the name is free.
    fn reserve(&mut self, path: &[&str]) -> String {
        let base = path.join("__");
        let mut candidate = base.clone();
        let mut suffix = 2;
        while self.reserved.contains(&candidate) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        self.reserved.insert(candidate.clone());
        candidate
    }

    fn fields(&mut self, fields: &[surface::Field], path: &[&str]) -> Vec<core::Field> {
        (fields.iter())
            .map(|field| {
                let r#type = match &field.r#type {
                    surface::FieldType::Named(name) => {
                        core::FieldType::Value(ValueType::Scalar(name.clone()))
                    }
                    surface::FieldType::Inline(inline) => {
                        let path = [path, &[field.name.as_str(), inline.name.as_str()][..]].concat();
                        core::FieldType::Value(self.hoist(inline, &path))
                    }
                    surface::FieldType::Union(union) => {
                        core::FieldType::Union(self.union(union, path))
                    }
                };

                core::Field {
                    range: field.range,
                    name: field.name.clone(),
                    r#type,
                }
            })
            .collect()
    }

    fn union(&mut self, union: &surface::UnionDecl, path: &[&str]) -> core::Union {
        let alternatives = (union.alternatives.iter())
            .map(|alt| {
                let (r#type, alias) = match &alt.r#type {
                    AlternativeType::Named(name) => (ValueType::Scalar(name.clone()), None),
                    AlternativeType::Inline(inline) => {
                        let path = [
                            path,
                            &[union.name.as_str(), alt.name.as_str(), inline.name.as_str()][..],
                        ]
                        .concat();
                        (self.hoist(inline, &path), Some(inline.name.clone()))
                    }
                };

                core::Alternative {
                    range: alt.range,
                    name: alt.name.clone(),
                    r#type,
                    alias,
                }
            })
            .collect();

        core::Union {
            type_name: union.name.clone(),
            alternatives,
        }
    }

    /// The helper's name is reserved before its own inline structs are
    /// hoisted, and the helper is pushed after them.
    fn hoist(&mut self, inline: &InlineStruct, path: &[&str]) -> ValueType {
        let name = self.reserve(path);
        let fields = self.fields(&inline.fields, path);
        self.helpers.push(core::Record {
            name: name.clone(),
            range: inline.range,
            fields,
        });
        ValueType::Record(name)
    }
}
