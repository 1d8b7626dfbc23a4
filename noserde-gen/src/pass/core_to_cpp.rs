//! Generation of C++ accessor code from the core language.
//!
//! Every record becomes a `struct` with a `__layout` of offset constants, an
//! owning `Data` struct, `Ref`/`ConstRef` views over a byte buffer, and a
//! pair of tagged-union views per union field.

use itertools::Itertools;
use std::fmt::{self, Write};

use crate::core::hash::schema_hash;
use crate::core::layout::{self, Layouts, RecordLayout};
use crate::core::{Alternative, Block, Field, FieldType, Record, Union, ValueType};

const UNKNOWN_ALTERNATIVE: &str =
    "static_assert(noserde::always_false_v<Alternative>, \"unknown union alternative type\");";

/// Which of the two views over a record's bytes is being generated.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum View {
    Mutable,
    Const,
}

impl View {
    fn byte_pointer(self) -> &'static str {
        match self {
            View::Mutable => "std::byte*",
            View::Const => "const std::byte*",
        }
    }

    fn class_name(self) -> &'static str {
        match self {
            View::Mutable => "Ref",
            View::Const => "ConstRef",
        }
    }

    fn union_class_name(self, field: &str) -> String {
        match self {
            View::Mutable => format!("{field}_union_ref"),
            View::Const => format!("{field}_union_const_ref"),
        }
    }

    /// The accessor type of a value stored at a fixed offset.
    fn accessor_type(self, r#type: &ValueType) -> String {
        match (self, r#type) {
            (View::Mutable, ValueType::Scalar(name)) => format!("noserde::scalar_ref<{name}>"),
            (View::Const, ValueType::Scalar(name)) => format!("noserde::scalar_cref<{name}>"),
            (View::Mutable, ValueType::Record(name)) => {
                format!("typename noserde::record_traits<{name}>::ref")
            }
            (View::Const, ValueType::Record(name)) => {
                format!("typename noserde::record_traits<{name}>::const_ref")
            }
        }
    }

    /// Construct an accessor for the value stored at `pointer`.
    fn accessor_init(self, name: &str, r#type: &ValueType, pointer: &str) -> String {
        match (self, r#type) {
            (_, ValueType::Scalar(_)) => format!("{name}({pointer})"),
            (View::Mutable, ValueType::Record(record)) => {
                format!("{name}(noserde::make_record_ref<{record}>({pointer}))")
            }
            (View::Const, ValueType::Record(record)) => {
                format!("{name}(noserde::make_record_const_ref<{record}>({pointer}))")
            }
        }
    }
}

fn initializer_list(inits: &[String]) -> String {
    format!("        : {} {{}}", inits.iter().format(",\n          "))
}

fn data_type(field: &Field) -> String {
    match &field.r#type {
        FieldType::Value(r#type) => r#type.data_type(),
        FieldType::Union(_) => format!("{}_data", field.name),
    }
}

/// Write an `if constexpr` chain that selects on the type of an alternative.
fn emit_dispatch<W: Write>(
    writer: &mut W,
    indent: &str,
    subject: &str,
    alternatives: &[Alternative],
    case_type: impl Fn(&Alternative) -> String,
    mut body: impl FnMut(&mut W, usize, &Alternative) -> fmt::Result,
    fallback: &str,
) -> fmt::Result {
    for (index, alt) in alternatives.iter().enumerate() {
        let keyword = if index == 0 { "if" } else { "else if" };
        writeln!(
            writer,
            "{indent}{keyword} constexpr (std::is_same_v<{subject}, {}>) {{",
            case_type(alt),
        )?;
        body(writer, index, alt)?;
        writeln!(writer, "{indent}}}")?;
    }
    writeln!(writer, "{indent}else {{")?;
    writeln!(writer, "{indent}  {fallback}")?;
    writeln!(writer, "{indent}}}")
}

pub struct Context<'a> {
    layouts: &'a Layouts,
}

impl<'a> Context<'a> {
    pub fn new(layouts: &'a Layouts) -> Context<'a> {
        Context { layouts }
    }

    /// The code that replaces an annotated struct: its helpers followed by
    /// the struct itself, separated by blank lines.
    pub fn block_to_string(&self, block: &Block) -> Result<String, fmt::Error> {
        let mut output = String::new();
        self.emit_block(&mut output, block)?;
        Ok(output)
    }

    pub fn emit_block(&self, writer: &mut impl Write, block: &Block) -> fmt::Result {
        for (index, record) in block.records().enumerate() {
            if index > 0 {
                writer.write_str("\n\n")?;
            }
            self.emit_record(writer, record)?;
        }
        Ok(())
    }

    /// Emit a record definition, without a trailing newline.
    pub fn emit_record(&self, writer: &mut impl Write, record: &Record) -> fmt::Result {
        writeln!(writer, "struct {} {{", record.name)?;
        self.emit_layout(writer, &self.layouts[record.name.as_str()])?;

        let unions = record.unions().collect::<Vec<_>>();
        for (_, union) in &unions {
            writeln!(writer, "  struct {} {{", union.type_name)?;
            for alt in &union.alternatives {
                if let Some(alias) = &alt.alias {
                    writeln!(writer, "    using {alias} = {};", alt.r#type.name())?;
                }
            }
            writeln!(writer, "  }};")?;
            writeln!(writer)?;
        }

        for (field, union) in &unions {
            writeln!(
                writer,
                "  using {}_data = std::variant<{}>;",
                field.name,
                (union.alternatives.iter())
                    .map(|alt| alt.r#type.data_type())
                    .format(", "),
            )?;
        }
        if !unions.is_empty() {
            writeln!(writer)?;
        }

        writeln!(writer, "  struct Data {{")?;
        for field in &record.fields {
            writeln!(writer, "    {} {}{{}};", data_type(field), field.name)?;
        }
        writeln!(writer, "  }};")?;
        writeln!(writer)?;

        for (field, union) in &unions {
            for view in [View::Mutable, View::Const] {
                self.emit_union_view(writer, view, field, union)?;
                writeln!(writer)?;
            }
        }

        for view in [View::Mutable, View::Const] {
            self.emit_record_view(writer, view, record)?;
            writeln!(writer)?;
        }

        writeln!(
            writer,
            "  static constexpr std::size_t noserde_size_bytes = __layout::size_bytes;",
        )?;
        writeln!(
            writer,
            "  static constexpr std::uint64_t noserde_schema_hash = 0x{:016x}ULL;",
            schema_hash(record),
        )?;
        writeln!(writer)?;

        self.emit_assign_data(writer, record)?;
        writeln!(writer)?;

        writeln!(writer, "  static Ref make_ref(std::byte* ptr) {{ return Ref(ptr); }}")?;
        writeln!(
            writer,
            "  static ConstRef make_const_ref(const std::byte* ptr) {{ return ConstRef(ptr); }}",
        )?;
        write!(writer, "}};")
    }

    fn emit_layout(&self, writer: &mut impl Write, layout: &RecordLayout) -> fmt::Result {
        writeln!(writer, "  struct __layout {{")?;
        for field in &layout.fields {
            for (name, value) in field.constants() {
                writeln!(writer, "    static constexpr std::size_t {name} = {value};")?;
            }
        }
        writeln!(
            writer,
            "    static constexpr std::size_t size_bytes = {};",
            layout.size,
        )?;
        writeln!(writer, "  }};")?;
        writeln!(writer)
    }

    fn emit_record_view(&self, writer: &mut impl Write, view: View, record: &Record) -> fmt::Result {
        let class_name = view.class_name();
        let byte_pointer = view.byte_pointer();

        writeln!(writer, "  class {class_name} {{")?;
        writeln!(writer, "   private:")?;
        writeln!(writer, "    {byte_pointer} base_;")?;
        writeln!(writer)?;
        writeln!(writer, "   public:")?;

        let mut inits = vec!["base_(base)".to_owned()];
        for field in &record.fields {
            let name = &field.name;
            match &field.r#type {
                FieldType::Value(r#type) => {
                    writeln!(writer, "    {} {name};", view.accessor_type(r#type))?;
                    let pointer = format!("base + __layout::{}", layout::offset_constant(name));
                    inits.push(view.accessor_init(name, r#type, &pointer));
                }
                FieldType::Union(_) => {
                    writeln!(writer, "    {} {name};", view.union_class_name(name))?;
                    inits.push(format!(
                        "{name}(base + __layout::{}, base + __layout::{})",
                        layout::tag_offset_constant(name),
                        layout::payload_offset_constant(name),
                    ));
                }
            }
        }

        writeln!(writer)?;
        writeln!(writer, "    explicit {class_name}({byte_pointer} base)")?;
        writeln!(writer, "{}", initializer_list(&inits))?;
        writeln!(writer, "  }};")
    }

    fn emit_union_view(
        &self,
        writer: &mut impl Write,
        view: View,
        field: &Field,
        union: &Union,
    ) -> fmt::Result {
        let class_name = view.union_class_name(&field.name);
        let byte_pointer = view.byte_pointer();
        let alternatives = &union.alternatives[..];
        let alternative_type = |alt: &Alternative| alt.r#type.name().to_owned();

        writeln!(writer, "  class {class_name} {{")?;
        writeln!(writer, "   private:")?;
        writeln!(writer, "    {byte_pointer} tag_ptr_;")?;
        writeln!(writer, "    {byte_pointer} payload_ptr_;")?;
        writeln!(writer)?;
        writeln!(writer, "   public:")?;
        for alt in alternatives {
            writeln!(writer, "    {} {};", view.accessor_type(&alt.r#type), alt.name)?;
        }
        writeln!(writer)?;

        let mut inits = vec![
            "tag_ptr_(tag_ptr)".to_owned(),
            "payload_ptr_(payload_ptr)".to_owned(),
        ];
        inits.extend(
            (alternatives.iter()).map(|alt| view.accessor_init(&alt.name, &alt.r#type, "payload_ptr")),
        );
        writeln!(
            writer,
            "    explicit {class_name}({byte_pointer} tag_ptr, {byte_pointer} payload_ptr)",
        )?;
        writeln!(writer, "{}", initializer_list(&inits))?;

        writeln!(writer)?;
        writeln!(writer, "    std::size_t index() const {{")?;
        writeln!(
            writer,
            "      return static_cast<std::size_t>(noserde::load_le<std::uint32_t>(tag_ptr_));",
        )?;
        writeln!(writer, "    }}")?;

        writeln!(writer)?;
        writeln!(writer, "    template <typename Alternative>")?;
        writeln!(writer, "    static consteval std::size_t type_count() {{")?;
        writeln!(
            writer,
            "      return {};",
            (alternatives.iter())
                .map(|alt| format!(
                    "(std::is_same_v<Alternative, {}> ? 1u : 0u)",
                    alt.r#type.name(),
                ))
                .format(" + "),
        )?;
        writeln!(writer, "    }}")?;

        writeln!(writer)?;
        writeln!(writer, "    template <typename Alternative>")?;
        writeln!(writer, "    static consteval std::size_t type_index() {{")?;
        writeln!(
            writer,
            "      static_assert(type_count<Alternative>() == 1u, \"alternative type must appear exactly once in this union\");",
        )?;
        emit_dispatch(
            writer,
            "      ",
            "Alternative",
            alternatives,
            alternative_type,
            |writer, index, _| writeln!(writer, "        return {index};"),
            UNKNOWN_ALTERNATIVE,
        )?;
        writeln!(writer, "    }}")?;

        writeln!(writer)?;
        writeln!(writer, "    template <typename Alternative>")?;
        writeln!(writer, "    bool holds_alternative() const {{")?;
        writeln!(writer, "      return index() == type_index<Alternative>();")?;
        writeln!(writer, "    }}")?;

        writeln!(writer)?;
        writeln!(writer, "    template <typename Alternative>")?;
        match view {
            View::Mutable => writeln!(writer, "    auto get_if() {{")?,
            View::Const => writeln!(writer, "    auto get_if() const {{")?,
        }
        emit_dispatch(
            writer,
            "      ",
            "Alternative",
            alternatives,
            alternative_type,
            |writer, _, alt| {
                writeln!(writer, "        if (!holds_alternative<Alternative>()) {{")?;
                writeln!(
                    writer,
                    "          return static_cast<decltype(&{})>(nullptr);",
                    alt.name,
                )?;
                writeln!(writer, "        }}")?;
                writeln!(writer, "        return &{};", alt.name)
            },
            UNKNOWN_ALTERNATIVE,
        )?;
        writeln!(writer, "    }}")?;

        writeln!(writer)?;
        writeln!(writer, "    template <typename Visitor>")?;
        match view {
            View::Mutable => writeln!(writer, "    decltype(auto) visit(Visitor&& visitor) {{")?,
            View::Const => writeln!(writer, "    decltype(auto) visit(Visitor&& visitor) const {{")?,
        }
        writeln!(writer, "      switch (index()) {{")?;
        for (index, alt) in alternatives.iter().enumerate() {
            writeln!(writer, "        case {index}:")?;
            writeln!(
                writer,
                "          return std::forward<Visitor>(visitor)({});",
                alt.name,
            )?;
        }
        writeln!(writer, "        default:")?;
        writeln!(writer, "          std::abort();")?;
        writeln!(writer, "      }}")?;
        writeln!(writer, "    }}")?;

        if view == View::Mutable {
            writeln!(writer)?;
            self.emit_emplace(writer, field, alternatives)?;
        }

        writeln!(writer, "  }};")
    }

    /// `emplace<T>(args...)`: zero the payload, write the tag, then store at
    /// most one value. Record alternatives are only default constructed.
    fn emit_emplace<W: Write>(
        &self,
        writer: &mut W,
        field: &Field,
        alternatives: &[Alternative],
    ) -> fmt::Result {
        writeln!(writer, "    template <typename Alternative, typename... Args>")?;
        writeln!(writer, "    void emplace(Args&&... args) {{")?;
        writeln!(
            writer,
            "      noserde::zero_bytes(payload_ptr_, __layout::{});",
            layout::payload_size_constant(&field.name),
        )?;
        emit_dispatch(
            writer,
            "      ",
            "Alternative",
            alternatives,
            |alt| alt.r#type.name().to_owned(),
            |writer: &mut W, index, alt| {
                writeln!(
                    writer,
                    "        noserde::store_le<std::uint32_t>(tag_ptr_, static_cast<std::uint32_t>({index}));",
                )?;
                match &alt.r#type {
                    ValueType::Record(_) => writeln!(
                        writer,
                        "        static_assert(sizeof...(Args) == 0, \"record alternatives support only default emplace() in v1\");",
                    ),
                    ValueType::Scalar(name) => {
                        writeln!(
                            writer,
                            "        static_assert(sizeof...(Args) <= 1, \"emplace supports at most one argument\");",
                        )?;
                        writeln!(writer, "        if constexpr (sizeof...(Args) == 0) {{")?;
                        writeln!(writer, "          {} = {name}{{}};", alt.name)?;
                        writeln!(writer, "        }} else {{")?;
                        writeln!(
                            writer,
                            "          {} = static_cast<{name}>((std::forward<Args>(args), ...));",
                            alt.name,
                        )?;
                        writeln!(writer, "        }}")
                    }
                }
            },
            UNKNOWN_ALTERNATIVE,
        )?;
        writeln!(writer, "    }}")
    }

    /// `assign_data(Ref, const Data&)`: copy an owning value into a view.
    fn emit_assign_data<W: Write>(&self, writer: &mut W, record: &Record) -> fmt::Result {
        writeln!(writer, "  static void assign_data(Ref dst, const Data& src) {{")?;
        for field in &record.fields {
            let name = &field.name;
            match &field.r#type {
                FieldType::Value(ValueType::Record(record_name)) => {
                    writeln!(writer, "    {record_name}::assign_data(dst.{name}, src.{name});")?;
                }
                FieldType::Value(ValueType::Scalar(type_name)) => {
                    writeln!(writer, "    dst.{name} = static_cast<{type_name}>(src.{name});")?;
                }
                FieldType::Union(union) => {
                    writeln!(writer, "    std::visit(")?;
                    writeln!(writer, "        [&](const auto& value) {{")?;
                    writeln!(writer, "          using Alt = std::decay_t<decltype(value)>;")?;
                    emit_dispatch(
                        writer,
                        "          ",
                        "Alt",
                        &union.alternatives,
                        |alt| alt.r#type.data_type(),
                        |writer: &mut W, _, alt| match &alt.r#type {
                            ValueType::Record(alt_type) => {
                                writeln!(writer, "            dst.{name}.template emplace<{alt_type}>();")?;
                                writeln!(
                                    writer,
                                    "            auto* value_ref = dst.{name}.template get_if<{alt_type}>();",
                                )?;
                                writeln!(writer, "            if (value_ref == nullptr) {{")?;
                                writeln!(writer, "              std::abort();")?;
                                writeln!(writer, "            }}")?;
                                writeln!(writer, "            {alt_type}::assign_data(*value_ref, value);")
                            }
                            ValueType::Scalar(alt_type) => writeln!(
                                writer,
                                "            dst.{name}.template emplace<{alt_type}>(value);",
                            ),
                        },
                        "std::abort();",
                    )?;
                    writeln!(writer, "        }},")?;
                    writeln!(writer, "        src.{name});")?;
                }
            }
        }
        writeln!(writer, "  }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::surface_to_core;
    use crate::surface;

    fn generate(source: &str) -> Vec<String> {
        let module = surface::Module::parse(source).unwrap();
        let module = surface_to_core::Context::new().from_module(&module);
        let layouts = Layouts::new(&module).unwrap();
        let context = Context::new(&layouts);
        (module.blocks.iter())
            .map(|block| context.block_to_string(block).unwrap())
            .collect()
    }

    #[test]
    fn single_scalar_field() {
        let output = generate("[[noserde]] struct Demo { std::uint32_t id; };");
        let expected = "struct Demo {
  struct __layout {
    static constexpr std::size_t id_offset = 0;
    static constexpr std::size_t size_bytes = id_offset + noserde::wire_sizeof<std::uint32_t>();
  };

  struct Data {
    std::uint32_t id{};
  };

  class Ref {
   private:
    std::byte* base_;

   public:
    noserde::scalar_ref<std::uint32_t> id;

    explicit Ref(std::byte* base)
        : base_(base),
          id(base + __layout::id_offset) {}
  };

  class ConstRef {
   private:
    const std::byte* base_;

   public:
    noserde::scalar_cref<std::uint32_t> id;

    explicit ConstRef(const std::byte* base)
        : base_(base),
          id(base + __layout::id_offset) {}
  };

  static constexpr std::size_t noserde_size_bytes = __layout::size_bytes;
  static constexpr std::uint64_t noserde_schema_hash = 0x64ee760ae270201cULL;

  static void assign_data(Ref dst, const Data& src) {
    dst.id = static_cast<std::uint32_t>(src.id);
  }

  static Ref make_ref(std::byte* ptr) { return Ref(ptr); }
  static ConstRef make_const_ref(const std::byte* ptr) { return ConstRef(ptr); }
};";
        assert_eq!(output, [expected]);
    }

    #[test]
    fn union_layout_and_views() {
        let output = generate(
            "[[noserde]] struct Demo { union Value { std::int16_t small; std::int32_t large; } value; };",
        );
        let output = &output[0];

        assert!(output.contains("    static constexpr std::size_t value_tag_offset = 0;\n"));
        assert!(output.contains(
            "    static constexpr std::size_t value_payload_offset = value_tag_offset + noserde::wire_sizeof<std::uint32_t>();\n"
        ));
        assert!(output.contains(
            "    static constexpr std::size_t value_payload_size = noserde::max_size(noserde::wire_sizeof<std::int16_t>(), noserde::wire_sizeof<std::int32_t>());\n"
        ));
        assert!(output.contains(
            "    static constexpr std::size_t size_bytes = value_payload_offset + value_payload_size;\n"
        ));
        assert!(output.contains("  struct Value {\n  };\n"));
        assert!(output.contains("  using value_data = std::variant<std::int16_t, std::int32_t>;\n"));
        assert!(output.contains("    value_data value{};\n"));
        assert!(output.contains("  class value_union_ref {\n"));
        assert!(output.contains("  class value_union_const_ref {\n"));
        assert!(output.contains(
            "      return (std::is_same_v<Alternative, std::int16_t> ? 1u : 0u) + (std::is_same_v<Alternative, std::int32_t> ? 1u : 0u);\n"
        ));
        assert!(output.contains("      else if constexpr (std::is_same_v<Alternative, std::int32_t>) {\n        return 1;\n      }\n"));
        assert!(output.contains("      noserde::zero_bytes(payload_ptr_, __layout::value_payload_size);\n"));
        assert!(output.contains(
            "          value(base + __layout::value_tag_offset, base + __layout::value_payload_offset) {}\n"
        ));
        assert_eq!(output.matches("void emplace(").count(), 1);
        assert_eq!(output.matches("std::abort();").count(), 3);
    }

    #[test]
    fn helpers_precede_their_block() {
        let output = generate(
            "[[noserde]] struct Demo { union Value { bool flag; struct Words { std::uint32_t hi; } words; } value; };",
        );
        let output = &output[0];

        assert!(output.starts_with("struct Demo__Value__words__Words {\n"));
        assert!(output.contains("};\n\nstruct Demo {\n"));
        assert!(output.contains("  struct Value {\n    using Words = Demo__Value__words__Words;\n  };\n"));
        assert!(output.contains(
            "  using value_data = std::variant<bool, Demo__Value__words__Words::Data>;\n"
        ));
        assert!(output.contains(
            "    typename noserde::record_traits<Demo__Value__words__Words>::const_ref words;\n"
        ));
        assert!(output.contains(
            "          words(noserde::make_record_ref<Demo__Value__words__Words>(payload_ptr)) {}\n"
        ));
        assert!(output.contains(
            "        static_assert(sizeof...(Args) == 0, \"record alternatives support only default emplace() in v1\");\n"
        ));
        assert!(output.contains(
            "          else if constexpr (std::is_same_v<Alt, Demo__Value__words__Words::Data>) {\n            dst.value.template emplace<Demo__Value__words__Words>();\n"
        ));
        assert!(output.ends_with("};"));
    }

    #[test]
    fn record_fields_recurse() {
        let output = generate(
            "[[noserde]] struct Point { std::int32_t x; };
             [[noserde]] struct Segment { Point start; bool closed; };",
        );
        let segment = &output[1];

        assert!(segment.contains(
            "    static constexpr std::size_t closed_offset = start_offset + noserde::record_sizeof<Point>();\n"
        ));
        assert!(segment.contains("    Point::Data start{};\n"));
        assert!(segment.contains("    typename noserde::record_traits<Point>::ref start;\n"));
        assert!(segment.contains(
            "          start(noserde::make_record_ref<Point>(base + __layout::start_offset)),\n"
        ));
        assert!(segment.contains("    Point::assign_data(dst.start, src.start);\n"));
    }
}
