//! Rendering a whole source file: every annotated struct is replaced by its
//! generated code, and a header records which input produced the output.

use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

use crate::core::layout::{Layouts, WireSizes};
use crate::core::Block;
use crate::pass::{core_to_cpp, surface_to_core};
use crate::reporting::{ParseMessage, WarningMessage};
use crate::surface;
use crate::{FORMAT_VERSION, GENERATOR_VERSION};

const RUNTIME_HEADER: &str = "noserde.hpp";
const DIGEST_PREFIX: &str = "// digest: ";
const DIGEST_LEN: usize = 64;

#[derive(Debug)]
pub enum RenderError {
    Parse(ParseMessage),
    Format(fmt::Error),
}

impl From<ParseMessage> for RenderError {
    fn from(message: ParseMessage) -> RenderError {
        RenderError::Parse(message)
    }
}

impl From<fmt::Error> for RenderError {
    fn from(error: fmt::Error) -> RenderError {
        RenderError::Format(error)
    }
}

/// The output for one input file.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub text: String,
    pub digest: String,
    pub warnings: Vec<WarningMessage>,
}

/// Render the output for `source`, labelling it with `label` in the header.
pub fn render_file(label: &str, source: &str) -> Result<Rendered, RenderError> {
    let surface_module = surface::Module::parse(source)?;

    let mut context = surface_to_core::Context::new();
    let module = context.from_module(&surface_module);
    let warnings = context.drain_warnings().collect();

    let layouts = Layouts::new(&module)?;
    for layout in layouts.iter() {
        match layouts.size_of(&layout.name, WireSizes::standard()) {
            Some(size) => tracing::debug!(record = %layout.name, size, "planned layout"),
            None => tracing::debug!(record = %layout.name, "planned layout with runtime-defined sizes"),
        }
    }

    let codegen = core_to_cpp::Context::new(&layouts);
    let replacements = (module.blocks.iter())
        .map(|block| Ok((block, codegen.block_to_string(block)?)))
        .collect::<Result<Vec<_>, fmt::Error>>()?;
    let transformed = apply_substitutions(source, &replacements);

    let digest = file_digest(source.as_bytes());
    let text = format!(
        "// noserde-generated\n\
         // source: {label}\n\
         // generator_version: {GENERATOR_VERSION}\n\
         // format_version: {FORMAT_VERSION}\n\
         {DIGEST_PREFIX}{digest}\n\
         \n\
         {transformed}"
    );

    Ok(Rendered {
        text,
        digest,
        warnings,
    })
}

/// Splice generated code over each block, copying every other byte
/// unchanged. The runtime include is added before the first block when the
/// source does not already have one.
pub fn apply_substitutions(source: &str, replacements: &[(&Block, String)]) -> String {
    let mut output = String::with_capacity(source.len());
    let mut cursor = 0;
    let mut needs_include = !has_runtime_include(source);

    for (block, replacement) in replacements {
        let range = std::ops::Range::<usize>::from(block.range);
        output.push_str(&source[cursor..range.start]);
        if needs_include {
            output.push_str("#include <noserde.hpp>\n\n");
            needs_include = false;
        }
        output.push_str(replacement);
        cursor = range.end;
    }

    output.push_str(&source[cursor..]);
    output
}

/// Whether some line includes the runtime header, with either `<>` or `""`.
pub fn has_runtime_include(source: &str) -> bool {
    source.lines().any(|line| {
        let header = (line.trim_start().strip_prefix('#'))
            .map(str::trim_start)
            .and_then(|rest| rest.strip_prefix("include"))
            .map(str::trim_start)
            .and_then(|rest| rest.strip_prefix(['<', '"']))
            .and_then(|rest| rest.strip_prefix(RUNTIME_HEADER));
        matches!(header, Some(rest) if rest.starts_with(['>', '"']))
    })
}

/// SHA-256 over the generator version, the format version and the input.
pub fn file_digest(source: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(GENERATOR_VERSION.as_bytes());
    hasher.update([0]);
    hasher.update(FORMAT_VERSION.as_bytes());
    hasher.update([0]);
    hasher.update(source);
    hex::encode(hasher.finalize())
}

/// The digest recorded in a previously rendered output.
pub fn extract_digest(text: &str) -> Option<&str> {
    text.lines().find_map(|line| {
        let digest = line.strip_prefix(DIGEST_PREFIX)?;
        let is_digest = digest.len() == DIGEST_LEN
            && (digest.bytes()).all(|byte| matches!(byte, b'0'..=b'9' | b'a'..=b'f'));
        is_digest.then_some(digest)
    })
}

/// The input path relative to the working directory when it is inside it,
/// otherwise absolute.
pub fn source_label(path: &Path) -> String {
    let absolute = match path.canonicalize() {
        Ok(absolute) => absolute,
        Err(_) => return path.display().to_string(),
    };
    let relative = (std::env::current_dir().and_then(|cwd| cwd.canonicalize()).ok())
        .and_then(|cwd| absolute.strip_prefix(cwd).ok().map(Path::to_path_buf));

    match relative {
        Some(relative) => relative.display().to_string(),
        None => absolute.display().to_string(),
    }
}
