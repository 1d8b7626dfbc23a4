//! Generator for fixed-layout, zero-copy accessors of `[[noserde]]` structs.
//!
//! Annotated struct declarations in a C++ source are replaced by generated
//! code that reads and writes the struct's fields directly in a byte buffer.
//! Every other byte of the source is copied through unchanged.

// Supporting modules
mod source;

// Intermediate languages
pub mod core;
pub mod surface;

// Top level API
pub mod driver;
pub mod pass;
pub mod render;
pub mod reporting;

pub use crate::driver::{Driver, Status};
pub use crate::source::{BytePos, ByteRange};

/// The attribute that marks a struct for generation.
pub const ATTRIBUTE_TOKEN: &str = "[[noserde]]";

/// Recorded in every generated header and mixed into the digest.
pub const GENERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The version of the generated code's layout conventions.
pub const FORMAT_VERSION: &str = "1";
