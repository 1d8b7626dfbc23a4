//! Translations between the surface and core languages, and from the core
//! language to C++.

pub mod core_to_cpp;
pub mod surface_to_core;
