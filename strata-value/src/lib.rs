//! Ordered value tree for layered configuration.
//!
//! The building blocks used by the `strata` composition engine: a tagged
//! [`Value`] tree with insertion-ordered maps, a YAML codec that understands
//! `# @key value` front-matter headers, dotted-path navigation, deep merging
//! and `${...}` interpolation resolution.

mod error;
mod value;

pub mod interp;
pub mod merge;
pub mod path;
pub mod yaml;

pub use error::ValueError;
pub use value::{format_float, Map, Quote, Value, MISSING};
pub use yaml::Document;
