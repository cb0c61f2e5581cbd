#![allow(clippy::result_large_err)]
#![doc = include_str!("../README.md")]

#[macro_use]
mod macros;

pub mod cli;
pub mod compose;
pub mod defaults;
pub mod errors;
pub mod overrides;
pub mod pkg;
pub mod plugins;
pub mod repository;
pub mod search_path;
pub mod singleton;
pub mod sources;
pub mod store;
pub mod sweeper;

#[doc(inline)]
pub use compose::{compose, compose_multirun, Composed, ComposeSettings};
#[doc(inline)]
pub use errors::ComposeError;
pub use strata_value::{Map, Value};
