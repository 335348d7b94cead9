//! ECMAScript/TypeScript parsing and printing for unawait.
//!
//! Thin wrappers around the SWC parser and code generator, shared by the
//! CLI, the test harness, and the transform's unit tests.

pub mod emit;
pub mod parse;

pub use emit::{emit_module, emit_module_with_source_map};
pub use parse::{parse_source, ParseResult};
