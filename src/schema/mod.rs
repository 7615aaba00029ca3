//! Record layout types and parsing.
//!
//! This module defines the typed field tree describing a logical file's
//! records, the JSON parser for the description served by the metadata
//! service, and column projection.

mod parser;
pub mod projection;
mod types;

pub use parser::{parse_schema, parse_schema_value, SchemaParser, DEFAULT_NUMERIC_SIZE};
pub use projection::{project, project_union, ProjectionSpec};
pub use types::*;
