//! Caller-facing API
//!
//! This module provides the entry points for reading a logical file:
//!
//! - `options`: connection settings and per-file read options
//! - `file`: `LogicalFile`, which resolves and caches the partition layout,
//!   and `ResolvedFile`, which opens readers over it

mod file;
mod options;

pub use file::{LogicalFile, ResolvedFile};
pub use options::{
    ConnectionInfo, FileReadOptions, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RETRY_BASE_DELAY,
    DEFAULT_SERVICE_PORT,
};
