//! Error types for the partitioned read path

use std::io;
use thiserror::Error;

/// Errors that can occur while parsing or projecting a schema description
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Structurally invalid schema description
    #[error("Malformed schema: {0}")]
    MalformedSchema(String),
    /// A projection or filter path does not name a field of the schema
    #[error("Unknown field: {0}")]
    UnknownField(String),
}

/// Errors raised while parsing filter text
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// Filter text could not be parsed
    #[error("Filter syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },
}

/// Errors that can occur while decoding the binary row format
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Data violates the row format
    #[error("Invalid data: {0}")]
    InvalidData(String),
    /// Input ended inside a value
    #[error("Unexpected end of data")]
    UnexpectedEof,
    /// String is not valid UTF-8
    #[error("Invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Errors raised when a record does not fit the layout it is encoded with
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Value variant does not match the field type
    #[error("Type mismatch for '{field}': expected {expected}")]
    TypeMismatch { field: String, expected: String },
    /// Value does not fit the declared width
    #[error("Value out of range for '{field}': {message}")]
    OutOfRange { field: String, message: String },
    /// Record is missing a field of the layout
    #[error("Missing field: {0}")]
    MissingField(String),
}

/// Errors reported by the metadata/access service client
#[derive(Debug, Error)]
pub enum ServiceError {
    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// Malformed service URL
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
    /// Service answered with an error status
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },
    /// Credentials were rejected
    #[error("Authentication failed")]
    AuthenticationFailed,
    /// Response could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// Retries exhausted without a definitive answer
    #[error("Max retries exceeded")]
    MaxRetriesExceeded,
}

/// Errors that can occur resolving a logical file into partitions
#[derive(Debug, Error)]
pub enum ResolutionError {
    /// The service returned no schema description
    #[error("Schema description unavailable for '{file}'")]
    SchemaUnavailable { file: String },

    /// The service reported zero partitions
    #[error("No partitions reported for '{file}'")]
    NoPartitions { file: String },

    /// Transport or service failure while acquiring access
    #[error("Failed to acquire file access for '{file}': {source}")]
    AccessAcquisitionFailed {
        file: String,
        #[source]
        source: ServiceError,
    },

    /// Requested access expiry is not usable
    #[error("Invalid access expiry of {seconds}s for '{file}'")]
    InvalidExpiry { file: String, seconds: u32 },

    /// Remap policy cannot be applied to the reported topology
    #[error("Invalid remap: {0}")]
    Remap(String),

    /// Partition spans or replica lists violate the layout invariants
    #[error("Invalid partition layout for '{file}': {message}")]
    InvalidLayout { file: String, message: String },

    /// A partition carries a format tag this reader cannot decode
    #[error("Unsupported format '{format}' for partition {partition}")]
    UnsupportedFormat { partition: usize, format: String },
}

/// Errors that can occur connecting to or streaming from a partition replica
#[derive(Debug, Error)]
pub enum SourceError {
    /// Connecting to a replica failed
    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },
    /// Connect or read did not complete in time
    #[error("Timed out {0}")]
    Timeout(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// The peer violated the framing protocol
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// The peer sent an error frame
    #[error("Remote error: {0}")]
    Remote(String),
    /// Every replica refused the connection
    #[error("No reachable replica among [{}]", .attempts.join(", "))]
    NoReachableReplica { attempts: Vec<String> },
    /// The address text is not `host:port`
    #[error("Invalid node address: '{0}'")]
    InvalidAddress(String),
}

/// Errors surfaced by a partition reader
#[derive(Debug, Error)]
pub enum ReadError {
    /// Connection or transport failure
    #[error("Read failure for partition {partition}: {source}")]
    Source {
        partition: usize,
        #[source]
        source: SourceError,
    },

    /// Stream ended before the declared span or inside a record
    #[error("Partition {partition} truncated: received {received} of {expected} bytes")]
    Truncated {
        partition: usize,
        received: u64,
        expected: u64,
    },

    /// A record could not be decoded
    #[error("Decode error in partition {partition}, record {record_index}: {source}")]
    Decode {
        partition: usize,
        record_index: u64,
        #[source]
        source: DecodeError,
    },

    /// `next_record` was called with no record available
    #[error("No more elements in partition {partition}")]
    NoSuchElement {
        partition: usize,
        cause: Option<ReadFailure>,
    },
}

impl ReadError {
    /// Whether this error reports a broken stream rather than a protocol misuse.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ReadError::NoSuchElement { .. })
    }

    /// Kind used when this error is recorded as a reader failure.
    pub fn failure_kind(&self) -> ReadFailureKind {
        match self {
            ReadError::Source { .. } => ReadFailureKind::Connection,
            ReadError::Truncated { .. } => ReadFailureKind::Truncated,
            ReadError::Decode { .. } => ReadFailureKind::Decode,
            ReadError::NoSuchElement { .. } => ReadFailureKind::Protocol,
        }
    }
}

/// Cause recorded by a reader that entered the failed state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadFailure {
    /// The kind of failure
    pub kind: ReadFailureKind,
    /// Partition index where the failure occurred
    pub partition: usize,
    /// Records handed to the caller before the failure
    pub records_read: u64,
    /// Human-readable error message
    pub message: String,
}

impl ReadFailure {
    /// Record the failure described by `error`.
    pub fn from_error(error: &ReadError, partition: usize, records_read: u64) -> Self {
        Self {
            kind: error.failure_kind(),
            partition,
            records_read,
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for ReadFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} in partition {} after {} records: {}",
            self.kind, self.partition, self.records_read, self.message
        )
    }
}

/// Kinds of reader failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFailureKind {
    /// No replica could be reached or the connection broke
    Connection,
    /// The stream ended early
    Truncated,
    /// Record bytes did not match the schema
    Decode,
    /// Caller misuse of the pull protocol
    Protocol,
}

/// Top-level error type for the caller-facing API
#[derive(Debug, Error)]
pub enum Error {
    /// Resolution error
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// Schema error
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Filter error
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    /// Read error
    #[error("Read error: {0}")]
    Read(#[from] ReadError),

    /// Service client could not be built
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}
