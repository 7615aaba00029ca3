//! Partition-parallel reader for logical files hosted on a remote cluster
//!
//! This library resolves a logical file name through the cluster's
//! metadata/access service, rewrites replica addresses into reachable ones,
//! and streams each partition from its data server, decoding the binary row
//! format into typed records narrowed by a projection and a filter.
//!
//! # Example
//! ```no_run
//! use clusterfile::{ConnectionInfo, FileReadOptions, LogicalFile};
//!
//! let connection = ConnectionInfo::from_connection_string("esp.example:8010", None, None)?;
//! let file = LogicalFile::connect(
//!     "scope::people",
//!     &connection,
//!     FileReadOptions::new().with_projection("id, name"),
//! )?;
//! let resolved = file.resolve_blocking()?;
//! for index in 0..resolved.partitions().len() {
//!     for record in resolved.open_iterator(index)? {
//!         println!("{:?}", record?);
//!     }
//! }
//! # Ok::<(), clusterfile::Error>(())
//! ```

pub mod api;
pub mod error;
pub mod filter;
pub mod metadata;
pub mod partition;
pub mod reader;
pub mod remap;
pub mod schema;
pub mod source;

// Re-export main types
pub use api::{ConnectionInfo, FileReadOptions, LogicalFile, ResolvedFile};
pub use error::{
    DecodeError, EncodeError, Error, FilterError, ReadError, ReadFailure, ReadFailureKind,
    ResolutionError, SchemaError, ServiceError, SourceError,
};
pub use filter::FilterExpression;
pub use metadata::{
    AccessIntent, FileMetadataResolver, HttpMetadataService, MetadataService,
    SharedMetadataService,
};
pub use partition::{AccessToken, FileFormat, PartitionDescriptor};
pub use reader::{
    open_reader, BinaryRecordReader, ReaderState, ReaderStatus, Record, RecordReadIterator, Value,
};
pub use remap::{ClusterAddressRemapper, NodeAddress, RemapCondition, RemapInfo};
pub use schema::{parse_schema, project, FieldSchema, FieldType, ProjectionSpec, RecordSchema};
pub use source::{MemoryConnector, PartitionConnector, SharedConnector, TcpConnector};
