//! Partition data transport
//!
//! This module provides the connector/stream abstraction the reader pulls
//! partition bytes through, the framed TCP protocol spoken with data servers,
//! and an in-memory connector.

mod memory;
pub mod protocol;
mod tcp;
mod traits;

pub use memory::{MemoryConnector, DEFAULT_CHUNK_SIZE};
pub use protocol::{Frame, ReadRequest, DEFAULT_MAX_FRAME_SIZE};
pub use tcp::{TcpConnector, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};
pub use traits::{BoxedPartitionStream, PartitionConnector, PartitionStream, SharedConnector};
