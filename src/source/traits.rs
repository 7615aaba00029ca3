//! Transport traits for partition data.
//!
//! A `PartitionConnector` opens a byte stream for one partition on one
//! replica; the reader pulls chunks from the returned `PartitionStream` until
//! it reports the end.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::protocol::ReadRequest;
use crate::error::SourceError;
use crate::remap::NodeAddress;

/// Chunked byte stream of one partition span.
#[async_trait]
pub trait PartitionStream: Send {
    /// Pull the next chunk.
    ///
    /// # Returns
    /// `Some(chunk)` with a non-empty chunk, or `None` once the stream ended.
    /// After `None` or an error the stream must not be polled again.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, SourceError>;
}

/// A boxed PartitionStream for dynamic dispatch
pub type BoxedPartitionStream = Box<dyn PartitionStream>;

#[async_trait]
impl PartitionStream for BoxedPartitionStream {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, SourceError> {
        (**self).next_chunk().await
    }
}

/// Opens partition streams on replica nodes.
#[async_trait]
pub trait PartitionConnector: Send + Sync {
    /// Connect to `address` and request the span described by `request`.
    ///
    /// # Errors
    /// `SourceError::Connect` or `SourceError::Timeout` when the replica is
    /// unreachable; the reader then tries the next replica.
    async fn open(
        &self,
        address: &NodeAddress,
        request: &ReadRequest,
    ) -> Result<BoxedPartitionStream, SourceError>;
}

/// A shared PartitionConnector for dynamic dispatch
pub type SharedConnector = Arc<dyn PartitionConnector>;

#[async_trait]
impl<T: PartitionConnector + ?Sized> PartitionConnector for Arc<T> {
    async fn open(
        &self,
        address: &NodeAddress,
        request: &ReadRequest,
    ) -> Result<BoxedPartitionStream, SourceError> {
        (**self).open(address, request).await
    }
}
