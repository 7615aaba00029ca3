//! Blocking iterator over one partition.

use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use super::binary::{BinaryRecordReader, ReaderState, ReaderStatus};
use super::value::Record;
use crate::error::{Error, ReadError, ReadFailure, SourceError};
use crate::partition::PartitionDescriptor;
use crate::schema::RecordSchema;
use crate::source::SharedConnector;

/// Pull-based, blocking wrapper around a [`BinaryRecordReader`].
///
/// Owns a current-thread tokio runtime that drives the reader, so it must
/// not be used from inside another runtime. Give each thread its own
/// iterator to read partitions in parallel.
pub struct RecordReadIterator {
    runtime: Runtime,
    reader: BinaryRecordReader,
}

impl RecordReadIterator {
    /// Create an iterator for `partition`. The connection is opened lazily.
    pub fn new(
        partition: PartitionDescriptor,
        schema: Arc<RecordSchema>,
        connector: SharedConnector,
    ) -> Result<Self, Error> {
        let index = partition.index();
        let reader = BinaryRecordReader::new(partition, schema, connector)?;
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ReadError::Source {
                partition: index,
                source: SourceError::Io(e),
            })?;
        Ok(Self { runtime, reader })
    }

    /// Whether another record is available. Never fails; see
    /// [`BinaryRecordReader::has_next`].
    pub fn has_next(&mut self) -> bool {
        self.runtime.block_on(self.reader.has_next())
    }

    /// Return the next record.
    pub fn next_record(&mut self) -> Result<Record, ReadError> {
        self.runtime.block_on(self.reader.next_record())
    }

    pub fn status(&mut self) -> ReaderStatus {
        self.runtime.block_on(self.reader.status())
    }

    pub fn state(&self) -> ReaderState {
        self.reader.state()
    }

    pub fn failure(&self) -> Option<&ReadFailure> {
        self.reader.failure()
    }

    /// The underlying reader, for counters and the output schema.
    pub fn reader(&self) -> &BinaryRecordReader {
        &self.reader
    }

    /// Release the connection.
    pub fn close(&mut self) {
        self.reader.close();
    }
}

impl Iterator for RecordReadIterator {
    type Item = Result<Record, ReadError>;

    /// Yields records until the partition ends. A broken stream yields one
    /// `Err` and then ends.
    fn next(&mut self) -> Option<Self::Item> {
        match self.next_record() {
            Ok(record) => Some(Ok(record)),
            Err(ReadError::NoSuchElement { .. }) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl std::fmt::Debug for RecordReadIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordReadIterator")
            .field("reader", &self.reader)
            .finish()
    }
}
