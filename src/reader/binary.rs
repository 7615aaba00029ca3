//! Async partition reader.
//!
//! `BinaryRecordReader` connects to one replica of a partition, pulls the
//! partition's byte span through a [`crate::source::PartitionStream`] and
//! decodes records on demand. Filtered-out records never reach the caller;
//! output records carry the projected shape.

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tracing::{debug, error, info, warn};

use super::decode::{decode_index_entry, RecordPlan};
use super::value::Record;
use crate::error::{DecodeError, Error, ReadError, ReadFailure, SourceError};
use crate::partition::{FileFormat, PartitionDescriptor};
use crate::remap::NodeAddress;
use crate::schema::{project, project_union, RecordSchema};
use crate::source::{BoxedPartitionStream, PartitionConnector, SharedConnector};

/// Lifecycle of a reader.
///
/// `Unopened -> Connected -> Streaming -> Exhausted`, with `Failed` reachable
/// from `Connected` and `Streaming`. `Exhausted` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Unopened,
    Connected,
    Streaming,
    Exhausted,
    Failed,
}

/// Result of asking a reader whether records remain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderStatus {
    /// A record is ready
    HasMore,
    /// The partition was read completely
    Exhausted,
    /// The reader stopped on an error
    Failed(ReadFailure),
}

/// Streams and decodes the records of one partition.
///
/// # Example
/// ```ignore
/// let mut reader = BinaryRecordReader::new(partition, schema, connector)?;
/// while reader.has_next().await {
///     let record = reader.next_record().await?;
///     println!("{:?}", record);
/// }
/// if let Some(failure) = reader.failure() {
///     eprintln!("partition failed: {}", failure);
/// }
/// ```
pub struct BinaryRecordReader {
    partition: PartitionDescriptor,
    /// Shape of the records handed out
    output_schema: Arc<RecordSchema>,
    plan: RecordPlan,
    /// Set when the decoded shape is wider than the output shape
    prune_to_output: bool,
    connector: SharedConnector,
    state: ReaderState,
    stream: Option<BoxedPartitionStream>,
    buffer: BytesMut,
    stream_done: bool,
    bytes_received: u64,
    bytes_consumed: u64,
    lookahead: Option<Record>,
    failure: Option<ReadFailure>,
    records_read: u64,
    records_filtered: u64,
    active_replica: Option<NodeAddress>,
}

impl BinaryRecordReader {
    /// Prepare a reader for `partition` of a file laid out by `schema`.
    ///
    /// No connection is made until the first record is requested.
    ///
    /// # Errors
    /// - `Error::Schema` if the partition's projection or filter names a
    ///   field missing from `schema`
    pub fn new(
        partition: PartitionDescriptor,
        schema: Arc<RecordSchema>,
        connector: SharedConnector,
    ) -> Result<Self, Error> {
        let filter = partition.filter();
        filter.validate(&schema)?;

        let output_schema = Arc::new(project(&schema, partition.projection())?);
        let (plan, prune_to_output) = if partition.projection().is_all() {
            (RecordPlan::full(&schema), false)
        } else {
            let paths = partition
                .projection()
                .paths()
                .iter()
                .map(String::as_str)
                .chain(filter.field_paths());
            let needed = project_union(&schema, paths)?;
            let prune = needed != *output_schema;
            (RecordPlan::new(&schema, &needed), prune)
        };

        Ok(Self {
            partition,
            output_schema,
            plan,
            prune_to_output,
            connector,
            state: ReaderState::Unopened,
            stream: None,
            buffer: BytesMut::new(),
            stream_done: false,
            bytes_received: 0,
            bytes_consumed: 0,
            lookahead: None,
            failure: None,
            records_read: 0,
            records_filtered: 0,
            active_replica: None,
        })
    }

    // ========================================================================
    // Pull API
    // ========================================================================

    /// Whether a record is ready.
    ///
    /// Never fails: a read error is logged, moves the reader to
    /// [`ReaderState::Failed`] and yields `false`. The cause stays available
    /// through [`BinaryRecordReader::failure`].
    pub async fn has_next(&mut self) -> bool {
        match self.fill_lookahead().await {
            Ok(ready) => ready,
            Err(e) => {
                self.log_failure(&e);
                false
            }
        }
    }

    /// Return the next record.
    ///
    /// # Errors
    /// - `ReadError::NoSuchElement` once the reader is exhausted or failed
    /// - `ReadError::Source`, `Truncated` or `Decode` when the stream breaks
    ///   while producing this record; the reader is failed afterwards
    pub async fn next_record(&mut self) -> Result<Record, ReadError> {
        if !self.fill_lookahead().await? {
            return Err(self.no_such_element());
        }
        match self.lookahead.take() {
            Some(record) => {
                self.records_read += 1;
                Ok(record)
            }
            None => Err(self.no_such_element()),
        }
    }

    /// Tri-state view of the reader: more records, exhausted, or failed.
    pub async fn status(&mut self) -> ReaderStatus {
        match self.fill_lookahead().await {
            Ok(true) => ReaderStatus::HasMore,
            Ok(false) => match &self.failure {
                Some(failure) => ReaderStatus::Failed(failure.clone()),
                None => ReaderStatus::Exhausted,
            },
            Err(e) => {
                self.log_failure(&e);
                match &self.failure {
                    Some(failure) => ReaderStatus::Failed(failure.clone()),
                    None => ReaderStatus::Exhausted,
                }
            }
        }
    }

    /// Read every remaining record.
    pub async fn read_all(&mut self) -> Result<Vec<Record>, ReadError> {
        let mut records = Vec::new();
        while self.fill_lookahead().await? {
            records.push(self.next_record().await?);
        }
        Ok(records)
    }

    /// Release the connection. Further reads report no more elements.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!(
                partition = self.partition.index(),
                records_read = self.records_read,
                "Closed partition reader"
            );
        }
        self.buffer = BytesMut::new();
        self.lookahead = None;
        if self.state != ReaderState::Failed {
            self.state = ReaderState::Exhausted;
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Cause of the failure, once the reader has failed.
    pub fn failure(&self) -> Option<&ReadFailure> {
        self.failure.as_ref()
    }

    pub fn partition(&self) -> &PartitionDescriptor {
        &self.partition
    }

    /// Shape of the records this reader returns.
    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.output_schema
    }

    /// Records returned to the caller.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Records decoded and dropped by the filter.
    pub fn records_filtered(&self) -> u64 {
        self.records_filtered
    }

    /// Partition bytes decoded so far.
    pub fn bytes_consumed(&self) -> u64 {
        self.bytes_consumed
    }

    /// Replica the reader is connected to.
    pub fn active_replica(&self) -> Option<&NodeAddress> {
        self.active_replica.as_ref()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn no_such_element(&self) -> ReadError {
        ReadError::NoSuchElement {
            partition: self.partition.index(),
            cause: self.failure.clone(),
        }
    }

    fn log_failure(&self, e: &ReadError) {
        error!(
            partition = self.partition.index(),
            path = %self.partition.path(),
            records_read = self.records_read,
            error = %e,
            "Partition read failed"
        );
    }

    /// Move to `Failed`, recording the cause and releasing the connection.
    fn fail(&mut self, e: ReadError) -> ReadError {
        self.state = ReaderState::Failed;
        self.failure = Some(ReadFailure::from_error(
            &e,
            self.partition.index(),
            self.records_read,
        ));
        self.stream = None;
        self.buffer = BytesMut::new();
        e
    }

    /// Ensure a record is buffered in the lookahead slot.
    async fn fill_lookahead(&mut self) -> Result<bool, ReadError> {
        if self.lookahead.is_some() {
            return Ok(true);
        }
        match self.state {
            ReaderState::Exhausted | ReaderState::Failed => return Ok(false),
            ReaderState::Unopened => {
                if let Err(e) = self.connect().await {
                    return Err(self.fail(e));
                }
            }
            ReaderState::Connected | ReaderState::Streaming => {}
        }

        match self.next_matching().await {
            Ok(Some(record)) => {
                self.state = ReaderState::Streaming;
                self.lookahead = Some(record);
                Ok(true)
            }
            Ok(None) => {
                self.state = ReaderState::Exhausted;
                self.stream = None;
                info!(
                    partition = self.partition.index(),
                    records_read = self.records_read,
                    records_filtered = self.records_filtered,
                    bytes = self.bytes_consumed,
                    "Partition exhausted"
                );
                Ok(false)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Connect to the first reachable replica, in order.
    async fn connect(&mut self) -> Result<(), ReadError> {
        let index = self.partition.index();
        if self.partition.token().is_expired() {
            warn!(partition = index, "Access token has expired, the read may be rejected");
        }

        let request = self.partition.read_request();
        let mut attempts = Vec::new();
        for (i, replica) in self.partition.replicas().iter().enumerate() {
            match self.connector.open(replica, &request).await {
                Ok(stream) => {
                    info!(
                        partition = index,
                        replica = %replica,
                        length = self.partition.length(),
                        "Connected to partition replica"
                    );
                    self.stream = Some(stream);
                    self.active_replica = Some(replica.clone());
                    self.state = ReaderState::Connected;
                    return Ok(());
                }
                Err(e @ (SourceError::Connect { .. } | SourceError::Timeout(_))) => {
                    if i + 1 < self.partition.replicas().len() {
                        warn!(
                            partition = index,
                            replica = %replica,
                            error = %e,
                            "Replica unreachable, trying next replica"
                        );
                    }
                    attempts.push(format!("{}: {}", replica, e));
                }
                Err(source) => {
                    return Err(ReadError::Source {
                        partition: index,
                        source,
                    })
                }
            }
        }

        Err(ReadError::Source {
            partition: index,
            source: SourceError::NoReachableReplica { attempts },
        })
    }

    /// Decode records until one passes the filter.
    async fn next_matching(&mut self) -> Result<Option<Record>, ReadError> {
        while let Some(record) = self.decode_next().await? {
            if !self.partition.filter().matches(&record) {
                self.records_filtered += 1;
                continue;
            }
            let record = if self.prune_to_output {
                record.project(&self.output_schema)
            } else {
                record
            };
            return Ok(Some(record));
        }
        Ok(None)
    }

    /// Decode the next record from the buffer, pulling chunks as needed.
    async fn decode_next(&mut self) -> Result<Option<Record>, ReadError> {
        loop {
            if self.buffer.is_empty() {
                if self.stream_done {
                    return self.finish_span().map(|_| None);
                }
                self.fill().await?;
                continue;
            }

            let mut cursor: &[u8] = &self.buffer;
            let result = match self.partition.format() {
                FileFormat::Flat => self.plan.decode(&mut cursor),
                FileFormat::Index => decode_index_entry(&mut cursor, &self.plan),
            };
            match result {
                Ok(record) => {
                    let used = self.buffer.len() - cursor.len();
                    self.buffer.advance(used);
                    self.bytes_consumed += used as u64;
                    return Ok(Some(record));
                }
                Err(DecodeError::UnexpectedEof) if !self.stream_done => {
                    self.fill().await?;
                }
                Err(DecodeError::UnexpectedEof) => {
                    return Err(ReadError::Truncated {
                        partition: self.partition.index(),
                        received: self.bytes_received,
                        expected: self.partition.length(),
                    });
                }
                Err(source) => {
                    return Err(ReadError::Decode {
                        partition: self.partition.index(),
                        record_index: self.records_read + self.records_filtered,
                        source,
                    });
                }
            }
        }
    }

    /// Append the next chunk to the buffer, or mark the stream done.
    async fn fill(&mut self) -> Result<(), ReadError> {
        let index = self.partition.index();
        let Some(stream) = self.stream.as_mut() else {
            self.stream_done = true;
            return Ok(());
        };
        let chunk = stream.next_chunk().await.map_err(|source| ReadError::Source {
            partition: index,
            source,
        })?;
        match chunk {
            Some(chunk) => {
                self.bytes_received += chunk.len() as u64;
                if self.bytes_received > self.partition.length() {
                    return Err(ReadError::Source {
                        partition: index,
                        source: SourceError::Protocol(format!(
                            "replica sent {} bytes for a {}-byte span",
                            self.bytes_received,
                            self.partition.length()
                        )),
                    });
                }
                self.buffer.extend_from_slice(&chunk);
            }
            None => {
                self.stream_done = true;
                self.stream = None;
            }
        }
        Ok(())
    }

    /// Check the byte count once the stream has ended at a record boundary.
    fn finish_span(&self) -> Result<(), ReadError> {
        if self.bytes_received < self.partition.length() {
            return Err(ReadError::Truncated {
                partition: self.partition.index(),
                received: self.bytes_received,
                expected: self.partition.length(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for BinaryRecordReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryRecordReader")
            .field("partition", &self.partition.index())
            .field("state", &self.state)
            .field("records_read", &self.records_read)
            .field("records_filtered", &self.records_filtered)
            .field("bytes_consumed", &self.bytes_consumed)
            .field("active_replica", &self.active_replica)
            .finish()
    }
}

/// Open a reader for one partition.
///
/// Convenience over [`BinaryRecordReader::new`] taking any connector.
pub fn open_reader<C>(
    partition: PartitionDescriptor,
    schema: Arc<RecordSchema>,
    connector: C,
) -> Result<BinaryRecordReader, Error>
where
    C: PartitionConnector + 'static,
{
    BinaryRecordReader::new(partition, schema, Arc::new(connector))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReadFailureKind;
    use crate::filter::FilterExpression;
    use crate::metadata::FilePartInfo;
    use crate::partition::{create_partitions, AccessToken, PartitionContext};
    use crate::reader::encode::{encode_index_entry_into, encode_record_into};
    use crate::reader::Value;
    use crate::remap::ClusterAddressRemapper;
    use crate::schema::{parse_schema, ProjectionSpec};
    use crate::source::MemoryConnector;

    /// Helper to run async tests
    fn run_async<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(f)
    }

    fn schema() -> Arc<RecordSchema> {
        Arc::new(
            parse_schema(
                r#"{"fields": [
                    {"name": "id", "type": "integer", "size": 4},
                    {"name": "name", "type": "string"},
                    {"name": "age", "type": "unsigned", "size": 1}
                ]}"#,
            )
            .unwrap(),
        )
    }

    fn person(id: i64, name: &str, age: u64) -> Record {
        Record::from_pairs([
            ("id", Value::Integer(id)),
            ("name", Value::String(name.into())),
            ("age", Value::Unsigned(age)),
        ])
    }

    fn encode(records: &[Record], format: FileFormat) -> Vec<u8> {
        let schema = schema();
        let mut out = Vec::new();
        for record in records {
            match format {
                FileFormat::Flat => encode_record_into(&mut out, &schema, record).unwrap(),
                FileFormat::Index => encode_index_entry_into(&mut out, &schema, record).unwrap(),
            }
        }
        out
    }

    fn people() -> Vec<Record> {
        vec![
            person(1, "Ann", 10),
            person(2, "Bo", 45),
            person(3, "Cy", 30),
            person(4, "Di", 99),
        ]
    }

    fn partition(
        length: u64,
        locations: &[&str],
        format: &str,
        filter: &str,
        projection: &str,
    ) -> PartitionDescriptor {
        let parts = vec![FilePartInfo {
            index: 1,
            path: "/data/people._1_of_1".into(),
            locations: locations.iter().map(|s| s.to_string()).collect(),
            offset: 0,
            length,
            format: Some(format.into()),
        }];
        let remapper = ClusterAddressRemapper::identity();
        let filter = FilterExpression::parse(filter).unwrap();
        let projection = ProjectionSpec::parse(projection);
        let token = AccessToken::new("token", 120);
        let ctx = PartitionContext {
            remapper: &remapper,
            filter: &filter,
            projection: &projection,
            token: &token,
            file_kind: None,
            max_parts: None,
        };
        create_partitions("people", &parts, None, &ctx)
            .unwrap()
            .remove(0)
    }

    #[test]
    fn test_reads_all_records_in_order() {
        run_async(async {
            let data = encode(&people(), FileFormat::Flat);
            let connector = MemoryConnector::new()
                .with_part("/data/people._1_of_1", data.clone())
                .with_chunk_size(5);
            let p = partition(data.len() as u64, &["n1:7100"], "flat", "", "");
            let mut reader = open_reader(p, schema(), connector).unwrap();

            assert_eq!(reader.state(), ReaderState::Unopened);
            let records = reader.read_all().await.unwrap();
            assert_eq!(records, people());
            assert_eq!(reader.state(), ReaderState::Exhausted);
            assert_eq!(reader.bytes_consumed(), data.len() as u64);
            assert_eq!(reader.status().await, ReaderStatus::Exhausted);
            assert!(matches!(
                reader.next_record().await,
                Err(ReadError::NoSuchElement { cause: None, .. })
            ));
        });
    }

    #[test]
    fn test_filter_and_projection() {
        run_async(async {
            let data = encode(&people(), FileFormat::Flat);
            let connector = MemoryConnector::new().with_part("/data/people._1_of_1", data.clone());
            let p = partition(data.len() as u64, &["n1:7100"], "flat", "age > 30", "name");
            let mut reader = open_reader(p, schema(), connector).unwrap();

            let mut names = Vec::new();
            while reader.has_next().await {
                let record = reader.next_record().await.unwrap();
                assert_eq!(record.len(), 1);
                names.push(record.get("name").and_then(Value::as_str).unwrap().to_string());
            }
            assert_eq!(names, vec!["Bo", "Di"]);
            assert_eq!(reader.records_read(), 2);
            assert_eq!(reader.records_filtered(), 2);
        });
    }

    #[test]
    fn test_index_format() {
        run_async(async {
            let data = encode(&people(), FileFormat::Index);
            let connector = MemoryConnector::new()
                .with_part("/data/people._1_of_1", data.clone())
                .with_chunk_size(3);
            let p = partition(data.len() as u64, &["n1:7100"], "key", "", "id");
            let mut reader = open_reader(p, schema(), connector).unwrap();
            let ids: Vec<i64> = reader
                .read_all()
                .await
                .unwrap()
                .iter()
                .filter_map(|r| r.get("id").and_then(Value::as_i64))
                .collect();
            assert_eq!(ids, vec![1, 2, 3, 4]);
        });
    }

    #[test]
    fn test_replica_fallback() {
        run_async(async {
            let data = encode(&people(), FileFormat::Flat);
            let connector = Arc::new(
                MemoryConnector::new()
                    .with_part("/data/people._1_of_1", data.clone())
                    .with_unreachable(NodeAddress::new("n1", 7100)),
            );
            let p = partition(data.len() as u64, &["n1:7100", "n2:7100"], "flat", "", "");
            let mut reader = BinaryRecordReader::new(p, schema(), connector.clone()).unwrap();
            assert!(reader.has_next().await);
            assert_eq!(reader.active_replica(), Some(&NodeAddress::new("n2", 7100)));
            assert_eq!(connector.opened_addresses(), vec![NodeAddress::new("n2", 7100)]);
        });
    }

    #[test]
    fn test_no_reachable_replica() {
        run_async(async {
            let connector = MemoryConnector::new()
                .with_part("/data/people._1_of_1", vec![0u8; 4])
                .with_unreachable(NodeAddress::new("n1", 7100));
            let p = partition(4, &["n1:7100"], "flat", "", "");
            let mut reader = open_reader(p, schema(), connector).unwrap();

            assert!(!reader.has_next().await);
            assert_eq!(reader.state(), ReaderState::Failed);
            let failure = reader.failure().unwrap();
            assert_eq!(failure.kind, ReadFailureKind::Connection);
            assert!(matches!(reader.status().await, ReaderStatus::Failed(_)));
            assert!(matches!(
                reader.next_record().await,
                Err(ReadError::NoSuchElement { cause: Some(_), .. })
            ));
        });
    }

    #[test]
    fn test_truncated_mid_record() {
        run_async(async {
            let data = encode(&people(), FileFormat::Flat);
            let connector = MemoryConnector::new()
                .with_part("/data/people._1_of_1", data.clone())
                .with_truncation("/data/people._1_of_1", data.len() - 2);
            let p = partition(data.len() as u64, &["n1:7100"], "flat", "", "");
            let mut reader = open_reader(p, schema(), connector).unwrap();

            for _ in 0..3 {
                reader.next_record().await.unwrap();
            }
            let err = reader.next_record().await.unwrap_err();
            assert!(err.is_fatal());
            assert!(matches!(err, ReadError::Truncated { .. }));
            assert_eq!(reader.failure().unwrap().records_read, 3);
            assert!(!reader.has_next().await);
        });
    }

    #[test]
    fn test_truncated_at_record_boundary() {
        run_async(async {
            let data = encode(&people(), FileFormat::Flat);
            let first = encode(&people()[..1], FileFormat::Flat).len();
            let connector = MemoryConnector::new()
                .with_part("/data/people._1_of_1", data.clone())
                .with_truncation("/data/people._1_of_1", first);
            let p = partition(data.len() as u64, &["n1:7100"], "flat", "", "");
            let mut reader = open_reader(p, schema(), connector).unwrap();

            assert!(reader.has_next().await);
            reader.next_record().await.unwrap();
            assert!(!reader.has_next().await);
            assert_eq!(reader.failure().unwrap().kind, ReadFailureKind::Truncated);
        });
    }

    #[test]
    fn test_oversized_stream_is_protocol_error() {
        run_async(async {
            let data = encode(&people(), FileFormat::Flat);
            let connector = MemoryConnector::new().with_part("/data/people._1_of_1", data.clone());
            let p = partition(data.len() as u64 - 1, &["n1:7100"], "flat", "", "");
            let mut reader = open_reader(p, schema(), connector).unwrap();
            let err = reader.read_all().await.unwrap_err();
            assert!(matches!(
                err,
                ReadError::Source {
                    source: SourceError::Protocol(_),
                    ..
                }
            ));
        });
    }

    #[test]
    fn test_decode_error_is_fatal() {
        run_async(async {
            // Second byte is not a valid boolean
            let bad_schema = Arc::new(
                parse_schema(r#"{"fields": [{"name": "flag", "type": "boolean"}]}"#).unwrap(),
            );
            let connector = MemoryConnector::new().with_part("/data/people._1_of_1", vec![1u8, 7]);
            let p = partition(2, &["n1:7100"], "flat", "", "");
            let mut reader = open_reader(p, bad_schema, connector).unwrap();
            assert_eq!(
                reader.next_record().await.unwrap().get("flag"),
                Some(&Value::Boolean(true))
            );
            let err = reader.next_record().await.unwrap_err();
            assert!(matches!(err, ReadError::Decode { record_index: 1, .. }));
            assert_eq!(reader.state(), ReaderState::Failed);
        });
    }

    #[test]
    fn test_remote_error_mid_stream() {
        run_async(async {
            let data = encode(&people(), FileFormat::Flat);
            let connector = MemoryConnector::new()
                .with_part("/data/people._1_of_1", data.clone())
                .with_error_at("/data/people._1_of_1", 0, "token expired");
            let p = partition(data.len() as u64, &["n1:7100"], "flat", "", "");
            let mut reader = open_reader(p, schema(), connector).unwrap();
            assert!(matches!(reader.status().await, ReaderStatus::Failed(ref f) if f.kind == ReadFailureKind::Connection));
        });
    }

    #[test]
    fn test_empty_partition() {
        run_async(async {
            let connector = MemoryConnector::new().with_part("/data/people._1_of_1", Vec::new());
            let p = partition(0, &["n1:7100"], "flat", "", "");
            let mut reader = open_reader(p, schema(), connector).unwrap();
            assert!(!reader.has_next().await);
            assert_eq!(reader.state(), ReaderState::Exhausted);
        });
    }

    #[test]
    fn test_close_releases_reader() {
        run_async(async {
            let data = encode(&people(), FileFormat::Flat);
            let connector = MemoryConnector::new().with_part("/data/people._1_of_1", data.clone());
            let p = partition(data.len() as u64, &["n1:7100"], "flat", "", "");
            let mut reader = open_reader(p, schema(), connector).unwrap();
            assert!(reader.has_next().await);
            reader.close();
            assert_eq!(reader.state(), ReaderState::Exhausted);
            assert!(!reader.has_next().await);
        });
    }

    #[test]
    fn test_unknown_projection_rejected() {
        let connector = MemoryConnector::new();
        let p = partition(0, &["n1:7100"], "flat", "", "missing");
        assert!(matches!(
            open_reader(p, schema(), connector),
            Err(Error::Schema(_))
        ));
    }
}
