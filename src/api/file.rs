//! Logical files and their resolved partition layout.

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Builder;
use tokio::sync::OnceCell;
use tracing::info;

use super::options::{ConnectionInfo, FileReadOptions};
use crate::error::Error;
use crate::filter::FilterExpression;
use crate::metadata::{
    AccessIntent, FileMetadataResolver, HttpMetadataService, SharedMetadataService,
};
use crate::partition::{
    create_partitions, parse_locations, AccessToken, PartitionContext, PartitionDescriptor,
};
use crate::reader::{BinaryRecordReader, RecordReadIterator};
use crate::remap::ClusterAddressRemapper;
use crate::schema::{parse_schema_value, project, RecordSchema};
use crate::source::SharedConnector;

// ============================================================================
// ResolvedFile
// ============================================================================

/// Partition layout, schema and token of a logical file, as resolved once.
pub struct ResolvedFile {
    name: String,
    schema: Arc<RecordSchema>,
    projected_schema: Arc<RecordSchema>,
    partitions: Vec<PartitionDescriptor>,
    total_partitions: usize,
    token: AccessToken,
    file_size: Option<u64>,
    request_id: String,
    connector: SharedConnector,
}

impl ResolvedFile {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Partitions in metadata order.
    pub fn partitions(&self) -> &[PartitionDescriptor] {
        &self.partitions
    }

    /// Full record layout of the file.
    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.schema
    }

    /// Layout of the records readers yield.
    pub fn projected_schema(&self) -> &Arc<RecordSchema> {
        &self.projected_schema
    }

    /// Number of partitions the service reported, before any cap.
    pub fn total_partitions(&self) -> usize {
        self.total_partitions
    }

    /// Whether `max_parts` dropped trailing partitions.
    pub fn is_truncated(&self) -> bool {
        self.partitions.len() < self.total_partitions
    }

    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    pub fn file_size(&self) -> Option<u64> {
        self.file_size
    }

    /// Id of the metadata request this layout came from.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    fn partition(&self, index: usize) -> Result<&PartitionDescriptor, Error> {
        self.partitions.get(index).ok_or_else(|| {
            Error::Configuration(format!(
                "partition {} out of range, file '{}' has {}",
                index,
                self.name,
                self.partitions.len()
            ))
        })
    }

    /// Prepare an async reader for the partition at `index`.
    ///
    /// The reader connects on its first pull.
    pub fn open_reader(&self, index: usize) -> Result<BinaryRecordReader, Error> {
        let partition = self.partition(index)?.clone();
        BinaryRecordReader::new(partition, Arc::clone(&self.schema), Arc::clone(&self.connector))
    }

    /// Prepare a blocking iterator for the partition at `index`.
    ///
    /// Must be called outside of any tokio runtime.
    pub fn open_iterator(&self, index: usize) -> Result<RecordReadIterator, Error> {
        let partition = self.partition(index)?.clone();
        RecordReadIterator::new(partition, Arc::clone(&self.schema), Arc::clone(&self.connector))
    }
}

impl fmt::Debug for ResolvedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedFile")
            .field("name", &self.name)
            .field("partitions", &self.partitions.len())
            .field("total_partitions", &self.total_partitions)
            .field("file_size", &self.file_size)
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// LogicalFile
// ============================================================================

/// A named file hosted on the cluster.
///
/// The metadata service is contacted once, on the first call that needs the
/// layout; the result is cached for the lifetime of the value. Concurrent
/// first calls share a single resolution.
///
/// # Example
/// ```no_run
/// use clusterfile::api::{ConnectionInfo, FileReadOptions, LogicalFile};
///
/// # async fn example() -> Result<(), clusterfile::Error> {
/// let connection = ConnectionInfo::from_connection_string("esp.example", None, None)?;
/// let file = LogicalFile::connect(
///     "scope::people",
///     &connection,
///     FileReadOptions::new().with_filter("age > 30"),
/// )?;
/// let resolved = file.resolve().await?;
/// let mut reader = resolved.open_reader(0)?;
/// while reader.has_next().await {
///     let record = reader.next_record().await?;
///     println!("{:?}", record);
/// }
/// # Ok(())
/// # }
/// ```
pub struct LogicalFile {
    name: String,
    options: FileReadOptions,
    resolver: FileMetadataResolver,
    connector: SharedConnector,
    resolved: OnceCell<Arc<ResolvedFile>>,
}

impl LogicalFile {
    pub fn new(
        name: impl Into<String>,
        options: FileReadOptions,
        service: SharedMetadataService,
        connector: SharedConnector,
    ) -> Self {
        Self {
            name: name.into(),
            options,
            resolver: FileMetadataResolver::new(service),
            connector,
            resolved: OnceCell::new(),
        }
    }

    /// A file reached through the HTTP metadata service and TCP data servers.
    pub fn connect(
        name: impl Into<String>,
        connection: &ConnectionInfo,
        options: FileReadOptions,
    ) -> Result<Self, Error> {
        let service = HttpMetadataService::new(connection.clone())?;
        let connector = options.tcp_connector();
        Ok(Self::new(name, options, Arc::new(service), Arc::new(connector)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &FileReadOptions {
        &self.options
    }

    /// Whether the layout has been resolved and cached.
    pub fn is_resolved(&self) -> bool {
        self.resolved.initialized()
    }

    /// The cached layout, resolving it on first use.
    pub async fn resolve(&self) -> Result<Arc<ResolvedFile>, Error> {
        self.resolved
            .get_or_try_init(|| async { self.resolve_uncached().await.map(Arc::new) })
            .await
            .cloned()
    }

    /// Partitions in metadata order.
    pub async fn partitions(&self) -> Result<Vec<PartitionDescriptor>, Error> {
        Ok(self.resolve().await?.partitions().to_vec())
    }

    /// Full record layout of the file.
    pub async fn schema(&self) -> Result<Arc<RecordSchema>, Error> {
        Ok(Arc::clone(self.resolve().await?.schema()))
    }

    /// Layout of the records readers yield.
    pub async fn projected_schema(&self) -> Result<Arc<RecordSchema>, Error> {
        Ok(Arc::clone(self.resolve().await?.projected_schema()))
    }

    /// Drop the cached layout; the next call resolves again.
    pub fn reset(&mut self) {
        self.resolved.take();
    }

    /// Resolve again, bypassing and leaving the cache untouched.
    pub async fn reresolve(&self) -> Result<Arc<ResolvedFile>, Error> {
        self.resolve_uncached().await.map(Arc::new)
    }

    /// Blocking variant of [`LogicalFile::resolve`].
    ///
    /// Must be called outside of any tokio runtime.
    pub fn resolve_blocking(&self) -> Result<Arc<ResolvedFile>, Error> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Configuration(format!("cannot start runtime: {}", e)))?;
        runtime.block_on(self.resolve())
    }

    async fn resolve_uncached(&self) -> Result<ResolvedFile, Error> {
        let options = &self.options;
        let filter = FilterExpression::parse(&options.filter)?;

        let metadata = self
            .resolver
            .resolve(
                &self.name,
                AccessIntent::Read,
                options.expiry_seconds,
                options.cluster.as_deref(),
            )
            .await?;

        let schema = parse_schema_value(&metadata.raw_schema)?;
        filter.validate(&schema)?;
        let projected_schema = project(&schema, &options.projection)?;

        let mut nodes = Vec::new();
        for part in &metadata.partitions {
            nodes.extend(parse_locations(&self.name, part)?);
        }
        let remapper = ClusterAddressRemapper::build(&options.remap, &nodes)?;

        let ctx = PartitionContext {
            remapper: &remapper,
            filter: &filter,
            projection: &options.projection,
            token: &metadata.token,
            file_kind: metadata.file_kind.as_deref(),
            max_parts: options.max_parts,
        };
        let partitions = create_partitions(
            &self.name,
            &metadata.partitions,
            metadata.file_size,
            &ctx,
        )?;

        info!(
            file = %self.name,
            partitions = partitions.len(),
            total_partitions = metadata.partitions.len(),
            fields = projected_schema.fields.len(),
            remapped = !remapper.is_identity(),
            "Logical file ready"
        );

        Ok(ResolvedFile {
            name: self.name.clone(),
            schema: Arc::new(schema),
            projected_schema: Arc::new(projected_schema),
            total_partitions: metadata.partitions.len(),
            partitions,
            token: metadata.token,
            file_size: metadata.file_size,
            request_id: metadata.request_id,
            connector: Arc::clone(&self.connector),
        })
    }
}

impl fmt::Debug for LogicalFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicalFile")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("resolved", &self.is_resolved())
            .finish_non_exhaustive()
    }
}
