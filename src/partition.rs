//! Partition descriptors and their construction from metadata.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ResolutionError;
use crate::filter::FilterExpression;
use crate::metadata::FilePartInfo;
use crate::remap::{ClusterAddressRemapper, NodeAddress};
use crate::schema::ProjectionSpec;
use crate::source::ReadRequest;

/// Default lifetime requested for access tokens.
pub const DEFAULT_EXPIRY_SECONDS: u32 = 120;

/// On-disk layout of a partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// Records stored back to back
    #[default]
    Flat,
    /// Length-prefixed index entries
    Index,
}

impl FileFormat {
    /// Interpret a format tag reported by the metadata service.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "" | "flat" | "thor" | "data" => Some(FileFormat::Flat),
            "index" | "key" => Some(FileFormat::Index),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Flat => "flat",
            FileFormat::Index => "index",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time-limited credential for reading partition bytes.
///
/// Tokens are never renewed; a token that expires mid-read surfaces as a
/// read failure.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    blob: Arc<str>,
    expiry_seconds: u32,
    acquired_at: Instant,
}

impl AccessToken {
    /// Wrap a freshly issued token.
    pub fn new(blob: impl Into<Arc<str>>, expiry_seconds: u32) -> Self {
        Self {
            blob: blob.into(),
            expiry_seconds,
            acquired_at: Instant::now(),
        }
    }

    /// The opaque token text.
    pub fn blob(&self) -> &str {
        &self.blob
    }

    pub fn expiry_seconds(&self) -> u32 {
        self.expiry_seconds
    }

    pub fn acquired_at(&self) -> Instant {
        self.acquired_at
    }

    /// Instant after which the service rejects the token.
    pub fn expires_at(&self) -> Instant {
        self.acquired_at + Duration::from_secs(u64::from(self.expiry_seconds))
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("blob", &"<redacted>")
            .field("expiry_seconds", &self.expiry_seconds)
            .field("acquired_at", &self.acquired_at)
            .finish()
    }
}

/// Immutable description of one partition of a logical file.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionDescriptor {
    index: usize,
    path: String,
    replicas: Vec<NodeAddress>,
    offset: u64,
    length: u64,
    format: FileFormat,
    token: AccessToken,
    filter: FilterExpression,
    projection: ProjectionSpec,
}

impl PartitionDescriptor {
    /// Position of the partition in the file, starting at 0.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Path of the file part on the replica nodes.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Replica addresses after remapping, primary first. Never empty.
    pub fn replicas(&self) -> &[NodeAddress] {
        &self.replicas
    }

    pub fn primary_replica(&self) -> &NodeAddress {
        &self.replicas[0]
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    pub fn filter(&self) -> &FilterExpression {
        &self.filter
    }

    pub fn projection(&self) -> &ProjectionSpec {
        &self.projection
    }

    /// The read request sent to a replica for this partition.
    pub fn read_request(&self) -> ReadRequest {
        ReadRequest {
            token: self.token.blob().to_string(),
            path: self.path.clone(),
            offset: self.offset,
            length: self.length,
            format: self.format,
        }
    }
}

impl fmt::Display for PartitionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "partition {} ({} @ {}+{}, {} replicas)",
            self.index,
            self.path,
            self.offset,
            self.length,
            self.replicas.len()
        )
    }
}

/// Per-file settings attached to every descriptor.
#[derive(Debug, Clone)]
pub struct PartitionContext<'a> {
    pub remapper: &'a ClusterAddressRemapper,
    pub filter: &'a FilterExpression,
    pub projection: &'a ProjectionSpec,
    pub token: &'a AccessToken,
    /// Default format tag for partitions that carry none
    pub file_kind: Option<&'a str>,
    /// Keep at most this many leading partitions
    pub max_parts: Option<usize>,
}

/// Parse the replica list of a reported partition.
pub(crate) fn parse_locations(
    file: &str,
    part: &FilePartInfo,
) -> Result<Vec<NodeAddress>, ResolutionError> {
    part.locations
        .iter()
        .map(|loc| {
            loc.parse::<NodeAddress>()
                .map_err(|e| ResolutionError::InvalidLayout {
                    file: file.to_string(),
                    message: format!("partition {}: {}", part.index, e),
                })
        })
        .collect()
}

/// Check that spans start at 0, are contiguous, and cover `file_size`.
fn validate_spans(
    file: &str,
    parts: &[FilePartInfo],
    file_size: Option<u64>,
) -> Result<(), ResolutionError> {
    let invalid = |message: String| ResolutionError::InvalidLayout {
        file: file.to_string(),
        message,
    };
    let mut expected = 0u64;
    for part in parts {
        if part.offset != expected {
            return Err(invalid(format!(
                "partition {} starts at {} but the previous span ends at {}",
                part.index, part.offset, expected
            )));
        }
        expected = expected
            .checked_add(part.length)
            .ok_or_else(|| invalid(format!("partition {} span overflows", part.index)))?;
    }
    if let Some(size) = file_size {
        if expected != size {
            return Err(invalid(format!(
                "spans cover {} bytes but the file has {}",
                expected, size
            )));
        }
    }
    Ok(())
}

/// Build descriptors for the reported partitions, in metadata order.
///
/// The full layout is validated before `max_parts` drops trailing partitions.
/// A cap of zero keeps every partition.
pub fn create_partitions(
    file: &str,
    parts: &[FilePartInfo],
    file_size: Option<u64>,
    ctx: &PartitionContext<'_>,
) -> Result<Vec<PartitionDescriptor>, ResolutionError> {
    if parts.is_empty() {
        return Err(ResolutionError::NoPartitions {
            file: file.to_string(),
        });
    }
    validate_spans(file, parts, file_size)?;

    let keep = match ctx.max_parts {
        Some(max) if max > 0 && max < parts.len() => {
            warn!(
                file = %file,
                available = parts.len(),
                max_parts = max,
                "Partition count exceeds max_parts, dropping trailing partitions"
            );
            max
        }
        _ => parts.len(),
    };

    let mut descriptors = Vec::with_capacity(keep);
    for (index, part) in parts.iter().take(keep).enumerate() {
        let replicas = ctx.remapper.apply_all(&parse_locations(file, part)?);
        if replicas.is_empty() {
            return Err(ResolutionError::InvalidLayout {
                file: file.to_string(),
                message: format!("partition {} has no replica", part.index),
            });
        }
        let tag = part.format.as_deref().or(ctx.file_kind).unwrap_or("");
        let format = FileFormat::from_tag(tag).ok_or_else(|| ResolutionError::UnsupportedFormat {
            partition: index,
            format: tag.to_string(),
        })?;

        debug!(
            file = %file,
            partition = index,
            path = %part.path,
            offset = part.offset,
            length = part.length,
            primary = %replicas[0],
            "Created partition descriptor"
        );

        descriptors.push(PartitionDescriptor {
            index,
            path: part.path.clone(),
            replicas,
            offset: part.offset,
            length: part.length,
            format,
            token: ctx.token.clone(),
            filter: ctx.filter.clone(),
            projection: ctx.projection.clone(),
        });
    }
    Ok(descriptors)
}
