//! Resolution of logical file names through the metadata service.

use tracing::{debug, info};
use uuid::Uuid;

use super::service::{
    AccessIntent, FileAccessRequest, FileAccessResponse, FilePartInfo, SharedMetadataService,
};
use crate::error::{ResolutionError, ServiceError};
use crate::partition::AccessToken;

/// Prefix of every request id sent to the service.
pub const REQUEST_ID_PREFIX: &str = "clusterfile";

/// Everything the service reported about a logical file.
#[derive(Debug, Clone)]
pub struct ResolvedMetadata {
    /// Partitions in metadata order
    pub partitions: Vec<FilePartInfo>,
    pub token: AccessToken,
    /// Record layout description, unparsed
    pub raw_schema: serde_json::Value,
    pub file_size: Option<u64>,
    pub file_kind: Option<String>,
    /// Id of the request that produced this result
    pub request_id: String,
}

/// Resolves logical files into partitions, tokens and layouts.
#[derive(Clone)]
pub struct FileMetadataResolver {
    service: SharedMetadataService,
}

impl FileMetadataResolver {
    pub fn new(service: SharedMetadataService) -> Self {
        Self { service }
    }

    /// A fresh, unique request id.
    pub fn new_request_id() -> String {
        format!("{}: {}", REQUEST_ID_PREFIX, Uuid::new_v4())
    }

    /// Resolve `file_name` into its partition list, an access token and the
    /// raw layout description. No partial result is ever returned.
    ///
    /// # Errors
    /// - `InvalidExpiry` if `expiry_seconds` is 0; the service is not called
    /// - `AccessAcquisitionFailed` on any service failure or missing token
    /// - `SchemaUnavailable` if no layout description is returned
    /// - `NoPartitions` if the file has zero partitions
    /// - `InvalidLayout` if the partition count disagrees with the list
    pub async fn resolve(
        &self,
        file_name: &str,
        intent: AccessIntent,
        expiry_seconds: u32,
        cluster: Option<&str>,
    ) -> Result<ResolvedMetadata, ResolutionError> {
        let (response, token, request_id) = self
            .call(file_name, intent, expiry_seconds, cluster)
            .await?;

        let raw_schema = match response.record_type_info {
            Some(serde_json::Value::Null) | None => {
                return Err(ResolutionError::SchemaUnavailable {
                    file: file_name.to_string(),
                })
            }
            Some(serde_json::Value::String(s)) if s.trim().is_empty() => {
                return Err(ResolutionError::SchemaUnavailable {
                    file: file_name.to_string(),
                })
            }
            Some(value) => value,
        };

        if response.partitions.is_empty() {
            return Err(ResolutionError::NoPartitions {
                file: file_name.to_string(),
            });
        }
        if let Some(count) = response.partition_count {
            if count as usize != response.partitions.len() {
                return Err(ResolutionError::InvalidLayout {
                    file: file_name.to_string(),
                    message: format!(
                        "service reports {} partitions but lists {}",
                        count,
                        response.partitions.len()
                    ),
                });
            }
        }

        info!(
            file = %file_name,
            request_id = %request_id,
            partitions = response.partitions.len(),
            file_size = ?response.file_size,
            "Resolved logical file"
        );

        Ok(ResolvedMetadata {
            partitions: response.partitions,
            token,
            raw_schema,
            file_size: response.file_size,
            file_kind: response.file_kind,
            request_id,
        })
    }

    /// Obtain only an access token for `file_name`.
    pub async fn acquire_access(
        &self,
        file_name: &str,
        intent: AccessIntent,
        expiry_seconds: u32,
        cluster: Option<&str>,
    ) -> Result<AccessToken, ResolutionError> {
        let (_, token, _) = self
            .call(file_name, intent, expiry_seconds, cluster)
            .await?;
        Ok(token)
    }

    async fn call(
        &self,
        file_name: &str,
        intent: AccessIntent,
        expiry_seconds: u32,
        cluster: Option<&str>,
    ) -> Result<(FileAccessResponse, AccessToken, String), ResolutionError> {
        if expiry_seconds == 0 {
            return Err(ResolutionError::InvalidExpiry {
                file: file_name.to_string(),
                seconds: expiry_seconds,
            });
        }

        let request_id = Self::new_request_id();
        let request = FileAccessRequest::new(file_name, intent, expiry_seconds, &request_id)
            .with_cluster(cluster.map(str::to_string));
        debug!(file = %file_name, request_id = %request_id, "Acquiring file access");

        let failed = |source: ServiceError| ResolutionError::AccessAcquisitionFailed {
            file: file_name.to_string(),
            source,
        };

        let mut response = self.service.file_access(&request).await.map_err(failed)?;

        let blob = match response.access_token.take() {
            Some(blob) if !blob.is_empty() => blob,
            _ => {
                return Err(failed(ServiceError::InvalidResponse(
                    "response carries no access token".to_string(),
                )))
            }
        };
        let token = AccessToken::new(blob, expiry_seconds);
        Ok((response, token, request_id))
    }
}

impl std::fmt::Debug for FileMetadataResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileMetadataResolver").finish_non_exhaustive()
    }
}
