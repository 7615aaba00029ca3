//! Metadata/access service interface and wire models.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Access requested for a logical file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessIntent {
    Read,
    Write,
}

impl std::fmt::Display for AccessIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessIntent::Read => f.write_str("read"),
            AccessIntent::Write => f.write_str("write"),
        }
    }
}

/// Request body for a file access call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAccessRequest {
    pub file_name: String,
    pub access_type: AccessIntent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    pub expiry_seconds: u32,
    pub request_id: String,
    pub include_json_type_info: bool,
    pub allow_index: bool,
    pub allow_foreign: bool,
}

impl FileAccessRequest {
    pub fn new(
        file_name: impl Into<String>,
        access_type: AccessIntent,
        expiry_seconds: u32,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            access_type,
            cluster: None,
            expiry_seconds,
            request_id: request_id.into(),
            include_json_type_info: true,
            allow_index: true,
            allow_foreign: false,
        }
    }

    pub fn with_cluster(mut self, cluster: Option<String>) -> Self {
        self.cluster = cluster;
        self
    }
}

/// One partition as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePartInfo {
    pub index: u32,
    pub path: String,
    /// Replica addresses as `host:port`, primary first
    pub locations: Vec<String>,
    pub offset: u64,
    pub length: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// Response body of a file access call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileAccessResponse {
    #[serde(default)]
    pub partitions: Vec<FilePartInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// JSON record layout, as an object or as embedded JSON text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_type_info: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    /// Default format tag for partitions that carry none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_kind: Option<String>,
}

/// Remote service that resolves logical files and issues access tokens.
#[async_trait]
pub trait MetadataService: Send + Sync {
    /// Issue one file access call.
    async fn file_access(
        &self,
        request: &FileAccessRequest,
    ) -> Result<FileAccessResponse, ServiceError>;
}

/// A shared MetadataService for dynamic dispatch
pub type SharedMetadataService = Arc<dyn MetadataService>;

#[async_trait]
impl<T: MetadataService + ?Sized> MetadataService for Arc<T> {
    async fn file_access(
        &self,
        request: &FileAccessRequest,
    ) -> Result<FileAccessResponse, ServiceError> {
        (**self).file_access(request).await
    }
}

/// Service that answers every call with a fixed response.
///
/// Records the requests it receives. Useful for embedding a known layout and
/// for tests.
#[derive(Debug)]
pub struct StaticMetadataService {
    response: FileAccessResponse,
    calls: AtomicUsize,
    requests: Mutex<Vec<FileAccessRequest>>,
}

impl StaticMetadataService {
    pub fn new(response: FileAccessResponse) -> Self {
        Self {
            response,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of calls received.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<FileAccessRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MetadataService for StaticMetadataService {
    async fn file_access(
        &self,
        request: &FileAccessRequest,
    ) -> Result<FileAccessResponse, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        Ok(self.response.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = FileAccessRequest::new("scope::people", AccessIntent::Read, 120, "id-1");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["access_type"], "read");
        assert_eq!(json["include_json_type_info"], true);
        assert_eq!(json["allow_foreign"], false);
        assert!(json.get("cluster").is_none());

        let json = serde_json::to_value(request.with_cluster(Some("thor".into()))).unwrap();
        assert_eq!(json["cluster"], "thor");
    }

    #[test]
    fn test_response_defaults() {
        let response: FileAccessResponse = serde_json::from_str(
            r#"{"partitions": [{"index": 1, "path": "/d/p1", "locations": ["n1:7100"],
                "offset": 0, "length": 10}], "access_token": "t"}"#,
        )
        .unwrap();
        assert_eq!(response.partitions.len(), 1);
        assert_eq!(response.partitions[0].format, None);
        assert!(response.record_type_info.is_none());
        assert!(response.file_size.is_none());
    }
}
