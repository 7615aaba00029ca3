//! In-memory partition transport.
//!
//! Serves file parts from memory, with fault injection for exercising the
//! reader's failure handling:
//!
//!   let connector = MemoryConnector::new()
//!       .with_part("/data/part1", bytes)
//!       .with_truncation("/data/part1", 100)
//!       .with_unreachable(NodeAddress::new("n1", 7100));

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::sleep;

use super::protocol::ReadRequest;
use super::traits::{BoxedPartitionStream, PartitionConnector, PartitionStream};
use crate::error::SourceError;
use crate::remap::NodeAddress;

/// Default chunk size handed to readers.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Fault applied to every stream of one file part.
#[derive(Debug, Clone)]
enum Fault {
    /// End the stream after this many bytes
    Truncate(usize),
    /// Fail the stream after this many bytes
    ErrorAt(usize, String),
}

/// Partition connector backed by in-memory file parts.
///
/// Each file part is served whole, whatever span the request names.
#[derive(Debug, Default)]
pub struct MemoryConnector {
    parts: HashMap<String, Bytes>,
    faults: HashMap<String, Fault>,
    unreachable: HashSet<NodeAddress>,
    required_token: Option<String>,
    chunk_size: Option<usize>,
    latency: Option<Duration>,
    open_count: AtomicUsize,
    opened: Mutex<Vec<NodeAddress>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `data` for requests naming `path`.
    pub fn with_part(mut self, path: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.parts.insert(path.into(), data.into());
        self
    }

    /// Split streams into chunks of at most `chunk_size` bytes.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size.max(1));
        self
    }

    /// End streams of `path` cleanly after `at` bytes.
    pub fn with_truncation(mut self, path: impl Into<String>, at: usize) -> Self {
        self.faults.insert(path.into(), Fault::Truncate(at));
        self
    }

    /// Fail streams of `path` with a remote error after `at` bytes.
    pub fn with_error_at(
        mut self,
        path: impl Into<String>,
        at: usize,
        message: impl Into<String>,
    ) -> Self {
        self.faults
            .insert(path.into(), Fault::ErrorAt(at, message.into()));
        self
    }

    /// Refuse connections to `address`.
    pub fn with_unreachable(mut self, address: NodeAddress) -> Self {
        self.unreachable.insert(address);
        self
    }

    /// Reject requests whose token differs from `token`.
    pub fn with_required_token(mut self, token: impl Into<String>) -> Self {
        self.required_token = Some(token.into());
        self
    }

    /// Delay every chunk by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of successful opens.
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    /// Addresses of successful opens, oldest first.
    pub fn opened_addresses(&self) -> Vec<NodeAddress> {
        self.opened.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PartitionConnector for MemoryConnector {
    async fn open(
        &self,
        address: &NodeAddress,
        request: &ReadRequest,
    ) -> Result<BoxedPartitionStream, SourceError> {
        if self.unreachable.contains(address) {
            return Err(SourceError::Connect {
                address: address.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "connection refused",
                ),
            });
        }
        if let Some(required) = &self.required_token {
            if *required != request.token {
                return Err(SourceError::Remote("access token rejected".to_string()));
            }
        }
        let data = self
            .parts
            .get(&request.path)
            .cloned()
            .ok_or_else(|| SourceError::Remote(format!("no such file part: {}", request.path)))?;

        self.open_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut opened) = self.opened.lock() {
            opened.push(address.clone());
        }

        let (limit, error) = match self.faults.get(&request.path) {
            Some(Fault::Truncate(at)) => ((*at).min(data.len()), None),
            Some(Fault::ErrorAt(at, message)) => ((*at).min(data.len()), Some(message.clone())),
            None => (data.len(), None),
        };

        Ok(Box::new(MemoryStream {
            data: data.slice(..limit),
            pos: 0,
            chunk_size: self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            error,
            latency: self.latency,
        }))
    }
}

struct MemoryStream {
    data: Bytes,
    pos: usize,
    chunk_size: usize,
    error: Option<String>,
    latency: Option<Duration>,
}

#[async_trait]
impl PartitionStream for MemoryStream {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, SourceError> {
        if let Some(latency) = self.latency {
            sleep(latency).await;
        }
        if self.pos >= self.data.len() {
            return match self.error.take() {
                Some(message) => Err(SourceError::Remote(message)),
                None => Ok(None),
            };
        }
        let end = (self.pos + self.chunk_size).min(self.data.len());
        let chunk = self.data.slice(self.pos..end);
        self.pos = end;
        Ok(Some(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::FileFormat;

    fn request(path: &str) -> ReadRequest {
        ReadRequest {
            token: "t".into(),
            path: path.into(),
            offset: 0,
            length: 10,
            format: FileFormat::Flat,
        }
    }

    async fn drain(mut stream: BoxedPartitionStream) -> (Vec<u8>, Option<SourceError>) {
        let mut out = Vec::new();
        loop {
            match stream.next_chunk().await {
                Ok(Some(chunk)) => out.extend_from_slice(&chunk),
                Ok(None) => return (out, None),
                Err(e) => return (out, Some(e)),
            }
        }
    }

    #[tokio::test]
    async fn test_chunked_read() {
        let connector = MemoryConnector::new()
            .with_part("p", &b"0123456789"[..])
            .with_chunk_size(4);
        let stream = connector.open(&NodeAddress::new("n", 1), &request("p")).await.unwrap();
        let (data, err) = drain(stream).await;
        assert_eq!(data, b"0123456789");
        assert!(err.is_none());
        assert_eq!(connector.open_count(), 1);
    }

    #[tokio::test]
    async fn test_faults() {
        let connector = MemoryConnector::new()
            .with_part("a", &b"0123456789"[..])
            .with_part("b", &b"0123456789"[..])
            .with_truncation("a", 3)
            .with_error_at("b", 5, "disk failure");
        let node = NodeAddress::new("n", 1);

        let (data, err) = drain(connector.open(&node, &request("a")).await.unwrap()).await;
        assert_eq!(data, b"012");
        assert!(err.is_none());

        let (data, err) = drain(connector.open(&node, &request("b")).await.unwrap()).await;
        assert_eq!(data, b"01234");
        assert!(matches!(err, Some(SourceError::Remote(ref m)) if m == "disk failure"));
    }

    #[tokio::test]
    async fn test_open_errors() {
        let down = NodeAddress::new("down", 1);
        let connector = MemoryConnector::new()
            .with_part("p", &b"x"[..])
            .with_unreachable(down.clone())
            .with_required_token("good");

        assert!(matches!(
            connector.open(&down, &request("p")).await,
            Err(SourceError::Connect { .. })
        ));
        assert!(matches!(
            connector.open(&NodeAddress::new("up", 1), &request("p")).await,
            Err(SourceError::Remote(_))
        ));
        assert_eq!(connector.open_count(), 0);
    }
}
