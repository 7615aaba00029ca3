//! TCP transport for partition data servers.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::protocol::{read_frame, write_request, Frame, ReadRequest, DEFAULT_MAX_FRAME_SIZE};
use super::traits::{BoxedPartitionStream, PartitionConnector, PartitionStream};
use crate::error::SourceError;
use crate::remap::NodeAddress;

/// Default time allowed to establish a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time allowed between frames.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Connects to partition data servers over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
    read_timeout: Duration,
    max_frame_size: usize,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl TcpConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }
}

#[async_trait]
impl PartitionConnector for TcpConnector {
    async fn open(
        &self,
        address: &NodeAddress,
        request: &ReadRequest,
    ) -> Result<BoxedPartitionStream, SourceError> {
        let target = (address.host.as_str(), address.port);
        let stream = match timeout(self.connect_timeout, TcpStream::connect(target)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(SourceError::Connect {
                    address: address.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(SourceError::Timeout(format!(
                    "connecting to {} after {:?}",
                    address, self.connect_timeout
                )))
            }
        };
        stream.set_nodelay(true)?;

        let mut reader = BufReader::new(stream);
        write_request(reader.get_mut(), request).await?;
        debug!(
            address = %address,
            path = %request.path,
            offset = request.offset,
            length = request.length,
            "Sent partition read request"
        );

        Ok(Box::new(TcpPartitionStream {
            reader,
            address: address.clone(),
            read_timeout: self.read_timeout,
            max_frame_size: self.max_frame_size,
            finished: false,
        }))
    }
}

/// Frame reader over an open connection. The stream ends only at an end
/// frame; a peer that hangs up first is a protocol error.
struct TcpPartitionStream {
    reader: BufReader<TcpStream>,
    address: NodeAddress,
    read_timeout: Duration,
    max_frame_size: usize,
    finished: bool,
}

#[async_trait]
impl PartitionStream for TcpPartitionStream {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, SourceError> {
        while !self.finished {
            let frame = timeout(
                self.read_timeout,
                read_frame(&mut self.reader, self.max_frame_size),
            )
            .await
            .map_err(|_| {
                SourceError::Timeout(format!(
                    "reading from {} after {:?}",
                    self.address, self.read_timeout
                ))
            })??;

            match frame {
                Some(Frame::Data(chunk)) if chunk.is_empty() => continue,
                Some(Frame::Data(chunk)) => return Ok(Some(chunk)),
                Some(Frame::Error(message)) => {
                    self.finished = true;
                    return Err(SourceError::Remote(message));
                }
                Some(Frame::End) => self.finished = true,
                None => {
                    self.finished = true;
                    return Err(SourceError::Protocol(format!(
                        "{} closed the connection before the end frame",
                        self.address
                    )));
                }
            }
        }
        Ok(None)
    }
}
