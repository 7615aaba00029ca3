//! Wire protocol spoken with partition data servers.
//!
//! The client sends one request frame, a u32 big-endian length followed by
//! the JSON-encoded [`ReadRequest`]. The server answers with a sequence of
//! frames, each a kind byte and a u32 big-endian payload length:
//!
//! | kind   | payload                  |
//! |--------|--------------------------|
//! | `0x01` | data chunk               |
//! | `0x02` | end of stream (empty)    |
//! | `0x7F` | error message (UTF-8)    |

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::SourceError;
use crate::partition::FileFormat;

/// Data chunk frame
pub const FRAME_DATA: u8 = 0x01;
/// End-of-stream frame
pub const FRAME_END: u8 = 0x02;
/// Error frame
pub const FRAME_ERROR: u8 = 0x7F;

/// Largest frame accepted unless configured otherwise (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Request for the byte span of one partition.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRequest {
    pub token: String,
    pub path: String,
    pub offset: u64,
    pub length: u64,
    pub format: FileFormat,
}

impl std::fmt::Debug for ReadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadRequest")
            .field("token", &"<redacted>")
            .field("path", &self.path)
            .field("offset", &self.offset)
            .field("length", &self.length)
            .field("format", &self.format)
            .finish()
    }
}

/// A response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(Bytes),
    End,
    Error(String),
}

fn check_len(len: usize, max_frame_size: usize) -> Result<(), SourceError> {
    if len > max_frame_size {
        return Err(SourceError::Protocol(format!(
            "frame of {} bytes exceeds limit of {} bytes",
            len, max_frame_size
        )));
    }
    Ok(())
}

fn frame_len(len: usize) -> Result<u32, SourceError> {
    u32::try_from(len)
        .map_err(|_| SourceError::Protocol(format!("frame of {} bytes is too large", len)))
}

/// Send a read request.
pub async fn write_request<W>(writer: &mut W, request: &ReadRequest) -> Result<(), SourceError>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(request)
        .map_err(|e| SourceError::Protocol(format!("failed to encode request: {}", e)))?;
    writer.write_u32(frame_len(body.len())?).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Receive a read request (server side).
pub async fn read_request<R>(reader: &mut R, max_frame_size: usize) -> Result<ReadRequest, SourceError>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32().await? as usize;
    check_len(len, max_frame_size)?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    serde_json::from_slice(&body)
        .map_err(|e| SourceError::Protocol(format!("malformed request: {}", e)))
}

/// Send one response frame.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), SourceError>
where
    W: AsyncWrite + Unpin,
{
    let (kind, payload): (u8, &[u8]) = match frame {
        Frame::Data(bytes) => (FRAME_DATA, bytes),
        Frame::End => (FRAME_END, &[]),
        Frame::Error(message) => (FRAME_ERROR, message.as_bytes()),
    };
    writer.write_u8(kind).await?;
    writer.write_u32(frame_len(payload.len())?).await?;
    writer.write_all(payload).await?;
    Ok(())
}

/// Receive one response frame.
///
/// Returns `Ok(None)` when the peer closed the connection at a frame
/// boundary. A connection closed inside a frame is an IO error.
pub async fn read_frame<R>(reader: &mut R, max_frame_size: usize) -> Result<Option<Frame>, SourceError>
where
    R: AsyncRead + Unpin,
{
    let kind = match reader.read_u8().await {
        Ok(kind) => kind,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let len = reader.read_u32().await? as usize;
    check_len(len, max_frame_size)?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    let frame = match kind {
        FRAME_DATA => Frame::Data(Bytes::from(payload)),
        FRAME_END => Frame::End,
        FRAME_ERROR => Frame::Error(String::from_utf8_lossy(&payload).into_owned()),
        other => {
            return Err(SourceError::Protocol(format!(
                "unknown frame kind 0x{:02X}",
                other
            )))
        }
    };
    Ok(Some(frame))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ReadRequest {
        ReadRequest {
            token: "tok".into(),
            path: "/data/part1".into(),
            offset: 10,
            length: 20,
            format: FileFormat::Index,
        }
    }

    #[tokio::test]
    async fn test_request_framing() {
        let mut buf = Vec::new();
        write_request(&mut buf, &request()).await.unwrap();
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(len, buf.len() - 4);
        let json: serde_json::Value = serde_json::from_slice(&buf[4..]).unwrap();
        assert_eq!(json["format"], "index");

        let mut cursor: &[u8] = &buf;
        assert_eq!(read_request(&mut cursor, 1024).await.unwrap(), request());
    }

    #[tokio::test]
    async fn test_response_frames() {
        let mut buf = Vec::new();
        write_frame(&mut buf, &Frame::Data(Bytes::from_static(b"abc"))).await.unwrap();
        write_frame(&mut buf, &Frame::Error("denied".into())).await.unwrap();
        write_frame(&mut buf, &Frame::End).await.unwrap();
        assert_eq!(&buf[..5], &[FRAME_DATA, 0, 0, 0, 3]);

        let mut cursor: &[u8] = &buf;
        assert_eq!(
            read_frame(&mut cursor, 1024).await.unwrap(),
            Some(Frame::Data(Bytes::from_static(b"abc")))
        );
        assert_eq!(
            read_frame(&mut cursor, 1024).await.unwrap(),
            Some(Frame::Error("denied".into()))
        );
        assert_eq!(read_frame(&mut cursor, 1024).await.unwrap(), Some(Frame::End));
        assert_eq!(read_frame(&mut cursor, 1024).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_and_unknown_frames() {
        let mut cursor: &[u8] = &[FRAME_DATA, 0, 0, 1, 0];
        assert!(matches!(
            read_frame(&mut cursor, 16).await,
            Err(SourceError::Protocol(_))
        ));

        let mut cursor: &[u8] = &[0x33, 0, 0, 0, 0];
        assert!(matches!(
            read_frame(&mut cursor, 16).await,
            Err(SourceError::Protocol(_))
        ));

        // Closed inside a frame header
        let mut cursor: &[u8] = &[FRAME_DATA, 0, 0];
        assert!(matches!(read_frame(&mut cursor, 16).await, Err(SourceError::Io(_))));
    }
}
