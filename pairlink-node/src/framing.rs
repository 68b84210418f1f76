//! Async framing over a byte stream: 4-byte big-endian length, then payload.
//!
//! Any I/O error here is connection-fatal for the reader; the session stops
//! reading and surfaces the failure. A write error is reported but the read
//! side keeps running.

use pairlink_core::frame::{LEN_SIZE, MAX_FRAME_LEN};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Reads length-prefixed frames from the read half of a stream.
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Block until exactly one frame is available. EOF, short reads, and
    /// hostile length prefixes are all errors.
    pub async fn read_frame(&mut self) -> Result<Vec<u8>, FrameIoError> {
        let mut len_buf = [0u8; LEN_SIZE];
        self.inner.read_exact(&mut len_buf).await?;
        let len = u32::from_be_bytes(len_buf);
        if len > MAX_FRAME_LEN {
            return Err(FrameIoError::TooLarge(len));
        }
        let mut payload = vec![0u8; len as usize];
        self.inner.read_exact(&mut payload).await?;
        Ok(payload)
    }
}

/// Writes length-prefixed frames to the write half of a stream.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<(), FrameIoError> {
        if payload.len() > MAX_FRAME_LEN as usize {
            return Err(FrameIoError::TooLarge(payload.len() as u32));
        }
        self.inner.write_all(&(payload.len() as u32).to_be_bytes()).await?;
        self.inner.write_all(payload).await?;
        self.inner.flush().await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FrameIoError {
    #[error("frame of {0} bytes exceeds limit")]
    TooLarge(u32),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairlink_core::frame::MAX_FRAME_LEN;

    #[tokio::test]
    async fn roundtrip_over_duplex() {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = FrameWriter::new(client);
        let mut reader = FrameReader::new(server);

        writer.write_frame(b"first").await.unwrap();
        writer.write_frame(b"").await.unwrap();
        writer.write_frame(b"third").await.unwrap();

        assert_eq!(reader.read_frame().await.unwrap(), b"first");
        assert_eq!(reader.read_frame().await.unwrap(), b"");
        assert_eq!(reader.read_frame().await.unwrap(), b"third");
    }

    #[tokio::test]
    async fn eof_is_an_error() {
        let (client, server) = tokio::io::duplex(1024);
        drop(client);
        let mut reader = FrameReader::new(server);
        assert!(matches!(
            reader.read_frame().await,
            Err(FrameIoError::Io(_))
        ));
    }

    #[tokio::test]
    async fn hostile_length_prefix_rejected_before_allocating() {
        let (mut client, server) = tokio::io::duplex(1024);
        client
            .write_all(&(MAX_FRAME_LEN + 1).to_be_bytes())
            .await
            .unwrap();
        let mut reader = FrameReader::new(server);
        assert!(matches!(
            reader.read_frame().await,
            Err(FrameIoError::TooLarge(_))
        ));
    }

    #[tokio::test]
    async fn oversized_write_rejected() {
        let (client, _server) = tokio::io::duplex(64);
        let mut writer = FrameWriter::new(client);
        let payload = vec![0u8; MAX_FRAME_LEN as usize + 1];
        assert!(matches!(
            writer.write_frame(&payload).await,
            Err(FrameIoError::TooLarge(_))
        ));
    }
}
