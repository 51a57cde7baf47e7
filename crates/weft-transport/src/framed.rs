//! Length-prefixed message framing.

use async_trait::async_trait;
use bytes::BytesMut;
use weft_core::TransportError;

use crate::Transport;

/// Frames larger than this are treated as stream corruption.
const MAX_FRAME_SIZE: usize = 256 * 1024 * 1024;

/// Wraps another transport so every outbound message travels as
/// `[len: u32 BE][payload]`.
///
/// Writes stage the whole message; `flush` emits one frame. Reads decode
/// one length prefix, buffer that entire frame, and serve from it; a read
/// never returns bytes belonging to the next frame. This is what lets a
/// server know a complete request has arrived before dispatching it.
pub struct FramedTransport<T = Box<dyn Transport>> {
    inner: T,
    rframe: BytesMut,
    wframe: Vec<u8>,
}

impl<T: Transport> FramedTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            rframe: BytesMut::new(),
            wframe: Vec::new(),
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    async fn read_frame(&mut self) -> Result<(), TransportError> {
        let mut len = [0u8; 4];
        self.inner.read_exact(&mut len).await?;
        let size = u32::from_be_bytes(len) as usize;
        if size > MAX_FRAME_SIZE {
            return Err(TransportError::Unknown(format!(
                "frame of {size} bytes exceeds maximum"
            )));
        }
        let mut frame = vec![0u8; size];
        self.inner.read_exact(&mut frame).await?;
        self.rframe = BytesMut::from(frame.as_slice());
        Ok(())
    }
}

#[async_trait]
impl<T: Transport> Transport for FramedTransport<T> {
    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        self.inner.open().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.rframe.clear();
        self.wframe.clear();
        self.inner.close().await
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.rframe.is_empty() {
            self.read_frame().await?;
        }
        let n = buf.len().min(self.rframe.len());
        let head = self.rframe.split_to(n);
        buf[..n].copy_from_slice(&head);
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        self.wframe.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        if self.wframe.is_empty() {
            return self.inner.flush().await;
        }
        let frame = std::mem::take(&mut self.wframe);
        let len = (frame.len() as u32).to_be_bytes();
        self.inner.write_all(&len).await?;
        self.inner.write_all(&frame).await?;
        self.inner.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBuffer;

    #[tokio::test]
    async fn flush_emits_length_prefix() {
        let mut t = FramedTransport::new(MemoryBuffer::new());
        t.write_all(b"payload").await.unwrap();
        assert!(t.get_ref().is_empty());

        t.flush().await.unwrap();
        let wire = t.get_ref().bytes();
        assert_eq!(&wire[..4], &7u32.to_be_bytes());
        assert_eq!(&wire[4..], b"payload");
    }

    #[tokio::test]
    async fn reader_stops_at_frame_boundary() {
        // Two frames back to back in one buffer.
        let mut inner = MemoryBuffer::new();
        for msg in [b"first".as_slice(), b"second!".as_slice()] {
            inner
                .write_all(&(msg.len() as u32).to_be_bytes())
                .await
                .unwrap();
            inner.write_all(msg).await.unwrap();
        }

        let mut t = FramedTransport::new(inner);
        let mut buf = [0u8; 32];

        // An oversized read request drains only the first frame.
        let n = t.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"first");

        let n = t.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"second!");
    }

    #[tokio::test]
    async fn partial_reads_resume_within_a_frame() {
        let mut inner = MemoryBuffer::new();
        inner.write_all(&8u32.to_be_bytes()).await.unwrap();
        inner.write_all(b"abcdefgh").await.unwrap();

        let mut t = FramedTransport::new(inner);
        let mut half = [0u8; 4];
        t.read_exact(&mut half).await.unwrap();
        assert_eq!(&half, b"abcd");
        t.read_exact(&mut half).await.unwrap();
        assert_eq!(&half, b"efgh");
    }

    #[tokio::test]
    async fn truncated_frame_is_eof() {
        let mut inner = MemoryBuffer::new();
        inner.write_all(&100u32.to_be_bytes()).await.unwrap();
        inner.write_all(b"short").await.unwrap();

        let mut t = FramedTransport::new(inner);
        let mut buf = [0u8; 1];
        let err = t.read(&mut buf).await.unwrap_err();
        assert!(err.is_eof());
    }

    #[tokio::test]
    async fn empty_flush_emits_no_frame() {
        let mut t = FramedTransport::new(MemoryBuffer::new());
        t.flush().await.unwrap();
        assert!(t.get_ref().is_empty());
    }
}
