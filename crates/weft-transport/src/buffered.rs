//! Read-ahead and write-accumulation over an inner transport.

use async_trait::async_trait;
use bytes::BytesMut;
use weft_core::TransportError;

use crate::Transport;

pub(crate) const DEFAULT_CAPACITY: usize = 4096;

/// Wraps another transport with a write accumulator and a read-ahead
/// buffer.
///
/// Writes collect in the accumulator and spill to the inner transport once
/// it reaches capacity; `flush` pushes whatever is pending and then flushes
/// the inner transport. Reads fill the read-ahead buffer with up to one
/// capacity's worth of bytes and serve from it.
pub struct BufferedTransport<T = Box<dyn Transport>> {
    inner: T,
    wbuf: Vec<u8>,
    rbuf: BytesMut,
    capacity: usize,
}

impl<T: Transport> BufferedTransport<T> {
    pub fn new(inner: T) -> Self {
        Self::with_capacity(inner, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(inner: T, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner,
            wbuf: Vec::with_capacity(capacity),
            rbuf: BytesMut::new(),
            capacity,
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

    async fn spill(&mut self) -> Result<(), TransportError> {
        if !self.wbuf.is_empty() {
            let pending = std::mem::take(&mut self.wbuf);
            self.inner.write_all(&pending).await?;
        }
        Ok(())
    }

    async fn fill(&mut self) -> Result<(), TransportError> {
        let mut chunk = vec![0u8; self.capacity];
        let n = self.inner.read(&mut chunk).await?;
        self.rbuf.extend_from_slice(&chunk[..n]);
        Ok(())
    }
}

#[async_trait]
impl<T: Transport> Transport for BufferedTransport<T> {
    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        self.inner.open().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.wbuf.clear();
        self.rbuf.clear();
        self.inner.close().await
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.rbuf.is_empty() {
            self.fill().await?;
        }
        let n = buf.len().min(self.rbuf.len());
        let head = self.rbuf.split_to(n);
        buf[..n].copy_from_slice(&head);
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        self.wbuf.extend_from_slice(buf);
        if self.wbuf.len() >= self.capacity {
            self.spill().await?;
        }
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        self.spill().await?;
        self.inner.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBuffer;

    #[tokio::test]
    async fn writes_stay_buffered_until_flush() {
        let mut t = BufferedTransport::new(MemoryBuffer::new());
        t.write_all(b"pending").await.unwrap();
        assert!(t.get_ref().is_empty());

        t.flush().await.unwrap();
        assert_eq!(t.get_ref().bytes(), b"pending");
    }

    #[tokio::test]
    async fn full_accumulator_spills_to_inner() {
        let mut t = BufferedTransport::with_capacity(MemoryBuffer::new(), 4);
        t.write_all(b"abcdef").await.unwrap();
        assert_eq!(t.get_ref().bytes(), b"abcdef");
    }

    #[tokio::test]
    async fn reads_ahead_and_serves_from_buffer() {
        let mut t = BufferedTransport::new(MemoryBuffer::with_bytes(b"stream of bytes"));
        let mut first = [0u8; 6];
        t.read_exact(&mut first).await.unwrap();
        assert_eq!(&first, b"stream");
        // Inner was drained in one capacity-sized gulp.
        assert!(t.get_ref().is_empty());

        let mut rest = [0u8; 9];
        t.read_exact(&mut rest).await.unwrap();
        assert_eq!(&rest, b" of bytes");
    }

    #[tokio::test]
    async fn eof_propagates_when_drained() {
        let mut t = BufferedTransport::new(MemoryBuffer::with_bytes(b"ab"));
        let mut out = [0u8; 2];
        t.read_exact(&mut out).await.unwrap();
        let err = t.read(&mut out).await.unwrap_err();
        assert!(err.is_eof());
    }
}
