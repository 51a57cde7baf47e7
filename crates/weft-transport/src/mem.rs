//! In-memory growable byte queue.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use weft_core::TransportError;

use crate::Transport;

/// A transport backed by an in-memory FIFO: writes append to the tail,
/// reads drain from the head. Used by tests and for staging whole messages.
#[derive(Debug)]
pub struct MemoryBuffer {
    buf: BytesMut,
    open: bool,
}

impl Default for MemoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBuffer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            open: true,
        }
    }

    /// A buffer pre-seeded with bytes to read.
    pub fn with_bytes(bytes: &[u8]) -> Self {
        Self {
            buf: BytesMut::from(bytes),
            open: true,
        }
    }

    /// Unread contents.
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Take everything currently buffered, leaving the queue empty.
    pub fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }
}

#[async_trait]
impl Transport for MemoryBuffer {
    fn is_open(&self) -> bool {
        self.open
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        if self.open {
            return Err(TransportError::AlreadyOpen);
        }
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.open = false;
        self.buf.clear();
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        if self.buf.is_empty() {
            if buf.is_empty() {
                return Ok(0);
            }
            return Err(TransportError::eof());
        }
        let n = buf.len().min(self.buf.len());
        let head = self.buf.split_to(n);
        buf[..n].copy_from_slice(&head);
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::NotOpen);
        }
        Ok(())
    }
}
