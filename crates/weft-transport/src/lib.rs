//! weft-transport: byte-oriented I/O channels with explicit buffering and
//! framing semantics.
//!
//! A [`Transport`] is a duplex byte stream. Transports compose: the
//! buffered and framed kinds wrap any inner transport and are transports
//! themselves. Protocols own exactly one transport and drive it through
//! this trait.

#![deny(unsafe_code)]

use async_trait::async_trait;
use weft_core::TransportError;

mod buffered;
mod framed;
mod mem;
mod stream;
mod tcp;

pub use buffered::BufferedTransport;
pub use framed::FramedTransport;
pub use mem::MemoryBuffer;
pub use stream::StreamTransport;
pub use tcp::{connect_tcp, ServerChannel, TcpServerChannel};

/// A duplex byte channel.
///
/// `read` may return fewer bytes than requested; zero bytes without an
/// error means "more later". End of stream is reported as
/// [`TransportError::EndOfFile`], never as a silent zero-length success
/// for a non-empty request.
#[async_trait]
pub trait Transport: Send {
    fn is_open(&self) -> bool;

    /// Open the channel. Opening an already-open transport fails with
    /// `ALREADY_OPEN`.
    async fn open(&mut self) -> Result<(), TransportError>;

    /// Close the channel. Closing twice is a no-op.
    async fn close(&mut self) -> Result<(), TransportError>;

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    async fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError>;

    async fn flush(&mut self) -> Result<(), TransportError>;

    /// Read until `buf` is full, or fail with `END_OF_FILE` recording how
    /// many bytes arrived before the channel ended.
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        let mut have = 0;
        while have < buf.len() {
            match self.read(&mut buf[have..]).await {
                Ok(0) => return Err(TransportError::EndOfFile { bytes_read: have }),
                Ok(n) => have += n,
                Err(e) if e.is_eof() => {
                    return Err(TransportError::EndOfFile { bytes_read: have })
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Write the whole buffer, looping over short writes.
    async fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        let mut done = 0;
        while done < buf.len() {
            let n = self.write(&buf[done..]).await?;
            if n == 0 {
                return Err(TransportError::Unknown("write made no progress".into()));
            }
            done += n;
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for Box<dyn Transport> {
    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        (**self).open().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        (**self).close().await
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        (**self).read(buf).await
    }

    async fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        (**self).write(buf).await
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        (**self).flush().await
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), TransportError> {
        (**self).read_exact(buf).await
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<(), TransportError> {
        (**self).write_all(buf).await
    }
}

/// Wraps accepted channels in the transport a server side wants to speak
/// through (buffering, framing, or nothing).
pub trait TransportFactory: Send + Sync {
    fn wrap(&self, inner: Box<dyn Transport>) -> Box<dyn Transport>;
}

/// Factory that hands the channel back unwrapped.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityFactory;

impl TransportFactory for IdentityFactory {
    fn wrap(&self, inner: Box<dyn Transport>) -> Box<dyn Transport> {
        inner
    }
}

/// Factory producing [`BufferedTransport`] wrappers.
#[derive(Debug, Clone, Copy)]
pub struct BufferedFactory {
    capacity: usize,
}

impl BufferedFactory {
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }
}

impl Default for BufferedFactory {
    fn default() -> Self {
        Self {
            capacity: buffered::DEFAULT_CAPACITY,
        }
    }
}

impl TransportFactory for BufferedFactory {
    fn wrap(&self, inner: Box<dyn Transport>) -> Box<dyn Transport> {
        Box::new(BufferedTransport::with_capacity(inner, self.capacity))
    }
}

/// Factory producing [`FramedTransport`] wrappers.
#[derive(Debug, Clone, Copy, Default)]
pub struct FramedFactory;

impl TransportFactory for FramedFactory {
    fn wrap(&self, inner: Box<dyn Transport>) -> Box<dyn Transport> {
        Box::new(FramedTransport::new(inner))
    }
}
