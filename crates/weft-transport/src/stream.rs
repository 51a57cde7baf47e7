//! Adapter over an external async byte source/sink pair.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use weft_core::TransportError;

use crate::Transport;

/// A transport over any owned `AsyncRead`/`AsyncWrite` half pair: a split
/// TCP stream, a `duplex` pipe, stdio.
///
/// The adapter is born open. When `owns_close` is set (the default),
/// closing shuts the write half down; otherwise close only detaches the
/// halves and the caller keeps responsibility for the underlying channel.
pub struct StreamTransport<R, W> {
    reader: Option<R>,
    writer: Option<W>,
    owns_close: bool,
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Some(reader),
            writer: Some(writer),
            owns_close: true,
        }
    }

    /// Leave the underlying channel open when this transport closes.
    pub fn leave_open(mut self) -> Self {
        self.owns_close = false;
        self
    }

    /// A read-only half; writes fail with `NOT_OPEN`.
    pub fn reader_only(reader: R) -> Self {
        Self {
            reader: Some(reader),
            writer: None,
            owns_close: true,
        }
    }

    /// A write-only half; reads fail with `NOT_OPEN`.
    pub fn writer_only(writer: W) -> Self {
        Self {
            reader: None,
            writer: Some(writer),
            owns_close: true,
        }
    }
}

impl StreamTransport<tokio::net::tcp::OwnedReadHalf, tokio::net::tcp::OwnedWriteHalf> {
    /// Adapt a connected TCP stream.
    pub fn from_tcp(stream: tokio::net::TcpStream) -> Self {
        let (r, w) = stream.into_split();
        Self::new(r, w)
    }

    /// Split a connected TCP stream into an input transport and an output
    /// transport, so each side of a connection can be wrapped and owned
    /// independently.
    pub fn split_tcp(stream: tokio::net::TcpStream) -> (Self, Self) {
        let (r, w) = stream.into_split();
        (Self::reader_only(r), Self::writer_only(w))
    }
}

#[async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn is_open(&self) -> bool {
        self.reader.is_some() || self.writer.is_some()
    }

    async fn open(&mut self) -> Result<(), TransportError> {
        if self.is_open() {
            return Err(TransportError::AlreadyOpen);
        }
        // A detached stream cannot be reacquired.
        Err(TransportError::NotOpen)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.reader = None;
        if let Some(mut writer) = self.writer.take() {
            if self.owns_close {
                writer.shutdown().await.map_err(TransportError::from)?;
            }
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let reader = self.reader.as_mut().ok_or(TransportError::NotOpen)?;
        if buf.is_empty() {
            return Ok(0);
        }
        let n = reader.read(buf).await.map_err(TransportError::from)?;
        if n == 0 {
            return Err(TransportError::eof());
        }
        Ok(n)
    }

    async fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
        let writer = self.writer.as_mut().ok_or(TransportError::NotOpen)?;
        writer.write(buf).await.map_err(TransportError::from)
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        let writer = self.writer.as_mut().ok_or(TransportError::NotOpen)?;
        writer.flush().await.map_err(TransportError::from)
    }
}
