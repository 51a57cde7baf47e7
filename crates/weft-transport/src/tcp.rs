//! Listening channel for servers, with interruptible accept.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use weft_core::TransportError;

use crate::{StreamTransport, Transport};

/// A listening byte channel that yields one transport pair per accepted
/// connection: the read side and the write side of the same duplex
/// channel, each independently owned so each can be wrapped by its own
/// transport factory.
#[async_trait]
pub trait ServerChannel: Send {
    /// Wait for the next connection. Returns an error when the listener
    /// fails or [`interrupt_handle`](Self::interrupt_handle) is notified.
    async fn accept(
        &mut self,
    ) -> Result<(Box<dyn Transport>, Box<dyn Transport>), TransportError>;

    /// Handle a stopping server uses to unblock a pending `accept`.
    fn interrupt_handle(&self) -> Arc<Notify>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// TCP listener implementing [`ServerChannel`].
pub struct TcpServerChannel {
    listener: Option<TcpListener>,
    interrupt: Arc<Notify>,
}

impl TcpServerChannel {
    /// Bind a listener. Use port 0 for an ephemeral port in tests.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(TransportError::from)?;
        Ok(Self {
            listener: Some(listener),
            interrupt: Arc::new(Notify::new()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        let listener = self.listener.as_ref().ok_or(TransportError::NotOpen)?;
        listener.local_addr().map_err(TransportError::from)
    }
}

#[async_trait]
impl ServerChannel for TcpServerChannel {
    async fn accept(
        &mut self,
    ) -> Result<(Box<dyn Transport>, Box<dyn Transport>), TransportError> {
        let listener = self.listener.as_ref().ok_or(TransportError::NotOpen)?;
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _addr) = accepted.map_err(TransportError::from)?;
                let (input, output) = StreamTransport::split_tcp(stream);
                Ok((Box::new(input) as Box<dyn Transport>, Box::new(output) as Box<dyn Transport>))
            }
            _ = self.interrupt.notified() => {
                Err(TransportError::Unknown("accept interrupted".into()))
            }
        }
    }

    fn interrupt_handle(&self) -> Arc<Notify> {
        Arc::clone(&self.interrupt)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.listener = None;
        Ok(())
    }
}

/// Open a client connection, returning the (input, output) transport pair.
pub async fn connect_tcp(
    addr: &str,
) -> Result<(Box<dyn Transport>, Box<dyn Transport>), TransportError> {
    let stream = TcpStream::connect(addr).await.map_err(TransportError::from)?;
    let (input, output) = StreamTransport::split_tcp(stream);
    Ok((Box::new(input), Box::new(output)))
}
