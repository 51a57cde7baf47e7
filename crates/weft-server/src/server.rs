//! Accept loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use weft_core::TransportError;
use weft_protocol::{BinaryFactory, Protocol, ProtocolFactory};
use weft_transport::{IdentityFactory, ServerChannel, TransportFactory};

use crate::Processor;

/// Cloneable handle that stops a running server: it flips the stop flag
/// and interrupts a blocked accept.
#[derive(Clone)]
pub struct StopHandle {
    stopped: Arc<AtomicBool>,
    interrupt: Arc<Notify>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.interrupt.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Everything both servers share: the processor, the listening channel,
/// and one transport/protocol factory per direction.
struct ServerCore<C> {
    processor: Arc<dyn Processor>,
    channel: C,
    input_transports: Box<dyn TransportFactory>,
    output_transports: Box<dyn TransportFactory>,
    input_protocols: Box<dyn ProtocolFactory>,
    output_protocols: Box<dyn ProtocolFactory>,
    stopped: Arc<AtomicBool>,
}

impl<C: ServerChannel> ServerCore<C> {
    fn new(processor: Arc<dyn Processor>, channel: C) -> Self {
        Self {
            processor,
            channel,
            input_transports: Box::new(IdentityFactory),
            output_transports: Box::new(IdentityFactory),
            input_protocols: Box::new(BinaryFactory::default()),
            output_protocols: Box::new(BinaryFactory::default()),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stopped: Arc::clone(&self.stopped),
            interrupt: self.channel.interrupt_handle(),
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Accept one connection and wrap both sides. `Ok(None)` means the
    /// server was stopped while waiting.
    async fn accept(
        &mut self,
    ) -> Result<Option<(Box<dyn Protocol>, Box<dyn Protocol>)>, TransportError> {
        match self.channel.accept().await {
            Ok((itrans, otrans)) => {
                let input = self
                    .input_protocols
                    .protocol(self.input_transports.wrap(itrans));
                let output = self
                    .output_protocols
                    .protocol(self.output_transports.wrap(otrans));
                Ok(Some((input, output)))
            }
            Err(e) => {
                if self.is_stopped() {
                    return Ok(None);
                }
                Err(e)
            }
        }
    }
}

/// Run one connection's process loop to completion, then close both
/// transports. Failures end the connection, never the server.
async fn serve_connection(
    processor: &dyn Processor,
    mut input: Box<dyn Protocol>,
    mut output: Box<dyn Protocol>,
) {
    loop {
        match processor.process(input.as_mut(), output.as_mut()).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                tracing::warn!(error = %e, "closing connection after failure");
                break;
            }
        }
    }
    if let Err(e) = input.transport_mut().close().await {
        tracing::debug!(error = %e, "input transport close failed");
    }
    if let Err(e) = output.transport_mut().close().await {
        tracing::debug!(error = %e, "output transport close failed");
    }
}

macro_rules! factory_setters {
    () => {
        /// Replace the transport factories applied to each side of an
        /// accepted connection.
        pub fn with_transport_factories(
            mut self,
            input: Box<dyn TransportFactory>,
            output: Box<dyn TransportFactory>,
        ) -> Self {
            self.core.input_transports = input;
            self.core.output_transports = output;
            self
        }

        /// Replace the protocol factories for each side.
        pub fn with_protocol_factories(
            mut self,
            input: Box<dyn ProtocolFactory>,
            output: Box<dyn ProtocolFactory>,
        ) -> Self {
            self.core.input_protocols = input;
            self.core.output_protocols = output;
            self
        }

        /// A handle that stops the server from another task.
        pub fn stop_handle(&self) -> StopHandle {
            self.core.stop_handle()
        }
    };
}

/// Single-threaded server: connections are served to completion on the
/// accept loop, one at a time.
pub struct SimpleServer<C> {
    core: ServerCore<C>,
}

impl<C: ServerChannel> SimpleServer<C> {
    /// Binary protocol over bare channels; use the `with_*` builders to
    /// change either.
    pub fn new(processor: Arc<dyn Processor>, channel: C) -> Self {
        Self {
            core: ServerCore::new(processor, channel),
        }
    }

    factory_setters!();

    /// Accept and serve until [`StopHandle::stop`] is called or the
    /// listener fails.
    pub async fn serve(&mut self) -> Result<(), TransportError> {
        while !self.core.is_stopped() {
            let Some((input, output)) = self.core.accept().await? else {
                break;
            };
            serve_connection(self.core.processor.as_ref(), input, output).await;
        }
        Ok(())
    }
}

/// Task-per-connection server.
///
/// The accept loop never blocks on a connection; each one runs in its own
/// spawned task. Pair the input side with a framed transport factory so a
/// slow request cannot hold a partial read across dispatch boundaries.
pub struct TaskServer<C> {
    core: ServerCore<C>,
}

impl<C: ServerChannel> TaskServer<C> {
    pub fn new(processor: Arc<dyn Processor>, channel: C) -> Self {
        Self {
            core: ServerCore::new(processor, channel),
        }
    }

    factory_setters!();

    pub async fn serve(&mut self) -> Result<(), TransportError> {
        while !self.core.is_stopped() {
            let Some((input, output)) = self.core.accept().await? else {
                break;
            };
            let processor = Arc::clone(&self.core.processor);
            tokio::spawn(async move {
                serve_connection(processor.as_ref(), input, output).await;
            });
        }
        Ok(())
    }
}
