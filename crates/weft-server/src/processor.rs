//! Method-table dispatch.

use std::collections::HashMap;

use async_trait::async_trait;
use weft_core::{ApplicationError, MessageKind, ProtocolError, TypeTag};
use weft_protocol::{skip, write_application_error, Protocol};

/// Handles one decoded request envelope.
///
/// A handler reads the argument struct and the message end from `input`,
/// invokes the service, and writes a complete REPLY (or EXCEPTION)
/// envelope to `output`. For ONEWAY calls it must write nothing.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn handle(
        &self,
        kind: MessageKind,
        seq_id: i32,
        input: &mut dyn Protocol,
        output: &mut dyn Protocol,
    ) -> Result<(), ProtocolError>;
}

/// Drives one request/response exchange over a protocol pair.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Handle one message. `Ok(true)` means the connection should keep
    /// serving; `Ok(false)` means the peer disconnected cleanly before
    /// sending anything. Errors mean the connection is unusable.
    async fn process(
        &self,
        input: &mut dyn Protocol,
        output: &mut dyn Protocol,
    ) -> Result<bool, ProtocolError>;
}

/// A processor backed by a name → handler map built at construction and
/// read-only afterwards, so any number of connections can share it.
#[derive(Default)]
pub struct ServiceProcessor {
    methods: HashMap<String, Box<dyn MethodHandler>>,
}

impl ServiceProcessor {
    pub fn new() -> Self {
        Self {
            methods: HashMap::new(),
        }
    }

    /// Register a handler under a method name.
    pub fn with_method(
        mut self,
        name: impl Into<String>,
        handler: Box<dyn MethodHandler>,
    ) -> Self {
        self.methods.insert(name.into(), handler);
        self
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Drain the rest of an unwanted message: the argument struct and the
    /// message end.
    async fn drain_message(&self, input: &mut dyn Protocol) -> Result<(), ProtocolError> {
        skip(input, TypeTag::Struct).await?;
        input.read_message_end().await
    }

    async fn reply_exception(
        &self,
        output: &mut dyn Protocol,
        name: &str,
        seq_id: i32,
        err: &ApplicationError,
    ) -> Result<(), ProtocolError> {
        output
            .write_message_begin(name, MessageKind::Exception, seq_id)
            .await?;
        write_application_error(output, err).await?;
        output.write_message_end().await?;
        output.flush().await
    }
}

#[async_trait]
impl Processor for ServiceProcessor {
    async fn process(
        &self,
        input: &mut dyn Protocol,
        output: &mut dyn Protocol,
    ) -> Result<bool, ProtocolError> {
        let envelope = match input.read_message_begin().await {
            Ok(envelope) => envelope,
            Err(e) if e.is_eof() => {
                // Clean disconnect between messages, not a failure.
                tracing::debug!("client closed the connection");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let oneway = envelope.kind == MessageKind::Oneway;
        match envelope.kind {
            MessageKind::Call | MessageKind::Oneway => {}
            MessageKind::Reply | MessageKind::Exception => {
                self.drain_message(input).await?;
                let err = ApplicationError::new(
                    weft_core::ApplicationErrorKind::InvalidMessageType,
                    format!("unexpected {:?} message on the server side", envelope.kind),
                );
                self.reply_exception(output, &envelope.name, envelope.seq_id, &err)
                    .await?;
                return Ok(true);
            }
        }

        let Some(handler) = self.methods.get(&envelope.name) else {
            self.drain_message(input).await?;
            if !oneway {
                let err = ApplicationError::unknown_method(&envelope.name);
                tracing::debug!(method = %envelope.name, "no handler registered");
                self.reply_exception(output, &envelope.name, envelope.seq_id, &err)
                    .await?;
            }
            return Ok(true);
        };

        match handler
            .handle(envelope.kind, envelope.seq_id, input, output)
            .await
        {
            Ok(()) => {
                if !oneway {
                    output.flush().await?;
                }
                Ok(true)
            }
            Err(e) => {
                // Best effort: tell the peer before giving up on the
                // connection, unless the failure was the output side.
                tracing::warn!(method = %envelope.name, error = %e, "handler failed");
                if !oneway && !e.is_eof() {
                    let err = ApplicationError::internal(e.to_string());
                    let _ = self
                        .reply_exception(output, &envelope.name, envelope.seq_id, &err)
                        .await;
                }
                Err(e)
            }
        }
    }
}
