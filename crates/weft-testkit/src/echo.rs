//! Echo sample service.

use async_trait::async_trait;
use weft_core::{MessageKind, ProtocolError, TypeTag};
use weft_protocol::{skip, Protocol};
use weft_server::{MethodHandler, ServiceProcessor};

use crate::client::{ClientCore, ClientError};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EchoArgs {
    pub message: String,
}

impl EchoArgs {
    pub async fn read(prot: &mut dyn Protocol) -> Result<Self, ProtocolError> {
        let mut args = EchoArgs::default();
        prot.read_struct_begin().await?;
        loop {
            let field = prot.read_field_begin().await?;
            if field.is_stop() {
                break;
            }
            match (field.id, field.tag) {
                (1, TypeTag::String) => args.message = prot.read_string().await?,
                (_, tag) => skip(prot, tag).await?,
            }
            prot.read_field_end().await?;
        }
        prot.read_struct_end().await?;
        Ok(args)
    }

    pub async fn write(&self, prot: &mut dyn Protocol) -> Result<(), ProtocolError> {
        prot.write_struct_begin("echo_args").await?;
        prot.write_field_begin("message", TypeTag::String, 1).await?;
        prot.write_string(&self.message).await?;
        prot.write_field_end().await?;
        prot.write_field_stop().await?;
        prot.write_struct_end().await
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EchoResult {
    pub success: Option<String>,
}

impl EchoResult {
    pub async fn read(prot: &mut dyn Protocol) -> Result<Self, ProtocolError> {
        let mut result = EchoResult::default();
        prot.read_struct_begin().await?;
        loop {
            let field = prot.read_field_begin().await?;
            if field.is_stop() {
                break;
            }
            match (field.id, field.tag) {
                (0, TypeTag::String) => result.success = Some(prot.read_string().await?),
                (_, tag) => skip(prot, tag).await?,
            }
            prot.read_field_end().await?;
        }
        prot.read_struct_end().await?;
        Ok(result)
    }

    pub async fn write(&self, prot: &mut dyn Protocol) -> Result<(), ProtocolError> {
        prot.write_struct_begin("echo_result").await?;
        if let Some(success) = &self.success {
            prot.write_field_begin("success", TypeTag::String, 0).await?;
            prot.write_string(success).await?;
            prot.write_field_end().await?;
        }
        prot.write_field_stop().await?;
        prot.write_struct_end().await
    }
}

struct EchoHandler;

#[async_trait]
impl MethodHandler for EchoHandler {
    async fn handle(
        &self,
        kind: MessageKind,
        seq_id: i32,
        input: &mut dyn Protocol,
        output: &mut dyn Protocol,
    ) -> Result<(), ProtocolError> {
        let args = EchoArgs::read(input).await?;
        input.read_message_end().await?;

        if kind == MessageKind::Oneway {
            return Ok(());
        }
        let result = EchoResult {
            success: Some(args.message),
        };
        output
            .write_message_begin("echo", MessageKind::Reply, seq_id)
            .await?;
        result.write(output).await?;
        output.write_message_end().await
    }
}

/// A processor serving only `echo`.
pub fn echo_processor() -> ServiceProcessor {
    ServiceProcessor::new().with_method("echo", Box::new(EchoHandler))
}

/// Generated-style client for the echo service.
pub struct EchoClient {
    core: ClientCore,
}

impl EchoClient {
    pub fn new(input: Box<dyn Protocol>, output: Box<dyn Protocol>) -> Self {
        Self {
            core: ClientCore::new(input, output),
        }
    }

    pub async fn echo(&mut self, message: &str) -> Result<String, ClientError> {
        let seq_id = self.core.next_seq_id();
        self.call("echo", MessageKind::Call, seq_id, message).await?;

        self.core.read_reply_envelope("echo", seq_id).await?;
        let result = EchoResult::read(self.core.input.as_mut()).await?;
        self.core.input.read_message_end().await?;
        Ok(result.success.unwrap_or_default())
    }

    /// Fire an echo without waiting for (or receiving) a reply.
    pub async fn echo_oneway(&mut self, message: &str) -> Result<(), ClientError> {
        let seq_id = self.core.next_seq_id();
        self.call("echo", MessageKind::Oneway, seq_id, message).await
    }

    /// Send a call for a method the echo server does not implement; used
    /// by the unknown-method scenarios.
    pub async fn call_unknown(&mut self, message: &str) -> Result<String, ClientError> {
        let seq_id = self.core.next_seq_id();
        self.call("unknown", MessageKind::Call, seq_id, message)
            .await?;

        self.core.read_reply_envelope("unknown", seq_id).await?;
        let result = EchoResult::read(self.core.input.as_mut()).await?;
        self.core.input.read_message_end().await?;
        Ok(result.success.unwrap_or_default())
    }

    async fn call(
        &mut self,
        method: &str,
        kind: MessageKind,
        seq_id: i32,
        message: &str,
    ) -> Result<(), ClientError> {
        self.core
            .output
            .write_message_begin(method, kind, seq_id)
            .await
            .map_err(ClientError::from)?;
        let args = EchoArgs {
            message: message.into(),
        };
        args.write(self.core.output.as_mut())
            .await
            .map_err(ClientError::from)?;
        self.core
            .output
            .write_message_end()
            .await
            .map_err(ClientError::from)?;
        self.core.output.flush().await.map_err(ClientError::from)?;
        Ok(())
    }
}
