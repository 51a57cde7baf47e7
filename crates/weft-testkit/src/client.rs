//! Client-side call plumbing shared by the generated-style stubs.

use weft_core::{
    ApplicationError, ApplicationErrorKind, MessageEnvelope, MessageKind, ProtocolError,
};
use weft_protocol::{read_application_error, Protocol};

/// What a client method can fail with: a transport/protocol fault, or an
/// application exception the server put on the wire.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

/// A protocol pair plus the sequence counter for outgoing calls.
pub struct ClientCore {
    pub input: Box<dyn Protocol>,
    pub output: Box<dyn Protocol>,
    seq_id: i32,
}

impl ClientCore {
    pub fn new(input: Box<dyn Protocol>, output: Box<dyn Protocol>) -> Self {
        Self {
            input,
            output,
            seq_id: 0,
        }
    }

    /// Allocate the next sequence id.
    pub fn next_seq_id(&mut self) -> i32 {
        self.seq_id += 1;
        self.seq_id
    }

    /// Read and validate a reply envelope for `method`/`seq_id`. An
    /// EXCEPTION envelope is drained and surfaced as the error it carries.
    pub async fn read_reply_envelope(
        &mut self,
        method: &str,
        seq_id: i32,
    ) -> Result<MessageEnvelope, ClientError> {
        let envelope = self.input.read_message_begin().await?;
        if envelope.kind == MessageKind::Exception {
            let err = read_application_error(self.input.as_mut()).await?;
            self.input.read_message_end().await?;
            return Err(err.into());
        }
        if envelope.kind != MessageKind::Reply {
            return Err(ApplicationError::new(
                ApplicationErrorKind::InvalidMessageType,
                format!("unexpected {:?} in reply to {method}", envelope.kind),
            )
            .into());
        }
        if envelope.name != method {
            return Err(ApplicationError::new(
                ApplicationErrorKind::WrongMethodName,
                format!("reply for {:?}, expected {method:?}", envelope.name),
            )
            .into());
        }
        if envelope.seq_id != seq_id {
            return Err(ApplicationError::new(
                ApplicationErrorKind::BadSequenceId,
                format!("reply seq {} for call seq {seq_id}", envelope.seq_id),
            )
            .into());
        }
        Ok(envelope)
    }
}
