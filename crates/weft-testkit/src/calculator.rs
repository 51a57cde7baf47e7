//! Calculator sample service, hand-expanded in the generator's style.

use async_trait::async_trait;
use weft_core::{MessageKind, ProtocolError, TypeTag};
use weft_protocol::{skip, Protocol};
use weft_server::{MethodHandler, ServiceProcessor};

use crate::client::{ClientCore, ClientError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(i32)]
pub enum Operation {
    #[default]
    Add = 1,
    Subtract = 2,
    Multiply = 3,
    Divide = 4,
}

impl Operation {
    pub fn from_i32(value: i32) -> Result<Self, ProtocolError> {
        Ok(match value {
            1 => Operation::Add,
            2 => Operation::Subtract,
            3 => Operation::Multiply,
            4 => Operation::Divide,
            other => {
                return Err(ProtocolError::InvalidData(format!(
                    "unknown Operation value {other}"
                )))
            }
        })
    }
}

/// One piece of work for the calculator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Work {
    pub num1: i32,
    pub num2: i32,
    pub op: Operation,
    pub comment: Option<String>,
}

impl Work {
    pub async fn read(prot: &mut dyn Protocol) -> Result<Work, ProtocolError> {
        let mut work = Work::default();
        prot.read_struct_begin().await?;
        loop {
            let field = prot.read_field_begin().await?;
            if field.is_stop() {
                break;
            }
            match (field.id, field.tag) {
                (1, TypeTag::I32) => work.num1 = prot.read_i32().await?,
                (2, TypeTag::I32) => work.num2 = prot.read_i32().await?,
                (3, TypeTag::I32) => work.op = Operation::from_i32(prot.read_i32().await?)?,
                (4, TypeTag::String) => work.comment = Some(prot.read_string().await?),
                (_, tag) => skip(prot, tag).await?,
            }
            prot.read_field_end().await?;
        }
        prot.read_struct_end().await?;
        Ok(work)
    }

    pub async fn write(&self, prot: &mut dyn Protocol) -> Result<(), ProtocolError> {
        prot.write_struct_begin("Work").await?;
        prot.write_field_begin("num1", TypeTag::I32, 1).await?;
        prot.write_i32(self.num1).await?;
        prot.write_field_end().await?;
        prot.write_field_begin("num2", TypeTag::I32, 2).await?;
        prot.write_i32(self.num2).await?;
        prot.write_field_end().await?;
        prot.write_field_begin("op", TypeTag::I32, 3).await?;
        prot.write_i32(self.op as i32).await?;
        prot.write_field_end().await?;
        if let Some(comment) = &self.comment {
            prot.write_field_begin("comment", TypeTag::String, 4).await?;
            prot.write_string(comment).await?;
            prot.write_field_end().await?;
        }
        prot.write_field_stop().await?;
        prot.write_struct_end().await
    }
}

/// Declared exception for impossible work.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InvalidOperation {
    pub what_op: i32,
    pub why: String,
}

impl InvalidOperation {
    pub async fn read(prot: &mut dyn Protocol) -> Result<Self, ProtocolError> {
        let mut out = InvalidOperation::default();
        prot.read_struct_begin().await?;
        loop {
            let field = prot.read_field_begin().await?;
            if field.is_stop() {
                break;
            }
            match (field.id, field.tag) {
                (1, TypeTag::I32) => out.what_op = prot.read_i32().await?,
                (2, TypeTag::String) => out.why = prot.read_string().await?,
                (_, tag) => skip(prot, tag).await?,
            }
            prot.read_field_end().await?;
        }
        prot.read_struct_end().await?;
        Ok(out)
    }

    pub async fn write(&self, prot: &mut dyn Protocol) -> Result<(), ProtocolError> {
        prot.write_struct_begin("InvalidOperation").await?;
        prot.write_field_begin("what_op", TypeTag::I32, 1).await?;
        prot.write_i32(self.what_op).await?;
        prot.write_field_end().await?;
        prot.write_field_begin("why", TypeTag::String, 2).await?;
        prot.write_string(&self.why).await?;
        prot.write_field_end().await?;
        prot.write_field_stop().await?;
        prot.write_struct_end().await
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CalculateArgs {
    pub logid: i32,
    pub work: Work,
}

impl CalculateArgs {
    pub async fn read(prot: &mut dyn Protocol) -> Result<Self, ProtocolError> {
        let mut args = CalculateArgs::default();
        prot.read_struct_begin().await?;
        loop {
            let field = prot.read_field_begin().await?;
            if field.is_stop() {
                break;
            }
            match (field.id, field.tag) {
                (1, TypeTag::I32) => args.logid = prot.read_i32().await?,
                (2, TypeTag::Struct) => args.work = Work::read(prot).await?,
                (_, tag) => skip(prot, tag).await?,
            }
            prot.read_field_end().await?;
        }
        prot.read_struct_end().await?;
        Ok(args)
    }

    pub async fn write(&self, prot: &mut dyn Protocol) -> Result<(), ProtocolError> {
        prot.write_struct_begin("calculate_args").await?;
        prot.write_field_begin("logid", TypeTag::I32, 1).await?;
        prot.write_i32(self.logid).await?;
        prot.write_field_end().await?;
        prot.write_field_begin("work", TypeTag::Struct, 2).await?;
        self.work.write(prot).await?;
        prot.write_field_end().await?;
        prot.write_field_stop().await?;
        prot.write_struct_end().await
    }
}

/// Result struct: field 0 carries success, field 1 the declared exception.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CalculateResult {
    pub success: Option<i32>,
    pub ouch: Option<InvalidOperation>,
}

impl CalculateResult {
    pub async fn read(prot: &mut dyn Protocol) -> Result<Self, ProtocolError> {
        let mut result = CalculateResult::default();
        prot.read_struct_begin().await?;
        loop {
            let field = prot.read_field_begin().await?;
            if field.is_stop() {
                break;
            }
            match (field.id, field.tag) {
                (0, TypeTag::I32) => result.success = Some(prot.read_i32().await?),
                (1, TypeTag::Struct) => result.ouch = Some(InvalidOperation::read(prot).await?),
                (_, tag) => skip(prot, tag).await?,
            }
            prot.read_field_end().await?;
        }
        prot.read_struct_end().await?;
        Ok(result)
    }

    pub async fn write(&self, prot: &mut dyn Protocol) -> Result<(), ProtocolError> {
        prot.write_struct_begin("calculate_result").await?;
        if let Some(success) = self.success {
            prot.write_field_begin("success", TypeTag::I32, 0).await?;
            prot.write_i32(success).await?;
            prot.write_field_end().await?;
        }
        if let Some(ouch) = &self.ouch {
            prot.write_field_begin("ouch", TypeTag::Struct, 1).await?;
            ouch.write(prot).await?;
            prot.write_field_end().await?;
        }
        prot.write_field_stop().await?;
        prot.write_struct_end().await
    }
}

fn run(work: &Work) -> Result<i32, InvalidOperation> {
    match work.op {
        Operation::Add => Ok(work.num1.wrapping_add(work.num2)),
        Operation::Subtract => Ok(work.num1.wrapping_sub(work.num2)),
        Operation::Multiply => Ok(work.num1.wrapping_mul(work.num2)),
        Operation::Divide => {
            if work.num2 == 0 {
                Err(InvalidOperation {
                    what_op: work.op as i32,
                    why: "cannot divide by 0".into(),
                })
            } else {
                Ok(work.num1 / work.num2)
            }
        }
    }
}

struct CalculateHandler;

#[async_trait]
impl MethodHandler for CalculateHandler {
    async fn handle(
        &self,
        kind: MessageKind,
        seq_id: i32,
        input: &mut dyn Protocol,
        output: &mut dyn Protocol,
    ) -> Result<(), ProtocolError> {
        let args = CalculateArgs::read(input).await?;
        input.read_message_end().await?;

        let result = match run(&args.work) {
            Ok(value) => CalculateResult {
                success: Some(value),
                ouch: None,
            },
            Err(ouch) => CalculateResult {
                success: None,
                ouch: Some(ouch),
            },
        };

        if kind == MessageKind::Oneway {
            return Ok(());
        }
        output
            .write_message_begin("calculate", MessageKind::Reply, seq_id)
            .await?;
        result.write(output).await?;
        output.write_message_end().await
    }
}

/// A processor serving the calculator service.
pub fn calculator_processor() -> ServiceProcessor {
    ServiceProcessor::new().with_method("calculate", Box::new(CalculateHandler))
}

/// What `calculate` can return to the caller.
#[derive(Debug, thiserror::Error)]
pub enum CalculateError {
    #[error("invalid operation: {}", .0.why)]
    InvalidOperation(InvalidOperation),
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Generated-style client for the calculator service.
pub struct CalculatorClient {
    core: ClientCore,
}

impl CalculatorClient {
    pub fn new(input: Box<dyn Protocol>, output: Box<dyn Protocol>) -> Self {
        Self {
            core: ClientCore::new(input, output),
        }
    }

    pub async fn calculate(&mut self, logid: i32, work: &Work) -> Result<i32, CalculateError> {
        let seq_id = self.core.next_seq_id();
        self.core
            .output
            .write_message_begin("calculate", MessageKind::Call, seq_id)
            .await
            .map_err(ClientError::from)?;
        let args = CalculateArgs {
            logid,
            work: work.clone(),
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

        self.core.read_reply_envelope("calculate", seq_id).await?;
        let result = CalculateResult::read(self.core.input.as_mut())
            .await
            .map_err(ClientError::from)?;
        self.core
            .input
            .read_message_end()
            .await
            .map_err(ClientError::from)?;

        if let Some(ouch) = result.ouch {
            return Err(CalculateError::InvalidOperation(ouch));
        }
        match result.success {
            Some(value) => Ok(value),
            None => Err(CalculateError::Client(ClientError::Application(
                weft_core::ApplicationError::new(
                    weft_core::ApplicationErrorKind::MissingResult,
                    "calculate returned no result",
                ),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_protocol::{BinaryProtocol, CompactProtocol, JsonProtocol};
    use weft_transport::MemoryBuffer;

    fn sample_work() -> Work {
        Work {
            num1: 25,
            num2: 102,
            op: Operation::Add,
            comment: Some("Add: 25 + 102".into()),
        }
    }

    #[tokio::test]
    async fn work_round_trips_across_all_canonical_protocols() {
        let work = sample_work();

        let mut p = BinaryProtocol::new(MemoryBuffer::new());
        work.write(&mut p).await.unwrap();
        assert_eq!(Work::read(&mut p).await.unwrap(), work);

        let mut p = CompactProtocol::new(MemoryBuffer::new());
        work.write(&mut p).await.unwrap();
        assert_eq!(Work::read(&mut p).await.unwrap(), work);

        let mut p = JsonProtocol::new(MemoryBuffer::new());
        work.write(&mut p).await.unwrap();
        assert_eq!(Work::read(&mut p).await.unwrap(), work);
    }

    #[tokio::test]
    async fn absent_optional_fields_stay_absent() {
        let work = Work {
            num1: 1,
            num2: 2,
            op: Operation::Multiply,
            comment: None,
        };
        let mut p = BinaryProtocol::new(MemoryBuffer::new());
        work.write(&mut p).await.unwrap();
        assert_eq!(Work::read(&mut p).await.unwrap(), work);
    }

    #[tokio::test]
    async fn result_struct_uses_field_zero_for_success() {
        let result = CalculateResult {
            success: Some(127),
            ouch: None,
        };
        let mut p = BinaryProtocol::new(MemoryBuffer::new());
        result.write(&mut p).await.unwrap();

        p.read_struct_begin().await.unwrap();
        let field = p.read_field_begin().await.unwrap();
        assert_eq!(field.id, 0);
        assert_eq!(p.read_i32().await.unwrap(), 127);
    }

    #[test]
    fn division_by_zero_is_a_declared_exception() {
        let work = Work {
            num1: 10,
            num2: 0,
            op: Operation::Divide,
            comment: None,
        };
        let err = run(&work).unwrap_err();
        assert_eq!(err.what_op, Operation::Divide as i32);
    }
}
