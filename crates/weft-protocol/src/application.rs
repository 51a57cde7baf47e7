//! Wire form of the application-error envelope.
//!
//! An EXCEPTION message's body is a struct with field 1 = message (string)
//! and field 2 = code (i32). Readers tolerate unknown fields by skipping
//! them, so the envelope can grow without breaking old peers.

use weft_core::{ApplicationError, ApplicationErrorKind, ProtocolError, TypeTag};

use crate::{skip, Protocol};

/// Encode `err` as the standard exception struct.
pub async fn write_application_error(
    prot: &mut dyn Protocol,
    err: &ApplicationError,
) -> Result<(), ProtocolError> {
    prot.write_struct_begin("ApplicationError").await?;
    if !err.message.is_empty() {
        prot.write_field_begin("message", TypeTag::String, 1).await?;
        prot.write_string(&err.message).await?;
        prot.write_field_end().await?;
    }
    prot.write_field_begin("type", TypeTag::I32, 2).await?;
    prot.write_i32(err.kind.code()).await?;
    prot.write_field_end().await?;
    prot.write_field_stop().await?;
    prot.write_struct_end().await
}

/// Decode the standard exception struct.
pub async fn read_application_error(
    prot: &mut dyn Protocol,
) -> Result<ApplicationError, ProtocolError> {
    let mut message = String::new();
    let mut kind = ApplicationErrorKind::Unknown;

    prot.read_struct_begin().await?;
    loop {
        let field = prot.read_field_begin().await?;
        if field.is_stop() {
            break;
        }
        match (field.id, field.tag) {
            (1, TypeTag::String) => message = prot.read_string().await?,
            (2, TypeTag::I32) => kind = ApplicationErrorKind::from_code(prot.read_i32().await?),
            (_, tag) => skip(prot, tag).await?,
        }
        prot.read_field_end().await?;
    }
    prot.read_struct_end().await?;
    Ok(ApplicationError::new(kind, message))
}
