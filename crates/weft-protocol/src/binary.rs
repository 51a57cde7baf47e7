//! Fixed-width big-endian binary encoding.

use async_trait::async_trait;
use weft_core::{
    FieldHeader, ListHeader, MapHeader, MessageEnvelope, MessageKind, ProtocolError, SetHeader,
    TypeTag,
};
use weft_transport::Transport;

use crate::{Protocol, ProtocolFactory};

/// Strict-mode envelope magic, ORed with the message kind.
pub const VERSION_1: u32 = 0x8001_0000;
/// Mask isolating the version half of a strict envelope word.
pub const VERSION_MASK: u32 = 0xffff_0000;
const KIND_MASK: u32 = 0x0000_00ff;

/// The binary protocol: integers as big-endian two's-complement, doubles
/// bit-cast through i64, strings length-prefixed with an i32.
///
/// The message envelope has two modes. Strict write emits
/// `VERSION_1 | kind` as a leading i32; lax write emits the name first. A
/// reader that sees a non-negative leading i32 is looking at a lax
/// envelope and fails with `BAD_VERSION` if `strict_read` is set.
pub struct BinaryProtocol<T = Box<dyn Transport>> {
    transport: T,
    strict_read: bool,
    strict_write: bool,
}

impl<T: Transport + 'static> BinaryProtocol<T> {
    /// Defaults to strict write and lax read, the interoperable pairing.
    pub fn new(transport: T) -> Self {
        Self::with_strictness(transport, false, true)
    }

    pub fn with_strictness(transport: T, strict_read: bool, strict_write: bool) -> Self {
        Self {
            transport,
            strict_read,
            strict_write,
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.transport
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    async fn write_u8(&mut self, value: u8) -> Result<(), ProtocolError> {
        self.transport.write_all(&[value]).await?;
        Ok(())
    }

    async fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        let mut b = [0u8; 1];
        self.transport.read_exact(&mut b).await?;
        Ok(b[0])
    }

    async fn read_len(&mut self) -> Result<usize, ProtocolError> {
        let len = self.read_i32_value().await?;
        if len < 0 {
            return Err(ProtocolError::NegativeSize(len as i64));
        }
        Ok(len as usize)
    }

    async fn read_i32_value(&mut self) -> Result<i32, ProtocolError> {
        let mut b = [0u8; 4];
        self.transport.read_exact(&mut b).await?;
        Ok(i32::from_be_bytes(b))
    }

    async fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = vec![0u8; len];
        self.transport.read_exact(&mut buf).await?;
        Ok(buf)
    }
}

#[async_trait]
impl<T: Transport + 'static> Protocol for BinaryProtocol<T> {
    async fn write_message_begin(
        &mut self,
        name: &str,
        kind: MessageKind,
        seq_id: i32,
    ) -> Result<(), ProtocolError> {
        if self.strict_write {
            let header = VERSION_1 | kind.as_wire() as u32;
            self.write_i32(header as i32).await?;
            self.write_string(name).await?;
            self.write_i32(seq_id).await
        } else {
            self.write_string(name).await?;
            self.write_u8(kind.as_wire()).await?;
            self.write_i32(seq_id).await
        }
    }

    async fn write_message_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn write_struct_begin(&mut self, _name: &str) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn write_struct_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn write_field_begin(
        &mut self,
        _name: &str,
        tag: TypeTag,
        id: i16,
    ) -> Result<(), ProtocolError> {
        self.write_u8(tag.as_wire()).await?;
        self.write_i16(id).await
    }

    async fn write_field_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn write_field_stop(&mut self) -> Result<(), ProtocolError> {
        self.write_u8(TypeTag::Stop.as_wire()).await
    }

    async fn write_map_begin(&mut self, header: MapHeader) -> Result<(), ProtocolError> {
        self.write_u8(header.key_tag.as_wire()).await?;
        self.write_u8(header.value_tag.as_wire()).await?;
        self.write_i32(header.size as i32).await
    }

    async fn write_map_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn write_list_begin(&mut self, header: ListHeader) -> Result<(), ProtocolError> {
        self.write_u8(header.elem_tag.as_wire()).await?;
        self.write_i32(header.size as i32).await
    }

    async fn write_list_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn write_set_begin(&mut self, header: SetHeader) -> Result<(), ProtocolError> {
        self.write_u8(header.elem_tag.as_wire()).await?;
        self.write_i32(header.size as i32).await
    }

    async fn write_set_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn write_bool(&mut self, value: bool) -> Result<(), ProtocolError> {
        self.write_u8(value as u8).await
    }

    async fn write_byte(&mut self, value: i8) -> Result<(), ProtocolError> {
        self.write_u8(value as u8).await
    }

    async fn write_i16(&mut self, value: i16) -> Result<(), ProtocolError> {
        self.transport.write_all(&value.to_be_bytes()).await?;
        Ok(())
    }

    async fn write_i32(&mut self, value: i32) -> Result<(), ProtocolError> {
        self.transport.write_all(&value.to_be_bytes()).await?;
        Ok(())
    }

    async fn write_i64(&mut self, value: i64) -> Result<(), ProtocolError> {
        self.transport.write_all(&value.to_be_bytes()).await?;
        Ok(())
    }

    async fn write_double(&mut self, value: f64) -> Result<(), ProtocolError> {
        self.transport.write_all(&value.to_bits().to_be_bytes()).await?;
        Ok(())
    }

    async fn write_string(&mut self, value: &str) -> Result<(), ProtocolError> {
        self.write_binary(value.as_bytes()).await
    }

    async fn write_binary(&mut self, value: &[u8]) -> Result<(), ProtocolError> {
        self.write_i32(value.len() as i32).await?;
        self.transport.write_all(value).await?;
        Ok(())
    }

    async fn read_message_begin(&mut self) -> Result<MessageEnvelope, ProtocolError> {
        let first = self.read_i32_value().await?;
        if first < 0 {
            let version = first as u32 & VERSION_MASK;
            if version != VERSION_1 {
                return Err(ProtocolError::BadVersion(format!(
                    "bad version word {first:#010x} in message header"
                )));
            }
            let kind = MessageKind::from_wire((first as u32 & KIND_MASK) as u8)?;
            let name = self.read_string().await?;
            let seq_id = self.read_i32_value().await?;
            Ok(MessageEnvelope::new(name, kind, seq_id))
        } else {
            if self.strict_read {
                return Err(ProtocolError::BadVersion(
                    "missing version word in message header".into(),
                ));
            }
            let name_bytes = self.read_bytes(first as usize).await?;
            let name = String::from_utf8(name_bytes)
                .map_err(|e| ProtocolError::InvalidData(format!("message name: {e}")))?;
            let kind = MessageKind::from_wire(self.read_u8().await?)?;
            let seq_id = self.read_i32_value().await?;
            Ok(MessageEnvelope::new(name, kind, seq_id))
        }
    }

    async fn read_message_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn read_struct_begin(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn read_struct_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn read_field_begin(&mut self) -> Result<FieldHeader, ProtocolError> {
        let tag = TypeTag::from_wire(self.read_u8().await?)?;
        if tag == TypeTag::Stop {
            return Ok(FieldHeader::stop());
        }
        let id = self.read_i16().await?;
        Ok(FieldHeader::new(tag, id))
    }

    async fn read_field_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn read_map_begin(&mut self) -> Result<MapHeader, ProtocolError> {
        let key_tag = TypeTag::from_wire(self.read_u8().await?)?;
        let value_tag = TypeTag::from_wire(self.read_u8().await?)?;
        let size = self.read_len().await?;
        Ok(MapHeader {
            key_tag,
            value_tag,
            size,
        })
    }

    async fn read_map_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn read_list_begin(&mut self) -> Result<ListHeader, ProtocolError> {
        let elem_tag = TypeTag::from_wire(self.read_u8().await?)?;
        let size = self.read_len().await?;
        Ok(ListHeader { elem_tag, size })
    }

    async fn read_list_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn read_set_begin(&mut self) -> Result<SetHeader, ProtocolError> {
        let elem_tag = TypeTag::from_wire(self.read_u8().await?)?;
        let size = self.read_len().await?;
        Ok(SetHeader { elem_tag, size })
    }

    async fn read_set_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_u8().await? != 0)
    }

    async fn read_byte(&mut self) -> Result<i8, ProtocolError> {
        Ok(self.read_u8().await? as i8)
    }

    async fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        let mut b = [0u8; 2];
        self.transport.read_exact(&mut b).await?;
        Ok(i16::from_be_bytes(b))
    }

    async fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        self.read_i32_value().await
    }

    async fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        let mut b = [0u8; 8];
        self.transport.read_exact(&mut b).await?;
        Ok(i64::from_be_bytes(b))
    }

    async fn read_double(&mut self) -> Result<f64, ProtocolError> {
        let mut b = [0u8; 8];
        self.transport.read_exact(&mut b).await?;
        Ok(f64::from_bits(u64::from_be_bytes(b)))
    }

    async fn read_string(&mut self) -> Result<String, ProtocolError> {
        let bytes = self.read_binary().await?;
        String::from_utf8(bytes).map_err(|e| ProtocolError::InvalidData(format!("string: {e}")))
    }

    async fn read_binary(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let len = self.read_len().await?;
        self.read_bytes(len).await
    }

    async fn flush(&mut self) -> Result<(), ProtocolError> {
        self.transport.flush().await?;
        Ok(())
    }

    fn transport_mut(&mut self) -> &mut dyn Transport {
        &mut self.transport
    }
}

/// Factory for [`BinaryProtocol`] instances with fixed strictness flags.
#[derive(Debug, Clone, Copy)]
pub struct BinaryFactory {
    strict_read: bool,
    strict_write: bool,
}

impl BinaryFactory {
    pub fn new(strict_read: bool, strict_write: bool) -> Self {
        Self {
            strict_read,
            strict_write,
        }
    }
}

impl Default for BinaryFactory {
    fn default() -> Self {
        Self::new(false, true)
    }
}

impl ProtocolFactory for BinaryFactory {
    fn protocol(&self, transport: Box<dyn Transport>) -> Box<dyn Protocol> {
        Box::new(BinaryProtocol::with_strictness(
            transport,
            self.strict_read,
            self.strict_write,
        ))
    }
}
