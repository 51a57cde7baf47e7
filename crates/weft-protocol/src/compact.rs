//! Variable-length compact encoding: zig-zag varints, delta-coded field
//! ids, and header-folded struct booleans.

use async_trait::async_trait;
use weft_core::{
    FieldHeader, ListHeader, MapHeader, MessageEnvelope, MessageKind, ProtocolError, SetHeader,
    TypeTag,
};
use weft_transport::Transport;

use crate::{Protocol, ProtocolFactory};

/// Leading byte of every compact message.
pub const PROTOCOL_ID: u8 = 0x82;
/// Wire version carried in the low five bits of the second byte.
pub const VERSION: u8 = 1;
const VERSION_MASK: u8 = 0x1f;
const KIND_SHIFT: u8 = 5;

// Compact type codes, distinct from the abstract wire-type codes.
const CT_STOP: u8 = 0;
const CT_BOOL_TRUE: u8 = 1;
const CT_BOOL_FALSE: u8 = 2;
const CT_BYTE: u8 = 3;
const CT_I16: u8 = 4;
const CT_I32: u8 = 5;
const CT_I64: u8 = 6;
const CT_DOUBLE: u8 = 7;
const CT_BINARY: u8 = 8;
const CT_LIST: u8 = 9;
const CT_SET: u8 = 10;
const CT_MAP: u8 = 11;
const CT_STRUCT: u8 = 12;

fn compact_type(tag: TypeTag) -> Result<u8, ProtocolError> {
    Ok(match tag {
        TypeTag::Stop => CT_STOP,
        TypeTag::Bool => CT_BOOL_TRUE,
        TypeTag::Byte => CT_BYTE,
        TypeTag::I16 => CT_I16,
        TypeTag::I32 | TypeTag::Enum => CT_I32,
        TypeTag::I64 => CT_I64,
        TypeTag::Double => CT_DOUBLE,
        TypeTag::String => CT_BINARY,
        TypeTag::List => CT_LIST,
        TypeTag::Set => CT_SET,
        TypeTag::Map => CT_MAP,
        TypeTag::Struct => CT_STRUCT,
        other => {
            return Err(ProtocolError::InvalidData(format!(
                "type {other} has no compact encoding"
            )))
        }
    })
}

fn tag_from_compact(ct: u8) -> Result<TypeTag, ProtocolError> {
    Ok(match ct {
        CT_STOP => TypeTag::Stop,
        CT_BOOL_TRUE | CT_BOOL_FALSE => TypeTag::Bool,
        CT_BYTE => TypeTag::Byte,
        CT_I16 => TypeTag::I16,
        CT_I32 => TypeTag::I32,
        CT_I64 => TypeTag::I64,
        CT_DOUBLE => TypeTag::Double,
        CT_BINARY => TypeTag::String,
        CT_LIST => TypeTag::List,
        CT_SET => TypeTag::Set,
        CT_MAP => TypeTag::Map,
        CT_STRUCT => TypeTag::Struct,
        other => {
            return Err(ProtocolError::InvalidData(format!(
                "unknown compact type {other}"
            )))
        }
    })
}

const fn zigzag32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

const fn unzigzag32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

const fn zigzag64(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

const fn unzigzag64(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// The compact protocol.
///
/// Struct field headers pack the id as a delta from the previous field id
/// in the same struct; struct booleans fold their value into the header's
/// type nibble. Booleans inside containers are one-byte bodies.
pub struct CompactProtocol<T = Box<dyn Transport>> {
    transport: T,
    /// Previous field id within the current struct.
    last_field_id: i16,
    /// Saved `last_field_id` values of enclosing structs.
    field_id_stack: Vec<i16>,
    /// Field id of a bool field whose header is deferred until the value
    /// arrives at `write_bool`.
    pending_bool_write: Option<i16>,
    /// Bool value recovered from a folded field header, served by the next
    /// `read_bool`.
    pending_bool_read: Option<bool>,
}

impl<T: Transport + 'static> CompactProtocol<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            last_field_id: 0,
            field_id_stack: Vec::new(),
            pending_bool_write: None,
            pending_bool_read: None,
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

    async fn write_varint(&mut self, mut value: u64) -> Result<(), ProtocolError> {
        let mut buf = [0u8; 10];
        let mut i = 0;
        loop {
            if value & !0x7f == 0 {
                buf[i] = value as u8;
                i += 1;
                break;
            }
            buf[i] = (value as u8 & 0x7f) | 0x80;
            i += 1;
            value >>= 7;
        }
        self.transport.write_all(&buf[..i]).await?;
        Ok(())
    }

    async fn read_varint(&mut self) -> Result<u64, ProtocolError> {
        let mut result = 0u64;
        let mut shift = 0;
        loop {
            let b = self.read_u8().await?;
            if shift >= 64 {
                return Err(ProtocolError::InvalidData("varint too long".into()));
            }
            result |= u64::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    async fn read_varint32(&mut self) -> Result<u32, ProtocolError> {
        let v = self.read_varint().await?;
        u32::try_from(v).map_err(|_| ProtocolError::InvalidData("varint exceeds 32 bits".into()))
    }

    async fn read_size(&mut self) -> Result<usize, ProtocolError> {
        let v = self.read_varint32().await?;
        if v > i32::MAX as u32 {
            return Err(ProtocolError::SizeLimit(v as usize));
        }
        Ok(v as usize)
    }

    async fn write_field_header(&mut self, ct: u8, id: i16) -> Result<(), ProtocolError> {
        let delta = id as i32 - self.last_field_id as i32;
        if (1..=15).contains(&delta) {
            self.write_u8(((delta as u8) << 4) | ct).await?;
        } else {
            self.write_u8(ct).await?;
            self.write_varint(zigzag32(id as i32) as u64).await?;
        }
        self.last_field_id = id;
        Ok(())
    }

    async fn read_zigzag_i16(&mut self) -> Result<i16, ProtocolError> {
        let v = unzigzag32(self.read_varint32().await?);
        i16::try_from(v).map_err(|_| ProtocolError::InvalidData(format!("field id {v} overflows i16")))
    }
}

#[async_trait]
impl<T: Transport + 'static> Protocol for CompactProtocol<T> {
    async fn write_message_begin(
        &mut self,
        name: &str,
        kind: MessageKind,
        seq_id: i32,
    ) -> Result<(), ProtocolError> {
        self.write_u8(PROTOCOL_ID).await?;
        self.write_u8((VERSION & VERSION_MASK) | (kind.as_wire() << KIND_SHIFT))
            .await?;
        self.write_varint(seq_id as u32 as u64).await?;
        self.write_string(name).await
    }

    async fn write_message_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn write_struct_begin(&mut self, _name: &str) -> Result<(), ProtocolError> {
        self.field_id_stack.push(self.last_field_id);
        self.last_field_id = 0;
        Ok(())
    }

    async fn write_struct_end(&mut self) -> Result<(), ProtocolError> {
        self.last_field_id = self.field_id_stack.pop().unwrap_or(0);
        Ok(())
    }

    async fn write_field_begin(
        &mut self,
        _name: &str,
        tag: TypeTag,
        id: i16,
    ) -> Result<(), ProtocolError> {
        if tag == TypeTag::Bool {
            // Header is deferred so the value can be folded into it.
            self.pending_bool_write = Some(id);
            return Ok(());
        }
        let ct = compact_type(tag)?;
        self.write_field_header(ct, id).await
    }

    async fn write_field_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn write_field_stop(&mut self) -> Result<(), ProtocolError> {
        self.write_u8(CT_STOP).await
    }

    async fn write_map_begin(&mut self, header: MapHeader) -> Result<(), ProtocolError> {
        self.write_varint(header.size as u64).await?;
        if header.size > 0 {
            let kt = compact_type(header.key_tag)?;
            let vt = compact_type(header.value_tag)?;
            self.write_u8((kt << 4) | vt).await?;
        }
        Ok(())
    }

    async fn write_map_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn write_list_begin(&mut self, header: ListHeader) -> Result<(), ProtocolError> {
        let et = compact_type(header.elem_tag)?;
        if header.size < 15 {
            self.write_u8(((header.size as u8) << 4) | et).await
        } else {
            self.write_u8(0xf0 | et).await?;
            self.write_varint(header.size as u64).await
        }
    }

    async fn write_list_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn write_set_begin(&mut self, header: SetHeader) -> Result<(), ProtocolError> {
        self.write_list_begin(ListHeader {
            elem_tag: header.elem_tag,
            size: header.size,
        })
        .await
    }

    async fn write_set_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn write_bool(&mut self, value: bool) -> Result<(), ProtocolError> {
        let ct = if value { CT_BOOL_TRUE } else { CT_BOOL_FALSE };
        match self.pending_bool_write.take() {
            Some(id) => self.write_field_header(ct, id).await,
            None => self.write_u8(ct).await,
        }
    }

    async fn write_byte(&mut self, value: i8) -> Result<(), ProtocolError> {
        self.write_u8(value as u8).await
    }

    async fn write_i16(&mut self, value: i16) -> Result<(), ProtocolError> {
        self.write_varint(zigzag32(value as i32) as u64).await
    }

    async fn write_i32(&mut self, value: i32) -> Result<(), ProtocolError> {
        self.write_varint(zigzag32(value) as u64).await
    }

    async fn write_i64(&mut self, value: i64) -> Result<(), ProtocolError> {
        self.write_varint(zigzag64(value)).await
    }

    async fn write_double(&mut self, value: f64) -> Result<(), ProtocolError> {
        self.transport.write_all(&value.to_bits().to_le_bytes()).await?;
        Ok(())
    }

    async fn write_string(&mut self, value: &str) -> Result<(), ProtocolError> {
        self.write_binary(value.as_bytes()).await
    }

    async fn write_binary(&mut self, value: &[u8]) -> Result<(), ProtocolError> {
        self.write_varint(value.len() as u64).await?;
        self.transport.write_all(value).await?;
        Ok(())
    }

    async fn read_message_begin(&mut self) -> Result<MessageEnvelope, ProtocolError> {
        let id = self.read_u8().await?;
        if id != PROTOCOL_ID {
            return Err(ProtocolError::BadVersion(format!(
                "expected compact protocol id {PROTOCOL_ID:#04x}, got {id:#04x}"
            )));
        }
        let word = self.read_u8().await?;
        let version = word & VERSION_MASK;
        if version != VERSION {
            return Err(ProtocolError::BadVersion(format!(
                "compact version {version}, expected {VERSION}"
            )));
        }
        let kind = MessageKind::from_wire((word >> KIND_SHIFT) & 0x07)?;
        let seq_id = self.read_varint32().await? as i32;
        let name = self.read_string().await?;
        Ok(MessageEnvelope::new(name, kind, seq_id))
    }

    async fn read_message_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn read_struct_begin(&mut self) -> Result<(), ProtocolError> {
        self.field_id_stack.push(self.last_field_id);
        self.last_field_id = 0;
        Ok(())
    }

    async fn read_struct_end(&mut self) -> Result<(), ProtocolError> {
        self.last_field_id = self.field_id_stack.pop().unwrap_or(0);
        Ok(())
    }

    async fn read_field_begin(&mut self) -> Result<FieldHeader, ProtocolError> {
        let byte = self.read_u8().await?;
        if byte == CT_STOP {
            return Ok(FieldHeader::stop());
        }
        let ct = byte & 0x0f;
        let delta = (byte >> 4) & 0x0f;
        let id = if delta == 0 {
            self.read_zigzag_i16().await?
        } else {
            self.last_field_id
                .checked_add(delta as i16)
                .ok_or_else(|| ProtocolError::InvalidData("field id overflow".into()))?
        };
        self.last_field_id = id;
        match ct {
            CT_BOOL_TRUE => self.pending_bool_read = Some(true),
            CT_BOOL_FALSE => self.pending_bool_read = Some(false),
            _ => {}
        }
        Ok(FieldHeader::new(tag_from_compact(ct)?, id))
    }

    async fn read_field_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn read_map_begin(&mut self) -> Result<MapHeader, ProtocolError> {
        let size = self.read_size().await?;
        let (key_tag, value_tag) = if size > 0 {
            let kv = self.read_u8().await?;
            (tag_from_compact(kv >> 4)?, tag_from_compact(kv & 0x0f)?)
        } else {
            (TypeTag::Stop, TypeTag::Stop)
        };
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
        let byte = self.read_u8().await?;
        let elem_tag = tag_from_compact(byte & 0x0f)?;
        let nibble = (byte >> 4) & 0x0f;
        let size = if nibble == 15 {
            self.read_size().await?
        } else {
            nibble as usize
        };
        Ok(ListHeader { elem_tag, size })
    }

    async fn read_list_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn read_set_begin(&mut self) -> Result<SetHeader, ProtocolError> {
        let header = self.read_list_begin().await?;
        Ok(SetHeader {
            elem_tag: header.elem_tag,
            size: header.size,
        })
    }

    async fn read_set_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        if let Some(folded) = self.pending_bool_read.take() {
            return Ok(folded);
        }
        Ok(self.read_u8().await? == CT_BOOL_TRUE)
    }

    async fn read_byte(&mut self) -> Result<i8, ProtocolError> {
        Ok(self.read_u8().await? as i8)
    }

    async fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        let v = unzigzag32(self.read_varint32().await?);
        i16::try_from(v).map_err(|_| ProtocolError::InvalidData(format!("{v} overflows i16")))
    }

    async fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(unzigzag32(self.read_varint32().await?))
    }

    async fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        Ok(unzigzag64(self.read_varint().await?))
    }

    async fn read_double(&mut self) -> Result<f64, ProtocolError> {
        let mut b = [0u8; 8];
        self.transport.read_exact(&mut b).await?;
        Ok(f64::from_bits(u64::from_le_bytes(b)))
    }

    async fn read_string(&mut self) -> Result<String, ProtocolError> {
        let bytes = self.read_binary().await?;
        String::from_utf8(bytes).map_err(|e| ProtocolError::InvalidData(format!("string: {e}")))
    }

    async fn read_binary(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let len = self.read_size().await?;
        let mut buf = vec![0u8; len];
        self.transport.read_exact(&mut buf).await?;
        Ok(buf)
    }

    async fn flush(&mut self) -> Result<(), ProtocolError> {
        self.transport.flush().await?;
        Ok(())
    }

    fn transport_mut(&mut self) -> &mut dyn Transport {
        &mut self.transport
    }
}

/// Factory for [`CompactProtocol`] instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompactFactory;

impl ProtocolFactory for CompactFactory {
    fn protocol(&self, transport: Box<dyn Transport>) -> Box<dyn Protocol> {
        Box::new(CompactProtocol::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_transport::MemoryBuffer;

    fn prot() -> CompactProtocol<MemoryBuffer> {
        CompactProtocol::new(MemoryBuffer::new())
    }

    #[test]
    fn zigzag_maps_small_magnitudes_small() {
        assert_eq!(zigzag32(0), 0);
        assert_eq!(zigzag32(-1), 1);
        assert_eq!(zigzag32(1), 2);
        assert_eq!(zigzag32(-2), 3);
        assert_eq!(zigzag64(i64::MIN), u64::MAX);
        for v in [0, 1, -1, 127, -128, 32767, -32768, i32::MAX, i32::MIN] {
            assert_eq!(unzigzag32(zigzag32(v)), v);
        }
        for v in [0i64, -35184372088719, i64::MAX, i64::MIN] {
            assert_eq!(unzigzag64(zigzag64(v)), v);
        }
    }

    #[tokio::test]
    async fn small_ints_take_one_byte() {
        let mut p = prot();
        p.write_i32(1).await.unwrap();
        assert_eq!(p.get_ref().bytes(), &[0x02]);
        assert_eq!(p.read_i32().await.unwrap(), 1);

        let mut p = prot();
        p.write_i64(-1).await.unwrap();
        assert_eq!(p.get_ref().bytes(), &[0x01]);
        assert_eq!(p.read_i64().await.unwrap(), -1);
    }

    #[tokio::test]
    async fn message_envelope_round_trips() {
        let mut p = prot();
        p.write_message_begin("calculate", MessageKind::Call, 35)
            .await
            .unwrap();

        let wire = p.get_ref().bytes().to_vec();
        assert_eq!(wire[0], PROTOCOL_ID);
        assert_eq!(wire[1] & VERSION_MASK, VERSION);
        assert_eq!(wire[1] >> KIND_SHIFT, MessageKind::Call.as_wire());

        let envelope = p.read_message_begin().await.unwrap();
        assert_eq!(
            envelope,
            MessageEnvelope::new("calculate", MessageKind::Call, 35)
        );
    }

    #[tokio::test]
    async fn bad_protocol_id_is_rejected() {
        let mut p = CompactProtocol::new(MemoryBuffer::with_bytes(&[0x80, 0x21]));
        assert!(matches!(
            p.read_message_begin().await,
            Err(ProtocolError::BadVersion(_))
        ));
    }

    #[tokio::test]
    async fn short_field_deltas_pack_into_one_byte() {
        let mut p = prot();
        p.write_struct_begin("s").await.unwrap();
        p.write_field_begin("a", TypeTag::I32, 1).await.unwrap();
        p.write_i32(5).await.unwrap();
        p.write_field_end().await.unwrap();
        p.write_field_begin("b", TypeTag::I32, 2).await.unwrap();
        p.write_i32(6).await.unwrap();
        p.write_field_end().await.unwrap();
        p.write_field_stop().await.unwrap();
        p.write_struct_end().await.unwrap();

        // (delta=1)<<4 | I32, value, (delta=1)<<4 | I32, value, stop
        assert_eq!(p.get_ref().bytes(), &[0x15, 0x0a, 0x15, 0x0c, 0x00]);
    }

    #[tokio::test]
    async fn wide_field_ids_fall_back_to_explicit_encoding() {
        let mut p = prot();
        p.write_struct_begin("s").await.unwrap();
        p.write_field_begin("a", TypeTag::I32, 4000).await.unwrap();
        p.write_i32(1).await.unwrap();
        p.write_field_end().await.unwrap();
        p.write_field_stop().await.unwrap();
        p.write_struct_end().await.unwrap();

        p.read_struct_begin().await.unwrap();
        let field = p.read_field_begin().await.unwrap();
        assert_eq!(field.id, 4000);
        assert_eq!(field.tag, TypeTag::I32);
    }

    #[tokio::test]
    async fn struct_bools_fold_into_the_header() {
        let mut p = prot();
        p.write_struct_begin("s").await.unwrap();
        p.write_field_begin("flag", TypeTag::Bool, 1).await.unwrap();
        p.write_bool(true).await.unwrap();
        p.write_field_end().await.unwrap();
        p.write_field_begin("flag2", TypeTag::Bool, 2).await.unwrap();
        p.write_bool(false).await.unwrap();
        p.write_field_end().await.unwrap();
        p.write_field_stop().await.unwrap();
        p.write_struct_end().await.unwrap();

        // Two one-byte headers and the stop byte; the bools have no bodies.
        assert_eq!(
            p.get_ref().bytes(),
            &[0x10 | CT_BOOL_TRUE, 0x10 | CT_BOOL_FALSE, 0x00]
        );

        p.read_struct_begin().await.unwrap();
        let f1 = p.read_field_begin().await.unwrap();
        assert_eq!((f1.tag, f1.id), (TypeTag::Bool, 1));
        assert!(p.read_bool().await.unwrap());
        p.read_field_end().await.unwrap();
        let f2 = p.read_field_begin().await.unwrap();
        assert_eq!((f2.tag, f2.id), (TypeTag::Bool, 2));
        assert!(!p.read_bool().await.unwrap());
        p.read_field_end().await.unwrap();
        assert!(p.read_field_begin().await.unwrap().is_stop());
        p.read_struct_end().await.unwrap();
    }

    #[tokio::test]
    async fn container_bools_have_one_byte_bodies() {
        let values = [false, true, false, false, true];
        let mut p = prot();
        p.write_list_begin(ListHeader {
            elem_tag: TypeTag::Bool,
            size: values.len(),
        })
        .await
        .unwrap();
        for v in values {
            p.write_bool(v).await.unwrap();
        }
        p.write_list_end().await.unwrap();

        // Header byte plus one byte per element.
        assert_eq!(p.get_ref().len(), 1 + values.len());

        let header = p.read_list_begin().await.unwrap();
        assert_eq!(header.elem_tag, TypeTag::Bool);
        assert_eq!(header.size, values.len());
        for expected in values {
            assert_eq!(p.read_bool().await.unwrap(), expected);
        }
        p.read_list_end().await.unwrap();
    }

    #[tokio::test]
    async fn long_lists_use_the_escape_nibble() {
        let mut p = prot();
        p.write_list_begin(ListHeader {
            elem_tag: TypeTag::I32,
            size: 20,
        })
        .await
        .unwrap();
        assert_eq!(p.get_ref().bytes()[0], 0xf0 | CT_I32);

        for i in 0..20 {
            p.write_i32(i).await.unwrap();
        }
        let header = p.read_list_begin().await.unwrap();
        assert_eq!(header.size, 20);
        for i in 0..20 {
            assert_eq!(p.read_i32().await.unwrap(), i);
        }
    }

    #[tokio::test]
    async fn empty_map_has_no_type_byte() {
        let mut p = prot();
        p.write_map_begin(MapHeader {
            key_tag: TypeTag::String,
            value_tag: TypeTag::I32,
            size: 0,
        })
        .await
        .unwrap();
        assert_eq!(p.get_ref().bytes(), &[0x00]);

        let header = p.read_map_begin().await.unwrap();
        assert_eq!(header.size, 0);
    }

    #[tokio::test]
    async fn doubles_are_little_endian() {
        let mut p = prot();
        p.write_double(1.0).await.unwrap();
        assert_eq!(p.get_ref().bytes(), &1.0f64.to_bits().to_le_bytes());
        assert_eq!(p.read_double().await.unwrap(), 1.0);
    }

    #[tokio::test]
    async fn nested_structs_restore_field_deltas() {
        let mut p = prot();
        p.write_struct_begin("outer").await.unwrap();
        p.write_field_begin("a", TypeTag::I32, 5).await.unwrap();
        p.write_i32(1).await.unwrap();
        p.write_field_end().await.unwrap();
        p.write_field_begin("inner", TypeTag::Struct, 6).await.unwrap();
        {
            p.write_struct_begin("inner").await.unwrap();
            p.write_field_begin("x", TypeTag::I32, 1).await.unwrap();
            p.write_i32(2).await.unwrap();
            p.write_field_end().await.unwrap();
            p.write_field_stop().await.unwrap();
            p.write_struct_end().await.unwrap();
        }
        p.write_field_end().await.unwrap();
        // Delta from 6 to 7 must still be short after the nested struct.
        p.write_field_begin("b", TypeTag::I32, 7).await.unwrap();
        p.write_i32(3).await.unwrap();
        p.write_field_end().await.unwrap();
        p.write_field_stop().await.unwrap();
        p.write_struct_end().await.unwrap();

        p.read_struct_begin().await.unwrap();
        assert_eq!(p.read_field_begin().await.unwrap().id, 5);
        assert_eq!(p.read_i32().await.unwrap(), 1);
        p.read_field_end().await.unwrap();
        assert_eq!(p.read_field_begin().await.unwrap().id, 6);
        p.read_struct_begin().await.unwrap();
        assert_eq!(p.read_field_begin().await.unwrap().id, 1);
        assert_eq!(p.read_i32().await.unwrap(), 2);
        p.read_field_end().await.unwrap();
        assert!(p.read_field_begin().await.unwrap().is_stop());
        p.read_struct_end().await.unwrap();
        p.read_field_end().await.unwrap();
        assert_eq!(p.read_field_begin().await.unwrap().id, 7);
        assert_eq!(p.read_i32().await.unwrap(), 3);
    }
}
