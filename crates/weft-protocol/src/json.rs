//! Structured JSON encoding.
//!
//! Every non-scalar becomes a JSON array or object carrying explicit type
//! tags, so the stream is self-describing enough to decode without a
//! schema: messages are `[1,"name",kind,seqid,...]`, structs are objects
//! keyed by decimal field-id strings whose values are `{"<tag>": body}`
//! wrappers, and containers lead with their element types and size.
//! Doubles that are not finite serialize as the quoted sentinels
//! `"Infinity"`, `"-Infinity"`, and `"NaN"`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use weft_core::{
    FieldHeader, ListHeader, MapHeader, MessageEnvelope, MessageKind, Numeric, ProtocolError,
    SetHeader, TypeTag,
};
use weft_transport::Transport;

use crate::{Protocol, ProtocolFactory};

/// Version number leading every message array.
pub const JSON_VERSION: i64 = 1;

/// Parse-context states. The stack tells each token whether it sits in an
/// array or an object and which separator therefore precedes it; the two
/// object-key states also force numeric tokens into quotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Context {
    /// First element of an array: no separator.
    ListFirst,
    /// Later element of an array: `,` separator.
    List,
    /// First key of an object: no separator, key quoting.
    ObjectFirst,
    /// Later key of an object: `,` separator, key quoting.
    ObjectKey,
    /// Value of an object entry: `:` separator.
    ObjectValue,
}

/// Advance a context stack past one token. Returns the separator byte that
/// precedes the token (to emit on write, to consume on read) and whether
/// the token sits in object-key position, where numeric tokens are quoted.
pub(crate) fn advance_context(stack: &mut Vec<Context>) -> (Option<u8>, bool) {
    match stack.last_mut() {
        None => (None, false),
        Some(c @ Context::ListFirst) => {
            *c = Context::List;
            (None, false)
        }
        Some(Context::List) => (Some(b','), false),
        Some(c @ Context::ObjectFirst) => {
            *c = Context::ObjectValue;
            (None, true)
        }
        Some(c @ Context::ObjectKey) => {
            *c = Context::ObjectValue;
            (Some(b','), true)
        }
        Some(c @ Context::ObjectValue) => {
            *c = Context::ObjectKey;
            (Some(b':'), false)
        }
    }
}

/// One- and two-letter wire names for each type tag.
pub(crate) fn json_tag_name(tag: TypeTag) -> Result<&'static str, ProtocolError> {
    Ok(match tag {
        TypeTag::Bool => "tf",
        TypeTag::Byte => "i8",
        TypeTag::I16 => "i16",
        TypeTag::I32 => "i32",
        TypeTag::I64 => "i64",
        TypeTag::Double => "dbl",
        TypeTag::String => "str",
        TypeTag::Struct => "rec",
        TypeTag::Map => "map",
        TypeTag::Set => "set",
        TypeTag::List => "lst",
        other => {
            return Err(ProtocolError::InvalidData(format!(
                "type {other} has no JSON encoding"
            )))
        }
    })
}

pub(crate) fn tag_from_json_name(name: &str) -> Result<TypeTag, ProtocolError> {
    Ok(match name {
        "tf" => TypeTag::Bool,
        "i8" => TypeTag::Byte,
        "i16" => TypeTag::I16,
        "i32" => TypeTag::I32,
        "i64" => TypeTag::I64,
        "dbl" => TypeTag::Double,
        "str" => TypeTag::String,
        "rec" => TypeTag::Struct,
        "map" => TypeTag::Map,
        "set" => TypeTag::Set,
        "lst" => TypeTag::List,
        other => {
            return Err(ProtocolError::InvalidData(format!(
                "unknown JSON type name {other:?}"
            )))
        }
    })
}

/// Append `s` to `out` as a quoted JSON string with backslash escapes.
pub(crate) fn escape_json_into(out: &mut Vec<u8>, s: &str) {
    out.push(b'"');
    for c in s.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\u{0008}' => out.extend_from_slice(b"\\b"),
            '\u{000c}' => out.extend_from_slice(b"\\f"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            c if (c as u32) < 0x20 => {
                let mut buf = [0u8; 6];
                buf.copy_from_slice(format!("\\u{:04x}", c as u32).as_bytes());
                out.extend_from_slice(&buf);
            }
            c => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out.push(b'"');
}

fn is_number_byte(b: u8) -> bool {
    b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E')
}

/// The canonical JSON protocol.
pub struct JsonProtocol<T = Box<dyn Transport>> {
    transport: T,
    /// One byte of reader lookahead.
    peeked: Option<u8>,
    wstack: Vec<Context>,
    rstack: Vec<Context>,
}

impl<T: Transport + 'static> JsonProtocol<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            peeked: None,
            wstack: Vec::new(),
            rstack: Vec::new(),
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

    // ---- write side ----------------------------------------------------

    async fn out(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.transport.write_all(bytes).await?;
        Ok(())
    }

    /// Emit the separator the current context demands and advance it.
    /// Returns true when the upcoming token sits in key position.
    async fn begin_write_token(&mut self) -> Result<bool, ProtocolError> {
        let (sep, is_key) = advance_context(&mut self.wstack);
        if let Some(sep) = sep {
            self.out(&[sep]).await?;
        }
        Ok(is_key)
    }

    async fn write_array_open(&mut self) -> Result<(), ProtocolError> {
        self.begin_write_token().await?;
        self.out(b"[").await?;
        self.wstack.push(Context::ListFirst);
        Ok(())
    }

    async fn write_array_close(&mut self) -> Result<(), ProtocolError> {
        self.wstack.pop();
        self.out(b"]").await
    }

    async fn write_object_open(&mut self) -> Result<(), ProtocolError> {
        self.begin_write_token().await?;
        self.out(b"{").await?;
        self.wstack.push(Context::ObjectFirst);
        Ok(())
    }

    async fn write_object_close(&mut self) -> Result<(), ProtocolError> {
        self.wstack.pop();
        self.out(b"}").await
    }

    async fn write_json_integer(&mut self, value: i64) -> Result<(), ProtocolError> {
        let quoted = self.begin_write_token().await?;
        let text = value.to_string();
        if quoted {
            self.out(b"\"").await?;
            self.out(text.as_bytes()).await?;
            self.out(b"\"").await
        } else {
            self.out(text.as_bytes()).await
        }
    }

    async fn write_json_double(&mut self, value: f64) -> Result<(), ProtocolError> {
        let key = self.begin_write_token().await?;
        if let Some(sentinel) = Numeric::from_f64(value).sentinel_text() {
            self.out(b"\"").await?;
            self.out(sentinel.as_bytes()).await?;
            return self.out(b"\"").await;
        }
        let text = value.to_string();
        if key {
            self.out(b"\"").await?;
            self.out(text.as_bytes()).await?;
            self.out(b"\"").await
        } else {
            self.out(text.as_bytes()).await
        }
    }

    async fn write_json_string(&mut self, value: &str) -> Result<(), ProtocolError> {
        self.begin_write_token().await?;
        let mut escaped = Vec::with_capacity(value.len() + 2);
        escape_json_into(&mut escaped, value);
        self.out(&escaped).await
    }

    async fn write_json_base64(&mut self, value: &[u8]) -> Result<(), ProtocolError> {
        self.begin_write_token().await?;
        self.out(b"\"").await?;
        self.out(BASE64.encode(value).as_bytes()).await?;
        self.out(b"\"").await
    }

    // ---- read side -----------------------------------------------------

    async fn next_byte(&mut self) -> Result<u8, ProtocolError> {
        if let Some(b) = self.peeked.take() {
            return Ok(b);
        }
        let mut buf = [0u8; 1];
        self.transport.read_exact(&mut buf).await?;
        Ok(buf[0])
    }

    async fn peek_byte(&mut self) -> Result<u8, ProtocolError> {
        if let Some(b) = self.peeked {
            return Ok(b);
        }
        let mut buf = [0u8; 1];
        self.transport.read_exact(&mut buf).await?;
        self.peeked = Some(buf[0]);
        Ok(buf[0])
    }

    /// Consume whitespace; the next `peek_byte` sees a significant byte.
    async fn skip_ws(&mut self) -> Result<(), ProtocolError> {
        loop {
            match self.peek_byte().await {
                Ok(b' ' | b'\t' | b'\n' | b'\r') => {
                    self.peeked = None;
                }
                Ok(_) => return Ok(()),
                Err(e) => return Err(e),
            }
        }
    }

    async fn expect(&mut self, want: u8) -> Result<(), ProtocolError> {
        let got = self.next_byte().await?;
        if got != want {
            return Err(ProtocolError::InvalidData(format!(
                "expected {:?}, found {:?}",
                want as char, got as char
            )));
        }
        Ok(())
    }

    /// Consume the separator the current context demands and advance it.
    /// Returns true when the upcoming token sits in key position.
    async fn begin_read_token(&mut self) -> Result<bool, ProtocolError> {
        let (sep, is_key) = advance_context(&mut self.rstack);
        self.skip_ws().await?;
        if let Some(sep) = sep {
            self.expect(sep).await?;
            self.skip_ws().await?;
        }
        Ok(is_key)
    }

    async fn read_array_open(&mut self) -> Result<(), ProtocolError> {
        self.begin_read_token().await?;
        self.expect(b'[').await?;
        self.rstack.push(Context::ListFirst);
        Ok(())
    }

    async fn read_array_close(&mut self) -> Result<(), ProtocolError> {
        self.skip_ws().await?;
        self.expect(b']').await?;
        self.rstack.pop();
        Ok(())
    }

    async fn read_object_open(&mut self) -> Result<(), ProtocolError> {
        self.begin_read_token().await?;
        self.expect(b'{').await?;
        self.rstack.push(Context::ObjectFirst);
        Ok(())
    }

    async fn read_object_close(&mut self) -> Result<(), ProtocolError> {
        self.skip_ws().await?;
        self.expect(b'}').await?;
        self.rstack.pop();
        Ok(())
    }

    async fn read_string_body(&mut self) -> Result<String, ProtocolError> {
        let mut bytes = Vec::new();
        loop {
            let b = self.next_byte().await?;
            match b {
                b'"' => break,
                b'\\' => {
                    let esc = self.next_byte().await?;
                    match esc {
                        b'"' => bytes.push(b'"'),
                        b'\\' => bytes.push(b'\\'),
                        b'/' => bytes.push(b'/'),
                        b'b' => bytes.push(0x08),
                        b'f' => bytes.push(0x0c),
                        b'n' => bytes.push(b'\n'),
                        b'r' => bytes.push(b'\r'),
                        b't' => bytes.push(b'\t'),
                        b'u' => {
                            let code = self.read_hex4().await?;
                            let c = match code {
                                0xd800..=0xdbff => {
                                    // Surrogate pair: the low half must follow.
                                    self.expect(b'\\').await?;
                                    self.expect(b'u').await?;
                                    let low = self.read_hex4().await?;
                                    if !(0xdc00..=0xdfff).contains(&low) {
                                        return Err(ProtocolError::InvalidData(
                                            "unpaired surrogate in string escape".into(),
                                        ));
                                    }
                                    let combined = 0x10000
                                        + ((code as u32 - 0xd800) << 10)
                                        + (low as u32 - 0xdc00);
                                    char::from_u32(combined)
                                }
                                _ => char::from_u32(code as u32),
                            }
                            .ok_or_else(|| {
                                ProtocolError::InvalidData("bad unicode escape".into())
                            })?;
                            let mut buf = [0u8; 4];
                            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                        }
                        other => {
                            return Err(ProtocolError::InvalidData(format!(
                                "bad string escape \\{}",
                                other as char
                            )))
                        }
                    }
                }
                other => bytes.push(other),
            }
        }
        String::from_utf8(bytes)
            .map_err(|e| ProtocolError::InvalidData(format!("string is not UTF-8: {e}")))
    }

    async fn read_hex4(&mut self) -> Result<u16, ProtocolError> {
        let mut value = 0u16;
        for _ in 0..4 {
            let b = self.next_byte().await?;
            let digit = (b as char)
                .to_digit(16)
                .ok_or_else(|| ProtocolError::InvalidData("bad hex digit in escape".into()))?;
            value = (value << 4) | digit as u16;
        }
        Ok(value)
    }

    async fn read_json_string(&mut self) -> Result<String, ProtocolError> {
        self.begin_read_token().await?;
        self.expect(b'"').await?;
        self.read_string_body().await
    }

    async fn read_json_numeric(&mut self) -> Result<Numeric, ProtocolError> {
        self.begin_read_token().await?;
        let text = if self.peek_byte().await? == b'"' {
            self.peeked = None;
            let mut text = String::new();
            loop {
                let b = self.next_byte().await?;
                if b == b'"' {
                    break;
                }
                text.push(b as char);
            }
            text
        } else {
            let mut text = String::new();
            loop {
                match self.peek_byte().await {
                    Ok(b) if is_number_byte(b) => {
                        self.peeked = None;
                        text.push(b as char);
                    }
                    Ok(_) => break,
                    Err(e) if e.is_eof() && !text.is_empty() => break,
                    Err(e) => return Err(e),
                }
            }
            text
        };
        Numeric::parse(&text)
            .ok_or_else(|| ProtocolError::InvalidData(format!("bad number {text:?}")))
    }

    async fn read_json_integer(&mut self) -> Result<i64, ProtocolError> {
        Ok(self.read_json_numeric().await?.as_i64())
    }
}

#[async_trait]
impl<T: Transport + 'static> Protocol for JsonProtocol<T> {
    async fn write_message_begin(
        &mut self,
        name: &str,
        kind: MessageKind,
        seq_id: i32,
    ) -> Result<(), ProtocolError> {
        self.write_array_open().await?;
        self.write_json_integer(JSON_VERSION).await?;
        self.write_json_string(name).await?;
        self.write_json_integer(kind.as_wire() as i64).await?;
        self.write_json_integer(seq_id as i64).await
    }

    async fn write_message_end(&mut self) -> Result<(), ProtocolError> {
        self.write_array_close().await
    }

    async fn write_struct_begin(&mut self, _name: &str) -> Result<(), ProtocolError> {
        self.write_object_open().await
    }

    async fn write_struct_end(&mut self) -> Result<(), ProtocolError> {
        self.write_object_close().await
    }

    async fn write_field_begin(
        &mut self,
        _name: &str,
        tag: TypeTag,
        id: i16,
    ) -> Result<(), ProtocolError> {
        self.write_json_integer(id as i64).await?;
        self.write_object_open().await?;
        self.write_json_string(json_tag_name(tag)?).await
    }

    async fn write_field_end(&mut self) -> Result<(), ProtocolError> {
        self.write_object_close().await
    }

    async fn write_field_stop(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn write_map_begin(&mut self, header: MapHeader) -> Result<(), ProtocolError> {
        self.write_array_open().await?;
        self.write_json_string(json_tag_name(header.key_tag)?).await?;
        self.write_json_string(json_tag_name(header.value_tag)?)
            .await?;
        self.write_json_integer(header.size as i64).await?;
        self.write_object_open().await
    }

    async fn write_map_end(&mut self) -> Result<(), ProtocolError> {
        self.write_object_close().await?;
        self.write_array_close().await
    }

    async fn write_list_begin(&mut self, header: ListHeader) -> Result<(), ProtocolError> {
        self.write_array_open().await?;
        self.write_json_string(json_tag_name(header.elem_tag)?)
            .await?;
        self.write_json_integer(header.size as i64).await
    }

    async fn write_list_end(&mut self) -> Result<(), ProtocolError> {
        self.write_array_close().await
    }

    async fn write_set_begin(&mut self, header: SetHeader) -> Result<(), ProtocolError> {
        self.write_list_begin(ListHeader {
            elem_tag: header.elem_tag,
            size: header.size,
        })
        .await
    }

    async fn write_set_end(&mut self) -> Result<(), ProtocolError> {
        self.write_array_close().await
    }

    async fn write_bool(&mut self, value: bool) -> Result<(), ProtocolError> {
        self.write_json_integer(value as i64).await
    }

    async fn write_byte(&mut self, value: i8) -> Result<(), ProtocolError> {
        self.write_json_integer(value as i64).await
    }

    async fn write_i16(&mut self, value: i16) -> Result<(), ProtocolError> {
        self.write_json_integer(value as i64).await
    }

    async fn write_i32(&mut self, value: i32) -> Result<(), ProtocolError> {
        self.write_json_integer(value as i64).await
    }

    async fn write_i64(&mut self, value: i64) -> Result<(), ProtocolError> {
        self.write_json_integer(value).await
    }

    async fn write_double(&mut self, value: f64) -> Result<(), ProtocolError> {
        self.write_json_double(value).await
    }

    async fn write_string(&mut self, value: &str) -> Result<(), ProtocolError> {
        self.write_json_string(value).await
    }

    async fn write_binary(&mut self, value: &[u8]) -> Result<(), ProtocolError> {
        self.write_json_base64(value).await
    }

    async fn read_message_begin(&mut self) -> Result<MessageEnvelope, ProtocolError> {
        self.read_array_open().await?;
        let version = self.read_json_integer().await?;
        if version != JSON_VERSION {
            return Err(ProtocolError::BadVersion(format!(
                "JSON protocol version {version}, expected {JSON_VERSION}"
            )));
        }
        let name = self.read_json_string().await?;
        let kind = MessageKind::from_wire(self.read_json_integer().await? as u8)?;
        let seq_id = self.read_json_integer().await? as i32;
        Ok(MessageEnvelope::new(name, kind, seq_id))
    }

    async fn read_message_end(&mut self) -> Result<(), ProtocolError> {
        self.read_array_close().await
    }

    async fn read_struct_begin(&mut self) -> Result<(), ProtocolError> {
        self.read_object_open().await
    }

    async fn read_struct_end(&mut self) -> Result<(), ProtocolError> {
        self.read_object_close().await
    }

    async fn read_field_begin(&mut self) -> Result<FieldHeader, ProtocolError> {
        self.skip_ws().await?;
        if self.peek_byte().await? == b'}' {
            // End of struct; read_struct_end consumes the brace.
            return Ok(FieldHeader::stop());
        }
        let id = self.read_json_integer().await?;
        let id = i16::try_from(id)
            .map_err(|_| ProtocolError::InvalidData(format!("field id {id} overflows i16")))?;
        self.read_object_open().await?;
        let tag = tag_from_json_name(&self.read_json_string().await?)?;
        Ok(FieldHeader::new(tag, id))
    }

    async fn read_field_end(&mut self) -> Result<(), ProtocolError> {
        self.read_object_close().await
    }

    async fn read_map_begin(&mut self) -> Result<MapHeader, ProtocolError> {
        self.read_array_open().await?;
        let key_tag = tag_from_json_name(&self.read_json_string().await?)?;
        let value_tag = tag_from_json_name(&self.read_json_string().await?)?;
        let size = self.read_json_integer().await?;
        if size < 0 {
            return Err(ProtocolError::NegativeSize(size));
        }
        self.read_object_open().await?;
        Ok(MapHeader {
            key_tag,
            value_tag,
            size: size as usize,
        })
    }

    async fn read_map_end(&mut self) -> Result<(), ProtocolError> {
        self.read_object_close().await?;
        self.read_array_close().await
    }

    async fn read_list_begin(&mut self) -> Result<ListHeader, ProtocolError> {
        self.read_array_open().await?;
        let elem_tag = tag_from_json_name(&self.read_json_string().await?)?;
        let size = self.read_json_integer().await?;
        if size < 0 {
            return Err(ProtocolError::NegativeSize(size));
        }
        Ok(ListHeader {
            elem_tag,
            size: size as usize,
        })
    }

    async fn read_list_end(&mut self) -> Result<(), ProtocolError> {
        self.read_array_close().await
    }

    async fn read_set_begin(&mut self) -> Result<SetHeader, ProtocolError> {
        let header = self.read_list_begin().await?;
        Ok(SetHeader {
            elem_tag: header.elem_tag,
            size: header.size,
        })
    }

    async fn read_set_end(&mut self) -> Result<(), ProtocolError> {
        self.read_array_close().await
    }

    async fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_json_integer().await? != 0)
    }

    async fn read_byte(&mut self) -> Result<i8, ProtocolError> {
        Ok(self.read_json_integer().await? as i8)
    }

    async fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        Ok(self.read_json_integer().await? as i16)
    }

    async fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(self.read_json_integer().await? as i32)
    }

    async fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        self.read_json_integer().await
    }

    async fn read_double(&mut self) -> Result<f64, ProtocolError> {
        Ok(self.read_json_numeric().await?.as_f64())
    }

    async fn read_string(&mut self) -> Result<String, ProtocolError> {
        self.read_json_string().await
    }

    async fn read_binary(&mut self) -> Result<Vec<u8>, ProtocolError> {
        // Tolerant: string and binary share one type tag, so a skipper may
        // land here on a field that holds ordinary text. Text that is not
        // base64 comes back verbatim instead of failing.
        let encoded = self.read_json_string().await?;
        Ok(BASE64
            .decode(encoded.as_bytes())
            .unwrap_or_else(|_| encoded.into_bytes()))
    }

    async fn flush(&mut self) -> Result<(), ProtocolError> {
        self.transport.flush().await?;
        Ok(())
    }

    fn transport_mut(&mut self) -> &mut dyn Transport {
        &mut self.transport
    }
}

/// Factory for [`JsonProtocol`] instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFactory;

impl ProtocolFactory for JsonFactory {
    fn protocol(&self, transport: Box<dyn Transport>) -> Box<dyn Protocol> {
        Box::new(JsonProtocol::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_transport::MemoryBuffer;

    fn prot() -> JsonProtocol<MemoryBuffer> {
        JsonProtocol::new(MemoryBuffer::new())
    }

    fn wire(p: &JsonProtocol<MemoryBuffer>) -> String {
        String::from_utf8(p.get_ref().bytes().to_vec()).unwrap()
    }

    #[tokio::test]
    async fn envelope_is_a_versioned_array() {
        let mut p = prot();
        p.write_message_begin("ping", MessageKind::Call, 9)
            .await
            .unwrap();
        p.write_message_end().await.unwrap();
        assert_eq!(wire(&p), r#"[1,"ping",1,9]"#);

        let envelope = p.read_message_begin().await.unwrap();
        p.read_message_end().await.unwrap();
        assert_eq!(envelope, MessageEnvelope::new("ping", MessageKind::Call, 9));
    }

    #[tokio::test]
    async fn wrong_version_is_rejected() {
        let mut p = JsonProtocol::new(MemoryBuffer::with_bytes(br#"[2,"ping",1,9]"#));
        assert!(matches!(
            p.read_message_begin().await,
            Err(ProtocolError::BadVersion(_))
        ));
    }

    #[tokio::test]
    async fn structs_are_keyed_by_field_id() {
        let mut p = prot();
        p.write_struct_begin("Work").await.unwrap();
        p.write_field_begin("num", TypeTag::I32, 1).await.unwrap();
        p.write_i32(25).await.unwrap();
        p.write_field_end().await.unwrap();
        p.write_field_begin("comment", TypeTag::String, 4)
            .await
            .unwrap();
        p.write_string("Add").await.unwrap();
        p.write_field_end().await.unwrap();
        p.write_field_stop().await.unwrap();
        p.write_struct_end().await.unwrap();

        assert_eq!(wire(&p), r#"{"1":{"i32":25},"4":{"str":"Add"}}"#);

        p.read_struct_begin().await.unwrap();
        let f1 = p.read_field_begin().await.unwrap();
        assert_eq!((f1.tag, f1.id), (TypeTag::I32, 1));
        assert_eq!(p.read_i32().await.unwrap(), 25);
        p.read_field_end().await.unwrap();
        let f2 = p.read_field_begin().await.unwrap();
        assert_eq!((f2.tag, f2.id), (TypeTag::String, 4));
        assert_eq!(p.read_string().await.unwrap(), "Add");
        p.read_field_end().await.unwrap();
        assert!(p.read_field_begin().await.unwrap().is_stop());
        p.read_struct_end().await.unwrap();
    }

    #[tokio::test]
    async fn maps_quote_numeric_keys() {
        let mut p = prot();
        p.write_map_begin(MapHeader {
            key_tag: TypeTag::I32,
            value_tag: TypeTag::String,
            size: 2,
        })
        .await
        .unwrap();
        p.write_i32(1).await.unwrap();
        p.write_string("one").await.unwrap();
        p.write_i32(2).await.unwrap();
        p.write_string("two").await.unwrap();
        p.write_map_end().await.unwrap();

        assert_eq!(wire(&p), r#"["i32","str",2,{"1":"one","2":"two"}]"#);

        let header = p.read_map_begin().await.unwrap();
        assert_eq!(header.key_tag, TypeTag::I32);
        assert_eq!(header.value_tag, TypeTag::String);
        assert_eq!(header.size, 2);
        assert_eq!(p.read_i32().await.unwrap(), 1);
        assert_eq!(p.read_string().await.unwrap(), "one");
        assert_eq!(p.read_i32().await.unwrap(), 2);
        assert_eq!(p.read_string().await.unwrap(), "two");
        p.read_map_end().await.unwrap();
    }

    #[tokio::test]
    async fn lists_carry_type_and_size() {
        let mut p = prot();
        p.write_list_begin(ListHeader {
            elem_tag: TypeTag::I64,
            size: 3,
        })
        .await
        .unwrap();
        for v in [1i64, -1, 34359738481] {
            p.write_i64(v).await.unwrap();
        }
        p.write_list_end().await.unwrap();

        assert_eq!(wire(&p), r#"["i64",3,1,-1,34359738481]"#);

        let header = p.read_list_begin().await.unwrap();
        assert_eq!(header.elem_tag, TypeTag::I64);
        assert_eq!(header.size, 3);
        for expected in [1i64, -1, 34359738481] {
            assert_eq!(p.read_i64().await.unwrap(), expected);
        }
        p.read_list_end().await.unwrap();
    }

    #[tokio::test]
    async fn double_sentinels_are_quoted_strings() {
        let values = [459.3, 0.0, -1.0, f64::INFINITY, f64::NEG_INFINITY, f64::NAN];
        let mut p = prot();
        p.write_list_begin(ListHeader {
            elem_tag: TypeTag::Double,
            size: values.len(),
        })
        .await
        .unwrap();
        for v in values {
            p.write_double(v).await.unwrap();
        }
        p.write_list_end().await.unwrap();

        assert_eq!(
            wire(&p),
            r#"["dbl",6,459.3,0,-1,"Infinity","-Infinity","NaN"]"#
        );

        let header = p.read_list_begin().await.unwrap();
        assert_eq!(header.size, values.len());
        for expected in values {
            let got = p.read_double().await.unwrap();
            if expected.is_nan() {
                assert!(got.is_nan());
            } else {
                assert_eq!(got, expected);
            }
        }
        p.read_list_end().await.unwrap();
    }

    #[tokio::test]
    async fn strings_escape_and_unescape() {
        let tricky = "stuff\twith\nescape\\characters'...\"lots{of}fun</xml>";
        let mut p = prot();
        p.write_string(tricky).await.unwrap();
        assert_eq!(p.read_string().await.unwrap(), tricky);

        let mut p = prot();
        p.write_string("\u{1}\u{8}control").await.unwrap();
        assert_eq!(wire(&p), r#""\u0001\bcontrol""#);
        assert_eq!(p.read_string().await.unwrap(), "\u{1}\u{8}control");
    }

    #[tokio::test]
    async fn unicode_escapes_parse_including_surrogates() {
        let mut p = JsonProtocol::new(MemoryBuffer::with_bytes(br#""\u00e9 \ud83d\ude00""#));
        assert_eq!(p.read_string().await.unwrap(), "\u{e9} \u{1f600}");
    }

    #[tokio::test]
    async fn binary_is_base64() {
        let mut p = prot();
        p.write_binary(b"\x00\x01\x02weft").await.unwrap();
        let text = wire(&p);
        assert!(text.starts_with('"') && text.ends_with('"'));
        assert_eq!(p.read_binary().await.unwrap(), b"\x00\x01\x02weft");
    }

    #[tokio::test]
    async fn whitespace_is_tolerated_on_read() {
        let mut p = JsonProtocol::new(MemoryBuffer::with_bytes(
            b"[ 1 , \"ping\" ,\n\t1 , 9 ]",
        ));
        let envelope = p.read_message_begin().await.unwrap();
        p.read_message_end().await.unwrap();
        assert_eq!(envelope, MessageEnvelope::new("ping", MessageKind::Call, 9));
    }

    #[tokio::test]
    async fn bools_are_integers() {
        let mut p = prot();
        p.write_bool(true).await.unwrap();
        assert_eq!(wire(&p), "1");
        assert!(p.read_bool().await.unwrap());
    }
}
