//! Flat JSON output for human inspection.
//!
//! Unlike the canonical JSON encoding, nothing here carries type tags:
//! structs are plain objects keyed by field *name*, containers are plain
//! arrays and objects, and booleans are the JSON literals. The stream is
//! not self-describing, so reading is best-effort only —
//! `read_field_begin` has nothing to return and fails with
//! `NOT_IMPLEMENTED`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use weft_core::{
    FieldHeader, ListHeader, MapHeader, MessageEnvelope, MessageKind, Numeric, ProtocolError,
    SetHeader, TypeTag,
};
use weft_transport::Transport;

use crate::json::{advance_context, escape_json_into, Context};
use crate::{Protocol, ProtocolFactory};

fn is_number_byte(b: u8) -> bool {
    b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E')
}

/// The write-biased simple-JSON protocol.
pub struct SimpleJsonProtocol<T = Box<dyn Transport>> {
    transport: T,
    peeked: Option<u8>,
    wstack: Vec<Context>,
    rstack: Vec<Context>,
}

impl<T: Transport + 'static> SimpleJsonProtocol<T> {
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

    pub fn into_inner(self) -> T {
        self.transport
    }

    // ---- write side ----------------------------------------------------

    async fn out(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.transport.write_all(bytes).await?;
        Ok(())
    }

    async fn begin_write_token(&mut self) -> Result<bool, ProtocolError> {
        let (sep, is_key) = advance_context(&mut self.wstack);
        if let Some(sep) = sep {
            self.out(&[sep]).await?;
        }
        Ok(is_key)
    }

    async fn write_literal(&mut self, text: &str) -> Result<(), ProtocolError> {
        let quoted = self.begin_write_token().await?;
        if quoted {
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

    // ---- read side (best effort) ---------------------------------------

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

    async fn skip_ws(&mut self) -> Result<(), ProtocolError> {
        while matches!(self.peek_byte().await?, b' ' | b'\t' | b'\n' | b'\r') {
            self.peeked = None;
        }
        Ok(())
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

    async fn begin_read_token(&mut self) -> Result<(), ProtocolError> {
        let (sep, _) = advance_context(&mut self.rstack);
        self.skip_ws().await?;
        if let Some(sep) = sep {
            self.expect(sep).await?;
            self.skip_ws().await?;
        }
        Ok(())
    }

    /// Read a bare token: a quoted string's contents or an unquoted run of
    /// number/word bytes.
    async fn read_token_text(&mut self) -> Result<String, ProtocolError> {
        self.begin_read_token().await?;
        if self.peek_byte().await? == b'"' {
            self.peeked = None;
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
            return String::from_utf8(bytes)
                .map_err(|e| ProtocolError::InvalidData(format!("string is not UTF-8: {e}")));
        }
        let mut text = String::new();
        loop {
            match self.peek_byte().await {
                Ok(b) if is_number_byte(b) || b.is_ascii_alphabetic() => {
                    self.peeked = None;
                    text.push(b as char);
                }
                Ok(_) => break,
                Err(e) if e.is_eof() && !text.is_empty() => break,
                Err(e) => return Err(e),
            }
        }
        Ok(text)
    }

    async fn read_numeric(&mut self) -> Result<Numeric, ProtocolError> {
        let text = self.read_token_text().await?;
        Numeric::parse(&text)
            .ok_or_else(|| ProtocolError::InvalidData(format!("bad number {text:?}")))
    }
}

#[async_trait]
impl<T: Transport + 'static> Protocol for SimpleJsonProtocol<T> {
    async fn write_message_begin(
        &mut self,
        name: &str,
        kind: MessageKind,
        seq_id: i32,
    ) -> Result<(), ProtocolError> {
        self.write_array_open().await?;
        self.write_json_string(name).await?;
        self.write_literal(&(kind.as_wire() as i64).to_string()).await?;
        self.write_literal(&seq_id.to_string()).await
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
        name: &str,
        _tag: TypeTag,
        _id: i16,
    ) -> Result<(), ProtocolError> {
        self.write_json_string(name).await
    }

    async fn write_field_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn write_field_stop(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn write_map_begin(&mut self, _header: MapHeader) -> Result<(), ProtocolError> {
        self.write_object_open().await
    }

    async fn write_map_end(&mut self) -> Result<(), ProtocolError> {
        self.write_object_close().await
    }

    async fn write_list_begin(&mut self, _header: ListHeader) -> Result<(), ProtocolError> {
        self.write_array_open().await
    }

    async fn write_list_end(&mut self) -> Result<(), ProtocolError> {
        self.write_array_close().await
    }

    async fn write_set_begin(&mut self, _header: SetHeader) -> Result<(), ProtocolError> {
        self.write_array_open().await
    }

    async fn write_set_end(&mut self) -> Result<(), ProtocolError> {
        self.write_array_close().await
    }

    async fn write_bool(&mut self, value: bool) -> Result<(), ProtocolError> {
        self.write_literal(if value { "true" } else { "false" }).await
    }

    async fn write_byte(&mut self, value: i8) -> Result<(), ProtocolError> {
        self.write_literal(&value.to_string()).await
    }

    async fn write_i16(&mut self, value: i16) -> Result<(), ProtocolError> {
        self.write_literal(&value.to_string()).await
    }

    async fn write_i32(&mut self, value: i32) -> Result<(), ProtocolError> {
        self.write_literal(&value.to_string()).await
    }

    async fn write_i64(&mut self, value: i64) -> Result<(), ProtocolError> {
        self.write_literal(&value.to_string()).await
    }

    async fn write_double(&mut self, value: f64) -> Result<(), ProtocolError> {
        match Numeric::from_f64(value).sentinel_text() {
            Some(sentinel) => {
                self.begin_write_token().await?;
                self.out(b"\"").await?;
                self.out(sentinel.as_bytes()).await?;
                self.out(b"\"").await
            }
            None => self.write_literal(&value.to_string()).await,
        }
    }

    async fn write_string(&mut self, value: &str) -> Result<(), ProtocolError> {
        self.write_json_string(value).await
    }

    async fn write_binary(&mut self, value: &[u8]) -> Result<(), ProtocolError> {
        self.begin_write_token().await?;
        self.out(b"\"").await?;
        self.out(BASE64.encode(value).as_bytes()).await?;
        self.out(b"\"").await
    }

    async fn read_message_begin(&mut self) -> Result<MessageEnvelope, ProtocolError> {
        self.begin_read_token().await?;
        self.expect(b'[').await?;
        self.rstack.push(Context::ListFirst);
        let name = self.read_token_text().await?;
        let kind = MessageKind::from_wire(self.read_numeric().await?.as_i64() as u8)?;
        let seq_id = self.read_numeric().await?.as_i64() as i32;
        Ok(MessageEnvelope::new(name, kind, seq_id))
    }

    async fn read_message_end(&mut self) -> Result<(), ProtocolError> {
        self.skip_ws().await?;
        self.expect(b']').await?;
        self.rstack.pop();
        Ok(())
    }

    async fn read_struct_begin(&mut self) -> Result<(), ProtocolError> {
        self.begin_read_token().await?;
        self.expect(b'{').await?;
        self.rstack.push(Context::ObjectFirst);
        Ok(())
    }

    async fn read_struct_end(&mut self) -> Result<(), ProtocolError> {
        self.skip_ws().await?;
        self.expect(b'}').await?;
        self.rstack.pop();
        Ok(())
    }

    /// The flat encoding has no field ids to return.
    async fn read_field_begin(&mut self) -> Result<FieldHeader, ProtocolError> {
        Err(ProtocolError::NotImplemented("read_field_begin"))
    }

    async fn read_field_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn read_map_begin(&mut self) -> Result<MapHeader, ProtocolError> {
        self.begin_read_token().await?;
        self.expect(b'{').await?;
        self.rstack.push(Context::ObjectFirst);
        // Neither element types nor size are on the wire.
        Ok(MapHeader {
            key_tag: TypeTag::Stop,
            value_tag: TypeTag::Stop,
            size: 0,
        })
    }

    async fn read_map_end(&mut self) -> Result<(), ProtocolError> {
        self.skip_ws().await?;
        self.expect(b'}').await?;
        self.rstack.pop();
        Ok(())
    }

    async fn read_list_begin(&mut self) -> Result<ListHeader, ProtocolError> {
        self.begin_read_token().await?;
        self.expect(b'[').await?;
        self.rstack.push(Context::ListFirst);
        Ok(ListHeader {
            elem_tag: TypeTag::Stop,
            size: 0,
        })
    }

    async fn read_list_end(&mut self) -> Result<(), ProtocolError> {
        self.skip_ws().await?;
        self.expect(b']').await?;
        self.rstack.pop();
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
        self.read_list_end().await
    }

    async fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        let text = self.read_token_text().await?;
        match text.as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" | "" => Ok(false),
            other => Err(ProtocolError::InvalidData(format!("bad bool {other:?}"))),
        }
    }

    async fn read_byte(&mut self) -> Result<i8, ProtocolError> {
        Ok(self.read_numeric().await?.as_i64() as i8)
    }

    async fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        Ok(self.read_numeric().await?.as_i64() as i16)
    }

    async fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(self.read_numeric().await?.as_i64() as i32)
    }

    async fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        Ok(self.read_numeric().await?.as_i64())
    }

    async fn read_double(&mut self) -> Result<f64, ProtocolError> {
        Ok(self.read_numeric().await?.as_f64())
    }

    async fn read_string(&mut self) -> Result<String, ProtocolError> {
        self.read_token_text().await
    }

    async fn read_binary(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let encoded = self.read_token_text().await?;
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

/// Factory for [`SimpleJsonProtocol`] instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleJsonFactory;

impl ProtocolFactory for SimpleJsonFactory {
    fn protocol(&self, transport: Box<dyn Transport>) -> Box<dyn Protocol> {
        Box::new(SimpleJsonProtocol::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_transport::MemoryBuffer;

    fn prot() -> SimpleJsonProtocol<MemoryBuffer> {
        SimpleJsonProtocol::new(MemoryBuffer::new())
    }

    fn wire(p: &SimpleJsonProtocol<MemoryBuffer>) -> String {
        String::from_utf8(p.get_ref().bytes().to_vec()).unwrap()
    }

    #[tokio::test]
    async fn structs_are_flat_objects_keyed_by_name() {
        let mut p = prot();
        p.write_struct_begin("Work").await.unwrap();
        p.write_field_begin("num1", TypeTag::I32, 1).await.unwrap();
        p.write_i32(25).await.unwrap();
        p.write_field_end().await.unwrap();
        p.write_field_begin("ok", TypeTag::Bool, 2).await.unwrap();
        p.write_bool(true).await.unwrap();
        p.write_field_end().await.unwrap();
        p.write_field_stop().await.unwrap();
        p.write_struct_end().await.unwrap();

        assert_eq!(wire(&p), r#"{"num1":25,"ok":true}"#);
    }

    #[tokio::test]
    async fn containers_have_no_type_headers() {
        let mut p = prot();
        p.write_list_begin(ListHeader {
            elem_tag: TypeTag::I32,
            size: 3,
        })
        .await
        .unwrap();
        for v in [1, 2, 3] {
            p.write_i32(v).await.unwrap();
        }
        p.write_list_end().await.unwrap();
        assert_eq!(wire(&p), "[1,2,3]");
    }

    #[tokio::test]
    async fn envelope_round_trips() {
        let mut p = prot();
        p.write_message_begin("echo", MessageKind::Call, 3)
            .await
            .unwrap();
        p.write_message_end().await.unwrap();
        assert_eq!(wire(&p), r#"["echo",1,3]"#);

        let envelope = p.read_message_begin().await.unwrap();
        p.read_message_end().await.unwrap();
        assert_eq!(envelope, MessageEnvelope::new("echo", MessageKind::Call, 3));
    }

    #[tokio::test]
    async fn field_reads_are_not_implemented() {
        let mut p = SimpleJsonProtocol::new(MemoryBuffer::with_bytes(br#"{"a":1}"#));
        p.read_struct_begin().await.unwrap();
        assert!(matches!(
            p.read_field_begin().await,
            Err(ProtocolError::NotImplemented("read_field_begin"))
        ));
    }

    #[tokio::test]
    async fn scalar_reads_are_best_effort() {
        let mut p = prot();
        p.write_list_begin(ListHeader {
            elem_tag: TypeTag::Double,
            size: 3,
        })
        .await
        .unwrap();
        p.write_double(0.5).await.unwrap();
        p.write_double(f64::NAN).await.unwrap();
        p.write_bool(false).await.unwrap();
        p.write_list_end().await.unwrap();

        p.read_list_begin().await.unwrap();
        assert_eq!(p.read_double().await.unwrap(), 0.5);
        assert!(p.read_double().await.unwrap().is_nan());
        assert!(!p.read_bool().await.unwrap());
        p.read_list_end().await.unwrap();
    }

    #[tokio::test]
    async fn map_keys_are_quoted() {
        let mut p = prot();
        p.write_map_begin(MapHeader {
            key_tag: TypeTag::I32,
            value_tag: TypeTag::String,
            size: 1,
        })
        .await
        .unwrap();
        p.write_i32(7).await.unwrap();
        p.write_string("seven").await.unwrap();
        p.write_map_end().await.unwrap();
        assert_eq!(wire(&p), r#"{"7":"seven"}"#);
    }
}
