//! weft-protocol: symmetric encoder/decoders that lower typed values onto a
//! byte transport and raise them back.
//!
//! Three canonical wire formats coexist behind one [`Protocol`] trait — a
//! fixed-width binary encoding, a variable-length compact encoding, and a
//! structured JSON encoding — plus a write-biased simple-JSON variant for
//! human inspection. All four are driven through the same primitive
//! families; generated struct code and the generic [`skip`] walker only ever
//! see the trait.

#![deny(unsafe_code)]

use async_trait::async_trait;
use weft_core::{
    FieldHeader, ListHeader, MapHeader, MessageEnvelope, MessageKind, ProtocolError, SetHeader,
    TypeTag,
};
use weft_transport::Transport;

mod application;
mod binary;
mod compact;
mod json;
mod simple_json;
mod skip;

pub use application::{read_application_error, write_application_error};
pub use binary::{BinaryFactory, BinaryProtocol};
pub use compact::{CompactFactory, CompactProtocol};
pub use json::{JsonFactory, JsonProtocol};
pub use simple_json::{SimpleJsonFactory, SimpleJsonProtocol};
pub use skip::{skip, skip_with_depth, DEFAULT_SKIP_DEPTH};

/// A wire-format encoder/decoder over an owned transport.
///
/// Every `*_begin` call must be matched by the corresponding `*_end` in the
/// same position on both the write and the read side. Struct writers finish
/// with [`write_field_stop`](Protocol::write_field_stop); struct readers see
/// a header whose tag is `Stop` in its place. Container sizes are declared
/// up front and trusted by readers.
#[async_trait]
pub trait Protocol: Send {
    async fn write_message_begin(
        &mut self,
        name: &str,
        kind: MessageKind,
        seq_id: i32,
    ) -> Result<(), ProtocolError>;
    async fn write_message_end(&mut self) -> Result<(), ProtocolError>;
    async fn write_struct_begin(&mut self, name: &str) -> Result<(), ProtocolError>;
    async fn write_struct_end(&mut self) -> Result<(), ProtocolError>;
    async fn write_field_begin(
        &mut self,
        name: &str,
        tag: TypeTag,
        id: i16,
    ) -> Result<(), ProtocolError>;
    async fn write_field_end(&mut self) -> Result<(), ProtocolError>;
    async fn write_field_stop(&mut self) -> Result<(), ProtocolError>;
    async fn write_map_begin(&mut self, header: MapHeader) -> Result<(), ProtocolError>;
    async fn write_map_end(&mut self) -> Result<(), ProtocolError>;
    async fn write_list_begin(&mut self, header: ListHeader) -> Result<(), ProtocolError>;
    async fn write_list_end(&mut self) -> Result<(), ProtocolError>;
    async fn write_set_begin(&mut self, header: SetHeader) -> Result<(), ProtocolError>;
    async fn write_set_end(&mut self) -> Result<(), ProtocolError>;
    async fn write_bool(&mut self, value: bool) -> Result<(), ProtocolError>;
    async fn write_byte(&mut self, value: i8) -> Result<(), ProtocolError>;
    async fn write_i16(&mut self, value: i16) -> Result<(), ProtocolError>;
    async fn write_i32(&mut self, value: i32) -> Result<(), ProtocolError>;
    async fn write_i64(&mut self, value: i64) -> Result<(), ProtocolError>;
    async fn write_double(&mut self, value: f64) -> Result<(), ProtocolError>;
    async fn write_string(&mut self, value: &str) -> Result<(), ProtocolError>;
    async fn write_binary(&mut self, value: &[u8]) -> Result<(), ProtocolError>;

    async fn read_message_begin(&mut self) -> Result<MessageEnvelope, ProtocolError>;
    async fn read_message_end(&mut self) -> Result<(), ProtocolError>;
    async fn read_struct_begin(&mut self) -> Result<(), ProtocolError>;
    async fn read_struct_end(&mut self) -> Result<(), ProtocolError>;
    async fn read_field_begin(&mut self) -> Result<FieldHeader, ProtocolError>;
    async fn read_field_end(&mut self) -> Result<(), ProtocolError>;
    async fn read_map_begin(&mut self) -> Result<MapHeader, ProtocolError>;
    async fn read_map_end(&mut self) -> Result<(), ProtocolError>;
    async fn read_list_begin(&mut self) -> Result<ListHeader, ProtocolError>;
    async fn read_list_end(&mut self) -> Result<(), ProtocolError>;
    async fn read_set_begin(&mut self) -> Result<SetHeader, ProtocolError>;
    async fn read_set_end(&mut self) -> Result<(), ProtocolError>;
    async fn read_bool(&mut self) -> Result<bool, ProtocolError>;
    async fn read_byte(&mut self) -> Result<i8, ProtocolError>;
    async fn read_i16(&mut self) -> Result<i16, ProtocolError>;
    async fn read_i32(&mut self) -> Result<i32, ProtocolError>;
    async fn read_i64(&mut self) -> Result<i64, ProtocolError>;
    async fn read_double(&mut self) -> Result<f64, ProtocolError>;
    async fn read_string(&mut self) -> Result<String, ProtocolError>;
    async fn read_binary(&mut self) -> Result<Vec<u8>, ProtocolError>;

    async fn flush(&mut self) -> Result<(), ProtocolError>;

    /// The transport this protocol drives. Servers use it to close the
    /// connection after the process loop finishes.
    fn transport_mut(&mut self) -> &mut dyn Transport;
}

/// Builds one protocol per connection side.
pub trait ProtocolFactory: Send + Sync {
    fn protocol(&self, transport: Box<dyn Transport>) -> Box<dyn Protocol>;
}
