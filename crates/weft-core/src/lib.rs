//! weft-core: shared value model for the weft RPC runtime.
//!
//! This crate defines:
//! - Wire type tags and message kinds (`TypeTag`, `MessageKind`)
//! - Envelope and header structs (`MessageEnvelope`, `FieldHeader`, container headers)
//! - The tagged numeric box used by the JSON codec (`Numeric`)
//! - The three error families with stable wire codes (`TransportError`,
//!   `ProtocolError`, `ApplicationError`)

#![deny(unsafe_code)]

pub mod error;
pub mod numeric;
pub mod types;

pub use error::{ApplicationError, ApplicationErrorKind, ProtocolError, TransportError};
pub use numeric::Numeric;
pub use types::{
    FieldHeader, ListHeader, MapHeader, MessageEnvelope, MessageKind, SetHeader, TypeTag,
};
