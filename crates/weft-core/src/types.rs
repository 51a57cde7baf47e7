//! Wire type tags, message kinds, and the header structs protocols exchange.

use crate::error::ProtocolError;

/// Type tag identifying the shape of the next value on the wire.
///
/// The numeric codes are wire-visible in the binary encoding and must not
/// change. Codes 5, 7, and 9 are unassigned in the protocol and have never
/// been reclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeTag {
    Stop = 0,
    Void = 1,
    Bool = 2,
    Byte = 3,
    Double = 4,
    I16 = 6,
    I32 = 8,
    I64 = 10,
    String = 11,
    Struct = 12,
    Map = 13,
    Set = 14,
    List = 15,
    Enum = 16,
    Utf16 = 17,
    Generic = 127,
}

impl TypeTag {
    /// Alias: I08 shares code 3 with BYTE.
    pub const I08: TypeTag = TypeTag::Byte;
    /// Alias: BINARY shares code 11 with STRING.
    pub const BINARY: TypeTag = TypeTag::String;
    /// Alias: UTF8 shares code 16 with ENUM.
    pub const UTF8: TypeTag = TypeTag::Enum;

    /// Decode a tag from its wire byte.
    pub fn from_wire(byte: u8) -> Result<TypeTag, ProtocolError> {
        Ok(match byte {
            0 => TypeTag::Stop,
            1 => TypeTag::Void,
            2 => TypeTag::Bool,
            3 => TypeTag::Byte,
            4 => TypeTag::Double,
            6 => TypeTag::I16,
            8 => TypeTag::I32,
            10 => TypeTag::I64,
            11 => TypeTag::String,
            12 => TypeTag::Struct,
            13 => TypeTag::Map,
            14 => TypeTag::Set,
            15 => TypeTag::List,
            16 => TypeTag::Enum,
            17 => TypeTag::Utf16,
            127 => TypeTag::Generic,
            other => {
                return Err(ProtocolError::InvalidData(format!(
                    "unknown type tag {other}"
                )))
            }
        })
    }

    /// The byte this tag encodes to.
    pub const fn as_wire(self) -> u8 {
        self as u8
    }

    /// True for MAP, SET, and LIST.
    pub const fn is_container(self) -> bool {
        matches!(self, TypeTag::Map | TypeTag::Set | TypeTag::List)
    }

    /// True for the fixed-shape scalar tags.
    pub const fn is_scalar(self) -> bool {
        matches!(
            self,
            TypeTag::Bool
                | TypeTag::Byte
                | TypeTag::Double
                | TypeTag::I16
                | TypeTag::I32
                | TypeTag::I64
                | TypeTag::String
        )
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TypeTag::Stop => "STOP",
            TypeTag::Void => "VOID",
            TypeTag::Bool => "BOOL",
            TypeTag::Byte => "BYTE",
            TypeTag::Double => "DOUBLE",
            TypeTag::I16 => "I16",
            TypeTag::I32 => "I32",
            TypeTag::I64 => "I64",
            TypeTag::String => "STRING",
            TypeTag::Struct => "STRUCT",
            TypeTag::Map => "MAP",
            TypeTag::Set => "SET",
            TypeTag::List => "LIST",
            TypeTag::Enum => "ENUM",
            TypeTag::Utf16 => "UTF16",
            TypeTag::Generic => "GENERIC",
        };
        f.write_str(name)
    }
}

/// Kind of a message envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Call = 1,
    Reply = 2,
    Exception = 3,
    /// A call that expects no reply; the server must not emit bytes for it.
    Oneway = 4,
}

impl MessageKind {
    /// Decode a kind from its wire byte.
    pub fn from_wire(byte: u8) -> Result<MessageKind, ProtocolError> {
        Ok(match byte {
            1 => MessageKind::Call,
            2 => MessageKind::Reply,
            3 => MessageKind::Exception,
            4 => MessageKind::Oneway,
            other => {
                return Err(ProtocolError::InvalidData(format!(
                    "unknown message kind {other}"
                )))
            }
        })
    }

    /// The byte this kind encodes to.
    pub const fn as_wire(self) -> u8 {
        self as u8
    }
}

/// The (name, kind, seqId) triple that wraps a call's argument or result
/// struct.
///
/// A REPLY or EXCEPTION carries the seq id of the CALL that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    pub name: String,
    pub kind: MessageKind,
    pub seq_id: i32,
}

impl MessageEnvelope {
    pub fn new(name: impl Into<String>, kind: MessageKind, seq_id: i32) -> Self {
        Self {
            name: name.into(),
            kind,
            seq_id,
        }
    }
}

/// Header of one struct field.
///
/// The id is authoritative; binary and compact never put the name on the
/// wire, so readers return `name: None`. A header whose tag is `Stop` marks
/// the end of the struct and carries no id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldHeader {
    pub name: Option<String>,
    pub tag: TypeTag,
    pub id: i16,
}

impl FieldHeader {
    pub fn new(tag: TypeTag, id: i16) -> Self {
        Self {
            name: None,
            tag,
            id,
        }
    }

    /// The sentinel header ending a struct.
    pub const fn stop() -> Self {
        Self {
            name: None,
            tag: TypeTag::Stop,
            id: 0,
        }
    }

    pub fn is_stop(&self) -> bool {
        self.tag == TypeTag::Stop
    }
}

/// Declared key/value types and size of a map about to be read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapHeader {
    pub key_tag: TypeTag,
    pub value_tag: TypeTag,
    pub size: usize,
}

/// Declared element type and size of a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListHeader {
    pub elem_tag: TypeTag,
    pub size: usize,
}

/// Declared element type and size of a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetHeader {
    pub elem_tag: TypeTag,
    pub size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tag_wire_codes_are_fixed() {
        let fixed = [
            (TypeTag::Stop, 0),
            (TypeTag::Bool, 2),
            (TypeTag::Byte, 3),
            (TypeTag::Double, 4),
            (TypeTag::I16, 6),
            (TypeTag::I32, 8),
            (TypeTag::I64, 10),
            (TypeTag::String, 11),
            (TypeTag::Struct, 12),
            (TypeTag::Map, 13),
            (TypeTag::Set, 14),
            (TypeTag::List, 15),
        ];
        for (tag, code) in fixed {
            assert_eq!(tag.as_wire(), code);
            assert_eq!(TypeTag::from_wire(code).unwrap(), tag);
        }
    }

    #[test]
    fn type_tag_aliases_share_codes() {
        assert_eq!(TypeTag::I08, TypeTag::Byte);
        assert_eq!(TypeTag::BINARY, TypeTag::String);
        assert_eq!(TypeTag::UTF8.as_wire(), 16);
    }

    #[test]
    fn unknown_type_tag_is_invalid_data() {
        assert!(matches!(
            TypeTag::from_wire(5),
            Err(ProtocolError::InvalidData(_))
        ));
        assert!(matches!(
            TypeTag::from_wire(200),
            Err(ProtocolError::InvalidData(_))
        ));
    }

    #[test]
    fn message_kind_round_trips() {
        for kind in [
            MessageKind::Call,
            MessageKind::Reply,
            MessageKind::Exception,
            MessageKind::Oneway,
        ] {
            assert_eq!(MessageKind::from_wire(kind.as_wire()).unwrap(), kind);
        }
        assert!(MessageKind::from_wire(0).is_err());
        assert!(MessageKind::from_wire(5).is_err());
    }

    #[test]
    fn stop_header_has_reserved_id() {
        let stop = FieldHeader::stop();
        assert!(stop.is_stop());
        assert_eq!(stop.id, 0);
    }
}
