//! Generic value skipper.
//!
//! Drains one value of a declared type using only the public read API, so
//! it works identically over every protocol. Containers recurse; structs
//! loop until the stop field. Recursion is bounded to keep adversarial
//! nesting from exhausting the stack.

use std::future::Future;
use std::pin::Pin;

use weft_core::{ProtocolError, TypeTag};

use crate::Protocol;

/// Default recursion bound for [`skip`].
pub const DEFAULT_SKIP_DEPTH: usize = 64;

/// Skip one value of type `tag`, bounded to [`DEFAULT_SKIP_DEPTH`] levels
/// of nesting.
pub async fn skip(prot: &mut dyn Protocol, tag: TypeTag) -> Result<(), ProtocolError> {
    skip_with_depth(prot, tag, DEFAULT_SKIP_DEPTH).await
}

/// Skip one value of type `tag`, failing with `DEPTH_LIMIT` once `depth`
/// levels of nested structs or containers have been opened.
pub fn skip_with_depth<'a>(
    prot: &'a mut dyn Protocol,
    tag: TypeTag,
    depth: usize,
) -> Pin<Box<dyn Future<Output = Result<(), ProtocolError>> + Send + 'a>> {
    Box::pin(async move {
        match tag {
            TypeTag::Bool => {
                prot.read_bool().await?;
            }
            TypeTag::Byte => {
                prot.read_byte().await?;
            }
            TypeTag::I16 => {
                prot.read_i16().await?;
            }
            TypeTag::I32 | TypeTag::Enum => {
                prot.read_i32().await?;
            }
            TypeTag::I64 => {
                prot.read_i64().await?;
            }
            TypeTag::Double => {
                prot.read_double().await?;
            }
            TypeTag::String => {
                prot.read_binary().await?;
            }
            TypeTag::Struct => {
                if depth == 0 {
                    return Err(ProtocolError::DepthLimit);
                }
                prot.read_struct_begin().await?;
                loop {
                    let field = prot.read_field_begin().await?;
                    if field.is_stop() {
                        break;
                    }
                    skip_with_depth(prot, field.tag, depth - 1).await?;
                    prot.read_field_end().await?;
                }
                prot.read_struct_end().await?;
            }
            TypeTag::Map => {
                if depth == 0 {
                    return Err(ProtocolError::DepthLimit);
                }
                let header = prot.read_map_begin().await?;
                for _ in 0..header.size {
                    skip_with_depth(prot, header.key_tag, depth - 1).await?;
                    skip_with_depth(prot, header.value_tag, depth - 1).await?;
                }
                prot.read_map_end().await?;
            }
            TypeTag::Set => {
                if depth == 0 {
                    return Err(ProtocolError::DepthLimit);
                }
                let header = prot.read_set_begin().await?;
                for _ in 0..header.size {
                    skip_with_depth(prot, header.elem_tag, depth - 1).await?;
                }
                prot.read_set_end().await?;
            }
            TypeTag::List => {
                if depth == 0 {
                    return Err(ProtocolError::DepthLimit);
                }
                let header = prot.read_list_begin().await?;
                for _ in 0..header.size {
                    skip_with_depth(prot, header.elem_tag, depth - 1).await?;
                }
                prot.read_list_end().await?;
            }
            other => {
                return Err(ProtocolError::InvalidData(format!(
                    "cannot skip a value of type {other}"
                )))
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BinaryProtocol;
    use weft_core::{FieldHeader, ListHeader, MapHeader, TypeTag};
    use weft_transport::{MemoryBuffer, Transport};

    async fn write_sample_struct(p: &mut BinaryProtocol<MemoryBuffer>) {
        p.write_struct_begin("sample").await.unwrap();
        p.write_field_begin("id", TypeTag::I32, 1).await.unwrap();
        p.write_i32(12).await.unwrap();
        p.write_field_end().await.unwrap();
        p.write_field_begin("names", TypeTag::List, 2).await.unwrap();
        p.write_list_begin(ListHeader {
            elem_tag: TypeTag::String,
            size: 2,
        })
        .await
        .unwrap();
        p.write_string("a").await.unwrap();
        p.write_string("b").await.unwrap();
        p.write_list_end().await.unwrap();
        p.write_field_end().await.unwrap();
        p.write_field_begin("scores", TypeTag::Map, 3).await.unwrap();
        p.write_map_begin(MapHeader {
            key_tag: TypeTag::String,
            value_tag: TypeTag::Double,
            size: 1,
        })
        .await
        .unwrap();
        p.write_string("pi").await.unwrap();
        p.write_double(3.14159).await.unwrap();
        p.write_map_end().await.unwrap();
        p.write_field_end().await.unwrap();
        p.write_field_stop().await.unwrap();
        p.write_struct_end().await.unwrap();
    }

    #[tokio::test]
    async fn skip_consumes_exactly_the_encoded_value() {
        let mut p = BinaryProtocol::new(MemoryBuffer::new());
        write_sample_struct(&mut p).await;
        // A trailing marker that must survive the skip untouched.
        p.write_i32(0x5a5a_5a5a).await.unwrap();

        skip(&mut p, TypeTag::Struct).await.unwrap();
        assert_eq!(p.read_i32().await.unwrap(), 0x5a5a_5a5a);
        assert!(p.get_ref().is_empty());
    }

    #[tokio::test]
    async fn depth_limit_trips_on_deep_nesting() {
        // A crafted stream of nested struct-opens: field 1 of each struct
        // is another struct, deeper than the skipper allows.
        let mut mem = MemoryBuffer::new();
        for _ in 0..(DEFAULT_SKIP_DEPTH + 1) {
            mem.write_all(&[TypeTag::Struct.as_wire()]).await.unwrap();
            mem.write_all(&1i16.to_be_bytes()).await.unwrap();
        }
        for _ in 0..(DEFAULT_SKIP_DEPTH + 2) {
            mem.write_all(&[TypeTag::Stop.as_wire()]).await.unwrap();
        }

        let mut p = BinaryProtocol::new(mem);
        let err = skip(&mut p, TypeTag::Struct).await.unwrap_err();
        assert!(matches!(err, ProtocolError::DepthLimit));
    }

    #[tokio::test]
    async fn shallow_nesting_stays_under_the_limit() {
        let mut mem = MemoryBuffer::new();
        for _ in 0..(DEFAULT_SKIP_DEPTH - 1) {
            mem.write_all(&[TypeTag::Struct.as_wire()]).await.unwrap();
            mem.write_all(&1i16.to_be_bytes()).await.unwrap();
        }
        for _ in 0..DEFAULT_SKIP_DEPTH {
            mem.write_all(&[TypeTag::Stop.as_wire()]).await.unwrap();
        }

        let mut p = BinaryProtocol::new(mem);
        skip(&mut p, TypeTag::Struct).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_field_types_in_structs_are_skippable() {
        let mut p = BinaryProtocol::new(MemoryBuffer::new());
        p.write_struct_begin("s").await.unwrap();
        p.write_field_begin("weird", TypeTag::Double, 9).await.unwrap();
        p.write_double(1.0).await.unwrap();
        p.write_field_end().await.unwrap();
        p.write_field_stop().await.unwrap();
        p.write_struct_end().await.unwrap();

        p.read_struct_begin().await.unwrap();
        let field: FieldHeader = p.read_field_begin().await.unwrap();
        skip(&mut p, field.tag).await.unwrap();
        p.read_field_end().await.unwrap();
        assert!(p.read_field_begin().await.unwrap().is_stop());
    }

    #[tokio::test]
    async fn stop_and_void_cannot_be_skipped() {
        let mut p = BinaryProtocol::new(MemoryBuffer::new());
        assert!(matches!(
            skip(&mut p, TypeTag::Stop).await,
            Err(ProtocolError::InvalidData(_))
        ));
        assert!(matches!(
            skip(&mut p, TypeTag::Void).await,
            Err(ProtocolError::InvalidData(_))
        ));
    }
}
