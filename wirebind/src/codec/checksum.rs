//! Transmitted-checksum codec.

use crate::codec::{wrong_binding, BindingKind, Codec};
use crate::error::Result;
use crate::parser::ParseContext;
use crate::template::FieldBinding;
use crate::types::{Record, Value};

/// The checksum field as it appears on the wire.
///
/// Decoding reads the transmitted value as a plain unsigned integer;
/// verification happens later, in the driver's post pass. Encoding
/// writes zeros to reserve the space the driver patches once the
/// window is complete.
pub struct ChecksumCodec;

impl Codec for ChecksumCodec {
    fn kind(&self) -> BindingKind {
        BindingKind::Checksum
    }

    fn decode(
        &self,
        ctx: &mut ParseContext,
        binding: &FieldBinding,
        _record: &Record,
        _root: &Record,
    ) -> Result<Value> {
        match binding {
            FieldBinding::Integer { bits, order, .. } => {
                Ok(Value::UInt(ctx.buffer.read_unsigned(*bits, *order)?))
            }
            _ => Err(wrong_binding("checksum binding")),
        }
    }

    fn encode(
        &self,
        ctx: &mut ParseContext,
        binding: &FieldBinding,
        _record: &Record,
        _root: &Record,
        _value: &Value,
    ) -> Result<()> {
        match binding {
            FieldBinding::Integer { bits, .. } => {
                ctx.buffer.write_fill(*bits as usize);
                Ok(())
            }
            _ => Err(wrong_binding("checksum binding")),
        }
    }
}
