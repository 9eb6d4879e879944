//! Integer field codec.

use crate::codec::{wrong_binding, BindingKind, Codec};
use crate::error::Result;
use crate::parser::ParseContext;
use crate::template::FieldBinding;
use crate::types::{Record, Value};

/// Signed and unsigned integers of any width from 1 to 64 bits.
///
/// Widths of 8, 16, 32, and 64 are the plain primitives; everything
/// else is a bit field packed tight against its neighbors.
pub struct IntegerCodec;

impl Codec for IntegerCodec {
    fn kind(&self) -> BindingKind {
        BindingKind::Integer
    }

    fn decode(
        &self,
        ctx: &mut ParseContext,
        binding: &FieldBinding,
        _record: &Record,
        _root: &Record,
    ) -> Result<Value> {
        match binding {
            FieldBinding::Integer {
                bits,
                signed,
                order,
            } => {
                if *signed {
                    Ok(Value::Int(ctx.buffer.read_signed(*bits, *order)?))
                } else {
                    Ok(Value::UInt(ctx.buffer.read_unsigned(*bits, *order)?))
                }
            }
            _ => Err(wrong_binding("integer binding")),
        }
    }

    fn encode(
        &self,
        ctx: &mut ParseContext,
        binding: &FieldBinding,
        _record: &Record,
        _root: &Record,
        value: &Value,
    ) -> Result<()> {
        match binding {
            FieldBinding::Integer {
                bits,
                signed,
                order,
            } => {
                if *signed {
                    let v = value.as_i64().ok_or_else(|| wrong_binding("signed integer"))?;
                    ctx.buffer.write_signed(v, *bits, *order)
                } else {
                    let v = value
                        .as_u64()
                        .ok_or_else(|| wrong_binding("unsigned integer"))?;
                    ctx.buffer.write_unsigned(v, *bits, *order)
                }
            }
            _ => Err(wrong_binding("integer binding")),
        }
    }
}
