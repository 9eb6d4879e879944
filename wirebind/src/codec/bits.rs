//! Raw bit-set field codec.

use crate::codec::{wrong_binding, BindingKind, Codec};
use crate::error::{Error, Result};
use crate::parser::ParseContext;
use crate::template::FieldBinding;
use crate::types::{Record, Value};

/// A run of bits of an evaluated length, bound as a packed set.
pub struct BitsCodec;

impl Codec for BitsCodec {
    fn kind(&self) -> BindingKind {
        BindingKind::Bits
    }

    fn decode(
        &self,
        ctx: &mut ParseContext,
        binding: &FieldBinding,
        record: &Record,
        root: &Record,
    ) -> Result<Value> {
        match binding {
            FieldBinding::Bits { size, bit_order } => {
                let len = ctx.evaluate_size(size, record, root)?;
                Ok(Value::Bits(ctx.buffer.read_bitset(len, *bit_order)?))
            }
            _ => Err(wrong_binding("bits binding")),
        }
    }

    fn encode(
        &self,
        ctx: &mut ParseContext,
        binding: &FieldBinding,
        record: &Record,
        root: &Record,
        value: &Value,
    ) -> Result<()> {
        match binding {
            FieldBinding::Bits { size, bit_order } => {
                let len = ctx.evaluate_size(size, record, root)?;
                let set = match value {
                    Value::Bits(set) => set,
                    _ => return Err(wrong_binding("bit set")),
                };
                if set.len() != len {
                    return Err(Error::SizeMismatch {
                        expected: len,
                        actual: set.len(),
                    });
                }

                ctx.buffer.write_bitset(set, *bit_order)
            }
            _ => Err(wrong_binding("bits binding")),
        }
    }
}
