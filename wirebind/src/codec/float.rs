//! Floating-point field codec.

use crate::codec::{wrong_binding, BindingKind, Codec};
use crate::error::Result;
use crate::parser::ParseContext;
use crate::template::FieldBinding;
use crate::types::{Record, Value};

/// IEEE 754 singles and doubles, carried through their bit patterns.
pub struct FloatCodec;

impl Codec for FloatCodec {
    fn kind(&self) -> BindingKind {
        BindingKind::Float
    }

    fn decode(
        &self,
        ctx: &mut ParseContext,
        binding: &FieldBinding,
        _record: &Record,
        _root: &Record,
    ) -> Result<Value> {
        match binding {
            FieldBinding::Float { wide, order } => {
                let value = if *wide {
                    ctx.buffer.read_f64(*order)?
                } else {
                    ctx.buffer.read_f32(*order)? as f64
                };
                Ok(Value::Float(value))
            }
            _ => Err(wrong_binding("float binding")),
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
            FieldBinding::Float { wide, order } => {
                let v = value.as_f64().ok_or_else(|| wrong_binding("float"))?;
                if *wide {
                    ctx.buffer.write_f64(v, *order)
                } else {
                    ctx.buffer.write_f32(v as f32, *order)
                }
            }
            _ => Err(wrong_binding("float binding")),
        }
    }
}
