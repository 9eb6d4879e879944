//! Terminator-delimited list codec.

use crate::codec::object::{resolve_decode_type, write_choice_prefix};
use crate::codec::{wrong_binding, BindingKind, Codec};
use crate::error::{Error, Result};
use crate::parser::{decode_body, encode_body, ParseContext};
use crate::template::FieldBinding;
use crate::types::{Record, Value};

/// Nested records repeated until the terminator byte is next.
///
/// Decoding peeks one byte ahead of every element; the element count is
/// whatever the wire carries. The terminator must be present, and is
/// consumed only when the binding says so. Encoding writes the elements
/// and then the terminator under the same rule.
pub struct ListCodec;

impl Codec for ListCodec {
    fn kind(&self) -> BindingKind {
        BindingKind::List
    }

    fn decode(
        &self,
        ctx: &mut ParseContext,
        binding: &FieldBinding,
        record: &Record,
        root: &Record,
    ) -> Result<Value> {
        match binding {
            FieldBinding::List {
                choices,
                terminator,
                consume,
            } => {
                let mut items = Vec::new();
                loop {
                    if ctx.buffer.remaining_bits() < 8 {
                        return Err(Error::TerminatorNotFound {
                            terminator: *terminator,
                        });
                    }

                    let next: u8 = ctx.buffer.peek_bits(8)?;
                    if next == *terminator {
                        if *consume {
                            ctx.buffer.skip(8)?;
                        }
                        break;
                    }

                    let template = resolve_decode_type(ctx, choices, record, root)?;
                    let nested = decode_body(ctx, &template, Some(root))?;
                    items.push(Value::Record(nested));
                }

                Ok(Value::List(items))
            }
            _ => Err(wrong_binding("list binding")),
        }
    }

    fn encode(
        &self,
        ctx: &mut ParseContext,
        binding: &FieldBinding,
        _record: &Record,
        root: &Record,
        value: &Value,
    ) -> Result<()> {
        match binding {
            FieldBinding::List {
                choices,
                terminator,
                consume,
            } => {
                let items = match value {
                    Value::List(items) => items,
                    _ => return Err(wrong_binding("list")),
                };

                for item in items {
                    let nested = item.as_record().ok_or_else(|| wrong_binding("record"))?;
                    let template = write_choice_prefix(ctx, choices, nested)?;
                    encode_body(ctx, &template, nested, Some(root))?;
                }

                if *consume {
                    ctx.buffer.write_u8(*terminator)?;
                }

                Ok(())
            }
            _ => Err(wrong_binding("list binding")),
        }
    }
}
