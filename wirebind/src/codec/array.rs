//! Fixed-count array codecs.

use crate::codec::object::{resolve_decode_type, write_choice_prefix};
use crate::codec::{wrong_binding, BindingKind, Codec};
use crate::error::{Error, Result};
use crate::parser::{decode_body, encode_body, ParseContext};
use crate::template::FieldBinding;
use crate::types::{Record, Value};

/// An evaluated count of primitive elements, all sharing one binding.
///
/// Element zero is the first on the wire in both passes.
pub struct ArrayPrimitiveCodec;

impl Codec for ArrayPrimitiveCodec {
    fn kind(&self) -> BindingKind {
        BindingKind::ArrayPrimitive
    }

    fn decode(
        &self,
        ctx: &mut ParseContext,
        binding: &FieldBinding,
        record: &Record,
        root: &Record,
    ) -> Result<Value> {
        match binding {
            FieldBinding::ArrayPrimitive { element, size } => {
                let count = ctx.evaluate_size(size, record, root)?;
                let codec = ctx.codecs.get(BindingKind::of(element))?.clone();

                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(codec.decode(ctx, element, record, root)?);
                }

                Ok(Value::List(items))
            }
            _ => Err(wrong_binding("primitive array binding")),
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
            FieldBinding::ArrayPrimitive { element, size } => {
                let count = ctx.evaluate_size(size, record, root)?;
                let items = match value {
                    Value::List(items) => items,
                    _ => return Err(wrong_binding("list")),
                };
                if items.len() != count {
                    return Err(Error::SizeMismatch {
                        expected: count,
                        actual: items.len(),
                    });
                }

                let codec = ctx.codecs.get(BindingKind::of(element))?.clone();
                for item in items {
                    codec.encode(ctx, element, record, root, item)?;
                }

                Ok(())
            }
            _ => Err(wrong_binding("primitive array binding")),
        }
    }
}

/// An evaluated count of nested records, each resolved through the
/// choice set independently.
pub struct ArrayObjectCodec;

impl Codec for ArrayObjectCodec {
    fn kind(&self) -> BindingKind {
        BindingKind::ArrayObject
    }

    fn decode(
        &self,
        ctx: &mut ParseContext,
        binding: &FieldBinding,
        record: &Record,
        root: &Record,
    ) -> Result<Value> {
        match binding {
            FieldBinding::ArrayObject { choices, size } => {
                let count = ctx.evaluate_size(size, record, root)?;

                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    let template = resolve_decode_type(ctx, choices, record, root)?;
                    let nested = decode_body(ctx, &template, Some(root))?;
                    items.push(Value::Record(nested));
                }

                Ok(Value::List(items))
            }
            _ => Err(wrong_binding("object array binding")),
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
            FieldBinding::ArrayObject { choices, size } => {
                let count = ctx.evaluate_size(size, record, root)?;
                let items = match value {
                    Value::List(items) => items,
                    _ => return Err(wrong_binding("list")),
                };
                if items.len() != count {
                    return Err(Error::SizeMismatch {
                        expected: count,
                        actual: items.len(),
                    });
                }

                for item in items {
                    let nested = item.as_record().ok_or_else(|| wrong_binding("record"))?;
                    let template = write_choice_prefix(ctx, choices, nested)?;
                    encode_body(ctx, &template, nested, Some(root))?;
                }

                Ok(())
            }
            _ => Err(wrong_binding("object array binding")),
        }
    }
}
