//! Text field codecs.

use crate::codec::{wrong_binding, BindingKind, Codec};
use crate::error::{Error, Result};
use crate::parser::ParseContext;
use crate::template::FieldBinding;
use crate::types::{Record, Value};

/// Text of an evaluated byte count, decoded under the declared charset.
pub struct FixedTextCodec;

impl Codec for FixedTextCodec {
    fn kind(&self) -> BindingKind {
        BindingKind::FixedText
    }

    fn decode(
        &self,
        ctx: &mut ParseContext,
        binding: &FieldBinding,
        record: &Record,
        root: &Record,
    ) -> Result<Value> {
        match binding {
            FieldBinding::FixedText { size, charset } => {
                let byte_count = ctx.evaluate_size(size, record, root)?;
                Ok(Value::Str(ctx.buffer.read_text(byte_count, *charset)?))
            }
            _ => Err(wrong_binding("fixed text binding")),
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
            FieldBinding::FixedText { size, charset } => {
                let byte_count = ctx.evaluate_size(size, record, root)?;
                let text = value.as_str().ok_or_else(|| wrong_binding("string"))?;
                let bytes = charset.encode(text)?;
                if bytes.len() != byte_count {
                    return Err(Error::SizeMismatch {
                        expected: byte_count,
                        actual: bytes.len(),
                    });
                }

                ctx.buffer.write_bytes(&bytes)
            }
            _ => Err(wrong_binding("fixed text binding")),
        }
    }
}

/// Text scanned up to a terminator byte.
///
/// The terminator never becomes part of the value. When the binding
/// does not consume it, the byte is left for a later step, and the
/// encode pass correspondingly leaves writing it to that step.
pub struct TerminatedTextCodec;

impl Codec for TerminatedTextCodec {
    fn kind(&self) -> BindingKind {
        BindingKind::TerminatedText
    }

    fn decode(
        &self,
        ctx: &mut ParseContext,
        binding: &FieldBinding,
        _record: &Record,
        _root: &Record,
    ) -> Result<Value> {
        match binding {
            FieldBinding::TerminatedText {
                terminator,
                consume,
                charset,
            } => Ok(Value::Str(ctx.buffer.read_text_until(
                *terminator,
                *consume,
                *charset,
            )?)),
            _ => Err(wrong_binding("terminated text binding")),
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
            FieldBinding::TerminatedText {
                terminator,
                consume,
                charset,
            } => {
                let text = value.as_str().ok_or_else(|| wrong_binding("string"))?;
                ctx.buffer.write_text(text, *charset)?;
                if *consume {
                    ctx.buffer.write_u8(*terminator)?;
                }

                Ok(())
            }
            _ => Err(wrong_binding("terminated text binding")),
        }
    }
}
