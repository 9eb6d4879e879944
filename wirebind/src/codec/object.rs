//! Nested-object field codec and choice resolution.

use crate::codec::{wrong_binding, BindingKind, Codec};
use crate::error::{Error, Result};
use crate::parser::{decode_body, encode_body, ParseContext};
use crate::template::{ChoiceSet, FieldBinding, Template};
use crate::types::{ByteOrder, Record, Value};
use std::sync::Arc;

/// Resolve the concrete template for a decode.
///
/// If the set declares a prefix width, that many bits are read first
/// and published to conditions under the reserved `prefix` binding.
/// Alternatives are then tried in declaration order; the first whose
/// condition holds wins. A declared default type catches everything
/// else; without one the decode fails.
pub(crate) fn resolve_decode_type(
    ctx: &mut ParseContext,
    choices: &ChoiceSet,
    record: &Record,
    root: &Record,
) -> Result<Arc<Template>> {
    if choices.prefix_bits > 0 {
        let prefix = ctx
            .buffer
            .read_unsigned(choices.prefix_bits, ByteOrder::BigEndian)?;
        ctx.prefix = Some(prefix);
    }

    for alternative in &choices.alternatives {
        if ctx.evaluate_bool(&alternative.condition, record, root)? {
            return lookup(ctx, &alternative.type_name);
        }
    }

    match &choices.default_type {
        Some(name) => lookup(ctx, name),
        None => Err(Error::NoMatchingChoice),
    }
}

/// Resolve the alternative matching a record's runtime type for an
/// encode, writing its prefix when the set declares a prefix width.
pub(crate) fn write_choice_prefix(
    ctx: &mut ParseContext,
    choices: &ChoiceSet,
    element: &Record,
) -> Result<Arc<Template>> {
    let alternative = choices
        .alternatives
        .iter()
        .find(|alternative| alternative.type_name == element.type_name());

    match alternative {
        Some(alternative) => {
            if choices.prefix_bits > 0 {
                ctx.buffer.write_unsigned(
                    alternative.prefix,
                    choices.prefix_bits,
                    ByteOrder::BigEndian,
                )?;
                ctx.prefix = Some(alternative.prefix);
            }
            lookup(ctx, &alternative.type_name)
        }
        None => match &choices.default_type {
            // A default-typed value carries no alternative, so there is
            // no prefix to reproduce on the wire.
            Some(name) if choices.prefix_bits == 0 && name == element.type_name() => {
                lookup(ctx, name)
            }
            _ => Err(Error::NoMatchingChoice),
        },
    }
}

fn lookup(ctx: &ParseContext, name: &str) -> Result<Arc<Template>> {
    ctx.templates
        .get(name)
        .cloned()
        .ok_or_else(|| Error::UnknownTemplate(name.to_string()))
}

/// A nested record, possibly selected from polymorphic alternatives.
///
/// The nested template's steps run in place against the same buffer;
/// the parent root is propagated so its fields stay reachable from
/// expressions inside the nested layout.
pub struct ObjectCodec;

impl Codec for ObjectCodec {
    fn kind(&self) -> BindingKind {
        BindingKind::Object
    }

    fn decode(
        &self,
        ctx: &mut ParseContext,
        binding: &FieldBinding,
        record: &Record,
        root: &Record,
    ) -> Result<Value> {
        match binding {
            FieldBinding::Object { choices } => {
                let template = resolve_decode_type(ctx, choices, record, root)?;
                let nested = decode_body(ctx, &template, Some(root))?;
                Ok(Value::Record(nested))
            }
            _ => Err(wrong_binding("object binding")),
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
            FieldBinding::Object { choices } => {
                let nested = value.as_record().ok_or_else(|| wrong_binding("record"))?;
                let template = write_choice_prefix(ctx, choices, nested)?;
                encode_body(ctx, &template, nested, Some(root))
            }
            _ => Err(wrong_binding("object binding")),
        }
    }
}
