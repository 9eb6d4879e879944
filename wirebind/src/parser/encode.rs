//! The encode pass: composing a record back into wire bytes.

use crate::buffer::BitBuffer;
use crate::codec::BindingKind;
use crate::error::{Error, Result};
use crate::parser::context::{select_converter, ParseContext};
use crate::parser::decode::compute_window;
use crate::template::{BindStep, ChecksumSpec, FieldBinding, SkipMode, Step, Template};
use crate::types::{Record, Value};

/// Compose one message: header start bytes, then the step walk.
pub fn encode_message(ctx: &mut ParseContext, template: &Template, record: &Record) -> Result<()> {
    if let Some(header) = template.header() {
        if let Some(sequence) = header.start_sequences().first() {
            ctx.buffer.write_bytes(sequence)?;
        }
    }

    encode_body(ctx, template, record, None)?;
    ctx.buffer.flush();
    Ok(())
}

/// Walk a template's steps over a record, writing to the buffer.
///
/// Mirrors the decode pass: skips emit fill bits or their terminator,
/// binds run converter-inverse then write, the checksum step reserves
/// its space and is patched once the window is complete. Post-process
/// rewrites overwrite the working record at their step's order, before
/// that step writes.
pub(crate) fn encode_body(
    ctx: &mut ParseContext,
    template: &Template,
    record: &Record,
    root: Option<&Record>,
) -> Result<()> {
    let start_position = ctx.buffer.position();
    let mut working = record.clone();
    let mut reserved: Option<(usize, &ChecksumSpec)> = None;

    for step in template.steps() {
        match step {
            Step::Skip(skip) => {
                let proceed = ctx.evaluate_bool(
                    &skip.condition,
                    &working,
                    root.unwrap_or(&working),
                )?;
                if !proceed {
                    continue;
                }

                match &skip.mode {
                    SkipMode::Bits(size) => {
                        let bits =
                            ctx.evaluate_size(size, &working, root.unwrap_or(&working))?;
                        ctx.buffer.write_fill(bits);
                    }
                    SkipMode::UntilTerminator { terminator, consume } => {
                        if *consume {
                            ctx.buffer.write_u8(*terminator)?;
                        }
                    }
                }
            }
            Step::Bind(bind) => {
                encode_bind(ctx, template, bind, &mut working, root)
                    .map_err(|e| e.in_field(template.name(), &bind.field))?;
            }
            Step::Checksum(spec) => {
                if ctx.buffer.position() % 8 != 0 {
                    return Err(Error::Misaligned.in_field(template.name(), &spec.field));
                }
                reserved = Some((ctx.buffer.position() / 8, spec));

                let codec = ctx.codecs.get(BindingKind::Checksum)?.clone();
                let binding = FieldBinding::Integer {
                    bits: spec.algorithm.width_bits(),
                    signed: false,
                    order: spec.byte_order,
                };
                codec
                    .encode(ctx, &binding, &working, root.unwrap_or(&working), &Value::UInt(0))
                    .map_err(|e| e.in_field(template.name(), &spec.field))?;
            }
        }
    }

    if let Some(header) = template.header() {
        let end = header.end_sequence();
        if !end.is_empty() {
            ctx.buffer.flush();
            ctx.buffer.write_bytes(end)?;
        }
    }

    if let Some((slot, spec)) = reserved {
        ctx.buffer.flush();
        let computed = compute_window(ctx, spec, start_position)?;

        let mut patch = BitBuffer::new();
        patch.write_unsigned(computed, spec.algorithm.width_bits(), spec.byte_order)?;
        ctx.buffer.patch_bytes(slot, patch.as_bytes())?;
    }

    Ok(())
}

fn encode_bind(
    ctx: &mut ParseContext,
    template: &Template,
    bind: &BindStep,
    working: &mut Record,
    root: Option<&Record>,
) -> Result<()> {
    if let Some(rewrite) = &bind.rewrite {
        let holds = ctx.evaluate_bool(&rewrite.condition, working, root.unwrap_or(working))?;
        if holds {
            let value =
                ctx.evaluate(&rewrite.expression, working, root.unwrap_or(working))?;
            working.set(&bind.field, value);
        }
    }

    let present = ctx.evaluate_bool(&bind.condition, working, root.unwrap_or(working))?;
    if !present {
        return Ok(());
    }

    ctx.listener
        .writing_field(template.name(), &bind.field, BindingKind::of(&bind.binding));

    let value = working.get(&bind.field).cloned().unwrap_or(Value::Null);
    if value.is_null() {
        return Err(Error::MissingField(bind.field.clone()));
    }

    if let Some(validator) = &bind.validator {
        validator.validate(&value)?;
    }

    let converter = select_converter(ctx, &bind.converters, working, root.unwrap_or(working))?;
    let wire = match converter {
        Some(converter) => converter.encode(value)?,
        None => value,
    };

    let codec = ctx.codecs.get(BindingKind::of(&bind.binding))?.clone();
    codec.encode(ctx, &bind.binding, working, root.unwrap_or(working), &wire)?;

    ctx.listener.written_field(template.name(), &bind.field);
    Ok(())
}
