//! The decode pass: walking a template's steps over a buffer.

use crate::codec::BindingKind;
use crate::error::{Error, Result};
use crate::parser::context::{select_converter, ParseContext};
use crate::template::{BindStep, ChecksumSpec, FieldBinding, SkipMode, Step, Template};
use crate::types::{Record, Value};

/// Decode one message, starting at the buffer's cursor.
///
/// Recognizes and consumes the template's header start sequence first;
/// when several are declared, the longest one present wins. The rest of
/// the message is then driven by [`decode_body`].
pub fn decode_message(ctx: &mut ParseContext, template: &Template) -> Result<Record> {
    if let Some(header) = template.header() {
        if !header.start_sequences().is_empty() {
            let matched = header
                .start_sequences()
                .iter()
                .filter(|sequence| starts_with(ctx, sequence))
                .max_by_key(|sequence| sequence.len())
                .cloned();

            match matched {
                Some(sequence) => ctx.buffer.skip(sequence.len() * 8)?,
                None => return Err(Error::NoMatchingTemplate),
            }
        }
    }

    decode_body(ctx, template, None)
}

fn starts_with(ctx: &ParseContext, sequence: &[u8]) -> bool {
    let bytes = ctx.buffer.as_bytes();
    let start = ctx.buffer.position() / 8;
    bytes.len() >= start + sequence.len() && &bytes[start..start + sequence.len()] == sequence
}

/// Walk a template's steps and post passes against the buffer.
///
/// `root` is the outermost record when this is a nested decode; the
/// fresh record doubles as the root otherwise. Field side effects occur
/// in step-declaration order, derived fields after all binds, and the
/// terminator and checksum checks run last, in that order.
pub(crate) fn decode_body(
    ctx: &mut ParseContext,
    template: &Template,
    root: Option<&Record>,
) -> Result<Record> {
    let start_position = ctx.buffer.position();
    let mut record = Record::new(template.name());
    let mut transmitted_checksum = None;

    for step in template.steps() {
        match step {
            Step::Skip(skip) => {
                let proceed = ctx.evaluate_bool(
                    &skip.condition,
                    &record,
                    root.unwrap_or(&record),
                )?;
                if !proceed {
                    continue;
                }

                match &skip.mode {
                    SkipMode::Bits(size) => {
                        let bits =
                            ctx.evaluate_size(size, &record, root.unwrap_or(&record))?;
                        ctx.buffer.skip(bits)?;
                    }
                    SkipMode::UntilTerminator { terminator, consume } => {
                        ctx.buffer.skip_until(*terminator, *consume)?;
                    }
                }
            }
            Step::Bind(bind) => {
                decode_bind(ctx, template, bind, &mut record, root)
                    .map_err(|e| e.in_field(template.name(), &bind.field))?;
            }
            Step::Checksum(spec) => {
                let value = decode_checksum(ctx, spec, &record, root)
                    .map_err(|e| e.in_field(template.name(), &spec.field))?;
                transmitted_checksum = value.as_u64();
                record.set(&spec.field, value);
            }
        }
    }

    for derived in template.evaluated_fields() {
        let run = (|| -> Result<Option<Value>> {
            let holds = ctx.evaluate_bool(
                &derived.condition,
                &record,
                root.unwrap_or(&record),
            )?;
            if !holds {
                return Ok(None);
            }

            ctx.listener.evaluating_field(template.name(), &derived.field);
            let value =
                ctx.evaluate(&derived.expression, &record, root.unwrap_or(&record))?;
            Ok(Some(value))
        })()
        .map_err(|e| e.in_field(template.name(), &derived.field))?;

        if let Some(value) = run {
            ctx.listener
                .evaluated_field(template.name(), &derived.field, &value);
            record.set(&derived.field, value);
        }
    }

    if let Some(header) = template.header() {
        let end = header.end_sequence();
        if !end.is_empty() {
            ctx.buffer.align_to_byte()?;
            let actual = ctx.buffer.read_bytes(end.len())?;
            if actual != end {
                return Err(Error::TerminatorMismatch);
            }
        }
    }

    if let Some(spec) = template.checksum() {
        // The compose pass zero-fills up to the byte boundary before
        // computing the window; consume that padding here so both
        // passes see the same window end.
        ctx.buffer.align_to_byte()?;
        let transmitted = transmitted_checksum.unwrap_or(0);
        let computed = compute_window(ctx, spec, start_position)?;
        if computed != transmitted {
            return Err(Error::ChecksumMismatch {
                computed,
                transmitted,
            });
        }
    }

    Ok(record)
}

fn decode_bind(
    ctx: &mut ParseContext,
    template: &Template,
    bind: &BindStep,
    record: &mut Record,
    root: Option<&Record>,
) -> Result<()> {
    let present = ctx.evaluate_bool(&bind.condition, record, root.unwrap_or(record))?;
    if !present {
        // A false condition leaves the field default-initialized and
        // consumes no bits.
        record.set(&bind.field, Value::Null);
        return Ok(());
    }

    ctx.listener
        .decoding_field(template.name(), &bind.field, BindingKind::of(&bind.binding));

    let codec = ctx.codecs.get(BindingKind::of(&bind.binding))?.clone();
    let wire = codec.decode(ctx, &bind.binding, record, root.unwrap_or(record))?;

    let converter = select_converter(ctx, &bind.converters, record, root.unwrap_or(record))?;
    let value = match converter {
        Some(converter) => converter.decode(wire)?,
        None => wire,
    };

    if let Some(validator) = &bind.validator {
        validator.validate(&value)?;
    }

    ctx.listener
        .decoded_field(template.name(), &bind.field, &value);
    record.set(&bind.field, value);
    Ok(())
}

fn decode_checksum(
    ctx: &mut ParseContext,
    spec: &ChecksumSpec,
    record: &Record,
    root: Option<&Record>,
) -> Result<Value> {
    let codec = ctx.codecs.get(BindingKind::Checksum)?.clone();
    let binding = FieldBinding::Integer {
        bits: spec.algorithm.width_bits(),
        signed: false,
        order: spec.byte_order,
    };

    codec.decode(ctx, &binding, record, root.unwrap_or(record))
}

/// Recompute the declared algorithm over the checksum window.
///
/// The window is `[start + skip_start, cursor - skip_end)` in bytes,
/// where `start` is where this body began and `cursor` is the current
/// read position.
pub(crate) fn compute_window(
    ctx: &ParseContext,
    spec: &ChecksumSpec,
    start_position: usize,
) -> Result<u64> {
    let from = start_position / 8 + spec.skip_start;
    let to = (ctx.buffer.position() / 8)
        .checked_sub(spec.skip_end)
        .ok_or(Error::UnexpectedEof)?;
    let window = ctx.buffer.window(from, to)?;

    Ok(spec.algorithm.compute(window, spec.start_value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BitBuffer;
    use crate::codec::CodecRegistry;
    use crate::eval::UserContext;
    use crate::listener::NullListener;
    use crate::template::{BindStep, ChoiceSet, Header, TemplateBuilder, TemplateStore};
    use crate::types::{ByteOrder, Charset};

    fn uint(bits: u32) -> FieldBinding {
        FieldBinding::Integer {
            bits,
            signed: false,
            order: ByteOrder::BigEndian,
        }
    }

    fn run_decode(store: &TemplateStore, template: &Template, bytes: &[u8]) -> Result<Record> {
        let mut buffer = BitBuffer::from_bytes(bytes);
        let codecs = CodecRegistry::new();
        let user = UserContext::new();
        let mut ctx = ParseContext {
            buffer: &mut buffer,
            templates: store,
            codecs: &codecs,
            user: &user,
            listener: &NullListener,
            prefix: None,
        };

        decode_message(&mut ctx, template)
    }

    #[test]
    fn longest_header_start_is_consumed() {
        let store = TemplateStore::new();
        let template = TemplateBuilder::new("Tagged")
            .header(Header::new(&["A", "AB"], "", Charset::Ascii).unwrap())
            .bind(BindStep::new("v", uint(8)))
            .build()
            .unwrap();

        // Both "A" and "AB" match; the longer one must win, leaving
        // 0x05 for the field.
        let record = run_decode(&store, &template, b"AB\x05").unwrap();
        assert_eq!(Some(&Value::UInt(5)), record.get("v"));
    }

    #[test]
    fn nested_decode_sees_the_parent_root() {
        let mut store = TemplateStore::new();
        store
            .register(
                TemplateBuilder::new("Inner")
                    .bind(BindStep::new(
                        "items",
                        FieldBinding::ArrayPrimitive {
                            element: Box::new(uint(8)),
                            size: "root.n".to_string(),
                        },
                    ))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let outer = TemplateBuilder::new("Outer")
            .bind(BindStep::new("n", uint(8)))
            .bind(BindStep::new(
                "body",
                FieldBinding::Object {
                    choices: ChoiceSet::single("Inner"),
                },
            ))
            .build()
            .unwrap();

        let record = run_decode(&store, &outer, &[0x02, 0x0A, 0x0B]).unwrap();
        let body = record.get("body").and_then(|v| v.as_record()).unwrap();
        assert_eq!(
            Some(&Value::List(vec![Value::UInt(0x0A), Value::UInt(0x0B)])),
            body.get("items")
        );
    }

    #[test]
    fn unregistered_nested_type_fails() {
        let store = TemplateStore::new();
        let outer = TemplateBuilder::new("Outer")
            .bind(BindStep::new(
                "body",
                FieldBinding::Object {
                    choices: ChoiceSet::single("Missing"),
                },
            ))
            .build()
            .unwrap();

        let err = run_decode(&store, &outer, &[0x00]).unwrap_err();
        assert!(matches!(
            err,
            Error::InField { ref source, .. } if matches!(**source, Error::UnknownTemplate(_))
        ));
    }
}
