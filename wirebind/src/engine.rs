//! The engine façade tying templates, codecs, and context together.

use crate::buffer::BitBuffer;
use crate::codec::{Codec, CodecRegistry};
use crate::describe::{describe_context, describe_template};
use crate::error::{Error, Result};
use crate::eval::{ContextMethod, UserContext};
use crate::listener::{EventListener, NullListener};
use crate::parser::{decode_message, encode_message, ParseContext};
use crate::template::{Template, TemplateStore};
use crate::types::{Record, Value};
use std::sync::Arc;

/// Outcome of a bulk compose: every successful encoding concatenated,
/// plus the index and cause of every failure.
pub struct ComposeSummary {
    pub bytes: Vec<u8>,
    pub errors: Vec<(usize, Error)>,
}

impl ComposeSummary {
    /// Whether every record composed cleanly.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// All registered state plus the public parse/compose operations.
///
/// Registration happens up front; afterwards the engine is shared
/// read-only and any number of parses may run against it in parallel,
/// each with its own buffer and record.
pub struct Engine {
    templates: TemplateStore,
    codecs: CodecRegistry,
    user: UserContext,
    listener: Arc<dyn EventListener>,
}

impl Engine {
    /// An engine with the default codec set and a silent listener.
    pub fn new() -> Self {
        Self {
            templates: TemplateStore::new(),
            codecs: CodecRegistry::new(),
            user: UserContext::new(),
            listener: Arc::new(NullListener),
        }
    }

    /// Register a built template.
    pub fn register_template(&mut self, template: Template) -> Result<Arc<Template>> {
        self.templates.register(template)
    }

    /// Register a codec for a so-far-unoccupied kind.
    pub fn register_codec(&mut self, codec: Arc<dyn Codec>) -> Result<()> {
        self.codecs.register(codec)
    }

    /// Swap in a codec, displacing the registered one.
    pub fn replace_codec(&mut self, codec: Arc<dyn Codec>) {
        self.codecs.replace(codec)
    }

    /// Publish a named context value for expressions.
    pub fn register_context(&mut self, key: &str, value: Value) {
        self.user.set_value(key, value);
    }

    /// Publish a named context method for expressions.
    pub fn register_context_method(&mut self, name: &str, method: ContextMethod) {
        self.user.set_method(name, method);
    }

    /// Install an event listener in place of the silent default.
    pub fn set_listener(&mut self, listener: Arc<dyn EventListener>) {
        self.listener = listener;
    }

    /// Fetch a registered template by name.
    pub fn template(&self, name: &str) -> Result<Arc<Template>> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownTemplate(name.to_string()))
    }

    /// Decode one message from the start of `bytes`.
    ///
    /// Returns the record and how many bytes the message occupied.
    pub fn parse(&self, template: &Template, bytes: &[u8]) -> Result<(Record, usize)> {
        let mut buffer = BitBuffer::from_bytes(bytes);
        let mut ctx = ParseContext {
            buffer: &mut buffer,
            templates: &self.templates,
            codecs: &self.codecs,
            user: &self.user,
            listener: self.listener.as_ref(),
            prefix: None,
        };

        let record = decode_message(&mut ctx, template)?;
        let consumed = (buffer.position() + 7) / 8;
        Ok((record, consumed))
    }

    /// Encode one record into wire bytes.
    pub fn compose(&self, template: &Template, record: &Record) -> Result<Vec<u8>> {
        let mut buffer = BitBuffer::new();
        let mut ctx = ParseContext {
            buffer: &mut buffer,
            templates: &self.templates,
            codecs: &self.codecs,
            user: &self.user,
            listener: self.listener.as_ref(),
            prefix: None,
        };

        encode_message(&mut ctx, template, record)?;
        Ok(buffer.into_bytes())
    }

    /// Encode a batch of records, isolating per-record failures.
    ///
    /// A record that fails contributes nothing to the output bytes; the
    /// following records still compose.
    pub fn compose_all(&self, template: &Template, records: &[Record]) -> ComposeSummary {
        let mut bytes = Vec::new();
        let mut errors = Vec::new();
        for (index, record) in records.iter().enumerate() {
            match self.compose(template, record) {
                Ok(encoded) => bytes.extend_from_slice(&encoded),
                Err(error) => errors.push((index, error)),
            }
        }

        ComposeSummary { bytes, errors }
    }

    /// Project a template (and the user context) into a JSON tree.
    pub fn describe(&self, template: &Template) -> serde_json::Value {
        let mut description = describe_template(template);
        if let Some(map) = description.as_object_mut() {
            map.insert("context".to_string(), describe_context(&self.user));
        }

        description
    }

    /// Scan for the earliest offset at or after `offset` where any
    /// registered template's start sequence begins.
    pub fn find_next_message(&self, bytes: &[u8], offset: usize) -> Option<usize> {
        (offset..bytes.len()).find(|position| {
            self.templates.iter().any(|template| {
                template
                    .header()
                    .map(|header| {
                        header
                            .start_sequences()
                            .iter()
                            .any(|sequence| matches_at(bytes, *position, sequence))
                    })
                    .unwrap_or(false)
            })
        })
    }

    /// Resolve which template claims the message at `offset`.
    ///
    /// When several start sequences match, the longest match wins, so a
    /// template whose marker extends another's takes precedence.
    pub fn template_for(&self, bytes: &[u8], offset: usize) -> Result<Arc<Template>> {
        let mut best: Option<(usize, &Arc<Template>)> = None;
        for template in self.templates.iter() {
            if let Some(header) = template.header() {
                for sequence in header.start_sequences() {
                    if matches_at(bytes, offset, sequence) {
                        let longer = best
                            .map(|(length, _)| sequence.len() > length)
                            .unwrap_or(true);
                        if longer {
                            best = Some((sequence.len(), template));
                        }
                    }
                }
            }
        }

        best.map(|(_, template)| Arc::clone(template))
            .ok_or(Error::NoMatchingTemplate)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

fn matches_at(bytes: &[u8], offset: usize, sequence: &[u8]) -> bool {
    !sequence.is_empty()
        && bytes.len() >= offset + sequence.len()
        && &bytes[offset..offset + sequence.len()] == sequence
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumAlgorithm;
    use crate::template::{
        BindStep, ChecksumSpec, ChoiceAlternative, ChoiceSet, Converter, ConverterChoices,
        EvaluatedField, FieldBinding, Header, TemplateBuilder, Validator,
    };
    use crate::types::{BitOrder, BitSet, ByteOrder, Charset};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn uint(bits: u32) -> FieldBinding {
        FieldBinding::Integer {
            bits,
            signed: false,
            order: ByteOrder::BigEndian,
        }
    }

    fn ack_template() -> Template {
        TemplateBuilder::new("Ack")
            .header(Header::new(&["ACK"], "", Charset::Ascii).unwrap())
            .bind(BindStep::new("payload_len", uint(8)))
            .bind(BindStep::new(
                "payload",
                FieldBinding::ArrayPrimitive {
                    element: Box::new(uint(8)),
                    size: "payload_len".to_string(),
                },
            ))
            .checksum(ChecksumSpec {
                field: "crc".to_string(),
                algorithm: ChecksumAlgorithm::Crc16Ccitt,
                skip_start: 0,
                skip_end: 2,
                start_value: 0xFFFF,
                byte_order: ByteOrder::BigEndian,
            })
            .build()
            .unwrap()
    }

    fn ack_message() -> Vec<u8> {
        let crc = ChecksumAlgorithm::Crc16Ccitt.compute(&[0x03, 0x01, 0x02, 0x03], 0xFFFF);
        let mut bytes = vec![0x41, 0x43, 0x4B, 0x03, 0x01, 0x02, 0x03];
        bytes.push((crc >> 8) as u8);
        bytes.push(crc as u8);
        bytes
    }

    #[test]
    fn fixed_header_checksum_roundtrip() {
        let engine = Engine::new();
        let template = ack_template();
        let message = ack_message();

        let (record, consumed) = engine.parse(&template, &message).unwrap();
        assert_eq!(message.len(), consumed);
        assert_eq!(Some(&Value::UInt(3)), record.get("payload_len"));
        assert_eq!(
            Some(&Value::List(vec![
                Value::UInt(1),
                Value::UInt(2),
                Value::UInt(3)
            ])),
            record.get("payload")
        );

        let composed = engine.compose(&template, &record).unwrap();
        assert_eq!(message, composed);
    }

    #[test]
    fn tampered_checksum_is_rejected() {
        let engine = Engine::new();
        let template = ack_template();
        let mut message = ack_message();
        message[5] ^= 0x10;

        assert!(matches!(
            engine.parse(&template, &message),
            Err(Error::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn wrong_header_does_not_parse() {
        let engine = Engine::new();
        let template = ack_template();

        assert!(matches!(
            engine.parse(&template, &[0x4E, 0x41, 0x4B, 0x00]),
            Err(Error::NoMatchingTemplate)
        ));
    }

    fn choice_engine() -> (Engine, Arc<Template>) {
        let mut engine = Engine::new();
        engine
            .register_template(
                TemplateBuilder::new("TypeA")
                    .bind(BindStep::new("a", uint(4)))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        engine
            .register_template(
                TemplateBuilder::new("TypeB")
                    .bind(BindStep::new("b", uint(4)))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let wrap = engine
            .register_template(
                TemplateBuilder::new("Wrap")
                    .bind(BindStep::new(
                        "body",
                        FieldBinding::Object {
                            choices: ChoiceSet {
                                prefix_bits: 4,
                                alternatives: vec![
                                    ChoiceAlternative {
                                        condition: "prefix == 1".to_string(),
                                        prefix: 1,
                                        type_name: "TypeA".to_string(),
                                    },
                                    ChoiceAlternative {
                                        condition: "prefix == 2".to_string(),
                                        prefix: 2,
                                        type_name: "TypeB".to_string(),
                                    },
                                ],
                                default_type: None,
                            },
                        },
                    ))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        (engine, wrap)
    }

    #[test]
    fn object_choice_by_prefix() {
        let (engine, wrap) = choice_engine();

        let (record, _) = engine.parse(&wrap, &[0x15]).unwrap();
        let body = record.get("body").and_then(|v| v.as_record()).unwrap();
        assert_eq!("TypeA", body.type_name());
        assert_eq!(Some(&Value::UInt(5)), body.get("a"));

        let composed = engine.compose(&wrap, &record).unwrap();
        assert_eq!(vec![0x15], composed);
    }

    #[test]
    fn unmatched_prefix_fails() {
        let (engine, wrap) = choice_engine();

        let err = engine.parse(&wrap, &[0xF5]).unwrap_err();
        assert!(matches!(
            err,
            Error::InField { ref source, .. } if matches!(**source, Error::NoMatchingChoice)
        ));
    }

    #[test]
    fn first_matching_choice_wins() {
        let mut engine = Engine::new();
        for name in ["First", "Second"].iter() {
            engine
                .register_template(
                    TemplateBuilder::new(name)
                        .bind(BindStep::new("v", uint(4)))
                        .build()
                        .unwrap(),
                )
                .unwrap();
        }
        let wrap = engine
            .register_template(
                TemplateBuilder::new("Wrap")
                    .bind(BindStep::new(
                        "body",
                        FieldBinding::Object {
                            choices: ChoiceSet {
                                prefix_bits: 4,
                                alternatives: vec![
                                    ChoiceAlternative {
                                        condition: "prefix >= 1".to_string(),
                                        prefix: 1,
                                        type_name: "First".to_string(),
                                    },
                                    ChoiceAlternative {
                                        condition: "prefix >= 1".to_string(),
                                        prefix: 1,
                                        type_name: "Second".to_string(),
                                    },
                                ],
                                default_type: None,
                            },
                        },
                    ))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let (record, _) = engine.parse(&wrap, &[0x23]).unwrap();
        let body = record.get("body").and_then(|v| v.as_record()).unwrap();
        assert_eq!("First", body.type_name());
    }

    #[test]
    fn skip_steps_and_terminator_scan() {
        let engine = Engine::new();
        let template = TemplateBuilder::new("Skippy")
            .skip_bits("", "3")
            .skip_until("", 0x00, true)
            .bind(BindStep::new("tail", uint(8)))
            .build()
            .unwrap();

        let (record, _) = engine.parse(&template, &[0xE0, 0x00, 0xAB]).unwrap();
        assert_eq!(Some(&Value::UInt(0x05)), record.get("tail"));

        assert!(matches!(
            engine.parse(&template, &[0xE0, 0xFF]),
            Err(Error::TerminatorNotFound { terminator: 0x00 })
        ));
    }

    #[test]
    fn false_condition_leaves_field_default_and_consumes_nothing() {
        let engine = Engine::new();
        let template = TemplateBuilder::new("Opt")
            .bind(BindStep::new("flag", uint(8)))
            .bind(BindStep::new("extra", uint(8)).when("flag == 1"))
            .bind(BindStep::new("tail", uint(8)))
            .build()
            .unwrap();

        let (record, consumed) = engine.parse(&template, &[0x00, 0x09]).unwrap();
        assert_eq!(2, consumed);
        assert_eq!(Some(&Value::Null), record.get("extra"));
        assert_eq!(Some(&Value::UInt(9)), record.get("tail"));

        let (record, _) = engine.parse(&template, &[0x01, 0x07, 0x09]).unwrap();
        assert_eq!(Some(&Value::UInt(7)), record.get("extra"));
        assert_eq!(Some(&Value::UInt(9)), record.get("tail"));
    }

    #[test]
    fn evaluated_field_runs_after_binds() {
        let engine = Engine::new();
        let template = TemplateBuilder::new("Measured")
            .bind(BindStep::new("payload_len", uint(8)))
            .bind(BindStep::new(
                "payload",
                FieldBinding::ArrayPrimitive {
                    element: Box::new(uint(8)),
                    size: "payload_len".to_string(),
                },
            ))
            .evaluated(EvaluatedField::new("length", "payload.size * 8"))
            .build()
            .unwrap();

        let (record, _) = engine
            .parse(&template, &[0x04, 0x0A, 0x0B, 0x0C, 0x0D])
            .unwrap();
        assert_eq!(Some(&Value::Int(32)), record.get("length"));
    }

    #[test]
    fn endianness_pair() {
        let engine = Engine::new();
        for (order, expected) in [
            (ByteOrder::BigEndian, vec![0x12u8, 0x34]),
            (ByteOrder::LittleEndian, vec![0x34u8, 0x12]),
        ]
        .iter()
        {
            let template = TemplateBuilder::new("Short")
                .bind(BindStep::new(
                    "v",
                    FieldBinding::Integer {
                        bits: 16,
                        signed: false,
                        order: *order,
                    },
                ))
                .build()
                .unwrap();

            let mut record = Record::new("Short");
            record.set("v", Value::UInt(0x1234));
            let composed = engine.compose(&template, &record).unwrap();
            assert_eq!(*expected, composed);

            let (read_back, _) = engine.parse(&template, &composed).unwrap();
            assert_eq!(Some(&Value::UInt(0x1234)), read_back.get("v"));
        }
    }

    struct AtMost(u64);

    impl Validator for AtMost {
        fn validate(&self, value: &Value) -> crate::error::Result<()> {
            match value.as_u64() {
                Some(v) if v <= self.0 => Ok(()),
                _ => Err(Error::Validation(format!("value exceeds {}", self.0))),
            }
        }
    }

    #[test]
    fn bulk_compose_isolates_failures() {
        let engine = Engine::new();
        let template = TemplateBuilder::new("Pkt")
            .bind(
                BindStep::new("val", uint(8)).validated_by(Arc::new(AtMost(100))),
            )
            .build()
            .unwrap();

        let records: Vec<Record> = [50u64, 200, 60]
            .iter()
            .map(|v| {
                let mut record = Record::new("Pkt");
                record.set("val", Value::UInt(*v));
                record
            })
            .collect();

        let summary = engine.compose_all(&template, &records);
        assert!(!summary.is_complete());
        assert_eq!(1, summary.errors.len());
        assert_eq!(1, summary.errors[0].0);
        assert_eq!(vec![50u8, 60], summary.bytes);
    }

    #[test]
    fn longest_start_sequence_wins() {
        let mut engine = Engine::new();
        engine
            .register_template(
                TemplateBuilder::new("Short")
                    .header(Header::new(&["AB"], "", Charset::Ascii).unwrap())
                    .bind(BindStep::new("v", uint(8)))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        engine
            .register_template(
                TemplateBuilder::new("Long")
                    .header(Header::new(&["ABC"], "", Charset::Ascii).unwrap())
                    .bind(BindStep::new("v", uint(8)))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let bytes = b"xxABC\x07";
        assert_eq!(Some(2), engine.find_next_message(bytes, 0));
        assert_eq!(None, engine.find_next_message(bytes, 3));

        let template = engine.template_for(bytes, 2).unwrap();
        assert_eq!("Long", template.name());
    }

    struct Offset(i64);

    impl Converter for Offset {
        fn decode(&self, wire: Value) -> crate::error::Result<Value> {
            let v = wire.as_i64().ok_or(Error::NoMatchingConverter)?;
            Ok(Value::Int(v - self.0))
        }

        fn encode(&self, value: Value) -> crate::error::Result<Value> {
            let v = value.as_i64().ok_or(Error::NoMatchingConverter)?;
            Ok(Value::UInt((v + self.0) as u64))
        }
    }

    #[test]
    fn converter_roundtrip() {
        let engine = Engine::new();
        let template = TemplateBuilder::new("Biased")
            .bind(
                BindStep::new("v", uint(8))
                    .converted_by(ConverterChoices::just(Arc::new(Offset(10)))),
            )
            .build()
            .unwrap();

        let (record, _) = engine.parse(&template, &[0x14]).unwrap();
        assert_eq!(Some(&Value::Int(10)), record.get("v"));

        let composed = engine.compose(&template, &record).unwrap();
        assert_eq!(vec![0x14], composed);
    }

    #[test]
    fn post_process_rewrites_at_encode() {
        let engine = Engine::new();
        let template = TemplateBuilder::new("Stamped")
            .bind(BindStep::new("kind", uint(8)).rewritten_with("", "0x7F"))
            .build()
            .unwrap();

        let mut record = Record::new("Stamped");
        record.set("kind", Value::UInt(1));
        let composed = engine.compose(&template, &record).unwrap();
        assert_eq!(vec![0x7F], composed);

        let (read_back, _) = engine.parse(&template, &composed).unwrap();
        assert_eq!(Some(&Value::UInt(0x7F)), read_back.get("kind"));
    }

    #[test]
    fn end_terminator_is_verified() {
        let engine = Engine::new();
        let template = TemplateBuilder::new("Framed")
            .header(Header::new(&["GO"], "\r\n", Charset::Ascii).unwrap())
            .bind(BindStep::new("v", uint(8)))
            .build()
            .unwrap();

        let mut record = Record::new("Framed");
        record.set("v", Value::UInt(0x42));
        let composed = engine.compose(&template, &record).unwrap();
        assert_eq!(b"GO\x42\r\n".to_vec(), composed);

        let (read_back, consumed) = engine.parse(&template, &composed).unwrap();
        assert_eq!(5, consumed);
        assert_eq!(Some(&Value::UInt(0x42)), read_back.get("v"));

        assert!(matches!(
            engine.parse(&template, b"GO\x42\r\r"),
            Err(Error::TerminatorMismatch)
        ));
    }

    struct CountingListener {
        decoded: AtomicUsize,
        written: AtomicUsize,
    }

    impl EventListener for CountingListener {
        fn decoded_field(&self, _template: &str, _field: &str, _value: &Value) {
            self.decoded.fetch_add(1, Ordering::Relaxed);
        }

        fn written_field(&self, _template: &str, _field: &str) {
            self.written.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn listener_sees_field_traffic() {
        let listener = Arc::new(CountingListener {
            decoded: AtomicUsize::new(0),
            written: AtomicUsize::new(0),
        });
        let mut engine = Engine::new();
        engine.set_listener(Arc::<CountingListener>::clone(&listener));

        let template = TemplateBuilder::new("Pair")
            .bind(BindStep::new("a", uint(8)))
            .bind(BindStep::new("b", uint(8)))
            .build()
            .unwrap();

        let (record, _) = engine.parse(&template, &[1, 2]).unwrap();
        engine.compose(&template, &record).unwrap();

        assert_eq!(2, listener.decoded.load(Ordering::Relaxed));
        assert_eq!(2, listener.written.load(Ordering::Relaxed));
    }

    #[test]
    fn describe_covers_steps_and_context() {
        let mut engine = Engine::new();
        engine.register_context("deviceId", Value::Int(9));
        let template = ack_template();

        let description = engine.describe(&template);
        assert_eq!("Ack", description["name"]);
        assert_eq!("checksum", description["steps"][2]["step"]);
        assert_eq!("CRC-16/CCITT", description["steps"][2]["algorithm"]);
        assert_eq!(9, description["context"]["values"]["deviceId"]);
    }

    #[test]
    fn missing_mandatory_field_fails_compose() {
        let engine = Engine::new();
        let template = TemplateBuilder::new("Strict")
            .bind(BindStep::new("v", uint(8)))
            .build()
            .unwrap();

        let record = Record::new("Strict");
        let err = engine.compose(&template, &record).unwrap_err();
        assert!(matches!(
            err,
            Error::InField { ref source, .. } if matches!(**source, Error::MissingField(_))
        ));
    }

    #[test]
    fn float_fields_roundtrip() {
        let engine = Engine::new();
        let template = TemplateBuilder::new("Readings")
            .bind(BindStep::new(
                "narrow",
                FieldBinding::Float {
                    wide: false,
                    order: ByteOrder::BigEndian,
                },
            ))
            .bind(BindStep::new(
                "wide",
                FieldBinding::Float {
                    wide: true,
                    order: ByteOrder::LittleEndian,
                },
            ))
            .build()
            .unwrap();

        let mut record = Record::new("Readings");
        record.set("narrow", Value::Float(3.5));
        record.set("wide", Value::Float(-0.125));

        let composed = engine.compose(&template, &record).unwrap();
        assert_eq!(12, composed.len());

        let (read_back, consumed) = engine.parse(&template, &composed).unwrap();
        assert_eq!(12, consumed);
        assert_eq!(record, read_back);
    }

    #[test]
    fn bits_field_roundtrip() {
        let engine = Engine::new();
        let template = TemplateBuilder::new("Flags")
            .bind(BindStep::new(
                "flags",
                FieldBinding::Bits {
                    size: "10".to_string(),
                    bit_order: BitOrder::MsbFirst,
                },
            ))
            .build()
            .unwrap();

        let mut flags = BitSet::new(10);
        flags.set(0, true);
        flags.set(3, true);
        flags.set(9, true);
        let mut record = Record::new("Flags");
        record.set("flags", Value::Bits(flags));

        let composed = engine.compose(&template, &record).unwrap();
        assert_eq!(vec![0x90, 0x40], composed);

        let (read_back, consumed) = engine.parse(&template, &composed).unwrap();
        assert_eq!(2, consumed);
        assert_eq!(record, read_back);
    }

    #[test]
    fn fixed_text_roundtrip() {
        let engine = Engine::new();
        let template = TemplateBuilder::new("Named")
            .bind(BindStep::new(
                "name",
                FieldBinding::FixedText {
                    size: "4".to_string(),
                    charset: Charset::Ascii,
                },
            ))
            .build()
            .unwrap();

        let (record, _) = engine.parse(&template, b"NAME").unwrap();
        assert_eq!(Some(&Value::Str("NAME".to_string())), record.get("name"));
        assert_eq!(b"NAME".to_vec(), engine.compose(&template, &record).unwrap());

        let mut oversized = Record::new("Named");
        oversized.set("name", Value::Str("LONGNAME".to_string()));
        let err = engine.compose(&template, &oversized).unwrap_err();
        assert!(matches!(
            err,
            Error::InField { ref source, .. } if matches!(**source, Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn terminated_text_roundtrip() {
        let engine = Engine::new();
        let template = TemplateBuilder::new("Greeting")
            .bind(BindStep::new(
                "text",
                FieldBinding::TerminatedText {
                    terminator: 0x00,
                    consume: true,
                    charset: Charset::Ascii,
                },
            ))
            .bind(BindStep::new("tail", uint(8)))
            .build()
            .unwrap();

        let message = [b'H', b'i', 0x00, 0x07];
        let (record, consumed) = engine.parse(&template, &message).unwrap();
        assert_eq!(4, consumed);
        assert_eq!(Some(&Value::Str("Hi".to_string())), record.get("text"));
        assert_eq!(Some(&Value::UInt(7)), record.get("tail"));

        assert_eq!(message.to_vec(), engine.compose(&template, &record).unwrap());
    }

    #[test]
    fn array_of_objects_roundtrip() {
        let mut engine = Engine::new();
        engine
            .register_template(
                TemplateBuilder::new("Point")
                    .bind(BindStep::new("x", uint(8)))
                    .bind(BindStep::new("y", uint(8)))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let template = TemplateBuilder::new("Path")
            .bind(BindStep::new("n", uint(8)))
            .bind(BindStep::new(
                "points",
                FieldBinding::ArrayObject {
                    choices: ChoiceSet::single("Point"),
                    size: "n".to_string(),
                },
            ))
            .build()
            .unwrap();

        let message = [0x02, 1, 2, 3, 4];
        let (record, consumed) = engine.parse(&template, &message).unwrap();
        assert_eq!(5, consumed);
        let points = match record.get("points") {
            Some(Value::List(items)) => items,
            other => panic!("points decoded as {:?}", other),
        };
        assert_eq!(2, points.len());
        let second = points[1].as_record().unwrap();
        assert_eq!(Some(&Value::UInt(3)), second.get("x"));
        assert_eq!(Some(&Value::UInt(4)), second.get("y"));

        assert_eq!(message.to_vec(), engine.compose(&template, &record).unwrap());
    }

    fn item_engine() -> Engine {
        let mut engine = Engine::new();
        engine
            .register_template(
                TemplateBuilder::new("Item")
                    .bind(BindStep::new("v", uint(8)))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        engine
    }

    #[test]
    fn list_roundtrip_with_consumed_terminator() {
        let engine = item_engine();
        let template = TemplateBuilder::new("Batch")
            .bind(BindStep::new(
                "items",
                FieldBinding::List {
                    choices: ChoiceSet::single("Item"),
                    terminator: 0xFF,
                    consume: true,
                },
            ))
            .bind(BindStep::new("tail", uint(8)))
            .build()
            .unwrap();

        let message = [0x01, 0x02, 0xFF, 0x09];
        let (record, consumed) = engine.parse(&template, &message).unwrap();
        assert_eq!(4, consumed);
        let items = match record.get("items") {
            Some(Value::List(items)) => items,
            other => panic!("items decoded as {:?}", other),
        };
        assert_eq!(2, items.len());
        assert_eq!(
            Some(&Value::UInt(2)),
            items[1].as_record().unwrap().get("v")
        );
        assert_eq!(Some(&Value::UInt(9)), record.get("tail"));

        assert_eq!(message.to_vec(), engine.compose(&template, &record).unwrap());
    }

    #[test]
    fn list_leaves_unconsumed_terminator_for_the_next_step() {
        let engine = item_engine();
        let template = TemplateBuilder::new("Batch")
            .bind(BindStep::new(
                "items",
                FieldBinding::List {
                    choices: ChoiceSet::single("Item"),
                    terminator: 0x00,
                    consume: false,
                },
            ))
            .bind(BindStep::new("marker", uint(8)))
            .build()
            .unwrap();

        let message = [0x05, 0x06, 0x00];
        let (record, consumed) = engine.parse(&template, &message).unwrap();
        assert_eq!(3, consumed);
        assert_eq!(Some(&Value::UInt(0)), record.get("marker"));

        // Neither pass owns the terminator byte: the marker field read
        // it, so the marker field writes it back.
        assert_eq!(message.to_vec(), engine.compose(&template, &record).unwrap());
    }

    #[test]
    fn missing_list_terminator_fails() {
        let engine = item_engine();
        let template = TemplateBuilder::new("Batch")
            .bind(BindStep::new(
                "items",
                FieldBinding::List {
                    choices: ChoiceSet::single("Item"),
                    terminator: 0xFF,
                    consume: true,
                },
            ))
            .build()
            .unwrap();

        let err = engine.parse(&template, &[0x01, 0x02]).unwrap_err();
        assert!(matches!(
            err,
            Error::InField { ref source, .. }
                if matches!(**source, Error::TerminatorNotFound { terminator: 0xFF })
        ));
    }
}
