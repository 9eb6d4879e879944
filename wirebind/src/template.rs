//! Compiled message layouts.
//!
//! A [`Template`] is the validated, immutable form of one message
//! layout: an ordered run of steps plus header, checksum, and derived-
//! field metadata. Templates are built once through [`TemplateBuilder`],
//! checked for well-formedness, and then shared read-only across any
//! number of parses.

use crate::checksum::ChecksumAlgorithm;
use crate::error::{Error, Result};
use crate::types::{BitOrder, ByteOrder, Charset, Value};
use std::fmt;
use std::sync::Arc;

/// Transformation between the wire-typed value and the record-typed
/// value of a field. The two directions must be inverses.
pub trait Converter: Send + Sync {
    /// Wire value, as read by the codec, into record value.
    fn decode(&self, wire: Value) -> Result<Value>;

    /// Record value back into the wire value the codec will write.
    fn encode(&self, value: Value) -> Result<Value>;
}

/// Predicate applied after decode and before encode.
pub trait Validator: Send + Sync {
    fn validate(&self, value: &Value) -> Result<()>;
}

/// Message frame: recognizable start sequences, an optional end
/// terminator, and the charset both are expressed in.
#[derive(Clone, Debug)]
pub struct Header {
    start: Vec<Vec<u8>>,
    end: Vec<u8>,
    charset: Charset,
}

impl Header {
    /// Build a header from textual start/end markers.
    pub fn new(start: &[&str], end: &str, charset: Charset) -> Result<Self> {
        let mut encoded = Vec::with_capacity(start.len());
        for marker in start {
            encoded.push(charset.encode(marker)?);
        }

        Ok(Self {
            start: encoded,
            end: charset.encode(end)?,
            charset,
        })
    }

    /// The declared start sequences, already encoded.
    pub fn start_sequences(&self) -> &[Vec<u8>] {
        &self.start
    }

    /// The declared end terminator bytes; empty when none.
    pub fn end_sequence(&self) -> &[u8] {
        &self.end
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }
}

/// How a skip step advances the cursor.
#[derive(Clone, Debug)]
pub enum SkipMode {
    /// Advance by an evaluated number of bits.
    Bits(String),
    /// Scan forward to a terminator byte, optionally consuming it.
    UntilTerminator { terminator: u8, consume: bool },
}

/// A conditional cursor advance with no bound field.
#[derive(Clone, Debug)]
pub struct SkipStep {
    pub condition: String,
    pub mode: SkipMode,
}

/// One alternative of a polymorphic object choice.
#[derive(Clone, Debug)]
pub struct ChoiceAlternative {
    /// Guard; the empty condition always holds.
    pub condition: String,
    /// Prefix value written ahead of the body on encode.
    pub prefix: u64,
    /// Template name of the concrete type.
    pub type_name: String,
}

/// Ordered alternatives for polymorphic object selection.
///
/// Resolution is first-match in declaration order. When `prefix_bits`
/// is nonzero the parser reads that many bits ahead of the body and
/// exposes them to conditions as `prefix`.
#[derive(Clone, Debug)]
pub struct ChoiceSet {
    pub prefix_bits: u32,
    pub alternatives: Vec<ChoiceAlternative>,
    /// Fallback type when no alternative matches; `None` means the
    /// parse fails instead.
    pub default_type: Option<String>,
}

impl ChoiceSet {
    /// A degenerate set selecting a single concrete type.
    pub fn single(type_name: &str) -> Self {
        Self {
            prefix_bits: 0,
            alternatives: vec![ChoiceAlternative {
                condition: String::new(),
                prefix: 0,
                type_name: type_name.to_string(),
            }],
            default_type: None,
        }
    }
}

/// One alternative of a converter choice.
#[derive(Clone)]
pub struct ConverterChoice {
    pub condition: String,
    pub converter: Arc<dyn Converter>,
}

impl fmt::Debug for ConverterChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterChoice")
            .field("condition", &self.condition)
            .field("converter", &"<dyn Converter>")
            .finish()
    }
}

/// Ordered converter alternatives plus an optional fallback.
///
/// First-match in declaration order, like object choices. An empty set
/// with no fallback means the wire value is bound unconverted.
#[derive(Clone, Default)]
pub struct ConverterChoices {
    pub alternatives: Vec<ConverterChoice>,
    pub fallback: Option<Arc<dyn Converter>>,
}

impl fmt::Debug for ConverterChoices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterChoices")
            .field("alternatives", &self.alternatives)
            .field(
                "fallback",
                &self.fallback.as_ref().map(|_| "<dyn Converter>"),
            )
            .finish()
    }
}

impl ConverterChoices {
    /// A single unconditional converter.
    pub fn just(converter: Arc<dyn Converter>) -> Self {
        Self {
            alternatives: Vec::new(),
            fallback: Some(converter),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.alternatives.is_empty() && self.fallback.is_none()
    }
}

/// Wire-level shape of one bound field.
#[derive(Clone, Debug)]
pub enum FieldBinding {
    /// An integer of 1..=64 bits. Widths 8/16/32/64 cover the
    /// byte/short/int/long primitives; anything else is a bit field.
    Integer {
        bits: u32,
        signed: bool,
        order: ByteOrder,
    },
    /// An IEEE 754 single (`wide == false`) or double.
    Float { wide: bool, order: ByteOrder },
    /// A raw bit set of an evaluated length.
    Bits { size: String, bit_order: BitOrder },
    /// Fixed-length text of an evaluated byte count.
    FixedText { size: String, charset: Charset },
    /// Text scanned up to a terminator byte.
    TerminatedText {
        terminator: u8,
        consume: bool,
        charset: Charset,
    },
    /// A nested record, possibly chosen from alternatives.
    Object { choices: ChoiceSet },
    /// A fixed-count array of a primitive element binding.
    ArrayPrimitive {
        element: Box<FieldBinding>,
        size: String,
    },
    /// A fixed-count array of nested records.
    ArrayObject { choices: ChoiceSet, size: String },
    /// Records repeated until a terminator byte is next.
    List {
        choices: ChoiceSet,
        terminator: u8,
        consume: bool,
    },
}

/// A rewrite applied to a field during encode, at its step's order.
#[derive(Clone, Debug)]
pub struct Rewrite {
    pub condition: String,
    pub expression: String,
}

/// A conditional field bind: the central step kind.
#[derive(Clone)]
pub struct BindStep {
    pub field: String,
    pub condition: String,
    pub binding: FieldBinding,
    pub converters: ConverterChoices,
    pub validator: Option<Arc<dyn Validator>>,
    pub rewrite: Option<Rewrite>,
}

impl fmt::Debug for BindStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindStep")
            .field("field", &self.field)
            .field("condition", &self.condition)
            .field("binding", &self.binding)
            .field("converters", &self.converters)
            .field(
                "validator",
                &self.validator.as_ref().map(|_| "<dyn Validator>"),
            )
            .field("rewrite", &self.rewrite)
            .finish()
    }
}

impl BindStep {
    pub fn new(field: &str, binding: FieldBinding) -> Self {
        Self {
            field: field.to_string(),
            condition: String::new(),
            binding,
            converters: ConverterChoices::default(),
            validator: None,
            rewrite: None,
        }
    }

    /// Gate the bind on a condition.
    pub fn when(mut self, condition: &str) -> Self {
        self.condition = condition.to_string();
        self
    }

    pub fn converted_by(mut self, converters: ConverterChoices) -> Self {
        self.converters = converters;
        self
    }

    pub fn validated_by(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Overwrite the field during encode with an expression result.
    pub fn rewritten_with(mut self, condition: &str, expression: &str) -> Self {
        self.rewrite = Some(Rewrite {
            condition: condition.to_string(),
            expression: expression.to_string(),
        });
        self
    }
}

/// Declares the transmitted checksum and its window.
///
/// The window is the byte range `[start + skip_start, cursor - skip_end)`
/// where `start` is the position right after the header start sequence
/// and `cursor` is the position at verification time.
#[derive(Clone, Debug)]
pub struct ChecksumSpec {
    pub field: String,
    pub algorithm: ChecksumAlgorithm,
    pub skip_start: usize,
    pub skip_end: usize,
    pub start_value: u64,
    pub byte_order: ByteOrder,
}

/// A field whose value is derived by an expression after decode.
#[derive(Clone, Debug)]
pub struct EvaluatedField {
    pub field: String,
    pub condition: String,
    pub expression: String,
}

impl EvaluatedField {
    pub fn new(field: &str, expression: &str) -> Self {
        Self {
            field: field.to_string(),
            condition: String::new(),
            expression: expression.to_string(),
        }
    }

    pub fn when(mut self, condition: &str) -> Self {
        self.condition = condition.to_string();
        self
    }
}

/// One item in a template's ordered step sequence.
#[derive(Clone, Debug)]
pub enum Step {
    Skip(SkipStep),
    Bind(BindStep),
    Checksum(ChecksumSpec),
}

/// A compiled, validated message layout.
#[derive(Debug)]
pub struct Template {
    name: String,
    header: Option<Header>,
    steps: Vec<Step>,
    evaluated: Vec<EvaluatedField>,
}

impl Template {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// The lone checksum step, if the template declares one.
    pub fn checksum(&self) -> Option<&ChecksumSpec> {
        self.steps.iter().find_map(|step| match step {
            Step::Checksum(spec) => Some(spec),
            _ => None,
        })
    }

    /// Fields computed after decode, in declaration order.
    pub fn evaluated_fields(&self) -> &[EvaluatedField] {
        &self.evaluated
    }

    /// Bind steps that rewrite their field during encode.
    pub fn post_processed_fields(&self) -> impl Iterator<Item = &BindStep> {
        self.steps.iter().filter_map(|step| match step {
            Step::Bind(bind) if bind.rewrite.is_some() => Some(bind),
            _ => None,
        })
    }
}

/// Assembles and validates a [`Template`].
pub struct TemplateBuilder {
    name: String,
    header: Option<Header>,
    steps: Vec<Step>,
    evaluated: Vec<EvaluatedField>,
}

impl TemplateBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            header: None,
            steps: Vec::new(),
            evaluated: Vec::new(),
        }
    }

    pub fn header(mut self, header: Header) -> Self {
        self.header = Some(header);
        self
    }

    /// Add a conditional bit skip.
    pub fn skip_bits(mut self, condition: &str, size: &str) -> Self {
        self.steps.push(Step::Skip(SkipStep {
            condition: condition.to_string(),
            mode: SkipMode::Bits(size.to_string()),
        }));
        self
    }

    /// Add a conditional scan to a terminator byte.
    pub fn skip_until(mut self, condition: &str, terminator: u8, consume: bool) -> Self {
        self.steps.push(Step::Skip(SkipStep {
            condition: condition.to_string(),
            mode: SkipMode::UntilTerminator { terminator, consume },
        }));
        self
    }

    pub fn bind(mut self, step: BindStep) -> Self {
        self.steps.push(Step::Bind(step));
        self
    }

    pub fn checksum(mut self, spec: ChecksumSpec) -> Self {
        self.steps.push(Step::Checksum(spec));
        self
    }

    pub fn evaluated(mut self, field: EvaluatedField) -> Self {
        self.evaluated.push(field);
        self
    }

    /// Validate the description and freeze it into a [`Template`].
    pub fn build(self) -> Result<Template> {
        if self.name.is_empty() {
            return Err(Error::Annotation("template name is empty".to_string()));
        }

        if let Some(header) = &self.header {
            if header.start.iter().any(|seq| seq.is_empty()) {
                return Err(Error::Annotation(format!(
                    "template `{}` declares an empty header start sequence",
                    self.name
                )));
            }
        }

        let mut seen_fields: Vec<&str> = Vec::new();
        let mut checksum_count = 0;
        for step in &self.steps {
            match step {
                Step::Skip(skip) => {
                    if let SkipMode::Bits(size) = &skip.mode {
                        if size.trim().is_empty() {
                            return Err(Error::Annotation(format!(
                                "template `{}` has a skip with an empty size",
                                self.name
                            )));
                        }
                    }
                }
                Step::Bind(bind) => {
                    self.check_duplicate(&mut seen_fields, &bind.field)?;
                    self.validate_binding(&bind.field, &bind.binding)?;
                }
                Step::Checksum(spec) => {
                    checksum_count += 1;
                    if checksum_count > 1 {
                        return Err(Error::Annotation(format!(
                            "template `{}` declares more than one checksum",
                            self.name
                        )));
                    }
                    self.check_duplicate(&mut seen_fields, &spec.field)?;
                    let width = spec.algorithm.width_bits() as u64;
                    if spec.start_value >> 1 >> (width - 1) != 0 {
                        return Err(Error::Annotation(format!(
                            "template `{}` checksum start value exceeds {} bits",
                            self.name, width
                        )));
                    }
                }
            }
        }

        for field in &self.evaluated {
            if field.expression.trim().is_empty() {
                return Err(Error::Annotation(format!(
                    "evaluated field `{}` of template `{}` has an empty expression",
                    field.field, self.name
                )));
            }
        }

        Ok(Template {
            name: self.name,
            header: self.header,
            steps: self.steps,
            evaluated: self.evaluated,
        })
    }

    fn check_duplicate<'a>(&self, seen: &mut Vec<&'a str>, field: &'a str) -> Result<()> {
        if field.is_empty() {
            return Err(Error::Annotation(format!(
                "template `{}` has a step with an empty field name",
                self.name
            )));
        }
        if seen.contains(&field) {
            return Err(Error::Annotation(format!(
                "duplicated field `{}` in template `{}`",
                field, self.name
            )));
        }

        seen.push(field);
        Ok(())
    }

    fn validate_binding(&self, field: &str, binding: &FieldBinding) -> Result<()> {
        match binding {
            FieldBinding::Integer { bits, .. } => {
                if *bits == 0 || *bits > 64 {
                    return Err(Error::Annotation(format!(
                        "field `{}` of template `{}` declares {} bits; 1..=64 allowed",
                        field, self.name, bits
                    )));
                }
            }
            FieldBinding::Float { .. } | FieldBinding::TerminatedText { .. } => {}
            FieldBinding::Bits { size, .. } | FieldBinding::FixedText { size, .. } => {
                if size.trim().is_empty() {
                    return Err(Error::Annotation(format!(
                        "field `{}` of template `{}` has an empty size expression",
                        field, self.name
                    )));
                }
            }
            FieldBinding::Object { choices } => self.validate_choices(field, choices)?,
            FieldBinding::ArrayPrimitive { element, size } => {
                if size.trim().is_empty() {
                    return Err(Error::Annotation(format!(
                        "field `{}` of template `{}` has an empty size expression",
                        field, self.name
                    )));
                }
                match element.as_ref() {
                    FieldBinding::Integer { .. } | FieldBinding::Float { .. } => {
                        self.validate_binding(field, element)?
                    }
                    _ => {
                        return Err(Error::Annotation(format!(
                            "field `{}` of template `{}`: primitive array element must be \
                             an integer or float",
                            field, self.name
                        )))
                    }
                }
            }
            FieldBinding::ArrayObject { choices, size } => {
                if size.trim().is_empty() {
                    return Err(Error::Annotation(format!(
                        "field `{}` of template `{}` has an empty size expression",
                        field, self.name
                    )));
                }
                self.validate_choices(field, choices)?;
            }
            FieldBinding::List { choices, .. } => self.validate_choices(field, choices)?,
        }

        Ok(())
    }

    fn validate_choices(&self, field: &str, choices: &ChoiceSet) -> Result<()> {
        if choices.alternatives.is_empty() && choices.default_type.is_none() {
            return Err(Error::Annotation(format!(
                "field `{}` of template `{}` has an empty choice set",
                field, self.name
            )));
        }
        if choices.prefix_bits > 32 {
            return Err(Error::Annotation(format!(
                "field `{}` of template `{}` declares a {}-bit choice prefix; at most 32",
                field, self.name, choices.prefix_bits
            )));
        }
        for alternative in &choices.alternatives {
            if alternative.type_name.is_empty() {
                return Err(Error::Annotation(format!(
                    "field `{}` of template `{}` has a choice alternative without a type",
                    field, self.name
                )));
            }
        }

        Ok(())
    }
}

/// The registry of built templates, keyed by name.
///
/// Publication happens at registration time; parses read it without
/// synchronization afterwards. Nested object decoding resolves its
/// concrete types here.
#[derive(Default)]
pub struct TemplateStore {
    templates: std::collections::HashMap<String, Arc<Template>>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a built template.
    ///
    /// Rejects a second template under the same name, and any template
    /// whose header start sequence is already claimed by another
    /// registered template.
    pub fn register(&mut self, template: Template) -> Result<Arc<Template>> {
        if self.templates.contains_key(template.name()) {
            return Err(Error::Annotation(format!(
                "duplicated key for template `{}`",
                template.name()
            )));
        }

        if let Some(header) = template.header() {
            for sequence in header.start_sequences() {
                for other in self.templates.values() {
                    let clash = other
                        .header()
                        .map(|h| h.start_sequences().iter().any(|s| s == sequence))
                        .unwrap_or(false);
                    if clash {
                        return Err(Error::DuplicatedHeader(
                            String::from_utf8_lossy(sequence).into_owned(),
                        ));
                    }
                }
            }
        }

        let template = Arc::new(template);
        self.templates
            .insert(template.name().to_string(), Arc::clone(&template));
        Ok(template)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Template>> {
        self.templates.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Template>> {
        self.templates.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Charset;

    fn u8_binding() -> FieldBinding {
        FieldBinding::Integer {
            bits: 8,
            signed: false,
            order: ByteOrder::BigEndian,
        }
    }

    #[test]
    fn minimal_template_builds() {
        let template = TemplateBuilder::new("Ack")
            .header(Header::new(&["ACK"], "", Charset::Ascii).unwrap())
            .bind(BindStep::new("code", u8_binding()))
            .build()
            .unwrap();

        assert_eq!("Ack", template.name());
        assert_eq!(1, template.steps().len());
        assert!(template.checksum().is_none());
    }

    #[test]
    fn duplicate_fields_are_rejected() {
        let err = TemplateBuilder::new("Dup")
            .bind(BindStep::new("code", u8_binding()))
            .bind(BindStep::new("code", u8_binding()))
            .build()
            .unwrap_err();

        assert!(matches!(err, Error::Annotation(_)));
    }

    #[test]
    fn zero_width_integer_is_rejected() {
        let err = TemplateBuilder::new("Bad")
            .bind(BindStep::new(
                "v",
                FieldBinding::Integer {
                    bits: 0,
                    signed: false,
                    order: ByteOrder::BigEndian,
                },
            ))
            .build()
            .unwrap_err();

        assert!(matches!(err, Error::Annotation(_)));
    }

    #[test]
    fn two_checksums_are_rejected() {
        let spec = ChecksumSpec {
            field: "crc".to_string(),
            algorithm: crate::checksum::ChecksumAlgorithm::Crc16Ccitt,
            skip_start: 0,
            skip_end: 2,
            start_value: 0xFFFF,
            byte_order: ByteOrder::BigEndian,
        };
        let mut second = spec.clone();
        second.field = "crc2".to_string();

        let err = TemplateBuilder::new("Bad")
            .checksum(spec)
            .checksum(second)
            .build()
            .unwrap_err();

        assert!(matches!(err, Error::Annotation(_)));
    }

    #[test]
    fn empty_choice_set_is_rejected() {
        let err = TemplateBuilder::new("Bad")
            .bind(BindStep::new(
                "body",
                FieldBinding::Object {
                    choices: ChoiceSet {
                        prefix_bits: 4,
                        alternatives: Vec::new(),
                        default_type: None,
                    },
                },
            ))
            .build()
            .unwrap_err();

        assert!(matches!(err, Error::Annotation(_)));
    }

    #[test]
    fn store_rejects_duplicate_names_and_headers() {
        let mut store = TemplateStore::new();
        store
            .register(
                TemplateBuilder::new("Ack")
                    .header(Header::new(&["ACK"], "", Charset::Ascii).unwrap())
                    .bind(BindStep::new("code", u8_binding()))
                    .build()
                    .unwrap(),
            )
            .unwrap();

        let same_name = TemplateBuilder::new("Ack")
            .bind(BindStep::new("code", u8_binding()))
            .build()
            .unwrap();
        assert!(matches!(
            store.register(same_name),
            Err(Error::Annotation(_))
        ));

        let same_header = TemplateBuilder::new("Other")
            .header(Header::new(&["ACK"], "", Charset::Ascii).unwrap())
            .bind(BindStep::new("code", u8_binding()))
            .build()
            .unwrap();
        assert!(matches!(
            store.register(same_header),
            Err(Error::DuplicatedHeader(_))
        ));
    }

    #[test]
    fn object_array_element_cannot_be_primitive_array() {
        let err = TemplateBuilder::new("Bad")
            .bind(BindStep::new(
                "rows",
                FieldBinding::ArrayPrimitive {
                    element: Box::new(FieldBinding::FixedText {
                        size: "4".to_string(),
                        charset: Charset::Ascii,
                    }),
                    size: "2".to_string(),
                },
            ))
            .build()
            .unwrap_err();

        assert!(matches!(err, Error::Annotation(_)));
    }
}
