//! Read-only projection of templates into a key/value tree.
//!
//! The output is shaped for machine consumption (code generators and
//! diagnostic tooling); nothing in here can touch a buffer or a codec.

use crate::eval::UserContext;
use crate::template::{
    ChoiceSet, ConverterChoices, FieldBinding, SkipMode, Step, Template,
};
use crate::types::{BitOrder, ByteOrder, Value};
use serde_json::{json, Map};

/// Project a template into a nested JSON tree.
pub fn describe_template(template: &Template) -> serde_json::Value {
    let mut root = Map::new();
    root.insert("name".to_string(), json!(template.name()));

    if let Some(header) = template.header() {
        let charset = header.charset();
        let starts: Vec<String> = header
            .start_sequences()
            .iter()
            .map(|sequence| charset.decode(sequence).unwrap_or_default())
            .collect();
        root.insert(
            "header".to_string(),
            json!({
                "start": starts,
                "end": charset.decode(header.end_sequence()).unwrap_or_default(),
                "charset": charset.name(),
            }),
        );
    }

    let steps: Vec<serde_json::Value> = template.steps().iter().map(describe_step).collect();
    root.insert("steps".to_string(), json!(steps));

    let evaluated: Vec<serde_json::Value> = template
        .evaluated_fields()
        .iter()
        .map(|field| {
            json!({
                "field": field.field,
                "condition": field.condition,
                "expression": field.expression,
            })
        })
        .collect();
    if !evaluated.is_empty() {
        root.insert("evaluatedFields".to_string(), json!(evaluated));
    }

    serde_json::Value::Object(root)
}

/// Project the user context, with the reserved bindings stripped.
pub fn describe_context(user: &UserContext) -> serde_json::Value {
    const RESERVED: [&str; 4] = ["self", "root", "prefix", "choicePrefix"];

    let mut values = Map::new();
    for (key, value) in user.values() {
        if !RESERVED.contains(&key) {
            values.insert(key.to_string(), describe_value(value));
        }
    }

    let mut methods: Vec<&str> = user
        .method_names()
        .filter(|name| !RESERVED.contains(name))
        .collect();
    methods.sort_unstable();

    json!({
        "values": serde_json::Value::Object(values),
        "methods": methods,
    })
}

fn describe_step(step: &Step) -> serde_json::Value {
    match step {
        Step::Skip(skip) => {
            let mut out = Map::new();
            out.insert("step".to_string(), json!("skip"));
            if !skip.condition.is_empty() {
                out.insert("condition".to_string(), json!(skip.condition));
            }
            match &skip.mode {
                SkipMode::Bits(size) => {
                    out.insert("size".to_string(), json!(size));
                }
                SkipMode::UntilTerminator { terminator, consume } => {
                    out.insert("terminator".to_string(), json!(terminator));
                    out.insert("consumeTerminator".to_string(), json!(consume));
                }
            }
            serde_json::Value::Object(out)
        }
        Step::Bind(bind) => {
            let mut out = Map::new();
            out.insert("step".to_string(), json!("bind"));
            out.insert("field".to_string(), json!(bind.field));
            if !bind.condition.is_empty() {
                out.insert("condition".to_string(), json!(bind.condition));
            }
            out.insert("binding".to_string(), describe_binding(&bind.binding));
            if !bind.converters.is_empty() {
                out.insert(
                    "converters".to_string(),
                    describe_converters(&bind.converters),
                );
            }
            if bind.validator.is_some() {
                out.insert("validated".to_string(), json!(true));
            }
            if let Some(rewrite) = &bind.rewrite {
                out.insert(
                    "postProcess".to_string(),
                    json!({
                        "condition": rewrite.condition,
                        "expression": rewrite.expression,
                    }),
                );
            }
            serde_json::Value::Object(out)
        }
        Step::Checksum(spec) => json!({
            "step": "checksum",
            "field": spec.field,
            "algorithm": spec.algorithm.name(),
            "skipStart": spec.skip_start,
            "skipEnd": spec.skip_end,
            "startValue": spec.start_value,
            "byteOrder": order_name(spec.byte_order),
        }),
    }
}

fn describe_binding(binding: &FieldBinding) -> serde_json::Value {
    match binding {
        FieldBinding::Integer {
            bits,
            signed,
            order,
        } => json!({
            "kind": "integer",
            "bits": bits,
            "signed": signed,
            "byteOrder": order_name(*order),
        }),
        FieldBinding::Float { wide, order } => json!({
            "kind": "float",
            "bits": if *wide { 64 } else { 32 },
            "byteOrder": order_name(*order),
        }),
        FieldBinding::Bits { size, bit_order } => json!({
            "kind": "bits",
            "size": size,
            "bitOrder": bit_order_name(*bit_order),
        }),
        FieldBinding::FixedText { size, charset } => json!({
            "kind": "string-fixed",
            "size": size,
            "charset": charset.name(),
        }),
        FieldBinding::TerminatedText {
            terminator,
            consume,
            charset,
        } => json!({
            "kind": "string-terminated",
            "terminator": terminator,
            "consumeTerminator": consume,
            "charset": charset.name(),
        }),
        FieldBinding::Object { choices } => json!({
            "kind": "object",
            "choices": describe_choices(choices),
        }),
        FieldBinding::ArrayPrimitive { element, size } => json!({
            "kind": "array-primitive",
            "size": size,
            "element": describe_binding(element),
        }),
        FieldBinding::ArrayObject { choices, size } => json!({
            "kind": "array-object",
            "size": size,
            "choices": describe_choices(choices),
        }),
        FieldBinding::List {
            choices,
            terminator,
            consume,
        } => json!({
            "kind": "list",
            "terminator": terminator,
            "consumeTerminator": consume,
            "choices": describe_choices(choices),
        }),
    }
}

fn describe_choices(choices: &ChoiceSet) -> serde_json::Value {
    let alternatives: Vec<serde_json::Value> = choices
        .alternatives
        .iter()
        .map(|alternative| {
            json!({
                "condition": alternative.condition,
                "prefix": alternative.prefix,
                "type": alternative.type_name,
            })
        })
        .collect();

    let mut out = Map::new();
    if choices.prefix_bits > 0 {
        out.insert("prefixBits".to_string(), json!(choices.prefix_bits));
    }
    out.insert("alternatives".to_string(), json!(alternatives));
    if let Some(default) = &choices.default_type {
        out.insert("default".to_string(), json!(default));
    }

    serde_json::Value::Object(out)
}

fn describe_converters(converters: &ConverterChoices) -> serde_json::Value {
    let conditions: Vec<&str> = converters
        .alternatives
        .iter()
        .map(|choice| choice.condition.as_str())
        .collect();

    json!({
        "alternatives": conditions,
        "hasFallback": converters.fallback.is_some(),
    })
}

fn describe_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => json!(b),
        Value::Int(v) => json!(v),
        Value::UInt(v) => json!(v),
        Value::Float(v) => json!(v),
        Value::Str(s) => json!(s),
        Value::Bytes(bytes) => json!(bytes),
        Value::Bits(set) => json!(set.to_bytes(BitOrder::MsbFirst)),
        Value::Record(record) => {
            let mut out = Map::new();
            for (name, field) in record.fields() {
                out.insert(name.to_string(), describe_value(field));
            }
            serde_json::Value::Object(out)
        }
        Value::List(items) => json!(items
            .iter()
            .map(describe_value)
            .collect::<Vec<serde_json::Value>>()),
    }
}

fn order_name(order: ByteOrder) -> &'static str {
    match order {
        ByteOrder::BigEndian => "big-endian",
        ByteOrder::LittleEndian => "little-endian",
    }
}

fn bit_order_name(order: BitOrder) -> &'static str {
    match order {
        BitOrder::MsbFirst => "msb-first",
        BitOrder::LsbFirst => "lsb-first",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{BindStep, Header, TemplateBuilder};
    use crate::types::Charset;

    #[test]
    fn template_projection_includes_header_and_fields() {
        let template = TemplateBuilder::new("Ack")
            .header(Header::new(&["ACK"], "", Charset::Ascii).unwrap())
            .bind(BindStep::new(
                "code",
                FieldBinding::Integer {
                    bits: 8,
                    signed: false,
                    order: ByteOrder::BigEndian,
                },
            ))
            .build()
            .unwrap();

        let description = describe_template(&template);
        assert_eq!("Ack", description["name"]);
        assert_eq!("ACK", description["header"]["start"][0]);
        assert_eq!("US-ASCII", description["header"]["charset"]);
        assert_eq!("bind", description["steps"][0]["step"]);
        assert_eq!("integer", description["steps"][0]["binding"]["kind"]);
        assert_eq!(8, description["steps"][0]["binding"]["bits"]);
    }

    #[test]
    fn context_projection_strips_reserved_keys() {
        let mut user = UserContext::new();
        user.set_value("deviceId", Value::Int(7));
        user.set_value("prefix", Value::Int(9));

        let description = describe_context(&user);
        assert_eq!(7, description["values"]["deviceId"]);
        assert!(description["values"].get("prefix").is_none());
    }
}
