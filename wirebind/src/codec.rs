//! Codec registry and per-kind codec implementations.

mod array;
mod bits;
mod checksum;
mod float;
mod integer;
mod list;
mod object;
mod text;

pub use array::{ArrayObjectCodec, ArrayPrimitiveCodec};
pub use bits::BitsCodec;
pub use checksum::ChecksumCodec;
pub use float::FloatCodec;
pub use integer::IntegerCodec;
pub use list::ListCodec;
pub use object::ObjectCodec;
pub use text::{FixedTextCodec, TerminatedTextCodec};

use crate::error::{Error, Result};
use crate::parser::ParseContext;
use crate::template::FieldBinding;
use crate::types::{Record, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Tag identifying which codec handles a binding.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Integer,
    Float,
    Bits,
    FixedText,
    TerminatedText,
    Object,
    ArrayPrimitive,
    ArrayObject,
    List,
    /// The transmitted checksum value; dispatched from checksum steps
    /// rather than from a field binding.
    Checksum,
}

impl BindingKind {
    /// The kind a binding dispatches to.
    pub fn of(binding: &FieldBinding) -> Self {
        match binding {
            FieldBinding::Integer { .. } => BindingKind::Integer,
            FieldBinding::Float { .. } => BindingKind::Float,
            FieldBinding::Bits { .. } => BindingKind::Bits,
            FieldBinding::FixedText { .. } => BindingKind::FixedText,
            FieldBinding::TerminatedText { .. } => BindingKind::TerminatedText,
            FieldBinding::Object { .. } => BindingKind::Object,
            FieldBinding::ArrayPrimitive { .. } => BindingKind::ArrayPrimitive,
            FieldBinding::ArrayObject { .. } => BindingKind::ArrayObject,
            FieldBinding::List { .. } => BindingKind::List,
        }
    }

    /// Stable tag name, used by the describer.
    pub fn name(self) -> &'static str {
        match self {
            BindingKind::Integer => "integer",
            BindingKind::Float => "float",
            BindingKind::Bits => "bits",
            BindingKind::FixedText => "string-fixed",
            BindingKind::TerminatedText => "string-terminated",
            BindingKind::Object => "object",
            BindingKind::ArrayPrimitive => "array-primitive",
            BindingKind::ArrayObject => "array-object",
            BindingKind::List => "list",
            BindingKind::Checksum => "checksum",
        }
    }
}

/// Reads and writes one kind of field binding.
///
/// A codec holds no per-parse state: both passes are pure functions of
/// their arguments, and the only side effect is the buffer cursor
/// moving inside the given context. `record` is the record the field
/// belongs to; `root` is the outermost record of the message.
pub trait Codec: Send + Sync {
    /// The kind this codec is registered under.
    fn kind(&self) -> BindingKind;

    /// Read the binding's wire representation into a value.
    fn decode(
        &self,
        ctx: &mut ParseContext,
        binding: &FieldBinding,
        record: &Record,
        root: &Record,
    ) -> Result<Value>;

    /// Write a value in the binding's wire representation.
    fn encode(
        &self,
        ctx: &mut ParseContext,
        binding: &FieldBinding,
        record: &Record,
        root: &Record,
        value: &Value,
    ) -> Result<()>;
}

pub(crate) fn wrong_binding(expected: &'static str) -> Error {
    Error::UnrepresentableValue { expected }
}

/// One codec per binding kind.
///
/// Construction installs the default set from scratch. Kinds can be
/// occupied exactly once; replacing an existing codec is an explicit,
/// separate operation.
pub struct CodecRegistry {
    codecs: HashMap<BindingKind, Arc<dyn Codec>>,
}

impl CodecRegistry {
    /// A registry holding the default codec for every kind.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        let defaults: Vec<Arc<dyn Codec>> = vec![
            Arc::new(IntegerCodec),
            Arc::new(FloatCodec),
            Arc::new(BitsCodec),
            Arc::new(FixedTextCodec),
            Arc::new(TerminatedTextCodec),
            Arc::new(ObjectCodec),
            Arc::new(ArrayPrimitiveCodec),
            Arc::new(ArrayObjectCodec),
            Arc::new(ListCodec),
            Arc::new(ChecksumCodec),
        ];
        for codec in defaults {
            // A fresh registry cannot hold duplicates.
            let _ = registry.register(codec);
        }

        registry
    }

    /// A registry with no codecs at all.
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Register a codec under its kind.
    pub fn register(&mut self, codec: Arc<dyn Codec>) -> Result<()> {
        let kind = codec.kind();
        if self.codecs.contains_key(&kind) {
            return Err(Error::DuplicateCodec(kind));
        }

        self.codecs.insert(kind, codec);
        Ok(())
    }

    /// Swap in a codec, displacing whatever held its kind.
    pub fn replace(&mut self, codec: Arc<dyn Codec>) {
        self.codecs.insert(codec.kind(), codec);
    }

    /// Look up the codec for a kind.
    pub fn get(&self, kind: BindingKind) -> Result<&Arc<dyn Codec>> {
        self.codecs.get(&kind).ok_or(Error::NoCodec(kind))
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_covers_every_kind() {
        let registry = CodecRegistry::new();
        for kind in [
            BindingKind::Integer,
            BindingKind::Float,
            BindingKind::Bits,
            BindingKind::FixedText,
            BindingKind::TerminatedText,
            BindingKind::Object,
            BindingKind::ArrayPrimitive,
            BindingKind::ArrayObject,
            BindingKind::List,
            BindingKind::Checksum,
        ]
        .iter()
        {
            registry.get(*kind).unwrap();
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = CodecRegistry::new();
        let err = registry.register(Arc::new(IntegerCodec)).unwrap_err();
        assert!(matches!(err, Error::DuplicateCodec(BindingKind::Integer)));

        // But an explicit replace goes through.
        registry.replace(Arc::new(IntegerCodec));
    }

    #[test]
    fn empty_registry_reports_missing_codecs() {
        let registry = CodecRegistry::empty();
        assert!(matches!(
            registry.get(BindingKind::Object),
            Err(Error::NoCodec(BindingKind::Object))
        ));
    }
}
