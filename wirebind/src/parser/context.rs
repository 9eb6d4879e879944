//! Per-operation parsing environment.

use crate::buffer::BitBuffer;
use crate::codec::CodecRegistry;
use crate::error::Result;
use crate::eval::{self, EvalContext, UserContext};
use crate::listener::EventListener;
use crate::template::{Converter, ConverterChoices, TemplateStore};
use crate::types::{Record, Value};
use std::sync::Arc;

/// Everything one decode or compose runs against.
///
/// The buffer is exclusive to the operation; everything else is the
/// engine's shared read-only state. `prefix` is the most recently read
/// (or selected) choice prefix, exposed to expressions under the
/// reserved `prefix` binding.
pub struct ParseContext<'a> {
    pub buffer: &'a mut BitBuffer,
    pub templates: &'a TemplateStore,
    pub codecs: &'a CodecRegistry,
    pub user: &'a UserContext,
    pub listener: &'a dyn EventListener,
    pub prefix: Option<u64>,
}

impl<'a> ParseContext<'a> {
    fn eval_context<'r>(&'r self, record: &'r Record, root: &'r Record) -> EvalContext<'r> {
        EvalContext::new(self.user)
            .with_record(record)
            .with_root(root)
            .with_prefix(self.prefix)
    }

    /// Evaluate a condition against the record under construction.
    pub fn evaluate_bool(&self, expression: &str, record: &Record, root: &Record) -> Result<bool> {
        eval::evaluate_bool(expression, &self.eval_context(record, root))
    }

    /// Evaluate a size expression against the record under construction.
    pub fn evaluate_size(&self, expression: &str, record: &Record, root: &Record) -> Result<usize> {
        eval::evaluate_size(expression, &self.eval_context(record, root))
    }

    /// Evaluate a value expression against the record under construction.
    pub fn evaluate(&self, expression: &str, record: &Record, root: &Record) -> Result<Value> {
        eval::evaluate(expression, &self.eval_context(record, root))
    }
}

/// Pick the converter whose condition holds first, falling back to the
/// set's unconditional converter.
///
/// `Ok(None)` means the field is bound unconverted. Declaring
/// alternatives but matching none of them (with no fallback) is an
/// error.
pub(crate) fn select_converter(
    ctx: &ParseContext,
    choices: &ConverterChoices,
    record: &Record,
    root: &Record,
) -> Result<Option<Arc<dyn Converter>>> {
    for alternative in &choices.alternatives {
        if ctx.evaluate_bool(&alternative.condition, record, root)? {
            return Ok(Some(Arc::clone(&alternative.converter)));
        }
    }

    if let Some(fallback) = &choices.fallback {
        return Ok(Some(Arc::clone(fallback)));
    }

    if choices.alternatives.is_empty() {
        Ok(None)
    } else {
        Err(crate::error::Error::NoMatchingConverter)
    }
}
