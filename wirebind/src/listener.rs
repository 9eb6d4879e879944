//! Advisory event hooks emitted while parsing and composing.

use crate::codec::BindingKind;
use crate::types::Value;

/// Observer of per-field engine activity.
///
/// Every hook has a no-op default, so implementors override only what
/// they care about. Emissions are synchronous and purely advisory: a
/// listener can not alter the outcome of a parse.
pub trait EventListener: Send + Sync {
    /// A field is about to be decoded.
    fn decoding_field(&self, _template: &str, _field: &str, _kind: BindingKind) {}

    /// A field was decoded to a value.
    fn decoded_field(&self, _template: &str, _field: &str, _value: &Value) {}

    /// A field is about to be written.
    fn writing_field(&self, _template: &str, _field: &str, _kind: BindingKind) {}

    /// A field was written.
    fn written_field(&self, _template: &str, _field: &str) {}

    /// A derived field's expression is about to run.
    fn evaluating_field(&self, _template: &str, _field: &str) {}

    /// A derived field was assigned.
    fn evaluated_field(&self, _template: &str, _field: &str, _value: &Value) {}
}

/// The default listener: ignores everything.
pub struct NullListener;

impl EventListener for NullListener {}
