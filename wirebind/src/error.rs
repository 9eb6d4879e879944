//! Error types yielded by template building, parsing, and composing.

use crate::codec::BindingKind;
use thiserror::Error;

/// Convenience type for failable operations within the engine.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors that the engine can yield.
///
/// Buffer-level errors (`UnexpectedEof` and friends) abort the parse that
/// raised them. Template-level errors are raised once, at build or
/// registration time, and mean the template never becomes usable. A failed
/// parse or compose never poisons the template it ran against, nor the
/// codec registry.
#[derive(Error, Debug)]
pub enum Error {
    /// A read or skip ran past the end of the backing buffer.
    #[error("unexpected end of buffer")]
    UnexpectedEof,

    /// A byte-granular operation was attempted on an unaligned cursor.
    #[error("cursor is not byte-aligned")]
    Misaligned,

    /// A terminator scan exhausted the buffer without finding its byte.
    #[error("terminator {terminator:#04x} not found before end of buffer")]
    TerminatorNotFound {
        /// The byte that was being scanned for.
        terminator: u8,
    },

    /// A charset name outside the supported whitelist, or bytes that do
    /// not decode under the declared charset.
    #[error("unsupported or undecodable charset: {0}")]
    BadCharset(String),

    /// A value does not fit the declared bit width.
    #[error("value {value} does not fit in {bits} bits")]
    ValueOverflow {
        /// The value that was being written.
        value: i64,
        /// The declared field width.
        bits: u32,
    },

    /// A template description failed its build-time well-formedness
    /// checks.
    #[error("invalid template description: {0}")]
    Annotation(String),

    /// No registered template matches the buffer's header.
    #[error("no template matches the message header")]
    NoMatchingTemplate,

    /// Two registered templates share a header start sequence.
    #[error("duplicated header key {0:?} across templates")]
    DuplicatedHeader(String),

    /// The message did not terminate with the declared end sequence.
    #[error("message does not end with the declared terminator")]
    TerminatorMismatch,

    /// No codec is registered for a binding kind.
    #[error("no codec registered for kind {0:?}")]
    NoCodec(BindingKind),

    /// A codec was registered twice for the same kind.
    #[error("a codec is already registered for kind {0:?}")]
    DuplicateCodec(BindingKind),

    /// No converter alternative's condition held and no fallback exists.
    #[error("no matching converter alternative")]
    NoMatchingConverter,

    /// No object-choice alternative's condition held and no default type
    /// exists.
    #[error("no matching choice alternative")]
    NoMatchingChoice,

    /// A nested binding references a template that was never registered.
    #[error("no template registered under the name `{0}`")]
    UnknownTemplate(String),

    /// A validator rejected a decoded or to-be-encoded value.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A collection or text value has a different size than the binding
    /// declares.
    #[error("size mismatch: binding declares {expected}, value has {actual}")]
    SizeMismatch {
        /// The evaluated declared size.
        expected: usize,
        /// The size the value actually has.
        actual: usize,
    },

    /// A value cannot be represented under the declared binding.
    #[error("value cannot be represented as {expected}")]
    UnrepresentableValue {
        /// Human-readable name of the shape the binding required.
        expected: &'static str,
    },

    /// A condition, size, or value expression failed to evaluate.
    #[error("cannot evaluate `{expression}`: {reason}")]
    Evaluation {
        /// The expression text that failed.
        expression: String,
        /// What went wrong while lexing, parsing, or evaluating it.
        reason: String,
    },

    /// A size expression evaluated to a negative or non-numeric value.
    #[error("size expression `{expression}` evaluated to invalid size")]
    InvalidSize {
        /// The expression text.
        expression: String,
    },

    /// The recomputed checksum differs from the transmitted one.
    #[error("checksum mismatch: computed {computed:#x}, transmitted {transmitted:#x}")]
    ChecksumMismatch {
        /// The value recomputed over the declared window.
        computed: u64,
        /// The value carried by the message.
        transmitted: u64,
    },

    /// A field required by the template is absent from the record being
    /// composed.
    #[error("record is missing mandatory field `{0}`")]
    MissingField(String),

    /// An error raised while processing a specific field of a specific
    /// template.
    #[error("template `{template}`, field `{field}`: {source}")]
    InField {
        /// Name of the template whose step failed.
        template: String,
        /// Name of the field the step was bound to.
        field: String,
        /// The underlying failure.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Attach `(template, field)` context to an error.
    ///
    /// Errors that already carry field context are left untouched so that
    /// the innermost location wins.
    pub(crate) fn in_field(self, template: &str, field: &str) -> Self {
        match self {
            Error::InField { .. } => self,
            other => Error::InField {
                template: template.to_string(),
                field: field.to_string(),
                source: Box::new(other),
            },
        }
    }
}
