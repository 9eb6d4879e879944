//! Declarative binary-message codec engine.

#[macro_use]
extern crate lazy_static;

pub mod buffer;
pub mod checksum;
pub mod codec;
pub mod describe;
pub mod engine;
pub mod error;
pub mod eval;
pub mod listener;
pub mod parser;
pub mod template;
pub mod types;

pub use engine::{ComposeSummary, Engine};
pub use error::{Error, Result};
pub use template::{BindStep, FieldBinding, Header, Template, TemplateBuilder};
pub use types::{BitOrder, ByteOrder, Charset, Record, Value};
