//! Engine trace text to structural model.

mod model;
mod parser;

pub use model::{DataGroup, GroupKind, NamedValue, Step, TraceModel};
pub use parser::parse_trace;
