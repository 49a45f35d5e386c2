//! Model — the normalized event log every grammar produces.

pub mod descriptor;
pub mod event;
pub mod log;

pub use descriptor::{Concurrency, Generation, NumericShape, TypeDescriptor};
pub use event::{CorrelationKey, EventKind, LogEvent, Memory};
pub use log::GcLog;
