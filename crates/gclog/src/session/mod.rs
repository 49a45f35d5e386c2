//! Session module — drives one grammar over one resource.

pub mod context;
pub mod lines;
pub mod run;

pub use context::ResourceContext;
pub use run::{parse, ParseOutcome, ParseSession, SessionFailure, SessionState};
