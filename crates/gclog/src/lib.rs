// Garbage-collection log parsing: format sniffing, per-format grammars and
// a resilient, cancellable parsing session.

// Core
pub mod model;
pub mod parser;
pub mod filter;
pub mod session;

// Ambient
pub mod conf;
pub mod runtime;
