//! Filter module — drops informational lines before they reach a grammar.

pub mod engine;
pub mod noise;

pub use engine::{FilterError, FilterStats, NoiseFilter};
