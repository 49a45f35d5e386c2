use serde::Serialize;

/// Heap region an event (or detail) measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Generation {
    Young,
    Tenured,
    /// Permanent generation or metaspace
    Perm,
    /// Whole heap
    Combined,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Concurrency {
    StopTheWorld,
    ConcurrentStart,
    ConcurrentEnd,
    ConcurrentDuration,
}

impl Concurrency {
    pub fn is_concurrent(&self) -> bool {
        !matches!(self, Concurrency::StopTheWorld)
    }
}

/// Numeric payload a grammar should expect after the type phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericShape {
    /// No numbers at all (`[CMS-concurrent-mark-start]`)
    Marker,
    Pause,
    Memory,
    MemoryPause,
    /// `cpu/wall secs` pair of concurrent phases
    PausePair,
    /// G1 region counts (`Eden regions: 2->0(3)`)
    Region,
}

/// Immutable description of one known event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TypeDescriptor {
    pub name: &'static str,
    pub generation: Generation,
    pub concurrency: Concurrency,
    pub shape: NumericShape,
}

impl TypeDescriptor {
    pub const fn new(
        name: &'static str,
        generation: Generation,
        concurrency: Concurrency,
        shape: NumericShape,
    ) -> Self {
        Self {
            name,
            generation,
            concurrency,
            shape,
        }
    }
}
