use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use super::descriptor::{Concurrency, Generation, TypeDescriptor};
use crate::parser::cursor::MemoryTriple;

/// Memory figures of one event, all in kilobytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Memory {
    pub before_kb: Option<u64>,
    pub after_kb: Option<u64>,
    pub capacity_kb: Option<u64>,
}

impl Memory {
    pub fn new(before_kb: u64, after_kb: u64, capacity_kb: Option<u64>) -> Self {
        Self {
            before_kb: Some(before_kb),
            after_kb: Some(after_kb),
            capacity_kb,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.before_kb.is_none() && self.after_kb.is_none() && self.capacity_kb.is_none()
    }
}

impl From<MemoryTriple> for Memory {
    fn from(m: MemoryTriple) -> Self {
        Memory::new(m.before_kb, m.after_kb, m.capacity_kb)
    }
}

/// Key pairing a concurrent start marker with its end marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum CorrelationKey {
    /// Unified logging `GC(n)`
    Id(u64),
    /// Phase name (`CMS-concurrent-mark`, `Concurrent marking`)
    Phase(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    Simple,
    ConcurrentInterval {
        correlation: CorrelationKey,
        /// End timestamp minus start timestamp, when both markers were seen.
        interval_secs: Option<f64>,
    },
    Composite {
        details: Vec<LogEvent>,
    },
}

/// One normalized GC event.
///
/// The timestamp is fixed at construction. Details added through
/// [`LogEvent::add_detail`] take over the parent's timestamp and date stamp,
/// so a detail can never drift from the event that encloses it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEvent {
    timestamp: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    datestamp: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pause_secs: Option<f64>,
    memory: Memory,
    #[serde(rename = "type")]
    descriptor: &'static TypeDescriptor,
    concurrency: Concurrency,
    sequence: u64,
    #[serde(flatten)]
    kind: EventKind,
}

impl LogEvent {
    pub fn new(timestamp: f64, descriptor: &'static TypeDescriptor) -> Self {
        Self {
            timestamp,
            datestamp: None,
            pause_secs: None,
            memory: Memory::default(),
            descriptor,
            concurrency: descriptor.concurrency,
            sequence: 0,
            kind: EventKind::Simple,
        }
    }

    /// Concurrent phase event correlated by `key`.
    pub fn concurrent(timestamp: f64, descriptor: &'static TypeDescriptor, key: CorrelationKey) -> Self {
        let mut event = Self::new(timestamp, descriptor);
        if event.concurrency == Concurrency::StopTheWorld {
            event.concurrency = Concurrency::ConcurrentDuration;
        }
        event.kind = EventKind::ConcurrentInterval {
            correlation: key,
            interval_secs: None,
        };
        event
    }

    pub fn with_pause(mut self, secs: f64) -> Self {
        self.pause_secs = Some(secs);
        self
    }

    pub fn with_memory(mut self, memory: impl Into<Memory>) -> Self {
        self.memory = memory.into();
        self
    }

    pub fn with_datestamp(mut self, datestamp: Option<DateTime<FixedOffset>>) -> Self {
        self.datestamp = datestamp;
        self
    }

    pub fn set_pause(&mut self, secs: Option<f64>) {
        self.pause_secs = secs;
    }

    pub fn set_memory(&mut self, memory: impl Into<Memory>) {
        self.memory = memory.into();
    }

    pub fn set_concurrency(&mut self, concurrency: Concurrency) {
        self.concurrency = concurrency;
    }

    /// Record the measured interval of a concurrent event. No-op for other kinds.
    pub fn set_interval(&mut self, secs: f64) {
        if let EventKind::ConcurrentInterval { interval_secs, .. } = &mut self.kind {
            *interval_secs = Some(secs);
        }
    }

    /// Attach a per-generation detail. The child's timestamp and date stamp are
    /// overwritten with the parent's. Concurrent interval events carry no
    /// details; the child is handed back in that case.
    pub fn add_detail(&mut self, mut child: LogEvent) -> Result<(), LogEvent> {
        child.align_to(self.timestamp, self.datestamp);
        match &mut self.kind {
            EventKind::Simple => {
                self.kind = EventKind::Composite { details: vec![child] };
                Ok(())
            }
            EventKind::Composite { details } => {
                details.push(child);
                Ok(())
            }
            EventKind::ConcurrentInterval { .. } => Err(child),
        }
    }

    fn align_to(&mut self, timestamp: f64, datestamp: Option<DateTime<FixedOffset>>) {
        self.timestamp = timestamp;
        self.datestamp = datestamp;
        if let EventKind::Composite { details } = &mut self.kind {
            for d in details {
                d.align_to(timestamp, datestamp);
            }
        }
    }

    pub(crate) fn assign_sequence(&mut self, next: &mut u64) {
        self.sequence = *next;
        *next += 1;
        if let EventKind::Composite { details } = &mut self.kind {
            for d in details {
                d.assign_sequence(next);
            }
        }
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn datestamp(&self) -> Option<DateTime<FixedOffset>> {
        self.datestamp
    }

    pub fn pause(&self) -> Option<f64> {
        self.pause_secs
    }

    pub fn memory(&self) -> Memory {
        self.memory
    }

    pub fn descriptor(&self) -> &'static TypeDescriptor {
        self.descriptor
    }

    pub fn type_name(&self) -> &'static str {
        self.descriptor.name
    }

    pub fn generation(&self) -> Generation {
        self.descriptor.generation
    }

    pub fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    pub fn is_stop_the_world(&self) -> bool {
        self.concurrency == Concurrency::StopTheWorld
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    pub fn details(&self) -> &[LogEvent] {
        match &self.kind {
            EventKind::Composite { details } => details,
            _ => &[],
        }
    }

    pub fn detail(&self, type_name: &str) -> Option<&LogEvent> {
        self.details().iter().find(|d| d.type_name() == type_name)
    }

    pub fn correlation(&self) -> Option<&CorrelationKey> {
        match &self.kind {
            EventKind::ConcurrentInterval { correlation, .. } => Some(correlation),
            _ => None,
        }
    }

    pub fn interval(&self) -> Option<f64> {
        match &self.kind {
            EventKind::ConcurrentInterval { interval_secs, .. } => *interval_secs,
            _ => None,
        }
    }

    /// Own memory figures, with absent fields filled in by summing the
    /// details that report them.
    pub fn effective_memory(&self) -> Memory {
        let details = self.details();
        let sum = |pick: fn(&Memory) -> Option<u64>| -> Option<u64> {
            details
                .iter()
                .filter_map(|d| pick(&d.effective_memory()))
                .fold(None, |acc, v| Some(acc.unwrap_or(0_u64).saturating_add(v)))
        };
        Memory {
            before_kb: self.memory.before_kb.or_else(|| sum(|m| m.before_kb)),
            after_kb: self.memory.after_kb.or_else(|| sum(|m| m.after_kb)),
            capacity_kb: self.memory.capacity_kb.or_else(|| sum(|m| m.capacity_kb)),
        }
    }
}
