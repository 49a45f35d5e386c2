use serde::Serialize;

use super::event::LogEvent;
use crate::parser::model::{GcFormat, ParseWarning};

/// Ordered result of one parsing session.
///
/// Events stay in parse order, which on malformed input can diverge from
/// timestamp order. Nothing here re-sorts them.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GcLog {
    format: Option<GcFormat>,
    events: Vec<LogEvent>,
    warnings: Vec<ParseWarning>,
    #[serde(skip)]
    next_sequence: u64,
}

impl GcLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(&self) -> Option<GcFormat> {
        self.format
    }

    pub(crate) fn set_format(&mut self, format: GcFormat) {
        self.format = Some(format);
    }

    /// Append an event, stamping it (and its details) with parse-order
    /// sequence numbers.
    pub(crate) fn push(&mut self, mut event: LogEvent) {
        event.assign_sequence(&mut self.next_sequence);
        self.events.push(event);
    }

    pub(crate) fn record_warning(&mut self, warning: ParseWarning) {
        self.warnings.push(warning);
    }

    pub fn events(&self) -> &[LogEvent] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LogEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    pub fn into_events(self) -> Vec<LogEvent> {
        self.events
    }
}

impl<'a> IntoIterator for &'a GcLog {
    type Item = &'a LogEvent;
    type IntoIter = std::slice::Iter<'a, LogEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}
