//! Go runtime `GODEBUG=gctrace=1` output.
//!
//! ```text
//! gc 1 @0.012s 0%: 0.020+0.300+0.0047 ms clock, 0.040+0/0.250/0.100+0.0094 ms cpu, 4->4->5 MB, 8 MB goal, 8 P
//! ```
//!
//! The three clock phases are sweep termination (STW), concurrent mark and
//! mark termination (STW). The reported pause is the sum of the two STW
//! phases. Heap figures are heap-at-start, heap-at-end and live heap; the
//! event's after-value is the live heap.

use std::sync::LazyLock;
use regex::Regex;

use crate::model::LogEvent;
use crate::parser::catalog;
use crate::parser::model::{GcFormat, LineError, LineResult};
use crate::parser::traits::Grammar;
use crate::parser::units;

static GCTRACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^gc (\d+) @(\d+(?:\.\d+)?)s \d+%: ",
        r"(\d+(?:\.\d+)?)\+(\d+(?:\.\d+)?)\+(\d+(?:\.\d+)?) ms clock, ",
        r".*? (\d+)->(\d+)->(\d+) MB, (\d+) MB goal,",
        r".*? \d+ P(?: \(forced\))?\s*$",
    ))
    .expect("Invalid gctrace regex pattern")
});

#[derive(Debug, Default)]
pub struct GoGrammar;

impl GoGrammar {
    pub fn new() -> Self {
        Self
    }

    fn parse_event(line: &str) -> Result<LogEvent, LineError> {
        let caps = GCTRACE_RE
            .captures(line)
            .ok_or_else(|| LineError::malformed("not a gctrace line"))?;

        let number = |idx: usize| -> Result<f64, LineError> {
            caps.get(idx)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .ok_or_else(|| LineError::malformed(format!("bad gctrace field {}", idx)))
        };

        let timestamp = number(2)?;
        let sweep_term_ms = number(3)?;
        let mark_term_ms = number(5)?;
        let before_mb = number(6)?;
        let live_mb = number(8)?;

        let descriptor = catalog::resolve("GC")?;
        let memory = crate::model::Memory {
            before_kb: Some(units::to_kilobytes(before_mb, b'M')),
            after_kb: Some(units::to_kilobytes(live_mb, b'M')),
            capacity_kb: None,
        };
        Ok(LogEvent::new(timestamp, descriptor)
            .with_pause(units::millis_to_secs(sweep_term_ms + mark_term_ms))
            .with_memory(memory))
    }
}

impl Grammar for GoGrammar {
    fn format(&self) -> GcFormat {
        GcFormat::Go
    }

    fn parse_line(&mut self, line: &str, line_no: usize) -> LineResult {
        match Self::parse_event(line) {
            Ok(event) => LineResult::event(event),
            Err(e) => LineResult::failed(line_no, &e, line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::model::WarningReason;

    const LINE: &str = "gc 1 @0.012s 0%: 0.020+0.300+0.0047 ms clock, 0.040+0/0.250/0.100+0.0094 ms cpu, 4->4->5 MB, 8 MB goal, 8 P";

    #[test]
    fn test_gctrace_line() {
        let mut g = GoGrammar::new();
        let result = g.parse_line(LINE, 1);
        assert!(result.warnings.is_empty());
        let event = &result.events[0];
        assert_eq!(event.timestamp(), 0.012);
        assert_eq!(event.type_name(), "GC");
        assert_eq!(event.memory().before_kb, Some(4096));
        assert_eq!(event.memory().after_kb, Some(5120));
        assert!((event.pause().unwrap() - 0.0000247).abs() < 1e-12);
    }

    #[test]
    fn test_forced_and_newer_fields() {
        let line = "gc 12 @3.512s 1%: 0.11+1.2+0.050 ms clock, 0.88+0.40/2.1/0.55+0.40 ms cpu, 12->13->6 MB, 14 MB goal, 0 MB stacks, 0 MB globals, 8 P (forced)";
        let mut g = GoGrammar::new();
        let result = g.parse_line(line, 7);
        let event = &result.events[0];
        assert_eq!(event.timestamp(), 3.512);
        assert_eq!(event.memory().after_kb, Some(6144));
        assert!((event.pause().unwrap() - 0.00016).abs() < 1e-12);
    }

    #[test]
    fn test_rejected_line_is_warning() {
        let mut g = GoGrammar::new();
        let result = g.parse_line("gc 1 @garbage", 3);
        assert!(result.events.is_empty());
        assert_eq!(result.warnings[0].reason, WarningReason::MalformedLine);
        assert_eq!(result.warnings[0].line, 3);
    }
}
