//! Shenandoah default (non-unified) output.
//!
//! ```text
//! 13.976: [Pause Init Mark, 3.587 ms]
//! 13.980: [Concurrent marking 106M->88M(128M), 3.688 ms]
//! Concurrent marking 106M->88M(128M) 3.688ms
//! ```
//!
//! A line either matches as a whole and yields one event or is rejected.

use std::sync::LazyLock;
use regex::Regex;

use crate::model::{CorrelationKey, LogEvent};
use crate::parser::catalog;
use crate::parser::cursor::{self, ParseCursor};
use crate::parser::model::{GcFormat, LineError, LineResult};
use crate::parser::traits::Grammar;
use crate::parser::units;

static PHASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^\[?((?:Pause|Concurrent)[^\[\]\d,]*?)",
        r"(?:,?\s+(\d[\d.,]*[BKMG]\S*->\S+))?",
        r",?\s+(\d+(?:[.,]\d+)?)\s*ms\]?\s*$",
    ))
    .expect("Invalid shenandoah phase regex pattern")
});

#[derive(Debug, Default)]
pub struct ShenandoahGrammar {
    last_timestamp: f64,
}

impl ShenandoahGrammar {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_event(&mut self, line: &str, line_no: usize) -> Result<LogEvent, LineError> {
        let mut cur = ParseCursor::new(line_no);
        let datestamp = cursor::read_datestamp(line, &mut cur).ok();
        if let Ok(ts) = cursor::read_timestamp(line, &mut cur) {
            self.last_timestamp = ts;
        }
        let rest = cur.rest(line);

        let caps = PHASE_RE
            .captures(rest)
            .ok_or_else(|| LineError::malformed("not a shenandoah phase line"))?;

        let phrase = caps.get(1).map_or("", |m| m.as_str()).trim();
        let descriptor = catalog::resolve(phrase)?;

        let duration_text = caps.get(3).map_or("", |m| m.as_str());
        let mut dcur = ParseCursor::new(line_no);
        let duration = units::millis_to_secs(cursor::read_number(duration_text, &mut dcur)?);

        let mut event = if descriptor.concurrency.is_concurrent() {
            let mut e = LogEvent::concurrent(
                self.last_timestamp,
                descriptor,
                CorrelationKey::Phase(descriptor.name.to_string()),
            );
            e.set_interval(duration);
            e
        } else {
            LogEvent::new(self.last_timestamp, descriptor)
        };
        event.set_pause(Some(duration));
        event = event.with_datestamp(datestamp);

        if let Some(mem) = caps.get(2) {
            let mut mcur = ParseCursor::new(line_no);
            let triple = cursor::read_memory(mem.as_str(), &mut mcur)?;
            event.set_memory(triple);
        }
        Ok(event)
    }
}

impl Grammar for ShenandoahGrammar {
    fn format(&self) -> GcFormat {
        GcFormat::Shenandoah
    }

    fn parse_line(&mut self, line: &str, line_no: usize) -> LineResult {
        match self.parse_event(line, line_no) {
            Ok(event) => LineResult::event(event),
            Err(e) => LineResult::failed(line_no, &e, line),
        }
    }
}
