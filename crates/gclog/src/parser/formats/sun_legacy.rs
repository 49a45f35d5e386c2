//! Sun JDK 1.2.2 `-verbose:gc`.
//!
//! ```text
//! <GC: 101 milliseconds since last GC>
//! <GC: freed 2849 objects, 159240 bytes in 3 ms, 79% free (1306144/1627136)>
//! ```
//!
//! The first line of a pair gives the gap since the previous collection; the
//! second line completes the event. Timestamps are the running sum of gaps.

use std::sync::LazyLock;
use regex::Regex;
use tracing::{debug, warn};

use crate::model::{LogEvent, Memory};
use crate::parser::catalog;
use crate::parser::model::{GcFormat, LineError, LineResult, ParseWarning, PendingDiscard};
use crate::parser::traits::Grammar;
use crate::parser::units;

static SINCE_LAST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<GC: (\d+) milliseconds since last GC>\s*$").expect("Invalid since-last regex pattern")
});

static FREED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<GC: freed \d+ objects, (\d+) bytes in (\d+) ms, \d+% free \((\d+)/(\d+)\)>\s*$")
        .expect("Invalid freed regex pattern")
});

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    AwaitingGap,
    AwaitingFreed { line: usize },
}

#[derive(Debug)]
pub struct SunLegacyGrammar {
    state: State,
    elapsed_ms: u64,
    /// A pair was dropped half way; its freed record may still follow.
    orphaned: bool,
}

impl SunLegacyGrammar {
    pub fn new() -> Self {
        Self {
            state: State::AwaitingGap,
            elapsed_ms: 0,
            orphaned: false,
        }
    }

    fn capture_u64(caps: &regex::Captures<'_>, idx: usize) -> Result<u64, LineError> {
        caps.get(idx)
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(|| LineError::malformed("number out of range"))
    }

    fn step(&mut self, line: &str, line_no: usize) -> Result<Option<LogEvent>, LineError> {
        if let Some(caps) = SINCE_LAST_RE.captures(line) {
            self.elapsed_ms = self.elapsed_ms.saturating_add(Self::capture_u64(&caps, 1)?);
            self.state = State::AwaitingFreed { line: line_no };
            self.orphaned = false;
            return Ok(None);
        }

        let caps = FREED_RE
            .captures(line)
            .ok_or_else(|| LineError::malformed("expected a 1.2.2 GC record"))?;
        if self.state == State::AwaitingGap {
            if std::mem::take(&mut self.orphaned) {
                debug!(line = line_no, "sun 1.2.2: skipping freed record of dropped pair");
                return Ok(None);
            }
            return Err(LineError::malformed("freed record without preceding gap record"));
        }
        self.state = State::AwaitingGap;

        let freed = Self::capture_u64(&caps, 1)?;
        let pause_ms = Self::capture_u64(&caps, 2)?;
        let free = Self::capture_u64(&caps, 3)?;
        let total = Self::capture_u64(&caps, 4)?;
        let used = total.saturating_sub(free);

        let memory = Memory {
            before_kb: Some(units::bytes_to_kb(used.saturating_add(freed))),
            after_kb: Some(units::bytes_to_kb(used)),
            capacity_kb: Some(units::bytes_to_kb(total)),
        };
        let timestamp = self.elapsed_ms as f64 / 1000.0;
        Ok(Some(
            LogEvent::new(timestamp, catalog::resolve("GC")?)
                .with_pause(units::millis_to_secs(pause_ms as f64))
                .with_memory(memory),
        ))
    }
}

impl Default for SunLegacyGrammar {
    fn default() -> Self {
        Self::new()
    }
}

impl Grammar for SunLegacyGrammar {
    fn format(&self) -> GcFormat {
        GcFormat::Sun1_2_2
    }

    fn parse_line(&mut self, line: &str, line_no: usize) -> LineResult {
        let text = line.trim();
        let mut result = LineResult::none();
        if let State::AwaitingFreed { line: opened } = self.state {
            if SINCE_LAST_RE.is_match(text) {
                let err = LineError::malformed("gap record without freed record");
                warn!(line = opened, error = %err, "sun 1.2.2: dropping open pair");
                result.push_warning(ParseWarning::from_error(opened, &err, line));
            }
        }
        match self.step(text, line_no) {
            Ok(Some(event)) => result.push_event(event),
            Ok(None) => {}
            Err(e) => {
                self.orphaned = matches!(self.state, State::AwaitingFreed { .. });
                self.state = State::AwaitingGap;
                warn!(line = line_no, error = %e, "sun 1.2.2: resetting");
                result.push_warning(ParseWarning::from_error(line_no, &e, line));
            }
        }
        result
    }

    fn finish(&mut self) -> Vec<PendingDiscard> {
        match std::mem::replace(&mut self.state, State::AwaitingGap) {
            State::AwaitingFreed { line } => vec![PendingDiscard {
                line,
                description: "gap record without freed record".to_string(),
            }],
            State::AwaitingGap => Vec::new(),
        }
    }

    fn pending(&self) -> usize {
        usize::from(self.state != State::AwaitingGap)
    }
}
