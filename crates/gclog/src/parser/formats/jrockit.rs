//! JRockit `-Xverbose:memory` output.
//!
//! ```text
//! [memory ] 4.256-4.268: parallel nursery GC 57392K->8388K (131072K), 11.380 ms
//! [INFO ][memory ] [YC#1] 0.579-0.609: YC 32768KB->18126KB (65536KB), 0.030 s, sum of pauses 29.895 ms, longest pause 29.895 ms.
//! ```
//!
//! Other `[memory ]` lines (heap layout, collector mode) are informational.
//! Type names are looked up under the `jrockit.` prefix so they never clash
//! with HotSpot phrases.

use std::sync::LazyLock;
use regex::Regex;
use tracing::debug;

use crate::model::{LogEvent, Memory};
use crate::parser::catalog;
use crate::parser::model::{GcFormat, LineError, LineResult};
use crate::parser::traits::Grammar;
use crate::parser::units;

static COLLECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^(?:\[\w+\s*\])?\[memory\s*\]\s*(?:\[(?:YC|OC)#\d+\]\s*)?",
        r"(\d+(?:\.\d+)?)(?:-\d+(?:\.\d+)?)?:\s*(.+?)\s+",
        r"(\d+)([KMG]?)B?->(\d+)([KMG]?)B?\s*\((\d+)([KMG]?)B?\),\s*",
        r"(\d+(?:\.\d+)?)\s*(ms|s)\b",
        r"(?:,\s*sum of pauses (\d+(?:\.\d+)?) ms)?",
    ))
    .expect("Invalid jrockit collection regex pattern")
});

/// `[memory ]`, `[INFO ][memory ]` and other module tags.
static DECORATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\[\w+\s*\])+").expect("Invalid jrockit decoration regex pattern")
});

#[derive(Debug)]
pub struct JRockitGrammar {
    format: GcFormat,
}

impl JRockitGrammar {
    pub fn new(format: GcFormat) -> Self {
        Self { format }
    }

    fn parse_event(line: &str) -> Result<LogEvent, LineError> {
        let caps = COLLECTION_RE
            .captures(line)
            .ok_or_else(|| LineError::malformed("not a jrockit collection record"))?;

        let number = |idx: usize| -> Result<f64, LineError> {
            caps.get(idx)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .ok_or_else(|| LineError::malformed(format!("bad jrockit field {}", idx)))
        };
        let kilobytes = |value_idx: usize| -> Result<u64, LineError> {
            let unit = caps
                .get(value_idx + 1)
                .and_then(|m| m.as_str().bytes().next())
                .unwrap_or(b'K');
            Ok(units::to_kilobytes(number(value_idx)?, unit))
        };

        let timestamp = number(1)?;
        let type_name = caps.get(2).map_or("", |m| m.as_str());
        let descriptor = catalog::resolve(&format!("jrockit.{}", type_name))?;

        let memory = Memory {
            before_kb: Some(kilobytes(3)?),
            after_kb: Some(kilobytes(5)?),
            capacity_kb: Some(kilobytes(7)?),
        };

        // 1.6 reports the wall-clock span of the collection followed by the
        // sum of its pauses; the latter is the stop-the-world time.
        let pause = match caps.get(11) {
            Some(_) => units::millis_to_secs(number(11)?),
            None => {
                let duration = number(9)?;
                match caps.get(10).map(|m| m.as_str()) {
                    Some("ms") => units::millis_to_secs(duration),
                    _ => duration,
                }
            }
        };

        Ok(LogEvent::new(timestamp, descriptor).with_pause(pause).with_memory(memory))
    }
}

impl Grammar for JRockitGrammar {
    fn format(&self) -> GcFormat {
        self.format
    }

    fn parse_line(&mut self, line: &str, line_no: usize) -> LineResult {
        if !DECORATION_RE.is_match(line) {
            let err = LineError::malformed("missing jrockit module tag");
            tracing::warn!(line = line_no, error = %err, "jrockit: skipping line");
            return LineResult::failed(line_no, &err, line);
        }
        if !line.contains("->") {
            debug!(line = line_no, "jrockit: informational line");
            return LineResult::none();
        }
        match Self::parse_event(line.trim()) {
            Ok(event) => LineResult::event(event),
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "jrockit: skipping line");
                LineResult::failed(line_no, &e, line)
            }
        }
    }
}
