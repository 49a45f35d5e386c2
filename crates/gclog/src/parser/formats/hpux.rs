//! HP-UX JVM `-Xverbosegc` output.
//!
//! Each collection is one `<GC: ... >` record of whitespace-separated fields.
//! Long records wrap across physical lines, so tokens are collected until the
//! closing `>`.
//!
//! ```text
//! <GC: 1 2.188924 1 0 3014656 3538944 0 3538944 0 524288 524288 1179648 7339008 1179648 7339008 1048576 1048576 1048576 1048576 0.059488 >
//! ```
//!
//! All sizes are bytes; times are seconds.

use tracing::{debug, warn};

use crate::model::{LogEvent, Memory};
use crate::parser::catalog;
use crate::parser::model::{GcFormat, LineError, LineResult, ParseWarning, PendingDiscard, WarningReason};
use crate::parser::traits::Grammar;
use crate::parser::units;

const RECORD_OPEN: &str = "<GC:";

/// Positions of the fields of one record layout.
struct Layout {
    tokens: usize,
    timestamp: usize,
    /// before, capacity before, after, capacity after
    eden: usize,
    /// before, after, capacity
    survivor: usize,
    old: usize,
    perm: usize,
    duration: usize,
}

const LAYOUT_1_2: Layout = Layout {
    tokens: 20,
    timestamp: 1,
    eden: 4,
    survivor: 8,
    old: 11,
    perm: 15,
    duration: 19,
};

const LAYOUT_1_4_1: Layout = Layout {
    tokens: 22,
    timestamp: 2,
    eden: 6,
    survivor: 10,
    old: 13,
    perm: 17,
    duration: 21,
};

/// Token count of a complete record for the given variant.
pub(crate) fn record_tokens(format: GcFormat) -> usize {
    layout(format).tokens
}

fn layout(format: GcFormat) -> &'static Layout {
    match format {
        GcFormat::HpUx1_2 => &LAYOUT_1_2,
        _ => &LAYOUT_1_4_1,
    }
}

struct OpenRecord {
    line: usize,
    tokens: Vec<String>,
}

pub struct HpUxGrammar {
    format: GcFormat,
    open: Option<OpenRecord>,
}

impl HpUxGrammar {
    pub fn new(format: GcFormat) -> Self {
        Self { format, open: None }
    }

    /// Append the tokens of `text`. Returns true once the closing `>` was seen.
    fn collect(&mut self, text: &str) -> bool {
        let (body, closed) = match text.find('>') {
            Some(idx) => (&text[..idx], true),
            None => (text, false),
        };
        if let Some(open) = self.open.as_mut() {
            open.tokens.extend(body.split_whitespace().map(str::to_string));
        }
        closed
    }

    fn build(&self, tokens: &[String]) -> Result<LogEvent, LineError> {
        let layout = layout(self.format);
        if tokens.len() != layout.tokens {
            return Err(LineError::malformed(format!(
                "expected {} fields, found {}",
                layout.tokens,
                tokens.len()
            )));
        }
        let float = |idx: usize| -> Result<f64, LineError> {
            tokens[idx]
                .parse::<f64>()
                .map_err(|_| LineError::malformed(format!("field {} is not a number: {}", idx, tokens[idx])))
        };
        let kb = |idx: usize| -> Result<u64, LineError> {
            tokens[idx]
                .parse::<u64>()
                .map(units::bytes_to_kb)
                .map_err(|_| LineError::malformed(format!("field {} is not a byte count: {}", idx, tokens[idx])))
        };
        // before, capacity before, after, capacity after
        let four = |start: usize| -> Result<Memory, LineError> {
            Ok(Memory {
                before_kb: Some(kb(start)?),
                after_kb: Some(kb(start + 2)?),
                capacity_kb: Some(kb(start + 3)?),
            })
        };

        let type_name = if tokens[0] == "1" { "GC" } else { "Full GC" };
        let timestamp = float(layout.timestamp)?;
        let pause = float(layout.duration)?;

        let generations = [
            ("hpux.eden", four(layout.eden)?),
            (
                "hpux.survivor",
                Memory {
                    before_kb: Some(kb(layout.survivor)?),
                    after_kb: Some(kb(layout.survivor + 1)?),
                    capacity_kb: Some(kb(layout.survivor + 2)?),
                },
            ),
            ("hpux.old", four(layout.old)?),
            ("hpux.perm", four(layout.perm)?),
        ];

        // The heap figure excludes the permanent generation.
        let heap = generations[..3].iter().fold(Memory::new(0, 0, Some(0)), |acc, (_, m)| Memory {
            before_kb: Some(acc.before_kb.unwrap_or(0).saturating_add(m.before_kb.unwrap_or(0))),
            after_kb: Some(acc.after_kb.unwrap_or(0).saturating_add(m.after_kb.unwrap_or(0))),
            capacity_kb: Some(acc.capacity_kb.unwrap_or(0).saturating_add(m.capacity_kb.unwrap_or(0))),
        });

        let mut event = LogEvent::new(timestamp, catalog::resolve(type_name)?)
            .with_pause(pause)
            .with_memory(heap);
        for (name, memory) in generations {
            let child = LogEvent::new(timestamp, catalog::resolve(name)?).with_memory(memory);
            if event.add_detail(child).is_err() {
                debug!(detail = name, "hpux: detail on concurrent event dropped");
            }
        }
        Ok(event)
    }

    fn complete(&mut self, line_no: usize, text: &str, result: &mut LineResult) {
        let Some(open) = self.open.take() else {
            return;
        };
        match self.build(&open.tokens) {
            Ok(event) => result.push_event(event),
            Err(e) => {
                warn!(line = line_no, opened = open.line, error = %e, "hpux: dropping record");
                result.push_warning(ParseWarning::from_error(open.line, &e, text));
            }
        }
    }
}

impl Grammar for HpUxGrammar {
    fn format(&self) -> GcFormat {
        self.format
    }

    fn parse_line(&mut self, line: &str, line_no: usize) -> LineResult {
        let mut result = LineResult::none();
        let trimmed = line.trim();

        let body = if let Some(rest) = trimmed.strip_prefix(RECORD_OPEN) {
            if let Some(previous) = self.open.take() {
                result.push_warning(ParseWarning::new(
                    previous.line,
                    WarningReason::MalformedLine,
                    "record not terminated before the next one",
                    line,
                ));
            }
            self.open = Some(OpenRecord {
                line: line_no,
                tokens: Vec::with_capacity(layout(self.format).tokens),
            });
            rest
        } else if self.open.is_some() {
            trimmed
        } else {
            return LineResult::failed(line_no, &LineError::malformed("expected a <GC: record"), line);
        };

        if self.collect(body) {
            self.complete(line_no, line, &mut result);
        }
        result
    }

    fn finish(&mut self) -> Vec<PendingDiscard> {
        self.open
            .take()
            .map(|o| PendingDiscard {
                line: o.line,
                description: format!("<GC: record with {} fields and no closing >", o.tokens.len()),
            })
            .into_iter()
            .collect()
    }

    fn pending(&self) -> usize {
        usize::from(self.open.is_some())
    }
}
