//! IBM JDK 1.3.1 and 1.4.2 `-verbose:gc`.
//!
//! ```text
//! <AF[5]: Allocation Failure. need 528 bytes, 5702 ms since last AF or CON>
//! <AF[5]: managing allocation failure, action=1 (0/94558696) (1048576/1048576)>
//!   <GC(5): freed 57497912 bytes, 61% free (58546488/95607272), in 41 ms>
//!   <GC(5): expanded heap by 1048576 to 96655848 bytes, 62% free>
//! <AF[5]: completed in 42 ms>
//! ```
//!
//! One collection is a fixed sequence of records. Anything out of sequence
//! drops the partial event and starts over.

use std::sync::LazyLock;
use regex::Regex;
use tracing::{debug, warn};

use crate::model::{LogEvent, Memory};
use crate::parser::catalog;
use crate::parser::model::{GcFormat, LineError, LineResult, PendingDiscard};
use crate::parser::traits::Grammar;
use crate::parser::units;

static FAILURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^<(AF|SYS)\[(\d+)\]: (?:Allocation Failure|GC requested)[^>]*?",
        r"(?:(\d+) ms since last (?:AF or CON|AF|GC|CON))?>\s*$",
    ))
        .expect("Invalid allocation failure regex pattern")
});

static ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<AF\[\d+\]: managing allocation failure, action=\d+").expect("Invalid action regex pattern")
});

static FREED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<GC\(\d+\): freed (\d+) bytes, \d+% free \((\d+)/(\d+)\), in (\d+) ms>")
        .expect("Invalid freed regex pattern")
});

static EXPANDED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<GC\(\d+\): expanded heap by \d+ to (\d+) bytes").expect("Invalid expansion regex pattern")
});

static COMPLETED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^<(?:AF|SYS)\[\d+\]: completed in (\d+) ms>").expect("Invalid completion regex pattern")
});

/// Any record that belongs inside a collection.
fn is_cycle_record(line: &str) -> bool {
    ACTION_RE.is_match(line) || FREED_RE.is_match(line) || EXPANDED_RE.is_match(line) || COMPLETED_RE.is_match(line)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    AwaitingFailure,
    AwaitingAction,
    AwaitingFreed,
    AwaitingExpansion,
    AwaitingCompletion,
}

#[derive(Debug)]
struct Partial {
    line: usize,
    system: bool,
    timestamp: f64,
    memory: Memory,
}

#[derive(Debug)]
pub struct IbmGrammar {
    format: GcFormat,
    state: State,
    partial: Option<Partial>,
    elapsed_ms: u64,
}

fn number<T: std::str::FromStr>(caps: &regex::Captures<'_>, idx: usize) -> Result<T, LineError> {
    caps.get(idx)
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| LineError::malformed("number out of range"))
}

impl IbmGrammar {
    pub fn new(format: GcFormat) -> Self {
        Self {
            format,
            state: State::AwaitingFailure,
            partial: None,
            elapsed_ms: 0,
        }
    }

    fn reset(&mut self) {
        self.state = State::AwaitingFailure;
        self.partial = None;
    }

    fn open(&mut self, caps: &regex::Captures<'_>, line_no: usize) -> Result<(), LineError> {
        let system = caps.get(1).map(|m| m.as_str()) == Some("SYS");
        if caps.get(3).is_some() {
            self.elapsed_ms = self.elapsed_ms.saturating_add(number::<u64>(caps, 3)?);
        }
        self.partial = Some(Partial {
            line: line_no,
            system,
            timestamp: self.elapsed_ms as f64 / 1000.0,
            memory: Memory::default(),
        });
        self.state = if system { State::AwaitingFreed } else { State::AwaitingAction };
        debug!(line = line_no, system, "ibm: collection opened");
        Ok(())
    }

    fn complete(&mut self, pause_ms: u64) -> Result<LogEvent, LineError> {
        let partial = self
            .partial
            .take()
            .ok_or_else(|| LineError::malformed("completion without open collection"))?;
        self.state = State::AwaitingFailure;
        let descriptor = catalog::resolve(if partial.system { "sys" } else { "af" })?;
        Ok(LogEvent::new(partial.timestamp, descriptor)
            .with_pause(units::millis_to_secs(pause_ms as f64))
            .with_memory(partial.memory))
    }

    fn step(&mut self, line: &str, line_no: usize) -> Result<Option<LogEvent>, LineError> {
        match self.state {
            State::AwaitingFailure => {
                let Some(caps) = FAILURE_RE.captures(line) else {
                    // Tail of a collection whose opening records were lost.
                    if is_cycle_record(line) {
                        debug!(line = line_no, "ibm: skipping record of dropped collection");
                        return Ok(None);
                    }
                    return Err(LineError::malformed("expected allocation failure record"));
                };
                self.open(&caps, line_no)?;
                Ok(None)
            }
            State::AwaitingAction => {
                if !ACTION_RE.is_match(line) {
                    return Err(LineError::malformed("expected managing allocation failure record"));
                }
                self.state = State::AwaitingFreed;
                Ok(None)
            }
            State::AwaitingFreed => {
                let caps = FREED_RE
                    .captures(line)
                    .ok_or_else(|| LineError::malformed("expected freed record"))?;
                let freed: u64 = number(&caps, 1)?;
                let free: u64 = number(&caps, 2)?;
                let total: u64 = number(&caps, 3)?;
                let used = total.saturating_sub(free);
                if let Some(p) = self.partial.as_mut() {
                    p.memory = Memory {
                        before_kb: Some(units::bytes_to_kb(used.saturating_add(freed))),
                        after_kb: Some(units::bytes_to_kb(used)),
                        capacity_kb: Some(units::bytes_to_kb(total)),
                    };
                }
                self.state = State::AwaitingExpansion;
                Ok(None)
            }
            State::AwaitingExpansion | State::AwaitingCompletion => {
                if self.state == State::AwaitingExpansion {
                    if let Some(caps) = EXPANDED_RE.captures(line) {
                        let new_total: u64 = number(&caps, 1)?;
                        if let Some(p) = self.partial.as_mut() {
                            p.memory.capacity_kb = Some(units::bytes_to_kb(new_total));
                        }
                        self.state = State::AwaitingCompletion;
                        return Ok(None);
                    }
                }
                let caps = COMPLETED_RE
                    .captures(line)
                    .ok_or_else(|| LineError::malformed("expected completion record"))?;
                let pause_ms: u64 = number(&caps, 1)?;
                self.complete(pause_ms).map(Some)
            }
        }
    }
}

impl Grammar for IbmGrammar {
    fn format(&self) -> GcFormat {
        self.format
    }

    fn parse_line(&mut self, line: &str, line_no: usize) -> LineResult {
        match self.step(line.trim(), line_no) {
            Ok(Some(event)) => LineResult::event(event),
            Ok(None) => LineResult::none(),
            Err(e) => {
                let resync = self.state != State::AwaitingFailure;
                if let Some(p) = &self.partial {
                    warn!(line = line_no, opened = p.line, error = %e, "ibm: dropping partial collection");
                }
                self.reset();
                let mut result = LineResult::failed(line_no, &e, line);
                // The line that broke the sequence may open the next collection.
                if resync {
                    match self.step(line.trim(), line_no) {
                        Ok(Some(event)) => result.push_event(event),
                        Ok(None) => {}
                        Err(_) => self.reset(),
                    }
                }
                result
            }
        }
    }

    fn finish(&mut self) -> Vec<PendingDiscard> {
        let dropped = self
            .partial
            .take()
            .map(|p| PendingDiscard {
                line: p.line,
                description: format!("{} collection without completion record", if p.system { "SYS" } else { "AF" }),
            })
            .into_iter()
            .collect();
        self.reset();
        dropped
    }

    fn pending(&self) -> usize {
        usize::from(self.partial.is_some())
    }
}
