//! Unified JVM Logging (`-Xlog:gc*`).
//!
//! ```text
//! [0.240s][info][gc,start    ] GC(0) Pause Young (Normal) (G1 Evacuation Pause)
//! [0.241s][info][gc,heap     ] GC(0) Eden regions: 2->0(3)
//! [0.241s][info][gc          ] GC(0) Pause Young (Normal) (G1 Evacuation Pause) 24M->4M(256M) 1.021ms
//! ```
//!
//! One logical collection is spread over several physical lines that share
//! the `GC(n)` id. A `gc,start` line opens a pending entry, `gc,heap` and
//! `gc,metaspace` lines attach per-generation details, and the `gc` line of
//! the same type closes it.

use std::collections::HashMap;
use chrono::{DateTime, FixedOffset};
use tracing::debug;

use crate::model::{CorrelationKey, LogEvent, Memory, NumericShape};
use crate::parser::catalog;
use crate::parser::cursor::{self, ParseCursor};
use crate::parser::model::{GcFormat, LineError, LineResult, ParseWarning, PendingDiscard, WarningReason};
use crate::parser::traits::Grammar;

const LEVELS: [&str; 5] = ["trace", "debug", "info", "warning", "error"];

struct PendingEvent {
    line: usize,
    id: u64,
    event: LogEvent,
}

struct OpenPhase {
    line: usize,
    timestamp: f64,
}

/// Decorations stripped from the front of one line.
#[derive(Debug, Default, PartialEq)]
struct Decorations<'a> {
    uptime: Option<f64>,
    datestamp: Option<DateTime<FixedOffset>>,
    tags: &'a str,
    message: &'a str,
}

fn split_decorations(line: &str) -> Option<Decorations<'_>> {
    let mut deco = Decorations::default();
    let mut rest = line;
    let mut seen = false;
    while let Some(inner) = rest.strip_prefix('[') {
        let close = inner.find(']')?;
        let content = inner[..close].trim();
        rest = &inner[close + 1..];
        seen = true;

        if let Ok(d) = DateTime::parse_from_str(content, "%Y-%m-%dT%H:%M:%S%.f%z") {
            deco.datestamp = Some(d);
        } else if let Some(ms) = content.strip_suffix("ms").and_then(|v| v.parse::<f64>().ok()) {
            deco.uptime = Some(ms / 1000.0);
        } else if let Some(ns) = content.strip_suffix("ns").and_then(|v| v.parse::<f64>().ok()) {
            deco.uptime = Some(ns / 1e9);
        } else if let Some(s) = content.strip_suffix('s').and_then(|v| v.parse::<f64>().ok()) {
            deco.uptime = Some(s);
        } else if LEVELS.contains(&content) || content.bytes().all(|b| b.is_ascii_digit()) {
            // level, pid or tid
        } else {
            deco.tags = content;
        }
    }
    if !seen {
        return None;
    }
    deco.message = rest.trim();
    Some(deco)
}

/// `GC(12) text` → `(12, "text")`.
fn split_gc_id(message: &str) -> Option<(u64, &str)> {
    let inner = message.strip_prefix("GC(")?;
    let close = inner.find(')')?;
    let id = inner[..close].parse().ok()?;
    Some((id, inner[close + 1..].trim()))
}

pub struct UnifiedGrammar {
    pending: HashMap<u64, PendingEvent>,
    open_phases: HashMap<(u64, &'static str), OpenPhase>,
    max_pending: usize,
    region_kb: Option<u64>,
    first_datestamp: Option<DateTime<FixedOffset>>,
    last_timestamp: f64,
}

impl UnifiedGrammar {
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: HashMap::new(),
            open_phases: HashMap::new(),
            max_pending: max_pending.max(1),
            region_kb: None,
            first_datestamp: None,
            last_timestamp: 0.0,
        }
    }

    fn timestamp(&mut self, deco: &Decorations<'_>) -> f64 {
        let ts = match (deco.uptime, deco.datestamp) {
            (Some(up), _) => up,
            (None, Some(date)) => {
                let first = *self.first_datestamp.get_or_insert(date);
                (date - first).num_milliseconds() as f64 / 1000.0
            }
            (None, None) => self.last_timestamp,
        };
        self.last_timestamp = ts;
        ts
    }

    /// Lines without a `GC(n)` id. Only the region size matters.
    fn observe_info(&mut self, message: &str) {
        let lower = message.to_ascii_lowercase();
        if let Some(idx) = lower.find("heap region size:") {
            let text = &message[idx + "heap region size:".len()..];
            let mut cur = ParseCursor::new(0);
            if let Ok(m) = cursor::read_memory(text, &mut cur) {
                debug!(region_kb = m.before_kb, "unified: region size");
                self.region_kb = Some(m.before_kb);
            }
        }
    }

    fn evict_oldest(&mut self, result: &mut LineResult) {
        let oldest = self
            .pending
            .values()
            .min_by_key(|p| p.line)
            .map(|p| p.id);
        if let Some(id) = oldest {
            if let Some(p) = self.pending.remove(&id) {
                result.push_warning(ParseWarning::new(
                    p.line,
                    WarningReason::PendingEvicted,
                    format!("GC({}) {} evicted by pending bound", id, p.event.type_name()),
                    "",
                ));
            }
        }
    }

    fn open_phase(&mut self, key: (u64, &'static str), line_no: usize, ts: f64, result: &mut LineResult) {
        if self.open_phases.len() >= self.max_pending && !self.open_phases.contains_key(&key) {
            let oldest = self
                .open_phases
                .iter()
                .min_by_key(|(_, p)| p.line)
                .map(|(k, _)| *k);
            if let Some(k) = oldest {
                if let Some(p) = self.open_phases.remove(&k) {
                    result.push_warning(ParseWarning::new(
                        p.line,
                        WarningReason::PendingEvicted,
                        format!("GC({}) {} evicted by pending bound", k.0, k.1),
                        "",
                    ));
                }
            }
        }
        self.open_phases.insert(key, OpenPhase { line: line_no, timestamp: ts });
    }

    fn open(
        &mut self,
        id: u64,
        text: &str,
        ts: f64,
        datestamp: Option<DateTime<FixedOffset>>,
        line_no: usize,
    ) -> Result<LineResult, LineError> {
        let mut result = LineResult::none();
        let descriptor = catalog::resolve(text)?;

        if descriptor.concurrency.is_concurrent() {
            self.open_phase((id, descriptor.name), line_no, ts, &mut result);
            return Ok(result);
        }

        if let Some(previous) = self.pending.remove(&id) {
            result.push_warning(ParseWarning::new(
                previous.line,
                WarningReason::PendingDiscarded,
                format!("GC({}) {} reopened before completion", id, previous.event.type_name()),
                "",
            ));
        } else if self.pending.len() >= self.max_pending {
            self.evict_oldest(&mut result);
        }

        debug!(id, event = descriptor.name, "unified: open pending");
        self.pending.insert(
            id,
            PendingEvent {
                line: line_no,
                id,
                event: LogEvent::new(ts, descriptor).with_datestamp(datestamp),
            },
        );
        Ok(result)
    }

    fn add_heap_detail(&mut self, id: u64, text: &str, line_no: usize) -> Result<LineResult, LineError> {
        let Some(pending) = self.pending.get_mut(&id) else {
            debug!(id, "unified: heap line without pending event");
            return Ok(LineResult::none());
        };
        let Some((name, values)) = text.split_once(':') else {
            return Ok(LineResult::none());
        };
        let Some(descriptor) = catalog::lookup(name) else {
            debug!(id, detail = name, "unified: skipping heap detail");
            return Ok(LineResult::none());
        };

        let mut cur = ParseCursor::new(line_no);
        let triple = cursor::read_memory(values, &mut cur)?;
        let memory = if descriptor.shape == NumericShape::Region {
            match self.region_kb {
                Some(size) => Memory {
                    before_kb: Some(triple.before_kb.saturating_mul(size)),
                    after_kb: Some(triple.after_kb.saturating_mul(size)),
                    capacity_kb: triple.capacity_kb.map(|c| c.saturating_mul(size)),
                },
                None => Memory::default(),
            }
        } else {
            triple.into()
        };

        let child = LogEvent::new(pending.event.timestamp(), descriptor).with_memory(memory);
        if pending.event.add_detail(child).is_err() {
            debug!(id, "unified: detail on concurrent event dropped");
        }
        Ok(LineResult::none())
    }

    fn complete(
        &mut self,
        id: u64,
        text: &str,
        ts: f64,
        datestamp: Option<DateTime<FixedOffset>>,
        line_no: usize,
    ) -> Result<LineResult, LineError> {
        let mut cur = ParseCursor::new(line_no);
        let name = cursor::read_type_name(text, &mut cur)?;
        let descriptor = catalog::resolve(name)?;
        let memory = cursor::read_memory(text, &mut cur).ok();
        let pause = cursor::read_pause(text, &mut cur).ok();

        if descriptor.concurrency.is_concurrent() {
            let Some(duration) = pause else {
                let mut result = LineResult::none();
                self.open_phase((id, descriptor.name), line_no, ts, &mut result);
                return Ok(result);
            };
            let interval = match self.open_phases.remove(&(id, descriptor.name)) {
                Some(start) => ts - start.timestamp,
                None => duration,
            };
            let mut event = LogEvent::concurrent(ts, descriptor, CorrelationKey::Id(id))
                .with_pause(duration)
                .with_datestamp(datestamp);
            event.set_interval(interval);
            if let Some(m) = memory {
                event.set_memory(m);
            }
            return Ok(LineResult::event(event));
        }

        match self.pending.remove(&id) {
            Some(mut p) if p.event.type_name() == descriptor.name => {
                p.event.set_pause(pause);
                if let Some(m) = memory {
                    p.event.set_memory(m);
                }
                debug!(id, event = descriptor.name, "unified: close pending");
                Ok(LineResult::event(p.event))
            }
            Some(mut p) => {
                let mut child = LogEvent::new(ts, descriptor);
                child.set_pause(pause);
                if let Some(m) = memory {
                    child.set_memory(m);
                }
                if p.event.add_detail(child).is_err() {
                    debug!(id, "unified: detail on concurrent event dropped");
                }
                self.pending.insert(id, p);
                Ok(LineResult::none())
            }
            None => {
                let mut event = LogEvent::new(ts, descriptor).with_datestamp(datestamp);
                event.set_pause(pause);
                if let Some(m) = memory {
                    event.set_memory(m);
                }
                Ok(LineResult::event(event))
            }
        }
    }
}

impl Grammar for UnifiedGrammar {
    fn format(&self) -> GcFormat {
        GcFormat::Unified
    }

    fn parse_line(&mut self, line: &str, line_no: usize) -> LineResult {
        let Some(deco) = split_decorations(line) else {
            return LineResult::failed(line_no, &LineError::malformed("missing decorations"), line);
        };
        let ts = self.timestamp(&deco);

        let Some((id, text)) = split_gc_id(deco.message) else {
            self.observe_info(deco.message);
            return LineResult::none();
        };

        let outcome = match deco.tags {
            "gc,start" => self.open(id, text, ts, deco.datestamp, line_no),
            "gc" => self.complete(id, text, ts, deco.datestamp, line_no),
            t if t.starts_with("gc,heap") || t.starts_with("gc,metaspace") => {
                self.add_heap_detail(id, text, line_no)
            }
            other => {
                debug!(id, tags = other, "unified: ignoring tag set");
                Ok(LineResult::none())
            }
        };
        outcome.unwrap_or_else(|e| LineResult::failed(line_no, &e, line))
    }

    fn finish(&mut self) -> Vec<PendingDiscard> {
        let mut dropped: Vec<PendingDiscard> = self
            .pending
            .drain()
            .map(|(id, p)| PendingDiscard {
                line: p.line,
                description: format!("GC({}) {}", id, p.event.type_name()),
            })
            .chain(self.open_phases.drain().map(|((id, name), p)| PendingDiscard {
                line: p.line,
                description: format!("GC({}) {}", id, name),
            }))
            .collect();
        dropped.sort_by_key(|d| d.line);
        dropped
    }

    fn pending(&self) -> usize {
        self.pending.len() + self.open_phases.len()
    }
}
