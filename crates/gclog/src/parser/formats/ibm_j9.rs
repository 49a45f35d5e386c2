//! IBM J9 verbose GC XML (`<verbosegc>` documents of J9 2.4 / 2.6).
//!
//! ```text
//! <af type="tenured" id="1" timestamp="Jun 29 08:47:45 2009" intervalms="0.000">
//! <tenured freebytes="2149656" totalbytes="4194304" percent="51" >
//! <gc type="global" id="1" totalid="1" intervalms="0.000">
//! <tenured freebytes="3380688" totalbytes="4194304" percent="80" >
//! </gc>
//! <time totalms="2.424" />
//! </af>
//! ```
//!
//! The document is consumed one line at a time. Generation sizes seen before
//! the `<gc>` element are the before-values, those after it the after-values.

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use tracing::{debug, warn};

use crate::model::{CorrelationKey, LogEvent, Memory};
use crate::parser::catalog;
use crate::parser::cursor;
use crate::parser::model::{GcFormat, LineError, LineResult, ParseWarning, PendingDiscard, WarningReason};
use crate::parser::traits::Grammar;
use crate::parser::units;

const DATE_FORMATS: [&str; 3] = ["%b %d %H:%M:%S %Y", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

fn parse_date(value: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(d) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(d);
    }
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
        .map(|naive| naive.and_utc().fixed_offset())
}

/// Name of the element a line opens or closes: `<af ...>` → `af`,
/// `</af>` → `/af`.
fn element(line: &str) -> Option<&str> {
    let inner = line.strip_prefix('<')?;
    let end = inner
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/' && !inner.starts_with('/'))
        .unwrap_or(inner.len());
    let name = &inner[..end];
    if name.is_empty() || name == "/" {
        None
    } else {
        Some(name)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct GenerationSizes {
    before: Option<(u64, u64)>,
    after: Option<(u64, u64)>,
}

impl GenerationSizes {
    /// `(free, total)` bytes → kilobyte figures.
    fn memory(&self) -> Option<Memory> {
        let used = |(free, total): (u64, u64)| units::bytes_to_kb(total.saturating_sub(free));
        let before = self.before?;
        let after = self.after.unwrap_or(before);
        Some(Memory {
            before_kb: Some(used(before)),
            after_kb: Some(used(after)),
            capacity_kb: Some(units::bytes_to_kb(after.1)),
        })
    }
}

#[derive(Debug)]
struct OpenEvent {
    line: usize,
    tag: String,
    type_phrase: String,
    id: Option<u64>,
    timestamp: f64,
    datestamp: Option<DateTime<FixedOffset>>,
    seen_gc: bool,
    nursery: GenerationSizes,
    tenured: GenerationSizes,
    pause_ms: Option<f64>,
}

#[derive(Debug, Default)]
pub struct IbmJ9Grammar {
    open: Option<OpenEvent>,
    first_date: Option<DateTime<FixedOffset>>,
    last_timestamp: f64,
}

impl IbmJ9Grammar {
    pub fn new() -> Self {
        Self::default()
    }

    fn timestamp_for(&mut self, date: Option<DateTime<FixedOffset>>) -> f64 {
        let ts = match date {
            Some(d) => {
                let first = *self.first_date.get_or_insert(d);
                (d - first).num_milliseconds() as f64 / 1000.0
            }
            None => self.last_timestamp,
        };
        self.last_timestamp = ts;
        ts
    }

    fn open_event(&mut self, tag: &str, line: &str, line_no: usize) -> Result<(), LineError> {
        let date = cursor::attribute(line, "timestamp").and_then(parse_date);
        let timestamp = self.timestamp_for(date);
        let type_phrase = match (tag, cursor::attribute(line, "type")) {
            ("af", Some(t)) => format!("af {}", t),
            _ => tag.to_string(),
        };
        // unknown af variants fall back to the plain tag
        let type_phrase = if catalog::lookup(&type_phrase).is_some() {
            type_phrase
        } else {
            tag.to_string()
        };
        catalog::resolve(&type_phrase)?;

        self.open = Some(OpenEvent {
            line: line_no,
            tag: tag.to_string(),
            type_phrase,
            id: cursor::attribute(line, "id").and_then(|v| v.parse().ok()),
            timestamp,
            datestamp: date,
            seen_gc: false,
            nursery: GenerationSizes::default(),
            tenured: GenerationSizes::default(),
            pause_ms: None,
        });
        debug!(line = line_no, tag, "j9: event opened");
        Ok(())
    }

    fn close_event(&mut self) -> Result<Option<LogEvent>, LineError> {
        let Some(open) = self.open.take() else {
            return Ok(None);
        };
        let descriptor = catalog::resolve(&open.type_phrase)?;

        let details: Vec<(&str, Memory)> = [("nursery", open.nursery), ("tenured", open.tenured)]
            .into_iter()
            .filter_map(|(name, sizes)| sizes.memory().map(|m| (name, m)))
            .collect();
        let total = details.iter().fold(Memory::default(), |acc, (_, m)| Memory {
            before_kb: Some(acc.before_kb.unwrap_or(0).saturating_add(m.before_kb.unwrap_or(0))),
            after_kb: Some(acc.after_kb.unwrap_or(0).saturating_add(m.after_kb.unwrap_or(0))),
            capacity_kb: Some(acc.capacity_kb.unwrap_or(0).saturating_add(m.capacity_kb.unwrap_or(0))),
        });

        let mut event = if descriptor.concurrency.is_concurrent() {
            let key = open.id.map_or_else(|| CorrelationKey::Phase(open.tag.clone()), CorrelationKey::Id);
            let mut e = LogEvent::concurrent(open.timestamp, descriptor, key).with_datestamp(open.datestamp);
            if let Some(ms) = open.pause_ms {
                e.set_interval(units::millis_to_secs(ms));
            }
            e
        } else {
            let mut e = LogEvent::new(open.timestamp, descriptor).with_datestamp(open.datestamp);
            for (name, memory) in &details {
                if e.add_detail(LogEvent::new(open.timestamp, catalog::resolve(name)?).with_memory(*memory)).is_err() {
                    debug!("j9: detail on concurrent event dropped");
                }
            }
            e
        };
        event.set_pause(open.pause_ms.map(units::millis_to_secs));
        if !details.is_empty() {
            event.set_memory(total);
        }
        Ok(Some(event))
    }

    fn inner_line(&mut self, tag: &str, line: &str) -> Result<Option<LogEvent>, LineError> {
        let Some(open) = self.open.as_mut() else {
            return Ok(None);
        };
        match tag {
            "gc" => open.seen_gc = true,
            "nursery" | "tenured" => {
                let free = cursor::attribute(line, "freebytes").and_then(|v| v.parse::<u64>().ok());
                let total = cursor::attribute(line, "totalbytes").and_then(|v| v.parse::<u64>().ok());
                let (Some(free), Some(total)) = (free, total) else {
                    return Err(LineError::malformed(format!("{} without free/total bytes", tag)));
                };
                let sizes = if tag == "nursery" { &mut open.nursery } else { &mut open.tenured };
                if open.seen_gc {
                    sizes.after = Some((free, total));
                } else if sizes.before.is_none() {
                    sizes.before = Some((free, total));
                }
            }
            "time" => {
                if let Some(ms) = cursor::attribute(line, "totalms").and_then(|v| v.parse::<f64>().ok()) {
                    open.pause_ms = Some(ms);
                }
            }
            t if t.strip_prefix('/') == Some(open.tag.as_str()) => return self.close_event(),
            _ => {}
        }
        Ok(None)
    }
}

impl Grammar for IbmJ9Grammar {
    fn format(&self) -> GcFormat {
        GcFormat::IbmJ9
    }

    fn parse_line(&mut self, line: &str, line_no: usize) -> LineResult {
        let trimmed = line.trim();
        let Some(tag) = element(trimmed) else {
            if let Some(open) = self.open.take() {
                warn!(line = line_no, opened = open.line, "j9: dropping partial event");
            }
            return LineResult::failed(line_no, &LineError::malformed("not an XML element"), line);
        };

        let mut result = LineResult::none();
        if matches!(tag, "af" | "sys" | "con") {
            if let Some(previous) = self.open.take() {
                result.push_warning(ParseWarning::new(
                    previous.line,
                    WarningReason::MalformedLine,
                    format!("<{}> opened before </{}>", tag, previous.tag),
                    line,
                ));
            }
            if let Err(e) = self.open_event(tag, trimmed, line_no) {
                result.push_warning(ParseWarning::from_error(line_no, &e, line));
                return result;
            }
            // single-line `<con event="kickoff" ... />`
            if trimmed.ends_with("/>") {
                match self.close_event() {
                    Ok(Some(event)) => result.push_event(event),
                    Ok(None) => {}
                    Err(e) => result.push_warning(ParseWarning::from_error(line_no, &e, line)),
                }
            }
            return result;
        }

        if self.open.is_none() {
            debug!(line = line_no, tag, "j9: element outside event");
            return result;
        }
        match self.inner_line(tag, trimmed) {
            Ok(Some(event)) => result.push_event(event),
            Ok(None) => {}
            Err(e) => {
                self.open = None;
                result.push_warning(ParseWarning::from_error(line_no, &e, line));
            }
        }
        result
    }

    fn finish(&mut self) -> Vec<PendingDiscard> {
        self.open
            .take()
            .map(|o| PendingDiscard {
                line: o.line,
                description: format!("<{}> without closing element", o.tag),
            })
            .into_iter()
            .collect()
    }

    fn pending(&self) -> usize {
        usize::from(self.open.is_some())
    }
}
