//! Sun / Oracle HotSpot 1.3.1 – 1.8 bracketed records (Serial, Parallel, CMS).
//!
//! ```text
//! 0.186: [GC 0.186: [DefNew: 2048K->256K(2304K), 0.0062 secs] 2048K->1085K(7424K), 0.0063 secs]
//! 1.132: [Full GC (System) [PSYoungGen: 1234K->0K(19136K)] [PSOldGen: 100K->1200K(43712K)] 1334K->1200K(62848K) [PSPermGen: 2000K->2000K(21248K)], 0.0300 secs] [Times: user=0.02 sys=0.00, real=0.03 secs]
//! 10.2: [CMS-concurrent-mark-start]
//! 10.5: [CMS-concurrent-mark: 0.300/0.310 secs] [Times: user=0.60 sys=0.01, real=0.31 secs]
//! ```
//!
//! Every `[` opens an event; nested groups become detail children of the
//! enclosing one. `[Times: ...]` groups and unknown nested groups are skipped.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::LazyLock;
use chrono::{DateTime, FixedOffset};
use regex::Regex;
use tracing::debug;

use crate::model::{Concurrency, CorrelationKey, LogEvent, NumericShape};
use crate::parser::catalog;
use crate::parser::cursor::{self, LexError, ParseCursor};
use crate::parser::model::{GcFormat, LineError, LineResult, ParseWarning, PendingDiscard};
use crate::parser::traits::Grammar;

/// Concurrent phase output written into the middle of another record.
static INTERLEAVED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\d+(?:[.,]\d+)?: )?\[(?:CMS-concurrent|GC concurrent)-[^\[\]]*\]")
        .expect("Invalid interleaved concurrent regex pattern")
});

const MAX_NESTING: usize = 8;
pub(crate) const MAX_JOINED_LINES: usize = 4;

#[derive(Debug)]
pub(crate) enum RecordError {
    /// The record ran off the end of the text before its closing `]`.
    Incomplete,
    Line(LineError),
}

impl From<LineError> for RecordError {
    fn from(e: LineError) -> Self {
        RecordError::Line(e)
    }
}

impl From<LexError> for RecordError {
    fn from(e: LexError) -> Self {
        RecordError::Line(e.into())
    }
}

impl RecordError {
    pub(crate) fn into_line_error(self) -> LineError {
        match self {
            RecordError::Incomplete => LineError::malformed("unterminated record"),
            RecordError::Line(e) => e,
        }
    }
}

/// Phase a concurrent marker belongs to: `CMS-concurrent-mark-start` and
/// `CMS-concurrent-mark` share `CMS-concurrent-mark`.
fn phase_key(name: &'static str) -> &'static str {
    name.strip_suffix("-start")
        .or_else(|| name.strip_suffix("-end"))
        .or_else(|| name.strip_suffix("-abort"))
        .unwrap_or(name)
}

/// Pull one interleaved concurrent record out of `line`. Only matches that do
/// not start the line count as interleaved.
pub(crate) fn split_interleaved(line: &str) -> (Cow<'_, str>, Option<&str>) {
    match INTERLEAVED_RE.find(line) {
        Some(m) if m.start() > 0 && !line[..m.start()].trim().is_empty() => {
            let mut main = String::with_capacity(line.len());
            main.push_str(&line[..m.start()]);
            main.push_str(&line[m.end()..]);
            (Cow::Owned(main), Some(m.as_str()))
        }
        _ => (Cow::Borrowed(line), None),
    }
}

/// A line that begins a fresh record rather than continuing a held one.
pub(crate) fn starts_record(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with('[') || t.as_bytes().first().is_some_and(u8::is_ascii_digit)
}

/// Skip the occupancy step CMS prints before phase names (`[1 CMS-remark:`).
fn skip_step_prefix(text: &str, cur: &mut ParseCursor) {
    let bytes = text.as_bytes();
    let start = cur.pos();
    let mut end = start;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end > start && bytes.get(end) == Some(&b' ') && bytes.get(end + 1).is_some_and(u8::is_ascii_alphabetic) {
        cur.set_pos(end + 1);
    }
}

/// Skip to just past the `]` closing the group the cursor is inside.
fn skip_to_close(text: &str, cur: &mut ParseCursor) -> Result<(), RecordError> {
    let mut depth = 1usize;
    for (idx, b) in text.bytes().enumerate().skip(cur.pos()) {
        match b {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    cur.set_pos(idx + 1);
                    return Ok(());
                }
            }
            _ => {}
        }
    }
    Err(RecordError::Incomplete)
}

fn skip_word(text: &str, cur: &mut ParseCursor) {
    let bytes = text.as_bytes();
    let mut pos = cur.pos() + 1;
    while pos < bytes.len() && !matches!(bytes[pos], b' ' | b'\t' | b',' | b'[' | b']') {
        pos += 1;
    }
    cur.set_pos(pos.min(bytes.len()));
}

fn identity(name: &str) -> Cow<'_, str> {
    Cow::Borrowed(name)
}

/// Shared walker over `[date:] ts: [Type [nested]... mem, pause]` records.
pub(crate) struct RecordParser {
    last_timestamp: f64,
    first_datestamp: Option<DateTime<FixedOffset>>,
    open_phases: HashMap<&'static str, f64>,
    rename: fn(&str) -> Cow<'_, str>,
}

impl RecordParser {
    pub(crate) fn new() -> Self {
        Self::with_rename(identity)
    }

    /// `rename` rewrites each type phrase before catalog lookup.
    pub(crate) fn with_rename(rename: fn(&str) -> Cow<'_, str>) -> Self {
        Self {
            last_timestamp: 0.0,
            first_datestamp: None,
            open_phases: HashMap::new(),
            rename,
        }
    }

    pub(crate) fn open_phases(&self) -> usize {
        self.open_phases.len()
    }

    fn timestamp(&mut self, explicit: Option<f64>, datestamp: Option<DateTime<FixedOffset>>) -> f64 {
        let ts = match (explicit, datestamp) {
            (Some(ts), _) => ts,
            (None, Some(date)) => {
                let first = *self.first_datestamp.get_or_insert(date);
                (date - first).num_milliseconds() as f64 / 1000.0
            }
            // 1.3.1 style records carry no timestamp of their own
            (None, None) => self.last_timestamp,
        };
        self.last_timestamp = ts;
        ts
    }

    /// Parse one complete top-level record.
    pub(crate) fn parse_record(&mut self, text: &str, line_no: usize) -> Result<LogEvent, RecordError> {
        let mut cur = ParseCursor::new(line_no);
        let datestamp = cursor::read_datestamp(text, &mut cur).ok();
        let explicit = cursor::read_timestamp(text, &mut cur).ok();
        let ts = self.timestamp(explicit, datestamp);

        cur.skip_whitespace(text);
        if !cur.eat(text, "[") {
            return Err(LineError::malformed("expected '['").into());
        }
        let mut event = self
            .parse_body(text, &mut cur, ts, datestamp, 0)?
            .ok_or_else(|| LineError::malformed("empty record"))?;

        subtract_scavenge_before_remark(&mut event);
        self.track_concurrent(&mut event);
        Ok(event)
    }

    fn parse_body(
        &mut self,
        text: &str,
        cur: &mut ParseCursor,
        ts: f64,
        datestamp: Option<DateTime<FixedOffset>>,
        depth: usize,
    ) -> Result<Option<LogEvent>, RecordError> {
        if depth > MAX_NESTING {
            return Err(LineError::malformed("nesting too deep").into());
        }
        skip_step_prefix(text, cur);
        let name = match cursor::read_type_name(text, cur) {
            Ok(name) => name,
            Err(_) if cur.rest(text).trim().is_empty() => return Err(RecordError::Incomplete),
            Err(e) => return Err(e.into()),
        };
        let phrase = (self.rename)(name);

        let descriptor = match catalog::lookup(&phrase) {
            Some(d) => d,
            None if depth > 0 => {
                debug!(detail = %phrase, "skipping unknown nested group");
                skip_to_close(text, cur)?;
                return Ok(None);
            }
            None => return Err(LineError::UnknownEventType(phrase.trim().to_string()).into()),
        };

        let mut event = if descriptor.concurrency.is_concurrent() {
            LogEvent::concurrent(ts, descriptor, CorrelationKey::Phase(phase_key(descriptor.name).to_string()))
        } else {
            LogEvent::new(ts, descriptor)
        }
        .with_datestamp(datestamp);

        loop {
            cur.skip_any(text, b", ");
            match cur.peek(text) {
                None => return Err(RecordError::Incomplete),
                Some(b']') => {
                    cur.set_pos(cur.pos() + 1);
                    return Ok(Some(event));
                }
                Some(b'[') => {
                    if cur.rest(text).starts_with("[Times:") {
                        cursor::skip_bracketed(text, cur).map_err(|_| RecordError::Incomplete)?;
                        continue;
                    }
                    cur.set_pos(cur.pos() + 1);
                    if let Some(child) = self.parse_body(text, cur, ts, datestamp, depth + 1)? {
                        if let Err(child) = event.add_detail(child) {
                            debug!(detail = child.type_name(), "dropping detail of concurrent event");
                        }
                    }
                }
                Some(b) if b.is_ascii_digit() => read_numeric(text, cur, &mut event)?,
                Some(_) => skip_word(text, cur),
            }
        }
    }

    fn track_concurrent(&mut self, event: &mut LogEvent) {
        let key = phase_key(event.type_name());
        match event.concurrency() {
            Concurrency::ConcurrentStart => {
                self.open_phases.insert(key, event.timestamp());
            }
            Concurrency::ConcurrentEnd => {
                if let Some(start) = self.open_phases.remove(key) {
                    event.set_interval(event.timestamp() - start);
                }
            }
            _ => {}
        }
    }
}

/// Numbers inside a group: embedded timestamps, pause pairs, memory, pauses.
fn read_numeric(text: &str, cur: &mut ParseCursor, event: &mut LogEvent) -> Result<(), RecordError> {
    if cursor::read_datestamp(text, cur).is_ok() || cursor::read_timestamp(text, cur).is_ok() {
        return Ok(());
    }
    if event.descriptor().shape == NumericShape::PausePair {
        if let Ok((_, wall)) = cursor::read_pause_pair(text, cur) {
            event.set_pause(Some(wall));
            return Ok(());
        }
    }
    match cursor::read_memory(text, cur) {
        Ok(m) => {
            event.set_memory(m);
            return Ok(());
        }
        Err(LexError::UnterminatedMemory) if !cur.rest(text).contains(']') => {
            return Err(RecordError::Incomplete);
        }
        Err(LexError::UnterminatedMemory) => return Err(LexError::UnterminatedMemory.into()),
        Err(_) => {}
    }
    match cursor::read_pause(text, cur) {
        Ok(p) => {
            event.set_pause(Some(p));
            Ok(())
        }
        Err(_) if !cur.rest(text).contains(']') => Err(RecordError::Incomplete),
        Err(e) => Err(e.into()),
    }
}

/// A young collection run just before a CMS remark is reported inside the
/// remark record, and its pause is included in the remark's total. The young
/// pause is taken off the enclosing event.
fn subtract_scavenge_before_remark(event: &mut LogEvent) {
    if event.detail("CMS-remark").is_none() {
        return;
    }
    let Some(young) = event.detail("GC").and_then(LogEvent::pause) else {
        return;
    };
    if let Some(total) = event.pause() {
        event.set_pause(Some(total - young));
    }
}

/// Unterminated record waiting for its continuation line.
pub(crate) struct HeldLine {
    pub(crate) line: usize,
    pub(crate) text: String,
    pub(crate) parts: usize,
}

/// Grammar for `sun1_4` and `sun1_6`.
pub struct SunGrammar {
    format: GcFormat,
    records: RecordParser,
    held: Option<HeldLine>,
}

impl SunGrammar {
    pub fn new(format: GcFormat) -> Self {
        Self {
            format,
            records: RecordParser::new(),
            held: None,
        }
    }

    fn parse_text(&mut self, text: String, first_line: usize, parts: usize, line_no: usize, result: &mut LineResult) {
        match self.records.parse_record(&text, line_no) {
            Ok(event) => result.push_event(event),
            Err(RecordError::Incomplete) if parts < MAX_JOINED_LINES => {
                debug!(line = first_line, "holding unterminated record");
                self.held = Some(HeldLine { line: first_line, text, parts });
            }
            Err(e) => {
                let err = e.into_line_error();
                tracing::warn!(line = first_line, error = %err, "skipping record");
                result.push_warning(ParseWarning::from_error(first_line, &err, &text));
            }
        }
    }
}

impl Grammar for SunGrammar {
    fn format(&self) -> GcFormat {
        self.format
    }

    fn parse_line(&mut self, line: &str, line_no: usize) -> LineResult {
        let mut result = LineResult::none();
        let (main, interleaved) = split_interleaved(line);

        if let Some(conc) = interleaved {
            match self.records.parse_record(conc, line_no) {
                Ok(event) => result.push_event(event),
                Err(e) => result.push_warning(ParseWarning::from_error(line_no, &e.into_line_error(), conc)),
            }
            if self.held.is_none() && !main.contains('[') {
                debug!(line = line_no, "dropping text around interleaved record");
                return result;
            }
        }

        match self.held.take() {
            Some(held) if !starts_record(&main) => {
                let joined = format!("{}{}", held.text, main);
                self.parse_text(joined, held.line, held.parts + 1, line_no, &mut result);
            }
            Some(held) => {
                let err = LineError::malformed("unterminated record");
                result.push_warning(ParseWarning::from_error(held.line, &err, &held.text));
                self.parse_text(main.into_owned(), line_no, 1, line_no, &mut result);
            }
            None => self.parse_text(main.into_owned(), line_no, 1, line_no, &mut result),
        }
        result
    }

    fn finish(&mut self) -> Vec<PendingDiscard> {
        if self.records.open_phases() > 0 {
            debug!(open = self.records.open_phases(), "concurrent phases still open at end of log");
        }
        self.held
            .take()
            .map(|h| PendingDiscard {
                line: h.line,
                description: format!("unterminated record: {}", h.text),
            })
            .into_iter()
            .collect()
    }

    fn pending(&self) -> usize {
        usize::from(self.held.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Generation;
    use crate::parser::model::WarningReason;

    fn one(line: &str) -> LogEvent {
        let mut g = SunGrammar::new(GcFormat::Sun1_6);
        let mut r = g.parse_line(line, 1);
        assert!(r.warnings.is_empty(), "{:?}", r.warnings);
        assert_eq!(r.events.len(), 1);
        r.events.remove(0)
    }

    // ── simple records ──────────────────────────────────────────

    #[test]
    fn test_young_with_def_new_detail() {
        let e = one("0.186: [GC 0.186: [DefNew: 2048K->256K(2304K), 0.0062 secs] 2048K->1085K(7424K), 0.0063 secs]");
        assert_eq!(e.timestamp(), 0.186);
        assert_eq!(e.type_name(), "GC");
        assert_eq!(e.pause(), Some(0.0063));
        assert_eq!(e.memory().capacity_kb, Some(7424));
        let young = e.detail("DefNew").unwrap();
        assert_eq!(young.memory().after_kb, Some(256));
        assert_eq!(young.pause(), Some(0.0062));
        assert_eq!(young.generation(), Generation::Young);
    }

    #[test]
    fn test_full_gc_details_are_additive() {
        let e = one(
            "1.132: [Full GC (System) [PSYoungGen: 1234K->0K(19136K)] [PSOldGen: 100K->1200K(43712K)] 1334K->1200K(62848K) [PSPermGen: 2000K->2000K(21248K)], 0.0300 secs] [Times: user=0.02 sys=0.00, real=0.03 secs]",
        );
        assert_eq!(e.type_name(), "Full GC (System)");
        assert_eq!(e.details().len(), 3);
        let heap_after: u64 = e
            .details()
            .iter()
            .filter(|d| d.generation() != Generation::Perm)
            .filter_map(|d| d.memory().after_kb)
            .sum();
        assert_eq!(heap_after, e.memory().after_kb.unwrap());
        assert!(e.details().iter().all(|d| d.timestamp() == 1.132));
    }

    #[test]
    fn test_datestamp_and_cause() {
        let e = one("2012-04-18T14:23:46.175+0200: 1.5: [GC (Allocation Failure) [PSYoungGen: 16448K->2688K(19136K)] 16448K->2704K(62848K), 0.0063380 secs]");
        assert!(e.datestamp().is_some());
        assert_eq!(e.type_name(), "GC");
        assert_eq!(e.details()[0].datestamp(), e.datestamp());
    }

    #[test]
    fn test_missing_timestamp_reuses_last() {
        let mut g = SunGrammar::new(GcFormat::Sun1_4);
        g.parse_line("3.0: [GC 100K->50K(200K), 0.001 secs]", 1);
        let r = g.parse_line("[GC 120K->60K(200K), 0.001 secs]", 2);
        assert_eq!(r.events[0].timestamp(), 3.0);
    }

    // ── CMS ─────────────────────────────────────────────────────

    #[test]
    fn test_cms_initial_mark_step_prefix() {
        let e = one("10.1: [GC [1 CMS-initial-mark: 1234K(4096K)] 2000K(8000K), 0.0012 secs]");
        let mark = e.detail("CMS-initial-mark").unwrap();
        assert_eq!(mark.memory().before_kb, Some(1234));
        assert_eq!(e.memory().after_kb, Some(2000));
    }

    #[test]
    fn test_concurrent_interval_from_markers() {
        let mut g = SunGrammar::new(GcFormat::Sun1_6);
        let start = g.parse_line("10.2: [CMS-concurrent-mark-start]", 1);
        let end = g.parse_line("10.5: [CMS-concurrent-mark: 0.300/0.310 secs] [Times: user=0.60 sys=0.01, real=0.31 secs]", 2);
        assert_eq!(start.events[0].concurrency(), Concurrency::ConcurrentStart);
        let e = &end.events[0];
        assert_eq!(e.concurrency(), Concurrency::ConcurrentEnd);
        assert_eq!(e.pause(), Some(0.310));
        assert!((e.interval().unwrap() - 0.3).abs() < 1e-9);
        assert_eq!(e.correlation(), start.events[0].correlation());
    }

    #[test]
    fn test_remark_skips_unknown_groups() {
        let e = one("11.0: [GC[YG occupancy: 1234 K (4096 K)]11.0: [Rescan (parallel) , 0.0012 secs]11.0: [weak refs processing, 0.0001 secs] [1 CMS-remark: 1234K(4096K)] 2000K(8000K), 0.0020 secs]");
        assert_eq!(e.pause(), Some(0.0020));
        assert!(e.detail("CMS-remark").is_some());
        assert!(e.detail("Rescan (parallel)").is_some());
        assert_eq!(e.details().len(), 3);
    }

    // Reproduces the historical accounting; the young pause is removed from
    // the remark's total.
    #[test]
    fn test_scavenge_before_remark_subtracted() {
        let e = one("12.0: [GC[YG occupancy: 1000 K (2000 K)]12.0: [GC 12.0: [ParNew: 1000K->100K(2000K), 0.0100 secs] 3000K->2100K(9000K), 0.0110 secs]12.02: [Rescan (parallel) , 0.0020 secs] [1 CMS-remark: 2000K(7000K)] 2100K(9000K), 0.0300 secs]");
        assert!((e.pause().unwrap() - 0.019).abs() < 1e-9);
    }

    #[test]
    fn test_interleaved_concurrent_line_joined() {
        let mut g = SunGrammar::new(GcFormat::Sun1_6);
        let first = g.parse_line("1.0: [GC 1.0: [ParNew1.1: [CMS-concurrent-abortable-preclean: 0.100/0.200 secs]", 1);
        assert_eq!(first.events.len(), 1);
        assert_eq!(first.events[0].type_name(), "CMS-concurrent-abortable-preclean");
        assert_eq!(g.pending(), 1);

        let second = g.parse_line(": 1000K->100K(2000K), 0.0100 secs] 3000K->2100K(9000K), 0.0110 secs]", 2);
        assert!(second.warnings.is_empty(), "{:?}", second.warnings);
        let e = &second.events[0];
        assert_eq!(e.timestamp(), 1.0);
        assert!(e.detail("ParNew").is_some());
        assert_eq!(g.pending(), 0);
    }

    // ── failures ────────────────────────────────────────────────

    #[test]
    fn test_unknown_top_level_type() {
        let mut g = SunGrammar::new(GcFormat::Sun1_6);
        let r = g.parse_line("1.0: [Weird GC 100K->50K(200K), 0.001 secs]", 9);
        assert_eq!(r.warnings[0].reason, WarningReason::UnknownEventType);
        assert_eq!(r.warnings[0].line, 9);
    }

    #[test]
    fn test_garbage_line_is_malformed() {
        let mut g = SunGrammar::new(GcFormat::Sun1_6);
        let r = g.parse_line("%%$ garbage !!", 2);
        assert_eq!(r.warnings[0].reason, WarningReason::MalformedLine);
        assert!(r.events.is_empty());
    }

    #[test]
    fn test_held_record_superseded_by_new_record() {
        let mut g = SunGrammar::new(GcFormat::Sun1_6);
        assert!(g.parse_line("1.0: [GC 100K->50K(200K), 0.0", 1).is_empty());
        let r = g.parse_line("2.0: [GC 100K->50K(200K), 0.001 secs]", 2);
        assert_eq!(r.warnings.len(), 1);
        assert_eq!(r.warnings[0].line, 1);
        assert_eq!(r.events.len(), 1);
    }

    #[test]
    fn test_finish_reports_held_record() {
        let mut g = SunGrammar::new(GcFormat::Sun1_6);
        g.parse_line("1.0: [GC 1.0: [ParNew", 5);
        let dropped = g.finish();
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].line, 5);
        assert_eq!(g.pending(), 0);
    }
}
