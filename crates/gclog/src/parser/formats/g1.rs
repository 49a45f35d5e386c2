//! G1 output of HotSpot 1.6 – 1.8.
//!
//! With `-XX:+PrintGCDetails` a young pause spans several lines:
//!
//! ```text
//! 0.229: [GC pause (G1 Evacuation Pause) (young), 0.0123 secs]
//!    [Parallel Time: 11.0 ms, GC Workers: 4]
//!    ...
//!    [Eden: 24.0M(24.0M)->0.0B(21.0M) Survivors: 0.0B->3072.0K Heap: 24.0M(256.0M)->4232.0K(256.0M)]
//!  [Times: user=0.03 sys=0.00, real=0.01 secs]
//! ```
//!
//! Without detail flags every record fits on one line. With
//! `-XX:+PrintAdaptiveSizePolicy` ergonomics records are written into the
//! middle of the pause record, which then ends on a later line:
//!
//! ```text
//! 0.229: [GC pause (G1 Evacuation Pause) (young) 0.229: [G1Ergonomics (CSet Construction) start choosing CSet, ...]
//! , 0.0123 secs]
//! ```

use std::borrow::Cow;
use std::sync::LazyLock;
use regex::Regex;
use tracing::debug;

use super::sun::{split_interleaved, starts_record, HeldLine, RecordError, RecordParser, MAX_JOINED_LINES};
use crate::model::{LogEvent, Memory};
use crate::parser::catalog;
use crate::parser::cursor::{self, ParseCursor};
use crate::parser::model::{GcFormat, LineError, LineResult, ParseWarning, PendingDiscard};
use crate::parser::traits::Grammar;

static ERGONOMICS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*(?:\d{4}-\d{2}-\d{2}T[\d:.]+[+-]\d{4}: )?\d+(?:[.,]\d+)?: \[G1Ergonomics [^\[\]]*\]")
        .expect("Invalid g1 ergonomics regex pattern")
});

/// Parenthetical groups that are part of a G1 type name. Any other group is
/// a GC cause and is dropped.
const TYPE_QUALIFIERS: [&str; 6] = [
    "young",
    "mixed",
    "partial",
    "initial-mark",
    "to-space overflow",
    "to-space exhausted",
];

/// `GC pause (G1 Evacuation Pause) (young) (initial-mark)` →
/// `GC pause (young) (initial-mark)`.
fn strip_causes(name: &str) -> Cow<'_, str> {
    if !name.contains('(') {
        return Cow::Borrowed(name);
    }
    let mut out = String::with_capacity(name.len());
    let mut rest = name;
    while let Some(open) = rest.find('(') {
        out.push_str(&rest[..open]);
        let mut depth = 0usize;
        let mut close = None;
        for (idx, b) in rest.bytes().enumerate().skip(open) {
            match b {
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(idx);
                        break;
                    }
                }
                _ => {}
            }
        }
        let Some(close) = close else {
            out.push_str(&rest[open..]);
            rest = "";
            break;
        };
        let group = &rest[open + 1..close];
        if TYPE_QUALIFIERS.contains(&group) {
            out.push_str(&rest[open..=close]);
        }
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    Cow::Owned(out.split_whitespace().collect::<Vec<_>>().join(" "))
}

struct PendingPause {
    line: usize,
    event: LogEvent,
}

pub struct G1Grammar {
    records: RecordParser,
    pending: Option<PendingPause>,
    held: Option<HeldLine>,
}

impl G1Grammar {
    pub fn new() -> Self {
        Self {
            records: RecordParser::with_rename(strip_causes),
            pending: None,
            held: None,
        }
    }

    /// `[Eden: ... Survivors: ... Heap: ...]` attaches to the open pause.
    fn attach_sizes(&mut self, line: &str, line_no: usize) -> Result<(), LineError> {
        let Some(pending) = self.pending.as_mut() else {
            debug!(line = line_no, "g1: size line without open pause");
            return Ok(());
        };
        let mut cur = ParseCursor::new(line_no);
        cur.skip_whitespace(line);
        while cur.eat(line, "[") {
            loop {
                cur.skip_any(line, b", ");
                if cur.eat(line, "]") || cur.is_at_end(line) {
                    break;
                }
                let name = cursor::read_type_name(line, &mut cur)?;
                let triple = cursor::read_memory(line, &mut cur)?;
                let Some(descriptor) = catalog::lookup(name) else {
                    debug!(detail = name, "g1: skipping size entry");
                    continue;
                };
                if descriptor.name == "Heap" && pending.event.memory().is_empty() {
                    pending.event.set_memory(triple);
                }
                let child = LogEvent::new(pending.event.timestamp(), descriptor).with_memory(Memory::from(triple));
                if pending.event.add_detail(child).is_err() {
                    debug!(detail = name, "g1: detail on concurrent event dropped");
                }
            }
            cur.skip_any(line, b", ");
        }
        Ok(())
    }

    fn flush(&mut self, result: &mut LineResult) {
        if let Some(p) = self.pending.take() {
            result.push_event(p.event);
        }
    }

    fn holds_details(event: &LogEvent) -> bool {
        event.memory().is_empty()
            && !event.concurrency().is_concurrent()
            && (event.type_name().starts_with("GC pause") || event.type_name().starts_with("Full GC"))
    }

    fn accept(&mut self, event: LogEvent, line_no: usize, result: &mut LineResult) {
        self.flush(result);
        if Self::holds_details(&event) {
            self.pending = Some(PendingPause { line: line_no, event });
        } else {
            result.push_event(event);
        }
    }

    fn parse_text(&mut self, text: String, first_line: usize, parts: usize, result: &mut LineResult) {
        match self.records.parse_record(&text, first_line) {
            Ok(event) => self.accept(event, first_line, result),
            Err(RecordError::Incomplete) if parts < MAX_JOINED_LINES => {
                debug!(line = first_line, "g1: holding unterminated record");
                self.held = Some(HeldLine { line: first_line, text, parts });
            }
            Err(e) => {
                let err = e.into_line_error();
                tracing::warn!(line = first_line, error = %err, "g1: skipping record");
                result.push_warning(ParseWarning::from_error(first_line, &err, &text));
            }
        }
    }
}

impl Default for G1Grammar {
    fn default() -> Self {
        Self::new()
    }
}

impl Grammar for G1Grammar {
    fn format(&self) -> GcFormat {
        GcFormat::Sun1_6G1
    }

    fn parse_line(&mut self, line: &str, line_no: usize) -> LineResult {
        let mut result = LineResult::none();
        let trimmed = line.trim_start();

        if trimmed.starts_with("[Times:") {
            self.flush(&mut result);
            return result;
        }
        if trimmed.starts_with("[Eden:") {
            if let Err(e) = self.attach_sizes(line, line_no) {
                result.push_warning(ParseWarning::from_error(line_no, &e, line));
            }
            return result;
        }
        // Indented phase breakdown lines carry nothing the model keeps.
        if line.starts_with(char::is_whitespace) && trimmed.starts_with('[') {
            debug!(line = line_no, "g1: skipping phase detail");
            return result;
        }

        let stripped = ERGONOMICS_RE.replace_all(line, "");
        if stripped.trim().is_empty() {
            debug!(line = line_no, "g1: skipping ergonomics record");
            return result;
        }

        let (main, interleaved) = split_interleaved(&stripped);
        if let Some(conc) = interleaved {
            self.parse_text(conc.to_string(), line_no, MAX_JOINED_LINES, &mut result);
        }
        match self.held.take() {
            Some(held) if !starts_record(&main) => {
                let joined = format!("{}{}", held.text, main);
                self.parse_text(joined, held.line, held.parts + 1, &mut result);
            }
            Some(held) => {
                let err = LineError::malformed("unterminated record");
                result.push_warning(ParseWarning::from_error(held.line, &err, &held.text));
                self.parse_text(main.into_owned(), line_no, 1, &mut result);
            }
            None => self.parse_text(main.into_owned(), line_no, 1, &mut result),
        }
        result
    }

    fn finish(&mut self) -> Vec<PendingDiscard> {
        let pause = self.pending.take().map(|p| PendingDiscard {
            line: p.line,
            description: format!("{} without closing [Times: line", p.event.type_name()),
        });
        let held = self.held.take().map(|h| PendingDiscard {
            line: h.line,
            description: format!("unterminated record: {}", h.text),
        });
        let mut dropped: Vec<PendingDiscard> = pause.into_iter().chain(held).collect();
        dropped.sort_by_key(|d| d.line);
        dropped
    }

    fn pending(&self) -> usize {
        usize::from(self.pending.is_some()) + usize::from(self.held.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Concurrency;
    use crate::parser::model::WarningReason;

    fn feed(g: &mut G1Grammar, lines: &[&str]) -> LineResult {
        let mut all = LineResult::none();
        for (idx, line) in lines.iter().enumerate() {
            all.merge(g.parse_line(line, idx + 1));
        }
        all
    }

    #[test]
    fn test_strip_causes() {
        assert_eq!(strip_causes("GC pause (G1 Evacuation Pause) (young)"), "GC pause (young)");
        assert_eq!(
            strip_causes("GC pause (G1 Humongous Allocation) (young) (initial-mark)"),
            "GC pause (young) (initial-mark)"
        );
        assert_eq!(strip_causes("GC pause (young) (to-space exhausted)"), "GC pause (young) (to-space exhausted)");
        assert_eq!(strip_causes("Full GC (System.gc())"), "Full GC");
        assert_eq!(strip_causes("GC remark"), "GC remark");
    }

    #[test]
    fn test_detailed_young_pause() {
        let mut g = G1Grammar::new();
        let r = feed(
            &mut g,
            &[
                "0.229: [GC pause (G1 Evacuation Pause) (young), 0.0123 secs]",
                "   [Parallel Time: 11.0 ms, GC Workers: 4]",
                "      [GC Worker Start (ms): Min: 229.1, Avg: 229.2, Max: 229.3, Diff: 0.2]",
                "   [Code Root Fixup: 0.0 ms]",
                "   [Eden: 24.0M(24.0M)->0.0B(21.0M) Survivors: 0.0B->3072.0K Heap: 24.0M(256.0M)->4232.0K(256.0M)]",
                " [Times: user=0.03 sys=0.00, real=0.01 secs]",
            ],
        );
        assert!(r.warnings.is_empty(), "{:?}", r.warnings);
        assert_eq!(r.events.len(), 1);
        let e = &r.events[0];
        assert_eq!(e.type_name(), "GC pause (young)");
        assert_eq!(e.pause(), Some(0.0123));
        assert_eq!(e.details().len(), 3);
        assert_eq!(e.detail("Eden").unwrap().memory().before_kb, Some(24576));
        assert_eq!(e.detail("Survivors").unwrap().memory().after_kb, Some(3072));
        assert_eq!(e.memory().after_kb, Some(4232));
        assert_eq!(e.memory().capacity_kb, Some(262144));
        assert_eq!(g.pending(), 0);
    }

    #[test]
    fn test_single_line_forms() {
        let mut g = G1Grammar::new();
        let r = feed(
            &mut g,
            &[
                "1.0: [GC pause (young) 10M->5M(256M), 0.0123 secs]",
                "1.1: [GC concurrent-mark-start]",
                "1.3: [GC concurrent-mark-end, 0.2000 secs]",
                "1.4: [GC remark, 0.0012 secs]",
                "1.5: [GC cleanup 10M->9M(256M), 0.0010 secs]",
                "2.0: [Full GC 200M->100M(256M), 0.5000 secs]",
            ],
        );
        assert!(r.warnings.is_empty(), "{:?}", r.warnings);
        assert_eq!(r.events.len(), 6);
        assert_eq!(r.events[1].concurrency(), Concurrency::ConcurrentStart);
        let end = &r.events[2];
        assert_eq!(end.type_name(), "GC concurrent-mark-end");
        assert!((end.interval().unwrap() - 0.2).abs() < 1e-9);
        assert_eq!(r.events[4].memory().after_kb, Some(9216));
        assert_eq!(g.pending(), 0);
    }

    #[test]
    fn test_next_record_flushes_open_pause() {
        let mut g = G1Grammar::new();
        let r = feed(
            &mut g,
            &[
                "0.5: [GC pause (young), 0.0100 secs]",
                "0.9: [GC pause (mixed), 0.0200 secs]",
            ],
        );
        assert_eq!(r.events.len(), 1);
        assert_eq!(r.events[0].type_name(), "GC pause (young)");
        assert_eq!(g.pending(), 1);
        let dropped = g.finish();
        assert_eq!(dropped[0].line, 2);
    }

    #[test]
    fn test_pause_split_by_ergonomics_output() {
        let mut g = G1Grammar::new();
        let r = feed(
            &mut g,
            &[
                "0.229: [GC pause (G1 Evacuation Pause) (young) 0.229: [G1Ergonomics (CSet Construction) start choosing CSet, _pending_cards: 0, predicted base time: 10.00 ms, remaining time: 190.00 ms, target pause time: 200.00 ms]",
                " 0.229: [G1Ergonomics (CSet Construction) add young regions to CSet, eden: 24 regions, survivors: 0 regions, predicted young region time: 50.00 ms]",
                ", 0.0123 secs]",
                "   [Eden: 24.0M(24.0M)->0.0B(21.0M) Survivors: 0.0B->3072.0K Heap: 24.0M(256.0M)->4232.0K(256.0M)]",
                " [Times: user=0.03 sys=0.00, real=0.01 secs]",
            ],
        );
        assert!(r.warnings.is_empty(), "{:?}", r.warnings);
        assert_eq!(r.events.len(), 1);
        let e = &r.events[0];
        assert_eq!(e.type_name(), "GC pause (young)");
        assert_eq!(e.timestamp(), 0.229);
        assert_eq!(e.pause(), Some(0.0123));
        assert_eq!(e.memory().after_kb, Some(4232));
        assert_eq!(g.pending(), 0);
    }

    #[test]
    fn test_held_record_superseded() {
        let mut g = G1Grammar::new();
        let r = feed(
            &mut g,
            &[
                "1.0: [GC pause (young) 1.0: [G1Ergonomics (Heap Sizing) attempt heap expansion, reason: allocation failure]",
                "2.0: [Full GC 200M->100M(256M), 0.5000 secs]",
            ],
        );
        assert_eq!(r.warnings.len(), 1);
        assert_eq!(r.warnings[0].line, 1);
        assert_eq!(r.events.len(), 1);
        assert_eq!(g.pending(), 0);
    }

    #[test]
    fn test_finish_reports_held_record() {
        let mut g = G1Grammar::new();
        g.parse_line("1.0: [GC pause (young) 1.0: [G1Ergonomics (CSet Construction) finish choosing CSet]", 3);
        assert_eq!(g.pending(), 1);
        let dropped = g.finish();
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].line, 3);
    }

    #[test]
    fn test_unknown_record() {
        let mut g = G1Grammar::new();
        let r = g.parse_line("1.0: [GC frobnicate, 0.1 secs]", 3);
        assert_eq!(r.warnings[0].reason, WarningReason::UnknownEventType);
    }
}
