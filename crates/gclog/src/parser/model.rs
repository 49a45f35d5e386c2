use std::io;
use thiserror::Error;
use serde::Serialize;

use super::cursor::LexError;
use crate::model::LogEvent;

/// Grammar variant selected by the sniffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GcFormat {
    /// Sun 1.2.2 `<GC: ...>` records
    Sun1_2_2,
    /// Sun 1.3.1 – 1.5 `[GC ...]` without `[Times:`
    Sun1_4,
    /// Sun/Oracle 1.6 – 1.8 with detail flags (Serial, Parallel, CMS)
    Sun1_6,
    /// Sun/Oracle 1.6 – 1.8 G1
    Sun1_6G1,
    /// Unified JVM Logging (`-Xlog:gc*`)
    Unified,
    /// Shenandoah default output
    Shenandoah,
    Ibm1_3_1,
    Ibm1_4_2,
    /// IBM J9 verbose GC XML
    IbmJ9,
    JRockit1_5,
    JRockit1_6,
    HpUx1_2,
    HpUx1_4_1,
    /// Go runtime `GODEBUG=gctrace=1`
    Go,
}

impl GcFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            GcFormat::Sun1_2_2 => "sun1_2_2",
            GcFormat::Sun1_4 => "sun1_4",
            GcFormat::Sun1_6 => "sun1_6",
            GcFormat::Sun1_6G1 => "sun1_6_g1",
            GcFormat::Unified => "unified",
            GcFormat::Shenandoah => "shenandoah",
            GcFormat::Ibm1_3_1 => "ibm1_3_1",
            GcFormat::Ibm1_4_2 => "ibm1_4_2",
            GcFormat::IbmJ9 => "ibm_j9",
            GcFormat::JRockit1_5 => "jrockit1_5",
            GcFormat::JRockit1_6 => "jrockit1_6",
            GcFormat::HpUx1_2 => "hpux1_2",
            GcFormat::HpUx1_4_1 => "hpux1_4_1",
            GcFormat::Go => "go",
        }
    }
}

impl std::fmt::Display for GcFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recoverable failure of one line (or of the partial event it belonged to).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LineError {
    #[error("Malformed line: {0}")]
    MalformedLine(String),

    #[error("Unknown event type: {0}")]
    UnknownEventType(String),
}

impl LineError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        LineError::MalformedLine(reason.into())
    }

    pub fn reason(&self) -> WarningReason {
        match self {
            LineError::MalformedLine(_) => WarningReason::MalformedLine,
            LineError::UnknownEventType(_) => WarningReason::UnknownEventType,
        }
    }
}

impl From<LexError> for LineError {
    fn from(e: LexError) -> Self {
        LineError::MalformedLine(e.to_string())
    }
}

/// Session-fatal failures.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("Unrecognized log format")]
    UnrecognizedFormat,

    #[error("Stream error after line {line}: {source}")]
    Stream {
        line: usize,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningReason {
    MalformedLine,
    UnknownEventType,
    /// Multi-line event still open when the session ended
    PendingDiscarded,
    /// Oldest pending event pushed out by the pending-table bound
    PendingEvicted,
    LineTruncated,
}

/// Diagnostic recorded for a skipped line or discarded partial event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseWarning {
    pub line: usize,
    pub reason: WarningReason,
    pub message: String,
    pub excerpt: String,
}

const EXCERPT_LEN: usize = 80;

impl ParseWarning {
    pub fn new(line: usize, reason: WarningReason, message: impl Into<String>, text: &str) -> Self {
        Self {
            line,
            reason,
            message: message.into(),
            excerpt: excerpt(text),
        }
    }

    pub fn from_error(line: usize, error: &LineError, text: &str) -> Self {
        Self::new(line, error.reason(), error.to_string(), text)
    }
}

fn excerpt(text: &str) -> String {
    if text.len() <= EXCERPT_LEN {
        return text.to_string();
    }
    let mut end = EXCERPT_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// What a grammar produced for one physical line.
#[derive(Debug, Default)]
pub struct LineResult {
    pub events: Vec<LogEvent>,
    pub warnings: Vec<ParseWarning>,
}

impl LineResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn event(event: LogEvent) -> Self {
        Self {
            events: vec![event],
            warnings: Vec::new(),
        }
    }

    pub fn failed(line: usize, error: &LineError, text: &str) -> Self {
        Self {
            events: Vec::new(),
            warnings: vec![ParseWarning::from_error(line, error, text)],
        }
    }

    pub fn push_event(&mut self, event: LogEvent) {
        self.events.push(event);
    }

    pub fn push_warning(&mut self, warning: ParseWarning) {
        self.warnings.push(warning);
    }

    pub fn merge(&mut self, other: LineResult) {
        self.events.extend(other.events);
        self.warnings.extend(other.warnings);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.warnings.is_empty()
    }
}

/// Partial multi-line event dropped at session end.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDiscard {
    /// Line that opened the partial event
    pub line: usize,
    pub description: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_names_are_snake_case() {
        assert_eq!(GcFormat::Sun1_6G1.as_str(), "sun1_6_g1");
        assert_eq!(GcFormat::IbmJ9.to_string(), "ibm_j9");
        let json = serde_json::to_string(&GcFormat::Unified).unwrap();
        assert_eq!(json, "\"unified\"");
    }

    #[test]
    fn test_lex_error_becomes_malformed_line() {
        let err: LineError = LexError::UnterminatedPause.into();
        assert_eq!(err.reason(), WarningReason::MalformedLine);
        assert!(err.to_string().contains("unterminated pause"));
    }

    #[test]
    fn test_unknown_type_reason_is_distinct() {
        let err = LineError::UnknownEventType("Foo GC".into());
        assert_eq!(err.reason(), WarningReason::UnknownEventType);
    }

    #[test]
    fn test_excerpt_is_bounded() {
        let long = "x".repeat(500);
        let w = ParseWarning::new(3, WarningReason::MalformedLine, "bad", &long);
        assert_eq!(w.excerpt.len(), EXCERPT_LEN + 3);
        assert_eq!(w.line, 3);
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let text = format!("{}é{}", "a".repeat(79), "b".repeat(10));
        let w = ParseWarning::new(1, WarningReason::MalformedLine, "bad", &text);
        assert!(w.excerpt.ends_with("..."));
    }
}
