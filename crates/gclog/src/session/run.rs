//! Run — the parsing session state machine.
//!
//! `Init → Sniffing → Streaming → {Done, Cancelled, Fatal}`. Streaming polls
//! cancellation once per physical line, drops blank and noise lines, feeds
//! the rest to the grammar and appends whatever it completes.

use std::io::Read;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use super::context::ResourceContext;
use super::lines::LineReader;
use crate::conf::ParserConfig;
use crate::filter::noise;
use crate::model::GcLog;
use crate::parser::{grammar_for, FatalError, FormatSniffer, ParseWarning, ParsingMetrics, WarningReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Init,
    Sniffing,
    Streaming,
    Done,
    Cancelled,
    Fatal,
}

/// Successful end of a session. `state` is `Done` or `Cancelled`; a
/// cancelled session still carries every event completed before the stop.
#[derive(Debug, Serialize)]
pub struct ParseOutcome {
    pub log: GcLog,
    pub state: SessionState,
}

/// Fatal end of a session, with whatever was parsed before the failure.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct SessionFailure {
    #[source]
    pub error: FatalError,
    pub partial: GcLog,
}

pub struct ParseSession {
    config: ParserConfig,
    sniffer: FormatSniffer,
    state: SessionState,
}

impl ParseSession {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config,
            sniffer: FormatSniffer::new(),
            state: SessionState::Init,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn record(&self, log: &mut GcLog, metrics: Option<&Arc<ParsingMetrics>>, warning: ParseWarning) {
        if let Some(m) = metrics {
            m.record_warning(warning.reason);
        }
        if self.config.keep_warnings {
            log.record_warning(warning);
        }
    }

    fn fail(&mut self, error: FatalError, partial: GcLog, metrics: Option<&Arc<ParsingMetrics>>) -> SessionFailure {
        self.state = SessionState::Fatal;
        if let Some(m) = metrics {
            m.session_failed();
        }
        warn!(error = %error, events = partial.len(), "parse failed");
        SessionFailure { error, partial }
    }

    pub fn run<R: Read>(&mut self, ctx: ResourceContext<R>) -> Result<ParseOutcome, SessionFailure> {
        let span = info_span!("parse", resource = %ctx.name);
        let _enter = span.enter();

        let started = Instant::now();
        let ResourceContext {
            name,
            cancel,
            reader,
            metrics,
        } = ctx;
        let metrics = metrics.as_ref();
        if let Some(m) = metrics {
            m.session_started();
        }

        let mut log = GcLog::new();

        self.state = SessionState::Sniffing;
        let (format, stream) = match self.sniffer.sniff(reader, self.config.sniff_limit_bytes) {
            Ok(sniffed) => sniffed,
            Err(source) => return Err(self.fail(FatalError::Stream { line: 0, source }, log, metrics)),
        };
        if let Some(m) = metrics {
            m.record_detection(format);
        }
        let Some(format) = format else {
            return Err(self.fail(FatalError::UnrecognizedFormat, log, metrics));
        };
        log.set_format(format);
        info!(resource = %name, format = %format, "format detected");

        let noise = match noise::for_format(format, &self.config.noise_patterns) {
            Ok(filter) => filter,
            Err(e) => {
                warn!(error = %e, "ignoring configured noise patterns");
                noise::for_format(format, &[]).ok().flatten()
            }
        };
        let mut grammar = grammar_for(format, &self.config);
        let mut lines = LineReader::new(stream, self.config.max_line_bytes);

        self.state = SessionState::Streaming;
        loop {
            if cancel() {
                info!(line = lines.line_no(), "parse cancelled");
                self.state = SessionState::Cancelled;
                break;
            }

            let line = match lines.next_line() {
                Ok(Some(line)) => line,
                Ok(None) => {
                    self.state = SessionState::Done;
                    break;
                }
                Err(source) => {
                    let error = FatalError::Stream {
                        line: lines.line_no(),
                        source,
                    };
                    return Err(self.fail(error, log, metrics));
                }
            };
            if let Some(m) = metrics {
                m.record_line(line.len);
            }

            if line.truncated {
                let warning = ParseWarning::new(
                    line.number,
                    WarningReason::LineTruncated,
                    format!("line of {} bytes truncated to {}", line.len, self.config.max_line_bytes),
                    &line.text,
                );
                warn!(line = line.number, bytes = line.len, "line truncated");
                self.record(&mut log, metrics, warning);
            }

            if line.text.trim().is_empty() {
                if let Some(m) = metrics {
                    m.record_blank();
                }
                continue;
            }
            if noise.as_ref().is_some_and(|f| f.is_noise(line.text.as_bytes())) {
                debug!(line = line.number, "noise line skipped");
                if let Some(m) = metrics {
                    m.record_noise();
                }
                continue;
            }

            let result = grammar.parse_line(&line.text, line.number);
            if let Some(m) = metrics {
                m.record_events(result.events.len());
            }
            for warning in result.warnings {
                warn!(line = warning.line, reason = ?warning.reason, "{}", warning.message);
                self.record(&mut log, metrics, warning);
            }
            for event in result.events {
                log.push(event);
            }
        }

        for dropped in grammar.finish() {
            warn!(line = dropped.line, "discarding partial event: {}", dropped.description);
            let warning = ParseWarning::new(
                dropped.line,
                WarningReason::PendingDiscarded,
                "partial event discarded at end of input",
                &dropped.description,
            );
            self.record(&mut log, metrics, warning);
        }

        let elapsed = started.elapsed().as_nanos() as u64;
        if let Some(m) = metrics {
            match self.state {
                SessionState::Cancelled => m.session_cancelled(elapsed),
                _ => m.session_completed(elapsed),
            }
        }
        info!(
            events = log.len(),
            warnings = log.warnings().len(),
            state = ?self.state,
            "parse finished"
        );
        Ok(ParseOutcome { log, state: self.state })
    }
}

/// Parse one resource with a fresh session.
pub fn parse<R: Read>(ctx: ResourceContext<R>, config: &ParserConfig) -> Result<ParseOutcome, SessionFailure> {
    ParseSession::new(config.clone()).run(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn run(input: &[u8]) -> Result<ParseOutcome, SessionFailure> {
        parse(ResourceContext::new("test.log", input), &ParserConfig::default())
    }

    fn sun_log(lines: usize) -> String {
        (1..=lines)
            .map(|i| format!("{}.000: [GC {}K->512K(4096K), 0.0100 secs]\n", i, 1024 + i))
            .collect()
    }

    /// Serves its bytes, then fails every read.
    struct FailingReader {
        data: Cursor<Vec<u8>>,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(io::Error::other("device went away")),
                n => Ok(n),
            }
        }
    }

    // ── happy path ──────────────────────────────────────────────

    #[test]
    fn test_sun_log_parsed() {
        let outcome = run(sun_log(20).as_bytes()).unwrap();
        assert_eq!(outcome.state, SessionState::Done);
        assert_eq!(outcome.log.format(), Some(crate::parser::GcFormat::Sun1_4));
        assert_eq!(outcome.log.len(), 20);
        assert!(outcome.log.warnings().is_empty());
        assert_eq!(outcome.log.events()[19].timestamp(), 20.0);
    }

    #[test]
    fn test_idempotent() {
        let text = format!(
            "{}garbage line\n[0.1s] oops\n{}",
            sun_log(10),
            "11.000: [GC 1024K->512K(4096K), 0.0100 secs]\n"
        );
        let first = run(text.as_bytes()).unwrap();
        let second = run(text.as_bytes()).unwrap();
        assert_eq!(first.log, second.log);
    }

    #[test]
    fn test_unified_pause_across_lines() {
        let text = "[0.100s][info][gc,start] GC(0) Pause Init Mark\n[0.101s][info][gc] GC(0) Pause Init Mark 1.021ms\n";
        let outcome = run(text.as_bytes()).unwrap();
        assert_eq!(outcome.log.len(), 1);
        let e = &outcome.log.events()[0];
        assert!((e.pause().unwrap() - 0.001021).abs() < 1e-12);
        assert!(e.memory().is_empty());
    }

    #[test]
    fn test_ibm_noise_lines_dropped() {
        let text = concat!(
            "<AF[5]: Allocation Failure. need 528 bytes, 5702 ms since last AF or CON>\n",
            "<AF[5]: managing allocation failure, action=1 (0/94558696) (1048576/1048576)>\n",
            "  <GC(5): GC cycle started Mon Jun 14 10:01:02 2004\n",
            "  <GC(5): freed 57497912 bytes, 61% free (58546488/95607272), in 41 ms>\n",
            "  <GC(5): mark: 22 ms, sweep: 3 ms, compact: 0 ms>\n",
            "  <GC(5): refs: soft 0 (age >= 32), weak 3, final 61, phantom 0>\n",
            "<AF[5]: completed in 42 ms>\n",
        );
        let outcome = run(text.as_bytes()).unwrap();
        assert!(outcome.log.warnings().is_empty(), "{:?}", outcome.log.warnings());
        assert_eq!(outcome.log.len(), 1);
    }

    // ── failure modes ───────────────────────────────────────────

    #[test]
    fn test_unrecognized_format() {
        let text = "hello world\n".repeat(400);
        let failure = run(text.as_bytes()).unwrap_err();
        assert!(matches!(failure.error, FatalError::UnrecognizedFormat));
        assert!(failure.partial.is_empty());
        assert_eq!(failure.partial.format(), None);
    }

    #[test]
    fn test_session_state_after_failure() {
        let mut session = ParseSession::new(ParserConfig::default());
        assert_eq!(session.state(), SessionState::Init);
        let _ = session.run(ResourceContext::new("x", &b"nothing"[..]));
        assert_eq!(session.state(), SessionState::Fatal);
    }

    #[test]
    fn test_stream_error_keeps_partial() {
        let config = ParserConfig {
            sniff_limit_bytes: 64,
            ..Default::default()
        };
        let reader = FailingReader {
            data: Cursor::new(sun_log(5).into_bytes()),
        };
        let failure = parse(ResourceContext::new("flaky", reader), &config).unwrap_err();
        match &failure.error {
            FatalError::Stream { line, .. } => assert_eq!(*line, 5),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(failure.partial.len(), 5);
    }

    #[test]
    fn test_one_bad_line_among_many() {
        let mut lines: Vec<String> = sun_log(1000).lines().map(str::to_string).collect();
        lines[499] = "x7#q random garbage ~~".to_string();
        let text = lines.join("\n");
        let outcome = run(text.as_bytes()).unwrap();
        assert_eq!(outcome.state, SessionState::Done);
        assert_eq!(outcome.log.len(), 999);
        let warnings = outcome.log.warnings();
        assert_eq!(warnings.len(), 1, "{:?}", warnings);
        assert_eq!(warnings[0].line, 500);
        assert_eq!(warnings[0].reason, WarningReason::MalformedLine);
    }

    // ── cancellation ────────────────────────────────────────────

    #[test]
    fn test_cancellation_yields_prefix() {
        let text = sun_log(50);
        let full = run(text.as_bytes()).unwrap();

        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        let ctx = ResourceContext::new("cancel.log", text.as_bytes())
            .with_cancel(move || counter.fetch_add(1, Ordering::Relaxed) >= 20);
        let cancelled = parse(ctx, &ParserConfig::default()).unwrap();

        assert_eq!(cancelled.state, SessionState::Cancelled);
        assert_eq!(cancelled.log.len(), 20);
        assert_eq!(cancelled.log.events(), &full.log.events()[..20]);
    }

    #[test]
    fn test_cancelled_before_first_line() {
        let text = sun_log(3);
        let ctx = ResourceContext::new("cancel.log", text.as_bytes()).with_cancel(|| true);
        let outcome = parse(ctx, &ParserConfig::default()).unwrap();
        assert_eq!(outcome.state, SessionState::Cancelled);
        assert!(outcome.log.is_empty());
        assert_eq!(outcome.log.format(), Some(crate::parser::GcFormat::Sun1_4));
    }

    // ── warnings and limits ─────────────────────────────────────

    #[test]
    fn test_pending_discarded_at_end() {
        let text = "0.229: [GC pause (young), 0.0123 secs]\n   [Parallel Time: 11.0 ms, GC Workers: 4]\n";
        let outcome = run(text.as_bytes()).unwrap();
        assert!(outcome.log.is_empty());
        let warnings = outcome.log.warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].reason, WarningReason::PendingDiscarded);
        assert_eq!(warnings[0].line, 1);
    }

    #[test]
    fn test_g1_pause_with_ergonomics_lines() {
        let text = concat!(
            "0.229: [GC pause (G1 Evacuation Pause) (young) 0.229: [G1Ergonomics (CSet Construction) start choosing CSet, _pending_cards: 0]\n",
            " 0.229: [G1Ergonomics (CSet Construction) add young regions to CSet, eden: 24 regions]\n",
            ", 0.0123 secs]\n",
            "   [Parallel Time: 11.0 ms, GC Workers: 4]\n",
            "   [Eden: 24.0M(24.0M)->0.0B(21.0M) Survivors: 0.0B->3072.0K Heap: 24.0M(256.0M)->4232.0K(256.0M)]\n",
            " [Times: user=0.03 sys=0.00, real=0.01 secs]\n",
        );
        let outcome = run(text.as_bytes()).unwrap();
        assert_eq!(outcome.log.format(), Some(crate::parser::GcFormat::Sun1_6G1));
        assert!(outcome.log.warnings().is_empty(), "{:?}", outcome.log.warnings());
        assert_eq!(outcome.log.len(), 1);
        assert_eq!(outcome.log.events()[0].pause(), Some(0.0123));
    }

    #[test]
    fn test_long_line_truncated() {
        let config = ParserConfig {
            max_line_bytes: 64,
            ..Default::default()
        };
        let text = format!("1.000: [GC 1024K->512K(4096K), 0.0100 secs]{}\n", " ".repeat(100));
        let outcome = parse(ResourceContext::new("long", text.as_bytes()), &config).unwrap();
        assert_eq!(outcome.log.len(), 1);
        assert_eq!(outcome.log.warnings()[0].reason, WarningReason::LineTruncated);
    }

    #[test]
    fn test_warnings_can_be_dropped() {
        let config = ParserConfig {
            keep_warnings: false,
            ..Default::default()
        };
        let text = format!("{}junk\n", sun_log(3));
        let outcome = parse(ResourceContext::new("quiet", text.as_bytes()), &config).unwrap();
        assert_eq!(outcome.log.len(), 3);
        assert!(outcome.log.warnings().is_empty());
    }

    #[test]
    fn test_configured_noise_pattern() {
        let config = ParserConfig {
            noise_patterns: vec!["^junk".to_string()],
            ..Default::default()
        };
        let text = format!("{}junk\n", sun_log(3));
        let outcome = parse(ResourceContext::new("noisy", text.as_bytes()), &config).unwrap();
        assert!(outcome.log.warnings().is_empty());
    }

    #[test]
    fn test_metrics_recorded() {
        let metrics = Arc::new(ParsingMetrics::new());
        let text = format!("{}\nApplication time: 0.1 seconds\n", sun_log(4));
        let ctx = ResourceContext::new("m", text.as_bytes()).with_metrics(metrics.clone());
        parse(ctx, &ParserConfig::default()).unwrap();

        let snap = metrics.snapshot();
        assert_eq!(snap.sessions_started, 1);
        assert_eq!(snap.sessions_completed, 1);
        assert_eq!(snap.sun_sessions, 1);
        assert_eq!(snap.lines_read, 6);
        assert_eq!(snap.blank_lines, 1);
        assert_eq!(snap.noise_lines, 1);
        assert_eq!(snap.events, 4);
    }
}
