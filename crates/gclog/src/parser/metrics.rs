use std::sync::atomic::{AtomicU64, Ordering};
use serde::Serialize;

use super::model::{GcFormat, WarningReason};

/// Forces the wrapped counters onto their own cache line so sessions running
/// on different threads do not false-share.
#[repr(align(64))]
#[derive(Debug, Default)]
pub struct CacheAligned<T>(pub T);

/// Format detection attempts and outcomes
#[derive(Debug, Default)]
pub struct DetectionMetrics {
    pub attempts: AtomicU64,
    pub success: AtomicU64,
    pub unrecognized: AtomicU64,
}

/// Per-line counters (hottest path)
#[derive(Debug, Default)]
pub struct LineMetrics {
    pub lines: AtomicU64,
    pub events: AtomicU64,
    pub noise: AtomicU64,
    pub blank: AtomicU64,
    pub bytes: AtomicU64,
}

/// Warning counters by reason
#[derive(Debug, Default)]
pub struct WarningMetrics {
    pub malformed: AtomicU64,
    pub unknown_type: AtomicU64,
    pub pending_discarded: AtomicU64,
    pub pending_evicted: AtomicU64,
    pub truncated: AtomicU64,
}

/// Session outcomes
#[derive(Debug, Default)]
pub struct SessionMetrics {
    pub started: AtomicU64,
    pub completed: AtomicU64,
    pub cancelled: AtomicU64,
    pub failed: AtomicU64,
    pub time_nanos: AtomicU64,
}

/// Sessions per grammar family
#[derive(Debug, Default)]
pub struct FormatMetrics {
    pub sun: AtomicU64,
    pub g1: AtomicU64,
    pub unified: AtomicU64,
    pub shenandoah: AtomicU64,
    pub ibm: AtomicU64,
    pub jrockit: AtomicU64,
    pub hpux: AtomicU64,
    pub go: AtomicU64,
}

/// Counters shared by any number of parsing sessions.
///
/// All operations use `Ordering::Relaxed`; `snapshot()` reads each counter
/// atomically but the snapshot as a whole is not transactional.
#[derive(Debug, Default)]
pub struct ParsingMetrics {
    pub detection: CacheAligned<DetectionMetrics>,
    pub lines: CacheAligned<LineMetrics>,
    pub warnings: CacheAligned<WarningMetrics>,
    pub sessions: CacheAligned<SessionMetrics>,
    pub formats: CacheAligned<FormatMetrics>,
}

impl ParsingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_detection(&self, format: Option<GcFormat>) {
        self.detection.0.attempts.fetch_add(1, Ordering::Relaxed);
        let Some(format) = format else {
            self.detection.0.unrecognized.fetch_add(1, Ordering::Relaxed);
            return;
        };
        self.detection.0.success.fetch_add(1, Ordering::Relaxed);

        let f = &self.formats.0;
        match format {
            GcFormat::Sun1_2_2 | GcFormat::Sun1_4 | GcFormat::Sun1_6 => f.sun.fetch_add(1, Ordering::Relaxed),
            GcFormat::Sun1_6G1 => f.g1.fetch_add(1, Ordering::Relaxed),
            GcFormat::Unified => f.unified.fetch_add(1, Ordering::Relaxed),
            GcFormat::Shenandoah => f.shenandoah.fetch_add(1, Ordering::Relaxed),
            GcFormat::Ibm1_3_1 | GcFormat::Ibm1_4_2 | GcFormat::IbmJ9 => f.ibm.fetch_add(1, Ordering::Relaxed),
            GcFormat::JRockit1_5 | GcFormat::JRockit1_6 => f.jrockit.fetch_add(1, Ordering::Relaxed),
            GcFormat::HpUx1_2 | GcFormat::HpUx1_4_1 => f.hpux.fetch_add(1, Ordering::Relaxed),
            GcFormat::Go => f.go.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Called once per physical line read.
    #[inline]
    pub fn record_line(&self, bytes: usize) {
        self.lines.0.lines.fetch_add(1, Ordering::Relaxed);
        self.lines.0.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_noise(&self) {
        self.lines.0.noise.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_blank(&self) {
        self.lines.0.blank.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_events(&self, count: usize) {
        self.lines.0.events.fetch_add(count as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_warning(&self, reason: WarningReason) {
        let w = &self.warnings.0;
        match reason {
            WarningReason::MalformedLine => w.malformed.fetch_add(1, Ordering::Relaxed),
            WarningReason::UnknownEventType => w.unknown_type.fetch_add(1, Ordering::Relaxed),
            WarningReason::PendingDiscarded => w.pending_discarded.fetch_add(1, Ordering::Relaxed),
            WarningReason::PendingEvicted => w.pending_evicted.fetch_add(1, Ordering::Relaxed),
            WarningReason::LineTruncated => w.truncated.fetch_add(1, Ordering::Relaxed),
        };
    }

    // --- Session lifecycle ---

    #[inline]
    pub fn session_started(&self) {
        self.sessions.0.started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_completed(&self, time_nanos: u64) {
        self.sessions.0.completed.fetch_add(1, Ordering::Relaxed);
        self.sessions.0.time_nanos.fetch_add(time_nanos, Ordering::Relaxed);
    }

    pub fn session_cancelled(&self, time_nanos: u64) {
        self.sessions.0.cancelled.fetch_add(1, Ordering::Relaxed);
        self.sessions.0.time_nanos.fetch_add(time_nanos, Ordering::Relaxed);
    }

    pub fn session_failed(&self) {
        self.sessions.0.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let lines = self.lines.0.lines.load(Ordering::Relaxed);
        let noise = self.lines.0.noise.load(Ordering::Relaxed);
        let blank = self.lines.0.blank.load(Ordering::Relaxed);
        let malformed = self.warnings.0.malformed.load(Ordering::Relaxed);
        let unknown_type = self.warnings.0.unknown_type.load(Ordering::Relaxed);
        let finished = self.sessions.0.completed.load(Ordering::Relaxed)
            + self.sessions.0.cancelled.load(Ordering::Relaxed);
        let time_ns = self.sessions.0.time_nanos.load(Ordering::Relaxed);

        let fed = lines.saturating_sub(noise + blank);

        MetricsSnapshot {
            detection_attempts: self.detection.0.attempts.load(Ordering::Relaxed),
            detection_success: self.detection.0.success.load(Ordering::Relaxed),
            detection_unrecognized: self.detection.0.unrecognized.load(Ordering::Relaxed),

            sun_sessions: self.formats.0.sun.load(Ordering::Relaxed),
            g1_sessions: self.formats.0.g1.load(Ordering::Relaxed),
            unified_sessions: self.formats.0.unified.load(Ordering::Relaxed),
            shenandoah_sessions: self.formats.0.shenandoah.load(Ordering::Relaxed),
            ibm_sessions: self.formats.0.ibm.load(Ordering::Relaxed),
            jrockit_sessions: self.formats.0.jrockit.load(Ordering::Relaxed),
            hpux_sessions: self.formats.0.hpux.load(Ordering::Relaxed),
            go_sessions: self.formats.0.go.load(Ordering::Relaxed),

            lines_read: lines,
            bytes_read: self.lines.0.bytes.load(Ordering::Relaxed),
            noise_lines: noise,
            blank_lines: blank,
            events: self.lines.0.events.load(Ordering::Relaxed),

            malformed_lines: malformed,
            unknown_types: unknown_type,
            pending_discarded: self.warnings.0.pending_discarded.load(Ordering::Relaxed),
            pending_evicted: self.warnings.0.pending_evicted.load(Ordering::Relaxed),
            lines_truncated: self.warnings.0.truncated.load(Ordering::Relaxed),
            success_rate: if fed > 0 {
                fed.saturating_sub(malformed + unknown_type) as f64 / fed as f64
            } else {
                1.0
            },

            sessions_started: self.sessions.0.started.load(Ordering::Relaxed),
            sessions_completed: self.sessions.0.completed.load(Ordering::Relaxed),
            sessions_cancelled: self.sessions.0.cancelled.load(Ordering::Relaxed),
            sessions_failed: self.sessions.0.failed.load(Ordering::Relaxed),
            avg_session_ms: if finished > 0 {
                (time_ns as f64 / finished as f64) / 1_000_000.0
            } else {
                0.0
            },
        }
    }
}

/// Read-only copy of the counters, serializable for the binary's report.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    // Detection
    pub detection_attempts: u64,
    pub detection_success: u64,
    pub detection_unrecognized: u64,

    // Sessions per family
    pub sun_sessions: u64,
    pub g1_sessions: u64,
    pub unified_sessions: u64,
    pub shenandoah_sessions: u64,
    pub ibm_sessions: u64,
    pub jrockit_sessions: u64,
    pub hpux_sessions: u64,
    pub go_sessions: u64,

    // Lines
    pub lines_read: u64,
    pub bytes_read: u64,
    pub noise_lines: u64,
    pub blank_lines: u64,
    pub events: u64,

    // Warnings
    pub malformed_lines: u64,
    pub unknown_types: u64,
    pub pending_discarded: u64,
    pub pending_evicted: u64,
    pub lines_truncated: u64,
    /// Share of grammar-fed lines that did not produce a line warning
    pub success_rate: f64,

    // Sessions
    pub sessions_started: u64,
    pub sessions_completed: u64,
    pub sessions_cancelled: u64,
    pub sessions_failed: u64,
    pub avg_session_ms: f64,
}
