//! Process-wide catalog of known event type phrases.
//!
//! Built once on first use and never mutated, so any number of sessions can
//! share it without synchronization.

use std::collections::HashMap;
use std::sync::LazyLock;

use super::model::LineError;
use crate::model::descriptor::{
    Concurrency::{self, *},
    Generation::{self, *},
    NumericShape::{self, *},
    TypeDescriptor,
};

const fn t(name: &'static str, generation: Generation, concurrency: Concurrency, shape: NumericShape) -> TypeDescriptor {
    TypeDescriptor::new(name, generation, concurrency, shape)
}

const fn stw(name: &'static str, generation: Generation, shape: NumericShape) -> TypeDescriptor {
    t(name, generation, StopTheWorld, shape)
}

const fn conc(name: &'static str, generation: Generation, shape: NumericShape) -> TypeDescriptor {
    t(name, generation, ConcurrentDuration, shape)
}

static ENTRIES: &[TypeDescriptor] = &[
    // ── Sun / Oracle: serial, parallel, CMS ──
    stw("GC", Young, MemoryPause),
    stw("Full GC", Combined, MemoryPause),
    stw("Full GC (System)", Combined, MemoryPause),
    stw("DefNew", Young, MemoryPause),
    stw("ParNew", Young, MemoryPause),
    stw("ParNew (promotion failed)", Young, MemoryPause),
    stw("PSYoungGen", Young, Memory),
    stw("ASPSYoungGen", Young, Memory),
    stw("Tenured", Tenured, MemoryPause),
    stw("CMS", Tenured, MemoryPause),
    stw("CMS (concurrent mode failure)", Tenured, MemoryPause),
    stw("CMS (concurrent mode interrupted)", Tenured, MemoryPause),
    stw("PSOldGen", Tenured, Memory),
    stw("ParOldGen", Tenured, Memory),
    stw("ASParOldGen", Tenured, Memory),
    stw("Perm", Perm, MemoryPause),
    stw("PSPermGen", Perm, Memory),
    stw("CMS Perm", Perm, MemoryPause),
    stw("Metaspace", Perm, Memory),
    stw("CMS-initial-mark", Tenured, MemoryPause),
    stw("CMS-remark", Tenured, MemoryPause),
    stw("Rescan (parallel)", Tenured, Pause),
    stw("Rescan (non-parallel)", Tenured, Pause),
    stw("weak refs processing", Unknown, Pause),
    stw("class unloading", Unknown, Pause),
    stw("scrub symbol table", Unknown, Pause),
    stw("scrub string table", Unknown, Pause),
    t("CMS-concurrent-mark-start", Tenured, ConcurrentStart, Marker),
    t("CMS-concurrent-mark", Tenured, ConcurrentEnd, PausePair),
    t("CMS-concurrent-preclean-start", Tenured, ConcurrentStart, Marker),
    t("CMS-concurrent-preclean", Tenured, ConcurrentEnd, PausePair),
    t("CMS-concurrent-abortable-preclean-start", Tenured, ConcurrentStart, Marker),
    t("CMS-concurrent-abortable-preclean", Tenured, ConcurrentEnd, PausePair),
    t("CMS-concurrent-sweep-start", Tenured, ConcurrentStart, Marker),
    t("CMS-concurrent-sweep", Tenured, ConcurrentEnd, PausePair),
    t("CMS-concurrent-reset-start", Tenured, ConcurrentStart, Marker),
    t("CMS-concurrent-reset", Tenured, ConcurrentEnd, PausePair),
    // ── G1 (1.6 – 1.8) ──
    stw("GC pause (young)", Young, MemoryPause),
    stw("GC pause (mixed)", Combined, MemoryPause),
    stw("GC pause (partial)", Combined, MemoryPause),
    stw("GC pause (young) (initial-mark)", Young, MemoryPause),
    stw("GC pause (mixed) (initial-mark)", Combined, MemoryPause),
    stw("GC pause (partial) (initial-mark)", Combined, MemoryPause),
    stw("GC pause (young) (to-space overflow)", Young, MemoryPause),
    stw("GC pause (young) (to-space exhausted)", Young, MemoryPause),
    stw("GC pause (mixed) (to-space exhausted)", Combined, MemoryPause),
    stw("GC remark", Tenured, Pause),
    stw("GC ref-proc", Tenured, Pause),
    stw("GC cleanup", Tenured, MemoryPause),
    stw("Eden", Young, Memory),
    stw("Survivors", Young, Memory),
    stw("Heap", Combined, Memory),
    t("GC concurrent-root-region-scan-start", Tenured, ConcurrentStart, Marker),
    t("GC concurrent-root-region-scan-end", Tenured, ConcurrentEnd, Pause),
    t("GC concurrent-mark-start", Tenured, ConcurrentStart, Marker),
    t("GC concurrent-mark-end", Tenured, ConcurrentEnd, Pause),
    t("GC concurrent-mark-abort", Tenured, ConcurrentEnd, Marker),
    t("GC concurrent-mark-reset-for-overflow", Tenured, ConcurrentDuration, Marker),
    t("GC concurrent-cleanup-start", Tenured, ConcurrentStart, Marker),
    t("GC concurrent-cleanup-end", Tenured, ConcurrentEnd, Pause),
    // ── Unified JVM logging ──
    stw("Pause Young", Young, MemoryPause),
    stw("Pause Young (Normal)", Young, MemoryPause),
    stw("Pause Young (Concurrent Start)", Young, MemoryPause),
    stw("Pause Young (Prepare Mixed)", Young, MemoryPause),
    stw("Pause Young (Mixed)", Combined, MemoryPause),
    stw("Pause Initial Mark", Young, MemoryPause),
    stw("Pause Mixed", Combined, MemoryPause),
    stw("Pause Full", Combined, MemoryPause),
    stw("Pause Remark", Tenured, MemoryPause),
    stw("Pause Cleanup", Tenured, MemoryPause),
    conc("Concurrent Cycle", Tenured, Pause),
    conc("Concurrent Mark Cycle", Tenured, Pause),
    conc("Concurrent Mark", Tenured, Pause),
    conc("Concurrent Mark From Roots", Tenured, Pause),
    conc("Concurrent Preclean", Tenured, Pause),
    conc("Concurrent Scan Root Regions", Tenured, Pause),
    conc("Concurrent Rebuild Remembered Sets", Tenured, Pause),
    conc("Concurrent Cleanup for Next Mark", Tenured, Pause),
    conc("Concurrent Clear Claimed Marks", Tenured, Pause),
    conc("Concurrent Create Live Data", Tenured, Pause),
    conc("Concurrent Complete Cleanup", Tenured, Pause),
    conc("Concurrent Undo Cycle", Tenured, Pause),
    conc("Concurrent Sweep", Tenured, Pause),
    conc("Concurrent Reset", Tenured, Pause),
    stw("Eden regions", Young, Region),
    stw("Survivor regions", Young, Region),
    stw("Old regions", Tenured, Region),
    stw("Humongous regions", Tenured, Region),
    stw("Archive regions", Tenured, Region),
    // ── Shenandoah ──
    stw("Pause Init Mark", Tenured, MemoryPause),
    stw("Pause Final Mark", Tenured, MemoryPause),
    stw("Pause Final Evac", Tenured, MemoryPause),
    stw("Pause Init Update Refs", Tenured, MemoryPause),
    stw("Pause Final Update Refs", Tenured, MemoryPause),
    stw("Pause Degenerated GC", Combined, MemoryPause),
    conc("Concurrent marking", Tenured, MemoryPause),
    conc("Concurrent evacuation", Tenured, MemoryPause),
    conc("Concurrent update references", Tenured, MemoryPause),
    conc("Concurrent cleanup", Tenured, MemoryPause),
    conc("Concurrent reset", Tenured, MemoryPause),
    conc("Concurrent reset bitmaps", Tenured, MemoryPause),
    conc("Concurrent precleaning", Tenured, MemoryPause),
    conc("Concurrent uncommit", Tenured, MemoryPause),
    // ── JRockit ──
    stw("jrockit.GC", Combined, MemoryPause),
    stw("jrockit.nursery GC", Young, MemoryPause),
    stw("jrockit.parallel nursery GC", Young, MemoryPause),
    stw("jrockit.YC", Young, MemoryPause),
    stw("jrockit.OC", Combined, MemoryPause),
    // ── HP-UX ──
    stw("hpux.eden", Young, Memory),
    stw("hpux.survivor", Young, Memory),
    stw("hpux.old", Tenured, Memory),
    stw("hpux.perm", Perm, Memory),
    // ── IBM ──
    stw("af", Combined, MemoryPause),
    stw("sys", Combined, MemoryPause),
    stw("af nursery", Young, MemoryPause),
    stw("af tenured", Combined, MemoryPause),
    conc("con", Combined, MemoryPause),
    stw("nursery", Young, Memory),
    stw("tenured", Tenured, Memory),
];

static CATALOG: LazyLock<HashMap<&'static str, &'static TypeDescriptor>> =
    LazyLock::new(|| ENTRIES.iter().map(|d| (d.name, d)).collect());

/// Trim and drop trailing `:` / `--` decorations.
fn normalize(phrase: &str) -> &str {
    let mut s = phrase.trim();
    loop {
        let stripped = s
            .strip_suffix(':')
            .or_else(|| s.strip_suffix("--"))
            .map(str::trim_end);
        match stripped {
            Some(next) => s = next,
            None => return s,
        }
    }
}

/// Remove the right-most balanced parenthetical group. `None` when there is
/// none left.
fn strip_last_parenthetical(phrase: &str) -> Option<String> {
    let bytes = phrase.as_bytes();
    let close = phrase.rfind(')')?;
    let mut depth = 0usize;
    let mut open = None;
    for idx in (0..=close).rev() {
        match bytes[idx] {
            b')' => depth += 1,
            b'(' => {
                depth -= 1;
                if depth == 0 {
                    open = Some(idx);
                    break;
                }
            }
            _ => {}
        }
    }
    let open = open?;
    let joined = format!("{} {}", phrase[..open].trim_end(), phrase[close + 1..].trim_start());
    Some(joined.trim().to_string())
}

/// Resolve a free-text phrase to its descriptor.
///
/// Exact match after normalization first; otherwise GC-cause annotations are
/// peeled off from the right until a match is found.
pub fn lookup(phrase: &str) -> Option<&'static TypeDescriptor> {
    let normalized = normalize(phrase);
    if let Some(d) = CATALOG.get(normalized) {
        return Some(*d);
    }
    let mut current = normalized.to_string();
    while let Some(shorter) = strip_last_parenthetical(&current) {
        if let Some(d) = CATALOG.get(normalize(&shorter)) {
            return Some(*d);
        }
        current = shorter;
    }
    None
}

/// [`lookup`] as a line-level result.
pub fn resolve(phrase: &str) -> Result<&'static TypeDescriptor, LineError> {
    lookup(phrase).ok_or_else(|| LineError::UnknownEventType(phrase.trim().to_string()))
}

pub fn len() -> usize {
    CATALOG.len()
}
