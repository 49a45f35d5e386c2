//! Noise — built-in patterns for informational lines of each log family.
//!
//! Every pattern names text that a grammar would otherwise reject as
//! malformed. Lines a grammar needs (region size announcements, `[Times:`
//! closers of G1 pauses, IBM `freed`/`expanded` records) never appear here.

use crate::filter::engine::{FilterError, NoiseFilter};
use crate::parser::model::GcFormat;

/// Built-in pattern sets, one per log family.
pub struct Patterns;

impl Patterns {
    /// JVM banners and heap-at-exit dumps shared by all HotSpot outputs.
    pub const HOTSPOT: &'static [&'static str] = &[
        r"^(?:OpenJDK|Java HotSpot).* VM \(",
        r"^Memory: \d+k page",
        r"^CommandLine flags:",
        r"^\{Heap before",
        r"^Heap after",
        r"^Heap$",
        r"^\}$",
        r"^\s+(?:def new generation|tenured generation|compacting perm gen|concurrent mark-sweep generation|concurrent-mark-sweep perm gen|par new generation|PSYoungGen|ParOldGen|PSOldGen|PSPermGen|garbage-first heap|Metaspace)\s+(?:total|used)",
        r"^\s+(?:eden|from|to|the|ro|rw|object|class)\s+space",
        r"^\s+region size",
        r"Application time:",
        r"Total time for which application threads were stopped",
        r"^Desired survivor size",
        r"^- age +\d+:",
    ];

    /// Serial / parallel / CMS extras.
    pub const SUN: &'static [&'static str] = &[
        r"^\s*\[Times:",
        r"^(?:Before|After) GC:",
        r"^Statistics for BinaryTreeDictionary",
        r"^Total Free Space:",
        r"^Max\s+Chunk Size:",
        r"^Number of Blocks:",
        r"^Av\.\s+Block\s+Size:",
        r"^Tree\s+Height:",
        r"^-{5,}$",
    ];

    pub const G1: &'static [&'static str] = &[
        // Only lines that are nothing but an ergonomics record; a pause opener
        // can carry one on the same line.
        r"^\s*(?:\d{4}-\d{2}-\d{2}T[\d:.]+[+-]\d{4}: )?\d+(?:[.,]\d+)?: \[G1Ergonomics",
        r"^\s+\[(?:Parallel Time|GC Worker|Code Root|Clear CT|Other|Ext Root|Update RS|Scan RS|Object Copy|Termination|Choose CSet|Ref Proc|Ref Enq|Redirty Cards|Humongous|Free CSet|Evacuation Failure|String Dedup)",
    ];

    /// Tag sets that never carry a collection. `gc,init` stays: it announces
    /// the region size.
    pub const UNIFIED: &'static [&'static str] = &[
        r"\]\[gc,(?:phases|task|age|ergo|cpu|ref|stringdedup|marking|refine|remset|humongous|plab|reloc)",
        r"\]\[(?:safepoint|os|pagesize|logging|startuptime|class)[\],]",
    ];

    pub const SHENANDOAH: &'static [&'static str] = &[
        r"(?:^|: )(?:Using Shenandoah|Heuristics ergonomically|Shenandoah heuristics|Initialize Shenandoah|Safepointing mechanism|Humongous object threshold|Max TLAB size|GC threads|Reference processing|Heap Region Size)",
        r"(?:^|: )(?:Trigger:|Free:|Evacuation Reserve:|Pacer for|Adaptive CSet|Collectable Garbage|Cancelling GC|Uncommitted|Periodic GC|Good progress|Failed to allocate)",
    ];

    pub const GO: &'static [&'static str] = &[r"^scvg", r"^GC forced$", r"^pacer: "];

    pub const IBM: &'static [&'static str] = &[
        r"^\s*<GC\(\d+\): (?:mark|sweep|refs|moved|GC cycle started|heap layout|compact|Bytes Traced|pinned|stop threads|start threads|unloaded|Waiting)",
        r"^\s*<CON\[",
    ];

    pub const IBM_J9: &'static [&'static str] = &[
        r"^\s*<\?xml",
        r"^\s*</?verbosegc",
        r"^\s*</?initialized",
        r"^\s*<attribute ",
    ];

    pub const SUN_LEGACY: &'static [&'static str] = &[r"^<GC: (?:init&scan|expanded|need to expand|managing)"];
}

/// Built-in noise patterns for one format.
pub fn builtin(format: GcFormat) -> Vec<&'static str> {
    let sets: &[&[&str]] = match format {
        GcFormat::Sun1_4 | GcFormat::Sun1_6 => &[Patterns::HOTSPOT, Patterns::SUN],
        GcFormat::Sun1_6G1 => &[Patterns::HOTSPOT, Patterns::G1],
        GcFormat::Unified => &[Patterns::UNIFIED],
        GcFormat::Shenandoah => &[Patterns::HOTSPOT, Patterns::SHENANDOAH],
        GcFormat::Go => &[Patterns::GO],
        GcFormat::Ibm1_3_1 | GcFormat::Ibm1_4_2 => &[Patterns::IBM],
        GcFormat::IbmJ9 => &[Patterns::IBM_J9],
        GcFormat::Sun1_2_2 => &[Patterns::SUN_LEGACY],
        GcFormat::JRockit1_5 | GcFormat::JRockit1_6 | GcFormat::HpUx1_2 | GcFormat::HpUx1_4_1 => &[],
    };
    sets.iter().flat_map(|s| s.iter().copied()).collect()
}

/// Build a [`NoiseFilter`] that matches **any** of the given patterns.
///
/// The patterns are joined with `|` into a single alternation so each line
/// is tested against one compiled matcher.
pub fn multi_pattern(patterns: &[&str], case_sensitive: bool) -> Result<NoiseFilter, FilterError> {
    if patterns.is_empty() {
        return Err(FilterError::InvalidRegex("at least one pattern required".into()));
    }
    let combined = if patterns.len() == 1 {
        patterns[0].to_string()
    } else {
        patterns.iter().map(|p| format!("(?:{})", p)).collect::<Vec<_>>().join("|")
    };
    NoiseFilter::new(&combined, case_sensitive)
}

/// Noise filter for a session: the format's built-ins plus caller patterns.
/// `None` when there is nothing to filter.
pub fn for_format(format: GcFormat, extra: &[String]) -> Result<Option<NoiseFilter>, FilterError> {
    let mut patterns = builtin(format);
    patterns.extend(extra.iter().map(String::as_str));
    if patterns.is_empty() {
        return Ok(None);
    }
    multi_pattern(&patterns, true).map(Some)
}
