use std::sync::atomic::{AtomicU64, Ordering};
use grep_matcher::Matcher;
use grep_regex::{RegexMatcher, RegexMatcherBuilder};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),
}

#[derive(Debug, Default)]
pub struct FilterStats {
    pub lines_scanned: AtomicU64,
    pub lines_matched: AtomicU64,
    pub bytes_processed: AtomicU64,
}

/// Compiled matcher for lines that carry no GC event.
pub struct NoiseFilter {
    matcher: RegexMatcher,
    stats: FilterStats,
}

impl NoiseFilter {
    pub fn new(pattern: &str, case_sensitive: bool) -> Result<Self, FilterError> {
        let matcher = RegexMatcherBuilder::new()
            .case_insensitive(!case_sensitive)
            .multi_line(false)
            .build(pattern)
            .map_err(|e| FilterError::InvalidRegex(e.to_string()))?;

        Ok(Self {
            matcher,
            stats: FilterStats::default(),
        })
    }

    /// True when the line is known noise and should not reach a grammar.
    #[inline]
    pub fn is_noise(&self, line: &[u8]) -> bool {
        self.stats.lines_scanned.fetch_add(1, Ordering::Relaxed);
        self.stats.bytes_processed.fetch_add(line.len() as u64, Ordering::Relaxed);

        let matches = self.matcher.is_match(line).unwrap_or(false);
        if matches {
            self.stats.lines_matched.fetch_add(1, Ordering::Relaxed);
        }
        matches
    }

    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.stats.lines_scanned.load(Ordering::Relaxed),
            self.stats.lines_matched.load(Ordering::Relaxed),
            self.stats.bytes_processed.load(Ordering::Relaxed),
        )
    }
}

impl std::fmt::Debug for NoiseFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoiseFilter").field("stats", &self.stats).finish()
    }
}
