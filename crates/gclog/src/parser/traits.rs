pub use super::model::{GcFormat, LineError, LineResult, ParseWarning, PendingDiscard};

pub trait FormatDetector: Send + Sync {
    /// Inspect the decoded sniff prefix. `None` when the signature is absent.
    fn detect(&self, sample: &str) -> Option<GcFormat>;
}

/// One log family's line grammar. Owns whatever cross-line state the family
/// needs; a session drives exactly one instance.
pub trait Grammar: Send {
    fn format(&self) -> GcFormat;

    /// Consume one physical line (terminator already stripped).
    fn parse_line(&mut self, line: &str, line_no: usize) -> LineResult;

    /// Drop partial multi-line events at end of input.
    fn finish(&mut self) -> Vec<PendingDiscard> {
        Vec::new()
    }

    /// Number of partial events currently held.
    fn pending(&self) -> usize {
        0
    }
}
