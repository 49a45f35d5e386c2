/// GC log format detection and parsing
///
/// Turns raw verbose-GC output of the supported JVMs (and the Go runtime)
/// into normalized [`crate::model::LogEvent`]s.
///
/// # Architecture
///
/// - `traits.rs`: detector and grammar traits
/// - `detector.rs`: ordered signature sniffing and grammar selection
/// - `formats/`: one grammar per log family
/// - `cursor.rs`: lexical primitives shared by the grammars
/// - `catalog.rs`: process-wide table of known event types
/// - `metrics.rs`: lock-free parsing counters
///
/// # Guarantees
///
/// - Bounded memory (line size limit, bounded pending tables)
/// - Binary safety (non-ASCII bytes never abort a parse)
/// - A bad line costs at most the event it belonged to

pub mod traits;
pub mod detector;
pub mod metrics;
pub mod formats;
pub mod model;
pub mod catalog;
pub mod cursor;
pub mod units;

// Re-export commonly used types
pub use traits::{FormatDetector, Grammar};
pub use detector::{grammar_for, FormatSniffer};
pub use metrics::{MetricsSnapshot, ParsingMetrics};
pub use model::{FatalError, GcFormat, LineError, LineResult, ParseWarning, PendingDiscard, WarningReason};

// Constants
pub const DEFAULT_SNIFF_LIMIT: usize = 3072; // 3KB
pub const MAX_LINE_SIZE: usize = 1_048_576; // 1MB
