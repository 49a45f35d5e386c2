//! Context — what a caller hands to a parsing session.

use std::io::Read;
use std::sync::Arc;

use crate::parser::ParsingMetrics;

/// One resource to parse: its display name, the byte stream, a cooperative
/// cancellation predicate and optional shared counters.
pub struct ResourceContext<R> {
    pub name: String,
    pub cancel: Box<dyn Fn() -> bool>,
    pub reader: R,
    pub metrics: Option<Arc<ParsingMetrics>>,
}

impl<R: Read> ResourceContext<R> {
    /// Context that is never cancelled and records no metrics.
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            cancel: Box::new(|| false),
            reader,
            metrics: None,
        }
    }

    pub fn with_cancel(mut self, cancel: impl Fn() -> bool + 'static) -> Self {
        self.cancel = Box::new(cancel);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ParsingMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        (self.cancel)()
    }
}

impl<R> std::fmt::Debug for ResourceContext<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceContext")
            .field("name", &self.name)
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_default_never_cancels() {
        let ctx = ResourceContext::new("gc.log", &b""[..]);
        assert!(!ctx.is_cancelled());
        assert!(ctx.metrics.is_none());
    }

    #[test]
    fn test_cancel_flag_observed() {
        let flag = Arc::new(AtomicBool::new(false));
        let seen = flag.clone();
        let ctx = ResourceContext::new("gc.log", &b""[..]).with_cancel(move || seen.load(Ordering::Relaxed));
        assert!(!ctx.is_cancelled());
        flag.store(true, Ordering::Relaxed);
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_metrics_attached() {
        let ctx = ResourceContext::new("gc.log", &b""[..]).with_metrics(Arc::new(ParsingMetrics::new()));
        assert!(ctx.metrics.is_some());
        assert!(format!("{:?}", ctx).contains("gc.log"));
    }
}
