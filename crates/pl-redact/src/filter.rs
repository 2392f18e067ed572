//! Dispatch of host log events to privacy-aware sinks.

use crate::record::{LogEvent, PrivacyRecord, RecordSink};
use crate::registry::ParamSanitizerRegistry;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::Level;

/// Counters kept by a [`PrivacyFilter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    /// Records built and handed to the sinks.
    pub dispatched: u64,
    /// Events below the level threshold.
    pub suppressed: u64,
    /// Sink failures.
    pub failed: u64,
}

/// Intercepts log events, builds a [`PrivacyRecord`] per event and forwards it
/// to every attached sink.
///
/// The original event is always fully handled by the filter once it is
/// started; callers should not process it further.
pub struct PrivacyFilter {
    registry: Arc<ParamSanitizerRegistry>,
    threshold: Level,
    sinks: Vec<Arc<dyn RecordSink>>,
    started: AtomicBool,
    dispatched: AtomicU64,
    suppressed: AtomicU64,
    failed: AtomicU64,
}

impl Default for PrivacyFilter {
    fn default() -> Self {
        Self::new(Arc::new(ParamSanitizerRegistry::new()))
    }
}

impl PrivacyFilter {
    pub fn new(registry: Arc<ParamSanitizerRegistry>) -> Self {
        Self {
            registry,
            threshold: Level::INFO,
            sinks: Vec::new(),
            started: AtomicBool::new(false),
            dispatched: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Least severe level that is still dispatched (default INFO).
    pub fn with_threshold(mut self, threshold: Level) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn add_sink(&mut self, sink: Arc<dyn RecordSink>) {
        self.sinks.push(sink);
    }

    pub fn with_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.add_sink(sink);
        self
    }

    pub fn start(&self) {
        if self.registry.is_empty() {
            tracing::warn!("privacy filter started without sanitizer factories; every tagged parameter will be dropped");
        }
        if self.sinks.is_empty() {
            tracing::warn!("privacy filter started without sinks");
        }
        self.started.store(true, Ordering::Release);
    }

    pub fn stop(&self) {
        self.started.store(false, Ordering::Release);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn registry(&self) -> &Arc<ParamSanitizerRegistry> {
        &self.registry
    }

    /// Handle `event`. Returns `true` when the event is fully handled, `false`
    /// when the filter is not started and the caller should fall back to its
    /// normal processing.
    pub fn decide(&self, event: LogEvent) -> bool {
        if !self.is_started() {
            tracing::error!("the privacy filter has not been started");
            return false;
        }

        // tracing orders TRACE above ERROR.
        if event.level > self.threshold {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            return true;
        }

        let record = PrivacyRecord::from_event(&self.registry, event);
        for sink in &self.sinks {
            if let Err(e) = sink.append(&record) {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(target_logger = %record.target(), error = %e, "sink rejected privacy record; record dropped");
            }
        }
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn stats(&self) -> FilterStats {
        FilterStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitizer::BlindingSanitizerFactory;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect {
        lines: Mutex<Vec<(String, String)>>,
    }

    impl RecordSink for Collect {
        fn append(
            &self,
            record: &PrivacyRecord,
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            let pair = (
                record.sanitized_message()?.to_string(),
                record.critical_message()?.to_string(),
            );
            self.lines.lock().unwrap().push(pair);
            Ok(())
        }
    }

    struct Failing;

    impl RecordSink for Failing {
        fn append(
            &self,
            _: &PrivacyRecord,
        ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err("disk full".into())
        }
    }

    fn filter(sink: Arc<dyn RecordSink>) -> PrivacyFilter {
        let mut registry = ParamSanitizerRegistry::new();
        registry.register("user", BlindingSanitizerFactory::new()).unwrap();
        PrivacyFilter::new(Arc::new(registry)).with_sink(sink)
    }

    #[test]
    fn test_unstarted_filter_declines() {
        let f = filter(Arc::new(Collect::default()));
        assert!(!f.decide(LogEvent::new(Level::INFO, "t", "x")));
    }

    #[test]
    fn test_dispatches_both_views() {
        let sink = Arc::new(Collect::default());
        let f = filter(sink.clone());
        f.start();

        assert!(f.decide(LogEvent::new(Level::INFO, "t", "hi {user}").with_param("eve")));
        let lines = sink.lines.lock().unwrap();
        assert_eq!(lines[0], ("hi *****".to_string(), "hi eve".to_string()));
        assert_eq!(f.stats().dispatched, 1);
    }

    #[test]
    fn test_below_threshold_is_suppressed() {
        let sink = Arc::new(Collect::default());
        let f = filter(sink.clone()).with_threshold(Level::WARN);
        f.start();

        assert!(f.decide(LogEvent::new(Level::DEBUG, "t", "noise")));
        assert!(f.decide(LogEvent::new(Level::ERROR, "t", "boom")));
        assert_eq!(sink.lines.lock().unwrap().len(), 1);
        assert_eq!(f.stats().suppressed, 1);
    }

    #[test]
    fn test_sink_failure_is_counted() {
        let sink = Arc::new(Collect::default());
        let f = filter(Arc::new(Failing)).with_sink(sink.clone());
        f.start();

        assert!(f.decide(LogEvent::new(Level::INFO, "t", "x")));
        assert_eq!(f.stats().failed, 1);
        // Other sinks still receive the record.
        assert_eq!(sink.lines.lock().unwrap().len(), 1);
    }
}
