//! Translation metrics and observability.
//!
//! Counters are owned by the translation service (one set per service
//! instance) and exported through the admin status endpoint.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Lookup tier that answered a resolve call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Preloaded,
    Runtime,
    Fallback,
    Distributed,
    Backend,
    Source,
}

/// Counters for resolver and backend activity.
#[derive(Debug, Default)]
pub struct TranslationMetrics {
    preloaded_hits: AtomicUsize,
    runtime_hits: AtomicUsize,
    fallback_hits: AtomicUsize,
    distributed_hits: AtomicUsize,
    backend_hits: AtomicUsize,

    /// Lookups that ended with the English source
    source_fallbacks: AtomicUsize,

    /// Number of calls made to the translation backend
    backend_calls: AtomicUsize,

    /// Number of backend calls that failed or were rejected
    backend_failures: AtomicUsize,
}

impl TranslationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record which tier answered a lookup.
    pub fn record_tier(&self, tier: Tier) {
        let counter = match tier {
            Tier::Preloaded => &self.preloaded_hits,
            Tier::Runtime => &self.runtime_hits,
            Tier::Fallback => &self.fallback_hits,
            Tier::Distributed => &self.distributed_hits,
            Tier::Backend => &self.backend_hits,
            Tier::Source => &self.source_fallbacks,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a call to the translation backend.
    pub fn record_backend_call(&self) {
        self.backend_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed backend call.
    pub fn record_backend_failure(&self) {
        self.backend_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Generate a metrics report.
    pub fn report(&self) -> MetricsReport {
        let load = |c: &AtomicUsize| c.load(Ordering::Relaxed);

        let preloaded_hits = load(&self.preloaded_hits);
        let runtime_hits = load(&self.runtime_hits);
        let fallback_hits = load(&self.fallback_hits);
        let distributed_hits = load(&self.distributed_hits);
        let backend_hits = load(&self.backend_hits);
        let source_fallbacks = load(&self.source_fallbacks);

        let cache_hits = preloaded_hits + runtime_hits + distributed_hits;
        let lookups = cache_hits + fallback_hits + backend_hits + source_fallbacks;
        let cache_hit_rate = percentage(cache_hits, lookups);

        let backend_calls = load(&self.backend_calls);
        let backend_failures = load(&self.backend_failures);
        let backend_success_rate =
            percentage(backend_calls.saturating_sub(backend_failures), backend_calls);

        MetricsReport {
            preloaded_hits,
            runtime_hits,
            fallback_hits,
            distributed_hits,
            backend_hits,
            source_fallbacks,
            cache_hit_rate,
            backend_calls,
            backend_failures,
            backend_success_rate,
        }
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (part as f64 / total as f64) * 100.0
    }
}

/// Metrics report containing current translation statistics.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub preloaded_hits: usize,
    pub runtime_hits: usize,
    pub fallback_hits: usize,
    pub distributed_hits: usize,
    pub backend_hits: usize,
    pub source_fallbacks: usize,

    /// Share of lookups answered by a cache layer, as a percentage (0-100)
    pub cache_hit_rate: f64,

    pub backend_calls: usize,
    pub backend_failures: usize,

    /// Backend success rate as a percentage (0-100)
    pub backend_success_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Counter Tests ====================

    #[test]
    fn test_record_tiers() {
        let metrics = TranslationMetrics::new();
        metrics.record_tier(Tier::Preloaded);
        metrics.record_tier(Tier::Preloaded);
        metrics.record_tier(Tier::Fallback);
        metrics.record_tier(Tier::Source);

        let report = metrics.report();
        assert_eq!(report.preloaded_hits, 2);
        assert_eq!(report.fallback_hits, 1);
        assert_eq!(report.source_fallbacks, 1);
        assert_eq!(report.runtime_hits, 0);
    }

    // ==================== Report Tests ====================

    #[test]
    fn test_report_empty() {
        let report = TranslationMetrics::new().report();

        assert_eq!(report.cache_hit_rate, 0.0);
        assert_eq!(report.backend_calls, 0);
        assert_eq!(report.backend_success_rate, 0.0);
    }

    #[test]
    fn test_report_cache_hit_rate() {
        let metrics = TranslationMetrics::new();

        // 3 cache hits, 1 source fallback = 75% hit rate
        metrics.record_tier(Tier::Preloaded);
        metrics.record_tier(Tier::Runtime);
        metrics.record_tier(Tier::Distributed);
        metrics.record_tier(Tier::Source);

        assert_eq!(metrics.report().cache_hit_rate, 75.0);
    }

    #[test]
    fn test_report_backend_success_rate() {
        let metrics = TranslationMetrics::new();

        // 4 calls, 1 failure = 75% success rate
        for _ in 0..4 {
            metrics.record_backend_call();
        }
        metrics.record_backend_failure();

        let report = metrics.report();
        assert_eq!(report.backend_calls, 4);
        assert_eq!(report.backend_failures, 1);
        assert_eq!(report.backend_success_rate, 75.0);
    }

    #[test]
    fn test_report_all_backend_failures() {
        let metrics = TranslationMetrics::new();

        metrics.record_backend_call();
        metrics.record_backend_failure();
        metrics.record_backend_call();
        metrics.record_backend_failure();

        assert_eq!(metrics.report().backend_success_rate, 0.0);
    }

    #[test]
    fn test_instances_are_independent() {
        let a = TranslationMetrics::new();
        let b = TranslationMetrics::new();
        a.record_backend_call();

        assert_eq!(a.report().backend_calls, 1);
        assert_eq!(b.report().backend_calls, 0);
    }

    #[test]
    fn test_report_serializes_tier_names() {
        let json = serde_json::to_string(&Tier::Distributed).unwrap();
        assert_eq!(json, "\"distributed\"");
    }
}
