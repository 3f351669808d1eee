//! Prometheus counters and gauges for the request-aggregator and telemetry engines.
//!
//! Each engine owns one of these structs and registers it against a caller-supplied
//! `prometheus::Registry` at construction time, following the pattern of a dedicated
//! metrics crate shared across engines rather than ad hoc globals.

use prometheus::{register_int_counter_with_registry, register_int_gauge_with_registry, IntCounter, IntGauge, Registry};
use tap::TapFallible;

/// Per-engine request aggregator counters and gauges.
#[derive(Clone)]
pub struct AggregatorMetrics {
    pub aggregator_accepted: IntCounter,
    pub aggregator_dropped: IntCounter,
    pub requests_cached_hashes: IntCounter,
    pub requests_cached_votes: IntCounter,
    pub requests_generated_hashes: IntCounter,
    pub requests_generated_votes: IntCounter,
    pub requests_unknown: IntCounter,
    /// Current number of per-endpoint pools held by the aggregator.
    pub pool_count: IntGauge,
}

impl AggregatorMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        Ok(Self {
            aggregator_accepted: register_int_counter_with_registry!(
                "aggregator_accepted",
                "Requests accepted by the request aggregator's admission policy",
                registry
            )?,
            aggregator_dropped: register_int_counter_with_registry!(
                "aggregator_dropped",
                "Requests dropped by the request aggregator's admission policy",
                registry
            )?,
            requests_cached_hashes: register_int_counter_with_registry!(
                "requests_cached_hashes",
                "Hashes served directly from the vote cache during aggregation",
                registry
            )?,
            requests_cached_votes: register_int_counter_with_registry!(
                "requests_cached_votes",
                "Distinct cached votes sent during aggregation",
                registry
            )?,
            requests_generated_hashes: register_int_counter_with_registry!(
                "requests_generated_hashes",
                "Hashes that required a freshly generated vote",
                registry
            )?,
            requests_generated_votes: register_int_counter_with_registry!(
                "requests_generated_votes",
                "Votes freshly generated by local representatives",
                registry
            )?,
            requests_unknown: register_int_counter_with_registry!(
                "requests_unknown",
                "Requests whose root resolved to neither a known block nor account",
                registry
            )?,
            pool_count: register_int_gauge_with_registry!(
                "aggregator_pool_count",
                "Number of per-endpoint pools currently held by the request aggregator",
                registry
            )?,
        })
    }
}

/// Counters and gauges for the telemetry cache.
#[derive(Clone)]
pub struct TelemetryMetrics {
    pub probes_sent: IntCounter,
    pub probes_timed_out: IntCounter,
    pub probes_errored: IntCounter,
    /// Number of fresh-or-probing entries currently cached.
    pub cache_size: IntGauge,
    /// Number of callbacks currently awaiting a result across all endpoints.
    pub pending_callbacks: IntGauge,
}

impl TelemetryMetrics {
    pub fn new(registry: &Registry) -> prometheus::Result<Self> {
        Ok(Self {
            probes_sent: register_int_counter_with_registry!(
                "telemetry_probes_sent",
                "Telemetry probes sent to peers",
                registry
            )?,
            probes_timed_out: register_int_counter_with_registry!(
                "telemetry_probes_timed_out",
                "Telemetry probes that exceeded response_time_cutoff with no reply",
                registry
            )?,
            probes_errored: register_int_counter_with_registry!(
                "telemetry_probes_errored",
                "Telemetry probes whose send failed outright",
                registry
            )?,
            cache_size: register_int_gauge_with_registry!(
                "telemetry_cache_size",
                "Number of endpoints currently tracked by the telemetry cache",
                registry
            )?,
            pending_callbacks: register_int_gauge_with_registry!(
                "telemetry_pending_callbacks",
                "Callbacks currently queued awaiting a telemetry result",
                registry
            )?,
        })
    }
}

/// Registers a fresh, process-local registry for tests and standalone tools, logging (rather
/// than panicking on) duplicate-registration errors.
pub fn test_registry() -> Registry {
    Registry::new_custom(Some("test".to_string()), None)
        .tap_err(|e| tracing::warn!(?e, "failed to create custom registry"))
        .unwrap_or_default()
}
