//! Tunables for the telemetry cache.

use std::time::Duration;

/// Configuration for a [`crate::TelemetryCache`].
#[derive(Clone, Copy, Debug)]
pub struct TelemetryCacheConfig {
    /// Freshness window for a cached entry.
    pub cache_cutoff: Duration,
    /// Per-probe timeout; must be strictly less than `cache_cutoff`.
    pub response_time_cutoff: Duration,
    /// Peers advertising a lower protocol version are ineligible for probing.
    pub telemetry_protocol_version_min: u8,
}

impl TelemetryCacheConfig {
    /// Live-network defaults: 60s cache cutoff, 1s response cutoff.
    pub fn live() -> Self {
        Self {
            cache_cutoff: Duration::from_secs(60),
            response_time_cutoff: Duration::from_secs(1),
            telemetry_protocol_version_min: 18,
        }
    }

    /// Test-network defaults, so cutoff-driven tests stay fast.
    pub fn test() -> Self {
        Self {
            cache_cutoff: Duration::from_secs(2),
            response_time_cutoff: Duration::from_millis(200),
            telemetry_protocol_version_min: 18,
        }
    }
}
