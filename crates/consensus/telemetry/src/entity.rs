//! The per-endpoint telemetry entry and its callback table.

use std::time::{Duration, Instant};
use tn_types::TelemetryData;

/// A callback awaiting a telemetry result for one endpoint: `(data, error)`.
pub type TelemetryCallback = Box<dyn FnOnce(TelemetryData, bool) + Send>;

/// Cached state for one peer's telemetry.
#[derive(Clone, Debug)]
pub struct TelemetryInfo {
    /// Last received data; empty-valued (`TelemetryData::default()`) while awaiting a first
    /// response.
    pub data: TelemetryData,
    pub last_request: Instant,
    pub undergoing_request: bool,
    /// Discards replies and timeouts from superseded probes.
    pub round: u64,
}

impl TelemetryInfo {
    pub fn new(now: Instant) -> Self {
        Self { data: TelemetryData::default(), last_request: now, undergoing_request: true, round: 0 }
    }

    /// Fresh iff a real (non-empty) reply has been received within `cache_cutoff` of `now`.
    pub fn is_fresh(&self, now: Instant, cache_cutoff: Duration) -> bool {
        self.data != TelemetryData::default() && self.last_request + cache_cutoff >= now
    }
}
