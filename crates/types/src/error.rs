//! Error taxonomy shared by the aggregator and telemetry engines.
//!
//! None of these propagate out of the engines — admission/aggregation errors are counted and
//! discarded, send/timeout errors are converted into an error response for waiting callbacks.
//! They exist for structured `tracing` fields and for tests that assert on *why* something was
//! dropped.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AggregatorError {
    /// Admission rejected the call (backlog dam or per-pool cap).
    #[error("request dropped")]
    Dropped,
    /// Aggregation could not resolve a root to any known block or account.
    #[error("unknown request root")]
    Unknown,
    /// The channel's transport failed to send a message.
    #[error("channel send failed")]
    SendFailed,
    /// The component is shutting down.
    #[error("aggregator is shutting down")]
    Shutdown,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    /// No reply arrived within `response_time_cutoff`.
    #[error("telemetry request timed out")]
    Timeout,
    /// The channel's transport failed to send the probe.
    #[error("channel send failed")]
    SendFailed,
    /// The peer's protocol version is below `telemetry_protocol_version_min`.
    #[error("peer protocol version below minimum")]
    BelowProtocol,
    /// The component is shutting down.
    #[error("telemetry cache is shutting down")]
    Shutdown,
}
