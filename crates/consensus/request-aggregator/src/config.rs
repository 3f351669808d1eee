//! Tunables for the request aggregator.

use std::time::Duration;

/// Configuration for a [`crate::RequestAggregator`].
///
/// Wiring these from a config file or CLI is out of scope here; this type is the module's own
/// parameter set, constructed directly by whatever composes the engine.
#[derive(Clone, Copy, Debug)]
pub struct RequestAggregatorConfig {
    /// Per-pool cap on queued (hash, root) pairs.
    pub max_channel_requests: usize,
    /// Maximum time a pool may live before it must be drained.
    pub max_delay: Duration,
    /// Upper bound on how soon a freshly touched pool's deadline may be pulled in.
    pub small_delay: Duration,
    /// Maximum hashes per vote-generation chunk.
    pub confirm_ack_hashes_max: usize,
}

impl RequestAggregatorConfig {
    /// Live-network defaults: 300ms / 50ms.
    pub fn live() -> Self {
        Self {
            max_channel_requests: 64,
            max_delay: Duration::from_millis(300),
            small_delay: Duration::from_millis(50),
            confirm_ack_hashes_max: 255,
        }
    }

    /// Test-network defaults: 50ms / 10ms, so deadline-driven tests stay fast.
    pub fn test() -> Self {
        Self {
            max_channel_requests: 64,
            max_delay: Duration::from_millis(50),
            small_delay: Duration::from_millis(10),
            confirm_ack_hashes_max: 255,
        }
    }

    /// The backlog dam threshold: a call is dropped outright once the oldest pool is this far
    /// past its deadline.
    pub fn backlog_dam(&self) -> Duration {
        self.max_delay * 2
    }
}
