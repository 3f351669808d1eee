//! The per-endpoint pool of pending vote requests and its two-index store.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
    time::{Duration, Instant},
};
use tn_network::Channel;
use tn_types::{Endpoint, Hash, Root};

/// A batch of pending (hash, root) requests for one peer endpoint.
pub struct ChannelPool {
    /// Keeps the channel alive for as long as the pool exists; refreshed on every `add` so it
    /// always points at the most recent channel.
    pub channel: Arc<dyn Channel>,
    /// Entries awaiting service, newest first (new requests are prepended).
    pub hashes_roots: Vec<(Hash, Root)>,
    /// When this pool was first created.
    pub start: Instant,
    /// When this pool must be drained by.
    pub deadline: Instant,
}

impl ChannelPool {
    fn new(channel: Arc<dyn Channel>, now: Instant, deadline: Instant) -> Self {
        Self { channel, hashes_roots: Vec::new(), start: now, deadline }
    }
}

/// Keeps `ChannelPool`s indexed both by endpoint (for admission lookups) and by deadline (for
/// the worker's "what's due next" query), consistent under a single lock.
#[derive(Default)]
pub struct PoolTable {
    by_endpoint: HashMap<Endpoint, ChannelPool>,
    by_deadline: BTreeSet<(Instant, Endpoint)>,
}

impl PoolTable {
    pub fn len(&self) -> usize {
        self.by_endpoint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_endpoint.is_empty()
    }

    /// The deadline of the pool that is due soonest, if any pool exists.
    pub fn earliest_deadline(&self) -> Option<Instant> {
        self.by_deadline.iter().next().map(|(deadline, _)| *deadline)
    }

    /// Inserts `entries` into the pool for `channel`'s endpoint, creating it if absent.
    ///
    /// Returns `false` (rejecting the whole call, no partial accept) if doing so would push the
    /// pool above `max_channel_requests`; the table is left unchanged in that case.
    pub fn add(
        &mut self,
        channel: Arc<dyn Channel>,
        entries: &[(Hash, Root)],
        now: Instant,
        max_delay: Duration,
        small_delay: Duration,
        max_channel_requests: usize,
    ) -> bool {
        let endpoint = channel.endpoint();
        let existing_len = self.by_endpoint.get(&endpoint).map(|p| p.hashes_roots.len()).unwrap_or(0);
        if existing_len + entries.len() > max_channel_requests {
            return false;
        }

        let pool = self
            .by_endpoint
            .entry(endpoint)
            .or_insert_with(|| ChannelPool::new(channel.clone(), now, now + small_delay.min(max_delay)));

        // Remove the stale deadline index entry before recomputing it.
        self.by_deadline.remove(&(pool.deadline, endpoint));

        pool.channel = channel;
        // New entries are prepended to the pool's sequence.
        let mut updated = entries.to_vec();
        updated.extend(std::mem::take(&mut pool.hashes_roots));
        pool.hashes_roots = updated;

        // Deadlines only ever move earlier within a pool's lifetime.
        pool.deadline = (pool.start + max_delay).min(now + small_delay);

        self.by_deadline.insert((pool.deadline, endpoint));
        true
    }

    /// Removes and returns the pool with the earliest deadline from both indices.
    pub fn take_earliest(&mut self) -> Option<(Endpoint, ChannelPool)> {
        let (deadline, endpoint) = *self.by_deadline.iter().next()?;
        self.by_deadline.remove(&(deadline, endpoint));
        let pool = self.by_endpoint.remove(&endpoint)?;
        Some((endpoint, pool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tn_test_utils::fake_channel;

    #[test]
    fn deadline_never_exceeds_start_plus_max_delay_or_now_plus_small_delay() {
        let mut table = PoolTable::default();
        let max_delay = Duration::from_millis(300);
        let small_delay = Duration::from_millis(50);
        let now = Instant::now();
        let (channel, _rx) = fake_channel(now);

        for _ in 0..5 {
            table.add(channel.clone(), &[], now, max_delay, small_delay, 64);
            let pool = table.by_endpoint.get(&channel.endpoint()).unwrap();
            assert!(pool.deadline <= pool.start + max_delay);
            assert!(pool.deadline <= now + small_delay);
        }
    }

    #[test]
    fn admission_cap_rejects_whole_call() {
        let mut table = PoolTable::default();
        let now = Instant::now();
        let (channel, _rx) = fake_channel(now);
        let entries = vec![(Hash::from([1u8; 32]), Root::Hash(Hash::ZERO)); 10];

        let accepted =
            table.add(channel.clone(), &entries, now, Duration::from_millis(300), Duration::from_millis(50), 5);
        assert!(!accepted, "10 entries must be rejected against a cap of 5");
        // the call above was rejected, so the pool was never created
        assert!(table.by_endpoint.get(&channel.endpoint()).is_none());
    }
}
