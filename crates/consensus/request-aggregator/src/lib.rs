//! Batches and deduplicates inbound block-hash vote requests per peer, serving cached votes and
//! generating fresh ones on a rolling deadline.

mod aggregate;
mod aggregator;
mod config;
mod pool;

pub use aggregate::{aggregate, generate_votes, AggregateOutcome};
pub use aggregator::RequestAggregator;
pub use config::RequestAggregatorConfig;
pub use pool::{ChannelPool, PoolTable};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tn_network::HashRoot;
    use tn_test_utils::{fake_block_store, fake_channel, FakeRepresentativeSet, FakeVoteCache};
    use tn_types::{Hash, Root};

    #[tokio::test(start_paused = true)]
    async fn cached_vote_is_served_without_generating() {
        let store = Arc::new(fake_block_store());
        let vote_cache = Arc::new(FakeVoteCache::default());
        let reps = Arc::new(FakeRepresentativeSet::with_one());
        let metrics = Arc::new(consensus_metrics::AggregatorMetrics::new(
            &consensus_metrics::test_registry(),
        )
        .unwrap());

        let aggregator = RequestAggregator::new(
            RequestAggregatorConfig::test(),
            store,
            vote_cache.clone(),
            reps,
            metrics,
        );
        aggregator.start();

        let hash = Hash::from([7u8; 32]);
        let vote = tn_types::Vote::new([1u8; 32], 1, vec![hash], vec![]);
        vote_cache.insert(vote.clone());

        let (channel, mut rx) = fake_channel(std::time::Instant::now());
        let accepted =
            aggregator.add(channel, &[HashRoot { hash, root: Root::Hash(Hash::ZERO) }]);
        assert!(accepted);

        let sent = tokio::time::timeout(std::time::Duration::from_millis(500), rx.recv())
            .await
            .expect("pool should drain before the timeout")
            .expect("channel closed unexpectedly");
        assert_eq!(sent, tn_test_utils::SentMessage::ConfirmAck(vote));

        aggregator.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn one_peers_requests_share_a_single_pool() {
        let store = Arc::new(fake_block_store());
        let vote_cache = Arc::new(FakeVoteCache::default());
        let reps = Arc::new(FakeRepresentativeSet::with_one());
        let metrics = Arc::new(consensus_metrics::AggregatorMetrics::new(
            &consensus_metrics::test_registry(),
        )
        .unwrap());

        let aggregator = RequestAggregator::new(
            RequestAggregatorConfig::test(),
            store,
            vote_cache,
            reps,
            metrics,
        );

        let hash = Hash::from([9u8; 32]);
        let (channel, _rx) = fake_channel(std::time::Instant::now());
        aggregator.add(channel.clone(), &[HashRoot { hash, root: Root::Hash(Hash::ZERO) }]);
        aggregator.add(channel, &[HashRoot { hash, root: Root::Hash(Hash::ZERO) }]);

        assert_eq!(aggregator.size(), 1, "one peer's requests must land in one pool");
    }

    #[tokio::test(start_paused = true)]
    async fn backlog_dam_rejects_calls_while_oldest_pool_is_stale() {
        let store = Arc::new(fake_block_store());
        let vote_cache = Arc::new(FakeVoteCache::default());
        let reps = Arc::new(FakeRepresentativeSet::with_one());
        let metrics = Arc::new(
            consensus_metrics::AggregatorMetrics::new(&consensus_metrics::test_registry()).unwrap(),
        );

        let config = RequestAggregatorConfig::test();
        let aggregator = RequestAggregator::new(config, store, vote_cache, reps, metrics.clone());

        // seed a pool that will become the stale earliest-deadline entry; the worker is never
        // started, so nothing drains it out from under the test.
        let (stale_channel, _rx) = fake_channel(std::time::Instant::now());
        let stale_hash = Hash::from([1u8; 32]);
        assert!(aggregator
            .add(stale_channel, &[HashRoot { hash: stale_hash, root: Root::Hash(Hash::ZERO) }]));
        assert_eq!(metrics.aggregator_accepted.get(), 1);

        // advance past deadline + 2*max_delay, tripping the dam.
        tokio::time::advance(config.backlog_dam() + config.small_delay + std::time::Duration::from_millis(1))
            .await;

        let (other_channel, _rx2) = fake_channel(std::time::Instant::now());
        let other_hash = Hash::from([2u8; 32]);
        let accepted = aggregator
            .add(other_channel, &[HashRoot { hash: other_hash, root: Root::Hash(Hash::ZERO) }]);

        assert!(!accepted, "a call arriving while the oldest pool is past the dam must be rejected");
        assert_eq!(metrics.aggregator_dropped.get(), 1);
    }
}
