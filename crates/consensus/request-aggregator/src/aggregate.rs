//! The pure aggregation step and the (impure) vote-generation/dispatch step that follows it.

use consensus_metrics::AggregatorMetrics;
use std::sync::Arc;
use tn_network::{BlockStoreReadTxn, Channel, RepresentativeSet, VoteCache};
use tn_types::{error::AggregatorError, Hash, Root, Vote};

/// The outcome of aggregating one pool's requests.
///
/// Deliberately free of side effects — sending cached votes, publishing successors, and
/// generating fresh votes are left to the caller, which keeps this function a pure function of
/// its inputs and directly unit-testable.
#[derive(Default, Debug, PartialEq, Eq)]
pub struct AggregateOutcome {
    /// Deduplicated votes found in the vote cache, ready to send as-is.
    pub cached_votes: Vec<Vote>,
    /// Hashes with no cached vote that still need one generated.
    pub to_generate: Vec<Hash>,
    /// Successor blocks discovered while resolving a root, to `publish` to the requester.
    pub to_publish: Vec<Hash>,
    /// Requests whose root resolved to neither a known block nor account.
    pub unknown_count: usize,
}

/// Aggregates one pool's (hash, root) pairs against the vote cache and a block-store read
/// transaction.
pub fn aggregate<T: BlockStoreReadTxn>(
    txn: &T,
    vote_cache: &dyn VoteCache,
    hashes_roots: &[(Hash, Root)],
    metrics: &AggregatorMetrics,
) -> AggregateOutcome {
    // Step 1: dedup by hash, sorting so ascending-hash processing order is deterministic.
    let mut deduped: Vec<(Hash, Root)> = hashes_roots.to_vec();
    deduped.sort_by_key(|(hash, _)| *hash);
    deduped.dedup_by_key(|(hash, _)| *hash);

    let mut outcome = AggregateOutcome::default();
    let mut cached_hash_count = 0usize;

    for (hash, root) in deduped {
        let cached = vote_cache.find(&hash);
        if !cached.is_empty() {
            cached_hash_count += 1;
            outcome.cached_votes.extend(cached);
            continue;
        }

        if !hash.is_zero() && txn.block_exists(&hash) {
            outcome.to_generate.push(hash);
            continue;
        }

        if root.is_zero() {
            continue;
        }

        let successor = txn
            .block_successor(&root.as_hash())
            .or_else(|| txn.account_open_block(&root.as_hash()));

        match successor {
            Some(successor) => {
                let cached = vote_cache.find(&successor);
                if !cached.is_empty() {
                    outcome.cached_votes.extend(cached);
                } else {
                    outcome.to_generate.push(successor);
                }
                outcome.to_publish.push(successor);
            }
            None => {
                outcome.unknown_count += 1;
            }
        }
    }

    // Step 3: dedup cached votes by vote identity.
    outcome.cached_votes.sort_by(|a, b| {
        (a.representative, a.sequence, &a.hashes).cmp(&(b.representative, b.sequence, &b.hashes))
    });
    outcome.cached_votes.dedup();

    // Step 4: emit statistics.
    metrics.requests_cached_hashes.inc_by(cached_hash_count as u64);
    metrics.requests_cached_votes.inc_by(outcome.cached_votes.len() as u64);
    metrics.requests_unknown.inc_by(outcome.unknown_count as u64);

    outcome
}

/// Chunks `hashes` into groups of at most `chunk_size` and, for each chunk, generates a vote for
/// every local representative, sending and caching each one.
///
/// Votes for a chunk are sent before the next chunk begins.
pub async fn generate_votes<T: BlockStoreReadTxn>(
    txn: &T,
    representatives: &dyn RepresentativeSet,
    vote_cache: &dyn VoteCache,
    channel: &Arc<dyn Channel>,
    hashes: Vec<Hash>,
    chunk_size: usize,
    metrics: &AggregatorMetrics,
) {
    let reps = representatives.representatives();
    let mut generated = 0u64;

    for chunk in hashes.chunks(chunk_size.max(1)) {
        for (public, private) in &reps {
            let vote = txn.generate_vote(*public, *private, chunk);
            generated += 1;
            vote_cache.insert(vote.clone());
            if channel.send_confirm_ack(vote).await.is_err() {
                tracing::debug!(
                    endpoint = %channel.endpoint(),
                    error = %AggregatorError::SendFailed,
                    "confirm_ack send failed during vote generation"
                );
            }
        }
    }

    metrics.requests_generated_hashes.inc_by(hashes.len() as u64);
    metrics.requests_generated_votes.inc_by(generated);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tn_test_utils::{fake_block_store, hash, vote, FakeVoteCache};

    fn metrics() -> AggregatorMetrics {
        AggregatorMetrics::new(&consensus_metrics::test_registry()).unwrap()
    }

    #[test]
    fn unresolved_root_with_no_block_is_counted_unknown() {
        let store = fake_block_store();
        let vote_cache = FakeVoteCache::default();
        let txn = store.begin_read();
        let metrics = metrics();

        let requested = hash(1);
        let root = Root::Account(hash(2));
        let outcome = aggregate(&txn, &vote_cache, &[(requested, root)], &metrics);

        assert_eq!(outcome.unknown_count, 1);
        assert!(outcome.to_generate.is_empty());
        assert!(outcome.cached_votes.is_empty());
        assert!(outcome.to_publish.is_empty());
    }

    #[test]
    fn successor_of_account_open_is_generated_and_published() {
        let store = fake_block_store();
        store.insert_account_open(hash(2), hash(3));
        let vote_cache = FakeVoteCache::default();
        let txn = store.begin_read();
        let metrics = metrics();

        // the requested hash itself is unknown to the block store, forcing root resolution
        let requested = hash(1);
        let root = Root::Account(hash(2));
        let outcome = aggregate(&txn, &vote_cache, &[(requested, root)], &metrics);

        assert_eq!(outcome.to_generate, vec![hash(3)]);
        assert_eq!(outcome.to_publish, vec![hash(3)]);
        assert!(outcome.cached_votes.is_empty());
        assert_eq!(outcome.unknown_count, 0);
    }

    #[test]
    fn cached_vote_for_resolved_successor_is_served_and_still_published() {
        let store = fake_block_store();
        store.insert_successor(hash(2), hash(3));
        let vote_cache = FakeVoteCache::default();
        let v = vote([9u8; 32], 1, vec![hash(3)]);
        vote_cache.insert(v.clone());
        let txn = store.begin_read();
        let metrics = metrics();

        let requested = hash(1);
        let root = Root::Hash(hash(2));
        let outcome = aggregate(&txn, &vote_cache, &[(requested, root)], &metrics);

        assert_eq!(outcome.cached_votes, vec![v]);
        assert!(outcome.to_generate.is_empty());
        assert_eq!(outcome.to_publish, vec![hash(3)]);
    }

    #[test]
    fn duplicate_hashes_collapse_before_resolution() {
        let store = fake_block_store();
        store.insert_block(hash(1));
        let vote_cache = FakeVoteCache::default();
        let txn = store.begin_read();
        let metrics = metrics();

        let root = Root::Hash(Hash::ZERO);
        let outcome = aggregate(&txn, &vote_cache, &[(hash(1), root), (hash(1), root)], &metrics);

        assert_eq!(outcome.to_generate, vec![hash(1)]);
    }

    #[test]
    fn zero_root_with_no_known_block_is_skipped_silently() {
        let store = fake_block_store();
        let vote_cache = FakeVoteCache::default();
        let txn = store.begin_read();
        let metrics = metrics();

        let outcome = aggregate(&txn, &vote_cache, &[(hash(1), Root::Hash(Hash::ZERO))], &metrics);

        assert!(outcome.to_generate.is_empty());
        assert!(outcome.to_publish.is_empty());
        assert_eq!(outcome.unknown_count, 0);
    }
}
