//! The request aggregator engine: batches inbound vote requests per peer and drains them on a
//! deadline-driven worker loop.

use crate::{
    aggregate::{aggregate, generate_votes},
    config::RequestAggregatorConfig,
    pool::PoolTable,
};
use consensus_metrics::AggregatorMetrics;
use parking_lot::Mutex;
use std::{
    sync::{Arc, Weak},
    time::Instant,
};
use tn_network::{BlockStore, Channel, HashRoot, RepresentativeSet, VoteCache};
use tn_types::error::AggregatorError;
use tokio::{sync::Notify, task::JoinHandle};

struct Inner {
    table: Mutex<PoolTable>,
    notify: Notify,
    stopped: std::sync::atomic::AtomicBool,
}

/// Batches per-peer `confirm_req` batches, deduplicates against the vote cache, and serves or
/// generates votes on a rolling deadline.
pub struct RequestAggregator<S, V, R> {
    inner: Arc<Inner>,
    config: RequestAggregatorConfig,
    store: Arc<S>,
    vote_cache: Arc<V>,
    representatives: Arc<R>,
    metrics: Arc<AggregatorMetrics>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// A non-owning handle to self, so the worker loop can be spawned from `&self` without
    /// requiring an `Arc<Self>` receiver.
    self_weak: Weak<Self>,
}

impl<S, V, R> RequestAggregator<S, V, R>
where
    S: BlockStore + 'static,
    V: VoteCache + 'static,
    R: RepresentativeSet + 'static,
{
    pub fn new(
        config: RequestAggregatorConfig,
        store: Arc<S>,
        vote_cache: Arc<V>,
        representatives: Arc<R>,
        metrics: Arc<AggregatorMetrics>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_weak| Self {
            inner: Arc::new(Inner {
                table: Mutex::new(PoolTable::default()),
                notify: Notify::new(),
                stopped: std::sync::atomic::AtomicBool::new(false),
            }),
            config,
            store,
            vote_cache,
            representatives,
            metrics,
            worker: Mutex::new(None),
            self_weak: self_weak.clone(),
        })
    }

    /// Spawns the worker loop. Calling this more than once is a no-op.
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        let weak = self.self_weak.clone();
        *worker = Some(tokio::spawn(async move {
            if let Some(this) = weak.upgrade() {
                this.run().await;
            }
        }));
    }

    /// Signals the worker to exit and waits for it to finish.
    pub async fn stop(&self) {
        self.inner.stopped.store(true, std::sync::atomic::Ordering::SeqCst);
        self.inner.notify.notify_one();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    pub fn size(&self) -> usize {
        self.inner.table.lock().len()
    }

    pub fn empty(&self) -> bool {
        self.inner.table.lock().is_empty()
    }

    /// Admits a peer's batch of `(hash, root)` requests into its pool. Precondition: the caller
    /// holds at least one voting representative.
    ///
    /// Returns `false` if the call was dropped outright, either because the whole batch would
    /// push the pool over `max_channel_requests` (no partial accept) or because the backlog dam
    /// has tripped (the oldest pool is already well past its deadline).
    pub fn add(&self, channel: Arc<dyn Channel>, requests: &[HashRoot]) -> bool {
        debug_assert!(
            self.representatives.has_voting_representative(),
            "add() is only called when this node votes as a representative"
        );

        let now = Instant::now();
        let mut table = self.inner.table.lock();

        if let Some(earliest) = table.earliest_deadline() {
            if now.saturating_duration_since(earliest) >= self.config.backlog_dam() {
                self.metrics.aggregator_dropped.inc();
                tracing::debug!(error = %AggregatorError::Dropped, "backlog dam tripped");
                return false;
            }
        }

        let entries: Vec<_> = requests.iter().map(|hr| (hr.hash, hr.root)).collect();
        let accepted = table.add(
            channel,
            &entries,
            now,
            self.config.max_delay,
            self.config.small_delay,
            self.config.max_channel_requests,
        );

        if accepted {
            self.metrics.aggregator_accepted.inc();
            self.metrics.pool_count.set(table.len() as i64);
            drop(table);
            self.inner.notify.notify_one();
        } else {
            self.metrics.aggregator_dropped.inc();
            tracing::debug!(error = %AggregatorError::Dropped, "pool at capacity, call rejected");
        }

        accepted
    }

    async fn run(self: Arc<Self>) {
        loop {
            if self.inner.stopped.load(std::sync::atomic::Ordering::SeqCst) {
                return;
            }

            let due = {
                let table = self.inner.table.lock();
                table.earliest_deadline()
            };

            match due {
                None => {
                    self.inner.notify.notified().await;
                    continue;
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if deadline > now {
                        tokio::select! {
                            _ = tokio::time::sleep(deadline - now) => {}
                            _ = self.inner.notify.notified() => {}
                        }
                        continue;
                    }
                }
            }

            let drained = self.inner.table.lock().take_earliest();
            let Some((_endpoint, pool)) = drained else { continue };

            self.metrics.pool_count.set(self.inner.table.lock().len() as i64);
            self.process_pool(pool).await;
        }
    }

    async fn process_pool(&self, pool: crate::pool::ChannelPool) {
        let txn = self.store.begin_read();
        let outcome = aggregate(&txn, self.vote_cache.as_ref(), &pool.hashes_roots, &self.metrics);
        drop(txn);

        for hash in outcome.to_publish {
            if pool.channel.send_publish(hash).await.is_err() {
                tracing::debug!(
                    endpoint = %pool.channel.endpoint(),
                    error = %AggregatorError::SendFailed,
                    "publish send failed"
                );
            }
        }

        for vote in outcome.cached_votes {
            if pool.channel.send_confirm_ack(vote).await.is_err() {
                tracing::debug!(
                    endpoint = %pool.channel.endpoint(),
                    error = %AggregatorError::SendFailed,
                    "confirm_ack send failed"
                );
            }
        }

        if !outcome.to_generate.is_empty() {
            let txn = self.store.begin_read();
            generate_votes(
                &txn,
                self.representatives.as_ref(),
                self.vote_cache.as_ref(),
                &pool.channel,
                outcome.to_generate,
                self.config.confirm_ack_hashes_max,
                &self.metrics,
            )
            .await;
        }
    }
}
