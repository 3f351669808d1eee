//! The telemetry cache: rolling probe loop, in-flight tracking, and callback fan-out.

use crate::{
    config::TelemetryCacheConfig,
    entity::{TelemetryCallback, TelemetryInfo},
};
use consensus_metrics::TelemetryMetrics;
use parking_lot::Mutex;
use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Weak,
    },
    time::{Duration, Instant},
};
use tn_network::{Channel, LocalTelemetrySource, PeerRegistry};
use tn_types::{error::TelemetryError, Endpoint, TelemetryData};
use tokio::{sync::oneshot, task::JoinHandle};

#[derive(Default)]
struct State {
    entries: HashMap<Endpoint, TelemetryInfo>,
    by_last_request: BTreeSet<(Instant, Endpoint)>,
    callbacks: HashMap<Endpoint, Vec<TelemetryCallback>>,
}

impl State {
    fn reindex_last_request(&mut self, endpoint: Endpoint, old: Option<Instant>, new: Instant) {
        if let Some(old) = old {
            self.by_last_request.remove(&(old, endpoint));
        }
        self.by_last_request.insert((new, endpoint));
    }

    fn remove(&mut self, endpoint: &Endpoint) {
        if let Some(info) = self.entries.remove(endpoint) {
            self.by_last_request.remove(&(info.last_request, *endpoint));
        }
    }
}

/// Issues outbound telemetry probes on a rolling schedule, dedupes in-flight requests per
/// endpoint, and fans cached or fresh results out to every waiting caller.
pub struct TelemetryCache<P> {
    state: Mutex<State>,
    config: TelemetryCacheConfig,
    peer_registry: Arc<P>,
    local_source: Arc<dyn LocalTelemetrySource>,
    metrics: Arc<TelemetryMetrics>,
    stopped: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// A non-owning handle to self, so the probe loop and per-probe timeout alarms can be armed
    /// from `&self` without requiring an `Arc<Self>` receiver.
    self_weak: Weak<Self>,
}

/// Diagnostic counts for metrics/introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryDiagnostics {
    pub entries: usize,
    pub callbacks: usize,
}

impl<P> TelemetryCache<P>
where
    P: PeerRegistry + 'static,
{
    pub fn new(
        config: TelemetryCacheConfig,
        peer_registry: Arc<P>,
        local_source: Arc<dyn LocalTelemetrySource>,
        metrics: Arc<TelemetryMetrics>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_weak| Self {
            state: Mutex::new(State::default()),
            config,
            peer_registry,
            local_source,
            metrics,
            stopped: AtomicBool::new(false),
            worker: Mutex::new(None),
            self_weak: self_weak.clone(),
        })
    }

    /// Arms the rolling probe loop. Must be called after construction, since the loop runs via a
    /// `Weak<Self>` rather than owning the cache outright.
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        let weak = self.self_weak.clone();
        *worker = Some(tokio::spawn(async move { Self::probe_loop(weak).await }));
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
        }
    }

    /// This node's own telemetry snapshot, used to answer an inbound `telemetry_req`.
    pub fn local_telemetry(&self) -> TelemetryData {
        self.local_source.local_telemetry()
    }

    /// Snapshot of endpoint -> data for every entry within the cache cutoff.
    pub fn get_metrics(&self) -> HashMap<Endpoint, TelemetryData> {
        let now = Instant::now();
        let state = self.state.lock();
        state
            .entries
            .iter()
            .filter(|(_, info)| info.is_fresh(now, self.config.cache_cutoff))
            .map(|(endpoint, info)| (*endpoint, info.data.clone()))
            .collect()
    }

    /// Sums the live callback table rather than a throwaway local, so the reported count reflects
    /// callbacks actually queued.
    pub fn snapshot_diagnostics(&self) -> TelemetryDiagnostics {
        let state = self.state.lock();
        let callbacks = state.callbacks.values().map(Vec::len).sum();
        self.metrics.cache_size.set(state.entries.len() as i64);
        self.metrics.pending_callbacks.set(callbacks as i64);
        TelemetryDiagnostics { entries: state.entries.len(), callbacks }
    }

    /// Synchronous adapter over [`Self::get_metrics_single_peer_async`].
    pub async fn get_metrics_single_peer(&self, channel: Arc<dyn Channel>) -> (TelemetryData, bool) {
        let (tx, rx) = oneshot::channel();
        self.get_metrics_single_peer_async(
            channel,
            Box::new(move |data, error| {
                let _ = tx.send((data, error));
            }),
        );
        rx.await.unwrap_or((TelemetryData::default(), true))
    }

    /// Requests telemetry for one peer, merging with any request already in flight.
    pub fn get_metrics_single_peer_async(&self, channel: Arc<dyn Channel>, callback: TelemetryCallback) {
        if channel.protocol_version() < self.config.telemetry_protocol_version_min {
            tracing::debug!(
                endpoint = %channel.endpoint(),
                error = %TelemetryError::BelowProtocol,
                "telemetry request rejected"
            );
            callback(TelemetryData::default(), true);
            return;
        }

        let endpoint = channel.endpoint();
        let now = Instant::now();
        let mut fire_probe = false;
        let mut round = 0;

        {
            let mut state = self.state.lock();

            if let Some(info) = state.entries.get(&endpoint) {
                if info.is_fresh(now, self.config.cache_cutoff) {
                    let data = info.data.clone();
                    drop(state);
                    callback(data, false);
                    return;
                }
                if info.undergoing_request {
                    state.callbacks.entry(endpoint).or_default().push(callback);
                    return;
                }
            }

            let old_last_request = state.entries.get(&endpoint).map(|i| i.last_request);
            let entry = state.entries.entry(endpoint).or_insert_with(|| TelemetryInfo::new(now));
            entry.undergoing_request = true;
            entry.last_request = now;
            entry.round += 1;
            round = entry.round;
            state.reindex_last_request(endpoint, old_last_request, now);
            state.callbacks.entry(endpoint).or_default().push(callback);
            fire_probe = true;
        }

        if fire_probe {
            self.fire_request_message(channel, round);
        }
    }

    /// Sends the probe and arms its send-result and timeout callbacks.
    fn fire_request_message(&self, channel: Arc<dyn Channel>, round: u64) {
        let endpoint = channel.endpoint();
        self.metrics.probes_sent.inc();

        let send_fut = channel.send_telemetry_req();
        let this = self.self_weak.upgrade().expect("cache outlives its own probes");
        tokio::spawn(async move {
            if send_fut.await.is_err() {
                tracing::debug!(
                    endpoint = %endpoint,
                    error = %TelemetryError::SendFailed,
                    "telemetry probe send failed"
                );
                this.metrics.probes_errored.inc();
                this.channel_processed(endpoint, true);
            }
        });

        let weak = self.self_weak.clone();
        let timeout = self.config.response_time_cutoff;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(this) = weak.upgrade() else { return };
            if this.stopped.load(Ordering::SeqCst) {
                return;
            }
            let still_pending = {
                let state = this.state.lock();
                state
                    .entries
                    .get(&endpoint)
                    .is_some_and(|info| info.undergoing_request && info.round == round)
            };
            if still_pending {
                tracing::debug!(endpoint = %endpoint, error = %TelemetryError::Timeout, "telemetry probe timed out");
                this.metrics.probes_timed_out.inc();
                this.channel_processed(endpoint, true);
            }
        });
    }

    /// Delivers a received telemetry reply into the cache.
    pub fn set(&self, data: TelemetryData, endpoint: Endpoint, is_empty: bool) {
        let updated = {
            let mut state = self.state.lock();
            match state.entries.get_mut(&endpoint) {
                Some(info) => {
                    info.data = data;
                    info.undergoing_request = false;
                    true
                }
                None => false,
            }
        };

        if updated {
            self.channel_processed(endpoint, is_empty);
        }
    }

    /// Removes the entry on error, then drains and invokes every callback waiting on `endpoint`.
    fn channel_processed(&self, endpoint: Endpoint, error: bool) {
        if error {
            self.state.lock().remove(&endpoint);
        }
        self.invoke_callbacks(endpoint, error);
    }

    /// Moves the callback list out from under the lock, then invokes each callback with the lock
    /// released, preventing reentrancy deadlocks with callers that call back into this cache.
    fn invoke_callbacks(&self, endpoint: Endpoint, error: bool) {
        let (data, callbacks) = {
            let mut state = self.state.lock();
            let data = state.entries.get(&endpoint).map(|i| i.data.clone()).unwrap_or_default();
            let callbacks = state.callbacks.remove(&endpoint).unwrap_or_default();
            (data, callbacks)
        };

        for callback in callbacks {
            callback(data.clone(), error);
        }
    }

    async fn probe_loop(weak: Weak<Self>) {
        loop {
            let Some(this) = weak.upgrade() else { return };
            if this.stopped.load(Ordering::SeqCst) {
                return;
            }

            let wait = this.tick();
            drop(this);

            tokio::time::sleep(wait).await;
        }
    }

    /// One iteration of the rolling probe sweep: prunes stale, disconnected entries, probes every
    /// connected non-fresh peer, and returns how long to sleep before the next tick.
    fn tick(&self) -> Duration {
        let now = Instant::now();
        let peers = self.peer_registry.connected_channels();
        let eligible: Vec<Arc<dyn Channel>> = peers
            .into_iter()
            .filter(|c| c.protocol_version() >= self.config.telemetry_protocol_version_min)
            .collect();
        let present: std::collections::HashSet<Endpoint> =
            eligible.iter().map(|c| c.endpoint()).collect();

        {
            let mut state = self.state.lock();
            let stale: Vec<Endpoint> = state
                .entries
                .iter()
                .filter(|(endpoint, info)| {
                    !info.undergoing_request
                        && !info.is_fresh(now, self.config.cache_cutoff)
                        && !present.contains(endpoint)
                })
                .map(|(endpoint, _)| *endpoint)
                .collect();
            for endpoint in stale {
                state.remove(&endpoint);
            }
        }

        for channel in eligible {
            let endpoint = channel.endpoint();
            let fresh = {
                let state = self.state.lock();
                state.entries.get(&endpoint).is_some_and(|i| i.is_fresh(now, self.config.cache_cutoff))
            };
            if !fresh {
                self.get_metrics_single_peer_async(channel, Box::new(|_, _| {}));
            }
        }

        // The earliest-pending entry must never push the next wait negative; clamp at zero
        // rather than underflowing the subtraction.
        let earliest = self.state.lock().by_last_request.iter().next().map(|(when, _)| *when);
        match earliest {
            Some(last_request) => {
                let elapsed = now.saturating_duration_since(last_request);
                self.config.cache_cutoff.saturating_sub(elapsed)
            }
            None => self.config.cache_cutoff,
        }
    }
}
