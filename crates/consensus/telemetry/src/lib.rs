//! Outbound telemetry probing, in-flight request tracking, and statistical consolidation of
//! peer-reported telemetry into one representative record.

mod cache;
mod config;
mod consolidate;
mod entity;

pub use cache::{TelemetryCache, TelemetryDiagnostics};
pub use config::TelemetryCacheConfig;
pub use consolidate::consolidate;
pub use entity::{TelemetryCallback, TelemetryInfo};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tn_network::LocalTelemetrySource;
    use tn_test_utils::{fake_channel, telemetry, FakePeerRegistry};
    use tn_types::TelemetryData;

    struct FixedLocalTelemetry(TelemetryData);

    impl LocalTelemetrySource for FixedLocalTelemetry {
        fn local_telemetry(&self) -> TelemetryData {
            self.0.clone()
        }
    }

    fn new_cache(
        config: TelemetryCacheConfig,
    ) -> Arc<TelemetryCache<FakePeerRegistry>> {
        TelemetryCache::new(
            config,
            Arc::new(FakePeerRegistry::default()),
            Arc::new(FixedLocalTelemetry(TelemetryData::default())),
            Arc::new(consensus_metrics::TelemetryMetrics::new(&consensus_metrics::test_registry()).unwrap()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_reply_is_cached_until_cutoff() {
        let cache = new_cache(TelemetryCacheConfig::test());
        let (channel, _rx) = fake_channel(std::time::Instant::now());
        let endpoint = channel.endpoint();

        cache.get_metrics_single_peer_async(channel, Box::new(|_, _| {}));
        cache.set(telemetry(10, 5), endpoint, false);

        assert!(cache.get_metrics().contains_key(&endpoint));

        tokio::time::advance(TelemetryCacheConfig::test().cache_cutoff + std::time::Duration::from_millis(1))
            .await;
        assert!(!cache.get_metrics().contains_key(&endpoint));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_delivers_error_and_evicts_entry() {
        let config = TelemetryCacheConfig::test();
        let cache = new_cache(config);
        let (channel, _rx) = fake_channel(std::time::Instant::now());

        let (tx, rx) = tokio::sync::oneshot::channel();
        cache.get_metrics_single_peer_async(
            channel,
            Box::new(move |data, error| {
                let _ = tx.send((data, error));
            }),
        );

        tokio::time::advance(config.response_time_cutoff + std::time::Duration::from_millis(1)).await;
        tokio::task::yield_now().await;

        let (_data, error) = rx.await.unwrap();
        assert!(error);
        assert_eq!(cache.snapshot_diagnostics().entries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_to_same_endpoint_share_one_probe() {
        let cache = new_cache(TelemetryCacheConfig::test());
        let (channel, mut rx) = fake_channel(std::time::Instant::now());
        let endpoint = channel.endpoint();

        let results = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for _ in 0..3 {
            let results = results.clone();
            cache.get_metrics_single_peer_async(
                channel.clone(),
                Box::new(move |data, error| results.lock().push((data, error))),
            );
        }

        tokio::task::yield_now().await;
        let sent = rx.try_recv();
        assert!(sent.is_ok(), "exactly one probe should have been sent");
        assert!(rx.try_recv().is_err(), "only one probe for three merged callers");

        cache.set(telemetry(7, 2), endpoint, false);
        assert_eq!(results.lock().len(), 3);
    }
}
