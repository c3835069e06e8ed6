use crate::cache::{spawn_sweeper, CacheError, ExpiringLruCache, LoadingCache, MetadataCache};
use crate::jobs::{ClusterMetrics, DispatchError, JobClient};
use crate::metadata::{ClientFactory, ClusterSnapshot, MetadataError, MetadataFetcher, RdKafkaClientFactory};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Merged worker metrics keyed by cluster alias.
pub type MetricsCache = LoadingCache<String, ClusterMetrics, DispatchError>;

pub fn metadata_cache(capacity: usize, ttl: Duration) -> Result<MetadataCache, CacheError> {
    let entries = ExpiringLruCache::new(capacity, ttl)?.named("metadata");
    Ok(LoadingCache::new(entries))
}

/// Views with missing nodes are served but not kept, so the next read asks the workers again.
pub fn metrics_cache(capacity: usize, ttl: Duration) -> Result<MetricsCache, CacheError> {
    let entries = ExpiringLruCache::new(capacity, ttl)?.named("metrics");
    Ok(LoadingCache::new(entries).with_admission(|metrics| !metrics.is_partial()))
}

/// Cache-first entry point for dashboard reads.
pub struct MonitorService<F = RdKafkaClientFactory> {
    metadata_cache: Arc<MetadataCache>,
    metrics_cache: Arc<MetricsCache>,
    fetcher: MetadataFetcher<F>,
    job_client: JobClient,
}

impl<F: ClientFactory> MonitorService<F> {
    pub fn new(
        metadata_cache: Arc<MetadataCache>,
        metrics_cache: Arc<MetricsCache>,
        fetcher: MetadataFetcher<F>,
        job_client: JobClient,
    ) -> Self {
        Self {
            metadata_cache,
            metrics_cache,
            fetcher,
            job_client,
        }
    }

    pub fn cluster_aliases(&self) -> Vec<String> {
        self.fetcher.clusters().aliases()
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_brokers(&self, cluster_alias: &str) -> Result<Arc<ClusterSnapshot>, MetadataError> {
        self.metadata_cache
            .get_or_load(cluster_alias.to_owned(), || {
                self.fetcher.fetch_snapshot(cluster_alias)
            })
            .await
    }

    /// Never fails: when no job can run the result is an empty view.
    #[tracing::instrument(skip(self))]
    pub async fn get_cluster_metrics(&self, cluster_alias: &str) -> Arc<ClusterMetrics> {
        let result = self
            .metrics_cache
            .get_or_load(cluster_alias.to_owned(), || self.job_client.collect(cluster_alias))
            .await;

        match result {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!("Serving empty metrics for cluster {}: {}", cluster_alias, e);
                Arc::new(ClusterMetrics::empty(cluster_alias.to_owned()))
            }
        }
    }

    pub fn invalidate(&self, cluster_alias: &str) {
        let key = cluster_alias.to_owned();
        let metadata = self.metadata_cache.invalidate(&key);
        let metrics = self.metrics_cache.invalidate(&key);
        info!(
            "Invalidated cluster {} (metadata: {}, metrics: {})",
            cluster_alias, metadata, metrics
        );
    }

    pub fn spawn_sweepers(
        &self,
        interval: Duration,
        cancellation_token: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        vec![
            spawn_sweeper(self.metadata_cache.clone(), interval, cancellation_token.clone()),
            spawn_sweeper(self.metrics_cache.clone(), interval, cancellation_token),
        ]
    }
}
