use crate::app_config::{AppConfig, Role, WorkerConfig};
use crate::worker_api;
use crate::worker_api::{GrpcWorkerTransport, WorkerAgentService};
use anyhow::Context;
use kafka_monitor::agent::LocalMetricsCollector;
use kafka_monitor::jobs::JobClient;
use kafka_monitor::metadata::{MetadataFetcher, RdKafkaClientFactory};
use kafka_monitor::service::{metadata_cache, metrics_cache, MonitorService};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::{error, info};

pub async fn run_until_stopped(config: AppConfig) -> Result<(), anyhow::Error> {
    match config.role {
        Role::Master => run_master(config).await,
        Role::Worker => run_worker(config).await,
    }
}

async fn run_master(config: AppConfig) -> Result<(), anyhow::Error> {
    let fetcher = MetadataFetcher::new(
        Arc::new(config.cluster_registry()),
        RdKafkaClientFactory,
        config.kafka_call_timeout(),
    );
    let job_client = JobClient::new(
        Arc::new(config.worker_directory()),
        Arc::new(GrpcWorkerTransport::new(config.connect_timeout())),
        config.job_settings(),
    );

    let metadata_cache = metadata_cache(config.cache.capacity, config.cache.ttl())
        .context("While creating metadata cache")?;
    let metrics_cache = metrics_cache(config.metrics_cache.capacity, config.metrics_cache.ttl())
        .context("While creating metrics cache")?;

    let service = Arc::new(MonitorService::new(
        Arc::new(metadata_cache),
        Arc::new(metrics_cache),
        fetcher,
        job_client,
    ));

    let cancellation_token = CancellationToken::new();
    let sweepers = service.spawn_sweepers(config.cache.sweep_interval(), cancellation_token.clone());
    let refresher = tokio::spawn(refresh_until_cancelled(
        service.clone(),
        config.refresh_interval(),
        cancellation_token.clone(),
    ));

    info!("Master started for clusters {:?}", service.cluster_aliases());

    tokio::signal::ctrl_c()
        .await
        .context("While waiting for shutdown signal")?;
    info!("Shutting down");

    cancellation_token.cancel();
    for handle in sweepers.into_iter().chain(std::iter::once(refresher)) {
        if let Err(e) = handle.await {
            error!("Background task failed: {e}");
        }
    }

    Ok(())
}

/// Keeps the caches of every configured cluster warm.
async fn refresh_until_cancelled(
    service: Arc<MonitorService>,
    interval: std::time::Duration,
    cancellation_token: CancellationToken,
) {
    let mut interval = tokio::time::interval(interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancellation_token.cancelled() => break,
            _ = interval.tick() => {}
        }

        for alias in service.cluster_aliases() {
            let refresh = async {
                match service.get_brokers(&alias).await {
                    Ok(snapshot) => info!(
                        "Cluster {}: {} brokers, {} topics, {} under-replicated partitions",
                        alias,
                        snapshot.brokers.len(),
                        snapshot.topics.len(),
                        snapshot.under_replicated_partitions()
                    ),
                    Err(e) => error!("Could not refresh metadata of cluster {}: {}", alias, e),
                }

                let metrics = service.get_cluster_metrics(&alias).await;
                info!(
                    "Cluster {}: {}/{} worker nodes reachable",
                    alias,
                    metrics.reachable_count(),
                    metrics.nodes.len()
                );
            };

            tokio::select! {
                _ = cancellation_token.cancelled() => return,
                _ = refresh => {}
            }
        }
    }
}

async fn run_worker(config: AppConfig) -> Result<(), anyhow::Error> {
    let WorkerConfig {
        host,
        port,
        node_id,
        cluster_alias,
        local_broker_ids,
    } = config
        .worker
        .clone()
        .context("Worker role requires a [worker] section")?;

    let address: SocketAddr = format!("{host}:{port}")
        .parse()
        .context("While parsing socket address")?;

    let fetcher = MetadataFetcher::new(
        Arc::new(config.cluster_registry()),
        RdKafkaClientFactory,
        config.kafka_call_timeout(),
    );
    let collector = LocalMetricsCollector::new(cluster_alias, local_broker_ids, fetcher);

    let reflection = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(worker_api::proto::FILE_DESCRIPTOR_SET)
        .build_v1alpha()
        .context("While building reflection service")?;

    info!("Worker {node_id} listening {address}");

    Server::builder()
        .add_service(reflection)
        .add_service(worker_api::proto::WorkerAgentServer::new(
            WorkerAgentService::new(node_id, collector),
        ))
        .serve_with_shutdown(address, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Could not listen for shutdown signal: {e}");
            }
        })
        .await
        .context("While serving worker agent")?;

    Ok(())
}
