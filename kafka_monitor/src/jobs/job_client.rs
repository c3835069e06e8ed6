use crate::jobs::{
    ClusterMetrics, CollectionJob, DispatchError, NodeReport, TransportError, WorkNodeMetrics,
    WorkerDirectory, WorkerNode, WorkerTransport,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
pub struct JobSettings {
    /// Upper bound for a whole collection job.
    pub deadline: Duration,
    /// Upper bound for a single worker request.
    pub request_timeout: Duration,
}

type NodeOutcome = (WorkerNode, Result<Result<NodeReport, TransportError>, tokio::time::error::Elapsed>);

/// Fans metric collection out to the worker nodes of a cluster and merges
/// whatever comes back before the deadline.
///
/// Dropping the future returned by [`JobClient::collect`] aborts the requests
/// that are still running.
#[derive(Clone)]
pub struct JobClient {
    directory: Arc<dyn WorkerDirectory>,
    transport: Arc<dyn WorkerTransport>,
    settings: JobSettings,
}

impl JobClient {
    pub fn new(
        directory: Arc<dyn WorkerDirectory>,
        transport: Arc<dyn WorkerTransport>,
        settings: JobSettings,
    ) -> Self {
        Self {
            directory,
            transport,
            settings,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn collect(&self, cluster_alias: &str) -> Result<ClusterMetrics, DispatchError> {
        let workers = self.directory.workers_for(cluster_alias).await;
        if workers.is_empty() {
            warn!("No worker nodes configured for cluster {}", cluster_alias);
            return Err(DispatchError::NoWorkersAvailable(cluster_alias.to_owned()));
        }

        let job = CollectionJob::new(cluster_alias.to_owned(), workers, self.settings.deadline);
        debug!(
            "Dispatching job {} to {} worker nodes",
            job.request.correlation_id,
            job.targets.len()
        );

        let mut requests = JoinSet::new();
        for node in job.targets.iter().cloned() {
            let transport = self.transport.clone();
            let request = job.request.clone();
            let request_timeout = self.settings.request_timeout;

            requests.spawn(async move {
                let outcome =
                    tokio::time::timeout(request_timeout, transport.collect(&node, &request)).await;
                (node, outcome)
            });
        }

        let mut received = HashMap::with_capacity(job.targets.len());
        loop {
            match tokio::time::timeout_at(job.deadline, requests.join_next()).await {
                Ok(Some(Ok(outcome))) => {
                    let metrics = node_outcome_to_metrics(outcome);
                    received.insert(metrics.node_id().clone(), metrics);
                }
                Ok(Some(Err(join_error))) => {
                    warn!("Worker request task failed: {}", join_error);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Job {} reached its deadline with {} requests pending",
                        job.request.correlation_id,
                        requests.len()
                    );
                    break;
                }
            }
        }
        requests.abort_all();

        let nodes = job
            .targets
            .iter()
            .map(|node| {
                received
                    .remove(&node.id)
                    .unwrap_or_else(|| WorkNodeMetrics::timed_out(node.id.clone()))
            })
            .collect::<Vec<_>>();

        let metrics = ClusterMetrics {
            cluster_alias: job.request.cluster_alias,
            correlation_id: Some(job.request.correlation_id),
            collected_at: Utc::now(),
            nodes,
        };

        info!(
            "Collected metrics of cluster {}: {}/{} nodes reachable",
            metrics.cluster_alias,
            metrics.reachable_count(),
            metrics.nodes.len()
        );

        Ok(metrics)
    }
}

fn node_outcome_to_metrics((node, outcome): NodeOutcome) -> WorkNodeMetrics {
    match outcome {
        Ok(Ok(report)) => WorkNodeMetrics::reachable(node.id, report),
        Ok(Err(e)) => {
            warn!("Worker node {} at {} failed: {}", node.id, node.address, e);
            WorkNodeMetrics::failed(node.id, e.to_string())
        }
        Err(_) => {
            warn!("Worker node {} at {} did not answer in time", node.id, node.address);
            WorkNodeMetrics::timed_out(node.id)
        }
    }
}
