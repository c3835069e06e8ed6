use crate::error::ApplicationError;
use crate::worker_api::{node_report_to_proto_response, proto, proto_collect_metrics_to_internal};
use kafka_monitor::agent::LocalMetricsCollector;
use kafka_monitor::metadata::{ClientFactory, MetadataError, RdKafkaClientFactory};
use tonic::{Request, Response, Status};
use tracing::debug;

/// Agent a worker node runs so the master can ask it for local metrics.
pub struct WorkerAgentService<F = RdKafkaClientFactory> {
    node_id: String,
    collector: LocalMetricsCollector<F>,
}

impl<F: ClientFactory> WorkerAgentService<F> {
    pub fn new(node_id: String, collector: LocalMetricsCollector<F>) -> Self {
        Self { node_id, collector }
    }
}

#[tonic::async_trait]
impl<F: ClientFactory> proto::WorkerAgent for WorkerAgentService<F> {
    #[tracing::instrument(skip_all)]
    async fn collect_metrics(
        &self,
        request: Request<proto::CollectMetricsRequest>,
    ) -> Result<Response<proto::CollectMetricsResponse>, Status> {
        debug!("New request: {:?}", request);

        let request = proto_collect_metrics_to_internal(request.into_inner())
            .map_err(ApplicationError::InvalidArgument)?;

        if request.cluster_alias != self.collector.cluster_alias() {
            return Err(ApplicationError::UnknownCluster(request.cluster_alias).into());
        }

        let report = self.collector.collect().await.map_err(|e| match e {
            MetadataError::UnknownCluster(alias) => ApplicationError::UnknownCluster(alias),
            e => ApplicationError::Unavailable(e),
        })?;

        debug!(
            "Answering request {} with {} metrics",
            request.correlation_id,
            report.metrics.len()
        );

        Ok(Response::new(node_report_to_proto_response(
            self.node_id.clone(),
            report,
        )))
    }
}
