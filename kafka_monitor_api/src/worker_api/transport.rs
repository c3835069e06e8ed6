use crate::worker_api::proto::WorkerAgentClient;
use crate::worker_api::{collection_request_to_proto, proto_response_to_node_report};
use async_trait::async_trait;
use kafka_monitor::jobs::{CollectionRequest, NodeReport, TransportError, WorkerNode, WorkerTransport};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tonic::Code;
use tracing::debug;

/// Talks to worker agents over gRPC, one lazily connected channel per address.
pub struct GrpcWorkerTransport {
    connect_timeout: Duration,
    channels: Mutex<HashMap<String, Channel>>,
}

impl GrpcWorkerTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            channels: Mutex::new(HashMap::new()),
        }
    }

    fn channel(&self, address: &str) -> Result<Channel, TransportError> {
        let mut channels = self.channels.lock();
        if let Some(channel) = channels.get(address) {
            return Ok(channel.clone());
        }

        let channel = Endpoint::from_shared(format!("http://{address}"))
            .map_err(|e| TransportError::Unreachable(format!("Invalid address {address}: {e}")))?
            .connect_timeout(self.connect_timeout)
            .connect_lazy();

        debug!("Opened channel to worker at {}", address);
        channels.insert(address.to_owned(), channel.clone());

        Ok(channel)
    }
}

#[async_trait]
impl WorkerTransport for GrpcWorkerTransport {
    async fn collect(
        &self,
        node: &WorkerNode,
        request: &CollectionRequest,
    ) -> Result<NodeReport, TransportError> {
        let mut client = WorkerAgentClient::new(self.channel(&node.address)?);

        let response = client
            .collect_metrics(collection_request_to_proto(request))
            .await
            .map_err(|status| match status.code() {
                Code::Unavailable | Code::DeadlineExceeded | Code::Cancelled => {
                    TransportError::Unreachable(status.message().to_owned())
                }
                _ => TransportError::Rejected(format!("{:?}: {}", status.code(), status.message())),
            })?;

        proto_response_to_node_report(response.into_inner())
    }
}
