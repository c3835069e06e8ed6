use crate::jobs::{CollectionRequest, NodeReport, TransportError, WorkerNode};
use async_trait::async_trait;

/// Request/response channel to worker node agents. Implementations do not
/// need their own deadline handling; the job client bounds every call.
#[async_trait]
pub trait WorkerTransport: Send + Sync {
    async fn collect(
        &self,
        node: &WorkerNode,
        request: &CollectionRequest,
    ) -> Result<NodeReport, TransportError>;
}
