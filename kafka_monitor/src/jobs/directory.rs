use crate::jobs::WorkerNode;
use async_trait::async_trait;
use std::collections::HashMap;

/// Resolves which worker nodes serve a cluster.
#[async_trait]
pub trait WorkerDirectory: Send + Sync {
    async fn workers_for(&self, cluster_alias: &str) -> Vec<WorkerNode>;
}

/// Worker nodes fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticWorkerDirectory {
    workers: HashMap<String, Vec<WorkerNode>>,
}

impl StaticWorkerDirectory {
    pub fn new(workers: HashMap<String, Vec<WorkerNode>>) -> Self {
        Self { workers }
    }
}

#[async_trait]
impl WorkerDirectory for StaticWorkerDirectory {
    async fn workers_for(&self, cluster_alias: &str) -> Vec<WorkerNode> {
        self.workers.get(cluster_alias).cloned().unwrap_or_default()
    }
}
