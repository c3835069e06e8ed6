use chrono::{DateTime, Utc};
use getset::Getters;
use serde::Deserialize;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct WorkerNode {
    pub id: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Number(f64),
    Text(String),
    /// Numeric values broken down by a label, e.g. log size per topic.
    Labeled(BTreeMap<String, f64>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeStatus {
    Reachable,
    TimedOut,
    Error(String),
}

/// Payload a worker node returns for one collection request.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeReport {
    pub reported_at: DateTime<Utc>,
    pub metrics: BTreeMap<String, MetricValue>,
}

/// What one worker node contributed to a collection job.
#[derive(Debug, Clone, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct WorkNodeMetrics {
    node_id: String,
    reported_at: DateTime<Utc>,
    metrics: BTreeMap<String, MetricValue>,
    status: NodeStatus,
}

impl WorkNodeMetrics {
    pub fn reachable(node_id: String, report: NodeReport) -> Self {
        Self {
            node_id,
            reported_at: report.reported_at,
            metrics: report.metrics,
            status: NodeStatus::Reachable,
        }
    }

    pub fn timed_out(node_id: String) -> Self {
        Self {
            node_id,
            reported_at: Utc::now(),
            metrics: BTreeMap::new(),
            status: NodeStatus::TimedOut,
        }
    }

    pub fn failed(node_id: String, reason: String) -> Self {
        Self {
            node_id,
            reported_at: Utc::now(),
            metrics: BTreeMap::new(),
            status: NodeStatus::Error(reason),
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.status == NodeStatus::Reachable
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRequest {
    pub cluster_alias: String,
    pub correlation_id: Uuid,
}

impl CollectionRequest {
    pub fn new(cluster_alias: String) -> Self {
        Self {
            cluster_alias,
            correlation_id: Uuid::now_v7(),
        }
    }
}

/// One fan-out over the worker nodes of a cluster.
#[derive(Debug)]
pub struct CollectionJob {
    pub request: CollectionRequest,
    /// Unique by node id, ordered by node id.
    pub targets: Vec<WorkerNode>,
    pub deadline: Instant,
}

impl CollectionJob {
    pub fn new(cluster_alias: String, workers: Vec<WorkerNode>, timeout: Duration) -> Self {
        let mut seen = BTreeSet::new();
        let mut targets = workers
            .into_iter()
            .filter(|worker| seen.insert(worker.id.clone()))
            .collect::<Vec<_>>();
        targets.sort_by(|a, b| a.id.cmp(&b.id));

        Self {
            request: CollectionRequest::new(cluster_alias),
            targets,
            deadline: Instant::now() + timeout,
        }
    }
}

/// Merged result of one collection job, one entry per targeted node.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterMetrics {
    pub cluster_alias: String,
    pub correlation_id: Option<Uuid>,
    pub collected_at: DateTime<Utc>,
    pub nodes: Vec<WorkNodeMetrics>,
}

impl ClusterMetrics {
    pub fn empty(cluster_alias: String) -> Self {
        Self {
            cluster_alias,
            correlation_id: None,
            collected_at: Utc::now(),
            nodes: Vec::new(),
        }
    }

    pub fn timed_out_nodes(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|node| *node.status() == NodeStatus::TimedOut)
            .map(|node| node.node_id().as_str())
            .collect()
    }

    pub fn failed_nodes(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|node| matches!(node.status(), NodeStatus::Error(_)))
            .map(|node| node.node_id().as_str())
            .collect()
    }

    pub fn reachable_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_reachable()).count()
    }

    /// True when at least one node did not deliver its metrics.
    pub fn is_partial(&self) -> bool {
        self.reachable_count() < self.nodes.len()
    }

    /// Cluster-wide values summed over reachable nodes. Text metrics are not aggregated.
    pub fn totals(&self) -> BTreeMap<String, MetricValue> {
        let mut totals = BTreeMap::new();

        for (name, value) in self
            .nodes
            .iter()
            .filter(|node| node.is_reachable())
            .flat_map(|node| node.metrics().iter())
        {
            match (totals.entry(name.clone()), value) {
                (_, MetricValue::Text(_)) => {}
                (Entry::Vacant(slot), value) => {
                    slot.insert(value.clone());
                }
                (Entry::Occupied(mut slot), MetricValue::Number(number)) => {
                    if let MetricValue::Number(total) = slot.get_mut() {
                        *total += number;
                    }
                }
                (Entry::Occupied(mut slot), MetricValue::Labeled(values)) => {
                    if let MetricValue::Labeled(total) = slot.get_mut() {
                        for (label, number) in values {
                            *total.entry(label.clone()).or_default() += number;
                        }
                    }
                }
            }
        }

        totals
    }
}
