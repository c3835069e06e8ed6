use crate::jobs::{MetricValue, NodeReport};
use crate::metadata::{
    CallBudget, ClientFactory, MetadataClient, MetadataError, MetadataFetcher, PartitionInfo,
    RdKafkaClientFactory,
};
use chrono::Utc;
use rayon::prelude::*;
use rdkafka::error::KafkaResult;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

pub const BROKERS_ONLINE: &str = "brokers.online";
pub const PARTITIONS_LED: &str = "partitions.led";
pub const PARTITIONS_UNDER_REPLICATED: &str = "partitions.under_replicated";
pub const PARTITIONS_OFFLINE: &str = "partitions.offline";
pub const TOPICS_LOG_SIZE: &str = "topics.log_size";

/// Computes the metrics a worker node reports for the brokers it runs next to.
///
/// Every partition is accounted to exactly one worker: the one co-located with
/// its leader, or with its first replica when it has no leader. Summing the
/// reports of all workers therefore gives cluster-wide numbers.
pub struct LocalMetricsCollector<F = RdKafkaClientFactory> {
    cluster_alias: String,
    local_broker_ids: BTreeSet<i32>,
    fetcher: MetadataFetcher<F>,
}

impl<F: ClientFactory> LocalMetricsCollector<F> {
    pub fn new(
        cluster_alias: String,
        local_broker_ids: BTreeSet<i32>,
        fetcher: MetadataFetcher<F>,
    ) -> Self {
        Self {
            cluster_alias,
            local_broker_ids,
            fetcher,
        }
    }

    pub fn cluster_alias(&self) -> &str {
        &self.cluster_alias
    }

    #[tracing::instrument(skip(self), fields(cluster = %self.cluster_alias))]
    pub async fn collect(&self) -> Result<NodeReport, MetadataError> {
        let local_broker_ids = self.local_broker_ids.clone();
        let metrics = self
            .fetcher
            .with_client(&self.cluster_alias, move |client, budget| {
                compute_local_metrics(client, &local_broker_ids, budget)
            })
            .await?;

        debug!("Collected {} local metrics", metrics.len());

        Ok(NodeReport {
            reported_at: Utc::now(),
            metrics,
        })
    }
}

fn compute_local_metrics<C: MetadataClient>(
    client: &C,
    local_broker_ids: &BTreeSet<i32>,
    budget: &CallBudget,
) -> KafkaResult<BTreeMap<String, MetricValue>> {
    let metadata = client.fetch_metadata(budget.next_call())?;

    let is_local = |broker: &i32| local_broker_ids.contains(broker);
    let brokers_online = metadata
        .brokers
        .iter()
        .filter(|broker| is_local(&broker.id))
        .count();

    let mut led = Vec::new();
    let mut under_replicated = 0usize;
    let mut offline = 0usize;

    for topic in &metadata.topics {
        for partition in &topic.partitions {
            match partition.leader {
                Some(leader) if is_local(&leader) => {
                    if partition.is_under_replicated() {
                        under_replicated += 1;
                    }
                    led.push((topic.name.as_str(), partition.id));
                }
                None if hosts_preferred_replica(partition, local_broker_ids) => offline += 1,
                _ => {}
            }
        }
    }

    trace!("Fetching watermarks of {} led partitions", led.len());

    let high_watermarks = led
        .par_iter()
        .map(|(topic, partition)| {
            let (_, high) = client.fetch_watermarks(topic, *partition, budget.next_call())?;
            Ok((*topic, high))
        })
        .collect::<KafkaResult<Vec<_>>>()?;

    let mut log_size = BTreeMap::new();
    for (topic, high) in high_watermarks {
        *log_size.entry(topic.to_owned()).or_insert(0.0) += high.max(0) as f64;
    }

    Ok(BTreeMap::from([
        (BROKERS_ONLINE.to_owned(), MetricValue::Number(brokers_online as f64)),
        (PARTITIONS_LED.to_owned(), MetricValue::Number(led.len() as f64)),
        (
            PARTITIONS_UNDER_REPLICATED.to_owned(),
            MetricValue::Number(under_replicated as f64),
        ),
        (PARTITIONS_OFFLINE.to_owned(), MetricValue::Number(offline as f64)),
        (TOPICS_LOG_SIZE.to_owned(), MetricValue::Labeled(log_size)),
    ]))
}

fn hosts_preferred_replica(partition: &PartitionInfo, local_broker_ids: &BTreeSet<i32>) -> bool {
    partition
        .replicas
        .first()
        .is_some_and(|replica| local_broker_ids.contains(replica))
}
