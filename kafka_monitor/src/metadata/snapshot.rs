use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerInfo {
    pub id: i32,
    pub host: String,
    pub port: u16,
    pub rack: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    pub id: i32,
    /// `None` when the partition has no live leader.
    pub leader: Option<i32>,
    pub replicas: Vec<i32>,
    pub isr: Vec<i32>,
}

impl PartitionInfo {
    pub fn is_under_replicated(&self) -> bool {
        self.isr.len() < self.replicas.len()
    }

    pub fn is_offline(&self) -> bool {
        self.leader.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDescription {
    pub name: String,
    pub partitions: Vec<PartitionInfo>,
}

/// Point-in-time view of one cluster. Built whole on every successful fetch
/// and shared behind an `Arc`; it is never modified afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSnapshot {
    pub cluster_alias: String,
    pub brokers: Vec<BrokerInfo>,
    pub topics: BTreeMap<String, TopicDescription>,
    pub consumer_groups: BTreeSet<String>,
    pub fetched_at: DateTime<Utc>,
}

impl ClusterSnapshot {
    pub fn new(
        cluster_alias: String,
        mut brokers: Vec<BrokerInfo>,
        topics: BTreeMap<String, TopicDescription>,
        consumer_groups: BTreeSet<String>,
    ) -> Self {
        brokers.sort_by_key(|broker| broker.id);

        Self {
            cluster_alias,
            brokers,
            topics,
            consumer_groups,
            fetched_at: Utc::now(),
        }
    }

    pub fn topic_names(&self) -> BTreeSet<&str> {
        self.topics.keys().map(String::as_str).collect()
    }

    pub fn broker(&self, id: i32) -> Option<&BrokerInfo> {
        self.brokers
            .binary_search_by_key(&id, |broker| broker.id)
            .ok()
            .map(|index| &self.brokers[index])
    }

    pub fn partition_count(&self) -> usize {
        self.partitions().count()
    }

    pub fn under_replicated_partitions(&self) -> usize {
        self.partitions()
            .filter(|partition| partition.is_under_replicated())
            .count()
    }

    pub fn offline_partitions(&self) -> usize {
        self.partitions()
            .filter(|partition| partition.is_offline())
            .count()
    }

    fn partitions(&self) -> impl Iterator<Item = &PartitionInfo> {
        self.topics.values().flat_map(|topic| topic.partitions.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker(id: i32) -> BrokerInfo {
        BrokerInfo {
            id,
            host: format!("kafka-{id}"),
            port: 9092,
            rack: None,
        }
    }

    fn partition(id: i32, leader: Option<i32>, replicas: &[i32], isr: &[i32]) -> PartitionInfo {
        PartitionInfo {
            id,
            leader,
            replicas: replicas.to_vec(),
            isr: isr.to_vec(),
        }
    }

    #[test]
    fn summarizes_partition_health() {
        let topics = BTreeMap::from([(
            "orders".to_owned(),
            TopicDescription {
                name: "orders".to_owned(),
                partitions: vec![
                    partition(0, Some(1), &[1, 2], &[1, 2]),
                    partition(1, Some(2), &[2, 3], &[2]),
                    partition(2, None, &[3, 1], &[]),
                ],
            },
        )]);

        let snapshot = ClusterSnapshot::new(
            "prod".to_owned(),
            vec![broker(3), broker(1), broker(2)],
            topics,
            BTreeSet::new(),
        );

        assert_eq!(
            snapshot.brokers.iter().map(|b| b.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(snapshot.broker(2).map(|b| b.host.as_str()), Some("kafka-2"));
        assert_eq!(snapshot.broker(7), None);
        assert_eq!(snapshot.partition_count(), 3);
        assert_eq!(snapshot.under_replicated_partitions(), 2);
        assert_eq!(snapshot.offline_partitions(), 1);
        assert_eq!(snapshot.topic_names(), BTreeSet::from(["orders"]));
    }
}
