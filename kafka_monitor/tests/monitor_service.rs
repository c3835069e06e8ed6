use async_trait::async_trait;
use chrono::Utc;
use kafka_monitor::connection_settings::{ClusterRegistry, ConnectionSettings};
use kafka_monitor::jobs::{
    CollectionRequest, JobClient, JobSettings, MetricValue, NodeReport, NodeStatus,
    StaticWorkerDirectory, TransportError, WorkerNode, WorkerTransport,
};
use kafka_monitor::metadata::{
    BrokerInfo, ClientFactory, ClusterMetadata, MetadataClient, MetadataError, MetadataFetcher,
    PartitionInfo, TopicDescription,
};
use kafka_monitor::service::{metadata_cache, metrics_cache, MonitorService};
use rdkafka::error::{KafkaError, KafkaResult, RDKafkaErrorCode};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Broker {
    down: AtomicBool,
    loads: AtomicUsize,
}

struct FakeFactory(Arc<Broker>);

struct FakeClient(Arc<Broker>);

impl FakeClient {
    fn reachable(&self) -> KafkaResult<()> {
        if self.0.down.load(Ordering::SeqCst) {
            return Err(KafkaError::MetadataFetch(RDKafkaErrorCode::AllBrokersDown));
        }
        Ok(())
    }
}

impl MetadataClient for FakeClient {
    fn fetch_metadata(&self, _: Duration) -> KafkaResult<ClusterMetadata> {
        self.0.loads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));
        self.reachable()?;

        let broker = |id: i32| BrokerInfo {
            id,
            host: format!("kafka-{id}"),
            port: 9092,
            rack: None,
        };

        Ok(ClusterMetadata {
            brokers: vec![broker(2), broker(1)],
            topics: vec![TopicDescription {
                name: "orders".to_owned(),
                partitions: vec![PartitionInfo {
                    id: 0,
                    leader: Some(1),
                    replicas: vec![1, 2],
                    isr: vec![1, 2],
                }],
            }],
        })
    }

    fn fetch_watermarks(&self, _: &str, _: i32, _: Duration) -> KafkaResult<(i64, i64)> {
        self.reachable()?;
        Ok((0, 0))
    }

    fn list_consumer_groups(&self, _: Duration) -> KafkaResult<Vec<String>> {
        self.reachable()?;
        Ok(vec!["billing".to_owned()])
    }
}

impl ClientFactory for FakeFactory {
    type Client = FakeClient;

    fn create(&self, _: &ConnectionSettings) -> KafkaResult<FakeClient> {
        Ok(FakeClient(self.0.clone()))
    }
}

struct FakeTransport {
    silent: BTreeSet<String>,
    calls: AtomicUsize,
}

#[async_trait]
impl WorkerTransport for FakeTransport {
    async fn collect(
        &self,
        node: &WorkerNode,
        _: &CollectionRequest,
    ) -> Result<NodeReport, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.silent.contains(&node.id) {
            return std::future::pending().await;
        }

        Ok(NodeReport {
            reported_at: Utc::now(),
            metrics: BTreeMap::from([("partitions.led".to_owned(), MetricValue::Number(1.0))]),
        })
    }
}

struct Harness {
    service: Arc<MonitorService<FakeFactory>>,
    broker: Arc<Broker>,
    transport: Arc<FakeTransport>,
}

fn harness(workers: &[&str], silent: &[&str]) -> Harness {
    let broker = Arc::new(Broker::default());
    let clusters = ClusterRegistry::from_iter([(
        "prod".to_owned(),
        ConnectionSettings {
            brokers: vec!["kafka-1:9092".to_owned()],
            ..Default::default()
        },
    )]);
    let fetcher = MetadataFetcher::new(
        Arc::new(clusters),
        FakeFactory(broker.clone()),
        Duration::from_secs(2),
    );

    let nodes = workers
        .iter()
        .map(|id| WorkerNode {
            id: id.to_string(),
            address: format!("{id}:7070"),
        })
        .collect::<Vec<_>>();
    let directory = StaticWorkerDirectory::new(HashMap::from([("prod".to_owned(), nodes)]));
    let transport = Arc::new(FakeTransport {
        silent: silent.iter().map(|id| id.to_string()).collect(),
        calls: AtomicUsize::new(0),
    });
    let job_client = JobClient::new(
        Arc::new(directory),
        transport.clone(),
        JobSettings {
            deadline: Duration::from_millis(300),
            request_timeout: Duration::from_millis(200),
        },
    );

    let service = MonitorService::new(
        Arc::new(metadata_cache(16, Duration::from_secs(60)).unwrap()),
        Arc::new(metrics_cache(16, Duration::from_secs(60)).unwrap()),
        fetcher,
        job_client,
    );

    Harness {
        service: Arc::new(service),
        broker,
        transport,
    }
}

#[tokio::test]
async fn failed_fetches_are_not_cached() {
    let harness = harness(&["w1"], &[]);
    harness.broker.down.store(true, Ordering::SeqCst);

    for _ in 0..2 {
        let error = harness.service.get_brokers("prod").await.unwrap_err();
        assert!(matches!(error, MetadataError::Unavailable { .. }));
    }
    assert_eq!(harness.broker.loads.load(Ordering::SeqCst), 2);

    harness.broker.down.store(false, Ordering::SeqCst);
    let snapshot = harness.service.get_brokers("prod").await.unwrap();
    assert_eq!(snapshot.cluster_alias, "prod");
    assert_eq!(snapshot.brokers.iter().map(|b| b.id).collect::<Vec<_>>(), vec![1, 2]);
    assert!(snapshot.consumer_groups.contains("billing"));

    let cached = harness.service.get_brokers("prod").await.unwrap();
    assert!(Arc::ptr_eq(&snapshot, &cached));
    assert_eq!(harness.broker.loads.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dashboard_reads_trigger_one_fetch() {
    let harness = harness(&["w1"], &[]);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let service = harness.service.clone();
        handles.push(tokio::spawn(async move { service.get_brokers("prod").await }));
    }

    let mut snapshots = Vec::new();
    for handle in handles {
        snapshots.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(harness.broker.loads.load(Ordering::SeqCst), 1);
    assert!(snapshots.iter().all(|s| Arc::ptr_eq(s, &snapshots[0])));
}

#[tokio::test]
async fn invalidation_forces_a_new_fetch() {
    let harness = harness(&["w1"], &[]);

    let first = harness.service.get_brokers("prod").await.unwrap();
    harness.service.invalidate("prod");
    let second = harness.service.get_brokers("prod").await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(harness.broker.loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn unknown_cluster_is_an_error() {
    let harness = harness(&["w1"], &[]);

    let error = harness.service.get_brokers("staging").await.unwrap_err();

    assert!(matches!(error, MetadataError::UnknownCluster(_)));
}

#[tokio::test]
async fn complete_metrics_are_cached() {
    let harness = harness(&["w2", "w1"], &[]);

    let first = harness.service.get_cluster_metrics("prod").await;
    let second = harness.service.get_cluster_metrics("prod").await;

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(harness.transport.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        first.nodes.iter().map(|n| n.node_id().as_str()).collect::<Vec<_>>(),
        vec!["w1", "w2"]
    );
}

#[tokio::test(start_paused = true)]
async fn partial_metrics_are_served_but_not_cached() {
    let harness = harness(&["w1", "w2", "w3"], &["w2"]);

    let metrics = harness.service.get_cluster_metrics("prod").await;
    assert_eq!(metrics.nodes.len(), 3);
    assert_eq!(*metrics.nodes[1].status(), NodeStatus::TimedOut);
    assert_eq!(metrics.totals().get("partitions.led"), Some(&MetricValue::Number(2.0)));

    harness.service.get_cluster_metrics("prod").await;
    assert_eq!(harness.transport.calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn cluster_without_workers_yields_empty_metrics() {
    let harness = harness(&[], &[]);

    let metrics = harness.service.get_cluster_metrics("prod").await;

    assert!(metrics.nodes.is_empty());
    assert!(metrics.correlation_id.is_none());
    assert_eq!(harness.transport.calls.load(Ordering::SeqCst), 0);
}
