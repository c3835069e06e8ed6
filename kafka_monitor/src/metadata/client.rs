use crate::connection_settings::ConnectionSettings;
use crate::metadata::{BrokerInfo, PartitionInfo, TopicDescription};
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::error::KafkaResult;
use rdkafka::ClientConfig;
use std::time::Duration;
use tracing::{trace, warn};

/// Brokers and topics as returned by one metadata request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClusterMetadata {
    pub brokers: Vec<BrokerInfo>,
    pub topics: Vec<TopicDescription>,
}

/// Blocking view of the Kafka admin/consumer interfaces used for metadata.
///
/// A client lives for exactly one fetcher call and is dropped afterwards,
/// whether the call succeeded or not. Watermark lookups may run from several
/// threads at once.
pub trait MetadataClient: Sync {
    /// Every broker and every topic that can be described without error.
    fn fetch_metadata(&self, timeout: Duration) -> KafkaResult<ClusterMetadata>;

    /// Low and high watermark of one partition.
    fn fetch_watermarks(
        &self,
        topic: &str,
        partition: i32,
        timeout: Duration,
    ) -> KafkaResult<(i64, i64)>;

    fn list_consumer_groups(&self, timeout: Duration) -> KafkaResult<Vec<String>>;
}

pub trait ClientFactory: Send + Sync + 'static {
    type Client: MetadataClient;

    fn create(&self, settings: &ConnectionSettings) -> KafkaResult<Self::Client>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RdKafkaClientFactory;

impl ClientFactory for RdKafkaClientFactory {
    type Client = RdKafkaMetadataClient;

    fn create(&self, settings: &ConnectionSettings) -> KafkaResult<Self::Client> {
        RdKafkaMetadataClient::create(settings)
    }
}

pub struct RdKafkaMetadataClient {
    consumer: BaseConsumer,
}

impl RdKafkaMetadataClient {
    pub fn create(settings: &ConnectionSettings) -> KafkaResult<Self> {
        // https://raw.githubusercontent.com/confluentinc/librdkafka/master/CONFIGURATION.md
        let consumer: BaseConsumer = ClientConfig::try_from(settings)?
            .set("enable.auto.commit", "false")
            .set("allow.auto.create.topics", "false")
            .create()?;

        trace!("Kafka metadata client created");
        Ok(Self { consumer })
    }
}

impl Drop for RdKafkaMetadataClient {
    fn drop(&mut self) {
        trace!("Kafka metadata client released");
    }
}

impl MetadataClient for RdKafkaMetadataClient {
    fn fetch_metadata(&self, timeout: Duration) -> KafkaResult<ClusterMetadata> {
        let metadata = self.consumer.fetch_metadata(None, timeout)?;

        let brokers = metadata
            .brokers()
            .iter()
            .filter_map(|broker| broker_info(broker.id(), broker.host(), broker.port()))
            .collect();

        let topics = metadata
            .topics()
            .iter()
            .filter(|topic| topic.error().is_none())
            .map(|topic| TopicDescription {
                name: topic.name().to_owned(),
                partitions: topic
                    .partitions()
                    .iter()
                    .map(|partition| PartitionInfo {
                        id: partition.id(),
                        leader: (partition.leader() >= 0).then_some(partition.leader()),
                        replicas: partition.replicas().to_vec(),
                        isr: partition.isr().to_vec(),
                    })
                    .collect(),
            })
            .collect();

        trace!("Got metadata from broker");

        Ok(ClusterMetadata { brokers, topics })
    }

    fn fetch_watermarks(
        &self,
        topic: &str,
        partition: i32,
        timeout: Duration,
    ) -> KafkaResult<(i64, i64)> {
        self.consumer.fetch_watermarks(topic, partition, timeout)
    }

    fn list_consumer_groups(&self, timeout: Duration) -> KafkaResult<Vec<String>> {
        let groups = self.consumer.fetch_group_list(None, timeout)?;

        Ok(groups
            .groups()
            .iter()
            .map(|group| group.name().to_owned())
            .collect())
    }
}

/// Brokers advertising a port outside the TCP range are left out.
fn broker_info(id: i32, host: &str, port: i32) -> Option<BrokerInfo> {
    match u16::try_from(port) {
        Ok(port) => Some(BrokerInfo {
            id,
            host: host.to_owned(),
            port,
            rack: None,
        }),
        Err(_) => {
            warn!("Broker {} at {} advertises invalid port {}, skipping it", id, host, port);
            None
        }
    }
}
