use crate::connection_settings::ClusterRegistry;
use crate::metadata::{
    BrokerInfo, ClientFactory, ClusterSnapshot, MetadataClient, MetadataError, RdKafkaClientFactory,
    TopicDescription,
};
use rdkafka::error::KafkaResult;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error};

/// Headroom on top of the call timeouts before a blocking operation is given up on.
const BLOCKING_CALL_GRACE: Duration = Duration::from_millis(500);

/// Hands out the timeout for each Kafka call an operation makes and counts
/// the calls, so the operation as a whole is allowed one timeout per call.
#[derive(Debug)]
pub struct CallBudget {
    call_timeout: Duration,
    started: AtomicU32,
}

impl CallBudget {
    fn new(call_timeout: Duration) -> Self {
        Self {
            call_timeout,
            started: AtomicU32::new(0),
        }
    }

    /// Registers one more call and returns its timeout.
    pub fn next_call(&self) -> Duration {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.call_timeout
    }

    fn started_calls(&self) -> u32 {
        self.started.load(Ordering::SeqCst)
    }
}

/// Turns a cluster alias into topic lists, topic descriptions and snapshots.
///
/// Each call creates its own client on a blocking thread and drops it before
/// returning. Failures are reported as they are; retrying is up to the caller.
pub struct MetadataFetcher<F = RdKafkaClientFactory> {
    clusters: Arc<ClusterRegistry>,
    factory: Arc<F>,
    call_timeout: Duration,
}

impl<F> Clone for MetadataFetcher<F> {
    fn clone(&self) -> Self {
        Self {
            clusters: self.clusters.clone(),
            factory: self.factory.clone(),
            call_timeout: self.call_timeout,
        }
    }
}

impl<F: ClientFactory> MetadataFetcher<F> {
    pub fn new(clusters: Arc<ClusterRegistry>, factory: F, call_timeout: Duration) -> Self {
        Self {
            clusters,
            factory: Arc::new(factory),
            call_timeout,
        }
    }

    pub fn clusters(&self) -> &ClusterRegistry {
        &self.clusters
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_topic_names(&self, cluster_alias: &str) -> Result<BTreeSet<String>, MetadataError> {
        self.with_client(cluster_alias, |client, budget| {
            let metadata = client.fetch_metadata(budget.next_call())?;
            Ok(metadata.topics.into_iter().map(|topic| topic.name).collect())
        })
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn describe_topics(
        &self,
        cluster_alias: &str,
        topics: &[String],
    ) -> Result<BTreeMap<String, TopicDescription>, MetadataError> {
        let metadata = self
            .with_client(cluster_alias, |client, budget| {
                client.fetch_metadata(budget.next_call())
            })
            .await?;

        let descriptions = metadata
            .topics
            .into_iter()
            .filter(|description| topics.contains(&description.name))
            .map(|description| (description.name.clone(), description))
            .collect::<BTreeMap<_, _>>();

        if let Some(missing) = topics.iter().find(|topic| !descriptions.contains_key(*topic)) {
            return Err(MetadataError::UnknownTopic {
                cluster: cluster_alias.to_owned(),
                topic: missing.clone(),
            });
        }

        Ok(descriptions)
    }

    #[tracing::instrument(skip(self))]
    pub async fn fetch_brokers(&self, cluster_alias: &str) -> Result<Vec<BrokerInfo>, MetadataError> {
        self.with_client(cluster_alias, |client, budget| {
            Ok(client.fetch_metadata(budget.next_call())?.brokers)
        })
        .await
    }

    /// Brokers, topic descriptions and consumer groups read through one client.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_snapshot(&self, cluster_alias: &str) -> Result<ClusterSnapshot, MetadataError> {
        let (metadata, groups) = self
            .with_client(cluster_alias, |client, budget| {
                let metadata = client.fetch_metadata(budget.next_call())?;
                let groups = client.list_consumer_groups(budget.next_call())?;
                Ok((metadata, groups))
            })
            .await?;

        let topics = metadata
            .topics
            .into_iter()
            .map(|topic| (topic.name.clone(), topic))
            .collect::<BTreeMap<_, _>>();

        debug!(
            "Fetched snapshot of cluster {}: {} brokers, {} topics, {} consumer groups",
            cluster_alias,
            metadata.brokers.len(),
            topics.len(),
            groups.len()
        );

        Ok(ClusterSnapshot::new(
            cluster_alias.to_owned(),
            metadata.brokers,
            topics,
            groups.into_iter().collect(),
        ))
    }

    /// Runs `operation` against a client created for this call only.
    ///
    /// The operation may run for one call timeout per call it starts through
    /// the [`CallBudget`], plus a fixed grace. It times out once that allowance
    /// passes without a new call being started.
    pub(crate) async fn with_client<T, Op>(&self, cluster_alias: &str, operation: Op) -> Result<T, MetadataError>
    where
        T: Send + 'static,
        Op: FnOnce(&F::Client, &CallBudget) -> KafkaResult<T> + Send + 'static,
    {
        let settings = self
            .clusters
            .get(cluster_alias)
            .ok_or_else(|| MetadataError::UnknownCluster(cluster_alias.to_owned()))?
            .clone();
        let factory = self.factory.clone();
        let budget = Arc::new(CallBudget::new(self.call_timeout));

        let mut handle = tokio::task::spawn_blocking({
            let budget = budget.clone();
            move || {
                let client = factory.create(&settings)?;
                operation(&client, &budget)
            }
        });

        let started = Instant::now();
        let joined = loop {
            let allowed = budget.started_calls().max(1);
            let deadline = started + self.call_timeout * allowed + BLOCKING_CALL_GRACE;

            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(joined) => break Some(joined),
                Err(_) if budget.started_calls() > allowed => continue,
                Err(_) => break None,
            }
        };

        let result = match joined {
            Some(Ok(Ok(value))) => Ok(value),
            Some(Ok(Err(source))) => Err(MetadataError::Unavailable {
                cluster: cluster_alias.to_owned(),
                source,
            }),
            Some(Err(join_error)) => Err(MetadataError::Internal {
                cluster: cluster_alias.to_owned(),
                message: join_error.to_string(),
            }),
            None => Err(MetadataError::TimedOut {
                cluster: cluster_alias.to_owned(),
                timeout: started.elapsed(),
            }),
        };

        if let Err(e) = &result {
            error!("Metadata call failed: {}", e);
        }

        result
    }
}
