use rdkafka::error::KafkaError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum MetadataError {
    #[error("Cluster '{0}' is not configured")]
    UnknownCluster(String),

    #[error("Metadata of cluster '{cluster}' is unavailable: {source}")]
    Unavailable {
        cluster: String,
        #[source]
        source: KafkaError,
    },

    #[error("Topic '{topic}' was not found in cluster '{cluster}'")]
    UnknownTopic { cluster: String, topic: String },

    #[error("Metadata call to cluster '{cluster}' timed out after {timeout:?}")]
    TimedOut { cluster: String, timeout: Duration },

    #[error("Metadata call to cluster '{cluster}' failed: {message}")]
    Internal { cluster: String, message: String },
}

impl MetadataError {
    /// Whether the caller may retry the same call later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MetadataError::Unavailable { .. } | MetadataError::TimedOut { .. }
        )
    }
}
