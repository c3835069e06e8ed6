use rdkafka::error::KafkaError;
use rdkafka::ClientConfig;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Debug, Display, Formatter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityProtocol {
    #[default]
    Plaintext,
    Ssl,
    SaslPlaintext,
    SaslSsl,
}

impl Display for SecurityProtocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityProtocol::Plaintext => write!(f, "plaintext"),
            SecurityProtocol::Ssl => write!(f, "ssl"),
            SecurityProtocol::SaslPlaintext => write!(f, "sasl_plaintext"),
            SecurityProtocol::SaslSsl => write!(f, "sasl_ssl"),
        }
    }
}

/// How to reach one cluster. `properties` are passed to librdkafka untouched
/// (SASL credentials, SSL locations and the like), so their values never show
/// up in `Debug` output.
#[derive(Clone, Default, Deserialize)]
pub struct ConnectionSettings {
    pub brokers: Vec<String>,
    #[serde(default)]
    pub security_protocol: SecurityProtocol,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Debug for ConnectionSettings {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let properties = self
            .properties
            .keys()
            .map(|key| (key, "***"))
            .collect::<BTreeMap<_, _>>();

        f.debug_struct("ConnectionSettings")
            .field("brokers", &self.brokers)
            .field("security_protocol", &self.security_protocol)
            .field("properties", &properties)
            .finish()
    }
}

impl TryFrom<&ConnectionSettings> for ClientConfig {
    type Error = KafkaError;

    fn try_from(value: &ConnectionSettings) -> Result<Self, Self::Error> {
        if value.brokers.is_empty() {
            return Err(KafkaError::ClientCreation("No brokers specified".to_owned()));
        }

        let mut config = ClientConfig::new();

        let brokers_string = value.brokers.join(",");
        config
            .set("bootstrap.servers", brokers_string)
            .set("security.protocol", value.security_protocol.to_string());

        for (key, property) in &value.properties {
            config.set(key, property);
        }

        if let Ok(value) = std::env::var("RD_KAFKA_DEBUG") {
            config.set("debug", value);
        }

        Ok(config)
    }
}

/// Connection settings of every monitored cluster, keyed by cluster alias.
#[derive(Debug, Clone, Default)]
pub struct ClusterRegistry {
    clusters: HashMap<String, ConnectionSettings>,
}

impl ClusterRegistry {
    pub fn new(clusters: HashMap<String, ConnectionSettings>) -> Self {
        Self { clusters }
    }

    pub fn get(&self, cluster_alias: &str) -> Option<&ConnectionSettings> {
        self.clusters.get(cluster_alias)
    }

    /// Aliases in a stable order.
    pub fn aliases(&self) -> Vec<String> {
        let mut aliases = self.clusters.keys().cloned().collect::<Vec<_>>();
        aliases.sort();
        aliases
    }
}

impl FromIterator<(String, ConnectionSettings)> for ClusterRegistry {
    fn from_iter<T: IntoIterator<Item = (String, ConnectionSettings)>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
