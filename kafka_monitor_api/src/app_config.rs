use anyhow::{bail, Context};
use config::Config;
use kafka_monitor::connection_settings::{ClusterRegistry, ConnectionSettings};
use kafka_monitor::jobs::{JobSettings, StaticWorkerDirectory, WorkerNode};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::info;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Master,
    Worker,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_ms: u64,
    pub sweep_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            ttl_ms: 60_000,
            sweep_interval_ms: 10_000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct MetricsCacheConfig {
    pub capacity: usize,
    pub ttl_ms: u64,
}

impl Default for MetricsCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            ttl_ms: 15_000,
        }
    }
}

impl MetricsCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct JobsConfig {
    pub deadline_ms: u64,
    pub request_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            deadline_ms: 10_000,
            request_timeout_ms: 5_000,
            connect_timeout_ms: 1_000,
        }
    }
}

/// Settings of the agent a worker node runs.
#[derive(Deserialize, Debug, Clone)]
pub struct WorkerConfig {
    pub host: String,
    pub port: u16,
    pub node_id: String,
    pub cluster_alias: String,
    #[serde(default)]
    pub local_broker_ids: BTreeSet<i32>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub clusters: HashMap<String, ConnectionSettings>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub metrics_cache: MetricsCacheConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub workers: HashMap<String, Vec<WorkerNode>>,
    pub worker: Option<WorkerConfig>,
    #[serde(default = "default_kafka_call_timeout_ms")]
    pub kafka_call_timeout_ms: u64,
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

fn default_kafka_call_timeout_ms() -> u64 {
    5_000
}

fn default_refresh_interval_ms() -> u64 {
    30_000
}

impl AppConfig {
    pub fn build() -> Result<Self, anyhow::Error> {
        let config = Config::builder()
            .add_source(config::File::with_name("appsettings"))
            .add_source(config::Environment::with_prefix("App").separator("__"))
            .build()
            .context("While building config")?;

        let deserialized_config = Self::from_config(config)?;

        info!("App config: {deserialized_config:?}");

        Ok(deserialized_config)
    }

    pub fn from_config(config: Config) -> Result<Self, anyhow::Error> {
        let deserialized_config: Self = config
            .try_deserialize()
            .context("While deserializing config")?;

        deserialized_config.validate()?;

        Ok(deserialized_config)
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.clusters.is_empty() {
            bail!("No clusters configured")
        }

        if self.role == Role::Worker {
            let Some(worker) = &self.worker else {
                bail!("Worker role requires a [worker] section")
            };
            if !self.clusters.contains_key(&worker.cluster_alias) {
                bail!("Worker serves unknown cluster '{}'", worker.cluster_alias)
            }
        }

        if let Some(alias) = self.workers.keys().find(|alias| !self.clusters.contains_key(*alias)) {
            bail!("Workers configured for unknown cluster '{alias}'")
        }

        Ok(())
    }

    pub fn cluster_registry(&self) -> ClusterRegistry {
        self.clusters.clone().into_iter().collect()
    }

    pub fn worker_directory(&self) -> StaticWorkerDirectory {
        StaticWorkerDirectory::new(self.workers.clone())
    }

    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            deadline: Duration::from_millis(self.jobs.deadline_ms),
            request_timeout: Duration::from_millis(self.jobs.request_timeout_ms),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.jobs.connect_timeout_ms)
    }

    pub fn kafka_call_timeout(&self) -> Duration {
        Duration::from_millis(self.kafka_call_timeout_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};
    use kafka_monitor::connection_settings::SecurityProtocol;

    fn parse(toml: &str) -> Result<AppConfig, anyhow::Error> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        AppConfig::from_config(config)
    }

    #[test]
    fn master_config_with_defaults() {
        let config = parse(
            r#"
            [clusters.prod]
            brokers = ["kafka-1:9092", "kafka-2:9092"]
            security_protocol = "sasl_ssl"

            [[workers.prod]]
            id = "w1"
            address = "10.0.0.1:7070"
            "#,
        )
        .unwrap();

        assert_eq!(config.role, Role::Master);
        assert_eq!(config.cache.capacity, 64);
        assert_eq!(config.cache.ttl_ms, 60_000);
        assert_eq!(config.job_settings().deadline, Duration::from_secs(10));

        let registry = config.cluster_registry();
        let prod = registry.get("prod").unwrap();
        assert_eq!(prod.brokers.len(), 2);
        assert_eq!(prod.security_protocol, SecurityProtocol::SaslSsl);
        assert_eq!(config.workers["prod"][0].id, "w1");
    }

    #[test]
    fn worker_role_requires_worker_section() {
        let error = parse(
            r#"
            role = "worker"

            [clusters.prod]
            brokers = ["kafka-1:9092"]
            "#,
        )
        .unwrap_err();

        assert!(error.to_string().contains("[worker]"));
    }

    #[test]
    fn worker_must_serve_a_configured_cluster() {
        let error = parse(
            r#"
            role = "worker"

            [clusters.prod]
            brokers = ["kafka-1:9092"]

            [worker]
            host = "0.0.0.0"
            port = 7070
            node_id = "w1"
            cluster_alias = "staging"
            "#,
        )
        .unwrap_err();

        assert!(error.to_string().contains("staging"));
    }

    #[test]
    fn workers_for_unknown_cluster_are_rejected() {
        let error = parse(
            r#"
            [clusters.prod]
            brokers = ["kafka-1:9092"]

            [[workers.staging]]
            id = "w1"
            address = "10.0.0.1:7070"
            "#,
        )
        .unwrap_err();

        assert!(error.to_string().contains("staging"));
    }

    #[test]
    fn logged_config_hides_connection_secrets() {
        let config = parse(
            r#"
            [clusters.prod]
            brokers = ["kafka-1:9092"]
            security_protocol = "sasl_ssl"

            [clusters.prod.properties]
            "sasl.username" = "monitor"
            "sasl.password" = "hunter2"
            "#,
        )
        .unwrap();

        assert_eq!(config.clusters["prod"].properties["sasl.password"], "hunter2");

        let logged = format!("{config:?}");
        assert!(logged.contains("sasl.password"));
        assert!(!logged.contains("hunter2"));
    }
}
