mod converter;
mod service;
mod transport;

pub use converter::*;
pub use service::*;
pub use transport::*;

pub mod proto {
    pub use worker_agent_client::WorkerAgentClient;
    pub use worker_agent_server::{WorkerAgent, WorkerAgentServer};
    tonic::include_proto!("kafka_monitor_api.worker");

    pub(crate) const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("worker_agent_descriptor");
}
