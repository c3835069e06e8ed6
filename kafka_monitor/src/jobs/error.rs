use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("No worker nodes are available for cluster '{0}'")]
    NoWorkersAvailable(String),
}

/// Failure of one request to one worker node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Worker node is unreachable: {0}")]
    Unreachable(String),

    #[error("Worker node rejected the request: {0}")]
    Rejected(String),

    #[error("Worker node sent a malformed response: {0}")]
    Malformed(String),
}
