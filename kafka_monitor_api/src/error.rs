use kafka_monitor::metadata::MetadataError;
use tonic::Status;
use tracing::error;

#[derive(Debug)]
pub enum ApplicationError {
    InvalidArgument(anyhow::Error),
    UnknownCluster(String),
    Unavailable(MetadataError),
}

impl From<ApplicationError> for Status {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::InvalidArgument(e) => {
                error!("{e:?}");
                Status::invalid_argument(format!("{e}"))
            }
            ApplicationError::UnknownCluster(alias) => {
                error!("Request for cluster {alias}, which this worker does not serve");
                Status::not_found(format!("Cluster '{alias}' is not served by this worker"))
            }
            ApplicationError::Unavailable(e) => {
                error!("{e:?}");
                if e.is_transient() {
                    Status::unavailable(format!("{e}"))
                } else {
                    Status::internal(format!("{e}"))
                }
            }
        }
    }
}
