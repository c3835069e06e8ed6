mod directory;
mod error;
mod job_client;
mod models;
mod transport;

pub use directory::*;
pub use error::*;
pub use job_client::*;
pub use models::*;
pub use transport::*;
