mod client;
mod error;
mod fetcher;
mod snapshot;

pub use client::*;
pub use error::*;
pub use fetcher::*;
pub use snapshot::*;
