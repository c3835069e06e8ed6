mod error;
mod expiring_lru;
mod loading;

pub use error::*;
pub use expiring_lru::*;
pub use loading::*;
