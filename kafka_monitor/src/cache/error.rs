use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("Cache capacity must be positive")]
    InvalidCapacity,

    #[error("Cache TTL must be positive")]
    InvalidTtl,
}
