pub mod app_config;
pub mod error;
pub mod startup;
pub mod worker_api;
