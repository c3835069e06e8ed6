#![allow(clippy::too_many_arguments)]

pub mod agent;
pub mod cache;
pub mod connection_settings;
pub mod jobs;
pub mod metadata;
pub mod service;
