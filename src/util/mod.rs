//! Utility modules: configuration and logging setup

pub mod config;
pub mod logger;
