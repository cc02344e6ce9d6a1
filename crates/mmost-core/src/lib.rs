//! Core library for mmost - Mattermost client, CLI, and MCP tool server.
//!
//! This crate provides:
//! - Configuration loading and management
//! - XDG-compliant path resolution
//! - Schema and example config generation
//! - The Mattermost REST API client: pacing, retries, caching
//! - Common types and error handling

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod paths;
pub mod schema;

pub use api::models;
pub use api::{HttpClient, MattermostClient, RetryPolicy};
pub use cache::CacheStore;
pub use config::{AppConfig, ClientConfig, LogLevel, LoggingConfig, ServerConfig};
pub use error::{ClientError, Result};
pub use paths::{AppPaths, default_config_dir, default_data_dir};
pub use schema::{generate_example_config, generate_schema, write_generated_files};

/// Application name used for config directories and environment prefix.
pub const APP_NAME: &str = "mmost";

/// Returns the environment variable prefix for this application.
#[must_use]
pub fn env_prefix() -> String {
    APP_NAME
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
