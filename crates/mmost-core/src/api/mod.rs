//! Mattermost REST API (v4) client module.
//!
//! This module provides:
//! - The request engine: pacing, retries, and error classification
//! - The domain client: teams, channels, posts, users, and files
//! - Request option and payload types

pub mod client;
pub mod http;
pub mod models;

pub use client::MattermostClient;
pub use http::{HttpClient, RetryPolicy};
pub use models::{
    ChannelType, NewChannel, PostListOptions, PostSearchOptions, UserSearchOptions,
};
