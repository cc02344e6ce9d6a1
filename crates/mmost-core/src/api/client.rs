//! Domain client for Mattermost teams, channels, posts, users, and files.
//!
//! Each operation maps onto one request-engine call, adding endpoint
//! construction, payload shaping, default-team fallback, and opportunistic
//! caching of read-mostly entities. Cached entries live until a mutating
//! operation on the same resource invalidates them; there is no time-based
//! expiry.

use std::path::Path;

use reqwest::{Method, Url, multipart};
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt as _;
use tokio::sync::Mutex;
use urlencoding::encode;

use crate::api::http::{self, HttpClient};
use crate::api::models::{NewChannel, PostListOptions, PostSearchOptions, UserSearchOptions};
use crate::cache::CacheStore;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Hard cap the platform enforces on posts per page.
const POSTS_PER_PAGE_MAX: u64 = 200;

/// Mattermost API client with rate limiting, retries, and caching.
#[derive(Debug)]
pub struct MattermostClient {
    config: ClientConfig,
    http: HttpClient,
    cache: Mutex<CacheStore>,
}

impl MattermostClient {
    /// Create a client from a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if the configuration is incomplete
    /// or the HTTP engine cannot be constructed.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = HttpClient::new(&config)?;
        Ok(Self::from_parts(config, http))
    }

    /// Create a client from a configuration and a pre-built engine.
    ///
    /// Useful for callers that need a custom retry policy or pacing
    /// interval.
    #[must_use]
    pub fn from_parts(config: ClientConfig, http: HttpClient) -> Self {
        Self {
            config,
            http,
            cache: Mutex::new(CacheStore::default()),
        }
    }

    /// The versioned API base URL this client talks to.
    #[must_use]
    pub const fn api_url(&self) -> &Url {
        self.http.api_url()
    }

    /// The configured default team ID, if any.
    #[must_use]
    pub fn default_team(&self) -> Option<&str> {
        self.config.team_id.as_deref()
    }

    /// Resolve an explicit team ID or fall back to the configured default.
    ///
    /// Fails before any network call when neither is present.
    fn require_team(&self, team_id: Option<&str>) -> Result<String> {
        team_id
            .map(str::to_string)
            .or_else(|| self.config.team_id.clone())
            .ok_or_else(|| {
                ClientError::Config(
                    "team ID required: pass one explicitly or configure a default".to_string(),
                )
            })
    }

    // ─── Teams ───────────────────────────────────────────────────────

    /// Get all teams the bot belongs to. Cached after the first read.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_teams(&self) -> Result<Vec<Value>> {
        if let Some(teams) = self.cache.lock().await.teams.clone() {
            return Ok(teams);
        }

        let teams = as_array(self.http.get_json("users/me/teams", &[]).await?)?;
        self.cache.lock().await.teams = Some(teams.clone());
        Ok(teams)
    }

    /// Get the members of a team.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when no team ID is available, or a
    /// request error.
    pub async fn get_team_members(&self, team_id: Option<&str>) -> Result<Vec<Value>> {
        let team_id = self.require_team(team_id)?;
        as_array(
            self.http
                .get_json(&format!("teams/{}/members", encode(&team_id)), &[])
                .await?,
        )
    }

    /// Get team statistics.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when no team ID is available, or a
    /// request error.
    pub async fn get_team_stats(&self, team_id: Option<&str>) -> Result<Value> {
        let team_id = self.require_team(team_id)?;
        self.http
            .get_json(&format!("teams/{}/stats", encode(&team_id)), &[])
            .await
    }

    // ─── Channels ────────────────────────────────────────────────────

    /// Get the channels of a team. Cached per team after the first read.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when no team ID is available, or a
    /// request error.
    pub async fn get_channels(&self, team_id: Option<&str>) -> Result<Vec<Value>> {
        let team_id = self.require_team(team_id)?;

        if let Some(channels) = self.cache.lock().await.channel_lists.get(&team_id) {
            return Ok(channels.clone());
        }

        let channels = as_array(
            self.http
                .get_json(
                    &format!("users/me/teams/{}/channels", encode(&team_id)),
                    &[],
                )
                .await?,
        )?;
        self.cache
            .lock()
            .await
            .channel_lists
            .insert(team_id, channels.clone());
        Ok(channels)
    }

    /// Get detailed channel information. Cached per channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_channel_info(&self, channel_id: &str) -> Result<Value> {
        if let Some(channel) = self.cache.lock().await.channel_details.get(channel_id) {
            return Ok(channel.clone());
        }

        let channel = self
            .http
            .get_json(&format!("channels/{}", encode(channel_id)), &[])
            .await?;
        self.cache
            .lock()
            .await
            .channel_details
            .insert(channel_id.to_string(), channel.clone());
        Ok(channel)
    }

    /// Create a channel. Invalidates the channel-list cache for its team.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when no team ID is available, or a
    /// request error.
    pub async fn create_channel(
        &self,
        channel: NewChannel,
        team_id: Option<&str>,
    ) -> Result<Value> {
        let team_id = self.require_team(team_id)?;

        let payload = json!({
            "team_id": team_id,
            "name": channel.name,
            "display_name": channel.display_name,
            "purpose": channel.purpose,
            "header": channel.header,
            "type": channel.channel_type.as_str(),
        });

        let created = self.http.post_json("channels", &payload).await?;
        self.cache.lock().await.channel_lists.remove(&team_id);
        Ok(created)
    }

    /// Add a user to a channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn add_user_to_channel(&self, channel_id: &str, user_id: &str) -> Result<Value> {
        let payload = json!({ "user_id": user_id });
        self.http
            .post_json(&format!("channels/{}/members", encode(channel_id)), &payload)
            .await
    }

    /// Remove a user from a channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn remove_user_from_channel(&self, channel_id: &str, user_id: &str) -> Result<bool> {
        self.http
            .delete(&format!(
                "channels/{}/members/{}",
                encode(channel_id),
                encode(user_id)
            ))
            .await
    }

    /// Update a channel's header. Invalidates that channel's detail entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn update_channel_header(&self, channel_id: &str, header: &str) -> Result<Value> {
        let payload = json!({ "channel_id": channel_id, "header": header });
        let updated = self
            .http
            .put_json(&format!("channels/{}/patch", encode(channel_id)), &payload)
            .await?;
        self.cache.lock().await.channel_details.remove(channel_id);
        Ok(updated)
    }

    /// Update a channel's purpose. Invalidates that channel's detail entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn update_channel_purpose(&self, channel_id: &str, purpose: &str) -> Result<Value> {
        let payload = json!({ "channel_id": channel_id, "purpose": purpose });
        let updated = self
            .http
            .put_json(&format!("channels/{}/patch", encode(channel_id)), &payload)
            .await?;
        self.cache.lock().await.channel_details.remove(channel_id);
        Ok(updated)
    }

    /// Get the members of a channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_channel_members(&self, channel_id: &str) -> Result<Vec<Value>> {
        as_array(
            self.http
                .get_json(&format!("channels/{}/members", encode(channel_id)), &[])
                .await?,
        )
    }

    /// Get channel statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_channel_stats(&self, channel_id: &str) -> Result<Value> {
        self.http
            .get_json(&format!("channels/{}/stats", encode(channel_id)), &[])
            .await
    }

    // ─── Posts ───────────────────────────────────────────────────────

    /// Get posts from a channel.
    ///
    /// `per_page` is clamped to the platform cap of 200; `since`, `before`,
    /// and `after` pass through verbatim.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_posts(&self, channel_id: &str, options: &PostListOptions) -> Result<Value> {
        let mut query: Vec<(&str, String)> = vec![
            ("page", options.page.to_string()),
            (
                "per_page",
                options.per_page.min(POSTS_PER_PAGE_MAX).to_string(),
            ),
        ];
        if let Some(since) = options.since {
            query.push(("since", since.to_string()));
        }
        if let Some(ref before) = options.before {
            query.push(("before", before.clone()));
        }
        if let Some(ref after) = options.after {
            query.push(("after", after.clone()));
        }

        self.http
            .get_json(&format!("channels/{}/posts", encode(channel_id)), &query)
            .await
    }

    /// Search posts across the channels of a team.
    ///
    /// The query term is passed through uninterpreted; quoting and OR
    /// operators are handled server-side.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when no team ID is available, or a
    /// request error.
    pub async fn search_posts(
        &self,
        terms: &str,
        team_id: Option<&str>,
        options: &PostSearchOptions,
    ) -> Result<Value> {
        let team_id = self.require_team(team_id)?;

        let payload = json!({
            "terms": terms,
            "is_or_search": options.is_or_search,
            "time_zone_offset": options.time_zone_offset,
            "include_deleted_channels": options.include_deleted_channels,
            "page": options.page,
            "per_page": options.per_page,
        });

        self.http
            .post_json(&format!("teams/{}/posts/search", encode(&team_id)), &payload)
            .await
    }

    /// Send a message to a channel, optionally as a thread reply or with
    /// attached files.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn send_message(
        &self,
        channel_id: &str,
        message: &str,
        root_id: Option<&str>,
        file_ids: Option<&[String]>,
    ) -> Result<Value> {
        let mut payload = json!({
            "channel_id": channel_id,
            "message": message,
        });
        if let Some(root_id) = root_id {
            payload["root_id"] = json!(root_id);
        }
        if let Some(file_ids) = file_ids {
            payload["file_ids"] = json!(file_ids);
        }

        self.http.post_json("posts", &payload).await
    }

    /// Update an existing message.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn update_message(&self, post_id: &str, message: &str) -> Result<Value> {
        let payload = json!({ "id": post_id, "message": message });
        self.http
            .put_json(&format!("posts/{}", encode(post_id)), &payload)
            .await
    }

    /// Delete a message.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn delete_message(&self, post_id: &str) -> Result<bool> {
        self.http.delete(&format!("posts/{}", encode(post_id))).await
    }

    /// Pin a message to its channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn pin_message(&self, post_id: &str) -> Result<Value> {
        self.http
            .post_json(&format!("posts/{}/pin", encode(post_id)), &json!({}))
            .await
    }

    /// Unpin a message from its channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn unpin_message(&self, post_id: &str) -> Result<Value> {
        self.http
            .post_json(&format!("posts/{}/unpin", encode(post_id)), &json!({}))
            .await
    }

    // ─── Users ───────────────────────────────────────────────────────

    /// Get a user profile. Cached per user.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_user_profile(&self, user_id: &str) -> Result<Value> {
        if let Some(user) = self.cache.lock().await.users.get(user_id) {
            return Ok(user.clone());
        }

        let user = self
            .http
            .get_json(&format!("users/{}", encode(user_id)), &[])
            .await?;
        self.cache
            .lock()
            .await
            .users
            .insert(user_id.to_string(), user.clone());
        Ok(user)
    }

    /// Get multiple user profiles by ID.
    ///
    /// Already-cached profiles are served locally; a single batched request
    /// fetches only the missing IDs. Result order is not guaranteed.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_users_by_ids(&self, user_ids: &[String]) -> Result<Vec<Value>> {
        let (mut found, missing) = {
            let cache = self.cache.lock().await;
            let mut found = Vec::new();
            let mut missing = Vec::new();
            for id in user_ids {
                if let Some(user) = cache.users.get(id) {
                    found.push(user.clone());
                } else {
                    missing.push(id.clone());
                }
            }
            (found, missing)
        };

        if !missing.is_empty() {
            let fetched = as_array(self.http.post_json("users/ids", &json!(missing)).await?)?;

            let mut cache = self.cache.lock().await;
            for user in &fetched {
                if let Some(id) = user.get("id").and_then(Value::as_str) {
                    cache.users.insert(id.to_string(), user.clone());
                }
            }
            found.extend(fetched);
        }

        Ok(found)
    }

    /// Search users by username, name, nickname, or email.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn search_users(
        &self,
        term: &str,
        options: &UserSearchOptions,
    ) -> Result<Vec<Value>> {
        let mut payload = json!({ "term": term, "limit": options.limit });
        if let Some(ref team_id) = options.team_id {
            payload["team_id"] = json!(team_id);
        }
        if let Some(ref in_channel_id) = options.in_channel_id {
            payload["in_channel_id"] = json!(in_channel_id);
        }
        if let Some(ref not_in_channel_id) = options.not_in_channel_id {
            payload["not_in_channel_id"] = json!(not_in_channel_id);
        }

        as_array(self.http.post_json("users/search", &payload).await?)
    }

    /// Get a user's presence status.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_user_status(&self, user_id: &str) -> Result<Value> {
        self.http
            .get_json(&format!("users/{}/status", encode(user_id)), &[])
            .await
    }

    /// Get presence status for multiple users.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_users_status(&self, user_ids: &[String]) -> Result<Vec<Value>> {
        as_array(self.http.post_json("users/status/ids", &json!(user_ids)).await?)
    }

    // ─── Files ───────────────────────────────────────────────────────

    /// Upload a file to a channel.
    ///
    /// Goes direct instead of through the shared engine: multipart body,
    /// manually attached bearer header, no pacing or retry. A partially
    /// streamed upload must not be re-issued.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the file cannot be read, or a request
    /// error.
    pub async fn upload_file(
        &self,
        channel_id: &str,
        file_path: &Path,
        filename: Option<&str>,
    ) -> Result<Value> {
        let name = match filename {
            Some(name) => name.to_string(),
            None => file_path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .ok_or_else(|| {
                    ClientError::Config(format!("invalid file name: {}", file_path.display()))
                })?,
        };

        let bytes = tokio::fs::read(file_path).await?;
        let part = multipart::Part::bytes(bytes)
            .file_name(name)
            .mime_str("application/octet-stream")
            .map_err(|e| ClientError::Serialization(format!("building multipart body: {e}")))?;
        let form = multipart::Form::new()
            .text("channel_id", channel_id.to_string())
            .part("files", part);

        let url = self.http.endpoint_url("files")?;
        let uploader = reqwest::Client::builder()
            .timeout(self.config.timeout)
            .user_agent(http::USER_AGENT)
            .build()
            .map_err(|e| ClientError::Config(format!("creating upload client: {e}")))?;

        let response = uploader
            .post(url)
            .bearer_auth(&self.config.token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ClientError::Transport(format!("file upload failed: {e}")))?;

        if !response.status().is_success() {
            return Err(http::response_error(response).await);
        }
        http::parse_json(response).await
    }

    /// Get file metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_file_info(&self, file_id: &str) -> Result<Value> {
        self.http
            .get_json(&format!("files/{}/info", encode(file_id)), &[])
            .await
    }

    /// Download a file, streaming the body to `save_path` chunk by chunk.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Io`] if the destination cannot be written, or
    /// a request error.
    pub async fn download_file(&self, file_id: &str, save_path: &Path) -> Result<bool> {
        let mut response = self
            .http
            .request(Method::GET, &format!("files/{}", encode(file_id)), None, &[])
            .await?;

        let mut out = tokio::fs::File::create(save_path).await?;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ClientError::Transport(format!("download failed: {e}")))?
        {
            out.write_all(&chunk).await?;
        }
        out.flush().await?;
        Ok(true)
    }

    /// Get the public link for a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_file_link(&self, file_id: &str) -> Result<String> {
        let response = self
            .http
            .get_json(&format!("files/{}/link", encode(file_id)), &[])
            .await?;
        Ok(response
            .get("link")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    // ─── Utility ─────────────────────────────────────────────────────

    /// Get the server version string, or `unknown` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get_server_version(&self) -> Result<String> {
        let config = self
            .http
            .get_json("config/client", &[("format", "old".to_string())])
            .await?;
        Ok(config
            .get("Version")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }

    /// Probe connectivity and authentication by fetching the bot's own
    /// profile. Absorbs any failure into `false`; this is the one operation
    /// that never propagates errors.
    pub async fn test_connection(&self) -> bool {
        self.http.get_json("users/me", &[]).await.is_ok()
    }

    /// Drop all cached data.
    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }
}

/// Convert a JSON value that must be an array into its items.
fn as_array(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(ClientError::Serialization(format!(
            "expected a JSON array, got: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(team_id: Option<&str>) -> MattermostClient {
        let mut config = ClientConfig::new("https://chat.example.com", "tok-123");
        if let Some(team_id) = team_id {
            config = config.with_team_id(team_id);
        }
        MattermostClient::new(config).expect("client construction")
    }

    #[test]
    fn explicit_team_wins_over_default() {
        let client = client(Some("default-team"));
        let resolved = client.require_team(Some("explicit")).expect("resolves");
        assert_eq!(resolved, "explicit");
    }

    #[test]
    fn default_team_fills_in_when_omitted() {
        let client = client(Some("default-team"));
        let resolved = client.require_team(None).expect("resolves");
        assert_eq!(resolved, "default-team");
    }

    #[test]
    fn missing_team_is_a_config_error() {
        let client = client(None);
        let err = client.require_team(None).expect_err("must fail");
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn array_conversion_rejects_objects() {
        assert!(as_array(json!([1, 2])).is_ok());
        assert!(as_array(json!({"id": "x"})).is_err());
    }
}
