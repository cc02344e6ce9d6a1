//! MCP server exposing Mattermost operations as a tool catalog.
//!
//! Each tool maps onto exactly one client method. Results are returned as
//! pretty-printed JSON text; client errors become error text carrying the
//! status code when one is present. Only a configuration error at startup
//! is fatal.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context as _, Result};
use clap::{Args, Parser};
use rmcp::{
    ErrorData as McpError, ServerHandler, ServiceExt,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars::JsonSchema,
    serde::{Deserialize, Serialize},
    tool, tool_handler, tool_router,
    transport::io::stdio,
};

use rmcp::schemars;

use mmost_core::models::{
    ChannelType, NewChannel, PostListOptions, PostSearchOptions, UserSearchOptions,
};
use mmost_core::{AppConfig, AppPaths, ClientError, MattermostClient};

fn main() -> anyhow::Result<()> {
    try_main()
}

#[tokio::main]
async fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn"),
    )
    .try_init();

    let paths = AppPaths::discover(cli.common.config.as_deref())?;
    let config = AppConfig::load(&paths, false)?;

    // Missing credentials are the one fatal startup condition.
    let client_config = config
        .server
        .client_config()
        .context("resolving Mattermost credentials")?;
    let client = MattermostClient::new(client_config)?;

    let server = McpServer::new(client);
    let transport = stdio();

    let service = server
        .serve(transport)
        .await
        .map_err(|e| anyhow::anyhow!("MCP server error: {e}"))?;

    service.waiting().await?;

    Ok(())
}

#[derive(Debug, Parser)]
#[command(author, version, about = "MCP server for Mattermost")]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

// ─── Tool parameters ─────────────────────────────────────────────────

/// Parameters for listing channels
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct ListChannelsParams {
    /// Team ID (optional, uses default if not provided)
    team_id: Option<String>,
}

/// Parameters for creating a channel
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct CreateChannelParams {
    /// Channel URL name (lowercase, no spaces)
    name: String,
    /// Channel display name
    display_name: String,
    /// Channel purpose/description
    purpose: Option<String>,
    /// Channel header text
    header: Option<String>,
    /// O for open, P for private
    channel_type: Option<String>,
    /// Team ID (optional)
    team_id: Option<String>,
}

/// Parameters identifying a channel
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct ChannelParams {
    /// Channel ID
    channel_id: String,
}

/// Parameters for adding a user to a channel
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct AddUserToChannelParams {
    /// Channel ID
    channel_id: String,
    /// User ID to add
    user_id: String,
}

/// Parameters for searching messages
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct SearchMessagesParams {
    /// Search query
    query: String,
    /// Team ID (optional)
    team_id: Option<String>,
    /// True for OR search, False for AND
    is_or_search: Option<bool>,
    /// Page number
    page: Option<u64>,
    /// Results per page
    per_page: Option<u64>,
}

/// Parameters for reading recent channel messages
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct GetChannelMessagesParams {
    /// Channel ID
    channel_id: String,
    /// Number of messages to retrieve
    limit: Option<u64>,
    /// Only messages from the last N hours
    since_hours: Option<u64>,
}

/// Parameters for sending a message
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct SendMessageParams {
    /// Channel ID
    channel_id: String,
    /// Message text
    message: String,
    /// Post ID to reply to (optional)
    reply_to: Option<String>,
}

/// Parameters identifying a post
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct PostParams {
    /// Post ID
    post_id: String,
}

/// Parameters for searching users
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct SearchUsersParams {
    /// Search term (username, name, email)
    query: String,
    /// Team ID (optional)
    team_id: Option<String>,
    /// Maximum results
    limit: Option<u64>,
}

/// Parameters identifying a user
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct UserParams {
    /// User ID
    user_id: String,
}

/// Parameters for listing team members
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct GetTeamMembersParams {
    /// Team ID (optional)
    team_id: Option<String>,
}

/// Parameters for uploading a file
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct UploadFileParams {
    /// Channel ID
    channel_id: String,
    /// Local file path
    file_path: String,
    /// Custom filename (optional)
    filename: Option<String>,
}

/// Parameters for downloading a file
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct DownloadFileParams {
    /// File ID
    file_id: String,
    /// Local save path
    save_path: String,
}

/// Parameters identifying a file
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct FileParams {
    /// File ID
    file_id: String,
}

// ─── Server ──────────────────────────────────────────────────────────

#[derive(Clone)]
struct McpServer {
    client: Arc<MattermostClient>,
    tool_router: ToolRouter<Self>,
}

impl McpServer {
    fn new(client: MattermostClient) -> Self {
        Self {
            client: Arc::new(client),
            tool_router: Self::tool_router(),
        }
    }
}

/// Wrap a JSON result as pretty-printed text content.
fn json_result(value: &serde_json::Value) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

/// Render a client error as error text, with the status code when present.
fn error_result(err: &ClientError) -> Result<CallToolResult, McpError> {
    let mut text = format!("Mattermost API error: {err}");
    if let Some(status) = err.status() {
        text.push_str(&format!(" (status: {status})"));
    }
    Ok(CallToolResult::error(vec![Content::text(text)]))
}

/// Milliseconds since the epoch, `hours` ago.
fn since_millis(hours: u64) -> i64 {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64);
    now_ms - (hours as i64) * 3_600_000
}

#[tool_router]
impl McpServer {
    // ─── Channel management ──────────────────────────────────────────

    #[tool(description = "Get all accessible channels in a team")]
    async fn list_channels(
        &self,
        Parameters(params): Parameters<ListChannelsParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.client.get_channels(params.team_id.as_deref()).await {
            Ok(channels) => json_result(&serde_json::Value::Array(channels)),
            Err(err) => error_result(&err),
        }
    }

    #[tool(description = "Create a new channel")]
    async fn create_channel(
        &self,
        Parameters(params): Parameters<CreateChannelParams>,
    ) -> Result<CallToolResult, McpError> {
        let channel = NewChannel {
            name: params.name,
            display_name: params.display_name,
            purpose: params.purpose.unwrap_or_default(),
            header: params.header.unwrap_or_default(),
            channel_type: params
                .channel_type
                .as_deref()
                .map_or(ChannelType::Open, ChannelType::from_code),
        };
        match self
            .client
            .create_channel(channel, params.team_id.as_deref())
            .await
        {
            Ok(created) => json_result(&created),
            Err(err) => error_result(&err),
        }
    }

    #[tool(description = "Get detailed information about a channel")]
    async fn get_channel_info(
        &self,
        Parameters(params): Parameters<ChannelParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.client.get_channel_info(&params.channel_id).await {
            Ok(channel) => json_result(&channel),
            Err(err) => error_result(&err),
        }
    }

    #[tool(description = "Add a user to a channel")]
    async fn add_user_to_channel(
        &self,
        Parameters(params): Parameters<AddUserToChannelParams>,
    ) -> Result<CallToolResult, McpError> {
        match self
            .client
            .add_user_to_channel(&params.channel_id, &params.user_id)
            .await
        {
            Ok(member) => json_result(&member),
            Err(err) => error_result(&err),
        }
    }

    // ─── Message operations ──────────────────────────────────────────

    #[tool(description = "Search for messages across channels")]
    async fn search_messages(
        &self,
        Parameters(params): Parameters<SearchMessagesParams>,
    ) -> Result<CallToolResult, McpError> {
        let mut options = PostSearchOptions::default();
        if let Some(is_or_search) = params.is_or_search {
            options.is_or_search = is_or_search;
        }
        if let Some(page) = params.page {
            options.page = page;
        }
        if let Some(per_page) = params.per_page {
            options.per_page = per_page;
        }
        match self
            .client
            .search_posts(&params.query, params.team_id.as_deref(), &options)
            .await
        {
            Ok(results) => json_result(&results),
            Err(err) => error_result(&err),
        }
    }

    #[tool(description = "Get recent messages from a channel")]
    async fn get_channel_messages(
        &self,
        Parameters(params): Parameters<GetChannelMessagesParams>,
    ) -> Result<CallToolResult, McpError> {
        let options = PostListOptions {
            per_page: params.limit.unwrap_or(20),
            since: params.since_hours.map(since_millis),
            ..PostListOptions::default()
        };
        match self.client.get_posts(&params.channel_id, &options).await {
            Ok(posts) => json_result(&posts),
            Err(err) => error_result(&err),
        }
    }

    #[tool(description = "Send a message to a channel")]
    async fn send_message(
        &self,
        Parameters(params): Parameters<SendMessageParams>,
    ) -> Result<CallToolResult, McpError> {
        match self
            .client
            .send_message(
                &params.channel_id,
                &params.message,
                params.reply_to.as_deref(),
                None,
            )
            .await
        {
            Ok(post) => json_result(&post),
            Err(err) => error_result(&err),
        }
    }

    #[tool(description = "Pin a message to the channel")]
    async fn pin_message(
        &self,
        Parameters(params): Parameters<PostParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.client.pin_message(&params.post_id).await {
            Ok(result) => json_result(&result),
            Err(err) => error_result(&err),
        }
    }

    // ─── User operations ─────────────────────────────────────────────

    #[tool(description = "Search for users in the team")]
    async fn search_users(
        &self,
        Parameters(params): Parameters<SearchUsersParams>,
    ) -> Result<CallToolResult, McpError> {
        let options = UserSearchOptions {
            team_id: params.team_id,
            limit: params.limit.unwrap_or(20),
            ..UserSearchOptions::default()
        };
        match self.client.search_users(&params.query, &options).await {
            Ok(users) => json_result(&serde_json::Value::Array(users)),
            Err(err) => error_result(&err),
        }
    }

    #[tool(description = "Get detailed user profile information")]
    async fn get_user_profile(
        &self,
        Parameters(params): Parameters<UserParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.client.get_user_profile(&params.user_id).await {
            Ok(user) => json_result(&user),
            Err(err) => error_result(&err),
        }
    }

    #[tool(description = "Get all members of a team")]
    async fn get_team_members(
        &self,
        Parameters(params): Parameters<GetTeamMembersParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.client.get_team_members(params.team_id.as_deref()).await {
            Ok(members) => json_result(&serde_json::Value::Array(members)),
            Err(err) => error_result(&err),
        }
    }

    #[tool(description = "Get user online/offline status")]
    async fn get_user_presence(
        &self,
        Parameters(params): Parameters<UserParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.client.get_user_status(&params.user_id).await {
            Ok(status) => json_result(&status),
            Err(err) => error_result(&err),
        }
    }

    // ─── File operations ─────────────────────────────────────────────

    #[tool(description = "Upload a file to a channel")]
    async fn upload_file(
        &self,
        Parameters(params): Parameters<UploadFileParams>,
    ) -> Result<CallToolResult, McpError> {
        let path = PathBuf::from(&params.file_path);
        match self
            .client
            .upload_file(&params.channel_id, &path, params.filename.as_deref())
            .await
        {
            Ok(result) => json_result(&result),
            Err(err) => error_result(&err),
        }
    }

    #[tool(description = "Download a file from Mattermost")]
    async fn download_file(
        &self,
        Parameters(params): Parameters<DownloadFileParams>,
    ) -> Result<CallToolResult, McpError> {
        let path = PathBuf::from(&params.save_path);
        match self.client.download_file(&params.file_id, &path).await {
            Ok(success) => json_result(&serde_json::json!({
                "success": success,
                "saved_to": params.save_path,
            })),
            Err(err) => error_result(&err),
        }
    }

    #[tool(description = "Get file metadata and information")]
    async fn get_file_info(
        &self,
        Parameters(params): Parameters<FileParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.client.get_file_info(&params.file_id).await {
            Ok(info) => json_result(&info),
            Err(err) => error_result(&err),
        }
    }

    // ─── Administrative ──────────────────────────────────────────────

    #[tool(description = "Get channel statistics and activity metrics")]
    async fn get_channel_stats(
        &self,
        Parameters(params): Parameters<ChannelParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.client.get_channel_stats(&params.channel_id).await {
            Ok(stats) => json_result(&stats),
            Err(err) => error_result(&err),
        }
    }

    #[tool(description = "Test Mattermost connection and authentication")]
    async fn test_connection(&self) -> Result<CallToolResult, McpError> {
        let connected = self.client.test_connection().await;
        let version = if connected {
            self.client
                .get_server_version()
                .await
                .unwrap_or_else(|_| "unknown".to_string())
        } else {
            "unknown".to_string()
        };
        json_result(&serde_json::json!({
            "connected": connected,
            "server_version": version,
            "api_url": connected.then(|| self.client.api_url().to_string()),
        }))
    }
}

#[tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "MCP server exposing Mattermost channel, message, user, and file operations"
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
