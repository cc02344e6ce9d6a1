//! CLI interface for mmost - Mattermost from the terminal.

use std::io;
use std::path::PathBuf;

use anyhow::{Context as _, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use log::{LevelFilter, debug};
use serde_json::Value;

use mmost_core::models::{NewChannel, PostListOptions, PostSearchOptions, UserSearchOptions};
use mmost_core::paths::write_default_config;
use mmost_core::{APP_NAME, AppConfig, AppPaths, MattermostClient, generate_schema};

/// Repository URL used in generated schema files.
const REPO_URL: &str = "https://github.com/mmost-rs/mmost";

fn main() -> anyhow::Result<()> {
    try_main()
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common.clone())?;
    ctx.init_logging();
    debug!("resolved paths: {}", ctx.paths);

    let rt = tokio::runtime::Runtime::new()?;

    match cli.command {
        Command::Teams { command } => rt.block_on(handle_teams(&ctx, command)),
        Command::Channels { command } => rt.block_on(handle_channels(&ctx, command)),
        Command::Posts { command } => rt.block_on(handle_posts(&ctx, command)),
        Command::Users { command } => rt.block_on(handle_users(&ctx, command)),
        Command::Files { command } => rt.block_on(handle_files(&ctx, command)),
        Command::Test => rt.block_on(handle_test(&ctx)),
        Command::Version => rt.block_on(handle_version(&ctx)),
        Command::Init(cmd) => handle_init(&ctx, cmd),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Completions { shell } => {
            handle_completions(shell);
            Ok(())
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "mmost",
    author,
    version,
    about = "Mattermost from the terminal",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

/// Common CLI options shared across all subcommands.
#[derive(Debug, Clone, Args)]
pub struct CommonOpts {
    /// Override the config file path.
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,
    /// Reduce output to only errors.
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    pub quiet: bool,
    /// Increase logging verbosity (stackable).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Teams the bot belongs to.
    Teams {
        #[command(subcommand)]
        command: TeamsCommand,
    },
    /// Channels within a team.
    Channels {
        #[command(subcommand)]
        command: ChannelsCommand,
    },
    /// Messages in channels.
    Posts {
        #[command(subcommand)]
        command: PostsCommand,
    },
    /// User lookup and presence.
    Users {
        #[command(subcommand)]
        command: UsersCommand,
    },
    /// File upload, download, and metadata.
    Files {
        #[command(subcommand)]
        command: FilesCommand,
    },
    /// Test connection and authentication.
    Test,
    /// Show the server version.
    Version,
    /// Create config directories and default files.
    Init(InitCommand),
    /// Inspect and manage configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Subcommand)]
enum TeamsCommand {
    /// List your teams.
    List,
    /// List members of a team.
    Members {
        /// Team ID (defaults to the configured team).
        #[arg(short, long)]
        team_id: Option<String>,
    },
    /// Show team statistics.
    Stats {
        /// Team ID (defaults to the configured team).
        #[arg(short, long)]
        team_id: Option<String>,
    },
}

#[derive(Debug, Clone, Subcommand)]
enum ChannelsCommand {
    /// List channels in a team.
    List {
        /// Team ID (defaults to the configured team).
        #[arg(short, long)]
        team_id: Option<String>,
    },
    /// Show detailed channel information.
    Info {
        /// Channel ID.
        channel_id: String,
    },
    /// Create a channel.
    Create {
        /// Channel URL name (lowercase, no spaces).
        name: String,
        /// Channel display name.
        display_name: String,
        /// Channel purpose.
        #[arg(long, default_value = "")]
        purpose: String,
        /// Channel header.
        #[arg(long, default_value = "")]
        header: String,
        /// Create as a private channel.
        #[arg(long)]
        private: bool,
        /// Team ID (defaults to the configured team).
        #[arg(short, long)]
        team_id: Option<String>,
    },
    /// Show channel statistics.
    Stats {
        /// Channel ID.
        channel_id: String,
    },
}

#[derive(Debug, Clone, Subcommand)]
enum PostsCommand {
    /// List posts in a channel.
    List {
        /// Channel ID.
        channel_id: String,
        /// Page number.
        #[arg(long, default_value_t = 0)]
        page: u64,
        /// Posts per page (capped at 200 by the platform).
        #[arg(short = 'n', long, default_value_t = 60)]
        per_page: u64,
        /// Only posts modified since this timestamp (milliseconds).
        #[arg(long)]
        since: Option<i64>,
    },
    /// Send a message to a channel.
    Send {
        /// Channel ID.
        channel_id: String,
        /// Message text.
        message: String,
        /// Post ID to reply to.
        #[arg(long)]
        root: Option<String>,
        /// Attach previously uploaded files by ID (repeatable).
        #[arg(long = "file-id")]
        file_ids: Vec<String>,
    },
    /// Search posts across a team.
    Search {
        /// Search query (platform search syntax).
        query: String,
        /// Team ID (defaults to the configured team).
        #[arg(short, long)]
        team_id: Option<String>,
        /// Use OR semantics between terms.
        #[arg(long)]
        or: bool,
    },
    /// Edit an existing message.
    Edit {
        /// Post ID.
        post_id: String,
        /// New message text.
        message: String,
    },
    /// Delete a message.
    Delete {
        /// Post ID.
        post_id: String,
    },
    /// Pin a message to its channel.
    Pin {
        /// Post ID.
        post_id: String,
    },
    /// Unpin a message from its channel.
    Unpin {
        /// Post ID.
        post_id: String,
    },
}

#[derive(Debug, Clone, Subcommand)]
enum UsersCommand {
    /// Search users by username, name, nickname, or email.
    Search {
        /// Search term.
        query: String,
        /// Restrict to a team.
        #[arg(short, long)]
        team_id: Option<String>,
        /// Maximum results.
        #[arg(short, long, default_value_t = 50)]
        limit: u64,
    },
    /// Show a user profile.
    Get {
        /// User ID.
        user_id: String,
    },
    /// Look up several users by ID.
    Ids {
        /// User IDs.
        #[arg(required = true)]
        user_ids: Vec<String>,
    },
    /// Show a user's presence status.
    Status {
        /// User ID.
        user_id: String,
    },
}

#[derive(Debug, Clone, Subcommand)]
enum FilesCommand {
    /// Upload a file to a channel.
    Upload {
        /// Channel ID.
        channel_id: String,
        /// Local file path.
        path: PathBuf,
        /// Override the uploaded filename.
        #[arg(long)]
        filename: Option<String>,
    },
    /// Download a file.
    Download {
        /// File ID.
        file_id: String,
        /// Local save path.
        dest: PathBuf,
    },
    /// Show file metadata.
    Info {
        /// File ID.
        file_id: String,
    },
    /// Show the public link for a file.
    Link {
        /// File ID.
        file_id: String,
    },
}

#[derive(Debug, Clone, Copy, Args)]
struct InitCommand {
    /// Recreate configuration even if it already exists.
    #[arg(long = "force")]
    force: bool,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum ConfigCommand {
    /// Output the effective configuration.
    Show,
    /// Print the resolved config file path.
    Path,
    /// Print the JSON schema.
    Schema,
    /// Regenerate the default configuration file.
    Reset,
}

// ─── Runtime ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    paths: AppPaths,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let paths = AppPaths::discover(common.config.as_deref())?;
        let config = AppConfig::load(&paths, false)?;
        Ok(Self {
            common,
            paths,
            config,
        })
    }

    fn init_logging(&self) {
        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return;
        }
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
        builder.filter_level(self.effective_log_level());
        let _ = builder.try_init();
    }

    const fn effective_log_level(&self) -> LevelFilter {
        match self.common.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    fn client(&self) -> Result<MattermostClient> {
        let client_config = self
            .config
            .server
            .client_config()
            .context("resolving Mattermost credentials (set MATTERMOST_URL and MATTERMOST_TOKEN, or [server] in config.toml)")?;
        Ok(MattermostClient::new(client_config)?)
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_list(items: Vec<Value>) -> Result<()> {
    print_json(&Value::Array(items))
}

// ─── Handlers ────────────────────────────────────────────────────────

async fn handle_teams(ctx: &RuntimeContext, cmd: TeamsCommand) -> Result<()> {
    let client = ctx.client()?;
    match cmd {
        TeamsCommand::List => print_list(client.get_teams().await?),
        TeamsCommand::Members { team_id } => {
            print_list(client.get_team_members(team_id.as_deref()).await?)
        }
        TeamsCommand::Stats { team_id } => {
            print_json(&client.get_team_stats(team_id.as_deref()).await?)
        }
    }
}

async fn handle_channels(ctx: &RuntimeContext, cmd: ChannelsCommand) -> Result<()> {
    let client = ctx.client()?;
    match cmd {
        ChannelsCommand::List { team_id } => {
            print_list(client.get_channels(team_id.as_deref()).await?)
        }
        ChannelsCommand::Info { channel_id } => {
            print_json(&client.get_channel_info(&channel_id).await?)
        }
        ChannelsCommand::Create {
            name,
            display_name,
            purpose,
            header,
            private,
            team_id,
        } => {
            let mut channel = NewChannel::new(name, display_name);
            channel.purpose = purpose;
            channel.header = header;
            if private {
                channel.channel_type = mmost_core::models::ChannelType::Private;
            }
            print_json(&client.create_channel(channel, team_id.as_deref()).await?)
        }
        ChannelsCommand::Stats { channel_id } => {
            print_json(&client.get_channel_stats(&channel_id).await?)
        }
    }
}

async fn handle_posts(ctx: &RuntimeContext, cmd: PostsCommand) -> Result<()> {
    let client = ctx.client()?;
    match cmd {
        PostsCommand::List {
            channel_id,
            page,
            per_page,
            since,
        } => {
            let options = PostListOptions {
                page,
                per_page,
                since,
                ..PostListOptions::default()
            };
            print_json(&client.get_posts(&channel_id, &options).await?)
        }
        PostsCommand::Send {
            channel_id,
            message,
            root,
            file_ids,
        } => {
            let files = if file_ids.is_empty() {
                None
            } else {
                Some(file_ids.as_slice())
            };
            print_json(
                &client
                    .send_message(&channel_id, &message, root.as_deref(), files)
                    .await?,
            )
        }
        PostsCommand::Search { query, team_id, or } => {
            let options = PostSearchOptions {
                is_or_search: or,
                ..PostSearchOptions::default()
            };
            print_json(
                &client
                    .search_posts(&query, team_id.as_deref(), &options)
                    .await?,
            )
        }
        PostsCommand::Edit { post_id, message } => {
            print_json(&client.update_message(&post_id, &message).await?)
        }
        PostsCommand::Delete { post_id } => {
            let deleted = client.delete_message(&post_id).await?;
            println!("deleted: {deleted}");
            Ok(())
        }
        PostsCommand::Pin { post_id } => print_json(&client.pin_message(&post_id).await?),
        PostsCommand::Unpin { post_id } => print_json(&client.unpin_message(&post_id).await?),
    }
}

async fn handle_users(ctx: &RuntimeContext, cmd: UsersCommand) -> Result<()> {
    let client = ctx.client()?;
    match cmd {
        UsersCommand::Search {
            query,
            team_id,
            limit,
        } => {
            let options = UserSearchOptions {
                team_id,
                limit,
                ..UserSearchOptions::default()
            };
            print_list(client.search_users(&query, &options).await?)
        }
        UsersCommand::Get { user_id } => print_json(&client.get_user_profile(&user_id).await?),
        UsersCommand::Ids { user_ids } => print_list(client.get_users_by_ids(&user_ids).await?),
        UsersCommand::Status { user_id } => print_json(&client.get_user_status(&user_id).await?),
    }
}

async fn handle_files(ctx: &RuntimeContext, cmd: FilesCommand) -> Result<()> {
    let client = ctx.client()?;
    match cmd {
        FilesCommand::Upload {
            channel_id,
            path,
            filename,
        } => print_json(
            &client
                .upload_file(&channel_id, &path, filename.as_deref())
                .await?,
        ),
        FilesCommand::Download { file_id, dest } => {
            client.download_file(&file_id, &dest).await?;
            println!("saved to {}", dest.display());
            Ok(())
        }
        FilesCommand::Info { file_id } => print_json(&client.get_file_info(&file_id).await?),
        FilesCommand::Link { file_id } => {
            println!("{}", client.get_file_link(&file_id).await?);
            Ok(())
        }
    }
}

async fn handle_test(ctx: &RuntimeContext) -> Result<()> {
    let client = ctx.client()?;
    if client.test_connection().await {
        let version = client
            .get_server_version()
            .await
            .unwrap_or_else(|_| "unknown".to_string());
        println!("Connected to {} (server version {version})", client.api_url());
        Ok(())
    } else {
        Err(anyhow!(
            "connection failed: check the server URL and token"
        ))
    }
}

async fn handle_version(ctx: &RuntimeContext) -> Result<()> {
    let client = ctx.client()?;
    println!("{}", client.get_server_version().await?);
    Ok(())
}

fn handle_init(ctx: &RuntimeContext, cmd: InitCommand) -> Result<()> {
    if ctx.paths.config_file.exists() && !cmd.force {
        println!(
            "config already exists at {} (use --force to recreate)",
            ctx.paths.config_file.display()
        );
        return Ok(());
    }
    write_default_config(&ctx.paths.config_file)?;
    ctx.paths.ensure_directories()?;
    println!("created {}", ctx.paths.config_file.display());
    Ok(())
}

fn handle_config(ctx: &RuntimeContext, cmd: ConfigCommand) -> Result<()> {
    match cmd {
        ConfigCommand::Show => {
            print!("{}", toml::to_string_pretty(&ctx.config)?);
            Ok(())
        }
        ConfigCommand::Path => {
            println!("{}", ctx.paths.config_file.display());
            Ok(())
        }
        ConfigCommand::Schema => {
            println!("{}", generate_schema(APP_NAME, REPO_URL)?);
            Ok(())
        }
        ConfigCommand::Reset => {
            write_default_config(&ctx.paths.config_file)?;
            println!("reset {}", ctx.paths.config_file.display());
            Ok(())
        }
    }
}

fn handle_completions(shell: Shell) {
    clap_complete::generate(shell, &mut Cli::command(), "mmost", &mut io::stdout());
}
