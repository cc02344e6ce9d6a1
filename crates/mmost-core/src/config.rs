//! Configuration types and loading for the application.
//!
//! Two layers: [`AppConfig`] is the TOML file + environment configuration used
//! by the binaries, and [`ClientConfig`] is the validated, immutable set of
//! values the API client is constructed from. Server credentials honor the
//! conventional `MATTERMOST_URL`, `MATTERMOST_TOKEN`, and `MATTERMOST_TEAM_ID`
//! environment variables, which override file values.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use config::{Config, Environment, File, FileFormat};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;
use crate::paths::write_default_config;
use crate::{AppPaths, env_prefix};

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default maximum number of retries for transient failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Environment prefix for server credential variables.
const CREDENTIAL_ENV_PREFIX: &str = "MATTERMOST";

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(
    title = "mmost configuration",
    description = "Configuration for the mmost CLI and MCP server"
)]
pub struct AppConfig {
    /// JSON Schema reference for editor support.
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub schema: Option<String>,

    /// Mattermost server connection settings.
    pub server: ServerConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from file and environment, creating defaults if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read, parsed, or written.
    pub fn load(paths: &AppPaths, dry_run: bool) -> Result<Self> {
        if !paths.config_file.exists() {
            if dry_run {
                log::info!(
                    "dry-run: would create default config at {}",
                    paths.config_file.display()
                );
            } else {
                write_default_config(&paths.config_file)?;
            }
        }

        Self::load_from_path(&paths.config_file)
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed.
    pub fn load_from_path(config_file: &Path) -> Result<Self> {
        let env_prefix = env_prefix();
        let built = Config::builder()
            .set_default("server.timeout", i64::try_from(DEFAULT_TIMEOUT_SECS)?)?
            .set_default("server.max_retries", i64::from(DEFAULT_MAX_RETRIES))?
            .set_default("logging.level", "info")?
            .add_source(
                File::from(config_file)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::with_prefix(env_prefix.as_str()).separator("__"))
            .build()?;

        let config: Self = built.try_deserialize()?;
        Ok(config)
    }
}

/// Mattermost server connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Mattermost server connection settings")]
pub struct ServerConfig {
    /// Server base URL (e.g. `https://chat.example.com`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Bot access token used as the bearer credential.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Default team ID for team-scoped operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,

    /// Request timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 1))]
    pub timeout: Option<u64>,

    /// Maximum retries for transient failures on idempotent requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

/// Raw credential values after merging file and environment sources.
#[derive(Debug, Deserialize)]
struct RawClientConfig {
    url: Option<String>,
    token: Option<String>,
    team_id: Option<String>,
    timeout: u64,
    max_retries: u32,
}

impl ServerConfig {
    /// Resolve this section into a validated [`ClientConfig`], applying
    /// `MATTERMOST_*` environment overrides on top of file values.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if the URL or token is missing after
    /// all sources are merged.
    pub fn client_config(&self) -> Result<ClientConfig, ClientError> {
        let mut builder = Config::builder()
            .set_default("timeout", self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS))
            .map_err(config_err)?
            .set_default(
                "max_retries",
                self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            )
            .map_err(config_err)?;

        if let Some(ref url) = self.url {
            builder = builder.set_default("url", url.clone()).map_err(config_err)?;
        }
        if let Some(ref token) = self.token {
            builder = builder
                .set_default("token", token.clone())
                .map_err(config_err)?;
        }
        if let Some(ref team_id) = self.team_id {
            builder = builder
                .set_default("team_id", team_id.clone())
                .map_err(config_err)?;
        }

        let built = builder
            .add_source(Environment::with_prefix(CREDENTIAL_ENV_PREFIX))
            .build()
            .map_err(config_err)?;

        let raw: RawClientConfig = built.try_deserialize().map_err(config_err)?;

        let url = raw
            .url
            .filter(|s| !s.is_empty())
            .ok_or_else(missing_credentials)?;
        let token = raw
            .token
            .filter(|s| !s.is_empty())
            .ok_or_else(missing_credentials)?;

        Ok(ClientConfig {
            url,
            token,
            team_id: raw.team_id.filter(|s| !s.is_empty()),
            timeout: Duration::from_secs(raw.timeout),
            max_retries: raw.max_retries,
        })
    }
}

fn config_err(err: config::ConfigError) -> ClientError {
    ClientError::Config(err.to_string())
}

fn missing_credentials() -> ClientError {
    ClientError::Config("Mattermost URL and token are required".to_string())
}

/// Validated, immutable configuration for one API client instance.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server base URL.
    pub url: String,
    /// Bot access token.
    pub token: String,
    /// Default team ID for team-scoped operations.
    pub team_id: Option<String>,
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum retries for transient failures on idempotent requests.
    pub max_retries: u32,
}

impl ClientConfig {
    /// Build a configuration from an explicit URL and token.
    #[must_use]
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            team_id: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Build a configuration from `MATTERMOST_*` environment variables alone.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if `MATTERMOST_URL` or
    /// `MATTERMOST_TOKEN` is unset.
    pub fn from_env() -> Result<Self, ClientError> {
        ServerConfig::default().client_config()
    }

    /// Set the default team ID.
    #[must_use]
    pub fn with_team_id(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the maximum retry count.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Check that the required URL and token are present and non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if either is empty.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.url.is_empty() || self.token.is_empty() {
            return Err(missing_credentials());
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
#[schemars(description = "Logging configuration")]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace).
    pub level: LogLevel,

    /// Optional path for log file output. Supports ~ and environment variables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

/// Log level enumeration for schema validation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only emit error-level messages.
    Error,
    /// Emit warnings and errors.
    Warn,
    /// Emit informational messages and above (default).
    #[default]
    Info,
    /// Emit debug diagnostics and above.
    Debug,
    /// Emit all messages including fine-grained traces.
    Trace,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
            Self::Trace => write!(f, "trace"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_config_applies_builders() {
        let cfg = ClientConfig::new("https://chat.example.com", "tok-123")
            .with_team_id("team-1")
            .with_timeout(Duration::from_secs(5))
            .with_max_retries(1);

        assert_eq!(cfg.url, "https://chat.example.com");
        assert_eq!(cfg.team_id.as_deref(), Some("team-1"));
        assert_eq!(cfg.timeout, Duration::from_secs(5));
        assert_eq!(cfg.max_retries, 1);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn empty_credentials_fail_validation() {
        let cfg = ClientConfig::new("", "");
        let err = cfg.validate().expect_err("empty credentials must fail");
        assert!(matches!(err, ClientError::Config(_)));
        assert!(err.to_string().contains("URL and token are required"));
    }

    #[test]
    fn server_section_resolves_to_client_config() {
        let section = ServerConfig {
            url: Some("https://chat.example.com".to_string()),
            token: Some("tok-123".to_string()),
            team_id: Some("team-1".to_string()),
            timeout: Some(10),
            max_retries: Some(2),
        };

        let cfg = section.client_config().expect("resolves");
        assert_eq!(cfg.url, "https://chat.example.com");
        assert_eq!(cfg.token, "tok-123");
        assert_eq!(cfg.team_id.as_deref(), Some("team-1"));
        assert_eq!(cfg.timeout, Duration::from_secs(10));
        assert_eq!(cfg.max_retries, 2);
    }
}
