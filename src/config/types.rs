//! Core configuration types and loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ps_proto::LoginSettings;
use serde::Deserialize;
use thiserror::Error;

use super::defaults::{
    default_command_token, default_host, default_log_level, default_login_url, default_port,
    default_query_timeout_ms, default_reconnect_delay_secs, default_send_delay_ms,
};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to encode saved rooms: {0}")]
    Json(#[from] serde_json::Error),
}

/// Bot configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Account and behavior settings.
    pub bot: BotConfig,
    /// Upstream server connection settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Login server settings.
    #[serde(default)]
    pub login: LoginConfig,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Account identity and behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Account name the bot logs in as.
    pub name: String,
    /// Account password. Unregistered names log in without one.
    #[serde(default)]
    pub pass: Option<String>,
    /// Rooms joined after login.
    #[serde(default)]
    pub rooms: Vec<String>,
    /// Where rooms joined at runtime are saved. Defaults to `rooms.json`
    /// next to the config file.
    #[serde(default)]
    pub rooms_file: Option<PathBuf>,
    /// Status message set after login.
    #[serde(default)]
    pub status: Option<String>,
    /// Avatar set after login.
    #[serde(default)]
    pub avatar: Option<String>,
    /// Prefix marking a chat line as a command (default: "!").
    #[serde(default = "default_command_token")]
    pub command_token: String,
    /// User ids allowed to run sysop-only commands.
    #[serde(default)]
    pub sysops: Vec<String>,
}

impl BotConfig {
    /// Settings for the login state machine.
    pub fn login_settings(&self) -> LoginSettings {
        LoginSettings {
            name: self.name.clone(),
            pass: self.pass.clone(),
            rooms: self.rooms.clone(),
            avatar: self.avatar.clone(),
            status: self.status.clone(),
        }
    }
}

/// Upstream server connection.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server host. A bare name without a dot expands to `<name>.psim.us`.
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port (default: 443).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Force `wss` on a port other than 443.
    #[serde(default)]
    pub secure: bool,
    /// Deliver transient transport errors as events instead of ending the session.
    #[serde(default)]
    pub recover_errors: bool,
    /// Minimum delay between outbound frames in milliseconds (default: 100).
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,
    /// Delay before reconnecting after the session ends, in seconds (default: 60).
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    /// Per-query timeout in milliseconds; 0 waits forever (default: 5000).
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secure: false,
            recover_errors: false,
            send_delay_ms: default_send_delay_ms(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

impl ServerConfig {
    /// WebSocket URL for this server.
    pub fn url(&self) -> String {
        let host = if self.host.contains('.') {
            self.host.clone()
        } else {
            format!("{}.psim.us", self.host)
        };
        let scheme = if self.secure || self.port == 443 {
            "wss"
        } else {
            "ws"
        };
        format!("{scheme}://{host}:{}/showdown/websocket", self.port)
    }

    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// `None` when queries wait forever.
    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout_ms > 0).then(|| Duration::from_millis(self.query_timeout_ms))
    }
}

/// Login server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginConfig {
    /// Action endpoint receiving the credential exchange.
    #[serde(default = "default_login_url")]
    pub url: String,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            url: default_login_url(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration. `RUST_LOG` takes precedence over `level`.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
