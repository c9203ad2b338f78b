//! Bot configuration.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Configuration printed by `--print-config`.
pub const DEFAULT_CONFIG: &str = r##"# IRC bot configuration

[server]
# Host name or address of the IRC server
host = "irc.libera.chat"
port = 6667

[identity]
# Nicknames to try in order; "_" is appended once the list is exhausted
nicks = ["rpbot", "rpbot_"]
# Real name sent with USER
name = "rpbot"
login = "rpbot"

# Channels joined after registration completes
# [[channels]]
# name = "#rpbot"
# key = "secret"

[engine]
# Size of each of the read and write ring buffers, in bytes
buffer_size = 2048
# Upper bound on a single wait for socket readiness
poll_timeout_ms = 500
# Delay before reconnecting after a failure or disconnect
retry_delay_ms = 30000
# Time allowed for each resolved address to finish connecting
connect_timeout_ms = 5000
tcp_nodelay = true

[logging]
# Log level: "error", "warn", "info", "debug", "trace"
# Can be overridden with RUST_LOG environment variable
level = "info"
# Log format: "pretty" (human-readable), "json", or "compact"
format = "pretty"
# Include timestamps
timestamps = true
"##;

/// Bot configuration loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,

    pub identity: IdentityConfig,

    /// Channels joined once registration completes
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid("server.host must not be empty".into()));
        }

        if self.identity.nicks.is_empty() {
            return Err(ConfigError::Invalid(
                "identity.nicks must contain at least one nickname".into(),
            ));
        }

        for nick in &self.identity.nicks {
            check_word("identity.nicks", nick)?;
        }
        check_word("identity.login", &self.identity.login)?;
        check_text("identity.name", &self.identity.name)?;

        for channel in &self.channels {
            check_word("channels.name", &channel.name)?;
            if let Some(key) = &channel.key {
                check_word("channels.key", key)?;
            }
        }

        if self.engine.buffer_size == 0 {
            return Err(ConfigError::Invalid(
                "engine.buffer_size must be greater than zero".into(),
            ));
        }

        Ok(())
    }

    /// Settings for the connection engine.
    pub fn engine_config(&self) -> io_engine::Config {
        let mut config = io_engine::Config::new(self.server.host.clone(), self.server.port);
        config.retry_delay = Duration::from_millis(self.engine.retry_delay_ms);
        config.connect_timeout = Duration::from_millis(self.engine.connect_timeout_ms);
        config.tcp_nodelay = self.engine.tcp_nodelay;
        config
    }
}

/// A value sent as a single IRC parameter: non-empty, no spaces or control
/// characters.
fn check_word(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.is_empty() || value.contains(|c: char| c.is_whitespace() || c.is_control()) {
        return Err(ConfigError::Invalid(format!(
            "{} must be a single word without control characters: {:?}",
            field, value
        )));
    }
    Ok(())
}

/// A value sent as a trailing IRC parameter: spaces allowed, line breaks
/// and other control characters are not.
fn check_text(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.contains(char::is_control) {
        return Err(ConfigError::Invalid(format!(
            "{} must not contain control characters: {:?}",
            field, value
        )));
    }
    Ok(())
}

/// IRC server to connect to.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,

    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
}

impl ServerConfig {
    fn default_port() -> u16 {
        6667
    }
}

/// Who the bot registers as.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityConfig {
    /// Nicknames in order of preference
    pub nicks: Vec<String>,

    /// Real name sent with `USER`
    #[serde(default = "IdentityConfig::default_name")]
    pub name: String,

    /// User name sent with `USER`
    #[serde(default = "IdentityConfig::default_login")]
    pub login: String,
}

impl IdentityConfig {
    fn default_name() -> String {
        "rpbot".to_string()
    }

    fn default_login() -> String {
        "rpbot".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    pub name: String,

    #[serde(default)]
    pub key: Option<String>,
}

/// Connection engine tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Capacity of each ring buffer in bytes
    #[serde(default = "EngineConfig::default_buffer_size")]
    pub buffer_size: usize,

    #[serde(default = "EngineConfig::default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    #[serde(default = "EngineConfig::default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "EngineConfig::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "EngineConfig::default_tcp_nodelay")]
    pub tcp_nodelay: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_size: Self::default_buffer_size(),
            poll_timeout_ms: Self::default_poll_timeout_ms(),
            retry_delay_ms: Self::default_retry_delay_ms(),
            connect_timeout_ms: Self::default_connect_timeout_ms(),
            tcp_nodelay: Self::default_tcp_nodelay(),
        }
    }
}

impl EngineConfig {
    fn default_buffer_size() -> usize {
        2048
    }

    fn default_poll_timeout_ms() -> u64 {
        500
    }

    fn default_retry_delay_ms() -> u64 {
        io_engine::DEFAULT_RETRY_DELAY.as_millis() as u64
    }

    fn default_connect_timeout_ms() -> u64 {
        io_engine::DEFAULT_CONNECT_TIMEOUT.as_millis() as u64
    }

    fn default_tcp_nodelay() -> bool {
        true
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default = "LoggingConfig::default_timestamps")]
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            format: LogFormat::default(),
            timestamps: Self::default_timestamps(),
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }

    fn default_timestamps() -> bool {
        true
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
