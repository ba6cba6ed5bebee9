use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::trace;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./collector.db")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_address")]
    pub address: IpAddr,
    #[serde(default = "crate::util::get_default_port")]
    pub port: u16,
    /// Seconds between two notification mails, unless a client overrides it
    #[serde(default = "default_notification_period")]
    pub default_notification_period: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: crate::util::get_default_port(),
            default_notification_period: default_notification_period(),
        }
    }
}

fn default_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_notification_period() -> u64 {
    3600
}

/// Outgoing notification mails.
///
/// Templates use named placeholders: `{user_key}` and `{limits}` in the
/// body, `{metric}`, `{value}` and `{limit}` in the limit line.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct MailConfig {
    /// Relay to deliver through; mails are only logged without one
    pub smtp: Option<SmtpConfig>,
    #[serde(default = "default_sender")]
    pub sender: String,
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default = "default_body")]
    pub body: String,
    #[serde(default = "default_limit_line")]
    pub limit_line: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp: None,
            sender: default_sender(),
            subject: default_subject(),
            body: default_body(),
            limit_line: default_limit_line(),
        }
    }
}

fn default_sender() -> String {
    String::from("collector@localhost")
}

fn default_subject() -> String {
    String::from("Resource limits exceeded")
}

fn default_body() -> String {
    String::from("Client {user_key} exceeded its resource limits:\n\n{limits}")
}

fn default_limit_line() -> String {
    String::from("{metric}: detected value: {value}, limit: {limit}")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
pub struct Limits {
    /// Percent
    pub cpu: u8,
    /// Percent
    pub memory: u8,
    pub processes: u32,
}

/// A known agent, looked up by its key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub key: String,
    pub mail: String,
    pub notification_period: Duration,
    pub limits: Limits,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct ClientEntry {
    key: String,
    mail: String,
    notification_period: Option<u64>,
    limits: Limits,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct ConfigFile {
    #[serde(default)]
    server: ServerSettings,
    #[serde(default)]
    storage: StorageConfig,
    #[serde(default)]
    mail: MailConfig,
    clients: Vec<ClientEntry>,
}

/// Validated collector configuration.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(try_from = "ConfigFile")]
pub struct Config {
    pub server: ServerSettings,
    pub storage: StorageConfig,
    pub mail: MailConfig,
    clients: HashMap<String, ClientConfig>,
}

impl Config {
    pub fn new(
        server: ServerSettings,
        storage: StorageConfig,
        mail: MailConfig,
        clients: impl IntoIterator<Item = ClientConfig>,
    ) -> Result<Config, ConfigError> {
        let mut by_key = HashMap::new();
        for client in clients {
            validate_key(&client.key)?;
            validate_percentage(&client.key, "cpu", client.limits.cpu)?;
            validate_percentage(&client.key, "memory", client.limits.memory)?;

            if by_key.contains_key(&client.key) {
                return Err(ConfigError::DuplicateKey(client.key));
            }
            by_key.insert(client.key.clone(), client);
        }

        Ok(Self {
            server,
            storage,
            mail,
            clients: by_key,
        })
    }

    pub fn client(&self, key: &str) -> Option<&ClientConfig> {
        self.clients.get(key)
    }

    pub fn clients(&self) -> impl Iterator<Item = &ClientConfig> {
        self.clients.values()
    }
}

impl TryFrom<ConfigFile> for Config {
    type Error = ConfigError;

    fn try_from(file: ConfigFile) -> Result<Self, Self::Error> {
        let default_period = file.server.default_notification_period;
        let clients = file.clients.into_iter().map(|entry| ClientConfig {
            key: entry.key,
            mail: entry.mail,
            notification_period: Duration::from_secs(
                entry.notification_period.unwrap_or(default_period),
            ),
            limits: entry.limits,
        });

        Config::new(file.server, file.storage, file.mail, clients)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
struct AgentConfigFile {
    key: String,
    #[serde(default = "default_update_interval")]
    update_interval: u64,
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "crate::util::get_default_port")]
    port: u16,
}

fn default_update_interval() -> u64 {
    60
}

fn default_host() -> String {
    String::from("localhost")
}

/// Validated agent configuration.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(try_from = "AgentConfigFile")]
pub struct AgentConfig {
    pub key: String,
    pub update_interval: Duration,
    pub host: String,
    pub port: u16,
}

impl TryFrom<AgentConfigFile> for AgentConfig {
    type Error = ConfigError;

    fn try_from(file: AgentConfigFile) -> Result<Self, Self::Error> {
        validate_key(&file.key)?;
        if file.update_interval == 0 {
            return Err(ConfigError::InvalidInterval);
        }

        Ok(Self {
            key: file.key,
            update_interval: Duration::from_secs(file.update_interval),
            host: file.host,
            port: file.port,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Keys must be non-empty and consist of `[0-9A-Za-z_]`
    InvalidKey(String),
    DuplicateKey(String),
    LimitOutOfRange {
        key: String,
        metric: &'static str,
        value: u8,
    },
    InvalidInterval,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidKey(key) => write!(f, "invalid client key \"{key}\""),
            ConfigError::DuplicateKey(key) => write!(f, "duplicate client key \"{key}\""),
            ConfigError::LimitOutOfRange { key, metric, value } => {
                write!(f, "{metric} limit {value}% of client \"{key}\" exceeds 100%")
            }
            ConfigError::InvalidInterval => write!(f, "update interval must be positive"),
        }
    }
}

impl std::error::Error for ConfigError {}

pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn validate_key(key: &str) -> Result<(), ConfigError> {
    if is_valid_key(key) {
        Ok(())
    } else {
        Err(ConfigError::InvalidKey(key.to_string()))
    }
}

fn validate_percentage(key: &str, metric: &'static str, value: u8) -> Result<(), ConfigError> {
    if value <= 100 {
        Ok(())
    } else {
        Err(ConfigError::LimitOutOfRange {
            key: key.to_string(),
            metric,
            value,
        })
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    read_json(path)
}

pub fn read_agent_config_file(path: &str) -> anyhow::Result<AgentConfig> {
    read_json(path)
}

fn read_json<T: DeserializeOwned + fmt::Debug>(path: &str) -> anyhow::Result<T> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
