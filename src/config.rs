//! Server configuration loaded from TOML

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unable to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub smtp: SmtpConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub address: String,
    pub port: u16,
    /// Size of the worker pool. Unset means one thread per connection.
    pub max_workers: Option<usize>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_owned(),
            port: 2500,
            max_workers: None,
        }
    }
}

/// Timing and buffer settings for a single connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long a read waits for more bytes of a burst already started
    pub read_deadline_ms: u64,
    /// Budget for the whole conversation, greeting to QUIT
    pub command_timeout_ms: u64,
    pub receive_buffer_len: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_deadline_ms: 5,
            command_timeout_ms: 5000,
            receive_buffer_len: 1024,
        }
    }
}

impl SessionConfig {
    pub fn read_deadline(&self) -> Duration {
        Duration::from_millis(self.read_deadline_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Mails waiting for the storage writer before sessions block
    pub queue_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { queue_capacity: 100 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Summaries buffered per subscriber before it is dropped
    pub subscriber_buffer: usize,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 256,
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// `address:port` the SMTP listener binds to
    pub fn smtp_binding_address(&self) -> String {
        format!("{}:{}", self.smtp.address, self.smtp.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.session.read_deadline_ms == 0, "session.read_deadline_ms must be positive"),
            (self.session.command_timeout_ms == 0, "session.command_timeout_ms must be positive"),
            (self.session.receive_buffer_len == 0, "session.receive_buffer_len must be positive"),
            (self.storage.queue_capacity == 0, "storage.queue_capacity must be positive"),
            (self.notify.subscriber_buffer == 0, "notify.subscriber_buffer must be positive"),
            (self.smtp.max_workers == Some(0), "smtp.max_workers must be positive"),
        ];

        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(ConfigError::Invalid((*message).to_owned())),
            None => Ok(()),
        }
    }
}
