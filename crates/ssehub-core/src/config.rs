//! Configuration types for the SSE hub.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Server configuration loaded from YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Server settings
    pub server: ServerSettings,
    /// Event stream settings
    pub stream: StreamSettings,
    /// Single command plugin settings
    pub command: CommandSettings,
    /// Terminal plugin settings
    pub terminal: TerminalSettings,
    /// Time count plugin settings
    pub timecount: TimeCountSettings,
}

impl ServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ServerConfig =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        self.server.bind_addr()?;

        if self.stream.queue_capacity == 0 {
            return Err(Error::Config("stream.queue_capacity must be > 0".into()));
        }
        if self.stream.delivery_timeout_ms == 0 {
            return Err(Error::Config(
                "stream.delivery_timeout_ms must be > 0".into(),
            ));
        }
        if self.terminal.history_capacity == 0 {
            return Err(Error::Config(
                "terminal.history_capacity must be > 0".into(),
            ));
        }
        if self.timecount.interval_ms == 0 {
            return Err(Error::Config("timecount.interval_ms must be > 0".into()));
        }

        Ok(())
    }
}

/// Server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Listen address
    pub bind: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Interval between SSE keep-alive comments in seconds
    pub keep_alive_secs: u64,
    /// Grace period for draining connections on shutdown in milliseconds
    pub shutdown_grace_ms: u64,
}

impl ServerSettings {
    /// Parse the listen address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .map_err(|e| Error::Config(format!("invalid server.bind '{}': {e}", self.bind)))
    }

    /// Keep-alive interval as a duration.
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(1))
    }

    /// Shutdown grace period as a duration.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            log_level: "info".to_string(),
            keep_alive_secs: 15,
            shutdown_grace_ms: 2000,
        }
    }
}

/// Event stream settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Reconnection delay suggested to clients in the establish event
    pub retry_ms: u64,
    /// How long a delivery may wait for queue room before the session is dropped
    pub delivery_timeout_ms: u64,
    /// Depth of each session's outbound queue
    pub queue_capacity: usize,
}

impl StreamSettings {
    /// Delivery timeout as a duration.
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            retry_ms: 3000,
            delivery_timeout_ms: 10_000,
            queue_capacity: 32,
        }
    }
}

/// Single command plugin settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSettings {
    /// Programs the plugin may run
    pub allowed_commands: Vec<String>,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            allowed_commands: ["ping", "traceroute", "tracert", "nslookup", "echo"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Terminal plugin settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalSettings {
    /// Programs the terminal may run
    pub allowed_commands: Vec<String>,
    /// Number of submitted lines kept for Up/Down recall
    pub history_capacity: usize,
    /// Host label rendered into the prompt
    pub host: String,
    /// Working directory of spawned programs (home directory when unset)
    pub working_directory: Option<PathBuf>,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            allowed_commands: ["ping", "traceroute", "nslookup", "date", "clear"]
                .into_iter()
                .map(String::from)
                .collect(),
            history_capacity: 16,
            host: "helloworld".to_string(),
            working_directory: None,
        }
    }
}

/// Time count plugin settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeCountSettings {
    /// Tick interval in milliseconds
    pub interval_ms: u64,
}

impl TimeCountSettings {
    /// Tick interval as a duration.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for TimeCountSettings {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.stream.retry_ms, 3000);
        assert_eq!(config.stream.delivery_timeout_ms, 10_000);
        assert_eq!(config.terminal.history_capacity, 16);
        assert_eq!(config.timecount.interval_ms, 1000);
    }

    #[test]
    fn test_config_validation() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_queue_capacity() {
        let mut config = ServerConfig::default();
        config.stream.queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_bind() {
        let mut config = ServerConfig::default();
        config.server.bind = "not an address".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_history_capacity() {
        let mut config = ServerConfig::default();
        config.terminal.history_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
server:
  bind: "127.0.0.1:9000"
  log_level: debug

stream:
  retry_ms: 5000
  delivery_timeout_ms: 250
  queue_capacity: 4

command:
  allowed_commands:
    - echo

terminal:
  history_capacity: 8
  host: box
  working_directory: /tmp

timecount:
  interval_ms: 50
"#;

        let config = ServerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.bind_addr().unwrap().port(), 9000);
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.stream.retry_ms, 5000);
        assert_eq!(config.stream.delivery_timeout(), Duration::from_millis(250));
        assert_eq!(config.stream.queue_capacity, 4);
        assert_eq!(config.command.allowed_commands, vec!["echo".to_string()]);
        assert_eq!(config.terminal.history_capacity, 8);
        assert_eq!(config.terminal.host, "box");
        assert_eq!(
            config.terminal.working_directory,
            Some(PathBuf::from("/tmp"))
        );
        // Sections left out fall back to defaults.
        assert!(config.terminal.allowed_commands.iter().any(|c| c == "date"));
        assert_eq!(config.timecount.interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_parse_yaml_rejects_invalid_values() {
        let yaml = "stream:\n  queue_capacity: 0\n";
        assert!(ServerConfig::from_yaml(yaml).is_err());
    }
}
