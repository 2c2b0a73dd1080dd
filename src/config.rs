use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::session::ActionSchedule;

/// Keeper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Game server address, `host:port`
    #[serde(default = "default_server_host")]
    pub server_host: String,

    /// Command that moves a freshly logged-in account to its sub-server
    #[serde(default = "default_switch_command")]
    pub switch_command: String,

    /// HTTP control surface bind address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Key required by the control surface (query `key` or `x-api-key`)
    #[serde(default = "default_api_key")]
    pub api_key: String,

    /// JSON file holding the `{name, loginCommand}` account records
    #[serde(default = "default_accounts_file")]
    pub accounts_file: PathBuf,

    #[serde(default = "default_login_delay_secs")]
    pub login_delay_secs: u64,

    #[serde(default = "default_switch_delay_secs")]
    pub switch_delay_secs: u64,

    #[serde(default = "default_jump_interval_secs")]
    pub jump_interval_secs: u64,

    #[serde(default = "default_jump_release_ms")]
    pub jump_release_ms: u64,

    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

fn default_server_host() -> String {
    "127.0.0.1:25565".to_string()
}

fn default_switch_command() -> String {
    "/server lobby".to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_api_key() -> String {
    "change-me".to_string()
}

fn default_accounts_file() -> PathBuf {
    PathBuf::from("accounts.json")
}

fn default_login_delay_secs() -> u64 {
    3
}

fn default_switch_delay_secs() -> u64 {
    6
}

fn default_jump_interval_secs() -> u64 {
    5
}

fn default_jump_release_ms() -> u64 {
    200
}

fn default_reconnect_delay_secs() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: default_server_host(),
            switch_command: default_switch_command(),
            listen_addr: default_listen_addr(),
            api_key: default_api_key(),
            accounts_file: default_accounts_file(),
            login_delay_secs: default_login_delay_secs(),
            switch_delay_secs: default_switch_delay_secs(),
            jump_interval_secs: default_jump_interval_secs(),
            jump_release_ms: default_jump_release_ms(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(server = %config.server_host, listen = %config.listen_addr, "configuration loaded");
        Ok(config)
    }

    /// Scripted-action schedule derived from the configured delays.
    pub fn schedule(&self) -> ActionSchedule {
        ActionSchedule {
            login_delay: Duration::from_secs(self.login_delay_secs),
            switch_delay: Duration::from_secs(self.switch_delay_secs),
            switch_command: self.switch_command.clone(),
            jump_interval: Duration::from_secs(self.jump_interval_secs),
            jump_release: Duration::from_millis(self.jump_release_ms),
        }
    }

    /// Wait between a disconnect and the automatic rejoin attempt.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.login_delay_secs, 3);
        assert_eq!(config.switch_delay_secs, 6);
        assert_eq!(config.jump_interval_secs, 5);
        assert_eq!(config.jump_release_ms, 200);
        assert_eq!(config.reconnect_delay_secs, 10);
        assert_eq!(config.accounts_file, PathBuf::from("accounts.json"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            server_host = "play.example.net:25565"
            api_key = "sekrit"
            "#,
        )
        .unwrap();

        assert_eq!(config.server_host, "play.example.net:25565");
        assert_eq!(config.api_key, "sekrit");
        assert_eq!(config.switch_command, "/server lobby");
        assert_eq!(config.reconnect_delay_secs, 10);
    }

    #[test]
    fn test_empty_toml_is_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:3000");
    }

    #[test]
    fn test_from_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"switch_command = \"/server pvp\"\n").unwrap();

        let config = Config::from_file(tmp.path()).unwrap();
        assert_eq!(config.switch_command, "/server pvp");
    }

    #[test]
    fn test_from_file_malformed_errors() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"server_host = [not toml").unwrap();

        assert!(Config::from_file(tmp.path()).is_err());
    }

    #[test]
    fn test_schedule_conversion() {
        let config = Config::default();
        let schedule = config.schedule();
        assert_eq!(schedule.login_delay, Duration::from_secs(3));
        assert_eq!(schedule.switch_delay, Duration::from_secs(6));
        assert_eq!(schedule.jump_interval, Duration::from_secs(5));
        assert_eq!(schedule.jump_release, Duration::from_millis(200));
        assert_eq!(config.reconnect_delay(), Duration::from_secs(10));
    }
}
