//! CLI configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/temposhare/config.toml`
//! - Windows: `%APPDATA%/temposhare/config.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use temposhare_protocol::constants::SESSION_TTL;
use temposhare_session::DEFAULT_SHARE_BASE_URL;

/// CLI configuration. Command-line flags override these values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// WebSocket bind address used by `send`.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Where `receive` writes downloaded files.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Lifetime of a share.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,

    /// Prefix of printed share URLs.
    #[serde(default = "default_share_base_url")]
    pub share_base_url: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:0".into()
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_session_ttl_secs() -> u64 {
    SESSION_TTL.as_secs()
}

fn default_share_base_url() -> String {
    DEFAULT_SHARE_BASE_URL.into()
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            download_dir: default_download_dir(),
            session_ttl_secs: default_session_ttl_secs(),
            share_base_url: default_share_base_url(),
        }
    }
}

impl CliConfig {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            let config = CliConfig::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("temposhare")
            .join("config.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("temposhare").join("config.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/temposhare/config.toml"))
    }
}
