use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::Provider;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub web: WebConfig,
    pub storage: StorageConfig,
    pub merge: MergeConfig,
    #[serde(default)]
    pub launcher: LauncherConfig,
    #[serde(default)]
    pub providers: Vec<Provider>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory the published playlist and guide files live in.
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Cron expression driving scheduled re-merges (seconds field first).
    pub update_cron: String,
    /// A cached result younger than this is reused unless a refresh is forced.
    pub cache_ttl_seconds: u64,
    /// Rendezvous budget per provider: accept plus read-to-EOF.
    pub accept_timeout_seconds: u64,
    /// Whether HTTP requests for the documents force a fresh merge.
    pub force_refresh_on_request: bool,
    /// Base for sequential channel numbers handed to channels without a
    /// preset; TV and radio blocks count independently.
    pub start_channel_number: Option<u32>,
    /// Strip all group tags from the published playlist.
    pub disable_groups: bool,
    /// Channels tagged with any of these groups are left out of the playlist.
    pub hidden_groups: Vec<String>,
    /// Delay before the boot-time merge, jittered.
    pub startup_delay_seconds: u64,
    /// Shell command run after each successful merge to poke the PVR
    /// consumer into reloading.
    pub restart_command: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    pub mode: LauncherMode,
    /// Command template for `mode = "command"`; `{url}` is replaced with the
    /// provider invocation address.
    pub command: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LauncherMode {
    /// Fire-and-forget HTTP GET against the invocation address.
    Http,
    /// Spawn the configured shell command with the address substituted in.
    Command,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            web: WebConfig {
                host: "0.0.0.0".to_string(),
                port: 52104,
            },
            storage: StorageConfig {
                output_dir: PathBuf::from("./data/output"),
            },
            merge: MergeConfig::default(),
            launcher: LauncherConfig::default(),
            providers: Vec::new(),
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            update_cron: "0 0 */12 * * *".to_string(),
            cache_ttl_seconds: 3600,
            accept_timeout_seconds: 10,
            force_refresh_on_request: true,
            start_channel_number: None,
            disable_groups: false,
            hidden_groups: Vec::new(),
            startup_delay_seconds: 0,
            restart_command: None,
        }
    }
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            mode: LauncherMode::Http,
            command: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".to_string());

        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(&config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::create_dir_all(&default_config.storage.output_dir)?;
            std::fs::write(&config_file, contents)?;
            Ok(default_config)
        }
    }
}
