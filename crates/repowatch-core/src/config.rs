//! RepoWatch configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RepoWatchError, Result};
use crate::types::DEFAULT_EVENT_TYPES;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoWatchConfig {
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl RepoWatchConfig {
    /// Load config from the default path (~/.repowatch/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::load_from(&path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Load config from a specific path. Environment overrides are not applied.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RepoWatchError::Config(format!("Failed to read config: {e}")))?;
        tracing::debug!("Loaded config from {}", path.display());
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| RepoWatchError::Config(format!("Failed to parse config: {e}")))
    }

    /// Apply `GITHUB_TOKEN`, `DINGTALK_WEBHOOK_URL`, `DINGTALK_SECRET`, `REPOWATCH_DB`.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| get(key).filter(|v| !v.is_empty());
        if let Some(token) = get("GITHUB_TOKEN") {
            self.github.token = token;
        }
        if let Some(url) = get("DINGTALK_WEBHOOK_URL") {
            self.notify.webhook_url = url;
        }
        if let Some(secret) = get("DINGTALK_SECRET") {
            self.notify.secret = secret;
        }
        if let Some(db) = get("REPOWATCH_DB") {
            self.scheduler.db_path = db;
        }
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the RepoWatch home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".repowatch")
    }

    /// Database path with `~` expanded.
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.scheduler.db_path).to_string())
    }

    /// Copy of the config with secrets masked, for display.
    pub fn masked(&self) -> Self {
        let mut c = self.clone();
        c.github.token = mask_secret(&c.github.token);
        c.notify.secret = mask_secret(&c.notify.secret);
        c
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| RepoWatchError::Config(format!("Failed to serialize config: {e}")))
    }
}

/// Mask a secret string for display: first 4 chars + ••••
pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    match s.char_indices().nth(4) {
        Some((idx, _)) => format!("{}••••", &s[..idx]),
        None => "••••".to_string(),
    }
}

/// GitHub events API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    /// Pages' worth of new events handed to one cycle (`max_pages * per_page`).
    /// Newer events beyond that wait for the next cycle.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_api_base() -> String {
    "https://api.github.com".into()
}
fn default_per_page() -> u32 {
    100
}
fn default_max_pages() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    concat!("repowatch/", env!("CARGO_PKG_VERSION")).into()
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: default_api_base(),
            per_page: default_per_page(),
            max_pages: default_max_pages(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Notification webhook configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub webhook_url: String,
    /// Signing secret; empty disables signing.
    #[serde(default)]
    pub secret: String,
    /// Events rendered per message. All new events are persisted regardless.
    #[serde(default = "default_max_display_events")]
    pub max_display_events: usize,
    #[serde(default = "default_notify_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_display_events() -> usize {
    10
}
fn default_notify_timeout_secs() -> u64 {
    10
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            secret: String::new(),
            max_display_events: default_max_display_events(),
            timeout_secs: default_notify_timeout_secs(),
        }
    }
}

/// Scheduler loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Back off once remaining quota drops to this value or below.
    #[serde(default)]
    pub rate_limit_reserve: u32,
    #[serde(default = "default_event_types")]
    pub default_event_types: Vec<String>,
}

fn default_tick_secs() -> u64 {
    60
}
fn default_db_path() -> String {
    "~/.repowatch/repowatch.db".into()
}
fn default_event_types() -> Vec<String> {
    DEFAULT_EVENT_TYPES.iter().map(|s| s.to_string()).collect()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            db_path: default_db_path(),
            rate_limit_reserve: 0,
            default_event_types: default_event_types(),
        }
    }
}

/// Management API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    5080
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}
