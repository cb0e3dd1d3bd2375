//! FrontDesk configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{FrontDeskError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FrontDeskConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
}

impl FrontDeskConfig {
    /// Load config from the default path (~/.frontdesk/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FrontDeskError::Config(format!("Failed to read config: {e}")))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)
            .map_err(|e| FrontDeskError::Config(format!("Failed to parse config: {e}")))?;
        config.apply_env();
        Ok(config)
    }

    /// Save config to a path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| FrontDeskError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the FrontDesk home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".frontdesk")
    }

    /// Secrets may be kept out of the file.
    fn apply_env(&mut self) {
        if self.whatsapp.access_token.is_empty()
            && let Ok(token) = std::env::var("FRONTDESK_WHATSAPP_TOKEN")
        {
            self.whatsapp.access_token = token;
        }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 { 3000 }
fn default_host() -> String { "127.0.0.1".into() }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Record store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite file path; `:memory:` for a throwaway store.
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String { "~/.frontdesk/frontdesk.db".into() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: default_store_path() }
    }
}

/// WhatsApp Business Cloud API configuration.
/// Empty credentials put the channel in simulated mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub phone_number_id: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Prefixed to bare local numbers.
    #[serde(default = "default_country_code")]
    pub default_country_code: String,
    #[serde(default = "default_send_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String { "https://graph.facebook.com/v21.0".into() }
fn default_country_code() -> String { "91".into() }
fn default_send_timeout_secs() -> u64 { 10 }

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            phone_number_id: String::new(),
            api_base: default_api_base(),
            default_country_code: default_country_code(),
            timeout_secs: default_send_timeout_secs(),
        }
    }
}

impl WhatsAppConfig {
    pub fn is_configured(&self) -> bool {
        !self.access_token.is_empty() && !self.phone_number_id.is_empty()
    }
}

/// Notification poller timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Defaults to `max(2 × interval, 2s)`. Never below 2s.
    #[serde(default)]
    pub cooldown_ms: Option<u64>,
    /// Poll sessions unseen for this long are dropped.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

fn default_interval_ms() -> u64 { 5_000 }
fn default_session_idle_secs() -> u64 { 1_800 }

/// Lower bound on the cool-down, regardless of interval.
pub const MIN_COOLDOWN: Duration = Duration::from_secs(2);

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            cooldown_ms: None,
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn cooldown(&self) -> Duration {
        match self.cooldown_ms {
            Some(ms) => Duration::from_millis(ms).max(MIN_COOLDOWN),
            None => (self.interval() * 2).max(MIN_COOLDOWN),
        }
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs.max(1))
    }
}

/// Task dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    /// Name stamped as `assigned_by` on tasks promoted from suggestions.
    #[serde(default = "default_suggestion_assigner")]
    pub suggestion_assigned_by: String,
}

fn default_suggestion_assigner() -> String { "system".into() }

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            suggestion_assigned_by: default_suggestion_assigner(),
        }
    }
}
