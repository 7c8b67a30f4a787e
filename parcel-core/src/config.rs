use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default API address used by local development servers.
pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ParcelConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout_seconds: 30,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub session_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            session_path: "~/.parcel/session.json".to_string(),
        }
    }
}

impl StorageConfig {
    /// Session file location with `~` expanded.
    pub fn resolved_session_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.session_path).into_owned())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct QueryConfig {
    /// Age after which cached data is refetched on subscribe.
    pub stale_time_ms: u64,
    /// How long an entry with no subscribers survives before removal.
    pub gc_time_ms: u64,
    /// Retry attempts for failed query fetches (mutations never retry).
    pub retry: usize,
    pub retry_delay_ms: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time_ms: 0,
            gc_time_ms: 5 * 60 * 1000,
            retry: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl QueryConfig {
    pub fn stale_time(&self) -> Duration {
        Duration::from_millis(self.stale_time_ms)
    }

    pub fn gc_time(&self) -> Duration {
        Duration::from_millis(self.gc_time_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChatConfig {
    pub conversation_poll_ms: u64,
    pub message_poll_ms: u64,
    /// Admin account that receives customer chat messages.
    pub support_admin_id: i64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            conversation_poll_ms: 5000,
            message_poll_ms: 2000,
            support_admin_id: 3,
        }
    }
}

impl ChatConfig {
    pub fn conversation_poll(&self) -> Duration {
        Duration::from_millis(self.conversation_poll_ms)
    }

    pub fn message_poll(&self) -> Duration {
        Duration::from_millis(self.message_poll_ms)
    }
}

impl ParcelConfig {
    /// Load configuration from an optional TOML file, `PARCEL__*` environment
    /// variables and finally `API_BASE_URL`.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("PARCEL").separator("__"))
            .set_override_option("api.base_url", std::env::var("API_BASE_URL").ok())?
            .build()?;
        s.try_deserialize()
    }
}
