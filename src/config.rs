//! Configuration loader and validator for the read-later bot.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Telegram refuses `getUpdates` limits above this.
pub const MAX_BATCH_SIZE: u8 = 100;
/// Must stay below teloxide's default HTTP client timeout (17s).
pub const MAX_POLL_TIMEOUT_SECS: u32 = 15;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub telegram: Telegram,
    pub storage: Storage,
    #[serde(default)]
    pub state: State,
}

/// Dispatcher and data directory settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub batch_size: u8,
    pub concurrency: usize,
    pub idle_backoff_ms: u64,
    #[serde(default)]
    pub error_backoff_ms: u64,
}

/// Telegram bot settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Telegram {
    pub bot_token: String,
    /// Alternative Bot API server, e.g. a self-hosted one.
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub poll_timeout_secs: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Files,
}

/// Where saved pages live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Storage {
    pub backend: StorageBackend,
}

/// Conversation state backend. Without `redis_url` state is kept in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct State {
    #[serde(default)]
    pub redis_url: Option<String>,
}

impl App {
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// SQLite URL for the page store. `DATABASE_URL` wins over the data dir.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| format!("sqlite://{}/pages.db", self.app.data_dir))
    }

    /// Root directory of the file-backed page store.
    pub fn pages_dir(&self) -> std::path::PathBuf {
        Path::new(&self.app.data_dir).join("pages")
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.batch_size == 0 || cfg.app.batch_size > MAX_BATCH_SIZE {
        return Err(ConfigError::Invalid("app.batch_size must be within 1..=100"));
    }
    if cfg.app.concurrency == 0 {
        return Err(ConfigError::Invalid("app.concurrency must be > 0"));
    }
    if cfg.app.idle_backoff_ms == 0 {
        return Err(ConfigError::Invalid("app.idle_backoff_ms must be > 0"));
    }

    if cfg.telegram.bot_token.trim().is_empty() {
        return Err(ConfigError::Invalid("telegram.bot_token must be non-empty"));
    }
    if cfg.telegram.poll_timeout_secs > MAX_POLL_TIMEOUT_SECS {
        return Err(ConfigError::Invalid("telegram.poll_timeout_secs must be <= 15"));
    }
    if let Some(api_url) = &cfg.telegram.api_url {
        if reqwest::Url::parse(api_url).is_err() {
            return Err(ConfigError::Invalid("telegram.api_url must be an absolute URL"));
        }
    }

    if let Some(redis_url) = &cfg.state.redis_url {
        if redis_url.trim().is_empty() {
            return Err(ConfigError::Invalid("state.redis_url must be non-empty when set"));
        }
    }

    Ok(())
}

/// Returns the example YAML shipped with the bot.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  batch_size: 100
  concurrency: 5
  idle_backoff_ms: 1000
  error_backoff_ms: 0

telegram:
  bot_token: "YOUR_TELEGRAM_BOT_TOKEN"
  poll_timeout_secs: 0

storage:
  backend: sqlite

state:
  redis_url: "redis://127.0.0.1:6379/0"
"#
}
