use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};

const APP_DIR: &str = "blueprint-store";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default)]
    pub forum: ForumConfig,

    #[serde(default)]
    pub refresh: RefreshConfig,

    #[serde(default)]
    pub extract: ExtractConfig,

    #[serde(default)]
    pub query: QueryConfig,

    /// Optional TOML file replacing the built-in bucket taxonomy.
    #[serde(default)]
    pub taxonomy_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForumConfig {
    pub base_url: String,
    pub category_slug: String,
    pub category_id: u32,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub min_request_interval_ms: u64,
    pub page_size: usize,
    pub backoff: BackoffConfig,
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            base_url: "https://community.home-assistant.io".to_string(),
            category_slug: "blueprints-exchange".to_string(),
            category_id: 53,
            user_agent: format!("{}/{}", APP_DIR, env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 20,
            connect_timeout_secs: 10,
            min_request_interval_ms: 350,
            page_size: 30,
            backoff: BackoffConfig::default(),
        }
    }
}

impl ForumConfig {
    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }
}

/// Retry schedule for rate-limited requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub max_retries: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 750,
            multiplier: 1.8,
            max_delay_ms: 6_000,
            max_retries: 4,
        }
    }
}

impl BackoffConfig {
    /// Delay before retry number `attempt` (0-based), capped at `max_delay_ms`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt as i32);
        let millis = (self.base_delay_ms as f64 * factor).min(self.max_delay_ms as f64);
        Duration::from_millis(millis as u64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_minutes: u32,
    pub jitter_secs: u64,
    pub min_interval_minutes: u32,
    pub max_pages: u32,
    pub max_topics: usize,
    pub detail_concurrency: usize,
    /// Topics not updated for this many days are dropped after a sweep. 0 disables pruning.
    pub prune_days: u32,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 30,
            jitter_secs: 120,
            min_interval_minutes: 30,
            max_pages: 6,
            max_topics: 300,
            detail_concurrency: 4,
            prune_days: 90,
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.interval_minutes) * 60)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.min_interval_minutes) * 60)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_secs(self.jitter_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub excerpt_max_len: usize,
    pub import_host: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            excerpt_max_len: 280,
            import_host: "https://my.home-assistant.io".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub page_size: usize,
    pub enable_spotlight: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            page_size: 30,
            enable_spotlight: true,
        }
    }
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR);
    data_dir.join("blueprints.db").to_string_lossy().to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            forum: ForumConfig::default(),
            refresh: RefreshConfig::default(),
            extract: ExtractConfig::default(),
            query: QueryConfig::default(),
            taxonomy_path: None,
        }
    }
}

impl Config {
    /// Loads the config from `path` (or the default location), writing a default
    /// file when none exists yet.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            Ok(config)
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.clamp();
        Ok(config)
    }

    pub fn save(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    /// Pulls out-of-range options back into their supported ranges.
    fn clamp(&mut self) {
        let refresh = &mut self.refresh;
        refresh.max_pages = refresh.max_pages.clamp(1, 50);
        refresh.max_topics = refresh.max_topics.max(1);
        refresh.detail_concurrency = refresh.detail_concurrency.clamp(1, 10);
        refresh.interval_minutes = refresh.interval_minutes.clamp(5, 720);
        refresh.min_interval_minutes = refresh.min_interval_minutes.clamp(1, 1440);
        if refresh.prune_days != 0 {
            refresh.prune_days = refresh.prune_days.clamp(7, 365);
        }

        self.forum.page_size = self.forum.page_size.max(1);
        self.forum.backoff.multiplier = self.forum.backoff.multiplier.max(1.0);
        self.extract.excerpt_max_len = self.extract.excerpt_max_len.max(2);
        self.query.page_size = self.query.page_size.clamp(1, 200);
    }
}
