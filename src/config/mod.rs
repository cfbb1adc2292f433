use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{PlanetError, PlanetResult};
use crate::storage::cache_store::INDEX_DIR;

const DEFAULT_ITEMS_PER_PAGE: usize = 60;
const DEFAULT_EXCERPT_WORDS: usize = 50;

/// One step of a filter chain, as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FilterSpec {
    /// Pipe the serialized entry through an external command.
    Shell {
        command: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Keep entries matching `require`, drop entries matching `exclude`.
    Sift {
        require: Option<String>,
        exclude: Option<String>,
    },
    /// Attach a plain-text excerpt of the first `words` words.
    Excerpt {
        #[serde(default = "default_excerpt_words")]
        words: usize,
    },
    /// An in-process filter registered at startup under `name`.
    Named { name: String },
}

fn default_excerpt_words() -> usize {
    DEFAULT_EXCERPT_WORDS
}

fn default_items_per_page() -> usize {
    DEFAULT_ITEMS_PER_PAGE
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TemplateConfig {
    pub name: String,
    #[serde(default = "default_items_per_page")]
    pub items_per_page: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SubscriptionConfig {
    pub uri: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Overrides the global retention count.
    #[serde(default)]
    pub cache_keep_entries: Option<usize>,
    /// Overrides the global activity threshold.
    #[serde(default)]
    pub activity_threshold_days: Option<u32>,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
}

impl SubscriptionConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache_directory: PathBuf,
    /// Number of fetch workers; 0 fetches sequentially.
    pub spider_threads: usize,
    pub feed_timeout_secs: u64,
    /// Per-feed cap on spliced entries; 0 = unlimited.
    pub new_feed_items: usize,
    /// Default retention count per feed.
    pub cache_keep_entries: usize,
    pub activity_threshold_days: Option<u32>,
    /// Maintain the entry -> feed id index.
    pub id_index: bool,
    pub user_agent: String,
    /// Global filters, applied before each feed's own chain.
    pub filters: Vec<FilterSpec>,
    pub templates: Vec<TemplateConfig>,
    pub subscriptions: Vec<SubscriptionConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_directory: PathBuf::from("cache"),
            spider_threads: 0,
            feed_timeout_secs: 20,
            new_feed_items: 0,
            cache_keep_entries: 10,
            activity_threshold_days: None,
            id_index: true,
            user_agent: format!("planet/{}", env!("CARGO_PKG_VERSION")),
            filters: Vec::new(),
            templates: vec![TemplateConfig {
                name: "index".to_string(),
                items_per_page: DEFAULT_ITEMS_PER_PAGE,
            }],
            subscriptions: Vec::new(),
        }
    }
}

impl Config {
    /// Load `.env`, the TOML file at `path`, then environment overrides.
    ///
    /// A missing config file yields the defaults.
    pub fn from_env(path: &Path) -> PlanetResult<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::load(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> PlanetResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(PlanetError::Io(e)),
        }
    }

    pub fn from_toml_str(content: &str) -> PlanetResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(toml::from_str(content)?)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> PlanetResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("PLANET_CACHE_DIR") {
            self.cache_directory = PathBuf::from(dir);
        }

        if let Some(threads) = lookup("PLANET_SPIDER_THREADS") {
            self.spider_threads = threads.trim().parse().map_err(|_| {
                PlanetError::Config(format!("PLANET_SPIDER_THREADS is not a number: {}", threads))
            })?;
        }

        if let Some(timeout) = lookup("PLANET_FEED_TIMEOUT") {
            self.feed_timeout_secs = timeout.trim().parse().map_err(|_| {
                PlanetError::Config(format!("PLANET_FEED_TIMEOUT is not a number: {}", timeout))
            })?;
        }

        Ok(())
    }

    pub fn validate(&self) -> PlanetResult<()> {
        if self.feed_timeout_secs == 0 {
            return Err(PlanetError::Config(
                "feed_timeout_secs must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for sub in &self.subscriptions {
            if sub.uri.trim().is_empty() {
                return Err(PlanetError::Config("subscription with empty uri".to_string()));
            }
            if !seen.insert(sub.uri.as_str()) {
                return Err(PlanetError::Config(format!(
                    "subscription listed twice: {}",
                    sub.uri
                )));
            }
        }

        Ok(())
    }

    /// Largest page size over all output templates.
    pub fn max_items(&self) -> usize {
        self.templates
            .iter()
            .map(|t| t.items_per_page)
            .max()
            .unwrap_or(0)
    }

    pub fn retention_for(&self, sub: &SubscriptionConfig) -> usize {
        sub.cache_keep_entries.unwrap_or(self.cache_keep_entries)
    }

    pub fn activity_threshold_for(&self, sub: &SubscriptionConfig) -> Option<u32> {
        sub.activity_threshold_days.or(self.activity_threshold_days)
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }

    pub fn index_path(&self) -> PathBuf {
        self.cache_directory.join(INDEX_DIR).join("id-index.sqlite3")
    }
}
