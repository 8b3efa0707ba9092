use std::fmt;
use std::path::Path;
use std::time::Duration;

use reviewsync_core::layout::{DEFAULT_REVIEW_TAB, DEFAULT_SUMMARY_TAB};
use serde::Deserialize;

use crate::error::EngineError;
use crate::planner::DEFAULT_DELETE_CHUNK;
use crate::retry::RetryPolicy;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_review_tab")]
    pub review_tab: String,
    #[serde(default = "default_summary_tab")]
    pub summary_tab: String,
    #[serde(default)]
    pub write_retry: RetryConfig,
    #[serde(default)]
    pub delete_retry: RetryConfig,
    #[serde(default = "default_delete_chunk")]
    pub delete_chunk_size: usize,
    #[serde(default)]
    pub crawl: CrawlConfig,
    #[serde(default)]
    pub units: Vec<UnitConfig>,
}

fn default_review_tab() -> String {
    DEFAULT_REVIEW_TAB.into()
}

fn default_summary_tab() -> String {
    DEFAULT_SUMMARY_TAB.into()
}

fn default_delete_chunk() -> usize {
    DEFAULT_DELETE_CHUNK
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            review_tab: default_review_tab(),
            summary_tab: default_summary_tab(),
            write_retry: RetryConfig::default(),
            delete_retry: RetryConfig::default(),
            delete_chunk_size: DEFAULT_DELETE_CHUNK,
            crawl: CrawlConfig::default(),
            units: Vec::new(),
        }
    }
}

impl RunConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, EngineError> {
        toml::from_str(s).map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Units matching `filter`, in config order.
    pub fn select(&self, filter: &UnitFilter) -> Vec<&UnitConfig> {
        self.units.iter().filter(|u| filter.matches(&u.name)).collect()
    }
}

// ---------------------------------------------------------------------------
// Retry / crawl
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

fn default_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    65_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_attempts(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_millis(self.delay_ms))
    }
}

/// Pause between consecutive fetches against the same host.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CrawlConfig {
    #[serde(default = "default_crawl_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_crawl_jitter_ms")]
    pub jitter_ms: u64,
}

fn default_crawl_delay_ms() -> u64 {
    1_500
}

fn default_crawl_jitter_ms() -> u64 {
    1_000
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_crawl_delay_ms(),
            jitter_ms: default_crawl_jitter_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct UnitConfig {
    pub name: String,
    /// Store target id handed to the connector.
    #[serde(default)]
    pub store: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl UnitConfig {
    /// Checks what collection needs. Aggregation only needs the store.
    pub fn validate_for_collection(&self) -> Result<(), EngineError> {
        self.validate_store()?;
        if self.sources.iter().all(|s| s.trim().is_empty()) {
            return Err(EngineError::Config(format!("unit {:?} has no sources", self.name)));
        }
        Ok(())
    }

    pub fn validate_store(&self) -> Result<(), EngineError> {
        if self.store.trim().is_empty() {
            return Err(EngineError::Config(format!("unit {:?} has no store target", self.name)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UnitFilter {
    #[default]
    All,
    /// Case-insensitive unit name.
    Named(String),
}

impl UnitFilter {
    /// "", "all" and "toutes" select every unit.
    pub fn parse(s: &str) -> Self {
        let t = s.trim();
        match t.to_lowercase().as_str() {
            "" | "all" | "toutes" => Self::All,
            _ => Self::Named(t.to_string()),
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Named(n) => n.trim().to_lowercase() == name.trim().to_lowercase(),
        }
    }
}

impl fmt::Display for UnitFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Named(n) => write!(f, "{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
review_tab = "TEST"

[write_retry]
max_attempts = 5
delay_ms = 10

[crawl]
delay_ms = 0
jitter_ms = 0

[[units]]
name = "EFAP"
store = "efap.sqlite3"
sources = ["https://fr.custplace.com/efap-paris-10", "https://diplomeo.com/avis-efap_paris-1"]

[[units]]
name = "mopa"
sources = ["https://fr.custplace.com/mopa-arles-10"]
"#;

    #[test]
    fn parses_with_defaults() {
        let cfg = RunConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.review_tab, "TEST");
        assert_eq!(cfg.summary_tab, DEFAULT_SUMMARY_TAB);
        assert_eq!(cfg.write_retry.policy(), RetryPolicy::new(5, Duration::from_millis(10)));
        assert_eq!(cfg.delete_retry.max_attempts, 3);
        assert_eq!(cfg.delete_chunk_size, 50);
        assert_eq!(cfg.units.len(), 2);
        assert_eq!(cfg.units[1].store, "");
    }

    #[test]
    fn missing_store_is_a_unit_level_error() {
        let cfg = RunConfig::from_toml_str(SAMPLE).unwrap();
        assert!(cfg.units[0].validate_for_collection().is_ok());
        let err = cfg.units[1].validate_for_collection().unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn empty_sources_rejected() {
        let unit = UnitConfig {
            name: "x".into(),
            store: "x.sqlite3".into(),
            sources: vec![" ".into()],
        };
        assert!(unit.validate_for_collection().is_err());
        assert!(unit.validate_store().is_ok());
    }

    #[test]
    fn bad_toml_is_config_error() {
        assert!(matches!(
            RunConfig::from_toml_str("units = 3"),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn filter_matching() {
        let cfg = RunConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.select(&UnitFilter::parse("TOUTES")).len(), 2);
        assert_eq!(cfg.select(&UnitFilter::parse("")).len(), 2);
        let named = cfg.select(&UnitFilter::parse(" efap "));
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].name, "EFAP");
        assert!(cfg.select(&UnitFilter::parse("icart")).is_empty());
    }
}
