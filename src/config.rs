//! Run configuration.
//!
//! [`AppConfig`] is loaded once from YAML at startup, never mutated, and
//! passed by reference to every component constructor. Every section has
//! defaults, so an empty file (or no file) yields a working configuration
//! covering nine Asian markets and their construction-trade phrases.

use crate::backoff::{DelayRange, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

const DEFAULT_ENTITIES: [(&str, &str); 9] = [
    ("India", "IN"),
    ("Thailand", "TH"),
    ("Indonesia", "ID"),
    ("Vietnam", "VN"),
    ("Oman", "OM"),
    ("Pakistan", "PK"),
    ("China", "CN"),
    ("Japan", "JP"),
    ("Korea", "KR"),
];

const DEFAULT_PHRASES: [&str; 9] = [
    "trade",
    "construction",
    "shipping",
    "clinker",
    "cement",
    "logistics",
    "import",
    "export",
    "infrastructure",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Entity name to the topic phrases queried for it.
    pub entities: BTreeMap<String, Vec<String>>,
    /// Entity name to the region code used as a geo filter.
    pub geo_codes: BTreeMap<String, String>,
    pub scoring: ScoringConfig,
    pub identity: IdentityConfig,
    pub news: NewsConfig,
    pub cache: CacheConfig,
    pub http: HttpConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let phrases: Vec<String> = DEFAULT_PHRASES.iter().map(|p| p.to_string()).collect();
        Self {
            entities: DEFAULT_ENTITIES
                .iter()
                .map(|(name, _)| (name.to_string(), phrases.clone()))
                .collect(),
            geo_codes: DEFAULT_ENTITIES
                .iter()
                .map(|(name, code)| (name.to_string(), code.to_string()))
                .collect(),
            scoring: ScoringConfig::default(),
            identity: IdentityConfig::default(),
            news: NewsConfig::default(),
            cache: CacheConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

/// Millisecond bounds as written in YAML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MillisRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl MillisRange {
    pub fn to_range(self) -> DelayRange {
        DelayRange::from_millis(self.min_ms, self.max_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Number of top queries kept after ranking.
    pub limit: usize,
    /// Maximum number of queries scored per run.
    pub max_checks: usize,
    /// Trend time window, e.g. `"today 1-m"` or `"now 7-d"`.
    pub time_window: String,
    /// Retries of a single query after a rate-limit response.
    pub rate_limit_retries: usize,
    /// Proactively rotate identity after this many processed queries (0 disables).
    pub rotate_every: usize,
    /// Random delay between two consecutive queries.
    pub pacing: MillisRange,
    /// Base wait after a rate-limit rotation (doubles per retry).
    pub rate_limit_backoff_ms: u64,
    /// Random extra wait after a rate-limit rotation.
    pub rate_limit_jitter: MillisRange,
    /// HTTP statuses the upstream uses to signal rate limiting.
    pub rate_limit_statuses: Vec<u16>,
    /// Language parameter sent to the trend service.
    pub hl: String,
    /// Timezone offset in minutes sent to the trend service.
    pub tz: i32,
    pub base_url: String,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            limit: 10,
            max_checks: 40,
            time_window: "today 1-m".to_string(),
            rate_limit_retries: 3,
            rotate_every: 10,
            pacing: MillisRange {
                min_ms: 5_000,
                max_ms: 15_000,
            },
            rate_limit_backoff_ms: 10_000,
            rate_limit_jitter: MillisRange {
                min_ms: 1_000,
                max_ms: 5_000,
            },
            rate_limit_statuses: vec![429],
            hl: "en-US".to_string(),
            tz: 360,
            base_url: "https://trends.google.com".to_string(),
        }
    }
}

impl ScoringConfig {
    pub fn pacing(&self) -> DelayRange {
        self.pacing.to_range()
    }

    pub fn rate_limit_policy(&self) -> RetryPolicy {
        let base = Duration::from_millis(self.rate_limit_backoff_ms);
        RetryPolicy {
            max_attempts: self.rate_limit_retries,
            base_delay: base,
            max_delay: base.saturating_mul(4),
            jitter: self.rate_limit_jitter.to_range(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Address of the proxy control port.
    pub control_addr: String,
    /// SOCKS proxy every upstream trend request is routed through.
    pub socks_proxy: String,
    /// Endpoint returning the caller's externally observed address as plain text.
    pub ip_check_url: String,
    /// New-identity attempts before rotation is declared failed.
    pub max_retries: usize,
    /// Wait after a new-identity signal before re-observing the address.
    pub settle_secs: u64,
    /// Extra wait after an attempt that left the address unchanged.
    pub unchanged_backoff_ms: u64,
    pub unchanged_jitter: MillisRange,
    pub control_timeout_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            control_addr: "127.0.0.1:9051".to_string(),
            socks_proxy: "socks5h://127.0.0.1:9050".to_string(),
            ip_check_url: "https://api.ipify.org".to_string(),
            max_retries: 5,
            settle_secs: 10,
            unchanged_backoff_ms: 2_000,
            unchanged_jitter: MillisRange {
                min_ms: 0,
                max_ms: 1_000,
            },
            control_timeout_secs: 10,
        }
    }
}

impl IdentityConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_secs(self.control_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::constant(
            self.max_retries,
            Duration::from_millis(self.unchanged_backoff_ms),
            self.unchanged_jitter.to_range(),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub base_url: String,
    pub page_size: u32,
    pub language: String,
    pub sort_by: String,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://newsapi.org".to_string(),
            page_size: 20,
            language: "en".to_string(),
            sort_by: "publishedAt".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding the active store and the archive buckets.
    pub dir: PathBuf,
    /// Number of most recent active entries consulted for deduplication.
    pub lookup_window: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".news_cache"),
            lookup_window: 5_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0"
                .to_string(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    /// Parse a configuration from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Every endpoint must be an absolute URL.
    pub fn validate(&self) -> Result<(), Box<dyn Error>> {
        for (field, value) in [
            ("scoring.base_url", &self.scoring.base_url),
            ("identity.socks_proxy", &self.identity.socks_proxy),
            ("identity.ip_check_url", &self.identity.ip_check_url),
            ("news.base_url", &self.news.base_url),
        ] {
            Url::parse(value).map_err(|e| format!("invalid URL in {field} ({value:?}): {e}"))?;
        }
        Ok(())
    }

    /// Load configuration from `path`, or the built-in defaults when `None`.
    #[instrument(level = "info", skip_all, fields(path = ?path))]
    pub async fn load(path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        let Some(path) = path else {
            info!("No config file given; using built-in defaults");
            return Ok(Self::default());
        };
        let text = tokio::fs::read_to_string(path).await?;
        let config = Self::from_yaml(&text)?;
        config.validate()?;
        info!(
            entities = config.entities.len(),
            geo_codes = config.geo_codes.len(),
            "Loaded configuration"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_all_markets() {
        let config = AppConfig::default();
        assert_eq!(config.entities.len(), 9);
        assert!(config.entities.values().all(|p| p.len() == 9));
        assert_eq!(config.geo_codes.get("Korea").map(String::as_str), Some("KR"));
        assert_eq!(config.news.page_size, 20);
        assert_eq!(config.scoring.rate_limit_statuses, vec![429]);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
entities:
  Oman: [cement, clinker]
scoring:
  limit: 3
  pacing: { min_ms: 10, max_ms: 20 }
cache:
  lookup_window: 100
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.entities.len(), 1);
        assert_eq!(config.entities["Oman"], vec!["cement", "clinker"]);
        assert_eq!(config.scoring.limit, 3);
        assert_eq!(config.scoring.max_checks, 40);
        assert_eq!(config.scoring.pacing().max, Duration::from_millis(20));
        assert_eq!(config.cache.lookup_window, 100);
        assert_eq!(config.identity.max_retries, 5);
        // geo_codes section absent -> defaults
        assert_eq!(config.geo_codes.len(), 9);
    }

    #[test]
    fn test_rate_limit_policy_from_config() {
        let scoring = ScoringConfig {
            rate_limit_retries: 2,
            rate_limit_backoff_ms: 1_000,
            rate_limit_jitter: MillisRange { min_ms: 0, max_ms: 0 },
            ..Default::default()
        };
        let policy = scoring.rate_limit_policy();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(5), Duration::from_secs(4));
    }

    #[test]
    fn test_identity_policy_is_constant() {
        let identity = IdentityConfig {
            unchanged_jitter: MillisRange { min_ms: 0, max_ms: 0 },
            ..Default::default()
        };
        let policy = identity.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay_for(1), policy.delay_for(4));
        assert_eq!(identity.settle(), Duration::from_secs(10));
    }

    #[test]
    fn test_validate_rejects_relative_endpoints() {
        assert!(AppConfig::default().validate().is_ok());

        let config = AppConfig::from_yaml("news:\n  base_url: newsapi.org\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("news.base_url"));
    }

    #[tokio::test]
    async fn test_load_without_path_uses_defaults() {
        let config = AppConfig::load(None).await.unwrap();
        assert_eq!(config.scoring.limit, 10);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "news:\n  page_size: 100\n").unwrap();
        let config = AppConfig::load(Some(path.as_path())).await.unwrap();
        assert_eq!(config.news.page_size, 100);
        assert_eq!(config.news.language, "en");
    }
}
