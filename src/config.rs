//! Engine configuration
//!
//! The literal cache/retry/timeout numbers are defaults, not contractual
//! constants; every value can be overridden through the environment.

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cached quotes younger than this are served with `is_stale = false`.
    pub cache_freshness: Duration,
    /// Cached quotes older than this are never served.
    pub cache_hard_expiry: Duration,
    /// Upper bound on one outbound fetch attempt.
    pub fetch_timeout: Duration,
    /// Retries after the first failed attempt.
    pub max_fetch_retries: u32,
    /// Base delay for exponential backoff between attempts.
    pub backoff_base: Duration,
    /// Confidence reported when the router provides none.
    pub default_confidence: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_freshness: Duration::from_secs(60),
            cache_hard_expiry: Duration::from_secs(15 * 60),
            fetch_timeout: Duration::from_secs(4),
            max_fetch_retries: 2,
            backoff_base: Duration::from_millis(250),
            default_confidence: 0.85,
        }
    }
}

impl EngineConfig {
    /// Load from environment, falling back to defaults per field.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            cache_freshness: env_secs("CACHE_FRESHNESS_SECS").unwrap_or(defaults.cache_freshness),
            cache_hard_expiry: env_secs("CACHE_HARD_EXPIRY_SECS")
                .unwrap_or(defaults.cache_hard_expiry),
            fetch_timeout: env_secs("FETCH_TIMEOUT_SECS").unwrap_or(defaults.fetch_timeout),
            max_fetch_retries: env_parse("MAX_FETCH_RETRIES").unwrap_or(defaults.max_fetch_retries),
            backoff_base: env_parse("BACKOFF_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_base),
            default_confidence: env_parse("DEFAULT_CONFIDENCE")
                .unwrap_or(defaults.default_confidence),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse::<u64>(key).map(Duration::from_secs)
}
