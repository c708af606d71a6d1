//! Engine configuration.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `DAL_DEFAULT_PAGE_SIZE` | 50 | Page size when neither cursor nor request names one |
//! | `DAL_DEFAULT_EVALUATION_LIMIT` | 100 | Starting per-call backend limit |
//! | `DAL_MIN_EVALUATION_LIMIT` | 10 | Lower clamp of the per-call limit |
//! | `DAL_MAX_EVALUATION_LIMIT` | 1000 | Upper clamp of the per-call limit |
//! | `DAL_RESUME_CAPACITY` | 1024 | Resume points kept for handed-out cursors (0 disables) |
//! | `DAL_MAX_BATCH_SIZE` | 100 | Keys per multi-get call |
//! | `DAL_MAX_UNPROCESSED_RETRIES` | 8 | Multi-get rounds without progress before giving up |
//! | `DAL_RETRY_BACKOFF` | 50ms | First unprocessed-key backoff (doubles per round) |
//! | `DAL_DEBUG_LOGGING` | false | Emit per-call debug events |
//!
//! # Example
//!
//! ```
//! use helios_dal::config::DalConfig;
//!
//! let config: DalConfig = serde_json::from_str(
//!     r#"{"pagination": {"defaultPageSize": 20}, "batch": {"retryBackoff": "10ms"}}"#,
//! )
//! .unwrap();
//! assert_eq!(config.pagination.default_page_size, 20);
//! assert_eq!(config.pagination.max_evaluation_limit, 1000);
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Pagination engine limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationConfig {
    /// Logical page size when neither the cursor nor the request names one.
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    /// Starting per-call evaluation limit.
    #[serde(default = "default_evaluation_limit")]
    pub default_evaluation_limit: u32,

    /// Lower clamp of the evaluation limit.
    #[serde(default = "default_min_evaluation_limit")]
    pub min_evaluation_limit: u32,

    /// Upper clamp of the evaluation limit.
    #[serde(default = "default_max_evaluation_limit")]
    pub max_evaluation_limit: u32,

    /// Resume points kept on the server for handed-out cursors.
    #[serde(default = "default_resume_capacity")]
    pub resume_capacity: usize,
}

fn default_page_size() -> u32 {
    crate::types::DEFAULT_PAGE_SIZE
}

fn default_evaluation_limit() -> u32 {
    100
}

fn default_min_evaluation_limit() -> u32 {
    10
}

fn default_max_evaluation_limit() -> u32 {
    1000
}

fn default_resume_capacity() -> usize {
    1024
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            default_evaluation_limit: default_evaluation_limit(),
            min_evaluation_limit: default_min_evaluation_limit(),
            max_evaluation_limit: default_max_evaluation_limit(),
            resume_capacity: default_resume_capacity(),
        }
    }
}

impl PaginationConfig {
    /// The first per-call limit for a logical page of `page_size`.
    ///
    /// The default is clamped to `[min, max]` and then raised above the page
    /// size, so a backend call never ends exactly on the page boundary
    /// without signalling whether more data follows. Inverted bounds resolve
    /// to `max`.
    pub fn evaluation_limit(&self, page_size: u32) -> u32 {
        let limit = self
            .default_evaluation_limit
            .max(self.min_evaluation_limit)
            .min(self.max_evaluation_limit)
            .max(1);
        if page_size >= limit {
            page_size.saturating_add(1)
        } else {
            limit
        }
    }

    /// The ceiling adaptive growth may reach for a page of `page_size`.
    pub fn evaluation_ceiling(&self, page_size: u32) -> u32 {
        self.max_evaluation_limit.max(page_size.saturating_add(1))
    }
}

/// Batch retrieval limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchConfig {
    /// Maximum keys per multi-get call.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Consecutive multi-get rounds without progress before giving up.
    #[serde(default = "default_max_unprocessed_retries")]
    pub max_unprocessed_retries: u32,

    /// First backoff before resubmitting unprocessed keys.
    #[serde(default = "default_retry_backoff", with = "duration_text")]
    pub retry_backoff: Duration,

    /// Backoff ceiling.
    #[serde(default = "default_max_retry_backoff", with = "duration_text")]
    pub max_retry_backoff: Duration,
}

fn default_max_batch_size() -> usize {
    100
}

fn default_max_unprocessed_retries() -> u32 {
    8
}

fn default_retry_backoff() -> Duration {
    Duration::from_millis(50)
}

fn default_max_retry_backoff() -> Duration {
    Duration::from_secs(2)
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_unprocessed_retries: default_max_unprocessed_retries(),
            retry_backoff: default_retry_backoff(),
            max_retry_backoff: default_max_retry_backoff(),
        }
    }
}

impl BatchConfig {
    /// Backoff before the `attempt`-th consecutive retry (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_backoff
            .saturating_mul(factor)
            .min(self.max_retry_backoff)
    }
}

/// Configuration of the data-access engine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DalConfig {
    /// Pagination limits.
    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Batch retrieval limits.
    #[serde(default)]
    pub batch: BatchConfig,

    /// Emit per-call debug events (compiled queries, loop progress).
    #[serde(default)]
    pub debug_logging: bool,
}

impl DalConfig {
    /// Builds a configuration from defaults overridden by `DAL_*` variables.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from defaults overridden by `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        override_with(&lookup, "DAL_DEFAULT_PAGE_SIZE", &mut config.pagination.default_page_size);
        override_with(
            &lookup,
            "DAL_DEFAULT_EVALUATION_LIMIT",
            &mut config.pagination.default_evaluation_limit,
        );
        override_with(&lookup, "DAL_MIN_EVALUATION_LIMIT", &mut config.pagination.min_evaluation_limit);
        override_with(&lookup, "DAL_MAX_EVALUATION_LIMIT", &mut config.pagination.max_evaluation_limit);
        override_with(&lookup, "DAL_RESUME_CAPACITY", &mut config.pagination.resume_capacity);
        override_with(&lookup, "DAL_MAX_BATCH_SIZE", &mut config.batch.max_batch_size);
        override_with(&lookup, "DAL_MAX_UNPROCESSED_RETRIES", &mut config.batch.max_unprocessed_retries);
        override_with(&lookup, "DAL_DEBUG_LOGGING", &mut config.debug_logging);
        if let Some(raw) = lookup("DAL_RETRY_BACKOFF") {
            match humantime::parse_duration(&raw) {
                Ok(backoff) => config.batch.retry_backoff = backoff,
                Err(e) => tracing::warn!(value = %raw, error = %e, "Ignoring invalid DAL_RETRY_BACKOFF"),
            }
        }
        config
    }

    /// Validates the configuration and returns errors if any.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let p = &self.pagination;

        if p.default_page_size == 0 {
            errors.push("Default page size cannot be 0".to_string());
        }
        if p.min_evaluation_limit == 0 {
            errors.push("Minimum evaluation limit cannot be 0".to_string());
        }
        if p.min_evaluation_limit > p.max_evaluation_limit {
            errors.push("Minimum evaluation limit cannot exceed maximum evaluation limit".to_string());
        }
        if self.batch.max_batch_size == 0 {
            errors.push("Max batch size cannot be 0".to_string());
        }
        if self.batch.retry_backoff > self.batch.max_retry_backoff {
            errors.push("Retry backoff cannot exceed max retry backoff".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn override_with<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, target: &mut T) {
    let Some(raw) = lookup(name) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *target = value,
        Err(_) => tracing::warn!(variable = name, value = %raw, "Ignoring unparseable configuration value"),
    }
}

mod duration_text {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}
