//! Runtime configuration for a report run.

use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{FinderError, FinderResult};
use crate::model::ReportWindow;

/// Longest report window accepted, one hundred years.
pub const MAX_LOOKBACK_HOURS: u64 = 24 * 365 * 100;

/// Configuration shared by every pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinderConfig {
    /// Base URL of the CI server (Jenkins).
    #[serde(default = "default_ci_url")]
    pub ci_url: String,

    /// Base URL of the blob store JSON API.
    #[serde(default = "default_storage_url")]
    pub storage_url: String,

    /// Bucket holding PR build logs.
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Base URL of the source-control host API.
    #[serde(default = "default_github_url")]
    pub github_url: String,

    /// Bearer token for the source-control host API.
    #[serde(default)]
    pub token: Option<String>,

    /// Lanes whose name matches this pattern are included in the report.
    #[serde(default = "default_lane_pattern")]
    pub lane_pattern: String,

    /// Build artifacts whose file name matches this pattern are ingested.
    #[serde(default = "default_artifact_pattern")]
    pub artifact_pattern: String,

    /// Length of the report window, counted back from its end.
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u64,

    /// Upper bound of simultaneous in-flight requests to the CI server.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Builds fetched per page while walking a lane's history.
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Consecutive transient failures that open the circuit breaker.
    #[serde(default = "default_breaker_threshold")]
    pub breaker_threshold: u32,

    /// How long an open breaker holds back new attempts.
    #[serde(default = "default_breaker_cooldown_ms")]
    pub breaker_cooldown_ms: u64,

    /// Passed runs a quarantined test needs before it can be released.
    #[serde(default = "default_minimum_passed_runs")]
    pub minimum_passed_runs: u32,
}

fn default_ci_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_storage_url() -> String {
    "https://storage.googleapis.com".to_string()
}

fn default_bucket() -> String {
    "kubevirt-prow".to_string()
}

fn default_github_url() -> String {
    "https://api.github.com".to_string()
}

fn default_lane_pattern() -> String {
    ".*".to_string()
}

fn default_artifact_pattern() -> String {
    r"^(partial\.)?junit\.functest(\.\d+)?\.xml$".to_string()
}

fn default_lookback_hours() -> u64 {
    14 * 24
}

fn default_max_concurrent_fetches() -> usize {
    5
}

fn default_page_size() -> u64 {
    10
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    5
}

fn default_breaker_threshold() -> u32 {
    3
}

fn default_breaker_cooldown_ms() -> u64 {
    5_000
}

fn default_minimum_passed_runs() -> u32 {
    2
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            ci_url: default_ci_url(),
            storage_url: default_storage_url(),
            bucket: default_bucket(),
            github_url: default_github_url(),
            token: None,
            lane_pattern: default_lane_pattern(),
            artifact_pattern: default_artifact_pattern(),
            lookback_hours: default_lookback_hours(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            page_size: default_page_size(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            breaker_threshold: default_breaker_threshold(),
            breaker_cooldown_ms: default_breaker_cooldown_ms(),
            minimum_passed_runs: default_minimum_passed_runs(),
        }
    }
}

impl FinderConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `FLAKEFINDER_CI_URL` | CI server base URL |
    /// | `FLAKEFINDER_STORAGE_URL` | Blob store base URL |
    /// | `FLAKEFINDER_BUCKET` | Bucket with PR build logs |
    /// | `FLAKEFINDER_GITHUB_URL` | Source-control API base URL |
    /// | `FLAKEFINDER_TOKEN` | Source-control API bearer token |
    /// | `FLAKEFINDER_LANE_PATTERN` | Lane name regex |
    /// | `FLAKEFINDER_LOOKBACK_HOURS` | Report window in hours |
    /// | `FLAKEFINDER_MAX_CONCURRENT_FETCHES` | In-flight request limit |
    /// | `FLAKEFINDER_TIMEOUT` | Request timeout in seconds |
    /// | `FLAKEFINDER_MAX_RETRIES` | Retries for transient failures |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ci_url: std::env::var("FLAKEFINDER_CI_URL").unwrap_or(defaults.ci_url),
            storage_url: std::env::var("FLAKEFINDER_STORAGE_URL").unwrap_or(defaults.storage_url),
            bucket: std::env::var("FLAKEFINDER_BUCKET").unwrap_or(defaults.bucket),
            github_url: std::env::var("FLAKEFINDER_GITHUB_URL").unwrap_or(defaults.github_url),
            token: std::env::var("FLAKEFINDER_TOKEN").ok(),
            lane_pattern: std::env::var("FLAKEFINDER_LANE_PATTERN")
                .unwrap_or(defaults.lane_pattern),
            lookback_hours: env_parse("FLAKEFINDER_LOOKBACK_HOURS")
                .unwrap_or(defaults.lookback_hours),
            max_concurrent_fetches: env_parse("FLAKEFINDER_MAX_CONCURRENT_FETCHES")
                .unwrap_or(defaults.max_concurrent_fetches),
            timeout_secs: env_parse("FLAKEFINDER_TIMEOUT").unwrap_or(defaults.timeout_secs),
            max_retries: env_parse("FLAKEFINDER_MAX_RETRIES").unwrap_or(defaults.max_retries),
            ..defaults
        }
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> FinderResult<()> {
        if self.max_concurrent_fetches == 0 {
            return Err(config_error("max_concurrent_fetches must be at least 1"));
        }
        if self.page_size == 0 {
            return Err(config_error("page_size must be at least 1"));
        }
        if self.lookback_hours == 0 {
            return Err(config_error("lookback must be at least one hour"));
        }
        if self.lookback_hours > MAX_LOOKBACK_HOURS {
            return Err(config_error(&format!(
                "lookback of {}h exceeds the maximum of {MAX_LOOKBACK_HOURS}h",
                self.lookback_hours
            )));
        }
        if self.breaker_threshold == 0 {
            return Err(config_error("breaker_threshold must be at least 1"));
        }
        self.lane_regex()?;
        self.artifact_regex()?;
        Ok(())
    }

    pub fn lane_regex(&self) -> FinderResult<Regex> {
        compile("lane_pattern", &self.lane_pattern)
    }

    pub fn artifact_regex(&self) -> FinderResult<Regex> {
        compile("artifact_pattern", &self.artifact_pattern)
    }

    pub fn lookback(&self) -> FinderResult<chrono::Duration> {
        i64::try_from(self.lookback_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .ok_or_else(|| {
                config_error(&format!(
                    "lookback of {}h is out of range",
                    self.lookback_hours
                ))
            })
    }

    /// Report window of the configured lookback ending at `end`, or now.
    pub fn report_window(&self, end: Option<DateTime<Utc>>) -> FinderResult<ReportWindow> {
        self.validate()?;
        let lookback = self.lookback()?;
        match end {
            Some(end) => ReportWindow::ending_at(end, lookback),
            None => ReportWindow::until_now(lookback),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_millis(self.breaker_cooldown_ms)
    }

    /// Set the CI server URL.
    pub fn with_ci_url(mut self, url: impl Into<String>) -> Self {
        self.ci_url = url.into();
        self
    }

    /// Set the blob store URL.
    pub fn with_storage_url(mut self, url: impl Into<String>) -> Self {
        self.storage_url = url.into();
        self
    }

    /// Set the source-control API URL.
    pub fn with_github_url(mut self, url: impl Into<String>) -> Self {
        self.github_url = url.into();
        self
    }

    /// Set the bucket.
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// Set the token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the lane name pattern.
    pub fn with_lane_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.lane_pattern = pattern.into();
        self
    }

    /// Set the report window length.
    pub fn with_lookback_hours(mut self, hours: u64) -> Self {
        self.lookback_hours = hours;
        self
    }

    /// Set the in-flight request limit.
    pub fn with_max_concurrent_fetches(mut self, max: usize) -> Self {
        self.max_concurrent_fetches = max;
        self
    }

    /// Set retry and breaker tuning in one go.
    pub fn with_retry_tuning(mut self, max_retries: u32, threshold: u32, cooldown_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.breaker_threshold = threshold;
        self.breaker_cooldown_ms = cooldown_ms;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn compile(field: &str, pattern: &str) -> FinderResult<Regex> {
    Regex::new(pattern).map_err(|e| FinderError::Config {
        message: format!("{field} {pattern:?} is not a valid regex: {e}"),
    })
}

fn config_error(message: &str) -> FinderError {
    FinderError::Config {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        std::env::remove_var("FLAKEFINDER_CI_URL");
        std::env::remove_var("FLAKEFINDER_TOKEN");
        std::env::remove_var("FLAKEFINDER_MAX_CONCURRENT_FETCHES");

        let config = FinderConfig::from_env();
        assert_eq!(config.ci_url, "http://localhost:8080");
        assert!(config.token.is_none());
        assert_eq!(config.max_concurrent_fetches, 5);
        assert_eq!(config.page_size, 10);
    }

    #[test]
    #[serial]
    fn test_config_from_env_overrides() {
        std::env::set_var("FLAKEFINDER_MAX_CONCURRENT_FETCHES", "3");
        std::env::set_var("FLAKEFINDER_LOOKBACK_HOURS", "not-a-number");

        let config = FinderConfig::from_env();
        assert_eq!(config.max_concurrent_fetches, 3);
        assert_eq!(config.lookback_hours, 336);

        std::env::remove_var("FLAKEFINDER_MAX_CONCURRENT_FETCHES");
        std::env::remove_var("FLAKEFINDER_LOOKBACK_HOURS");
    }

    #[test]
    fn test_config_builder() {
        let config = FinderConfig::default()
            .with_ci_url("https://jenkins.example")
            .with_token("secret")
            .with_lane_pattern("^test-kubevirt-.*$")
            .with_lookback_hours(24);

        assert_eq!(config.ci_url, "https://jenkins.example");
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.lookback().unwrap(), chrono::Duration::hours(24));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_regex = FinderConfig::default().with_lane_pattern("(unclosed");
        assert!(matches!(
            bad_regex.validate(),
            Err(FinderError::Config { .. })
        ));

        let no_fetches = FinderConfig::default().with_max_concurrent_fetches(0);
        assert!(no_fetches.validate().is_err());

        let no_window = FinderConfig::default().with_lookback_hours(0);
        assert!(no_window.validate().is_err());
    }

    #[test]
    fn test_huge_lookback_is_a_config_error() {
        let century = FinderConfig::default().with_lookback_hours(MAX_LOOKBACK_HOURS);
        assert!(century.validate().is_ok());
        assert!(century.report_window(None).is_ok());

        for hours in [MAX_LOOKBACK_HOURS + 1, 3_000_000_000, u64::MAX] {
            let config = FinderConfig::default().with_lookback_hours(hours);
            assert!(matches!(
                config.validate(),
                Err(FinderError::Config { .. })
            ));
            assert!(matches!(
                config.report_window(None),
                Err(FinderError::Config { .. })
            ));
        }
        assert!(FinderConfig::default()
            .with_lookback_hours(u64::MAX)
            .lookback()
            .is_err());
    }

    #[test]
    fn test_default_artifact_pattern() {
        let re = FinderConfig::default().artifact_regex().unwrap();
        assert!(re.is_match("junit.functest.xml"));
        assert!(re.is_match("partial.junit.functest.1.xml"));
        assert!(!re.is_match("junit.unit.xml"));
    }
}
