//! Crawl configuration: the declarative document that drives the dispatcher.
//!
//! ```yaml
//! file: hooks
//! interval: 1.5
//! downdir: /tmp/pages
//! after: sirens:drop_empty
//! patterns:
//!   - name: index
//!     links:
//!       - css: "a.post"
//!         attr: href
//!         call: post
//!   - name: post
//!     result:
//!       title: { css: "h1", trim: true }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;
use crate::models::ConfigMap;

/// One entry of `patterns`: a `name` plus the keys that select processors.
pub type PatternConfig = ConfigMap;

/// Top-level crawl configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrawlConfig {
    /// Pattern definitions. Consumed by the application at startup.
    #[serde(default)]
    pub patterns: Vec<PatternConfig>,

    /// `module:name` after hook applied to every result record.
    pub after: Option<String>,

    /// `module:name` result sink replacing the default stdout sink.
    pub result: Option<String>,

    /// Present (with any value) to bypass robots.txt checks.
    #[serde(default, deserialize_with = "presence")]
    pub disable_robots: bool,

    /// Minimum interval between requests to the same origin, in seconds.
    pub interval: Option<f64>,

    /// Random jitter added on top of `interval`, in seconds.
    pub jitter: Option<f64>,

    /// Target directory for `download` patterns without a function.
    pub downdir: Option<PathBuf>,

    /// Default module for references written as `:name`.
    pub file: Option<String>,

    /// User-Agent sent by the transport and matched against robots.txt.
    pub user_agent: Option<String>,

    /// Transport timeout, in seconds.
    pub timeout: Option<u64>,

    /// Keys not understood by the core, kept for collaborators.
    #[serde(flatten)]
    pub extra: ConfigMap,
}

/// Any value (including `null`) counts as "present".
fn presence<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    serde::de::IgnoredAny::deserialize(deserializer)?;
    Ok(true)
}

impl CrawlConfig {
    /// Parse a YAML document.
    pub fn from_yaml_str(source: &str) -> Result<Self, AppError> {
        Ok(serde_yaml::from_str(source)?)
    }

    /// Read and parse a YAML config file.
    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&source)
    }

    /// The rate limiter interval, if one is configured.
    pub fn interval(&self) -> Result<Option<Duration>, AppError> {
        self.interval.map(|secs| seconds("interval", secs)).transpose()
    }

    pub fn jitter(&self) -> Result<Duration, AppError> {
        Ok(self
            .jitter
            .map(|secs| seconds("jitter", secs))
            .transpose()?
            .unwrap_or(Duration::ZERO))
    }
}

fn seconds(key: &str, secs: f64) -> Result<Duration, AppError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| AppError::ConfigError(format!("Invalid '{key}' {secs}: must be >= 0")))
}

/// Read a string value from a config record.
pub fn get_str<'a>(cfg: &'a ConfigMap, key: &str) -> Result<Option<&'a str>, AppError> {
    match cfg.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(AppError::ConfigError(format!(
            "'{key}' must be a string, got {other}"
        ))),
    }
}

/// Read a boolean flag from a config record (absent means false).
pub fn get_bool(cfg: &ConfigMap, key: &str) -> Result<bool, AppError> {
    match cfg.get(key) {
        None | Some(serde_json::Value::Null) => Ok(false),
        Some(serde_json::Value::Bool(b)) => Ok(*b),
        Some(other) => Err(AppError::ConfigError(format!(
            "'{key}' must be a boolean, got {other}"
        ))),
    }
}

/// Interpret a value as a config record.
pub fn as_record<'a>(key: &str, value: &'a serde_json::Value) -> Result<&'a ConfigMap, AppError> {
    value
        .as_object()
        .ok_or_else(|| AppError::ConfigError(format!("'{key}' must be a mapping, got {value}")))
}
