//! Engine configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.syncd/
//!   config.yaml    (optional: every field has a default)
//! ```
//!
//! # API pattern
//!
//! - `fn_at(path: &Path, …)`: explicit location; used in tests with `TempDir`
//! - `fn(…)`: derives the location from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::Priority;

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

/// Max simultaneously in-flight events per priority tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityThresholds {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl Default for PriorityThresholds {
    fn default() -> Self {
        Self {
            critical: 5,
            high: 10,
            medium: 20,
            low: 50,
        }
    }
}

impl PriorityThresholds {
    pub fn get(&self, priority: Priority) -> usize {
        match priority {
            Priority::Critical => self.critical,
            Priority::High => self.high,
            Priority::Medium => self.medium,
            Priority::Low => self.low,
        }
    }
}

/// Token-bucket admission limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    pub changes_per_second: u32,
    pub burst_limit: u32,
    pub window_ms: u64,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            changes_per_second: 100,
            burst_limit: 200,
            window_ms: 1000,
        }
    }
}

impl RateLimits {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DedupStrategy {
    /// Hash `(type, operation, target, timestamp)`; only byte-identical
    /// notifications collapse.
    #[default]
    Exact,
    /// Hash `(type, operation, target)` and collapse repeats seen within
    /// `window_ms`.
    ContentWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub strategy: DedupStrategy,
    pub window_ms: u64,
    pub capacity: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            strategy: DedupStrategy::Exact,
            window_ms: 500,
            capacity: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Linear backoff step: attempt `n` waits `n * backoff_ms` before the next try.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 1000,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempts: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempts)))
    }
}

/// Fixed delay applied once before an event of each tier starts work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleDelays {
    pub critical_ms: u64,
    pub high_ms: u64,
    pub medium_ms: u64,
    pub low_ms: u64,
}

impl Default for ThrottleDelays {
    fn default() -> Self {
        Self {
            critical_ms: 0,
            high_ms: 10,
            medium_ms: 50,
            low_ms: 100,
        }
    }
}

impl ThrottleDelays {
    pub fn delay(&self, priority: Priority) -> Duration {
        let ms = match priority {
            Priority::Critical => self.critical_ms,
            Priority::High => self.high_ms,
            Priority::Medium => self.medium_ms,
            Priority::Low => self.low_ms,
        };
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Global ceiling on in-flight events across all tiers.
    pub max_concurrent_changes: usize,
    pub batch_size: usize,
    pub batch_timeout_ms: u64,
    pub max_queue_size: usize,
    pub enable_deduplication: bool,
    pub enable_batching: bool,
    pub priority_thresholds: PriorityThresholds,
    pub rate_limits: RateLimits,
    pub dedup: DedupConfig,
    pub retry: RetryPolicy,
    pub throttle: ThrottleDelays,
    pub history_capacity: usize,
    pub metrics_interval_ms: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_changes: 50,
            batch_size: 10,
            batch_timeout_ms: 1000,
            max_queue_size: 1000,
            enable_deduplication: true,
            enable_batching: true,
            priority_thresholds: PriorityThresholds::default(),
            rate_limits: RateLimits::default(),
            dedup: DedupConfig::default(),
            retry: RetryPolicy::default(),
            throttle: ThrottleDelays::default(),
            history_capacity: 1000,
            metrics_interval_ms: 30_000,
        }
    }
}

impl ProcessorConfig {
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("max_concurrent_changes", self.max_concurrent_changes),
            ("batch_size", self.batch_size),
            ("max_queue_size", self.max_queue_size),
            ("history_capacity", self.history_capacity),
            ("dedup.capacity", self.dedup.capacity),
            ("priority_thresholds.critical", self.priority_thresholds.critical),
            ("priority_thresholds.high", self.priority_thresholds.high),
            ("priority_thresholds.medium", self.priority_thresholds.medium),
            ("priority_thresholds.low", self.priority_thresholds.low),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{field} must be > 0")));
            }
        }
        if self.rate_limits.changes_per_second == 0 || self.rate_limits.burst_limit == 0 {
            return Err(ConfigError::Invalid(
                "rate_limits.changes_per_second and rate_limits.burst_limit must be > 0"
                    .to_string(),
            ));
        }
        if self.rate_limits.window_ms == 0 {
            return Err(ConfigError::Invalid(
                "rate_limits.window_ms must be > 0".to_string(),
            ));
        }
        if self.metrics_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "metrics_interval_ms must be > 0".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub persist_state: bool,
    pub project_root: PathBuf,
    /// Relative paths resolve against `project_root`.
    pub state_file: PathBuf,
    pub max_version_history: usize,
    pub validate_state: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            persist_state: false,
            project_root: PathBuf::from("."),
            state_file: PathBuf::from(".sync-state.json"),
            max_version_history: 50,
            validate_state: true,
        }
    }
}

impl StateConfig {
    pub fn state_path(&self) -> PathBuf {
        if self.state_file.is_absolute() {
            self.state_file.clone()
        } else {
            self.project_root.join(&self.state_file)
        }
    }
}

// ---------------------------------------------------------------------------
// Root
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    pub processor: ProcessorConfig,
    pub state: StateConfig,
}

/// `<home>/.syncd/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".syncd").join("config.yaml")
}

/// Load config from `path`. A missing file yields the defaults.
pub fn load_at(path: &Path) -> Result<EngineConfig, ConfigError> {
    if !path.exists() {
        return Ok(EngineConfig::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    if contents.trim().is_empty() {
        return Ok(EngineConfig::default());
    }
    let config: EngineConfig =
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    config.processor.validate()?;
    Ok(config)
}

/// `load_at` convenience wrapper rooted at the user's home directory.
pub fn load() -> Result<EngineConfig, ConfigError> {
    load_at(&config_path_at(&home()?))
}

/// Save config atomically: write `<path>.tmp`, then rename.
pub fn save_at(path: &Path, config: &EngineConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
    }
    let yaml = serde_yaml::to_string(config)?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| io_err(path, e))?;
    Ok(())
}

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_surface() {
        let config = ProcessorConfig::default();
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.batch_timeout(), Duration::from_secs(1));
        assert_eq!(config.max_queue_size, 1000);
        assert!(config.enable_deduplication);
        assert!(config.enable_batching);
        assert_eq!(config.priority_thresholds.get(Priority::Low), 50);
        assert_eq!(config.rate_limits.burst_limit, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn backoff_is_linear_in_attempts() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.backoff(1), Duration::from_secs(1));
        assert_eq!(retry.backoff(2), Duration::from_secs(2));
    }

    #[test]
    fn throttle_delays_by_tier() {
        let throttle = ThrottleDelays::default();
        assert_eq!(throttle.delay(Priority::Critical), Duration::ZERO);
        assert_eq!(throttle.delay(Priority::High), Duration::from_millis(10));
        assert_eq!(throttle.delay(Priority::Medium), Duration::from_millis(50));
        assert_eq!(throttle.delay(Priority::Low), Duration::from_millis(100));
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let config = ProcessorConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_zero_metrics_interval() {
        let config = ProcessorConfig {
            metrics_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn relative_state_file_resolves_under_project_root() {
        let config = StateConfig {
            project_root: PathBuf::from("/work/app"),
            ..Default::default()
        };
        assert_eq!(
            config.state_path(),
            PathBuf::from("/work/app/.sync-state.json")
        );
    }
}
