//! Anomaly detection configuration
//!
//! Policy constants for scoring, the frequency and novelty signals, query
//! timeouts and the background refresh job. Loadable from JSON or from
//! `ANOMALY_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::anomaly_detection::errors::{AnomalyDetectionError, Result};

/// Anomaly detection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AnomalyDetectionConfig {
    /// Amount scoring and risk escalation
    pub scoring: ScoringConfig,

    /// Same-category burst detection
    pub frequency: FrequencyConfig,

    /// Merchant / description novelty
    pub novelty: NoveltyConfig,

    /// Upper bounds on repository reads made while scoring
    pub timeouts: TimeoutConfig,

    /// Decision log statistics
    pub stats: StatsConfig,

    /// Background profile refresh
    pub refresh_job: RefreshJobConfig,
}

/// Amount scoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Profiles with fewer confirmed transactions are not scored
    pub min_sample: u64,

    /// z-scores strictly above this flag `unusual_amount`
    pub zscore_threshold: f64,

    /// A single triggered factor escalates to high risk above this z-score
    pub escalation_zscore: f64,

    /// What to do when the profile's standard deviation is zero
    pub zero_variance: ZeroVariancePolicy,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_sample: 10,
            zscore_threshold: 2.5,
            escalation_zscore: 3.0,
            zero_variance: ZeroVariancePolicy::Ignore,
        }
    }
}

/// Behaviour of the amount signal against a zero-variance history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ZeroVariancePolicy {
    /// z-score is 0 and the amount signal never fires
    Ignore,
    /// Fire when the absolute deviation from the mean exceeds `max_deviation`
    AbsoluteDeviation { max_deviation: f64 },
}

/// Frequency signal configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrequencyConfig {
    /// Trailing window, in hours
    pub window_hours: u32,

    /// Same-category transactions in the window needed to flag a burst
    pub burst_threshold: usize,

    /// Whether the candidate counts towards its own burst
    pub candidate: CandidateCounting,
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            window_hours: 1,
            burst_threshold: 3,
            candidate: CandidateCounting::ExcludeCandidate,
        }
    }
}

/// Relationship between the candidate transaction and the frequency window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateCounting {
    /// Only other transactions are counted, even if the store already holds the candidate
    ExcludeCandidate,
    /// The candidate is counted exactly once, whether or not it was stored yet
    IncludeCandidate,
}

/// Description novelty configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoveltyConfig {
    /// Shorter descriptions carry too little signal and are never novel
    pub min_description_chars: usize,

    /// How many of the most frequent historical descriptions to compare against
    pub history_limit: usize,

    /// Token Jaccard similarity strictly above this makes a description familiar
    pub similarity_threshold: f64,
}

impl Default for NoveltyConfig {
    fn default() -> Self {
        Self {
            min_description_chars: 3,
            history_limit: 20,
            similarity_threshold: 0.6,
        }
    }
}

/// Timeout configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-query bound for the profile lookup and each signal query
    pub signal_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            signal_timeout_ms: 1000,
        }
    }
}

impl TimeoutConfig {
    pub fn signal_timeout(&self) -> Duration {
        Duration::from_millis(self.signal_timeout_ms)
    }
}

/// Statistics configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Trailing window over the decision log, in days
    pub window_days: u32,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { window_days: 30 }
    }
}

/// Refresh job configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshJobConfig {
    /// Delay between two full refreshes
    pub interval_secs: u64,

    /// Users rebuilt concurrently within one run
    pub max_concurrent_users: usize,
}

impl Default for RefreshJobConfig {
    fn default() -> Self {
        Self {
            interval_secs: 86_400,
            max_concurrent_users: 4,
        }
    }
}

impl RefreshJobConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl AnomalyDetectionConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from `ANOMALY_*` environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = env_parse("ANOMALY_MIN_SAMPLE")? {
            config.scoring.min_sample = v;
        }
        if let Some(v) = env_parse("ANOMALY_ZSCORE_THRESHOLD")? {
            config.scoring.zscore_threshold = v;
        }
        if let Some(v) = env_parse("ANOMALY_ESCALATION_ZSCORE")? {
            config.scoring.escalation_zscore = v;
        }
        if let Some(v) = env_parse::<f64>("ANOMALY_ZERO_VARIANCE_MAX_DEVIATION")? {
            config.scoring.zero_variance = ZeroVariancePolicy::AbsoluteDeviation { max_deviation: v };
        }
        if let Some(v) = env_parse("ANOMALY_FREQUENCY_WINDOW_HOURS")? {
            config.frequency.window_hours = v;
        }
        if let Some(v) = env_parse("ANOMALY_FREQUENCY_BURST_THRESHOLD")? {
            config.frequency.burst_threshold = v;
        }
        if let Some(v) = env_parse::<bool>("ANOMALY_FREQUENCY_INCLUDE_CANDIDATE")? {
            config.frequency.candidate = if v {
                CandidateCounting::IncludeCandidate
            } else {
                CandidateCounting::ExcludeCandidate
            };
        }
        if let Some(v) = env_parse("ANOMALY_NOVELTY_HISTORY_LIMIT")? {
            config.novelty.history_limit = v;
        }
        if let Some(v) = env_parse("ANOMALY_NOVELTY_SIMILARITY_THRESHOLD")? {
            config.novelty.similarity_threshold = v;
        }
        if let Some(v) = env_parse("ANOMALY_SIGNAL_TIMEOUT_MS")? {
            config.timeouts.signal_timeout_ms = v;
        }
        if let Some(v) = env_parse("ANOMALY_STATS_WINDOW_DAYS")? {
            config.stats.window_days = v;
        }
        if let Some(v) = env_parse("ANOMALY_REFRESH_INTERVAL_SECS")? {
            config.refresh_job.interval_secs = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration validity
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(AnomalyDetectionError::Configuration(msg.to_string()));

        if self.scoring.min_sample == 0 {
            return invalid("min_sample must be greater than 0");
        }
        if !(self.scoring.zscore_threshold > 0.0) {
            return invalid("zscore_threshold must be greater than 0");
        }
        if !(self.scoring.escalation_zscore > 0.0) {
            return invalid("escalation_zscore must be greater than 0");
        }
        if let ZeroVariancePolicy::AbsoluteDeviation { max_deviation } = self.scoring.zero_variance {
            if !(max_deviation >= 0.0) {
                return invalid("zero-variance max_deviation must not be negative");
            }
        }
        if self.frequency.window_hours == 0 {
            return invalid("frequency window_hours must be greater than 0");
        }
        if self.frequency.burst_threshold == 0 {
            return invalid("frequency burst_threshold must be greater than 0");
        }
        if self.novelty.history_limit == 0 {
            return invalid("novelty history_limit must be greater than 0");
        }
        let similarity = self.novelty.similarity_threshold;
        if !(similarity > 0.0 && similarity <= 1.0) {
            return invalid("novelty similarity_threshold must be in (0, 1]");
        }
        if self.timeouts.signal_timeout_ms == 0 {
            return invalid("signal_timeout_ms must be greater than 0");
        }
        if self.stats.window_days == 0 {
            return invalid("stats window_days must be greater than 0");
        }
        if self.refresh_job.interval_secs == 0 || self.refresh_job.max_concurrent_users == 0 {
            return invalid("refresh job interval and concurrency must be greater than 0");
        }

        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            AnomalyDetectionError::Configuration(format!("{} has an invalid value: {:?}", key, raw))
        }),
        Err(_) => Ok(None),
    }
}
