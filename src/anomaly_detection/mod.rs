//! Spending anomaly detection
//!
//! Maintains a rolling statistical profile of each user's spend per
//! category and scores new transactions against it with three independent
//! signals.
//!
//! ## Components
//! - 📐 `statistics` - online fold and batch recompute of mean/variance
//! - 🎯 `scorer` - amount z-score against the category profile
//! - ⏱️ `frequency` - same-category bursts in a trailing window
//! - 🏷️ `novelty` - unfamiliar merchant / description heuristic
//! - ⚖️ `risk` - factor aggregation, risk level, explanation
//! - 🔄 `updater` / `rebuilder` - incremental and full profile maintenance
//! - 💾 `storage` - repository traits and the in-memory backend
//! - 🗓️ `jobs` - periodic refresh of every active user's profiles

pub mod config;
pub mod detector;
pub mod errors;
pub mod frequency;
pub mod jobs;
pub mod locks;
pub mod novelty;
pub mod profile;
pub mod rebuilder;
pub mod risk;
pub mod scorer;
pub mod statistics;
pub mod storage;
pub mod transaction;
pub mod updater;

pub use config::{AnomalyDetectionConfig, CandidateCounting, ZeroVariancePolicy};
pub use detector::AnomalyDetector;
pub use errors::{AnomalyDetectionError, Result};
pub use jobs::{ProfileRefreshJob, RefreshSummary};
pub use novelty::{DescriptionNoveltyAnalyzer, TokenSimilarityAnalyzer};
pub use profile::{ProfileKey, ProfileSnapshot, ProfileState, SpendingProfile};
pub use rebuilder::RebuildSummary;
pub use risk::{AnomalyFactor, Confidence, RiskLevel};
pub use statistics::StatisticsAccumulator;
pub use storage::{
    DecisionLog, DecisionRecord, DecisionSummary, MemoryStorage, ProfileRepository, TransactionRepository,
    UserDirectory,
};
pub use transaction::{Transaction, TransactionKind};
pub use updater::ProfileUpdateOutcome;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Why a verdict was produced without scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictReason {
    InsufficientData,
}

/// Structured detection result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    /// At least one factor fired
    pub is_anomaly: bool,
    pub risk_level: RiskLevel,
    pub confidence: Confidence,
    /// Amount z-score; 0 when the profile was not scored or has zero variance
    pub z_score: f64,
    pub anomaly_factors: BTreeSet<AnomalyFactor>,
    pub explanation: String,
    pub reason: Option<VerdictReason>,
    pub profile_state: ProfileState,
    /// Profile values at evaluation time, absent when no profile existed
    pub profile_snapshot: Option<ProfileSnapshot>,
    /// Signals whose query timed out and were treated as not triggered
    pub degraded_signals: Vec<AnomalyFactor>,
}

impl AnomalyVerdict {
    /// Verdict for a category without enough confirmed history
    pub fn insufficient_data(state: ProfileState, profile_snapshot: Option<ProfileSnapshot>) -> Self {
        Self {
            is_anomaly: false,
            risk_level: RiskLevel::Low,
            confidence: Confidence::Low,
            z_score: 0.0,
            anomaly_factors: BTreeSet::new(),
            explanation: risk::ExplanationBuilder::insufficient_data(),
            reason: Some(VerdictReason::InsufficientData),
            profile_state: state,
            profile_snapshot,
            degraded_signals: Vec::new(),
        }
    }
}

/// Decision log aggregate for one user
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyStats {
    pub anomaly_count: u64,
    pub total_checks: u64,
    /// Percentage of checks flagged as anomalous (0-100)
    pub anomaly_rate: f64,
    pub window_days: u32,
}

impl AnomalyStats {
    pub fn from_summary(summary: DecisionSummary, window_days: u32) -> Self {
        let anomaly_rate = if summary.total_checks == 0 {
            0.0
        } else {
            summary.anomaly_count as f64 / summary.total_checks as f64 * 100.0
        };
        Self {
            anomaly_count: summary.anomaly_count,
            total_checks: summary.total_checks,
            anomaly_rate,
            window_days,
        }
    }
}
