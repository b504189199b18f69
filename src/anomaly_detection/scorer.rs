//! Amount scoring against a spending profile

use serde::{Deserialize, Serialize};

use crate::anomaly_detection::{
    config::{ScoringConfig, ZeroVariancePolicy},
    profile::{ProfileState, SpendingProfile},
};

/// Standardized distance of `amount` from the mean; 0 when `std_deviation` is 0
pub fn z_score(amount: f64, avg_amount: f64, std_deviation: f64) -> f64 {
    if std_deviation > 0.0 {
        (amount - avg_amount).abs() / std_deviation
    } else {
        0.0
    }
}

/// Result of the amount signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmountSignal {
    pub z_score: f64,
    pub triggered: bool,
}

/// Amount-based anomaly scorer
#[derive(Debug, Clone)]
pub struct AmountScorer {
    config: ScoringConfig,
}

impl AmountScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn state(&self, profile: Option<&SpendingProfile>) -> ProfileState {
        ProfileState::of(profile, self.config.min_sample)
    }

    /// Score `amount` against an established profile.
    ///
    /// The threshold is exclusive: a z-score exactly at it does not fire.
    pub fn score(&self, amount: f64, profile: &SpendingProfile) -> AmountSignal {
        let z = z_score(amount, profile.avg_amount, profile.std_deviation);

        let triggered = if profile.std_deviation > 0.0 {
            z > self.config.zscore_threshold
        } else {
            match self.config.zero_variance {
                ZeroVariancePolicy::Ignore => false,
                ZeroVariancePolicy::AbsoluteDeviation { max_deviation } => {
                    (amount - profile.avg_amount).abs() > max_deviation
                }
            }
        };

        AmountSignal { z_score: z, triggered }
    }
}
