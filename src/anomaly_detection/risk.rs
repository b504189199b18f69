//! Risk aggregation and explanations
//!
//! Turns the three boolean signals into a factor set, a risk level and a
//! human-readable rationale.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A signal that fired for a candidate transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyFactor {
    UnusualAmount,
    HighFrequency,
    UnusualMerchant,
}

impl AnomalyFactor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnusualAmount => "unusual_amount",
            Self::HighFrequency => "high_frequency",
            Self::UnusualMerchant => "unusual_merchant",
        }
    }
}

impl fmt::Display for AnomalyFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categorical severity of a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// How much the verdict can be trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    High,
}

/// Outcome of the three independent signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignalSet {
    pub unusual_amount: bool,
    pub high_frequency: bool,
    pub unusual_merchant: bool,
}

impl SignalSet {
    pub fn factors(&self) -> BTreeSet<AnomalyFactor> {
        [
            (self.unusual_amount, AnomalyFactor::UnusualAmount),
            (self.high_frequency, AnomalyFactor::HighFrequency),
            (self.unusual_merchant, AnomalyFactor::UnusualMerchant),
        ]
        .into_iter()
        .filter_map(|(fired, factor)| fired.then_some(factor))
        .collect()
    }
}

/// Factor set plus the risk level derived from it
#[derive(Debug, Clone, PartialEq)]
pub struct RiskAssessment {
    pub factors: BTreeSet<AnomalyFactor>,
    pub risk_level: RiskLevel,
}

impl RiskAssessment {
    /// Two or more factors are high risk; a single factor is high only
    /// when the z-score exceeds `escalation_zscore`, otherwise medium.
    pub fn assess(signals: &SignalSet, z_score: f64, escalation_zscore: f64) -> Self {
        let factors = signals.factors();
        let risk_level = match factors.len() {
            0 => RiskLevel::Low,
            1 if z_score > escalation_zscore => RiskLevel::High,
            1 => RiskLevel::Medium,
            _ => RiskLevel::High,
        };
        Self { factors, risk_level }
    }

    pub fn is_anomaly(&self) -> bool {
        !self.factors.is_empty()
    }
}

/// Builds the rationale shown to the user
pub struct ExplanationBuilder {
    window_hours: u32,
}

impl ExplanationBuilder {
    pub fn new(window_hours: u32) -> Self {
        Self { window_hours }
    }

    /// One sentence per triggered factor, or a single "looks normal" sentence
    pub fn explain(&self, amount: f64, avg_amount: f64, factors: &BTreeSet<AnomalyFactor>) -> String {
        let mut sentences = Vec::with_capacity(factors.len());

        for factor in factors {
            match factor {
                AnomalyFactor::UnusualAmount => sentences.push(Self::amount_sentence(amount, avg_amount)),
                AnomalyFactor::HighFrequency => sentences.push(self.frequency_sentence()),
                AnomalyFactor::UnusualMerchant => sentences.push(
                    "This merchant or description has not been used in this category before.".to_string(),
                ),
            }
        }

        if sentences.is_empty() {
            return "Transaction looks normal.".to_string();
        }
        sentences.join(" ")
    }

    pub fn insufficient_data() -> String {
        "Not enough history in this category yet; the transaction is treated as normal.".to_string()
    }

    fn amount_sentence(amount: f64, avg_amount: f64) -> String {
        let direction = if amount > avg_amount { "higher" } else { "lower" };
        if avg_amount > 0.0 {
            let deviation = ((amount - avg_amount) / avg_amount * 100.0).abs();
            format!(
                "This amount ({:.2}) is {:.0}% {} than your average spending in this category.",
                amount, deviation, direction
            )
        } else {
            format!(
                "This amount ({:.2}) is {} than your average spending in this category.",
                amount, direction
            )
        }
    }

    fn frequency_sentence(&self) -> String {
        if self.window_hours == 1 {
            "Many transactions were made in this category within the last hour.".to_string()
        } else {
            format!(
                "Many transactions were made in this category within the last {} hours.",
                self.window_hours
            )
        }
    }
}
