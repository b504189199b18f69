//! Per-user, per-category spending profiles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::anomaly_detection::statistics::StatisticsAccumulator;

/// Identity of a spending profile
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProfileKey {
    pub user_id: String,
    pub category: String,
}

impl ProfileKey {
    pub fn new(user_id: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            category: category.into(),
        }
    }
}

impl fmt::Display for ProfileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.category)
    }
}

/// Rolling statistical summary of a user's spend in one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpendingProfile {
    pub user_id: String,
    pub category: String,
    pub avg_amount: f64,
    pub std_deviation: f64,
    pub min_amount: f64,
    pub max_amount: f64,
    pub transaction_count: u64,
    pub last_updated: DateTime<Utc>,
}

impl SpendingProfile {
    /// Profile seeded from the first confirmed amount of a category
    pub fn seeded(key: &ProfileKey, amount: f64, now: DateTime<Utc>) -> Self {
        Self::from_statistics(key, &StatisticsAccumulator::seed(amount), now)
    }

    pub fn from_statistics(key: &ProfileKey, stats: &StatisticsAccumulator, now: DateTime<Utc>) -> Self {
        Self {
            user_id: key.user_id.clone(),
            category: key.category.clone(),
            avg_amount: stats.mean(),
            std_deviation: stats.std_deviation(),
            min_amount: stats.min(),
            max_amount: stats.max(),
            transaction_count: stats.count(),
            last_updated: now,
        }
    }

    pub fn key(&self) -> ProfileKey {
        ProfileKey::new(self.user_id.clone(), self.category.clone())
    }

    /// Accumulator view of the persisted summary; `None` for an empty profile
    pub fn statistics(&self) -> Option<StatisticsAccumulator> {
        StatisticsAccumulator::from_parts(
            self.transaction_count,
            self.avg_amount,
            self.std_deviation,
            self.min_amount,
            self.max_amount,
        )
    }

    pub fn snapshot(&self) -> ProfileSnapshot {
        ProfileSnapshot {
            avg_amount: self.avg_amount,
            std_deviation: self.std_deviation,
            min_amount: self.min_amount,
            max_amount: self.max_amount,
            transaction_count: self.transaction_count,
        }
    }
}

/// Profile values captured at evaluation time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub avg_amount: f64,
    pub std_deviation: f64,
    pub min_amount: f64,
    pub max_amount: f64,
    pub transaction_count: u64,
}

/// Lifecycle stage of a (user, category) profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileState {
    NoProfile,
    /// 1 ≤ count < min_sample
    LowSample,
    /// count ≥ min_sample; the only state that produces non-trivial verdicts
    Established,
}

impl ProfileState {
    pub fn of(profile: Option<&SpendingProfile>, min_sample: u64) -> Self {
        match profile {
            None => Self::NoProfile,
            Some(p) if p.transaction_count == 0 => Self::NoProfile,
            Some(p) if p.transaction_count < min_sample => Self::LowSample,
            Some(_) => Self::Established,
        }
    }
}
