//! Repository interfaces and the in-memory backend
//!
//! The engine only reads and writes through these traits. `MemoryStorage`
//! implements all of them for tests and embedded use; the relational
//! backend lives in `crate::storage`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::anomaly_detection::{
    errors::{AnomalyDetectionError, Result},
    profile::{ProfileKey, SpendingProfile},
    transaction::{Transaction, TransactionKind},
};

/// A historical description and how often it occurred
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionFrequency {
    pub description: String,
    pub frequency: u64,
}

/// One (category, amount) row of a user's expense history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    pub category: String,
    pub amount: f64,
}

/// One entry of the externally-maintained decision log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub user_id: String,
    pub transaction_id: Option<String>,
    pub is_anomaly: bool,
    pub created_at: DateTime<Utc>,
}

/// Aggregate over the decision log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DecisionSummary {
    pub anomaly_count: u64,
    pub total_checks: u64,
}

/// Spending profile store
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn get(&self, user_id: &str, category: &str) -> Result<Option<SpendingProfile>>;

    /// Insert or replace the profile of `(profile.user_id, profile.category)`
    async fn upsert(&self, profile: &SpendingProfile) -> Result<()>;
}

/// Read access to the user's transaction history
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Transactions of the category stamped within the last `since_hours`
    async fn list_recent(&self, user_id: &str, category: &str, since_hours: u32) -> Result<Vec<Transaction>>;

    /// Most frequent non-empty descriptions, frequency descending
    async fn top_descriptions(&self, user_id: &str, category: &str, limit: usize) -> Result<Vec<DescriptionFrequency>>;

    /// Every expense of the user, optionally restricted to one category
    async fn list_all_expenses(&self, user_id: &str, category: Option<&str>) -> Result<Vec<ExpenseRecord>>;
}

/// Append-only log of detection outcomes, written by the caller
#[async_trait]
pub trait DecisionLog: Send + Sync {
    async fn record(&self, decision: DecisionRecord) -> Result<()>;

    async fn summarize(&self, user_id: &str, since: DateTime<Utc>) -> Result<DecisionSummary>;
}

/// Source of users whose profiles the refresh job maintains
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn active_users(&self) -> Result<Vec<String>>;
}

/// In-memory backend (uses `RwLock`)
#[derive(Default)]
pub struct MemoryStorage {
    profiles: Arc<RwLock<HashMap<ProfileKey, SpendingProfile>>>,
    transactions: Arc<RwLock<Vec<Transaction>>>,
    decisions: Arc<RwLock<Vec<DecisionRecord>>>,
    users: Arc<RwLock<BTreeMap<String, bool>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transaction to the history (registers the user as active)
    pub fn insert_transaction(&self, tx: Transaction) -> Result<()> {
        self.upsert_user(&tx.user_id, true)?;
        let mut transactions = self.transactions.write()
            .map_err(|_| AnomalyDetectionError::LockPoisoned)?;
        transactions.push(tx);
        Ok(())
    }

    pub fn upsert_user(&self, user_id: &str, is_active: bool) -> Result<()> {
        let mut users = self.users.write()
            .map_err(|_| AnomalyDetectionError::LockPoisoned)?;
        users.insert(user_id.to_string(), is_active);
        Ok(())
    }

    pub fn profile_count(&self) -> Result<usize> {
        let profiles = self.profiles.read()
            .map_err(|_| AnomalyDetectionError::LockPoisoned)?;
        Ok(profiles.len())
    }
}

#[async_trait]
impl ProfileRepository for MemoryStorage {
    async fn get(&self, user_id: &str, category: &str) -> Result<Option<SpendingProfile>> {
        let profiles = self.profiles.read()
            .map_err(|_| AnomalyDetectionError::LockPoisoned)?;
        Ok(profiles.get(&ProfileKey::new(user_id, category)).cloned())
    }

    async fn upsert(&self, profile: &SpendingProfile) -> Result<()> {
        let mut profiles = self.profiles.write()
            .map_err(|_| AnomalyDetectionError::LockPoisoned)?;
        profiles.insert(profile.key(), profile.clone());
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for MemoryStorage {
    async fn list_recent(&self, user_id: &str, category: &str, since_hours: u32) -> Result<Vec<Transaction>> {
        let cutoff = Utc::now() - Duration::hours(i64::from(since_hours));
        let transactions = self.transactions.read()
            .map_err(|_| AnomalyDetectionError::LockPoisoned)?;

        let mut recent: Vec<Transaction> = transactions
            .iter()
            .filter(|tx| tx.user_id == user_id && tx.category == category && tx.timestamp >= cutoff)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(recent)
    }

    async fn top_descriptions(&self, user_id: &str, category: &str, limit: usize) -> Result<Vec<DescriptionFrequency>> {
        let transactions = self.transactions.read()
            .map_err(|_| AnomalyDetectionError::LockPoisoned)?;

        let mut counts: HashMap<&str, u64> = HashMap::new();
        for tx in transactions.iter().filter(|tx| tx.user_id == user_id && tx.category == category) {
            if let Some(desc) = tx.description.as_deref().filter(|d| !d.trim().is_empty()) {
                *counts.entry(desc).or_default() += 1;
            }
        }

        let mut ranked: Vec<DescriptionFrequency> = counts
            .into_iter()
            .map(|(description, frequency)| DescriptionFrequency {
                description: description.to_string(),
                frequency,
            })
            .collect();
        // ties broken alphabetically so the cut at `limit` is stable
        ranked.sort_by(|a, b| b.frequency.cmp(&a.frequency).then_with(|| a.description.cmp(&b.description)));
        ranked.truncate(limit);
        Ok(ranked)
    }

    async fn list_all_expenses(&self, user_id: &str, category: Option<&str>) -> Result<Vec<ExpenseRecord>> {
        let transactions = self.transactions.read()
            .map_err(|_| AnomalyDetectionError::LockPoisoned)?;

        let mut expenses: Vec<&Transaction> = transactions
            .iter()
            .filter(|tx| tx.user_id == user_id && tx.kind == TransactionKind::Expense)
            .filter(|tx| category.map_or(true, |c| tx.category == c))
            .collect();
        expenses.sort_by_key(|tx| tx.timestamp);

        expenses
            .into_iter()
            .map(|tx| {
                Ok(ExpenseRecord {
                    category: tx.category.clone(),
                    amount: tx.amount_f64()?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl DecisionLog for MemoryStorage {
    async fn record(&self, decision: DecisionRecord) -> Result<()> {
        let mut decisions = self.decisions.write()
            .map_err(|_| AnomalyDetectionError::LockPoisoned)?;
        decisions.push(decision);
        Ok(())
    }

    async fn summarize(&self, user_id: &str, since: DateTime<Utc>) -> Result<DecisionSummary> {
        let decisions = self.decisions.read()
            .map_err(|_| AnomalyDetectionError::LockPoisoned)?;

        Ok(decisions
            .iter()
            .filter(|d| d.user_id == user_id && d.created_at >= since)
            .fold(DecisionSummary::default(), |mut acc, d| {
                acc.total_checks += 1;
                if d.is_anomaly {
                    acc.anomaly_count += 1;
                }
                acc
            }))
    }
}

#[async_trait]
impl UserDirectory for MemoryStorage {
    async fn active_users(&self) -> Result<Vec<String>> {
        let users = self.users.read()
            .map_err(|_| AnomalyDetectionError::LockPoisoned)?;
        Ok(users
            .iter()
            .filter(|(_, active)| **active)
            .map(|(id, _)| id.clone())
            .collect())
    }
}
