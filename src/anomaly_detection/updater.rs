//! Incremental profile updates from confirmed-normal transactions

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::anomaly_detection::{
    errors::Result,
    locks::ProfileLocks,
    profile::{ProfileKey, SpendingProfile},
    statistics::StatisticsAccumulator,
    storage::ProfileRepository,
    transaction::Transaction,
};

/// What a profile update did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "profile", rename_all = "snake_case")]
pub enum ProfileUpdateOutcome {
    /// First confirmed transaction of the category
    Created(SpendingProfile),
    /// Existing profile folded forward by one transaction
    Updated(SpendingProfile),
    /// The transaction was not confirmed normal; nothing changed
    Skipped,
}

impl ProfileUpdateOutcome {
    pub fn profile(&self) -> Option<&SpendingProfile> {
        match self {
            Self::Created(p) | Self::Updated(p) => Some(p),
            Self::Skipped => None,
        }
    }
}

pub struct ProfileUpdater {
    profiles: Arc<dyn ProfileRepository>,
    locks: Arc<ProfileLocks>,
}

impl ProfileUpdater {
    pub fn new(profiles: Arc<dyn ProfileRepository>, locks: Arc<ProfileLocks>) -> Self {
        Self { profiles, locks }
    }

    /// Fold a confirmed-normal transaction into its category profile.
    ///
    /// Rejected transactions never touch the baseline.
    pub async fn apply(&self, user_id: &str, tx: &Transaction, is_normal: bool) -> Result<ProfileUpdateOutcome> {
        if !is_normal {
            debug!(user_id = %user_id, category = %tx.category, "transaction not confirmed normal, profile untouched");
            return Ok(ProfileUpdateOutcome::Skipped);
        }

        let amount = tx.amount_f64()?;
        let key = ProfileKey::new(user_id, tx.category.clone());
        let _guard = self.locks.acquire(&key).await;

        let current = self.profiles.get(user_id, &tx.category).await?;
        let outcome = match current.as_ref().and_then(|p| p.statistics()) {
            None => ProfileUpdateOutcome::Created(SpendingProfile::seeded(&key, amount, Utc::now())),
            Some(stats) => {
                let next = StatisticsAccumulator::from_fold(&stats, amount);
                ProfileUpdateOutcome::Updated(SpendingProfile::from_statistics(&key, &next, Utc::now()))
            }
        };

        if let Some(profile) = outcome.profile() {
            self.profiles.upsert(profile).await?;
            info!(
                user_id = %user_id,
                category = %tx.category,
                count = profile.transaction_count,
                avg = profile.avg_amount,
                std = profile.std_deviation,
                "spending profile updated"
            );
        }

        Ok(outcome)
    }
}
