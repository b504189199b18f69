//! Full profile recomputation from expense history
//!
//! Idempotent: the resulting profiles depend only on the stored history,
//! never on prior incremental state, so rebuilds are safe to retry.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::anomaly_detection::{
    errors::Result,
    locks::ProfileLocks,
    profile::{ProfileKey, SpendingProfile},
    statistics::StatisticsAccumulator,
    storage::{ProfileRepository, TransactionRepository},
};

/// Result of a rebuild
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebuildSummary {
    pub categories_updated: usize,
    pub profiles: Vec<SpendingProfile>,
}

pub struct ProfileRebuilder {
    profiles: Arc<dyn ProfileRepository>,
    transactions: Arc<dyn TransactionRepository>,
    locks: Arc<ProfileLocks>,
}

impl ProfileRebuilder {
    pub fn new(
        profiles: Arc<dyn ProfileRepository>,
        transactions: Arc<dyn TransactionRepository>,
        locks: Arc<ProfileLocks>,
    ) -> Self {
        Self {
            profiles,
            transactions,
            locks,
        }
    }

    /// Recompute every category profile of `user_id` (or only `category`)
    /// and upsert it over whatever was stored.
    ///
    /// Categories without expenses are left as they are.
    pub async fn rebuild(&self, user_id: &str, category: Option<&str>) -> Result<RebuildSummary> {
        let expenses = self.transactions.list_all_expenses(user_id, category).await?;

        let mut groups: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for expense in expenses {
            groups.entry(expense.category).or_default().push(expense.amount);
        }
        debug!(user_id = %user_id, categories = groups.len(), "expense history grouped");

        let mut profiles = Vec::with_capacity(groups.len());
        for (cat, amounts) in groups {
            let Some(stats) = StatisticsAccumulator::from_batch(&amounts) else {
                continue;
            };
            let key = ProfileKey::new(user_id, cat);
            let profile = SpendingProfile::from_statistics(&key, &stats, Utc::now());

            let _guard = self.locks.acquire(&key).await;
            self.profiles.upsert(&profile).await?;
            profiles.push(profile);
        }

        info!(
            user_id = %user_id,
            category = ?category,
            categories_updated = profiles.len(),
            "spending profiles rebuilt"
        );

        Ok(RebuildSummary {
            categories_updated: profiles.len(),
            profiles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly_detection::storage::MemoryStorage;
    use crate::anomaly_detection::transaction::{Transaction, TransactionKind};
    use rust_decimal::Decimal;

    fn seeded_storage() -> Arc<MemoryStorage> {
        let storage = Arc::new(MemoryStorage::new());
        for amount in [2, 4, 4, 4, 5, 5, 7, 9] {
            storage
                .insert_transaction(Transaction::expense("u1", "Market", Decimal::from(amount)))
                .unwrap();
        }
        storage
            .insert_transaction(Transaction::expense("u1", "Fuel", Decimal::from(40)))
            .unwrap();
        storage
            .insert_transaction(
                Transaction::expense("u1", "Market", Decimal::from(1000)).with_kind(TransactionKind::Income),
            )
            .unwrap();
        storage
    }

    fn rebuilder(storage: &Arc<MemoryStorage>) -> ProfileRebuilder {
        ProfileRebuilder::new(storage.clone(), storage.clone(), Arc::new(ProfileLocks::new()))
    }

    #[tokio::test]
    async fn test_rebuild_reproduces_population_statistics() {
        let storage = seeded_storage();
        let summary = rebuilder(&storage).rebuild("u1", None).await.unwrap();
        assert_eq!(summary.categories_updated, 2);

        let market = storage.get("u1", "Market").await.unwrap().unwrap();
        assert_eq!(market.transaction_count, 8);
        assert!((market.avg_amount - 5.0).abs() < 1e-12);
        assert!((market.std_deviation - 2.0).abs() < 1e-12);
        assert_eq!(market.min_amount, 2.0);
        assert_eq!(market.max_amount, 9.0);
    }

    #[tokio::test]
    async fn test_rebuild_single_category() {
        let storage = seeded_storage();
        let summary = rebuilder(&storage).rebuild("u1", Some("Fuel")).await.unwrap();

        assert_eq!(summary.categories_updated, 1);
        assert!(storage.get("u1", "Market").await.unwrap().is_none());
        assert_eq!(storage.get("u1", "Fuel").await.unwrap().unwrap().avg_amount, 40.0);
    }

    #[tokio::test]
    async fn test_rebuild_overrides_drifted_profile_and_is_idempotent() {
        let storage = seeded_storage();
        let mut drifted = SpendingProfile::seeded(&ProfileKey::new("u1", "Market"), 999.0, Utc::now());
        drifted.transaction_count = 3;
        storage.upsert(&drifted).await.unwrap();

        let rebuilder = rebuilder(&storage);
        let first = rebuilder.rebuild("u1", None).await.unwrap();
        let second = rebuilder.rebuild("u1", None).await.unwrap();

        let strip = |s: &RebuildSummary| {
            s.profiles
                .iter()
                .map(|p| (p.category.clone(), p.avg_amount, p.std_deviation, p.transaction_count))
                .collect::<Vec<_>>()
        };
        assert_eq!(strip(&first), strip(&second));
        assert_eq!(storage.get("u1", "Market").await.unwrap().unwrap().transaction_count, 8);
    }

    #[tokio::test]
    async fn test_rebuild_without_history() {
        let storage = Arc::new(MemoryStorage::new());
        let summary = rebuilder(&storage).rebuild("nobody", None).await.unwrap();
        assert_eq!(summary.categories_updated, 0);
        assert!(summary.profiles.is_empty());
    }
}
