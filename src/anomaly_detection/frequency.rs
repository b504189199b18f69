//! Same-category burst detection

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::anomaly_detection::{
    config::{CandidateCounting, FrequencyConfig},
    errors::Result,
    storage::TransactionRepository,
    transaction::Transaction,
};

/// Result of the frequency signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencySignal {
    /// Same-category transactions counted in the window
    pub count: usize,
    pub triggered: bool,
}

pub struct FrequencyAnalyzer {
    transactions: Arc<dyn TransactionRepository>,
    config: FrequencyConfig,
}

impl FrequencyAnalyzer {
    pub fn new(transactions: Arc<dyn TransactionRepository>, config: FrequencyConfig) -> Self {
        Self { transactions, config }
    }

    /// Number of stored same-category transactions in the trailing window
    pub async fn count_recent_same_category(&self, user_id: &str, category: &str, window_hours: u32) -> Result<usize> {
        Ok(self.transactions.list_recent(user_id, category, window_hours).await?.len())
    }

    /// Count the candidate's category over the configured window and apply the burst threshold
    pub async fn evaluate(&self, user_id: &str, candidate: &Transaction) -> Result<FrequencySignal> {
        let recent = self
            .transactions
            .list_recent(user_id, &candidate.category, self.config.window_hours)
            .await?;
        let others = recent.iter().filter(|tx| tx.id != candidate.id).count();

        let count = match self.config.candidate {
            CandidateCounting::ExcludeCandidate => others,
            CandidateCounting::IncludeCandidate => others + 1,
        };
        let triggered = count >= self.config.burst_threshold;

        debug!(
            user_id = %user_id,
            category = %candidate.category,
            count,
            triggered,
            "frequency signal evaluated"
        );

        Ok(FrequencySignal { count, triggered })
    }
}
