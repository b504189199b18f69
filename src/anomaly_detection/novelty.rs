//! Merchant / description novelty
//!
//! A candidate description is familiar when it shares a substring with, or
//! is token-similar to, one of the user's most frequent descriptions in the
//! category. The check sits behind [`DescriptionNoveltyAnalyzer`] so the
//! heuristic can be replaced without touching the aggregator.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::anomaly_detection::{
    config::NoveltyConfig,
    errors::Result,
    storage::TransactionRepository,
};

/// Decides whether a description is new for the user's category
#[async_trait]
pub trait DescriptionNoveltyAnalyzer: Send + Sync {
    /// `true` means novel, i.e. the `unusual_merchant` factor fires
    async fn is_novel(&self, user_id: &str, category: &str, description: Option<&str>) -> Result<bool>;

    fn name(&self) -> &str;
}

/// Jaccard similarity of the whitespace-separated token sets of `a` and `b`
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let left: HashSet<&str> = a.split_whitespace().collect();
    let right: HashSet<&str> = b.split_whitespace().collect();

    let union = left.union(&right).count();
    if union == 0 {
        return 0.0;
    }
    left.intersection(&right).count() as f64 / union as f64
}

/// Case-insensitive substring containment either way, or Jaccard above `threshold`
pub fn is_familiar(candidate: &str, known: &str, threshold: f64) -> bool {
    let candidate = candidate.to_lowercase();
    let known = known.to_lowercase();

    candidate.contains(&known) || known.contains(&candidate) || jaccard_similarity(&candidate, &known) > threshold
}

/// Substring-or-Jaccard heuristic over the top historical descriptions
pub struct TokenSimilarityAnalyzer {
    transactions: Arc<dyn TransactionRepository>,
    config: NoveltyConfig,
}

impl TokenSimilarityAnalyzer {
    pub fn new(transactions: Arc<dyn TransactionRepository>, config: NoveltyConfig) -> Self {
        Self { transactions, config }
    }
}

#[async_trait]
impl DescriptionNoveltyAnalyzer for TokenSimilarityAnalyzer {
    async fn is_novel(&self, user_id: &str, category: &str, description: Option<&str>) -> Result<bool> {
        let Some(description) = description else {
            return Ok(false);
        };
        if description.chars().count() < self.config.min_description_chars {
            return Ok(false);
        }

        let history = self
            .transactions
            .top_descriptions(user_id, category, self.config.history_limit)
            .await?;
        let known: Vec<&str> = history
            .iter()
            .map(|h| h.description.as_str())
            .filter(|d| !d.trim().is_empty())
            .collect();

        // no baseline to compare against
        if known.is_empty() {
            return Ok(false);
        }

        let familiar = known
            .iter()
            .any(|k| is_familiar(description, k, self.config.similarity_threshold));

        debug!(
            user_id = %user_id,
            category = %category,
            compared = known.len(),
            familiar,
            "description novelty evaluated"
        );

        Ok(!familiar)
    }

    fn name(&self) -> &str {
        "token_similarity"
    }
}
