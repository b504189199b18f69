//! Anomaly detector - main entry point
//!
//! Wires the profile store, the three signals, the aggregator and the two
//! profile maintenance paths behind the caller-facing operations.

use chrono::{Duration as ChronoDuration, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::anomaly_detection::{
    config::AnomalyDetectionConfig,
    errors::{AnomalyDetectionError, Result},
    frequency::FrequencyAnalyzer,
    locks::ProfileLocks,
    novelty::{DescriptionNoveltyAnalyzer, TokenSimilarityAnalyzer},
    profile::ProfileState,
    rebuilder::{ProfileRebuilder, RebuildSummary},
    risk::{AnomalyFactor, Confidence, ExplanationBuilder, RiskAssessment, SignalSet},
    scorer::AmountScorer,
    storage::{DecisionLog, ProfileRepository, TransactionRepository},
    transaction::Transaction,
    updater::{ProfileUpdateOutcome, ProfileUpdater},
    AnomalyStats, AnomalyVerdict,
};

/// Spending anomaly detector
pub struct AnomalyDetector {
    /// Configuration
    config: AnomalyDetectionConfig,
    /// Profile store
    profiles: Arc<dyn ProfileRepository>,
    /// Externally-maintained decision log
    decisions: Arc<dyn DecisionLog>,
    /// Amount signal
    scorer: AmountScorer,
    /// Frequency signal
    frequency: FrequencyAnalyzer,
    /// Merchant signal
    novelty: Arc<dyn DescriptionNoveltyAnalyzer>,
    explanations: ExplanationBuilder,
    updater: ProfileUpdater,
    rebuilder: ProfileRebuilder,
}

impl AnomalyDetector {
    /// Create a detector over separate repositories
    pub fn new(
        config: AnomalyDetectionConfig,
        profiles: Arc<dyn ProfileRepository>,
        transactions: Arc<dyn TransactionRepository>,
        decisions: Arc<dyn DecisionLog>,
    ) -> Result<Self> {
        config.validate()?;
        info!("🤖 initializing spending anomaly detector");

        let locks = Arc::new(ProfileLocks::new());

        Ok(Self {
            scorer: AmountScorer::new(config.scoring.clone()),
            frequency: FrequencyAnalyzer::new(transactions.clone(), config.frequency.clone()),
            novelty: Arc::new(TokenSimilarityAnalyzer::new(transactions.clone(), config.novelty.clone())),
            explanations: ExplanationBuilder::new(config.frequency.window_hours),
            updater: ProfileUpdater::new(profiles.clone(), locks.clone()),
            rebuilder: ProfileRebuilder::new(profiles.clone(), transactions, locks),
            profiles,
            decisions,
            config,
        })
    }

    /// Create a detector over one backend implementing every repository
    pub fn from_storage<S>(config: AnomalyDetectionConfig, storage: Arc<S>) -> Result<Self>
    where
        S: ProfileRepository + TransactionRepository + DecisionLog + 'static,
    {
        Self::new(config, storage.clone(), storage.clone(), storage)
    }

    /// Replace the description novelty heuristic
    pub fn with_novelty_analyzer(mut self, analyzer: Arc<dyn DescriptionNoveltyAnalyzer>) -> Self {
        info!(analyzer = analyzer.name(), "novelty analyzer replaced");
        self.novelty = analyzer;
        self
    }

    pub fn config(&self) -> &AnomalyDetectionConfig {
        &self.config
    }

    /// Score a candidate transaction against the user's category profile.
    ///
    /// Repository failures propagate; only a timed-out frequency or novelty
    /// query is degraded to "not triggered".
    pub async fn detect_anomaly(&self, tx: &Transaction, user_id: &str) -> Result<AnomalyVerdict> {
        let start_time = Instant::now();
        validate_candidate(user_id, tx)?;
        let amount = tx.amount_f64()?;

        info!(user_id = %user_id, category = %tx.category, amount, "🔍 detecting anomaly");

        let profile = self
            .bounded("profile lookup", self.profiles.get(user_id, &tx.category))
            .await?;
        let state = self.scorer.state(profile.as_ref());

        let profile = match (state, profile) {
            (ProfileState::Established, Some(profile)) => profile,
            (state, profile) => {
                debug!(user_id = %user_id, category = %tx.category, ?state, "insufficient data for scoring");
                return Ok(AnomalyVerdict::insufficient_data(
                    state,
                    profile.map(|p| p.snapshot()),
                ));
            }
        };

        let amount_signal = self.scorer.score(amount, &profile);

        // 频率与商户信号互不依赖，并发查询
        let budget = self.config.timeouts.signal_timeout();
        let (frequency, novelty) = tokio::join!(
            timeout(budget, self.frequency.evaluate(user_id, tx)),
            timeout(
                budget,
                self.novelty.is_novel(user_id, &tx.category, tx.description.as_deref())
            ),
        );

        let mut degraded = Vec::new();
        let high_frequency = match frequency {
            Ok(result) => result?.triggered,
            Err(_) => {
                degraded.push(AnomalyFactor::HighFrequency);
                false
            }
        };
        let unusual_merchant = match novelty {
            Ok(result) => result?,
            Err(_) => {
                degraded.push(AnomalyFactor::UnusualMerchant);
                false
            }
        };
        if !degraded.is_empty() {
            warn!(
                user_id = %user_id,
                category = %tx.category,
                timeout_ms = self.config.timeouts.signal_timeout_ms,
                degraded = ?degraded,
                "⚠️ signal query timed out, treated as not triggered"
            );
        }

        let signals = SignalSet {
            unusual_amount: amount_signal.triggered,
            high_frequency,
            unusual_merchant,
        };
        let assessment = RiskAssessment::assess(&signals, amount_signal.z_score, self.config.scoring.escalation_zscore);
        let explanation = self.explanations.explain(amount, profile.avg_amount, &assessment.factors);

        let verdict = AnomalyVerdict {
            is_anomaly: assessment.is_anomaly(),
            risk_level: assessment.risk_level,
            confidence: Confidence::High,
            z_score: amount_signal.z_score,
            anomaly_factors: assessment.factors,
            explanation,
            reason: None,
            profile_state: state,
            profile_snapshot: Some(profile.snapshot()),
            degraded_signals: degraded,
        };

        let duration_ms = start_time.elapsed().as_millis() as u64;
        if verdict.is_anomaly {
            warn!(
                user_id = %user_id,
                category = %tx.category,
                z_score = verdict.z_score,
                risk_level = ?verdict.risk_level,
                factors = ?verdict.anomaly_factors,
                duration_ms,
                "⚠️ anomalous transaction detected"
            );
        } else {
            debug!(user_id = %user_id, z_score = verdict.z_score, duration_ms, "✅ transaction looks normal");
        }

        Ok(verdict)
    }

    /// Feed a transaction the user (or policy) confirmed as normal into its profile
    pub async fn update_user_profile(&self, user_id: &str, tx: &Transaction, is_normal: bool) -> Result<ProfileUpdateOutcome> {
        validate_candidate(user_id, tx)?;
        info!(user_id = %user_id, category = %tx.category, is_normal, "updating spending profile");
        self.updater.apply(user_id, tx, is_normal).await
    }

    /// Recompute one or all category profiles from full history
    pub async fn rebuild_user_profile(&self, user_id: &str, category: Option<&str>) -> Result<RebuildSummary> {
        validate_user(user_id)?;
        if category.is_some_and(|c| c.trim().is_empty()) {
            return Err(AnomalyDetectionError::InvalidInput("category filter is blank".to_string()));
        }
        info!(user_id = %user_id, category = ?category, "rebuilding spending profile");
        self.rebuilder.rebuild(user_id, category).await
    }

    /// Anomaly rate over the trailing statistics window of the decision log
    pub async fn get_anomaly_stats(&self, user_id: &str) -> Result<AnomalyStats> {
        validate_user(user_id)?;
        let window_days = self.config.stats.window_days;
        let since = Utc::now() - ChronoDuration::days(i64::from(window_days));

        let summary = self.decisions.summarize(user_id, since).await?;
        Ok(AnomalyStats::from_summary(summary, window_days))
    }

    async fn bounded<T>(&self, operation: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let budget: Duration = self.config.timeouts.signal_timeout();
        timeout(budget, fut)
            .await
            .map_err(|_| AnomalyDetectionError::timed_out(operation, self.config.timeouts.signal_timeout_ms))?
    }
}

fn validate_user(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(AnomalyDetectionError::InvalidInput("user id is required".to_string()));
    }
    Ok(())
}

fn validate_candidate(user_id: &str, tx: &Transaction) -> Result<()> {
    validate_user(user_id)?;
    tx.validate()?;
    if !tx.user_id.is_empty() && tx.user_id != user_id {
        return Err(AnomalyDetectionError::InvalidInput(
            "transaction belongs to a different user".to_string(),
        ));
    }
    Ok(())
}
