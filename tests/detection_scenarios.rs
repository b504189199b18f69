//! End-to-end detection scenarios over the SQLite backend

mod util;

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use spending_anomaly::anomaly_detection::{
    AnomalyDetectionConfig, AnomalyDetector, AnomalyFactor, Confidence, DecisionLog, DecisionRecord, MemoryStorage,
    ProfileRepository, ProfileState, ProfileUpdateOutcome, RiskLevel, Transaction, TransactionKind, ZeroVariancePolicy,
};
use spending_anomaly::anomaly_detection::VerdictReason;
use std::collections::BTreeSet;
use std::sync::Arc;
use util::{market_history, past_expense, seed, temp_storage};

async fn established_detector() -> (tempfile::TempDir, Arc<spending_anomaly::storage::SqliteStorage>, AnomalyDetector) {
    let (dir, storage) = temp_storage().await;
    seed(&storage, &market_history("u1")).await;
    let storage = Arc::new(storage);
    let detector = AnomalyDetector::from_storage(AnomalyDetectionConfig::default(), storage.clone()).unwrap();
    let summary = detector.rebuild_user_profile("u1", None).await.unwrap();
    assert_eq!(summary.categories_updated, 1);
    (dir, storage, detector)
}

#[tokio::test]
async fn large_purchase_at_new_merchant_is_high_risk() {
    let (_dir, storage, detector) = established_detector().await;

    let profile = storage.get("u1", "Market").await.unwrap().unwrap();
    assert_eq!(profile.transaction_count, 12);
    assert!((profile.avg_amount - 150.0).abs() < 1e-9);
    assert!((profile.std_deviation - 20.0).abs() < 1e-9);

    let candidate = Transaction::expense("u1", "Market", dec!(300)).with_description("Yeni Mağaza XYZ");
    let verdict = detector.detect_anomaly(&candidate, "u1").await.unwrap();

    assert!(verdict.is_anomaly);
    assert!((verdict.z_score - 7.5).abs() < 1e-9);
    assert_eq!(
        verdict.anomaly_factors,
        BTreeSet::from([AnomalyFactor::UnusualAmount, AnomalyFactor::UnusualMerchant])
    );
    assert_eq!(verdict.risk_level, RiskLevel::High);
    assert_eq!(verdict.confidence, Confidence::High);
    assert_eq!(verdict.profile_state, ProfileState::Established);
    assert!(verdict.explanation.contains("100%"), "{}", verdict.explanation);
    assert!(verdict.explanation.contains("merchant"), "{}", verdict.explanation);
    assert!(verdict.degraded_signals.is_empty());

    let json = serde_json::to_value(&verdict).unwrap();
    assert_eq!(json["anomaly_factors"], serde_json::json!(["unusual_amount", "unusual_merchant"]));
}

#[tokio::test]
async fn familiar_merchant_at_usual_amount_is_normal() {
    let (_dir, _storage, detector) = established_detector().await;

    let candidate = Transaction::expense("u1", "Market", dec!(155)).with_description("MIGROS Kadikoy");
    let verdict = detector.detect_anomaly(&candidate, "u1").await.unwrap();

    assert!(!verdict.is_anomaly);
    assert_eq!(verdict.risk_level, RiskLevel::Low);
    assert!(verdict.anomaly_factors.is_empty());
    assert_eq!(verdict.explanation, "Transaction looks normal.");
}

#[tokio::test]
async fn single_moderate_factor_is_medium_risk() {
    let (_dir, _storage, detector) = established_detector().await;

    // z = 2.75: above the threshold, below escalation
    let candidate = Transaction::expense("u1", "Market", dec!(205)).with_description("Migros");
    let verdict = detector.detect_anomaly(&candidate, "u1").await.unwrap();

    assert_eq!(verdict.anomaly_factors, BTreeSet::from([AnomalyFactor::UnusualAmount]));
    assert_eq!(verdict.risk_level, RiskLevel::Medium);
}

#[tokio::test]
async fn burst_of_same_category_purchases_triggers_frequency() {
    let (_dir, storage, detector) = established_detector().await;

    let burst: Vec<Transaction> = (0..3)
        .map(|i| {
            Transaction::expense("u1", "Market", dec!(150))
                .with_description("Migros")
                .at(Utc::now() - Duration::minutes(10 + i))
        })
        .collect();
    seed(&storage, &burst[..2]).await;

    let candidate = Transaction::expense("u1", "Market", dec!(150)).with_description("Migros");
    let verdict = detector.detect_anomaly(&candidate, "u1").await.unwrap();
    assert!(!verdict.anomaly_factors.contains(&AnomalyFactor::HighFrequency));

    seed(&storage, &burst[2..]).await;
    let verdict = detector.detect_anomaly(&candidate, "u1").await.unwrap();
    assert_eq!(verdict.anomaly_factors, BTreeSet::from([AnomalyFactor::HighFrequency]));
    assert_eq!(verdict.risk_level, RiskLevel::Medium);
    assert!(verdict.explanation.contains("last hour"), "{}", verdict.explanation);
}

#[tokio::test]
async fn stored_candidate_is_not_counted_twice() {
    let (_dir, storage, detector) = established_detector().await;

    let recent: Vec<Transaction> = (0..2)
        .map(|i| Transaction::expense("u1", "Market", dec!(150)).with_description("Migros").at(Utc::now() - Duration::minutes(5 + i)))
        .collect();
    seed(&storage, &recent).await;

    let candidate = Transaction::expense("u1", "Market", dec!(150)).with_description("Migros");
    seed(&storage, std::slice::from_ref(&candidate)).await;

    let verdict = detector.detect_anomaly(&candidate, "u1").await.unwrap();
    assert!(!verdict.is_anomaly);
}

#[tokio::test]
async fn low_sample_and_missing_profiles_are_insufficient_data() {
    let (_dir, storage) = temp_storage().await;
    let history: Vec<Transaction> = (0..5).map(|i| past_expense("u1", "Fuel", 40, "Shell", i + 1)).collect();
    seed(&storage, &history).await;
    let storage = Arc::new(storage);
    let detector = AnomalyDetector::from_storage(AnomalyDetectionConfig::default(), storage.clone()).unwrap();
    detector.rebuild_user_profile("u1", None).await.unwrap();

    let huge = Transaction::expense("u1", "Fuel", dec!(5000));
    let verdict = detector.detect_anomaly(&huge, "u1").await.unwrap();
    assert!(!verdict.is_anomaly);
    assert_eq!(verdict.reason, Some(VerdictReason::InsufficientData));
    assert_eq!(verdict.profile_state, ProfileState::LowSample);
    assert_eq!(verdict.confidence, Confidence::Low);
    assert_eq!(verdict.profile_snapshot.map(|s| s.transaction_count), Some(5));

    let unseen = Transaction::expense("u1", "Travel", dec!(5000));
    let verdict = detector.detect_anomaly(&unseen, "u1").await.unwrap();
    assert_eq!(verdict.profile_state, ProfileState::NoProfile);
    assert!(verdict.profile_snapshot.is_none());
}

#[tokio::test]
async fn confirmed_transactions_grow_profile_and_rejected_ones_do_not() {
    let (_dir, storage) = temp_storage().await;
    let storage = Arc::new(storage);
    let detector = AnomalyDetector::from_storage(AnomalyDetectionConfig::default(), storage.clone()).unwrap();

    let rejected = Transaction::expense("u1", "Market", dec!(9999));
    let outcome = detector.update_user_profile("u1", &rejected, false).await.unwrap();
    assert_eq!(outcome, ProfileUpdateOutcome::Skipped);
    assert!(storage.get("u1", "Market").await.unwrap().is_none());

    for amount in [dec!(100), dec!(200)] {
        let tx = Transaction::expense("u1", "Market", amount);
        detector.update_user_profile("u1", &tx, true).await.unwrap();
    }
    let profile = storage.get("u1", "Market").await.unwrap().unwrap();
    assert_eq!(profile.transaction_count, 2);
    assert!((profile.avg_amount - 150.0).abs() < 1e-9);
    assert!((profile.std_deviation - 50.0).abs() < 1e-9);
    assert_eq!((profile.min_amount, profile.max_amount), (100.0, 200.0));

    detector.update_user_profile("u1", &rejected, false).await.unwrap();
    assert_eq!(storage.get("u1", "Market").await.unwrap().unwrap().transaction_count, 2);
}

#[tokio::test]
async fn rebuild_ignores_income_and_restores_drifted_profile() {
    let (_dir, storage) = temp_storage().await;
    seed(&storage, &market_history("u1")).await;
    let salary = past_expense("u1", "Market", 25_000, "Salary", 3).with_kind(TransactionKind::Income);
    seed(&storage, std::slice::from_ref(&salary)).await;
    let storage = Arc::new(storage);
    let detector = AnomalyDetector::from_storage(AnomalyDetectionConfig::default(), storage.clone()).unwrap();

    detector.update_user_profile("u1", &Transaction::expense("u1", "Market", dec!(1)), true).await.unwrap();
    let first = detector.rebuild_user_profile("u1", Some("Market")).await.unwrap();
    let second = detector.rebuild_user_profile("u1", Some("Market")).await.unwrap();

    assert_eq!(first.profiles[0].transaction_count, 12);
    assert_eq!(first.profiles[0].avg_amount, second.profiles[0].avg_amount);
    assert_eq!(first.profiles[0].std_deviation, second.profiles[0].std_deviation);
    assert_eq!(storage.get("u1", "Market").await.unwrap().unwrap().max_amount, 170.0);
}

#[tokio::test]
async fn stats_cover_only_the_trailing_window() {
    let (_dir, storage) = temp_storage().await;
    let storage = Arc::new(storage);
    let detector = AnomalyDetector::from_storage(AnomalyDetectionConfig::default(), storage.clone()).unwrap();

    let empty = detector.get_anomaly_stats("u1").await.unwrap();
    assert_eq!((empty.total_checks, empty.anomaly_rate), (0, 0.0));

    for (is_anomaly, days_ago) in [(true, 1), (false, 2), (false, 3), (false, 4), (true, 45)] {
        storage
            .record(DecisionRecord {
                user_id: "u1".to_string(),
                transaction_id: None,
                is_anomaly,
                created_at: Utc::now() - Duration::days(days_ago),
            })
            .await
            .unwrap();
    }

    let stats = detector.get_anomaly_stats("u1").await.unwrap();
    assert_eq!(stats.total_checks, 4);
    assert_eq!(stats.anomaly_count, 1);
    assert_eq!(stats.anomaly_rate, 25.0);
    assert_eq!(stats.window_days, 30);
}

#[tokio::test]
async fn invalid_input_is_rejected() {
    let (_dir, _storage, detector) = established_detector().await;

    let other_user = Transaction::expense("u2", "Market", dec!(10));
    assert!(detector.detect_anomaly(&other_user, "u1").await.unwrap_err().is_recoverable());

    let negative = Transaction::expense("u1", "Market", dec!(-10));
    assert!(detector.detect_anomaly(&negative, "u1").await.is_err());

    let blank_user = Transaction::expense("u1", "Market", dec!(10));
    assert!(detector.detect_anomaly(&blank_user, "  ").await.is_err());
}

fn subscription_history(user: &str) -> Vec<Transaction> {
    (0..12)
        .map(|i| {
            Transaction::expense(user, "Subscriptions", dec!(29.99))
                .with_description("Netflix")
                .at(Utc::now() - Duration::days(30 * (i + 1)))
        })
        .collect()
}

#[tokio::test]
async fn flat_history_rebuilt_from_storage_has_zero_spread() {
    let (_dir, storage) = temp_storage().await;
    seed(&storage, &subscription_history("u1")).await;
    let storage = Arc::new(storage);
    let detector = AnomalyDetector::from_storage(AnomalyDetectionConfig::default(), storage.clone()).unwrap();
    detector.rebuild_user_profile("u1", None).await.unwrap();

    let profile = storage.get("u1", "Subscriptions").await.unwrap().unwrap();
    assert_eq!(profile.avg_amount, 29.99);
    assert_eq!(profile.std_deviation, 0.0);
    assert!(profile.min_amount <= profile.avg_amount && profile.avg_amount <= profile.max_amount);

    let renewal = Transaction::expense("u1", "Subscriptions", dec!(30.00)).with_description("Netflix");
    let verdict = detector.detect_anomaly(&renewal, "u1").await.unwrap();
    assert!(!verdict.is_anomaly);
    assert_eq!(verdict.z_score, 0.0);
    assert_eq!(verdict.risk_level, RiskLevel::Low);
}

#[tokio::test]
async fn flat_history_folded_one_by_one_has_zero_spread() {
    let storage = Arc::new(MemoryStorage::new());
    let detector = AnomalyDetector::from_storage(AnomalyDetectionConfig::default(), storage.clone()).unwrap();
    for tx in subscription_history("u1") {
        detector.update_user_profile("u1", &tx, true).await.unwrap();
    }

    let profile = storage.get("u1", "Subscriptions").await.unwrap().unwrap();
    assert_eq!(profile.transaction_count, 12);
    assert_eq!(profile.avg_amount, 29.99);
    assert_eq!(profile.std_deviation, 0.0);

    let renewal = Transaction::expense("u1", "Subscriptions", dec!(30.00));
    let verdict = detector.detect_anomaly(&renewal, "u1").await.unwrap();
    assert!(!verdict.is_anomaly);
    assert_eq!(verdict.z_score, 0.0);
}

#[tokio::test]
async fn flat_history_uses_absolute_deviation_policy_when_configured() {
    let storage = Arc::new(MemoryStorage::new());
    let mut config = AnomalyDetectionConfig::default();
    config.scoring.zero_variance = ZeroVariancePolicy::AbsoluteDeviation { max_deviation: 5.0 };
    let detector = AnomalyDetector::from_storage(config, storage.clone()).unwrap();
    for tx in subscription_history("u1") {
        detector.update_user_profile("u1", &tx, true).await.unwrap();
    }

    let renewal = Transaction::expense("u1", "Subscriptions", dec!(30.00));
    assert!(!detector.detect_anomaly(&renewal, "u1").await.unwrap().is_anomaly);

    let upgrade = Transaction::expense("u1", "Subscriptions", dec!(59.99));
    let verdict = detector.detect_anomaly(&upgrade, "u1").await.unwrap();
    assert_eq!(verdict.anomaly_factors, BTreeSet::from([AnomalyFactor::UnusualAmount]));
    assert_eq!(verdict.z_score, 0.0);
    assert_eq!(verdict.risk_level, RiskLevel::Medium);
}

#[tokio::test]
async fn confirming_another_users_transaction_is_rejected() {
    let storage = Arc::new(MemoryStorage::new());
    let detector = AnomalyDetector::from_storage(AnomalyDetectionConfig::default(), storage.clone()).unwrap();

    let foreign = Transaction::expense("u2", "Market", dec!(40));
    let err = detector.update_user_profile("u1", &foreign, true).await.unwrap_err();
    assert!(err.is_recoverable());
    assert!(storage.get("u1", "Market").await.unwrap().is_none());
}
