// tests/util.rs
// Shared helpers for the integration tests
#![allow(dead_code)]

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use spending_anomaly::anomaly_detection::Transaction;
use spending_anomaly::storage::SqliteStorage;
use tempfile::TempDir;

/// File-backed database in a fresh temp dir; keep the `TempDir` alive for the test
pub async fn temp_storage() -> (TempDir, SqliteStorage) {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("spending.db").display());
    let storage = SqliteStorage::new_with_url(&url).await.expect("open sqlite");
    (dir, storage)
}

/// Expense dated `days_ago` days in the past, outside any frequency window
pub fn past_expense(user: &str, category: &str, amount: i64, description: &str, days_ago: i64) -> Transaction {
    Transaction::expense(user, category, Decimal::from(amount))
        .with_description(description)
        .at(Utc::now() - Duration::days(days_ago))
}

/// Twelve "Market" expenses with mean 150 and population std 20
pub fn market_history(user: &str) -> Vec<Transaction> {
    (0..12)
        .map(|i| {
            let amount = if i % 2 == 0 { 130 } else { 170 };
            past_expense(user, "Market", amount, "Migros", i + 2)
        })
        .collect()
}

pub async fn seed(storage: &SqliteStorage, txs: &[Transaction]) {
    for tx in txs {
        storage.insert_transaction(tx).await.expect("insert transaction");
    }
}
