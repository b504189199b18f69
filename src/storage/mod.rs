//! SQLite-backed repositories
//!
//! Relational backend for the anomaly engine: transactions, spending
//! profiles, the decision log and the user directory live in one database
//! reached through an sqlx connection pool.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use sqlx::FromRow;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::anomaly_detection::{
    errors::{AnomalyDetectionError, Result},
    profile::SpendingProfile,
    storage::{
        DecisionLog, DecisionRecord, DecisionSummary, DescriptionFrequency, ExpenseRecord, ProfileRepository,
        TransactionRepository, UserDirectory,
    },
    transaction::{Transaction, TransactionKind},
};

#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
    is_memory: bool,
}

#[derive(Debug, FromRow)]
struct ProfileRow {
    user_id: String,
    category: String,
    avg_amount: f64,
    std_deviation: f64,
    min_amount: f64,
    max_amount: f64,
    transaction_count: i64,
    last_updated_ms: i64,
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: String,
    user_id: String,
    category: String,
    amount: String,
    description: Option<String>,
    kind: String,
    occurred_at_ms: i64,
}

#[derive(Debug, FromRow)]
struct ExpenseRow {
    category: String,
    amount: String,
}

#[derive(Debug, FromRow)]
struct DescriptionRow {
    description: String,
    frequency: i64,
}

#[derive(Debug, FromRow)]
struct SummaryRow {
    total_checks: i64,
    anomaly_count: i64,
}

impl SqliteStorage {
    pub async fn new_with_url(database_url: &str) -> Result<Self> {
        // accept both "sqlite:" and "sqlite://"
        let mut db_url = database_url.to_string();
        if db_url.starts_with("sqlite:") && !db_url.starts_with("sqlite://") && !db_url.contains(":memory:") {
            db_url = db_url.replacen("sqlite:", "sqlite://", 1);
        }
        let is_memory = db_url.contains(":memory:");

        if let Some(path) = db_url.strip_prefix("sqlite://") {
            let path_only = path.split_once('?').map(|(p, _)| p).unwrap_or(path);
            if !is_memory && !path_only.is_empty() {
                if let Some(parent) = std::path::Path::new(path_only).parent() {
                    if !parent.as_os_str().is_empty() {
                        if let Err(e) = std::fs::create_dir_all(parent) {
                            warn!("Failed to create database dir {:?}: {}", parent, e);
                        }
                    }
                }
            }
        }

        // Avoid logging the full URL; it may carry credentials for other drivers
        let safe_db_url_info = match db_url.split_once("://") {
            Some((scheme, rest)) => format!("{}://(redacted, len={})", scheme, rest.len()),
            None => "(memory or short form)".to_string(),
        };
        info!(db = %safe_db_url_info, "[storage] connecting to database");

        let connect_options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // every connection to :memory: is its own database, so keep exactly one
        let pool_options = if is_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .max_connections(10)
                .min_connections(1)
                .acquire_timeout(Duration::from_secs(30))
                .idle_timeout(Duration::from_secs(600))
        };
        let pool = pool_options.connect_with(connect_options).await?;

        let storage = Self { pool, is_memory };
        // 初始化数据库表结构
        storage.initialize_schema().await?;

        info!("Spending storage initialized");
        Ok(storage)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::new_with_url("sqlite::memory:").await
    }

    pub fn is_in_memory(&self) -> bool {
        self.is_memory
    }

    async fn initialize_schema(&self) -> Result<()> {
        debug!("Initializing database schema");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                is_active BOOLEAN NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                category TEXT NOT NULL,
                amount TEXT NOT NULL,
                description TEXT,
                kind TEXT NOT NULL,
                occurred_at_ms INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_transactions_user_category_time ON transactions (user_id, category, occurred_at_ms)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_spending_profile (
                user_id TEXT NOT NULL,
                category TEXT NOT NULL,
                avg_amount REAL NOT NULL,
                std_deviation REAL NOT NULL,
                min_amount REAL NOT NULL,
                max_amount REAL NOT NULL,
                transaction_count INTEGER NOT NULL,
                last_updated_ms INTEGER NOT NULL,
                PRIMARY KEY (user_id, category)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS anomaly_decisions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                transaction_id TEXT,
                is_anomaly BOOLEAN NOT NULL,
                created_at_ms INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_decisions_user_time ON anomaly_decisions (user_id, created_at_ms)")
            .execute(&self.pool)
            .await?;

        debug!("Database schema ready");
        Ok(())
    }

    pub async fn upsert_user(&self, user_id: &str, is_active: bool) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, is_active) VALUES (?1, ?2) ON CONFLICT(id) DO UPDATE SET is_active = excluded.is_active",
        )
        .bind(user_id)
        .bind(is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 写入交易记录；未知用户自动登记为活跃用户
    pub async fn insert_transaction(&self, tx: &Transaction) -> Result<()> {
        debug!(id = %tx.id, user_id = %tx.user_id, "storing transaction");

        sqlx::query("INSERT INTO users (id, is_active) VALUES (?1, 1) ON CONFLICT(id) DO NOTHING")
            .bind(&tx.user_id)
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO transactions (id, user_id, category, amount, description, kind, occurred_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&tx.id)
        .bind(&tx.user_id)
        .bind(&tx.category)
        .bind(tx.amount.to_string())
        .bind(&tx.description)
        .bind(tx.kind.as_str())
        .bind(tx.timestamp.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| AnomalyDetectionError::DataAccess(format!("stored timestamp {} out of range", ms)))
}

fn parse_stored_amount(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw).map_err(|e| AnomalyDetectionError::DataAccess(format!("corrupt stored amount {:?}: {}", raw, e)))
}

impl TryFrom<ProfileRow> for SpendingProfile {
    type Error = AnomalyDetectionError;

    fn try_from(row: ProfileRow) -> Result<Self> {
        Ok(Self {
            user_id: row.user_id,
            category: row.category,
            avg_amount: row.avg_amount,
            std_deviation: row.std_deviation,
            min_amount: row.min_amount,
            max_amount: row.max_amount,
            transaction_count: u64::try_from(row.transaction_count).map_err(|_| {
                AnomalyDetectionError::DataAccess(format!("negative transaction_count {}", row.transaction_count))
            })?,
            last_updated: from_millis(row.last_updated_ms)?,
        })
    }
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = AnomalyDetectionError;

    fn try_from(row: TransactionRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            category: row.category,
            amount: parse_stored_amount(&row.amount)?,
            description: row.description,
            timestamp: from_millis(row.occurred_at_ms)?,
            kind: TransactionKind::from_str(&row.kind)
                .map_err(|_| AnomalyDetectionError::DataAccess(format!("unknown stored kind {:?}", row.kind)))?,
        })
    }
}

#[async_trait]
impl ProfileRepository for SqliteStorage {
    async fn get(&self, user_id: &str, category: &str) -> Result<Option<SpendingProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT user_id, category, avg_amount, std_deviation, min_amount, max_amount,
                   transaction_count, last_updated_ms
            FROM user_spending_profile
            WHERE user_id = ?1 AND category = ?2
            "#,
        )
        .bind(user_id)
        .bind(category)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SpendingProfile::try_from).transpose()
    }

    async fn upsert(&self, profile: &SpendingProfile) -> Result<()> {
        let count = i64::try_from(profile.transaction_count)
            .map_err(|_| AnomalyDetectionError::DataAccess("transaction_count overflows storage".to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO user_spending_profile (
                user_id, category, avg_amount, std_deviation, min_amount, max_amount,
                transaction_count, last_updated_ms
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(user_id, category) DO UPDATE SET
                avg_amount = excluded.avg_amount,
                std_deviation = excluded.std_deviation,
                min_amount = excluded.min_amount,
                max_amount = excluded.max_amount,
                transaction_count = excluded.transaction_count,
                last_updated_ms = excluded.last_updated_ms
            "#,
        )
        .bind(&profile.user_id)
        .bind(&profile.category)
        .bind(profile.avg_amount)
        .bind(profile.std_deviation)
        .bind(profile.min_amount)
        .bind(profile.max_amount)
        .bind(count)
        .bind(profile.last_updated.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for SqliteStorage {
    async fn list_recent(&self, user_id: &str, category: &str, since_hours: u32) -> Result<Vec<Transaction>> {
        let cutoff = Utc::now() - ChronoDuration::hours(i64::from(since_hours));

        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, user_id, category, amount, description, kind, occurred_at_ms
            FROM transactions
            WHERE user_id = ?1 AND category = ?2 AND occurred_at_ms >= ?3
            ORDER BY occurred_at_ms DESC
            "#,
        )
        .bind(user_id)
        .bind(category)
        .bind(cutoff.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Transaction::try_from).collect()
    }

    async fn top_descriptions(&self, user_id: &str, category: &str, limit: usize) -> Result<Vec<DescriptionFrequency>> {
        let rows = sqlx::query_as::<_, DescriptionRow>(
            r#"
            SELECT description, COUNT(*) AS frequency
            FROM transactions
            WHERE user_id = ?1 AND category = ?2
              AND description IS NOT NULL AND TRIM(description) <> ''
            GROUP BY description
            ORDER BY frequency DESC, description ASC
            LIMIT ?3
            "#,
        )
        .bind(user_id)
        .bind(category)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| DescriptionFrequency {
                description: r.description,
                frequency: r.frequency.max(0) as u64,
            })
            .collect())
    }

    async fn list_all_expenses(&self, user_id: &str, category: Option<&str>) -> Result<Vec<ExpenseRecord>> {
        let rows = sqlx::query_as::<_, ExpenseRow>(
            r#"
            SELECT category, amount
            FROM transactions
            WHERE user_id = ?1 AND kind = 'expense' AND (?2 IS NULL OR category = ?2)
            ORDER BY occurred_at_ms
            "#,
        )
        .bind(user_id)
        .bind(category)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                let amount = parse_stored_amount(&r.amount)?
                    .to_f64()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| AnomalyDetectionError::DataAccess(format!("stored amount {} overflows f64", r.amount)))?;
                Ok(ExpenseRecord {
                    category: r.category,
                    amount,
                })
            })
            .collect()
    }
}

#[async_trait]
impl DecisionLog for SqliteStorage {
    async fn record(&self, decision: DecisionRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO anomaly_decisions (user_id, transaction_id, is_anomaly, created_at_ms) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&decision.user_id)
        .bind(&decision.transaction_id)
        .bind(decision.is_anomaly)
        .bind(decision.created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn summarize(&self, user_id: &str, since: DateTime<Utc>) -> Result<DecisionSummary> {
        let row = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT COUNT(*) AS total_checks,
                   COALESCE(SUM(CASE WHEN is_anomaly THEN 1 ELSE 0 END), 0) AS anomaly_count
            FROM anomaly_decisions
            WHERE user_id = ?1 AND created_at_ms >= ?2
            "#,
        )
        .bind(user_id)
        .bind(since.timestamp_millis())
        .fetch_one(&self.pool)
        .await?;

        Ok(DecisionSummary {
            anomaly_count: row.anomaly_count.max(0) as u64,
            total_checks: row.total_checks.max(0) as u64,
        })
    }
}

#[async_trait]
impl UserDirectory for SqliteStorage {
    async fn active_users(&self) -> Result<Vec<String>> {
        let users: Vec<(String,)> = sqlx::query_as("SELECT id FROM users WHERE is_active = 1 ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(users.into_iter().map(|(id,)| id).collect())
    }
}
