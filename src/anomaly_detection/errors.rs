//! Anomaly detection error types
//!
//! A single error enum for the engine. Repository failures are surfaced as
//! data-access errors and travel to the caller untouched; the engine never
//! turns them into a "safe" or "anomalous" verdict on its own.

use thiserror::Error;

/// Errors raised by the spending anomaly engine
#[derive(Debug, Error)]
pub enum AnomalyDetectionError {
    /// A repository call failed or timed out
    #[error("Data access error: {0}")]
    DataAccess(String),

    /// The relational store reported an error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An in-memory store lock was poisoned by a panicking writer
    #[error("Lock poisoned")]
    LockPoisoned,

    /// The candidate transaction is missing or carries malformed fields
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used across the engine
pub type Result<T> = std::result::Result<T, AnomalyDetectionError>;

impl AnomalyDetectionError {
    /// True for every failure that originates in a repository
    pub fn is_data_access(&self) -> bool {
        matches!(
            self,
            Self::DataAccess(_) | Self::Database(_) | Self::LockPoisoned
        )
    }

    /// Input errors are the only ones a caller can fix by resubmitting
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }

    pub(crate) fn timed_out(operation: &str, timeout_ms: u64) -> Self {
        Self::DataAccess(format!("{} timed out after {}ms", operation, timeout_ms))
    }
}

impl From<serde_json::Error> for AnomalyDetectionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
