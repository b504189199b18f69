//! Candidate transaction model and input validation

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::anomaly_detection::errors::{AnomalyDetectionError, Result};

/// Longest category label accepted
pub const MAX_CATEGORY_LEN: usize = 100;

/// Direction of money movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    #[default]
    Expense,
    Income,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = AnomalyDetectionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "expense" => Ok(Self::Expense),
            "income" => Ok(Self::Income),
            other => Err(AnomalyDetectionError::InvalidInput(format!(
                "unknown transaction kind: {}",
                other
            ))),
        }
    }
}

/// A user transaction. Owned by the surrounding application; read-only here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub category: String,
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub kind: TransactionKind,
}

impl Transaction {
    /// New expense stamped now, with a fresh id
    pub fn expense(user_id: impl Into<String>, category: impl Into<String>, amount: Decimal) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            category: category.into(),
            amount,
            description: None,
            timestamp: Utc::now(),
            kind: TransactionKind::Expense,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_kind(mut self, kind: TransactionKind) -> Self {
        self.kind = kind;
        self
    }

    /// Reject transactions whose amount or category cannot be scored
    pub fn validate(&self) -> Result<()> {
        let category = self.category.trim();
        if category.is_empty() {
            return Err(AnomalyDetectionError::InvalidInput(
                "category is required".to_string(),
            ));
        }
        if category.chars().count() > MAX_CATEGORY_LEN {
            return Err(AnomalyDetectionError::InvalidInput(format!(
                "category exceeds {} characters",
                MAX_CATEGORY_LEN
            )));
        }
        if self.amount <= Decimal::ZERO {
            return Err(AnomalyDetectionError::InvalidInput(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        self.amount_f64().map(|_| ())
    }

    /// Amount as a float for the statistics engine
    pub fn amount_f64(&self) -> Result<f64> {
        self.amount
            .to_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| {
                AnomalyDetectionError::InvalidInput(format!("amount {} is not representable", self.amount))
            })
    }

    /// Parse a user-supplied decimal amount
    pub fn parse_amount(raw: &str) -> Result<Decimal> {
        Decimal::from_str(raw.trim())
            .map_err(|e| AnomalyDetectionError::InvalidInput(format!("malformed amount {:?}: {}", raw, e)))
    }
}
