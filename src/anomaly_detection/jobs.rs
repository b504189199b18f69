//! Background refresh of spending profiles
//!
//! Rebuilds the profiles of every active user from full history, once or
//! on a fixed interval. One user's failure is logged and counted; it never
//! aborts the run.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::anomaly_detection::{
    config::RefreshJobConfig, detector::AnomalyDetector, errors::Result, storage::UserDirectory,
};

/// Outcome of one refresh run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RefreshSummary {
    pub processed: usize,
    pub success_count: usize,
    pub error_count: usize,
}

pub struct ProfileRefreshJob {
    detector: Arc<AnomalyDetector>,
    users: Arc<dyn UserDirectory>,
    config: RefreshJobConfig,
}

impl ProfileRefreshJob {
    pub fn new(detector: Arc<AnomalyDetector>, users: Arc<dyn UserDirectory>) -> Self {
        let config = detector.config().refresh_job.clone();
        Self { detector, users, config }
    }

    /// Rebuild every active user's profiles once
    pub async fn run_once(&self) -> Result<RefreshSummary> {
        info!("🗓️ starting spending profile refresh");
        let users = self.users.active_users().await?;
        info!(users = users.len(), "active users to process");

        let outcomes: Vec<bool> = stream::iter(users)
            .map(|user_id| async move {
                match self.detector.rebuild_user_profile(&user_id, None).await {
                    Ok(summary) => {
                        info!(user_id = %user_id, categories = summary.categories_updated, "profile refreshed");
                        true
                    }
                    Err(e) => {
                        error!(user_id = %user_id, error = %e, "profile refresh failed");
                        false
                    }
                }
            })
            .buffer_unordered(self.config.max_concurrent_users)
            .collect()
            .await;

        let success_count = outcomes.iter().filter(|ok| **ok).count();
        let summary = RefreshSummary {
            processed: outcomes.len(),
            success_count,
            error_count: outcomes.len() - success_count,
        };
        info!(
            processed = summary.processed,
            success = summary.success_count,
            errors = summary.error_count,
            "✅ spending profile refresh completed"
        );
        Ok(summary)
    }

    /// Run immediately and then every `interval_secs` until `shutdown` is cancelled
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("profile refresh job stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!(error = %e, "profile refresh run failed");
                        }
                    }
                }
            }
        })
    }
}
