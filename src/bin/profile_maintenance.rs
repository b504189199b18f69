//! Spending profile maintenance entry point
//! Rebuilds profiles, runs the refresh job and inspects detector output
//! against a SQLite database.
use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde::Serialize;
use spending_anomaly::anomaly_detection::{
    AnomalyDetectionConfig, AnomalyDetector, DecisionLog, DecisionRecord, ProfileRefreshJob, Transaction,
};
use spending_anomaly::cli::{Cli, Commands};
use spending_anomaly::storage::SqliteStorage;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging()?;
    info!("Starting profile maintenance v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => AnomalyDetectionConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AnomalyDetectionConfig::from_env().context("loading config from environment")?,
    };

    let storage = Arc::new(
        SqliteStorage::new_with_url(&cli.database_url)
            .await
            .context("opening spending database")?,
    );
    let detector = Arc::new(AnomalyDetector::from_storage(config, storage.clone())?);

    match cli.command {
        Commands::Rebuild { user, category } => {
            let summary = detector.rebuild_user_profile(&user, category.as_deref()).await?;
            print_json(&summary)?;
        }
        Commands::RefreshAll => {
            let job = ProfileRefreshJob::new(detector, storage);
            let summary = job.run_once().await?;
            print_json(&summary)?;
        }
        Commands::Watch => {
            let job = Arc::new(ProfileRefreshJob::new(detector, storage));
            let shutdown = CancellationToken::new();
            let handle = job.spawn(shutdown.clone());

            tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
            info!("shutdown requested");
            shutdown.cancel();
            handle.await?;
        }
        Commands::Stats { user } => {
            let stats = detector.get_anomaly_stats(&user).await?;
            print_json(&stats)?;
        }
        Commands::Check { user, category, amount, description, record } => {
            let amount = Transaction::parse_amount(&amount)?;
            let mut tx = Transaction::expense(user.clone(), category, amount);
            if let Some(description) = description {
                tx = tx.with_description(description);
            }

            let verdict = detector.detect_anomaly(&tx, &user).await?;
            if record {
                storage
                    .record(DecisionRecord {
                        user_id: user,
                        transaction_id: Some(tx.id.clone()),
                        is_anomaly: verdict.is_anomaly,
                        created_at: Utc::now(),
                    })
                    .await?;
            }
            print_json(&verdict)?;
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    // logs go to stderr so stdout stays parseable JSON
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
