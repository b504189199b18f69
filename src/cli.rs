use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Spending profile maintenance CLI (library-facing definitions)
#[derive(Debug, Parser)]
#[command(name = "profile-maintenance", about = "Spending profile maintenance", disable_help_subcommand = true)]
pub struct Cli {
    /// SQLite database holding transactions, profiles and decisions
    #[arg(long, env = "ANOMALY_DATABASE_URL", default_value = "sqlite://./data/spending.db")]
    pub database_url: String,
    /// JSON config file; falls back to ANOMALY_* environment variables
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Recompute a user's profiles from full expense history
    Rebuild {
        #[arg(long)]
        user: String,
        /// Restrict the rebuild to one category
        #[arg(long)]
        category: Option<String>,
    },
    /// Rebuild every active user once
    RefreshAll,
    /// Keep refreshing every active user on the configured interval until Ctrl-C
    Watch,
    /// Anomaly rate over the stats window
    Stats {
        #[arg(long)]
        user: String,
    },
    /// Score a candidate transaction without storing it
    Check {
        #[arg(long)]
        user: String,
        #[arg(long)]
        category: String,
        #[arg(long)]
        amount: String,
        #[arg(long)]
        description: Option<String>,
        /// Append the verdict to the decision log
        #[arg(long)]
        record: bool,
    },
}
