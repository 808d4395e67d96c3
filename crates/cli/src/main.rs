//! Storelink CLI - Database migrations and operational tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! storelink-cli migrate
//!
//! # Rebuild the notification-routing cache from the database
//! storelink-cli cache warmup
//!
//! # Drop the cached rules of one integration (or all of them)
//! storelink-cli cache invalidate --integration 42
//! storelink-cli cache invalidate
//!
//! # Re-publish the last 7 days of orders of an integration
//! storelink-cli sync orders --integration 42 --days 7
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `cache warmup` / `cache invalidate` - Notification cache maintenance
//! - `sync orders` - Bulk order sync, waiting for the run to finish

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use storelink_core::IntegrationId;

mod commands;

#[derive(Parser)]
#[command(name = "storelink-cli")]
#[command(author, version, about = "Storelink CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        /// `PostgreSQL` connection string
        #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
        database_url: String,
    },
    /// Maintain the notification-routing cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Run bulk syncs
    Sync {
        #[command(subcommand)]
        target: SyncTarget,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Load every enabled rule into the cache
    Warmup,
    /// Drop cached rules
    Invalidate {
        /// Only drop this integration's rules
        #[arg(short, long)]
        integration: Option<IntegrationId>,
    },
}

#[derive(Subcommand)]
enum SyncTarget {
    /// Fetch and publish an integration's orders
    Orders {
        /// Integration to sync
        #[arg(short, long)]
        integration: IntegrationId,

        /// Window in days, counted back from now
        #[arg(short, long, default_value_t = 30)]
        days: i64,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storelink_cli=info,storelink_service=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate { database_url } => commands::migrate::run(database_url).await?,
        Commands::Cache { action } => match action {
            CacheAction::Warmup => commands::cache::warmup().await?,
            CacheAction::Invalidate { integration } => {
                commands::cache::invalidate(integration).await?;
            }
        },
        Commands::Sync { target } => match target {
            SyncTarget::Orders { integration, days } => {
                commands::sync::orders(integration, days).await?;
            }
        },
    }
    Ok(())
}
