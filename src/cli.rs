use clap::{Parser, Subcommand};
use std::sync::Arc;

use crate::adapters::{PostgresHistoryRepository, PostgresTransactionRepository};
use crate::config::Config;
use crate::ports::{PointHistoryStore, PointTransactionStore};
use crate::services::AccumulationService;
use crate::Recovery;

#[derive(Parser)]
#[command(name = "membership-points")]
#[command(about = "Membership Points - resilient point accumulation service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Run database migrations
    Migrate,

    /// Run one retry sweep over the point history ledger and exit
    Sweep,

    /// Configuration validation
    Config {
        /// Also check database connectivity and migrations
        #[arg(long)]
        check_db: bool,
    },
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;

    println!("✓ Database migrations completed");

    Ok(())
}

pub async fn handle_sweep(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;
    let transactions: Arc<dyn PointTransactionStore> =
        Arc::new(PostgresTransactionRepository::new(pool.clone()));
    let ledger: Arc<dyn PointHistoryStore> = Arc::new(PostgresHistoryRepository::new(pool));

    let accumulation = Arc::new(AccumulationService::new(transactions));
    let recovery = Recovery::build(config, accumulation, ledger);

    tracing::info!("Running retry sweep...");
    match recovery.scheduler.sweep().await? {
        Some(report) => {
            println!("✓ Sweep finished:");
            println!("  Selected:            {}", report.selected);
            println!("  Completed:           {}", report.completed);
            println!("  Failed:              {}", report.failed);
            println!("  Max retry exceeded:  {}", report.max_retry_exceeded);
            println!("  Errors:              {}", report.errors);
        }
        None => println!("Sweep already running, nothing to do"),
    }

    Ok(())
}

pub async fn handle_config_validate(config: &Config, check_db: bool) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!(
        "  Database URL: {}",
        config.database_url.as_deref().map(mask_password).unwrap_or_else(|| "<unset>".to_string())
    );
    println!("  Event Channel: {}", config.events.channel);
    if let Some(url) = &config.events.webhook_url {
        println!("  Webhook URL: {}", url);
    }
    println!("  Retry Ceiling: {}", config.scheduler.retry_ceiling);
    println!("  Sweep Interval: {:?}", config.scheduler.interval);
    for (partner, limits) in &config.gate.partners.partners {
        println!(
            "  Partner {}: {} req/s (burst {}), {} concurrent, wait {:?}",
            partner, limits.rate_per_second, limits.burst, limits.max_concurrent, limits.max_wait
        );
    }

    let pool = if check_db {
        Some(crate::db::create_pool(config).await?)
    } else {
        None
    };
    let report = crate::startup::validate_environment(config, pool.as_ref()).await;
    report.print();

    if !report.is_valid() {
        anyhow::bail!("Configuration is invalid");
    }

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user_start = slash_pos + 2;
                let user = &url[user_start..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
