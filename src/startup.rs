use crate::config::{ChannelKind, Config};
use anyhow::{Context, Result};
use sqlx::PgPool;

pub struct ValidationReport {
    pub environment: bool,
    /// `None` when the database was not checked.
    pub database: Option<bool>,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database.unwrap_or(true)
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        match self.database {
            Some(ok) => println!("Database Connectivity: {}", status(ok)),
            None => println!("Database Connectivity: ⏭  SKIPPED"),
        }

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

/// Checks the configuration and, when a pool is supplied, the database it points at.
pub async fn validate_environment(config: &Config, pool: Option<&PgPool>) -> ValidationReport {
    let mut report = ValidationReport {
        environment: true,
        database: None,
        errors: Vec::new(),
    };

    for error in validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", error));
    }

    if let Some(pool) = pool {
        match validate_database(pool).await {
            Ok(()) => report.database = Some(true),
            Err(e) => {
                report.database = Some(false);
                report.errors.push(format!("Database: {:#}", e));
            }
        }
    }

    report
}

fn validate_env_vars(config: &Config) -> Vec<String> {
    let mut errors = Vec::new();

    if config.server_port == 0 {
        errors.push("SERVER_PORT must be greater than 0".to_string());
    }
    if config.database_max_connections == 0 {
        errors.push("DATABASE_MAX_CONNECTIONS must be greater than 0".to_string());
    }

    let breaker = &config.gate.circuit_breaker;
    if !(breaker.failure_rate_threshold > 0.0 && breaker.failure_rate_threshold <= 100.0) {
        errors.push("CIRCUIT_FAILURE_RATE_THRESHOLD must be within 1..=100".to_string());
    }
    if breaker.sliding_window_size == 0 {
        errors.push("CIRCUIT_SLIDING_WINDOW_SIZE must be greater than 0".to_string());
    }
    if config.gate.retry.max_attempts == 0 {
        errors.push("RETRY_MAX_ATTEMPTS must be at least 1".to_string());
    }
    if config.scheduler.retry_ceiling < 1 {
        errors.push("SCHEDULER_RETRY_CEILING must be at least 1".to_string());
    }

    for (partner, limits) in config.gate.partners.partners.iter() {
        if limits.rate_per_second == 0 || limits.max_concurrent == 0 {
            errors.push(format!("partner '{}' limits must be greater than 0", partner));
        }
    }

    match (&config.events.channel, &config.events.webhook_url) {
        (ChannelKind::Webhook, None) => {
            errors.push("EVENT_WEBHOOK_URL is required when EVENT_CHANNEL=webhook".to_string());
        }
        (_, Some(raw)) => {
            if let Err(e) = url::Url::parse(raw) {
                errors.push(format!("EVENT_WEBHOOK_URL is not a valid URL: {}", e));
            }
        }
        _ => {}
    }

    errors
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}
