use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use membership_points::adapters::{PostgresHistoryRepository, PostgresTransactionRepository};
use membership_points::cli::{self, Cli, Commands};
use membership_points::config::{ChannelKind, Config, LogFormat};
use membership_points::events::{spawn_consumer, ChannelPublisher, EventPublisher, WebhookPublisher};
use membership_points::ports::{PointHistoryStore, PointTransactionStore};
use membership_points::{create_app, db, startup, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Setup logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Migrate => cli::handle_db_migrate(&config).await,
        Commands::Sweep => cli::handle_sweep(&config).await,
        Commands::Config { check_db } => cli::handle_config_validate(&config, check_db).await,
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let report = startup::validate_environment(&config, None).await;
    if !report.is_valid() {
        report.print();
        anyhow::bail!("Startup validation failed");
    }

    // Database pool
    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;

    let transactions: Arc<dyn PointTransactionStore> =
        Arc::new(PostgresTransactionRepository::new(pool.clone()));
    let ledger: Arc<dyn PointHistoryStore> = Arc::new(PostgresHistoryRepository::new(pool));

    // Failure event channel
    let (publisher, channel): (Arc<dyn EventPublisher>, _) = match config.events.channel {
        ChannelKind::InProcess => {
            let (publisher, receiver) = ChannelPublisher::new(config.events.capacity);
            let publisher = Arc::new(publisher);
            (publisher.clone() as Arc<dyn EventPublisher>, Some((publisher, receiver)))
        }
        ChannelKind::Webhook => {
            let url = config
                .events
                .webhook_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("EVENT_WEBHOOK_URL must be set"))?;
            let publisher = WebhookPublisher::new(url, config.events.webhook_key.clone())?;
            tracing::info!("Publishing failure events to {}", url);
            (Arc::new(publisher) as Arc<dyn EventPublisher>, None)
        }
    };

    let state = AppState::build(&config, transactions, ledger, publisher);

    if let Some((publisher, receiver)) = channel {
        spawn_consumer(&publisher, receiver, state.ingestion.clone(), config.events.redelivery_limit);
        tracing::info!("In-process failure channel started");
    }

    state.scheduler.clone().start();
    tracing::info!(
        "Retry scheduler started (interval {:?}, ceiling {})",
        config.scheduler.interval,
        config.scheduler.retry_ceiling
    );

    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
