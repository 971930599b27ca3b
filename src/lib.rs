pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod events;
pub mod gate;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod ports;
pub mod resilience;
pub mod services;
pub mod startup;
pub mod validation;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::events::EventPublisher;
use crate::gate::AdmissionGate;
use crate::health::{DependencyChecker, LedgerChecker, TransactionStoreChecker};
use crate::ports::{PointHistoryStore, PointTransactionStore};
use crate::resilience::CircuitBreaker;
use crate::services::{AccumulationService, RecoveryIngestion, Replayer, RetryScheduler};

/// The recovery side of the pipeline, shared by the server and the `sweep` command.
pub struct Recovery {
    pub replayer: Arc<Replayer>,
    pub ingestion: Arc<RecoveryIngestion>,
    pub scheduler: Arc<RetryScheduler>,
}

impl Recovery {
    pub fn build(
        config: &Config,
        accumulation: Arc<AccumulationService>,
        ledger: Arc<dyn PointHistoryStore>,
    ) -> Self {
        // Replays never count against the live gate's window.
        let breaker = Arc::new(CircuitBreaker::new("recovery", config.gate.circuit_breaker.clone()));
        let replayer = Arc::new(Replayer::new(
            accumulation,
            ledger.clone(),
            breaker,
            config.gate.retry.clone(),
            config.scheduler.retry_ceiling,
        ));
        let ingestion = Arc::new(RecoveryIngestion::new(
            ledger.clone(),
            replayer.clone(),
            config.scheduler.pending_grace,
        ));
        let scheduler = Arc::new(RetryScheduler::new(
            ledger,
            replayer.clone(),
            config.scheduler.interval,
            config.scheduler.pending_grace,
        ));

        Self {
            replayer,
            ingestion,
            scheduler,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<AdmissionGate>,
    pub accumulation: Arc<AccumulationService>,
    pub ingestion: Arc<RecoveryIngestion>,
    pub scheduler: Arc<RetryScheduler>,
    pub ledger: Arc<dyn PointHistoryStore>,
    pub checkers: Arc<Vec<Arc<dyn DependencyChecker>>>,
    pub webhook_key: Option<String>,
    pub start_time: Instant,
}

impl AppState {
    pub fn build(
        config: &Config,
        transactions: Arc<dyn PointTransactionStore>,
        ledger: Arc<dyn PointHistoryStore>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        let gate = Arc::new(AdmissionGate::new(&config.gate, publisher));
        let accumulation = Arc::new(AccumulationService::new(transactions.clone()));
        let recovery = Recovery::build(config, accumulation.clone(), ledger.clone());

        let checkers: Vec<Arc<dyn DependencyChecker>> = vec![
            Arc::new(TransactionStoreChecker::new(transactions)),
            Arc::new(LedgerChecker::new(ledger.clone())),
        ];

        Self {
            gate,
            accumulation,
            ingestion: recovery.ingestion,
            scheduler: recovery.scheduler,
            ledger,
            checkers: Arc::new(checkers),
            webhook_key: config.events.webhook_key.clone(),
            start_time: Instant::now(),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/health/ready", get(handlers::ready))
        .route("/points/accumulate", post(handlers::points::accumulate))
        .route("/points/transactions/:member_id", get(handlers::points::transactions))
        .route("/api/events/point", post(handlers::webhook::receive_events))
        .route("/recovery/history", get(handlers::recovery::list_history))
        .route("/recovery/sweep", post(handlers::recovery::trigger_sweep))
        .layer(axum::middleware::from_fn(middleware::request_logger::request_logger_middleware))
        .with_state(state)
}
