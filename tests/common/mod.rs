#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use membership_points::adapters::{InMemoryHistoryStore, InMemoryTransactionStore};
use membership_points::config::Config;
use membership_points::domain::PointHistory;
use membership_points::events::{spawn_consumer, ChannelPublisher};
use membership_points::resilience::RetryPolicy;
use membership_points::{create_app, AppState};

pub struct TestApp {
    pub base_url: String,
    pub client: reqwest::Client,
    pub transactions: Arc<InMemoryTransactionStore>,
    pub ledger: Arc<InMemoryHistoryStore>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Configuration with millisecond backoffs and a scheduler that never fires on its own.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.gate.retry = RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        multiplier: 2.0,
    };
    config.scheduler.interval = Duration::from_secs(3600);
    config.events.redelivery_limit = 3;
    config
}

pub async fn spawn_app(config: Config) -> TestApp {
    let transactions = Arc::new(InMemoryTransactionStore::new());
    let ledger = Arc::new(InMemoryHistoryStore::new());

    let (publisher, receiver) = ChannelPublisher::new(config.events.capacity);
    let publisher = Arc::new(publisher);
    let state = AppState::build(&config, transactions.clone(), ledger.clone(), publisher.clone());
    spawn_consumer(&publisher, receiver, state.ingestion.clone(), config.events.redelivery_limit);

    let app = create_app(state);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], 0));
    let server = axum::Server::bind(&addr).serve(app.into_make_service());
    let actual_addr = server.local_addr();

    tokio::spawn(async move {
        server.await.unwrap();
    });

    TestApp {
        base_url: format!("http://{}", actual_addr),
        client: reqwest::Client::new(),
        transactions,
        ledger,
    }
}

/// Polls `check` until it yields a value or five seconds pass.
pub async fn eventually<T, F, Fut>(mut check: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for _ in 0..500 {
        if let Some(value) = check().await {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 5s");
}

pub async fn only_entry(ledger: &InMemoryHistoryStore) -> PointHistory {
    let entries = ledger.all();
    assert_eq!(entries.len(), 1, "expected a single history entry, got {:?}", entries);
    entries.into_iter().next().unwrap()
}
