use anyhow::Context;
use dotenvy::dotenv;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::resilience::{CircuitBreakerConfig, RetryPolicy};

pub mod partners;

use partners::PartnerTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}', expected pretty or json", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    InProcess,
    Webhook,
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "in-process" | "inprocess" | "memory" => Ok(ChannelKind::InProcess),
            "webhook" => Ok(ChannelKind::Webhook),
            other => Err(format!("unknown event channel '{}', expected in-process or webhook", other)),
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::InProcess => f.write_str("in-process"),
            ChannelKind::Webhook => f.write_str("webhook"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GateSettings {
    pub partners: PartnerTable,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub retry_ceiling: i32,
    pub pending_grace: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(30_000),
            retry_ceiling: 3,
            pending_grace: Duration::from_millis(60_000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSettings {
    pub channel: ChannelKind,
    pub webhook_url: Option<String>,
    /// Shared key sent with outbound events and required on the inbound webhook.
    pub webhook_key: Option<String>,
    pub capacity: usize,
    pub redelivery_limit: u32,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            channel: ChannelKind::InProcess,
            webhook_url: None,
            webhook_key: None,
            capacity: 1024,
            redelivery_limit: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub log_format: LogFormat,
    pub gate: GateSettings,
    pub scheduler: SchedulerSettings,
    pub events: EventSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 8080,
            database_url: None,
            database_max_connections: 10,
            log_format: LogFormat::Pretty,
            gate: GateSettings::default(),
            scheduler: SchedulerSettings::default(),
            events: EventSettings::default(),
        }
    }
}

/// Reads `key` and parses it, falling back to `default` when unset.
pub(crate) fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| anyhow::anyhow!("{}: {}", key, e)),
        _ => Ok(default),
    }
}

pub(crate) fn env_millis(key: &str, default: Duration) -> anyhow::Result<Duration> {
    Ok(Duration::from_millis(env_or(key, default.as_millis() as u64)?))
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let defaults = Config::default();
        let breaker = defaults.gate.circuit_breaker;
        let retry = defaults.gate.retry;
        let scheduler = defaults.scheduler;
        let events = defaults.events;

        Ok(Config {
            server_port: env_or("SERVER_PORT", defaults.server_port)?,
            database_url: env_opt("DATABASE_URL"),
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", defaults.database_max_connections)?,
            log_format: env_or("LOG_FORMAT", defaults.log_format)?,
            gate: GateSettings {
                partners: PartnerTable::from_env().context("invalid partner limits")?,
                circuit_breaker: CircuitBreakerConfig {
                    failure_rate_threshold: env_or("CIRCUIT_FAILURE_RATE_THRESHOLD", breaker.failure_rate_threshold)?,
                    sliding_window_size: env_or("CIRCUIT_SLIDING_WINDOW_SIZE", breaker.sliding_window_size)?,
                    minimum_calls: env_or("CIRCUIT_MINIMUM_CALLS", breaker.minimum_calls)?,
                    open_wait: env_millis("CIRCUIT_OPEN_WAIT_MS", breaker.open_wait)?,
                    half_open_successes: env_or("CIRCUIT_HALF_OPEN_SUCCESSES", breaker.half_open_successes)?,
                },
                retry: RetryPolicy {
                    max_attempts: env_or("RETRY_MAX_ATTEMPTS", retry.max_attempts)?,
                    initial_backoff: env_millis("RETRY_INITIAL_BACKOFF_MS", retry.initial_backoff)?,
                    max_backoff: env_millis("RETRY_MAX_BACKOFF_MS", retry.max_backoff)?,
                    multiplier: env_or("RETRY_BACKOFF_MULTIPLIER", retry.multiplier)?,
                },
            },
            scheduler: SchedulerSettings {
                interval: env_millis("SCHEDULER_INTERVAL_MS", scheduler.interval)?,
                retry_ceiling: env_or("SCHEDULER_RETRY_CEILING", scheduler.retry_ceiling)?,
                pending_grace: env_millis("SCHEDULER_PENDING_GRACE_MS", scheduler.pending_grace)?,
            },
            events: EventSettings {
                channel: env_or("EVENT_CHANNEL", events.channel)?,
                webhook_url: env_opt("EVENT_WEBHOOK_URL"),
                webhook_key: env_opt("EVENT_WEBHOOK_KEY"),
                capacity: env_or("EVENT_CHANNEL_CAPACITY", events.capacity)?,
                redelivery_limit: env_or("EVENT_REDELIVERY_LIMIT", events.redelivery_limit)?,
            },
        })
    }

    pub fn require_database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set")
    }
}
