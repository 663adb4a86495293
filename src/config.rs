use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};

use crate::metrics::DEFAULT_BUCKETS;
use crate::queue::{QueueSettings, DEFAULT_WAIT};
use crate::store::DEFAULT_TTL;
use crate::worker::DEFAULT_POLL_ERROR_BACKOFF;

/// Longest long-poll a receive may ask for.
const MAX_WAIT_SECS: u64 = 20;
const MAX_RECEIVE_BATCH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Queue and correlation store on Redis.
    Redis,
    /// Everything in process. Nothing survives a restart.
    Memory,
}

/// Process configuration. Every flag can also come from the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "order-pipeline")]
#[command(about = "Order submission pipeline with end-to-end latency tracking")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Config {
    /// Address the HTTP API listens on.
    #[arg(long, env = "HTTP_ADDR", default_value = "0.0.0.0:3000")]
    pub http_addr: SocketAddr,

    #[arg(long, env = "BACKEND", value_enum, default_value_t = Backend::Redis)]
    pub backend: Backend,

    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379/")]
    pub redis_url: String,

    #[arg(long, env = "QUEUE_NAME", default_value = "order_submit")]
    pub queue_name: String,

    /// Long-poll wait per receive, in seconds.
    #[arg(long, env = "QUEUE_WAIT_SECS", default_value_t = DEFAULT_WAIT.as_secs())]
    pub queue_wait_secs: u64,

    /// Messages fetched per receive.
    #[arg(long, env = "QUEUE_RECEIVE_BATCH", default_value_t = 1)]
    pub queue_receive_batch: usize,

    /// Number of consumption workers.
    #[arg(long, env = "WORKERS", default_value_t = 4)]
    pub workers: usize,

    /// Lifetime of a correlation record, in seconds.
    #[arg(long, env = "CORRELATION_TTL_SECS", default_value_t = DEFAULT_TTL.as_secs())]
    pub correlation_ttl_secs: u64,

    /// Pause after a failed receive, in milliseconds.
    #[arg(
        long,
        env = "POLL_ERROR_BACKOFF_MS",
        default_value_t = DEFAULT_POLL_ERROR_BACKOFF.as_millis() as u64
    )]
    pub poll_error_backoff_ms: u64,

    #[arg(long, env = "METRICS_NAMESPACE", default_value = "marketplace")]
    pub metrics_namespace: String,

    #[arg(long, env = "METRICS_SUBSYSTEM", default_value = "api")]
    pub metrics_subsystem: String,

    /// `order_time` bucket upper bounds in seconds, comma separated.
    #[arg(
        long,
        env = "LATENCY_BUCKETS",
        value_delimiter = ',',
        allow_negative_numbers = true,
        default_values_t = DEFAULT_BUCKETS.to_vec()
    )]
    pub latency_buckets: Vec<f64>,

    /// Used when RUST_LOG is not set.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.queue_name.is_empty() {
            bail!("queue name must not be empty");
        }
        if !(1..=MAX_WAIT_SECS).contains(&self.queue_wait_secs) {
            bail!("queue wait must be between 1 and {MAX_WAIT_SECS} seconds");
        }
        if !(1..=MAX_RECEIVE_BATCH).contains(&self.queue_receive_batch) {
            bail!("receive batch must be between 1 and {MAX_RECEIVE_BATCH}");
        }
        if self.correlation_ttl_secs == 0 {
            bail!("correlation ttl must be positive");
        }
        if self.latency_buckets.is_empty() {
            bail!("at least one latency bucket is required");
        }
        if self.latency_buckets.iter().any(|b| !b.is_finite() || *b <= 0.0) {
            bail!("latency buckets must be positive numbers");
        }
        if self.latency_buckets.windows(2).any(|w| w[0] >= w[1]) {
            bail!("latency buckets must be strictly increasing");
        }
        Ok(())
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            name: self.queue_name.clone(),
            wait: Duration::from_secs(self.queue_wait_secs),
            receive_batch: self.queue_receive_batch,
        }
    }

    pub fn correlation_ttl(&self) -> Duration {
        Duration::from_secs(self.correlation_ttl_secs)
    }

    pub fn poll_error_backoff(&self) -> Duration {
        Duration::from_millis(self.poll_error_backoff_ms)
    }
}
