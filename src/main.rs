use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use order_pipeline::config::{Backend, Config};
use order_pipeline::metrics::OrderMetrics;
use order_pipeline::queue::{MemoryQueue, QueueConsumer, QueuePublisher, RedisQueue};
use order_pipeline::store::{CorrelationStore, MemoryCorrelationStore, RedisCorrelationStore};
use order_pipeline::submission::SubmissionHandler;
use order_pipeline::worker::{WorkerContext, WorkerPool};
use order_pipeline::{redis_client, server, AppState};

/// Queue and store clients for the selected backend.
struct Backends {
    publisher: Arc<dyn QueuePublisher>,
    consumers: Vec<Arc<dyn QueueConsumer>>,
    store: Arc<dyn CorrelationStore>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    setup_tracing(&config.log_level);
    config.validate().context("invalid configuration")?;

    info!(
        backend = ?config.backend,
        queue = %config.queue_name,
        workers = config.workers,
        ttl_secs = config.correlation_ttl_secs,
        "starting order pipeline"
    );

    // ── 1. Queue + correlation store ─────────────────────────────
    let backends = build_backends(&config).await?;

    // ── 2. Metrics ───────────────────────────────────────────────
    let metrics = Arc::new(OrderMetrics::new(
        &config.metrics_namespace,
        &config.metrics_subsystem,
        &config.latency_buckets,
    ));

    // ── 3. Consumption workers ───────────────────────────────────
    let pool = WorkerPool::spawn(
        backends.consumers,
        WorkerContext {
            store: backends.store.clone(),
            sink: metrics.clone(),
            poll_error_backoff: config.poll_error_backoff(),
        },
    );

    // ── 4. HTTP API ──────────────────────────────────────────────
    let state = Arc::new(AppState {
        submissions: SubmissionHandler::new(
            backends.publisher,
            backends.store,
            metrics.clone(),
            config.correlation_ttl(),
        ),
        metrics,
        workers: pool.size(),
    });
    let app = server::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.http_addr))?;
    info!(addr = %config.http_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited with error")?;

    // ── 5. Drain ─────────────────────────────────────────────────
    // Workers finish the receive they are in, so this can take up to one
    // long-poll interval.
    info!("shutting down workers");
    pool.shutdown().await;
    info!("order pipeline stopped");
    Ok(())
}

async fn build_backends(config: &Config) -> Result<Backends> {
    let settings = config.queue_settings();

    match config.backend {
        Backend::Redis => {
            let (client, conn) = redis_client::connect(&config.redis_url)
                .await
                .context("cannot connect to redis")?;

            let queue = RedisQueue::new(conn.clone(), settings);
            queue.provision().await.context("failed to provision queue")?;

            let mut consumers: Vec<Arc<dyn QueueConsumer>> = Vec::with_capacity(config.workers);
            for _ in 0..config.workers {
                let dedicated = queue
                    .dedicated(&client)
                    .await
                    .context("failed to open worker connection")?;
                consumers.push(Arc::new(dedicated));
            }

            Ok(Backends {
                publisher: Arc::new(queue),
                consumers,
                store: Arc::new(RedisCorrelationStore::new(conn)),
            })
        }
        Backend::Memory => {
            let queue = Arc::new(MemoryQueue::new(settings));
            let consumers = (0..config.workers)
                .map(|_| queue.clone() as Arc<dyn QueueConsumer>)
                .collect();

            Ok(Backends {
                publisher: queue,
                consumers,
                store: Arc::new(MemoryCorrelationStore::new()),
            })
        }
    }
}

fn setup_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
