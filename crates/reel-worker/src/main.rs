//! Composition worker binary.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reel_media::Engine;
use reel_queue::{InMemoryTaskQueue, RedisTaskQueue, TaskQueue};
use reel_worker::{InMemoryTaskStore, JobExecutor, ProcessingContext, QueueBackend, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,reel_media=info,reel_worker=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    info!("Starting reel-worker");
    let config = WorkerConfig::from_env();
    info!(?config, "Worker config");

    if let Some(port) = config.metrics_port {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], port))
            .install()?;
        info!(port, "Serving Prometheus metrics");
    }

    let queue: Arc<dyn TaskQueue> = match config.queue_backend {
        QueueBackend::Redis => Arc::new(RedisTaskQueue::from_env()?),
        QueueBackend::Memory => Arc::new(InMemoryTaskQueue::new()),
    };
    let engine = Engine::with_ffmpeg(config.engine.clone());
    let ctx = ProcessingContext::new(engine, Arc::new(InMemoryTaskStore::new()));
    let executor = Arc::new(JobExecutor::new(config, queue, ctx));

    let signal_executor = Arc::clone(&executor);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        signal_executor.shutdown();
    });

    executor.run().await?;
    info!("Worker shutdown complete");
    Ok(())
}
