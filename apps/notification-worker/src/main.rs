use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notification_cell::{queue_from_config, sender_from_config, NotificationWorker, QueueBackend, WorkerConfig};
use shared_config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();

    let (queue, backend) = queue_from_config(&config).await;
    if backend != QueueBackend::Redis {
        anyhow::bail!("REDIS_URL must point at a reachable Redis server to run a standalone notification worker");
    }

    let worker_config = WorkerConfig::from_app_config(&config);

    info!(
        "Notification worker {} starting with {} loops",
        worker_config.worker_id, worker_config.concurrency
    );

    let worker = Arc::new(NotificationWorker::new(worker_config, queue, sender_from_config(&config)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let running = tokio::spawn(worker.run(shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown requested, finishing in-flight notifications");

    shutdown_tx.send(true)?;
    running.await?;

    info!("Notification worker exited");
    Ok(())
}
