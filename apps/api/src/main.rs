use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use notification_cell::{
    queue_from_config, sender_from_config, NotificationProducer, NotificationWorker, QueueBackend, WorkerConfig,
};
use performance_cell::{CacheService, RateLimiter};
use shared_config::AppConfig;
use shared_database::SupabaseClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Healthcare Management API server");

    let config = Arc::new(AppConfig::from_env());
    let db = Arc::new(SupabaseClient::new(&config));
    let cache = Arc::new(CacheService::from_config(&config).await);
    let limiter = Arc::new(RateLimiter::from_app_config(&config));

    let (queue, backend) = queue_from_config(&config).await;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Without Redis nothing outside this process can drain the queue.
    let embedded_worker = if backend == QueueBackend::InMemory {
        warn!("Running the notification worker in-process");
        let worker = Arc::new(NotificationWorker::new(
            WorkerConfig::from_app_config(&config),
            Arc::clone(&queue),
            sender_from_config(&config),
        ));
        Some(tokio::spawn(worker.run(shutdown_rx)))
    } else {
        None
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(router::AppServices {
        config: Arc::clone(&config),
        db,
        cache,
        limiter,
        notifications: NotificationProducer::new(queue, config.notification_max_attempts),
    })
    .layer(
        TraceLayer::new_for_http()
            .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
            .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
    )
    .layer(cors);

    let addr = config.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = embedded_worker {
        if let Err(e) = handle.await {
            warn!("Embedded notification worker ended abnormally: {}", e);
        }
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
