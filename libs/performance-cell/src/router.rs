use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{get_performance_stats, PerformanceState};
use crate::services::{CacheService, RateLimiter};

pub fn performance_routes(
    config: Arc<AppConfig>,
    cache: Arc<CacheService>,
    limiter: Arc<RateLimiter>,
) -> Router {
    let state = Arc::new(PerformanceState { cache, limiter });

    Router::new()
        .route("/stats", get(get_performance_stats))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(state)
}
