use std::sync::Arc;

use axum::{extract::State, Extension, Json};
use chrono::Utc;
use tracing::instrument;

use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::extractor::require_role;

use crate::models::PerformanceStats;
use crate::services::{CacheService, RateLimiter};

pub struct PerformanceState {
    pub cache: Arc<CacheService>,
    pub limiter: Arc<RateLimiter>,
}

#[instrument(skip(state, user), fields(user_id = user.id))]
pub async fn get_performance_stats(
    State(state): State<Arc<PerformanceState>>,
    Extension(user): Extension<User>,
) -> Result<Json<PerformanceStats>, AppError> {
    require_role(&user, &[Role::Admin])?;

    Ok(Json(PerformanceStats {
        cache_stats: state.cache.stats().await,
        rate_limit_stats: state.limiter.stats().await,
        generated_at: Utc::now(),
    }))
}
