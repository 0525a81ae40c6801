use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use performance_cell::CacheService;
use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_utils::extractor::auth_middleware;

use crate::handlers::*;
use crate::services::DoctorService;

pub fn doctor_routes(config: Arc<AppConfig>, db: Arc<SupabaseClient>, cache: Arc<CacheService>) -> Router {
    let state = Arc::new(DoctorState {
        service: DoctorService::new(db, cache),
    });

    Router::new()
        .route("/", post(create_doctor).get(list_doctors))
        .route("/{id}", get(get_doctor).put(update_doctor).delete(delete_doctor))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(state)
}
