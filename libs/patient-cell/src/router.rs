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
use crate::services::PatientService;

pub fn patient_routes(config: Arc<AppConfig>, db: Arc<SupabaseClient>, cache: Arc<CacheService>) -> Router {
    let state = Arc::new(PatientState {
        service: PatientService::new(db, cache),
    });

    Router::new()
        .route("/", post(create_patient).get(list_patients))
        .route("/{id}", get(get_patient).put(update_patient).delete(delete_patient))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(state)
}
