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
use crate::services::MedicalRecordService;

pub fn medical_record_routes(config: Arc<AppConfig>, db: Arc<SupabaseClient>, cache: Arc<CacheService>) -> Router {
    let state = Arc::new(MedicalRecordState {
        service: MedicalRecordService::new(db, cache),
    });

    Router::new()
        .route("/", post(create_record).get(list_records))
        .route("/{id}", get(get_record).put(update_record).delete(delete_record))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(state)
}
