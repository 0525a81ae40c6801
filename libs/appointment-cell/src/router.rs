use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::*;

/// Mounted at `/api/appointments`.
pub fn appointment_routes(config: Arc<AppConfig>, state: Arc<AppointmentState>) -> Router {
    Router::new()
        .route("/", post(create_appointment).get(list_appointments))
        .route(
            "/{id}",
            get(get_appointment).put(update_appointment).delete(delete_appointment),
        )
        .route("/{id}/cancel", post(cancel_appointment))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(state)
}

/// Merged into the `/api/patients` router.
pub fn patient_appointment_routes(config: Arc<AppConfig>, state: Arc<AppointmentState>) -> Router {
    Router::new()
        .route("/{id}/appointments", get(list_patient_appointments))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(state)
}

/// Merged into the `/api/doctors` router.
pub fn doctor_appointment_routes(config: Arc<AppConfig>, state: Arc<AppointmentState>) -> Router {
    Router::new()
        .route("/{id}/appointments", get(list_doctor_appointments))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(state)
}
