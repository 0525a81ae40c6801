use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_database::SupabaseClient;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AuthState};
use crate::services::AuthService;

pub fn auth_routes(config: Arc<AppConfig>, db: Arc<SupabaseClient>) -> Router {
    let state = Arc::new(AuthState {
        config: config.clone(),
        service: AuthService::new(config.clone(), db),
    });

    let public_routes = Router::new()
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/validate", post(handlers::validate_token))
        .route("/verify", post(handlers::verify_token));

    let protected_routes = Router::new()
        .route("/me", get(handlers::get_me))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
