use std::sync::Arc;

use axum::{extract::State, middleware, routing::get, Json, Router};
use serde_json::{json, Value};

use appointment_cell::{appointment_routes, doctor_appointment_routes, patient_appointment_routes, AppointmentState};
use auth_cell::auth_routes;
use doctor_cell::doctor_routes;
use medical_record_cell::medical_record_routes;
use notification_cell::NotificationProducer;
use patient_cell::patient_routes;
use performance_cell::{performance_routes, rate_limit_middleware, CacheService, RateLimiter};
use shared_config::AppConfig;
use shared_database::SupabaseClient;

/// Everything the cell routers share.
pub struct AppServices {
    pub config: Arc<AppConfig>,
    pub db: Arc<SupabaseClient>,
    pub cache: Arc<CacheService>,
    pub limiter: Arc<RateLimiter>,
    pub notifications: NotificationProducer,
}

#[derive(Clone)]
struct HealthState {
    config: Arc<AppConfig>,
    cache: Arc<CacheService>,
}

async fn health(State(state): State<HealthState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "database_configured": state.config.is_configured(),
        "redis_configured": state.cache.is_redis_enabled(),
    }))
}

pub fn create_router(services: AppServices) -> Router {
    let AppServices {
        config,
        db,
        cache,
        limiter,
        notifications,
    } = services;

    let appointments = AppointmentState::new(Arc::clone(&db), Arc::clone(&cache), notifications);

    let api = Router::new()
        .nest("/auth", auth_routes(Arc::clone(&config), Arc::clone(&db)))
        .nest(
            "/patients",
            patient_routes(Arc::clone(&config), Arc::clone(&db), Arc::clone(&cache))
                .merge(patient_appointment_routes(Arc::clone(&config), Arc::clone(&appointments))),
        )
        .nest(
            "/doctors",
            doctor_routes(Arc::clone(&config), Arc::clone(&db), Arc::clone(&cache))
                .merge(doctor_appointment_routes(Arc::clone(&config), Arc::clone(&appointments))),
        )
        .nest("/appointments", appointment_routes(Arc::clone(&config), appointments))
        .nest(
            "/medical-records",
            medical_record_routes(Arc::clone(&config), Arc::clone(&db), Arc::clone(&cache)),
        )
        .nest(
            "/performance",
            performance_routes(Arc::clone(&config), Arc::clone(&cache), Arc::clone(&limiter)),
        );

    Router::new()
        .route("/", get(|| async { "Healthcare Management API is running!" }))
        .route("/health", get(health).with_state(HealthState { config, cache }))
        .nest("/api", api)
        .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use notification_cell::InMemoryNotificationQueue;
    use performance_cell::models::RateLimitConfig;
    use std::time::Duration;
    use tower::ServiceExt;

    fn services(requests: u32) -> AppServices {
        let config = Arc::new(AppConfig::default());
        AppServices {
            db: Arc::new(SupabaseClient::new(&config)),
            cache: Arc::new(CacheService::in_memory(&config)),
            limiter: Arc::new(RateLimiter::in_memory(RateLimitConfig {
                requests_per_window: requests,
                window_duration: Duration::from_secs(60),
            })),
            notifications: NotificationProducer::new(Arc::new(InMemoryNotificationQueue::new()), 3),
            config,
        }
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_reports_configuration() {
        let response = create_router(services(10)).oneshot(get("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database_configured"], false);
        assert_eq!(body["redis_configured"], false);
    }

    #[tokio::test]
    async fn api_routes_require_authentication() {
        let app = create_router(services(10));

        for uri in ["/api/patients", "/api/doctors/1", "/api/appointments", "/api/medical-records"] {
            let response = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }

    #[tokio::test]
    async fn requests_over_the_limit_are_rejected() {
        let app = create_router(services(2));

        for _ in 0..2 {
            let response = app.clone().oneshot(get("/")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
