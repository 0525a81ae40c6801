use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use serde_json::Value;
use tower::ServiceExt;

use performance_cell::{performance_routes, CacheService, RateLimitConfig, RateLimiter};
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

fn app(test_config: &TestConfig) -> axum::Router {
    let config = test_config.to_arc();
    let cache = Arc::new(CacheService::in_memory(&config));
    let limiter = Arc::new(RateLimiter::in_memory(RateLimitConfig::default()));
    performance_routes(config, cache, limiter)
}

fn stats_request(token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri("/stats");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn admin_sees_cache_and_rate_limit_stats() {
    let test_config = TestConfig::default();
    let admin = TestUser::admin("admin@example.com");
    let token = JwtTestUtils::create_test_token(&admin, &test_config.jwt_secret, Some(1));

    let response = app(&test_config).oneshot(stats_request(Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["cache_stats"]["redis_enabled"], false);
    assert_eq!(json["rate_limit_stats"]["backend"], "memory");
    assert_eq!(json["rate_limit_stats"]["requests_per_window"], 100);
}

#[tokio::test]
async fn non_admin_is_forbidden() {
    let test_config = TestConfig::default();
    let doctor = TestUser::doctor("doc@example.com");
    let token = JwtTestUtils::create_test_token(&doctor, &test_config.jwt_secret, Some(1));

    let response = app(&test_config).oneshot(stats_request(Some(&token))).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let response = app(&TestConfig::default()).oneshot(stats_request(None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
