use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use deadpool_redis::{Config, Pool, Runtime};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use shared_config::AppConfig;
use shared_models::error::AppError;
use shared_utils::jwt::validate_token;

use crate::models::{CacheError, RateLimitConfig, RateLimitError, RateLimitStats};

const REDIS_KEY_PREFIX: &str = "rate_limit:";
const PRUNE_THRESHOLD: usize = 10_000;

enum Backend {
    Memory(Mutex<HashMap<String, VecDeque<Instant>>>),
    Redis(Pool),
}

/// Per-client request limiter. In memory it keeps a sliding window of request
/// instants; with Redis it counts fixed windows shared by every API process.
pub struct RateLimiter {
    config: RateLimitConfig,
    backend: Backend,
    rejected: AtomicU64,
    jwt_secret: Option<String>,
}

impl RateLimiter {
    pub fn in_memory(config: RateLimitConfig) -> Self {
        Self {
            config,
            backend: Backend::Memory(Mutex::new(HashMap::new())),
            rejected: AtomicU64::new(0),
            jwt_secret: None,
        }
    }

    /// Lets requests carrying a token signed with `secret` share one window
    /// per user instead of one per address.
    pub fn with_jwt_secret(mut self, secret: &str) -> Self {
        self.jwt_secret = Some(secret.to_string()).filter(|secret| !secret.is_empty());
        self
    }

    pub fn from_app_config(app_config: &AppConfig) -> Self {
        let config = RateLimitConfig {
            requests_per_window: app_config.rate_limit_requests.max(1),
            window_duration: Duration::from_secs(app_config.rate_limit_window_seconds.max(1)),
        };

        if let Some(url) = app_config.redis_url.as_deref().filter(|url| !url.is_empty()) {
            match Config::from_url(url).create_pool(Some(Runtime::Tokio1)) {
                Ok(pool) => {
                    info!("Rate limiter using Redis fixed windows");
                    return Self {
                        config,
                        backend: Backend::Redis(pool),
                        rejected: AtomicU64::new(0),
                        jwt_secret: None,
                    }
                    .with_jwt_secret(&app_config.jwt_secret);
                }
                Err(e) => warn!("Could not create Redis pool for rate limiter: {}", e),
            }
        }

        Self::in_memory(config).with_jwt_secret(&app_config.jwt_secret)
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Records one request for `identifier`. Returns the number of requests
    /// still allowed in the current window.
    #[instrument(skip(self))]
    pub async fn check(&self, identifier: &str) -> Result<u32, RateLimitError> {
        let result = match &self.backend {
            Backend::Memory(windows) => self.check_memory(windows, identifier).await,
            Backend::Redis(pool) => match self.check_redis(pool, identifier).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Rate limiter backend error, allowing request: {}", e);
                    Ok(self.config.requests_per_window)
                }
            },
        };

        if result.is_err() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            debug!("Rate limit exceeded for {}", identifier);
        }

        result
    }

    async fn check_memory(
        &self,
        windows: &Mutex<HashMap<String, VecDeque<Instant>>>,
        identifier: &str,
    ) -> Result<u32, RateLimitError> {
        let now = Instant::now();
        let window = self.config.window_duration;
        let limit = self.config.requests_per_window as usize;

        let mut windows = windows.lock().await;

        if windows.len() > PRUNE_THRESHOLD {
            windows.retain(|_, requests| {
                requests
                    .back()
                    .is_some_and(|last| now.duration_since(*last) < window)
            });
        }

        let requests = windows.entry(identifier.to_string()).or_default();

        while let Some(oldest) = requests.front() {
            if now.duration_since(*oldest) >= window {
                requests.pop_front();
            } else {
                break;
            }
        }

        if requests.len() >= limit {
            let retry_after = requests
                .front()
                .map(|oldest| window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(window);
            return Err(RateLimitError::LimitExceeded {
                retry_after: retry_after.max(Duration::from_secs(1)),
            });
        }

        requests.push_back(now);
        Ok((limit - requests.len()) as u32)
    }

    async fn check_redis(
        &self,
        pool: &Pool,
        identifier: &str,
    ) -> Result<Result<u32, RateLimitError>, CacheError> {
        let window_secs = self.config.window_duration.as_secs().max(1);
        let now_secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let window_index = now_secs / window_secs;
        let key = format!("{}{}:{}", REDIS_KEY_PREFIX, identifier, window_index);

        let mut conn = pool.get().await.map_err(|e| CacheError::Pool(e.to_string()))?;

        let count: u64 = redis::cmd("INCR").arg(&key).query_async(&mut conn).await?;
        if count == 1 {
            let _: i64 = redis::cmd("EXPIRE")
                .arg(&key)
                .arg(window_secs)
                .query_async(&mut conn)
                .await?;
        }

        let limit = self.config.requests_per_window as u64;
        if count > limit {
            let retry_after = window_secs - (now_secs % window_secs);
            return Ok(Err(RateLimitError::LimitExceeded {
                retry_after: Duration::from_secs(retry_after.max(1)),
            }));
        }

        Ok(Ok((limit - count) as u32))
    }

    pub async fn stats(&self) -> RateLimitStats {
        let (backend, tracked_clients) = match &self.backend {
            Backend::Memory(windows) => ("memory".to_string(), windows.lock().await.len()),
            Backend::Redis(_) => ("redis".to_string(), 0),
        };

        RateLimitStats {
            requests_per_window: self.config.requests_per_window,
            window_seconds: self.config.window_duration.as_secs(),
            backend,
            tracked_clients,
            rejected_requests: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Derives the rate-limit identity of a request. Only a token that validates
/// against `jwt_secret` keys the window by user; anything else falls back to
/// the forwarded address so made-up tokens cannot mint fresh windows.
pub fn client_identity<B>(request: &Request<B>, jwt_secret: Option<&str>) -> String {
    let headers = request.headers();

    let user = jwt_secret.and_then(|secret| {
        headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .and_then(|token| validate_token(token.trim(), secret).ok())
    });
    if let Some(user) = user {
        return format!("user:{}", user.id);
    }

    if let Some(ip) = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return format!("ip:{}", ip);
    }

    "anonymous".to_string()
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let identity = client_identity(&request, limiter.jwt_secret.as_deref());

    let remaining = limiter
        .check(&identity)
        .await
        .map_err(|RateLimitError::LimitExceeded { retry_after }| AppError::RateLimited {
            retry_after_secs: retry_after.as_secs().max(1),
        })?;

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
        response.headers_mut().insert("x-ratelimit-remaining", value);
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::{http::StatusCode, middleware, routing::get, Router};
    use shared_models::auth::Role;
    use shared_utils::test_utils::{JwtTestUtils, TestUser};
    use tower::ServiceExt;

    fn limiter(requests: u32, window: Duration) -> RateLimiter {
        RateLimiter::in_memory(RateLimitConfig {
            requests_per_window: requests,
            window_duration: window,
        })
    }

    #[tokio::test]
    async fn test_allows_up_to_limit_then_rejects() {
        let limiter = limiter(3, Duration::from_secs(60));

        assert_eq!(limiter.check("client").await.unwrap(), 2);
        assert_eq!(limiter.check("client").await.unwrap(), 1);
        assert_eq!(limiter.check("client").await.unwrap(), 0);
        assert_matches!(
            limiter.check("client").await,
            Err(RateLimitError::LimitExceeded { retry_after }) if retry_after >= Duration::from_secs(1)
        );

        let stats = limiter.stats().await;
        assert_eq!(stats.rejected_requests, 1);
        assert_eq!(stats.tracked_clients, 1);
        assert_eq!(stats.backend, "memory");
    }

    #[tokio::test]
    async fn test_clients_are_isolated() {
        let limiter = limiter(1, Duration::from_secs(60));

        assert!(limiter.check("a").await.is_ok());
        assert!(limiter.check("a").await.is_err());
        assert!(limiter.check("b").await.is_ok());
    }

    #[tokio::test]
    async fn test_window_slides() {
        let limiter = limiter(1, Duration::from_millis(30));

        assert!(limiter.check("a").await.is_ok());
        assert!(limiter.check("a").await.is_err());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(limiter.check("a").await.is_ok());
    }

    #[test]
    fn test_client_identity_sources() {
        let secret = "identity-secret";
        let user = TestUser::with_id(42, "p@example.com", Role::Patient);
        let token = JwtTestUtils::create_test_token(&user, secret, Some(1));

        let with_token = Request::builder()
            .header("Authorization", format!("Bearer {}", token))
            .header("X-Forwarded-For", "203.0.113.9")
            .body(())
            .unwrap();
        assert_eq!(client_identity(&with_token, Some(secret)), "user:42");
        assert_eq!(client_identity(&with_token, None), "ip:203.0.113.9");

        let made_up = Request::builder()
            .header("Authorization", "Bearer not-a-jwt")
            .header("X-Forwarded-For", "203.0.113.9, 10.0.0.1")
            .body(())
            .unwrap();
        assert_eq!(client_identity(&made_up, Some(secret)), "ip:203.0.113.9");

        let anonymous = Request::builder().body(()).unwrap();
        assert_eq!(client_identity(&anonymous, Some(secret)), "anonymous");
    }

    #[tokio::test]
    async fn test_made_up_tokens_share_the_address_window() {
        let limiter = Arc::new(limiter(1, Duration::from_secs(60)).with_jwt_secret("identity-secret"));
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(limiter.clone(), rate_limit_middleware));

        let mut allowed = 0;
        for i in 0..20 {
            let request = Request::builder()
                .uri("/")
                .header("Authorization", format!("Bearer made-up-{}", i))
                .header("X-Forwarded-For", "198.51.100.7")
                .body(Body::empty())
                .unwrap();
            if app.clone().oneshot(request).await.unwrap().status() == StatusCode::OK {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 1);
        assert_eq!(limiter.stats().await.tracked_clients, 1);
    }

    #[tokio::test]
    async fn test_valid_tokens_get_their_own_window() {
        let secret = "identity-secret";
        let limiter = Arc::new(limiter(1, Duration::from_secs(60)).with_jwt_secret(secret));
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));

        for id in [1, 2] {
            let user = TestUser::with_id(id, "u@example.com", Role::Patient);
            let token = JwtTestUtils::create_test_token(&user, secret, Some(1));
            let request = Request::builder()
                .uri("/")
                .header("Authorization", format!("Bearer {}", token))
                .header("X-Forwarded-For", "198.51.100.7")
                .body(Body::empty())
                .unwrap();
            assert_eq!(app.clone().oneshot(request).await.unwrap().status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_middleware_returns_429_with_retry_after() {
        let limiter = Arc::new(limiter(1, Duration::from_secs(60)));
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));

        let first = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.headers().get("x-ratelimit-remaining").unwrap(), "0");

        let second = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().get("retry-after").is_some());
    }
}
