use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub jwt_secret: String,
    pub jwt_expiry_minutes: i64,
    pub redis_url: Option<String>,
    pub server_host: String,
    pub server_port: u16,
    pub cache_ttl_seconds: u64,
    pub cache_max_entries: usize,
    pub rate_limit_requests: u32,
    pub rate_limit_window_seconds: u64,
    pub notification_webhook_url: Option<String>,
    pub notification_max_attempts: u32,
    pub notification_workers: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_service_key: String::new(),
            jwt_secret: String::new(),
            jwt_expiry_minutes: 60,
            redis_url: None,
            server_host: "0.0.0.0".to_string(),
            server_port: 3000,
            cache_ttl_seconds: 300,
            cache_max_entries: 10_000,
            rate_limit_requests: 100,
            rate_limit_window_seconds: 60,
            notification_webhook_url: None,
            notification_max_attempts: 3,
            notification_workers: 2,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_service_key: env::var("SUPABASE_SERVICE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_KEY not set, using empty value");
                    String::new()
                }),
            jwt_secret: env::var("JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("JWT_SECRET not set, using empty value");
                    String::new()
                }),
            jwt_expiry_minutes: parse_or("JWT_EXPIRY_MINUTES", defaults.jwt_expiry_minutes),
            redis_url: optional("REDIS_URL"),
            server_host: env::var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parse_or("SERVER_PORT", defaults.server_port),
            cache_ttl_seconds: parse_or("CACHE_TTL_SECONDS", defaults.cache_ttl_seconds),
            cache_max_entries: parse_or("CACHE_MAX_ENTRIES", defaults.cache_max_entries),
            rate_limit_requests: parse_or("RATE_LIMIT_REQUESTS", defaults.rate_limit_requests),
            rate_limit_window_seconds: parse_or(
                "RATE_LIMIT_WINDOW_SECONDS",
                defaults.rate_limit_window_seconds,
            ),
            notification_webhook_url: optional("NOTIFICATION_WEBHOOK_URL"),
            notification_max_attempts: parse_or(
                "NOTIFICATION_MAX_ATTEMPTS",
                defaults.notification_max_attempts,
            ),
            notification_workers: parse_or("NOTIFICATION_WORKERS", defaults.notification_workers),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        if !config.is_redis_configured() {
            warn!("REDIS_URL not set, cache and notification queue will run in-process only");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_service_key.is_empty()
            && !self.jwt_secret.is_empty()
    }

    pub fn is_redis_configured(&self) -> bool {
        self.redis_url.as_deref().is_some_and(|url| !url.is_empty())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
