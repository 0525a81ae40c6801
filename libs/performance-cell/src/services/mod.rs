pub mod cache;
pub mod rate_limiter;

pub use cache::{cache_key, CacheService, MemoryCache};
pub use rate_limiter::{client_identity, rate_limit_middleware, RateLimiter};
