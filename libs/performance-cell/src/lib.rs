// =====================================================================================
// PERFORMANCE CELL - CACHING & RATE LIMITING
// =====================================================================================

pub mod models;
pub mod handlers;
pub mod router;
pub mod services;

pub use models::*;
pub use router::performance_routes;
pub use services::{cache_key, rate_limit_middleware, CacheService, RateLimiter};
