//! Shared HTTP plumbing for provider adapters
//!
//! Retry policy, per-provider rate limiting and status classification.

pub mod client;
pub mod rate_limiter;
pub mod retry;

pub use client::{classify_status, ClientConfig, Endpoint, Envelope, Params, RateLimitedClient};
pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;
