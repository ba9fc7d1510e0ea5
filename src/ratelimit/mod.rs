//! Token bucket rate limiting and bucket state management.

mod bucket;
mod expiry;
mod limiter;
mod namespace;

pub use limiter::TokenBucketLimiter;
pub use namespace::AsNamespace;
