//! Notsofast - per-namespace token bucket rate limiting
//!
//! This crate implements an in-process rate limiter. Each namespace (a client
//! id, an address, ...) gets a fixed number of tokens per window; once they
//! are used up, calls are denied until the window elapses and the bucket is
//! reset to full. Resets are driven by tokio timers, one per bucket.
//!
//! ```no_run
//! use notsofast::{LimiterConfig, TokenBucketLimiter};
//!
//! # async fn run() -> notsofast::Result<()> {
//! let limiter = TokenBucketLimiter::new(LimiterConfig::new(3, 10.0)?)?;
//!
//! assert!(limiter.consume_sync("127.0.0.1"));
//! limiter.consume("127.0.0.1").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod ratelimit;

pub use crate::config::LimiterConfig;
pub use crate::error::{LimiterError, Result};
pub use crate::ratelimit::{AsNamespace, TokenBucketLimiter};
