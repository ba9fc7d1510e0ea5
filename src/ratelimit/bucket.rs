//! Token bucket state for a single namespace.

use tokio::time::Instant;

/// Remaining tokens for one namespace during one epoch.
///
/// An epoch runs from the bucket's creation until its expiry timer removes
/// it. Buckets never refill partially: they are dropped and recreated full.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    /// Tokens left in this epoch
    remaining: u64,
    /// Epoch this bucket belongs to
    epoch: u64,
    /// When the window ends; `None` if it lies beyond the clock's range
    expires_at: Option<Instant>,
}

impl Bucket {
    /// Create a full bucket.
    pub fn new(threshold: u64, epoch: u64, expires_at: Option<Instant>) -> Self {
        Self {
            remaining: threshold,
            epoch,
            expires_at,
        }
    }

    /// Check for an available token, taking it if `consume` is set.
    ///
    /// Returns `false` when the bucket is empty; an empty bucket is never
    /// modified.
    pub fn check(&mut self, consume: bool) -> bool {
        if self.remaining == 0 {
            return false;
        }

        if consume {
            self.remaining -= 1;
        }
        true
    }

    /// Whether `now` lies past the end of the window.
    ///
    /// Normally the expiry timer removes the bucket first; this catches
    /// buckets whose timer could not run.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now > deadline)
    }

    /// Get the remaining tokens.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Get the epoch this bucket belongs to.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}
