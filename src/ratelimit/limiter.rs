//! Core token bucket limiter implementation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use futures::future::{ready, Ready};
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::bucket::Bucket;
use super::expiry::{BucketTable, ExpiryScheduler};
use super::namespace::AsNamespace;
use crate::config::LimiterConfig;
use crate::error::{LimiterError, Result};

/// Per-namespace fixed-window token bucket limiter.
///
/// Each namespace gets `threshold` tokens when first touched. The bucket is
/// dropped once the window elapses, and the next touch starts over with a
/// full bucket. Falsy namespaces (see [`AsNamespace`]) are never limited.
///
/// The check-and-update for a namespace runs under that key's shard lock in
/// the bucket table, as does the expiry timer's removal, so the limiter can
/// be shared freely across tasks and threads.
pub struct TokenBucketLimiter {
    /// Maximum tokens per namespace per window
    threshold: u64,
    /// Buckets indexed by namespace
    buckets: Arc<BucketTable>,
    /// Arms the per-epoch expiry timers
    expiry: ExpiryScheduler,
    /// Source of epoch identifiers
    next_epoch: AtomicU64,
}

impl TokenBucketLimiter {
    /// Create a limiter whose expiry timers run on the current tokio runtime.
    ///
    /// Fails with [`LimiterError::NoRuntime`] outside a runtime context.
    pub fn new(config: LimiterConfig) -> Result<Self> {
        let handle = Handle::try_current().map_err(|_| LimiterError::NoRuntime)?;
        Ok(Self::with_handle(config, handle))
    }

    /// Create a limiter whose expiry timers run on `handle`.
    pub fn with_handle(config: LimiterConfig, handle: Handle) -> Self {
        debug!(
            threshold = config.threshold(),
            window = ?config.window(),
            "Creating token bucket limiter"
        );

        Self {
            threshold: config.threshold(),
            buckets: Arc::new(BucketTable::new()),
            expiry: ExpiryScheduler::new(handle, config.window()),
            next_epoch: AtomicU64::new(0),
        }
    }

    /// Take a token for `namespace`.
    ///
    /// Returns `false` if the bucket is empty, in which case nothing changes.
    pub fn consume_sync<K: AsNamespace + ?Sized>(&self, namespace: &K) -> bool {
        self.check(namespace, true)
    }

    /// Check whether `namespace` has a token left, without taking it.
    pub fn has_token_sync<K: AsNamespace + ?Sized>(&self, namespace: &K) -> bool {
        self.check(namespace, false)
    }

    /// Take a token for `namespace`, as an already-completed future.
    ///
    /// Fails with [`LimiterError::Exhausted`] if the bucket is empty. The
    /// decision is made before this returns; awaiting never waits for a
    /// token to become available.
    pub fn consume<K: AsNamespace + ?Sized>(&self, namespace: &K) -> Ready<Result<()>> {
        ready(exhausted_unless(self.consume_sync(namespace)))
    }

    /// Check whether `namespace` has a token left, as an already-completed future.
    pub fn has_token<K: AsNamespace + ?Sized>(&self, namespace: &K) -> Ready<Result<()>> {
        ready(exhausted_unless(self.has_token_sync(namespace)))
    }

    /// Get the tokens left for `namespace` without touching its bucket.
    ///
    /// Returns `None` for namespaces that are not rate limited. Namespaces
    /// without a live bucket report a full bucket.
    pub fn remaining<K: AsNamespace + ?Sized>(&self, namespace: &K) -> Option<u64> {
        let key = namespace.as_namespace()?;
        let now = Instant::now();

        let remaining = self
            .buckets
            .get(key.as_ref())
            .filter(|bucket| !bucket.is_expired(now))
            .map(|bucket| bucket.remaining())
            .unwrap_or(self.threshold);
        Some(remaining)
    }

    /// Get the number of live buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Get the maximum tokens per namespace per window.
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Get the window length.
    pub fn window(&self) -> Duration {
        self.expiry.window()
    }

    fn check<K: AsNamespace + ?Sized>(&self, namespace: &K, consume: bool) -> bool {
        let Some(key) = namespace.as_namespace() else {
            trace!("No namespace, skipping rate limit");
            return true;
        };

        trace!(namespace = %key, consume, "Checking token bucket");
        let now = Instant::now();

        // Live bucket: no key allocation needed.
        if let Some(mut bucket) = self.buckets.get_mut(key.as_ref()) {
            if !bucket.is_expired(now) {
                return self.settle(&key, &mut bucket, consume);
            }
        }

        // First touch, or a bucket whose timer never ran. The entry holds the
        // shard lock, so only one caller can open the new epoch.
        match self.buckets.entry(key.into_owned()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    let bucket = self.open_epoch(occupied.key(), now);
                    occupied.insert(bucket);
                }
                let namespace = occupied.key().clone();
                self.settle(&namespace, occupied.get_mut(), consume)
            }
            Entry::Vacant(vacant) => {
                let bucket = self.open_epoch(vacant.key(), now);
                let namespace = vacant.key().clone();
                let mut bucket = vacant.insert(bucket);
                self.settle(&namespace, &mut bucket, consume)
            }
        }
    }

    /// Start a fresh epoch for `namespace` and arm its expiry timer.
    fn open_epoch(&self, namespace: &str, now: Instant) -> Bucket {
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);

        debug!(
            namespace = %namespace,
            epoch,
            threshold = self.threshold,
            "Creating new token bucket"
        );

        self.expiry
            .schedule(&self.buckets, namespace.to_string(), epoch);
        Bucket::new(self.threshold, epoch, now.checked_add(self.expiry.window()))
    }

    fn settle(&self, namespace: &str, bucket: &mut Bucket, consume: bool) -> bool {
        let allowed = bucket.check(consume);
        if !allowed {
            debug!(
                namespace = %namespace,
                epoch = bucket.epoch(),
                "Token bucket exhausted"
            );
        }
        allowed
    }
}

fn exhausted_unless(allowed: bool) -> Result<()> {
    if allowed {
        Ok(())
    } else {
        Err(LimiterError::Exhausted)
    }
}
