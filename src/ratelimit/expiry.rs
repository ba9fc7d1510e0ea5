//! Timer-driven bucket expiry.

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::bucket::Bucket;

/// Bucket table shared between a limiter and its expiry timers.
pub type BucketTable = DashMap<String, Bucket>;

/// Arms one-shot timers that drop buckets at the end of their window.
#[derive(Debug, Clone)]
pub struct ExpiryScheduler {
    /// Runtime the timers are spawned on
    handle: Handle,
    /// Window length fixed at construction
    window: Duration,
}

impl ExpiryScheduler {
    /// Create a scheduler spawning timers on `handle`.
    pub fn new(handle: Handle, window: Duration) -> Self {
        Self { handle, window }
    }

    /// Get the window length timers are armed for.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Arm the expiry timer for `namespace` during `epoch`.
    ///
    /// When it fires, the entry is removed only if it still belongs to
    /// `epoch`. The timer holds a weak reference, so it does not keep a
    /// dropped limiter's table alive.
    pub fn schedule(
        &self,
        table: &Arc<BucketTable>,
        namespace: String,
        epoch: u64,
    ) -> JoinHandle<()> {
        let table: Weak<BucketTable> = Arc::downgrade(table);
        let window = self.window;

        trace!(namespace = %namespace, epoch, ?window, "Scheduling bucket expiry");

        self.handle.spawn(async move {
            tokio::time::sleep(window).await;

            let Some(table) = table.upgrade() else {
                return;
            };

            if table
                .remove_if(&namespace, |_, bucket| bucket.epoch() == epoch)
                .is_some()
            {
                debug!(namespace = %namespace, epoch, "Bucket expired");
            } else {
                trace!(namespace = %namespace, epoch, "Bucket already replaced, skipping expiry");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(namespace: &str, epoch: u64) -> Arc<BucketTable> {
        let table = Arc::new(BucketTable::new());
        table.insert(namespace.to_string(), Bucket::new(1, epoch, None));
        table
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_removes_bucket() {
        let table = table_with("x", 1);
        let scheduler = ExpiryScheduler::new(Handle::current(), Duration::from_secs(10));

        let timer = scheduler.schedule(&table, "x".to_string(), 1);

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(table.contains_key("x"));

        timer.await.unwrap();
        assert!(!table.contains_key("x"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_skips_newer_epoch() {
        let table = table_with("x", 2);
        let scheduler = ExpiryScheduler::new(Handle::current(), Duration::from_secs(1));

        scheduler.schedule(&table, "x".to_string(), 1).await.unwrap();

        assert_eq!(table.get("x").map(|b| b.epoch()), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_after_table_dropped() {
        let table = table_with("x", 1);
        let scheduler = ExpiryScheduler::new(Handle::current(), Duration::from_secs(1));

        let timer = scheduler.schedule(&table, "x".to_string(), 1);
        drop(table);

        // The timer must finish quietly without the table.
        timer.await.unwrap();
    }
}
