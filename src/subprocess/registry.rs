//! In-memory registry of in-flight child processes
//!
//! Every spawned process is tracked under a monotonically incrementing key
//! for the duration of its call. Entries are removed by a guard when the call
//! completes, fails, or times out, so the registry never accumulates across
//! sequential calls. [`ProcessRegistry::cancel_all`] cancels every tracked
//! execution at client shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Inner {
    entries: Mutex<HashMap<u64, CancellationToken>>,
    counter: AtomicU64,
}

/// Shared registry of active subprocess executions
#[derive(Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<Inner>,
}

impl ProcessRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new execution. The returned guard deregisters on drop.
    #[must_use]
    pub fn register(&self) -> ProcessGuard {
        let id = self.inner.counter.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.inner.entries.lock().insert(id, token.clone());
        ProcessGuard {
            registry: self.clone(),
            id,
            token,
        }
    }

    /// Number of executions currently tracked
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.entries.lock().len()
    }

    /// Cancel every tracked execution
    pub fn cancel_all(&self) {
        let entries = self.inner.entries.lock();
        if !entries.is_empty() {
            log::info!("Cancelling {} active process(es)", entries.len());
        }
        for token in entries.values() {
            token.cancel();
        }
    }

    /// Cancel everything and wait until the owners have drained, bounded by
    /// `deadline`
    pub async fn shutdown(&self, deadline: Duration) {
        self.cancel_all();
        let poll = Duration::from_millis(50);
        let mut waited = Duration::ZERO;
        while self.active_count() > 0 && waited < deadline {
            tokio::time::sleep(poll).await;
            waited += poll;
        }
        if self.active_count() > 0 {
            log::warn!(
                "{} process(es) still tracked after shutdown wait",
                self.active_count()
            );
        }
    }

    fn deregister(&self, id: u64) {
        self.inner.entries.lock().remove(&id);
    }
}

/// Registry entry handle held for the duration of one execution
pub struct ProcessGuard {
    registry: ProcessRegistry,
    id: u64,
    token: CancellationToken,
}

impl ProcessGuard {
    /// Token cancelled when the registry shuts down
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        self.registry.deregister(self.id);
    }
}
