//! Per-repository readers/writer locking
//!
//! Destructive operations (init, prune, forget) take an exclusive hold on a
//! repository name; read/write operations (connect, unlock, backup, restore)
//! take a shared hold. Different names never contend with each other.
//!
//! Entries are created lazily on first use and never removed. The registry
//! map is synchronized independently of the locks it stores, so looking up a
//! lock never waits on another repository's holders.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::trace;

use crate::operation::LockMode;

/// Registry of per-repository locks, keyed by repository name
#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: DashMap<String, Arc<RwLock<()>>>,
}

#[derive(Debug)]
enum HeldLock {
    Shared(#[allow(dead_code)] OwnedRwLockReadGuard<()>),
    Exclusive(#[allow(dead_code)] OwnedRwLockWriteGuard<()>),
}

/// A held repository lock; released when dropped
#[derive(Debug)]
#[must_use = "the repository lock is released as soon as the guard is dropped"]
pub struct RepoLockGuard {
    name: String,
    held: HeldLock,
}

impl RepoLockGuard {
    /// Repository name the lock belongs to
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mode the lock is held in
    pub fn mode(&self) -> LockMode {
        match self.held {
            HeldLock::Shared(_) => LockMode::Shared,
            HeldLock::Exclusive(_) => LockMode::Exclusive,
        }
    }
}

impl Drop for RepoLockGuard {
    fn drop(&mut self) {
        trace!(repository = %self.name, mode = ?self.mode(), "releasing repository lock");
    }
}

impl LockRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire a shared hold on `name`
    pub async fn lock(&self, name: &str) -> RepoLockGuard {
        let guard = self.entry(name).read_owned().await;
        trace!(repository = %name, "acquired shared repository lock");
        RepoLockGuard {
            name: name.to_string(),
            held: HeldLock::Shared(guard),
        }
    }

    /// Acquire an exclusive hold on `name`
    pub async fn lock_exclusive(&self, name: &str) -> RepoLockGuard {
        let guard = self.entry(name).write_owned().await;
        trace!(repository = %name, "acquired exclusive repository lock");
        RepoLockGuard {
            name: name.to_string(),
            held: HeldLock::Exclusive(guard),
        }
    }

    /// Acquire `name` in the given mode
    pub async fn acquire(&self, name: &str, mode: LockMode) -> RepoLockGuard {
        match mode {
            LockMode::Shared => self.lock(name).await,
            LockMode::Exclusive => self.lock_exclusive(name).await,
        }
    }

    /// Number of distinct repository names seen so far
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// True if no lock has been requested yet
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    fn entry(&self, name: &str) -> Arc<RwLock<()>> {
        if let Some(existing) = self.locks.get(name) {
            return Arc::clone(existing.value());
        }
        let entry = self
            .locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())));
        Arc::clone(entry.value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Barrier;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);
    const SETTLE: Duration = Duration::from_millis(50);

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn exclusive_holders_never_overlap() {
        let registry = Arc::new(LockRegistry::new());
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let active = active.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = registry.lock_exclusive("repo-a").await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shared_holders_run_concurrently() {
        let registry = Arc::new(LockRegistry::new());
        let barrier = Arc::new(Barrier::new(4));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let registry = registry.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                let _guard = registry.lock("repo-a").await;
                // Every holder must reach the barrier while still holding the lock
                barrier.wait().await;
            }));
        }

        for h in handles {
            timeout(WAIT, h)
                .await
                .expect("shared holders should not block each other")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn exclusive_waits_for_shared_holders() {
        let registry = Arc::new(LockRegistry::new());
        let acquired = Arc::new(AtomicBool::new(false));

        let reader = registry.lock("repo-a").await;

        let writer = {
            let registry = registry.clone();
            let acquired = acquired.clone();
            tokio::spawn(async move {
                let _guard = registry.lock_exclusive("repo-a").await;
                acquired.store(true, Ordering::SeqCst);
            })
        };

        tokio::time::sleep(SETTLE).await;
        assert!(!acquired.load(Ordering::SeqCst));

        drop(reader);
        timeout(WAIT, writer).await.unwrap().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn shared_waits_for_exclusive_holder() {
        let registry = Arc::new(LockRegistry::new());
        let acquired = Arc::new(AtomicBool::new(false));

        let writer = registry.lock_exclusive("repo-a").await;

        let reader = {
            let registry = registry.clone();
            let acquired = acquired.clone();
            tokio::spawn(async move {
                let _guard = registry.lock("repo-a").await;
                acquired.store(true, Ordering::SeqCst);
            })
        };

        tokio::time::sleep(SETTLE).await;
        assert!(!acquired.load(Ordering::SeqCst));

        drop(writer);
        timeout(WAIT, reader).await.unwrap().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn different_names_are_independent() {
        let registry = LockRegistry::new();
        let _a = registry.lock_exclusive("repo-a").await;

        let b = timeout(WAIT, registry.lock_exclusive("repo-b"))
            .await
            .expect("repo-b must not wait on repo-a");
        drop(b);
        let _b_shared = timeout(WAIT, registry.lock("repo-b")).await.unwrap();
    }

    #[tokio::test]
    async fn entries_are_created_once_per_name() {
        let registry = LockRegistry::new();
        assert!(registry.is_empty());

        drop(registry.lock("repo-a").await);
        drop(registry.lock_exclusive("repo-a").await);
        drop(registry.acquire("repo-b", LockMode::Shared).await);

        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn guard_reports_mode_and_name() {
        let registry = LockRegistry::new();
        let guard = registry.acquire("repo-a", LockMode::Exclusive).await;
        assert_eq!(guard.name(), "repo-a");
        assert_eq!(guard.mode(), LockMode::Exclusive);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_use_creates_one_entry() {
        let registry = Arc::new(LockRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                drop(registry.lock("fresh").await);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(registry.len(), 1);
    }
}
