//! Per-conversation execution locks
//!
//! One async mutex per conversation key, created on first use and removed
//! again once nobody holds it or waits for it. Both the holder's guard and
//! a waiter that gives up (timeout, abort, dropped request) prune the entry.

use crate::storage::ConversationKey;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OwnedMutexGuard;

type LockTable = HashMap<ConversationKey, Arc<tokio::sync::Mutex<()>>>;
type PendingLock = Pin<Box<dyn Future<Output = OwnedMutexGuard<()>> + Send>>;

#[derive(Default)]
pub struct ConversationLocks {
    table: Arc<Mutex<LockTable>>,
}

/// Held for the duration of one dispatch
pub struct ConversationGuard {
    key: ConversationKey,
    table: Arc<Mutex<LockTable>>,
    guard: Option<OwnedMutexGuard<()>>,
}

/// An `acquire` still queued on the mutex
struct Waiter {
    key: ConversationKey,
    table: Arc<Mutex<LockTable>>,
    pending: Option<PendingLock>,
}

fn lock_table(table: &Mutex<LockTable>) -> MutexGuard<'_, LockTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drop `key`'s entry if the table holds the only reference to its mutex
fn prune(table: &Mutex<LockTable>, key: &ConversationKey) {
    let mut table = lock_table(table);
    if table
        .get(key)
        .is_some_and(|lock| Arc::strong_count(lock) == 1)
    {
        table.remove(key);
    }
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &ConversationKey) -> ConversationGuard {
        let lock = {
            let mut table = lock_table(&self.table);
            Arc::clone(table.entry(key.clone()).or_default())
        };
        let mut waiter = Waiter {
            key: key.clone(),
            table: Arc::clone(&self.table),
            pending: None,
        };
        let pending = waiter.pending.insert(Box::pin(lock.lock_owned()));
        let guard = pending.await;
        ConversationGuard {
            key: key.clone(),
            table: Arc::clone(&self.table),
            guard: Some(guard),
        }
    }

    /// Acquire several keys in sorted order so overlapping sets never deadlock
    pub async fn acquire_all(
        &self,
        keys: impl IntoIterator<Item = ConversationKey>,
    ) -> Vec<ConversationGuard> {
        let mut keys: Vec<_> = keys.into_iter().collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            guards.push(self.acquire(key).await);
        }
        guards
    }

    /// Number of live lock entries
    pub fn len(&self) -> usize {
        lock_table(&self.table).len()
    }

    #[allow(dead_code)] // API completeness
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ConversationGuard {
    fn drop(&mut self) {
        // Release first so our own reference no longer counts.
        drop(self.guard.take());
        prune(&self.table, &self.key);
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        // A finished wait moved its reference into the guard, so this only
        // removes the entry when the wait was abandoned and nobody else is left.
        drop(self.pending.take());
        prune(&self.table, &self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_entry_removed_after_release() {
        let locks = ConversationLocks::new();
        let key = ConversationKey::user("u1");

        let guard = locks.acquire(&key).await;
        assert_eq!(locks.len(), 1);
        drop(guard);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_waiter_keeps_entry_alive() {
        let locks = Arc::new(ConversationLocks::new());
        let key = ConversationKey::user("u1");

        let first = locks.acquire(&key).await;
        let waiter = {
            let locks = Arc::clone(&locks);
            let key = key.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&key).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);
        assert_eq!(locks.len(), 1);

        waiter.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_aborted_waiter_does_not_leak_entry() {
        let locks = Arc::new(ConversationLocks::new());
        let key = ConversationKey::user("u1");

        let first = locks.acquire(&key).await;
        let waiter = {
            let locks = Arc::clone(&locks);
            let key = key.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&key).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);
        waiter.abort();
        let _ = waiter.await;

        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_timed_out_waiter_does_not_leak_entry() {
        let locks = ConversationLocks::new();
        let key = ConversationKey::user("u1");

        let held = locks.acquire(&key).await;
        let late = tokio::time::timeout(Duration::from_millis(20), locks.acquire(&key)).await;
        assert!(late.is_err());
        assert_eq!(locks.len(), 1);

        drop(held);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_key_sets_do_not_deadlock() {
        let locks = Arc::new(ConversationLocks::new());
        let user = ConversationKey::user("u1");
        let channel = ConversationKey::chat("c1");

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let locks = Arc::clone(&locks);
                let keys = if i % 2 == 0 {
                    vec![user.clone(), channel.clone()]
                } else {
                    vec![channel.clone(), user.clone()]
                };
                tokio::spawn(async move {
                    let _guards = locks.acquire_all(keys).await;
                    tokio::time::sleep(Duration::from_millis(5)).await;
                })
            })
            .collect();

        let all = tokio::time::timeout(Duration::from_secs(2), futures::future::join_all(tasks))
            .await
            .expect("overlapping acquisitions deadlocked");
        assert!(all.into_iter().all(|joined| joined.is_ok()));
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_same_key_is_exclusive_other_keys_are_not() {
        let locks = ConversationLocks::new();
        let a = ConversationKey::user("a");
        let b = ConversationKey::user("b");

        let _held = locks.acquire(&a).await;

        let other = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&b)).await;
        assert!(other.is_ok());

        let same = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&a)).await;
        assert!(same.is_err());
    }

    #[tokio::test]
    async fn test_acquire_all_dedups() {
        let locks = ConversationLocks::new();
        let key = ConversationKey::user("u1");
        let guards = locks
            .acquire_all([key.clone(), ConversationKey::chat("c1"), key])
            .await;
        assert_eq!(guards.len(), 2);
        assert_eq!(locks.len(), 2);
    }
}
