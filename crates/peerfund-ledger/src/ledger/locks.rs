//! Keyed mutual exclusion
//!
//! Operations that read and then write a record's balances hold that
//! record's lock for their whole duration. The engine keeps one registry for
//! loans and one for users; locks for different ids never contend.
//!
//! A registry entry lives only while someone holds or waits on it, so the
//! map stays proportional to in-flight work rather than to every id ever
//! locked.

use dashmap::DashMap;
use peerfund_common::{PeerfundError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

type LockMap = DashMap<Uuid, Arc<Mutex<()>>>;

/// Registry of one async mutex per id
pub struct LockRegistry {
    locks: Arc<LockMap>,
    timeout: Duration,
}

/// Exclusive access to one id; released on drop
#[derive(Debug)]
pub struct LockGuard {
    id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Only the map's own handle left: nobody holds or waits on this id
        self.locks
            .remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl LockRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            timeout,
        }
    }

    /// Wait for exclusive access to `id`
    ///
    /// Fails with `Concurrency` if the lock is not obtained within the
    /// configured timeout.
    pub async fn acquire(&self, id: Uuid) -> Result<LockGuard> {
        let lock = Arc::clone(&*self.locks.entry(id).or_default());

        match tokio::time::timeout(self.timeout, lock.lock_owned()).await {
            Ok(guard) => {
                debug!(%id, "Acquired lock");
                Ok(LockGuard {
                    id,
                    guard: Some(guard),
                    locks: Arc::clone(&self.locks),
                })
            }
            Err(_) => {
                self.locks
                    .remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
                warn!(%id, timeout_ms = self.timeout.as_millis() as u64, "Lock timed out");
                Err(PeerfundError::Concurrency(format!(
                    "timed out after {}ms waiting for {}",
                    self.timeout.as_millis(),
                    id
                )))
            }
        }
    }

    /// Lock every id in `ids`, in ascending id order
    ///
    /// Duplicates are locked once. The fixed order means two callers with
    /// overlapping sets cannot deadlock each other.
    pub async fn acquire_all(
        &self,
        ids: impl IntoIterator<Item = Uuid>,
    ) -> Result<Vec<LockGuard>> {
        let mut ids: Vec<Uuid> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();

        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.acquire(id).await?);
        }
        Ok(guards)
    }

    /// Ids currently held or waited on
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_id_times_out_while_held() {
        let locks = LockRegistry::new(Duration::from_millis(20));
        let loan_id = Uuid::now_v7();

        let _held = locks.acquire(loan_id).await.unwrap();
        let result = locks.acquire(loan_id).await;
        assert!(matches!(result, Err(PeerfundError::Concurrency(_))));
    }

    #[tokio::test]
    async fn test_different_ids_are_independent() {
        let locks = LockRegistry::new(Duration::from_millis(20));

        let _a = locks.acquire(Uuid::now_v7()).await.unwrap();
        let _b = locks.acquire(Uuid::now_v7()).await.unwrap();
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_released_on_drop() {
        let locks = LockRegistry::new(Duration::from_millis(20));
        let loan_id = Uuid::now_v7();

        drop(locks.acquire(loan_id).await.unwrap());
        assert!(locks.acquire(loan_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_entries_removed_when_idle() {
        let locks = LockRegistry::new(Duration::from_millis(20));

        for _ in 0..10 {
            drop(locks.acquire(Uuid::now_v7()).await.unwrap());
        }
        assert!(locks.is_empty());

        let held = locks.acquire(Uuid::now_v7()).await.unwrap();
        assert_eq!(locks.len(), 1);
        drop(held);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_entry_kept_while_another_caller_waits() {
        let locks = Arc::new(LockRegistry::new(Duration::from_secs(1)));
        let id = Uuid::now_v7();

        let held = locks.acquire(id).await.unwrap();
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(id).await.map(drop) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(held);
        assert!(waiter.await.unwrap().is_ok());
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_acquire_all_dedups_and_blocks_overlap() {
        let locks = LockRegistry::new(Duration::from_millis(20));
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();

        let guards = locks.acquire_all([b, a, b]).await.unwrap();
        assert_eq!(guards.len(), 2);

        let result = locks.acquire_all([a]).await;
        assert!(matches!(result, Err(PeerfundError::Concurrency(_))));

        drop(guards);
        assert!(locks.acquire_all([a, b]).await.is_ok());
    }
}
