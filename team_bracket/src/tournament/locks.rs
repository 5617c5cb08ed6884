//! Per-tournament mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::models::TournamentId;

type LockMap = HashMap<TournamentId, Arc<Mutex<()>>>;

/// One async mutex per tournament id.
///
/// Holding the guard serialises every read-validate-mutate-persist sequence
/// for that tournament inside this process. Different tournaments never
/// contend. An entry lives only while someone holds or waits for it.
#[derive(Clone, Default)]
pub struct TournamentLocks {
    locks: Arc<StdMutex<LockMap>>,
}

/// Exclusive access to one tournament, released on drop
pub struct TournamentGuard {
    tournament_id: TournamentId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<StdMutex<LockMap>>,
}

impl Drop for TournamentGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        // Clones only happen under the map lock, so a count of one means no
        // holder and no waiter is left.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = locks
            .get(&self.tournament_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            locks.remove(&self.tournament_id);
        }
    }
}

impl TournamentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `tournament_id`
    pub async fn acquire(&self, tournament_id: TournamentId) -> TournamentGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(tournament_id).or_default().clone()
        };
        let guard = lock.lock_owned().await;

        TournamentGuard {
            tournament_id,
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Number of tournaments currently held or waited on
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_tournament_is_exclusive() {
        let locks = TournamentLocks::new();
        let guard = locks.acquire(1).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(1).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished(), "second holder must wait");

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_tournaments_do_not_contend() {
        let locks = TournamentLocks::new();
        let _first = locks.acquire(1).await;
        let _second = tokio::time::timeout(Duration::from_millis(100), locks.acquire(2))
            .await
            .expect("independent tournament should lock immediately");
        assert_eq!(locks.tracked(), 2);
    }

    #[tokio::test]
    async fn test_released_locks_are_forgotten() {
        let locks = TournamentLocks::new();
        for id in 0..50 {
            let _guard = locks.acquire(id).await;
        }
        assert_eq!(locks.tracked(), 0);
    }

    #[tokio::test]
    async fn test_entry_survives_while_a_waiter_remains() {
        let locks = TournamentLocks::new();
        let guard = locks.acquire(7).await;

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(7).await;
                tokio::time::sleep(Duration::from_millis(20)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard);
        assert_eq!(locks.tracked(), 1, "the waiter still needs the entry");

        waiter.await.unwrap();
        assert_eq!(locks.tracked(), 0);
    }
}
