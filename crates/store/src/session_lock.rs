//! Per-session concurrency control (§4.3, §4.5, §5).
//!
//! Ensures turns on the same session commit in the order their user
//! messages were appended. The lock is held only for session-store reads
//! and writes that bracket a turn — callers release it for the duration
//! of the provider streaming call and reacquire it to persist the final
//! assistant message (§5's "not held across provider network I/O").

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Maps session id -> an async mutex. A second turn on the same session
/// waits for the first to release, rather than being rejected.
pub struct SessionLockMap {
    locks: SyncMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Default for SessionLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self {
            locks: SyncMutex::new(HashMap::new()),
        }
    }

    /// Acquire the turn-ordering lock for a session. Waits if another turn
    /// currently holds it.
    pub async fn acquire(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock();
            locks
                .entry(session_id.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        mutex.lock_owned().await
    }

    pub fn session_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Drop lock entries that aren't currently held, so the map doesn't
    /// grow unboundedly over the life of the process.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, m| Arc::strong_count(m) > 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn different_sessions_run_concurrently() {
        let map = Arc::new(SessionLockMap::new());
        let g1 = map.acquire("s1").await;
        let g2 = map.acquire("s2").await;
        assert_eq!(map.session_count(), 2);
        drop(g1);
        drop(g2);
    }

    #[tokio::test]
    async fn same_session_serializes_turns_in_order() {
        let map = Arc::new(SessionLockMap::new());
        let order = Arc::new(SyncMutex::new(Vec::<u32>::new()));
        let counter = Arc::new(AtomicU32::new(0));

        let g1 = map.acquire("s1").await;

        let map2 = map.clone();
        let order2 = order.clone();
        let counter2 = counter.clone();
        let handle = tokio::spawn(async move {
            let _g = map2.acquire("s1").await;
            let n = counter2.fetch_add(1, Ordering::SeqCst);
            order2.lock().push(n);
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        order.lock().push(999); // marks "turn 1 still holding lock"
        drop(g1);

        handle.await.unwrap();
        let seq = order.lock().clone();
        assert_eq!(seq, vec![999, 0]);
    }

    #[tokio::test]
    async fn prune_idle_removes_unheld_locks() {
        let map = SessionLockMap::new();
        {
            let _g = map.acquire("s1").await;
            map.prune_idle();
            assert_eq!(map.session_count(), 1); // held, not pruned
        }
        map.prune_idle();
        assert_eq!(map.session_count(), 0);
    }
}
