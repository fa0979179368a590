//! Per-session single-writer locks
//!
//! **[ME-OR-060]** At most one pipeline run (process or restart) holds a
//! session at a time. Triggers use [`SessionLocks::try_acquire`] and report a
//! conflict instead of queueing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// Registry of session locks
#[derive(Clone, Default)]
pub struct SessionLocks {
    locks: Arc<Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>>,
}

/// Held lock on one session; released on drop
pub struct SessionGuard {
    session_id: Uuid,
    _guard: OwnedMutexGuard<()>,
}

impl SessionGuard {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }
}

impl std::fmt::Debug for SessionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard")
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, session_id: Uuid) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Drop entries nobody holds or waits on
        locks.retain(|id, lock| *id == session_id || Arc::strong_count(lock) > 1);
        locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Take the lock if free
    pub fn try_acquire(&self, session_id: Uuid) -> Option<SessionGuard> {
        let guard = self.lock_for(session_id).try_lock_owned().ok()?;
        Some(SessionGuard {
            session_id,
            _guard: guard,
        })
    }

    /// Wait for the lock
    pub async fn acquire(&self, session_id: Uuid) -> SessionGuard {
        let guard = self.lock_for(session_id).lock_owned().await;
        SessionGuard {
            session_id,
            _guard: guard,
        }
    }

    /// True while some run holds the session
    pub fn is_running(&self, session_id: Uuid) -> bool {
        let locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .get(&session_id)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Number of sessions currently held by a run
    pub fn active_count(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.values().filter(|lock| lock.try_lock().is_err()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_try_acquire_excludes_second_holder() {
        let locks = SessionLocks::new();
        let id = Uuid::new_v4();

        let guard = locks.try_acquire(id).unwrap();
        assert_eq!(guard.session_id(), id);
        assert!(locks.try_acquire(id).is_none());
        assert!(locks.is_running(id));

        drop(guard);
        assert!(!locks.is_running(id));
        assert!(locks.try_acquire(id).is_some());
    }

    #[test]
    fn test_active_count_tracks_held_guards() {
        let locks = SessionLocks::new();
        assert_eq!(locks.active_count(), 0);

        let a = locks.try_acquire(Uuid::new_v4()).unwrap();
        let _b = locks.try_acquire(Uuid::new_v4()).unwrap();
        assert_eq!(locks.active_count(), 2);

        drop(a);
        assert_eq!(locks.active_count(), 1);
    }

    #[test]
    fn test_sessions_are_independent() {
        let locks = SessionLocks::new();
        let _a = locks.try_acquire(Uuid::new_v4()).unwrap();
        assert!(locks.try_acquire(Uuid::new_v4()).is_some());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let locks = SessionLocks::new();
        let id = Uuid::new_v4();
        let guard = locks.try_acquire(id).unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(id).await.session_id() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        assert_eq!(waiter.await.unwrap(), id);
    }
}
