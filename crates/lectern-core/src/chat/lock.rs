//! Per-session reader/writer locks.
//!
//! Every mutating operation holds the session's write lock for its whole
//! read-modify-write cycle; read-only operations share the read lock.
//! Acquisition is bounded so a stuck holder surfaces as `SessionBusy`
//! instead of an unbounded queue.
//!
//! An entry lives only while someone holds or waits for it. The last guard
//! to be released removes it from the table.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use lectern_types::error::ChatError;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use uuid::Uuid;

type LockTable = DashMap<Uuid, Arc<RwLock<()>>>;

pub struct SessionLocks {
    locks: Arc<LockTable>,
    timeout: Duration,
    shared: bool,
}

/// Exclusive access to one session. Owned, so it can move into a task.
#[derive(Debug)]
pub struct SessionWriteGuard {
    _guard: OwnedRwLockWriteGuard<()>,
    _release: Release,
}

/// Shared access to one session.
pub struct SessionReadGuard {
    _guard: OwnedRwLockReadGuard<()>,
    _release: Release,
}

/// Prunes the session's entry once no other holder or waiter references it.
/// Declared after the lock guard so the guard's reference is gone first.
#[derive(Debug)]
struct Release {
    table: Option<Arc<LockTable>>,
    session_id: Uuid,
}

impl Drop for Release {
    fn drop(&mut self) {
        if let Some(table) = &self.table {
            table.remove_if(&self.session_id, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}

impl SessionLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            timeout,
            shared: true,
        }
    }

    /// Locks that never exclude anything; every acquisition gets its own lock.
    #[cfg(test)]
    pub(crate) fn disabled() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            timeout: Duration::from_secs(1),
            shared: false,
        }
    }

    fn lock_for(&self, session_id: Uuid) -> (Arc<RwLock<()>>, Release) {
        if !self.shared {
            let release = Release {
                table: None,
                session_id,
            };
            return (Arc::new(RwLock::new(())), release);
        }
        // Clone out of the map so no DashMap guard is held across an await.
        let lock = self.locks.entry(session_id).or_default().clone();
        let release = Release {
            table: Some(Arc::clone(&self.locks)),
            session_id,
        };
        (lock, release)
    }

    pub async fn write(&self, session_id: Uuid) -> Result<SessionWriteGuard, ChatError> {
        let (lock, release) = self.lock_for(session_id);
        match tokio::time::timeout(self.timeout, lock.write_owned()).await {
            Ok(guard) => Ok(SessionWriteGuard {
                _guard: guard,
                _release: release,
            }),
            Err(_) => Err(ChatError::SessionBusy { session_id }),
        }
    }

    pub async fn read(&self, session_id: Uuid) -> Result<SessionReadGuard, ChatError> {
        let (lock, release) = self.lock_for(session_id);
        match tokio::time::timeout(self.timeout, lock.read_owned()).await {
            Ok(guard) => Ok(SessionReadGuard {
                _guard: guard,
                _release: release,
            }),
            Err(_) => Err(ChatError::SessionBusy { session_id }),
        }
    }

    /// Sessions that currently have a holder or a waiter.
    pub fn tracked(&self) -> usize {
        self.locks.len()
    }
}
