//! Per-conversation write serialization.
//!
//! One async mutex per `(user_id, conversation_id)`, created on first use and
//! removed once nobody holds or waits for it. Waiters are served in FIFO
//! order. The lock is not reentrant: acquiring a key you already hold waits
//! for your own guard and times out.

use hearth_core::{ConversationKey, Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

type Table = Arc<Mutex<HashMap<ConversationKey, Arc<AsyncMutex<()>>>>>;

/// Table of keyed write locks.
#[derive(Clone, Default)]
pub struct KeyedLocks {
    table: Table,
}

/// Held write lock. Releasing it drops the table entry when idle.
pub struct KeyedGuard {
    key: ConversationKey,
    table: Table,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait up to `timeout` for the lock on `key`.
    pub async fn acquire(&self, key: &ConversationKey, timeout: Duration) -> Result<KeyedGuard> {
        let mutex = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            table.entry(key.clone()).or_default().clone()
        };

        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(guard) => Ok(KeyedGuard {
                key: key.clone(),
                table: self.table.clone(),
                guard: Some(guard),
            }),
            Err(_) => {
                release_if_idle(&self.table, key);
                debug!(key = %key, waited_ms = timeout.as_millis() as u64, "Write lock acquisition timed out");
                Err(Error::WriteLockTimeout {
                    key: key.to_string(),
                    waited_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Keys currently held or waited on.
    pub fn active(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl KeyedGuard {
    pub fn key(&self) -> &ConversationKey {
        &self.key
    }
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        release_if_idle(&self.table, &self.key);
    }
}

/// Remove `key` when the table holds the only reference to its mutex.
fn release_if_idle(table: &Table, key: &ConversationKey) {
    let mut table = table.lock().unwrap_or_else(|e| e.into_inner());
    if table
        .get(key)
        .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
    {
        table.remove(key);
    }
}
