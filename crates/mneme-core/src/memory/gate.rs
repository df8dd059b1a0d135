//! Write gate used to quiesce stores during snapshot export and restore.
//!
//! Stores hold a shared permit across their metadata insert and index add;
//! snapshot export/import holds the exclusive side. When the gate is
//! disabled both sides are no-ops and snapshots may be internally
//! inconsistent across the two stores (the restore path tolerates that).

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub struct WriteGate {
    lock: RwLock<()>,
    enabled: bool,
}

impl WriteGate {
    pub fn new(enabled: bool) -> Self {
        Self {
            lock: RwLock::new(()),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Shared permit for one store's mutating section.
    pub async fn enter(&self) -> Option<RwLockReadGuard<'_, ()>> {
        if self.enabled {
            Some(self.lock.read().await)
        } else {
            None
        }
    }

    /// Exclusive permit: waits for in-flight stores and blocks new ones.
    pub async fn quiesce(&self) -> Option<RwLockWriteGuard<'_, ()>> {
        if self.enabled {
            Some(self.lock.write().await)
        } else {
            None
        }
    }
}

impl Default for WriteGate {
    fn default() -> Self {
        Self::new(true)
    }
}
