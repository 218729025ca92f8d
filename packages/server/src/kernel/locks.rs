//! Per-formation mutual exclusion for state updates.
//!
//! Guards are held only while re-loading and persisting rows, never across an
//! outbound webhook call.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::common::FormationId;

#[derive(Clone, Default)]
pub struct FormationLocks {
    inner: Arc<DashMap<FormationId, Arc<Mutex<()>>>>,
}

impl FormationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to the formation's rows.
    pub async fn lock(&self, formation_id: FormationId) -> OwnedMutexGuard<()> {
        let mutex = self
            .inner
            .entry(formation_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Drop the entry of a hard-deleted formation.
    pub fn forget(&self, formation_id: FormationId) {
        self.inner.remove(&formation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_formation_is_serialized() {
        let locks = FormationLocks::new();
        let id = FormationId::new();

        let guard = locks.lock(id).await;
        let contended = tokio::time::timeout(Duration::from_millis(50), locks.lock(id)).await;
        assert!(contended.is_err());
        drop(guard);

        let reacquired = tokio::time::timeout(Duration::from_millis(50), locks.lock(id)).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn test_distinct_formations_do_not_contend() {
        let locks = FormationLocks::new();
        let _a = locks.lock(FormationId::new()).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.lock(FormationId::new())).await;
        assert!(b.is_ok());
    }
}
