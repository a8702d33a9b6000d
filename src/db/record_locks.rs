use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// One async mutex per record id.
///
/// Wrapped in `Arc` so it can be cheaply cloned and shared across tasks.
/// Holding the guard returned by [`RecordLocks::lock`] serialises every
/// read-modify-write on that record; different ids never block each other.
#[derive(Debug, Clone, Default)]
pub struct RecordLocks {
    inner: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn lock(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let record_lock = self.inner.lock().await.entry(id).or_default().clone();
        record_lock.lock_owned().await
    }

    /// Drop the entry for `id` once nobody holds or awaits it.
    pub async fn forget(&self, id: Uuid) {
        let mut map = self.inner.lock().await;
        if map.get(&id).is_some_and(|l| Arc::strong_count(l) == 1) {
            map.remove(&id);
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn same_id_waits_for_holder() {
        let locks = RecordLocks::new();
        let id = Uuid::new_v4();

        let guard = locks.lock(id).await;
        assert!(timeout(Duration::from_millis(20), locks.lock(id)).await.is_err());

        drop(guard);
        assert!(timeout(Duration::from_millis(20), locks.lock(id)).await.is_ok());
    }

    #[tokio::test]
    async fn different_ids_do_not_block() {
        let locks = RecordLocks::new();
        let _a = locks.lock(Uuid::new_v4()).await;
        assert!(timeout(Duration::from_millis(20), locks.lock(Uuid::new_v4()))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn forget_removes_idle_entry_only() {
        let locks = RecordLocks::new();
        let idle = Uuid::new_v4();
        let busy = Uuid::new_v4();

        drop(locks.lock(idle).await);
        let _held = locks.lock(busy).await;
        assert_eq!(locks.len().await, 2);

        locks.forget(idle).await;
        locks.forget(busy).await;
        assert_eq!(locks.len().await, 1);
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let locks = RecordLocks::new();
        let clone = locks.clone();
        let id = Uuid::new_v4();

        let _guard = locks.lock(id).await;
        assert!(timeout(Duration::from_millis(20), clone.lock(id)).await.is_err());
    }
}
