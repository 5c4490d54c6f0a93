use flowcore::WorkflowInstanceId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Async mutual exclusion keyed by workflow instance.
///
/// Work on one instance is serialized while different instances proceed in
/// parallel. Entries are removed once nobody holds or waits on them.
#[derive(Default)]
pub struct InstanceLocks {
    locks: Mutex<HashMap<WorkflowInstanceId, Arc<AsyncMutex<()>>>>,
}

impl InstanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: WorkflowInstanceId) -> InstanceGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock();
            locks.entry(id).or_default().clone()
        };

        let guard = lock.lock_owned().await;
        InstanceGuard {
            owner: self,
            id,
            guard: Some(guard),
        }
    }

    /// Number of instances with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held while an instance is being worked on.
pub struct InstanceGuard<'a> {
    owner: &'a InstanceLocks,
    id: WorkflowInstanceId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InstanceGuard<'_> {
    fn drop(&mut self) {
        // Release first so our clone of the Arc is gone before counting.
        self.guard.take();

        let mut locks = self.owner.locks.lock();
        if let Some(lock) = locks.get(&self.id) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(&self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn same_instance_is_serialized() {
        let locks = Arc::new(InstanceLocks::new());
        let id = Uuid::new_v4();

        let first = locks.acquire(id).await;
        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(first);
        contender.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn different_instances_do_not_block() {
        let locks = InstanceLocks::new();
        let _a = locks.acquire(Uuid::new_v4()).await;
        let _b = locks.acquire(Uuid::new_v4()).await;
        assert_eq!(locks.len(), 2);
    }
}
