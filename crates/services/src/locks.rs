use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use interview_core::model::InterviewId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of per-interview async locks.
///
/// Whoever loads, mutates and stores an interview's tracker holds its lock
/// for the whole cycle.
#[derive(Clone, Default)]
pub struct InterviewLocks {
    inner: Registry,
}

impl InterviewLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, id: InterviewId) -> InterviewGuard {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(map.entry(id).or_default())
        };
        InterviewGuard {
            guard: Some(lock.lock_owned().await),
            id,
            registry: Arc::clone(&self.inner),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

type Registry = Arc<Mutex<HashMap<InterviewId, Arc<AsyncMutex<()>>>>>;

/// Held lock of one interview.
///
/// The registry entry is removed on drop once no other task holds or waits
/// for it.
pub struct InterviewGuard {
    guard: Option<OwnedMutexGuard<()>>,
    id: InterviewId,
    registry: Registry,
}

impl Drop for InterviewGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if map
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_interview_is_serialized() {
        let locks = InterviewLocks::new();
        let guard = locks.lock(InterviewId::new(1)).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(InterviewId::new(1)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_interviews_do_not_block() {
        let locks = InterviewLocks::new();
        let _first = locks.lock(InterviewId::new(1)).await;
        let _second = locks.lock(InterviewId::new(2)).await;
        assert_eq!(locks.tracked(), 2);
    }

    #[tokio::test]
    async fn released_locks_are_evicted() {
        let locks = InterviewLocks::new();
        let guard = locks.lock(InterviewId::new(1)).await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(InterviewId::new(1)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(guard);
        assert_eq!(locks.tracked(), 1);
        waiter.await.unwrap();
        assert_eq!(locks.tracked(), 0);

        for id in 2..50 {
            drop(locks.lock(InterviewId::new(id)).await);
        }
        assert_eq!(locks.tracked(), 0);
    }
}
