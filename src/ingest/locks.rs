use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slots = HashMap<i64, Arc<AsyncMutex<()>>>;

/// One async lock per topic id, so overlapping sweeps and detail views never
/// fetch the same topic twice at once. Entries are dropped when their last
/// holder or waiter goes away.
#[derive(Default)]
pub struct TopicLocks {
    slots: Mutex<Slots>,
}

impl TopicLocks {
    pub async fn lock(&self, id: i64) -> TopicGuard<'_> {
        let slot = Arc::clone(self.slots().entry(id).or_default());
        let guard = slot.lock_owned().await;
        TopicGuard {
            locks: self,
            id,
            guard: Some(guard),
        }
    }

    /// Number of topics currently locked or waited on.
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct TopicGuard<'a> {
    locks: &'a TopicLocks,
    id: i64,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TopicGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut slots = self.locks.slots();
        if let Some(slot) = slots.get(&self.id) {
            // Only the map's own reference left: nobody holds or awaits it.
            if Arc::strong_count(slot) == 1 {
                slots.remove(&self.id);
            }
        }
    }
}
