use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};

use hostline_core::domain::conversation::ConversationId;

/// In-process serialization of writes per conversation. The partial unique indexes remain the
/// backstop across processes.
#[derive(Clone, Default)]
pub struct ConversationLocks {
    inner: Arc<StdMutex<HashMap<ConversationId, Arc<Mutex<()>>>>>,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, conversation_id: &ConversationId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = match self.inner.lock() {
                Ok(map) => map,
                Err(poisoned) => poisoned.into_inner(),
            };
            // idle entries are pruned opportunistically
            map.retain(|id, lock| id == conversation_id || Arc::strong_count(lock) > 1);
            Arc::clone(map.entry(conversation_id.clone()).or_default())
        };
        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        match self.inner.lock() {
            Ok(map) => map.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
