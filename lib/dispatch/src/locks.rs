//! Per-conversation serialization.
//!
//! A session is read, mutated and saved as one unit. Holding the
//! conversation's guard for that whole span keeps two events for the same
//! conversation from interleaving, while different conversations proceed
//! independently.

use relaybot_core::ConversationId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Guard held while an event for one conversation is being processed.
pub type SessionGuard = OwnedMutexGuard<()>;

/// Lazily created async mutex per conversation.
#[derive(Debug, Default)]
pub struct SessionLocks {
    locks: Mutex<HashMap<ConversationId, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `id`.
    pub async fn acquire(&self, id: &ConversationId) -> SessionGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Drop entries nobody holds or waits on.
            locks.retain(|key, lock| key == id || Arc::strong_count(lock) > 1);
            locks.entry(id.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of conversations with a live lock entry.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn same_conversation_waits() {
        let locks = Arc::new(SessionLocks::new());
        let id = ConversationId::new("42");
        let entered = Arc::new(AtomicBool::new(false));

        let guard = locks.acquire(&id).await;

        let task = {
            let locks = locks.clone();
            let id = id.clone();
            let entered = entered.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&id).await;
                entered.store(true, Ordering::SeqCst);
            })
        };

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!entered.load(Ordering::SeqCst));

        drop(guard);
        task.await.expect("task");
        assert!(entered.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn different_conversations_do_not_block() {
        let locks = SessionLocks::new();

        let _first = locks.acquire(&ConversationId::new("1")).await;
        let _second = locks.acquire(&ConversationId::new("2")).await;

        assert_eq!(locks.tracked(), 2);
    }

    #[tokio::test]
    async fn released_entries_are_pruned() {
        let locks = SessionLocks::new();

        drop(locks.acquire(&ConversationId::new("1")).await);
        drop(locks.acquire(&ConversationId::new("2")).await);
        let _held = locks.acquire(&ConversationId::new("3")).await;

        assert_eq!(locks.tracked(), 1);
    }
}
