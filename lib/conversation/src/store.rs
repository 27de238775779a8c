//! Session storage.
//!
//! A store maps each conversation to at most one session. First contact is
//! read-or-create: concurrent first contacts for the same conversation must
//! converge on a single default record.

use crate::error::SessionError;
use crate::ledger::UsageCounters;
use crate::session::{Session, SessionOptions};
use async_trait::async_trait;
use relaybot_core::ConversationId;
use rootcause::Report;
use std::collections::HashMap;
use std::sync::RwLock;

/// Trait for session storage.
///
/// `save` replaces the whole record in one step; a failed save leaves the
/// previously committed session intact.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Gets a session by conversation.
    async fn get(&self, id: &ConversationId) -> Result<Session, Report<SessionError>>;

    /// Creates a session with default options.
    ///
    /// Fails with [`SessionError::AlreadyExists`] if one exists.
    async fn create(
        &self,
        id: &ConversationId,
        defaults: &SessionOptions,
    ) -> Result<Session, Report<SessionError>>;

    /// Returns the existing session or atomically creates one.
    async fn get_or_create(
        &self,
        id: &ConversationId,
        defaults: &SessionOptions,
    ) -> Result<Session, Report<SessionError>>;

    /// Persists a session.
    async fn save(&self, session: &Session) -> Result<(), Report<SessionError>>;

    /// Usage summed over every stored session.
    async fn usage_totals(&self) -> Result<UsageCounters, Report<SessionError>>;
}

/// In-memory session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<ConversationId, Session>>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().map(|map| map.len()).unwrap_or(0)
    }

    /// Returns true if no session is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> SessionError {
        SessionError::StorageFailed {
            reason: "session map lock poisoned".to_string(),
        }
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, id: &ConversationId) -> Result<Session, Report<SessionError>> {
        let sessions = self.sessions.read().map_err(|_| Self::poisoned())?;
        sessions
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound { id: id.clone() }.into())
    }

    async fn create(
        &self,
        id: &ConversationId,
        defaults: &SessionOptions,
    ) -> Result<Session, Report<SessionError>> {
        let mut sessions = self.sessions.write().map_err(|_| Self::poisoned())?;
        if sessions.contains_key(id) {
            return Err(SessionError::AlreadyExists { id: id.clone() }.into());
        }
        let session = Session::new(id.clone(), defaults.clone());
        sessions.insert(id.clone(), session.clone());
        Ok(session)
    }

    async fn get_or_create(
        &self,
        id: &ConversationId,
        defaults: &SessionOptions,
    ) -> Result<Session, Report<SessionError>> {
        let mut sessions = self.sessions.write().map_err(|_| Self::poisoned())?;
        let session = sessions.entry(id.clone()).or_insert_with(|| {
            tracing::info!(conversation_id = %id, "created session");
            Session::new(id.clone(), defaults.clone())
        });
        Ok(session.clone())
    }

    async fn save(&self, session: &Session) -> Result<(), Report<SessionError>> {
        let mut sessions = self.sessions.write().map_err(|_| Self::poisoned())?;
        sessions.insert(session.id().clone(), session.clone());
        Ok(())
    }

    async fn usage_totals(&self) -> Result<UsageCounters, Report<SessionError>> {
        let sessions = self.sessions.read().map_err(|_| Self::poisoned())?;
        Ok(UsageCounters::sum(sessions.values().map(Session::usage)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context;
    use crate::ledger::UsageKind;
    use crate::message::MessageRole;
    use crate::session::tests::options;
    use std::sync::Arc;

    #[tokio::test]
    async fn get_missing_session_is_not_found() {
        let store = MemorySessionStore::new();
        let result = store.get(&ConversationId::new("42")).await;
        assert!(result.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn create_then_get() {
        let store = MemorySessionStore::new();
        let id = ConversationId::new("42");

        let created = store.create(&id, &options(5)).await.expect("create");
        let fetched = store.get(&id).await.expect("get");

        assert_eq!(created, fetched);
    }

    #[tokio::test]
    async fn create_twice_fails() {
        let store = MemorySessionStore::new();
        let id = ConversationId::new("42");
        store.create(&id, &options(5)).await.expect("create");

        let second = store.create(&id, &options(5)).await;

        assert!(second.is_err());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_first_contact_creates_once() {
        let store = Arc::new(MemorySessionStore::new());
        let id = ConversationId::new("42");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                store.get_or_create(&id, &options(5)).await.expect("get_or_create")
            }));
        }
        let mut created_at = Vec::new();
        for handle in handles {
            created_at.push(handle.await.expect("join").created_at());
        }

        assert_eq!(store.len(), 1);
        assert!(created_at.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[tokio::test]
    async fn save_replaces_record() {
        let store = MemorySessionStore::new();
        let id = ConversationId::new("42");
        let mut session = store.get_or_create(&id, &options(5)).await.expect("create");
        context::append_message(&mut session, MessageRole::User, "hello");

        store.save(&session).await.expect("save");

        let fetched = store.get(&id).await.expect("get");
        assert_eq!(fetched.context(), session.context());
    }

    #[tokio::test]
    async fn usage_totals_sum_sessions() {
        let store = MemorySessionStore::new();
        for (id, tokens) in [("1", 10_u64), ("2", 32)] {
            let mut session = store
                .get_or_create(&ConversationId::new(id), &options(5))
                .await
                .expect("create");
            session.usage_mut().record(UsageKind::Completion, tokens);
            store.save(&session).await.expect("save");
        }

        let totals = store.usage_totals().await.expect("totals");
        assert_eq!(totals.completion_units(), 42);
    }
}
