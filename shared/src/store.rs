//! In-memory session registry.
//!
//! Sessions live only as long as the process and are not shared between
//! processes. Each one sits behind its own mutex so turns in different
//! sessions never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::conversation::ConversationState;
use crate::{Error, Result};

/// Shared handle to one session's state.
pub type SessionHandle = Arc<Mutex<ConversationState>>;

/// Registry of live sessions keyed by id.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session and return its id.
    pub async fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        let mut sessions = self.sessions.write().await;
        sessions.insert(id, Arc::new(Mutex::new(ConversationState::new())));
        id
    }

    /// Look up a session.
    pub async fn get(&self, id: Uuid) -> Result<SessionHandle> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Session {}", id)))
    }

    /// Return a session to its initial state.
    pub async fn reset(&self, id: Uuid) -> Result<()> {
        let session = self.get(id).await?;
        session.lock().await.reset();
        Ok(())
    }

    /// Drop a session entirely.
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("Session {}", id)))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
