//! Conversation session store.
//!
//! An ordered collection of sessions, each an append-only log of turns.
//! The store owns its sessions exclusively; callers hold only ids. The
//! store never ends up with zero sessions: deleting the last one (or
//! clearing everything) immediately creates a fresh empty session.

use crate::model::{ChatSession, ConversationMode, Message, DEFAULT_SESSION_TITLE};
use crate::storage::{self, StorageError};
use chrono::Utc;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

/// Errors related to session management
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to persist sessions: {0}")]
    Storage(#[from] StorageError),
    #[error("Unknown session: {0}")]
    UnknownSession(String),
    #[error("Unknown message {message_id} in session {session_id}")]
    UnknownMessage {
        session_id: String,
        message_id: String,
    },
}

struct Inner {
    sessions: Vec<ChatSession>,
    active_id: String,
}

/// Ordered collection of conversation sessions
pub struct SessionStore {
    inner: RwLock<Inner>,
    path: Option<PathBuf>,
}

impl SessionStore {
    /// In-memory store seeded with one fresh session
    pub fn new() -> Self {
        let session = ChatSession::new();
        let active_id = session.id.clone();
        Self {
            inner: RwLock::new(Inner {
                sessions: vec![session],
                active_id,
            }),
            path: None,
        }
    }

    /// Store backed by a JSON blob on disk.
    ///
    /// Rehydrates persisted sessions (timestamps come back as instants) and
    /// makes the first one active; creates a fresh session if none exist.
    pub fn open(path: PathBuf) -> Result<Self, SessionError> {
        let mut sessions = storage::load::<Vec<ChatSession>>(&path)?.unwrap_or_default();
        if sessions.is_empty() {
            sessions.push(ChatSession::new());
        }
        let active_id = sessions[0].id.clone();
        info!("Session store opened with {} session(s)", sessions.len());

        let store = Self {
            inner: RwLock::new(Inner {
                sessions,
                active_id,
            }),
            path: Some(path),
        };
        Ok(store)
    }

    /// Create a new empty session, prepend it, and make it active
    #[instrument(skip(self))]
    pub async fn create(&self) -> Result<String, SessionError> {
        let session = ChatSession::new();
        let id = session.id.clone();

        let mut inner = self.inner.write().await;
        inner.sessions.insert(0, session);
        inner.active_id = id.clone();
        self.persist(&inner)?;

        debug!("Created session {}", id);
        Ok(id)
    }

    /// Append a message to a session.
    ///
    /// Bumps `updated_at` and, while the session still carries its
    /// placeholder title, derives the title from the first turn's text.
    #[instrument(skip(self, message), fields(role = ?message.role))]
    pub async fn append(&self, session_id: &str, message: Message) -> Result<(), SessionError> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))?;

        session.messages.push(message);
        session.updated_at = Utc::now();
        if session.title == DEFAULT_SESSION_TITLE {
            if let Some(first) = session.messages.first() {
                if !first.content.is_empty() {
                    session.title = derive_title(&first.content);
                }
            }
        }

        self.persist(&inner)?;
        Ok(())
    }

    /// Remove a session. If it was active, the new first entry becomes
    /// active; if none remain, a fresh session is created so the store
    /// never holds zero sessions.
    #[instrument(skip(self))]
    pub async fn delete(&self, session_id: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.write().await;
        let before = inner.sessions.len();
        inner.sessions.retain(|s| s.id != session_id);
        if inner.sessions.len() == before {
            return Err(SessionError::UnknownSession(session_id.to_string()));
        }

        if inner.sessions.is_empty() {
            let session = ChatSession::new();
            inner.active_id = session.id.clone();
            inner.sessions.push(session);
        } else if inner.active_id == session_id {
            inner.active_id = inner.sessions[0].id.clone();
        }

        self.persist(&inner)?;
        debug!("Deleted session {}", session_id);
        Ok(())
    }

    /// Empty the store and create one fresh session
    #[instrument(skip(self))]
    pub async fn clear_all(&self) -> Result<String, SessionError> {
        let session = ChatSession::new();
        let id = session.id.clone();

        let mut inner = self.inner.write().await;
        inner.sessions = vec![session];
        inner.active_id = id.clone();
        self.persist(&inner)?;

        info!("Cleared all sessions");
        Ok(id)
    }

    /// Flip the save flag on an otherwise-immutable message
    pub async fn toggle_saved(
        &self,
        session_id: &str,
        message_id: &str,
    ) -> Result<bool, SessionError> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))?;
        let message = session
            .messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or_else(|| SessionError::UnknownMessage {
                session_id: session_id.to_string(),
                message_id: message_id.to_string(),
            })?;

        message.is_saved = !message.is_saved;
        let saved = message.is_saved;
        self.persist(&inner)?;
        Ok(saved)
    }

    /// Remember the active conversation mode for a session
    pub async fn set_active_mode(
        &self,
        session_id: &str,
        mode: ConversationMode,
    ) -> Result<(), SessionError> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))?;
        session.active_mode = Some(mode);
        self.persist(&inner)?;
        Ok(())
    }

    /// Snapshot of one session
    pub async fn session(&self, session_id: &str) -> Option<ChatSession> {
        self.inner
            .read()
            .await
            .sessions
            .iter()
            .find(|s| s.id == session_id)
            .cloned()
    }

    /// Snapshot of all sessions, most recently created first
    pub async fn sessions(&self) -> Vec<ChatSession> {
        self.inner.read().await.sessions.clone()
    }

    /// Id of the currently active session
    pub async fn active_id(&self) -> String {
        self.inner.read().await.active_id.clone()
    }

    /// Select a different active session
    pub async fn set_active(&self, session_id: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.write().await;
        if !inner.sessions.iter().any(|s| s.id == session_id) {
            return Err(SessionError::UnknownSession(session_id.to_string()));
        }
        inner.active_id = session_id.to_string();
        Ok(())
    }

    fn persist(&self, inner: &Inner) -> Result<(), SessionError> {
        if let Some(path) = &self.path {
            storage::save(path, &inner.sessions)?;
        }
        Ok(())
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive a session title from its first turn: truncate to 30 characters,
/// append an ellipsis iff truncated, uppercase the result
fn derive_title(text: &str) -> String {
    let truncated: String = text.chars().take(30).collect();
    let ellipsis = if text.chars().count() > 30 { "..." } else { "" };
    format!("{}{}", truncated, ellipsis).to_uppercase()
}
