//! Session bookkeeping and the session handle
//!
//! The CLI owns all conversation state; sessions here are purely in-memory
//! records of which identifiers the client has seen and replayed. A
//! [`Session`] handle threads its identifier through consecutive queries and
//! marks its record terminated on drop.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;

use crate::client::{ClaudeClient, SessionQueryOptions};
use crate::error::Result;
use crate::types::{SessionAwareResponse, SessionId, SessionInfo, SessionStatus};

/// In-memory registry of session records
#[derive(Default)]
pub(crate) struct SessionTracker {
    sessions: Mutex<HashMap<SessionId, SessionInfo>>,
}

impl SessionTracker {
    /// Record a known-but-unused session
    pub(crate) fn create(&self, session_id: &SessionId) {
        let mut sessions = self.sessions.lock();
        sessions
            .entry(session_id.clone())
            .or_insert_with(|| SessionInfo {
                session_id: session_id.clone(),
                status: SessionStatus::Created,
                created_at: Utc::now(),
                last_activity: Utc::now(),
            });
    }

    /// Mark a session active and bump its activity timestamp
    pub(crate) fn touch(&self, session_id: &SessionId) {
        let mut sessions = self.sessions.lock();
        let info = sessions
            .entry(session_id.clone())
            .or_insert_with(|| SessionInfo {
                session_id: session_id.clone(),
                status: SessionStatus::Active,
                created_at: Utc::now(),
                last_activity: Utc::now(),
            });
        info.status = SessionStatus::Active;
        info.last_activity = Utc::now();
    }

    /// Mark a session terminated, keeping its record
    pub(crate) fn terminate(&self, session_id: &SessionId) {
        if let Some(info) = self.sessions.lock().get_mut(session_id) {
            info.status = SessionStatus::Terminated;
        }
    }

    pub(crate) fn get(&self, session_id: &SessionId) -> Option<SessionInfo> {
        self.sessions.lock().get(session_id).cloned()
    }

    pub(crate) fn list(&self) -> Vec<SessionInfo> {
        self.sessions.lock().values().cloned().collect()
    }
}

/// Handle over one CLI conversation.
///
/// A fresh session has no identifier until the first query returns one; from
/// then on every query resumes the same conversation.
pub struct Session {
    client: ClaudeClient,
    session_id: Option<SessionId>,
}

impl Session {
    pub(crate) fn new(client: ClaudeClient, session_id: Option<SessionId>) -> Self {
        if let Some(id) = &session_id {
            client.tracker().create(id);
        }
        Self { client, session_id }
    }

    /// Identifier of the underlying conversation, once known
    #[must_use]
    pub fn id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Run a query in this session, adopting the identifier the CLI returns
    pub async fn query(&mut self, prompt: &str) -> Result<SessionAwareResponse> {
        let opts = SessionQueryOptions {
            session_id: self.session_id.clone(),
            ..SessionQueryOptions::default()
        };
        let response = self.client.query_with_session(prompt, opts).await?;
        if let Some(id) = &response.session_id {
            self.session_id = Some(id.clone());
        }
        Ok(response)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(id) = &self.session_id {
            self.client.tracker().terminate(id);
        }
    }
}
