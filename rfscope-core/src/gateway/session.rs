//! Per-session engine bookkeeping.

use crate::engine::ReceptiveFieldEngine;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

/// Request header that selects an engine session.
pub const SESSION_HEADER: &str = "x-session-id";

/// Session used by requests that carry no session header.
pub const DEFAULT_SESSION_ID: &str = "default";

const MAX_SESSION_ID_LEN: usize = 128;

/// One client's engine plus the time it was last used.
#[derive(Debug, Clone)]
pub struct EngineSession {
    pub engine: ReceptiveFieldEngine,
    pub updated_at: DateTime<Utc>,
}

impl EngineSession {
    fn new() -> Self {
        Self {
            engine: ReceptiveFieldEngine::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Engines keyed by session id, bounded by `max_sessions`.
#[derive(Debug)]
pub struct EngineSessions {
    sessions: HashMap<String, EngineSession>,
    max_sessions: usize,
}

impl EngineSessions {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            max_sessions: max_sessions.max(1),
        }
    }

    /// Whether `id` is acceptable as a session id.
    pub fn is_valid_id(id: &str) -> bool {
        !id.is_empty()
            && id.len() <= MAX_SESSION_ID_LEN
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    }

    /// Create a fresh session with a random id.
    pub fn create_session(&mut self) -> String {
        let id = Uuid::new_v4().to_string();
        self.engine_mut(&id);
        id
    }

    /// The engine for `id`, created on first use.
    pub fn engine_mut(&mut self, id: &str) -> &mut ReceptiveFieldEngine {
        if !self.sessions.contains_key(id) && self.sessions.len() >= self.max_sessions {
            self.evict_least_recent();
        }
        let session = self.sessions.entry(id.to_string()).or_insert_with(|| {
            tracing::debug!(session = id, "Creating engine session");
            EngineSession::new()
        });
        session.updated_at = Utc::now();
        &mut session.engine
    }

    /// Read-only lookup that does not create or touch the session.
    pub fn get(&self, id: &str) -> Option<&EngineSession> {
        self.sessions.get(id)
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .sessions
            .iter()
            .min_by_key(|(_, s)| s.updated_at)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            tracing::info!(session = id.as_str(), "Evicting least recently used session");
            self.sessions.remove(&id);
        }
    }
}
