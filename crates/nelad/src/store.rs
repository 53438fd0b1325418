//! Session state persistence boundary.
//!
//! The arbiter reads one state blob at the start of a turn and writes it
//! back at the end. At most one writer per user per turn is a caller
//! precondition; the store does not lock.

use anyhow::Result;
use nela_shared::{NelaError, SessionState};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Contract any storage layer must uphold: per-user read-modify-write of
/// one opaque blob.
pub trait SessionStore {
    /// Load a user's state, or a fresh default blob when absent
    fn load(&self, user_id: &str) -> Result<SessionState>;

    /// Persist a user's state for the next turn
    fn save(&self, user_id: &str, state: &SessionState) -> Result<()>;
}

/// In-memory store for tests and the REPL
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionState>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, user_id: &str) -> Result<SessionState> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| NelaError::Store("session lock poisoned".to_string()))?;
        Ok(sessions.get(user_id).cloned().unwrap_or_default())
    }

    fn save(&self, user_id: &str, state: &SessionState) -> Result<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| NelaError::Store("session lock poisoned".to_string()))?;
        sessions.insert(user_id.to_string(), state.clone());
        Ok(())
    }
}
