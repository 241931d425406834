use forge_core::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Lifecycle state of a [`Session`] (§3). Sessions start `active`; C8 moves
/// one to `completed` at phase 7 and to `failed` when C4 recovery exhausts
/// its budget or C5 reports an authentication error. `paused` is reserved
/// for an explicit user-initiated pause, not currently driven by any
/// subsystem in this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
    Failed,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub messages: Vec<Message>,
    pub active_skills: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// §3 lifecycle state.
    #[serde(default)]
    pub status: SessionStatus,
    /// Name of the subagent role C8 last dispatched this turn to.
    #[serde(default)]
    pub subagent_role: Option<String>,
    /// External id of the sandbox currently mapped to this session, if any.
    #[serde(default)]
    pub sandbox_id: Option<String>,
    /// Timestamp of the last turn processed for this session, distinct
    /// from `updated_at` (which only tracks transcript appends).
    #[serde(default = "Utc::now")]
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            messages: Vec::new(),
            active_skills: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata: HashMap::new(),
            status: SessionStatus::Active,
            subagent_role: None,
            sandbox_id: None,
            last_activity: now,
        }
    }

    pub fn add_message(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Marks this session as having just processed a turn.
    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
