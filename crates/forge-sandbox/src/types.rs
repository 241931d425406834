use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Lifecycle state of a [`SandboxEnv`].
///
/// `creating -> ready -> {degraded <-> unhealthy} -> {unresponsive ->
/// terminated}`, with a direct `ready -> terminated` edge on explicit stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxStatus {
    Creating,
    Ready,
    Degraded,
    Unhealthy,
    Unresponsive,
    Terminated,
}

impl SandboxStatus {
    /// Whether `to` is a legal transition from this state. Used to reject
    /// illegal transitions rather than silently accept them (§9, "phase
    /// transitions via status strings").
    pub fn can_transition_to(self, to: SandboxStatus) -> bool {
        use SandboxStatus::*;
        matches!(
            (self, to),
            (Creating, Ready)
                | (Creating, Terminated)
                | (Ready, Degraded)
                | (Ready, Terminated)
                | (Degraded, Ready)
                | (Degraded, Unhealthy)
                | (Degraded, Terminated)
                | (Unhealthy, Degraded)
                | (Unhealthy, Ready)
                | (Unhealthy, Unresponsive)
                | (Unhealthy, Terminated)
                | (Unresponsive, Ready)
                | (Unresponsive, Terminated)
        ) || self == to
    }
}

/// A remote execution environment provisioned for one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxEnv {
    /// Provider-assigned external id (e.g. a Docker container id).
    pub id: String,
    pub session_id: Uuid,
    pub status: SandboxStatus,
    pub working_dir: String,
    pub created_at: DateTime<Utc>,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub recovery_attempts: u32,
    pub metadata: HashMap<String, String>,
}

impl SandboxEnv {
    pub fn new(id: impl Into<String>, session_id: Uuid, working_dir: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            session_id,
            status: SandboxStatus::Creating,
            working_dir: working_dir.into(),
            created_at: Utc::now(),
            last_heartbeat: None,
            consecutive_failures: 0,
            recovery_attempts: 0,
            metadata: HashMap::new(),
        }
    }
}

/// Result of [`crate::provider::SandboxProvider::execute`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    pub duration_ms: u64,
}

/// Options accepted by [`crate::provider::SandboxProvider::execute`].
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub working_dir: Option<String>,
    pub env: HashMap<String, String>,
    pub timeout_ms: Option<u64>,
}

/// A named recovery strategy applied by Health & Recovery (C4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Soft restart; preserves context.
    Restart,
    /// Create a new sandbox and re-project artifacts; preserves context.
    Recreate,
    /// Create a new sandbox with minimal setup; does not preserve context.
    CleanSlate,
    /// Swap to a pre-warmed backup; preserves context.
    Failover,
}

impl RecoveryStrategy {
    pub fn preserves_context(self) -> bool {
        !matches!(self, RecoveryStrategy::CleanSlate)
    }
}

/// The condition that triggered a recovery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureSpec {
    ConnectionTimeout,
    CommandFailure,
    SandboxTerminated,
    ResourceExhaustion,
    Unknown,
}
