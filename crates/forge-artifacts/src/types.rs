use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use forge_core::WorkspaceId;

/// The kind of output a subagent produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    Requirement,
    Architecture,
    Plan,
    Task,
    Code,
    Test,
    Review,
    Compliance,
    ArtifactIndex,
}

/// Versioning and phase bookkeeping carried alongside an [`Artifact`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub phase: u8,
    pub created_at: DateTime<Utc>,
    pub version: u32,
}

/// A typed, append-only record of one subagent's output.
///
/// Artifacts are never mutated. A new write under the same
/// `(session_id, reference_key)` is stored as a new record with
/// `metadata.version = prev + 1`; the highest version wins on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub workspace_id: WorkspaceId,
    pub session_id: Uuid,
    pub source_agent: String,
    pub artifact_type: ArtifactType,
    pub reference_key: String,
    pub payload: serde_json::Value,
    pub metadata: ArtifactMetadata,
}

impl Artifact {
    /// Builds a version-1 artifact. Callers that bump a version use
    /// [`Artifact::next_version`] instead of constructing directly.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workspace_id: WorkspaceId,
        session_id: Uuid,
        source_agent: impl Into<String>,
        artifact_type: ArtifactType,
        reference_key: impl Into<String>,
        payload: serde_json::Value,
        phase: u8,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            session_id,
            source_agent: source_agent.into(),
            artifact_type,
            reference_key: reference_key.into(),
            payload,
            metadata: ArtifactMetadata {
                phase,
                created_at: Utc::now(),
                version: 1,
            },
        }
    }

    /// Builds the next version of this artifact with a new payload,
    /// preserving identity fields (workspace, session, agent, reference_key).
    pub fn next_version(&self, payload: serde_json::Value, phase: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            workspace_id: self.workspace_id,
            session_id: self.session_id,
            source_agent: self.source_agent.clone(),
            artifact_type: self.artifact_type,
            reference_key: self.reference_key.clone(),
            payload,
            metadata: ArtifactMetadata {
                phase,
                created_at: Utc::now(),
                version: self.metadata.version + 1,
            },
        }
    }
}

impl ArtifactType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactType::Requirement => "requirement",
            ArtifactType::Architecture => "architecture",
            ArtifactType::Plan => "plan",
            ArtifactType::Task => "task",
            ArtifactType::Code => "code",
            ArtifactType::Test => "test",
            ArtifactType::Review => "review",
            ArtifactType::Compliance => "compliance",
            ArtifactType::ArtifactIndex => "artifact_index",
        }
    }
}

/// A single request to resolve context for an LLM prompt: either a raw
/// `reference_key` or an `{agent, type}` filter over all of that agent's
/// artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactRef {
    Key(String),
    AgentFilter {
        agent: String,
        artifact_type: Option<ArtifactType>,
    },
}

/// The result of [`crate::ArtifactStore::resolve`]: artifacts grouped by
/// source agent, plus a deterministic textual projection suitable for
/// injection into an LLM prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedContext {
    pub by_agent: std::collections::BTreeMap<String, Vec<Artifact>>,
    pub rendered: String,
}

/// Aggregate counts returned by [`crate::ArtifactStore::statistics`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statistics {
    pub by_agent: std::collections::BTreeMap<String, usize>,
    pub by_type: std::collections::BTreeMap<String, usize>,
    pub by_phase: std::collections::BTreeMap<u8, usize>,
    pub total: usize,
    pub recent: Vec<Artifact>,
}
