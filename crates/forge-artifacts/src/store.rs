use std::collections::BTreeMap;
use std::sync::Arc;

use forge_core::{ForgeError, ForgeResult, WorkspaceId};
use uuid::Uuid;

use crate::backend::ArtifactBackend;
use crate::refs::parse_refs;
use crate::types::{Artifact, ArtifactRef, ArtifactType, ResolvedContext, Statistics};

/// Façade over an [`ArtifactBackend`] implementing the Artifact Store
/// contract: versioned `put`, tenant-checked `get`, prompt-ready `resolve`,
/// and `statistics`.
pub struct ArtifactStore {
    backend: Arc<dyn ArtifactBackend>,
}

impl ArtifactStore {
    pub fn new(backend: Arc<dyn ArtifactBackend>) -> Self {
        Self { backend }
    }

    /// Writes a new artifact. If `reference_key` already has versions for
    /// this `(workspace_id, session_id)`, the new record gets
    /// `version = prev + 1`; otherwise it starts at version 1.
    #[allow(clippy::too_many_arguments)]
    pub async fn put(
        &self,
        workspace_id: WorkspaceId,
        session_id: Uuid,
        agent: &str,
        artifact_type: ArtifactType,
        reference_key: &str,
        payload: serde_json::Value,
        phase: u8,
    ) -> ForgeResult<Uuid> {
        let existing = self
            .backend
            .versions(workspace_id, session_id, reference_key)
            .await?;

        let artifact = match existing.last() {
            Some(prev) => prev.next_version(payload, phase),
            None => Artifact::new(
                workspace_id,
                session_id,
                agent,
                artifact_type,
                reference_key,
                payload,
                phase,
            ),
        };

        self.backend.append(artifact).await
    }

    /// Returns the highest-versioned payload for `reference_key`, or
    /// `NotFoundError` if absent or the record belongs to a different tenant.
    pub async fn get(
        &self,
        workspace_id: WorkspaceId,
        session_id: Uuid,
        reference_key: &str,
    ) -> ForgeResult<Artifact> {
        let versions = self
            .backend
            .versions(workspace_id, session_id, reference_key)
            .await?;
        versions
            .into_iter()
            .last()
            .ok_or_else(|| ForgeError::NotFound(format!("artifact {reference_key} not found")))
    }

    /// Resolves a list of refs (raw keys or agent filters) into artifacts
    /// grouped by agent, plus a deterministic textual projection for
    /// injection into an LLM prompt.
    pub async fn resolve(
        &self,
        workspace_id: WorkspaceId,
        session_id: Uuid,
        refs: &[ArtifactRef],
    ) -> ForgeResult<ResolvedContext> {
        let all = self.backend.all_for_session(workspace_id, session_id).await?;
        let latest = latest_per_key(all);

        let mut by_agent: BTreeMap<String, Vec<Artifact>> = BTreeMap::new();

        for r in refs {
            match r {
                ArtifactRef::Key(key) => {
                    if let Some(artifact) = latest.iter().find(|a| &a.reference_key == key) {
                        by_agent
                            .entry(artifact.source_agent.clone())
                            .or_default()
                            .push(artifact.clone());
                    }
                }
                ArtifactRef::AgentFilter {
                    agent,
                    artifact_type,
                } => {
                    for artifact in latest.iter().filter(|a| {
                        &a.source_agent == agent
                            && artifact_type.map(|t| t == a.artifact_type).unwrap_or(true)
                    }) {
                        by_agent
                            .entry(artifact.source_agent.clone())
                            .or_default()
                            .push(artifact.clone());
                    }
                }
            }
        }

        let rendered = render_context(&by_agent);
        Ok(ResolvedContext { by_agent, rendered })
    }

    /// Scans free text for `@agent/name` reference-key citations and
    /// resolves them in one step.
    pub async fn resolve_free_text(
        &self,
        workspace_id: WorkspaceId,
        session_id: Uuid,
        free_text: &str,
    ) -> ForgeResult<ResolvedContext> {
        let refs = parse_refs(free_text);
        self.resolve(workspace_id, session_id, &refs).await
    }

    /// Every artifact in the session at its highest version, grouped by
    /// nothing in particular — callers (e.g. the context synchronizer)
    /// filter by `artifact_type` themselves.
    pub async fn all_latest(
        &self,
        workspace_id: WorkspaceId,
        session_id: Uuid,
    ) -> ForgeResult<Vec<Artifact>> {
        let all = self.backend.all_for_session(workspace_id, session_id).await?;
        Ok(latest_per_key(all))
    }

    /// Aggregate counts over every artifact in the session.
    pub async fn statistics(
        &self,
        workspace_id: WorkspaceId,
        session_id: Uuid,
    ) -> ForgeResult<Statistics> {
        let all = self.backend.all_for_session(workspace_id, session_id).await?;
        let latest = latest_per_key(all);

        let mut by_agent = BTreeMap::new();
        let mut by_type = BTreeMap::new();
        let mut by_phase = BTreeMap::new();

        for a in &latest {
            *by_agent.entry(a.source_agent.clone()).or_insert(0usize) += 1;
            *by_type.entry(a.artifact_type.as_str().to_string()).or_insert(0usize) += 1;
            *by_phase.entry(a.metadata.phase).or_insert(0usize) += 1;
        }

        let mut recent = latest.clone();
        recent.sort_by(|a, b| b.metadata.created_at.cmp(&a.metadata.created_at));
        recent.truncate(10);

        Ok(Statistics {
            by_agent,
            by_type,
            by_phase,
            total: latest.len(),
            recent,
        })
    }
}

/// Collapses a flat list of all versions down to the highest version per
/// `reference_key`, preserving first-write order among distinct keys.
fn latest_per_key(all: Vec<Artifact>) -> Vec<Artifact> {
    let mut order: Vec<String> = Vec::new();
    let mut by_key: std::collections::HashMap<String, Artifact> = std::collections::HashMap::new();

    for artifact in all {
        let key = artifact.reference_key.clone();
        match by_key.get(&key) {
            Some(existing) if existing.metadata.version >= artifact.metadata.version => {}
            Some(_) => {
                by_key.insert(key, artifact);
            }
            None => {
                order.push(key.clone());
                by_key.insert(key, artifact);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| by_key.remove(&key))
        .collect()
}

fn render_context(by_agent: &BTreeMap<String, Vec<Artifact>>) -> String {
    let mut out = String::new();
    for (agent, artifacts) in by_agent {
        out.push_str(&format!("## {agent}\n"));
        for artifact in artifacts {
            out.push_str(&format!(
                "### {} ({})\n{}\n\n",
                artifact.reference_key,
                artifact.artifact_type.as_str(),
                artifact.payload
            ));
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::InMemoryArtifactBackend;

    fn store() -> ArtifactStore {
        ArtifactStore::new(Arc::new(InMemoryArtifactBackend::new()))
    }

    #[tokio::test]
    async fn put_then_get_within_session() {
        let store = store();
        let ws = Uuid::new_v4();
        let sess = Uuid::new_v4();
        store
            .put(
                ws,
                sess,
                "system-architect",
                ArtifactType::Architecture,
                "@system-architect/api-spec",
                serde_json::json!({"routes": []}),
                2,
            )
            .await
            .unwrap();

        let artifact = store.get(ws, sess, "@system-architect/api-spec").await.unwrap();
        assert_eq!(artifact.metadata.version, 1);
    }

    #[tokio::test]
    async fn second_put_bumps_version_and_shadows() {
        let store = store();
        let ws = Uuid::new_v4();
        let sess = Uuid::new_v4();
        for i in 0..2 {
            store
                .put(
                    ws,
                    sess,
                    "system-architect",
                    ArtifactType::Architecture,
                    "@system-architect/api-spec",
                    serde_json::json!({"iteration": i}),
                    2,
                )
                .await
                .unwrap();
        }
        let artifact = store.get(ws, sess, "@system-architect/api-spec").await.unwrap();
        assert_eq!(artifact.metadata.version, 2);
        assert_eq!(artifact.payload["iteration"], 1);
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let store = store();
        let err = store
            .get(Uuid::new_v4(), Uuid::new_v4(), "@nobody/nothing")
            .await
            .unwrap_err();
        assert_eq!(err.kind_name(), "NotFoundError");
    }

    #[tokio::test]
    async fn resolve_groups_by_agent_and_subsets_requested_keys() {
        let store = store();
        let ws = Uuid::new_v4();
        let sess = Uuid::new_v4();
        store
            .put(
                ws,
                sess,
                "system-architect",
                ArtifactType::Architecture,
                "@system-architect/api-spec",
                serde_json::json!({"a": 1}),
                2,
            )
            .await
            .unwrap();
        store
            .put(
                ws,
                sess,
                "project-planner",
                ArtifactType::Plan,
                "@project-planner/tasks",
                serde_json::json!({"b": 2}),
                3,
            )
            .await
            .unwrap();

        let resolved = store
            .resolve_free_text(ws, sess, "use @system-architect/api-spec only")
            .await
            .unwrap();

        assert_eq!(resolved.by_agent.len(), 1);
        assert!(resolved.by_agent.contains_key("system-architect"));
        assert!(!resolved.by_agent.contains_key("project-planner"));
    }

    #[tokio::test]
    async fn statistics_counts_latest_versions_only() {
        let store = store();
        let ws = Uuid::new_v4();
        let sess = Uuid::new_v4();
        for i in 0..3 {
            store
                .put(
                    ws,
                    sess,
                    "code-generator",
                    ArtifactType::Code,
                    "@code-generator/main",
                    serde_json::json!({"i": i}),
                    4,
                )
                .await
                .unwrap();
        }
        let stats = store.statistics(ws, sess).await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.by_agent["code-generator"], 1);
    }
}
