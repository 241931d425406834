use async_trait::async_trait;
use forge_core::{ForgeError, ForgeResult, WorkspaceId};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::Artifact;

/// Storage backend for artifacts, kept append-only by contract: a backend
/// implementation must never remove or overwrite an existing record, only
/// insert new ones.
#[async_trait]
pub trait ArtifactBackend: Send + Sync {
    /// Appends a new artifact record. Callers are responsible for computing
    /// the correct `metadata.version` before calling this.
    async fn append(&self, artifact: Artifact) -> ForgeResult<Uuid>;

    /// Returns every version ever written for `(workspace_id, session_id,
    /// reference_key)`, oldest first.
    async fn versions(
        &self,
        workspace_id: WorkspaceId,
        session_id: Uuid,
        reference_key: &str,
    ) -> ForgeResult<Vec<Artifact>>;

    /// Returns every artifact ever written for the given session, in
    /// insertion order. Used by `resolve`, `statistics`, and C10's sandbox
    /// projection.
    async fn all_for_session(
        &self,
        workspace_id: WorkspaceId,
        session_id: Uuid,
    ) -> ForgeResult<Vec<Artifact>>;
}

/// In-memory backend for tests and short-lived orchestration runs.
#[derive(Default)]
pub struct InMemoryArtifactBackend {
    // keyed by (workspace_id, session_id, reference_key) -> versions, oldest first
    store: RwLock<HashMap<(WorkspaceId, Uuid, String), Vec<Artifact>>>,
}

impl InMemoryArtifactBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactBackend for InMemoryArtifactBackend {
    async fn append(&self, artifact: Artifact) -> ForgeResult<Uuid> {
        let id = artifact.id;
        let key = (
            artifact.workspace_id,
            artifact.session_id,
            artifact.reference_key.clone(),
        );
        let mut store = self.store.write().await;
        store.entry(key).or_default().push(artifact);
        Ok(id)
    }

    async fn versions(
        &self,
        workspace_id: WorkspaceId,
        session_id: Uuid,
        reference_key: &str,
    ) -> ForgeResult<Vec<Artifact>> {
        let store = self.store.read().await;
        Ok(store
            .get(&(workspace_id, session_id, reference_key.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn all_for_session(
        &self,
        workspace_id: WorkspaceId,
        session_id: Uuid,
    ) -> ForgeResult<Vec<Artifact>> {
        let store = self.store.read().await;
        let mut all: Vec<Artifact> = store
            .iter()
            .filter(|((ws, sess, _), _)| *ws == workspace_id && *sess == session_id)
            .flat_map(|(_, versions)| versions.iter().cloned())
            .collect();
        all.sort_by_key(|a| a.metadata.created_at);
        Ok(all)
    }
}

/// File-backed artifact backend: one append-only NDJSON file per
/// `(workspace_id, session_id)`, one subdirectory per workspace so tenants
/// never share a directory listing.
pub struct FileArtifactBackend {
    root: PathBuf,
}

impl FileArtifactBackend {
    pub async fn new(root: PathBuf) -> ForgeResult<Self> {
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn session_path(&self, workspace_id: WorkspaceId, session_id: Uuid) -> PathBuf {
        self.root
            .join(workspace_id.to_string())
            .join(format!("{session_id}.ndjson"))
    }

    async fn read_session(
        &self,
        workspace_id: WorkspaceId,
        session_id: Uuid,
    ) -> ForgeResult<Vec<Artifact>> {
        let path = self.session_path(workspace_id, session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let mut artifacts = Vec::new();
        for line in data.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let artifact: Artifact = serde_json::from_str(line).map_err(|e| {
                ForgeError::Internal(format!("corrupt artifact record in {path:?}: {e}"))
            })?;
            artifacts.push(artifact);
        }
        Ok(artifacts)
    }
}

#[async_trait]
impl ArtifactBackend for FileArtifactBackend {
    async fn append(&self, artifact: Artifact) -> ForgeResult<Uuid> {
        let path = self.session_path(artifact.workspace_id, artifact.session_id);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(&artifact)?;
        line.push('\n');

        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(artifact.id)
    }

    async fn versions(
        &self,
        workspace_id: WorkspaceId,
        session_id: Uuid,
        reference_key: &str,
    ) -> ForgeResult<Vec<Artifact>> {
        let all = self.read_session(workspace_id, session_id).await?;
        Ok(all
            .into_iter()
            .filter(|a| a.reference_key == reference_key)
            .collect())
    }

    async fn all_for_session(
        &self,
        workspace_id: WorkspaceId,
        session_id: Uuid,
    ) -> ForgeResult<Vec<Artifact>> {
        self.read_session(workspace_id, session_id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::ArtifactType;

    fn sample(workspace_id: WorkspaceId, session_id: Uuid, key: &str, version: u32) -> Artifact {
        let mut a = Artifact::new(
            workspace_id,
            session_id,
            "system-architect",
            ArtifactType::Architecture,
            key,
            serde_json::json!({"v": version}),
            2,
        );
        a.metadata.version = version;
        a
    }

    #[tokio::test]
    async fn in_memory_versions_in_insertion_order() {
        let backend = InMemoryArtifactBackend::new();
        let ws = Uuid::new_v4();
        let sess = Uuid::new_v4();
        backend.append(sample(ws, sess, "@architect/spec", 1)).await.unwrap();
        backend.append(sample(ws, sess, "@architect/spec", 2)).await.unwrap();
        let versions = backend.versions(ws, sess, "@architect/spec").await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[1].metadata.version, 2);
    }

    #[tokio::test]
    async fn in_memory_scopes_by_workspace_and_session() {
        let backend = InMemoryArtifactBackend::new();
        let ws1 = Uuid::new_v4();
        let ws2 = Uuid::new_v4();
        let sess = Uuid::new_v4();
        backend.append(sample(ws1, sess, "@architect/spec", 1)).await.unwrap();
        let other = backend.versions(ws2, sess, "@architect/spec").await.unwrap();
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn file_backend_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileArtifactBackend::new(dir.path().to_path_buf()).await.unwrap();
        let ws = Uuid::new_v4();
        let sess = Uuid::new_v4();
        backend.append(sample(ws, sess, "@architect/spec", 1)).await.unwrap();
        backend.append(sample(ws, sess, "@architect/spec", 2)).await.unwrap();
        let versions = backend.versions(ws, sess, "@architect/spec").await.unwrap();
        assert_eq!(versions.len(), 2);

        // A fresh backend instance over the same directory sees the same data.
        let reopened = FileArtifactBackend::new(dir.path().to_path_buf()).await.unwrap();
        let all = reopened.all_for_session(ws, sess).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}
