use forge_artifacts::{ArtifactStore, ArtifactType};
use forge_core::{ForgeError, ForgeResult, WorkspaceId};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// One `.pria/<name>.json` file and the artifact type(s) it projects.
struct PriaFile {
    name: &'static str,
    reference_key: &'static str,
    types: &'static [ArtifactType],
}

const PRIA_FILES: &[PriaFile] = &[
    PriaFile { name: "requirements", reference_key: "requirements", types: &[ArtifactType::Requirement] },
    PriaFile {
        name: "technical-specs",
        reference_key: "technical-specs",
        types: &[ArtifactType::Architecture],
    },
    PriaFile { name: "tasks", reference_key: "tasks", types: &[ArtifactType::Plan, ArtifactType::Task] },
    PriaFile {
        name: "artifacts",
        reference_key: "artifacts",
        types: &[
            ArtifactType::Requirement,
            ArtifactType::Architecture,
            ArtifactType::Plan,
            ArtifactType::Task,
            ArtifactType::Code,
            ArtifactType::Test,
            ArtifactType::Review,
            ArtifactType::Compliance,
        ],
    },
];

const PROGRESS_FILE: &str = "progress-tracking";
const PHASE_FILE: &str = "current-phase";
const SYNC_AGENT: &str = "context-synchronizer";

/// Projects session state into (and back from) the `.pria/` file layout a
/// sandboxed target app reads and writes (C10).
pub struct ContextSynchronizer {
    artifacts: Arc<ArtifactStore>,
}

impl ContextSynchronizer {
    pub fn new(artifacts: Arc<ArtifactStore>) -> Self {
        Self { artifacts }
    }

    fn pria_dir(project_path: &Path) -> PathBuf {
        project_path.join(".pria")
    }

    /// Writes every artifact category out to `.pria/` under `project_path`,
    /// atomically (write to a sibling temp file, then rename). Existing
    /// files not covered by this sync are never touched or deleted.
    pub async fn to_sandbox(
        &self,
        workspace_id: WorkspaceId,
        session_id: Uuid,
        project_path: &Path,
        current_phase: u8,
    ) -> ForgeResult<()> {
        let dir = Self::pria_dir(project_path);
        tokio::fs::create_dir_all(&dir).await?;

        Self::atomic_write(&dir, PHASE_FILE, &json!({ "phase": current_phase })).await?;

        let all = self.artifacts.all_latest(workspace_id, session_id).await?;

        for pria_file in PRIA_FILES {
            let matching: Vec<_> =
                all.iter().filter(|a| pria_file.types.contains(&a.artifact_type)).collect();
            let payload = json!({
                "items": matching.iter().map(|a| json!({
                    "reference_key": a.reference_key,
                    "source_agent": a.source_agent,
                    "artifact_type": a.artifact_type.as_str(),
                    "version": a.metadata.version,
                    "phase": a.metadata.phase,
                    "payload": a.payload,
                })).collect::<Vec<_>>(),
            });
            Self::atomic_write(&dir, pria_file.name, &payload).await?;
        }

        let progress = json!({
            "total_artifacts": all.len(),
            "current_phase": current_phase,
        });
        Self::atomic_write(&dir, PROGRESS_FILE, &progress).await?;

        Ok(())
    }

    /// Reads whichever `.pria/` files exist under `project_path` and
    /// upserts their contents into the artifact store under the same
    /// reference keys, bumping version. Missing files are treated as empty
    /// — never an error.
    pub async fn from_sandbox(
        &self,
        workspace_id: WorkspaceId,
        session_id: Uuid,
        project_path: &Path,
        phase: u8,
    ) -> ForgeResult<Vec<Uuid>> {
        let dir = Self::pria_dir(project_path);
        let mut written = Vec::new();

        for pria_file in PRIA_FILES {
            let path = dir.join(format!("{}.json", pria_file.name));
            let Some(value) = Self::read_json_if_exists(&path).await? else {
                continue;
            };
            let artifact_type = pria_file.types[0];
            let id = self
                .artifacts
                .put(
                    workspace_id,
                    session_id,
                    SYNC_AGENT,
                    artifact_type,
                    pria_file.reference_key,
                    value,
                    phase,
                )
                .await?;
            written.push(id);
        }

        Ok(written)
    }

    async fn read_json_if_exists(path: &Path) -> ForgeResult<Option<serde_json::Value>> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ForgeError::Io(e)),
        }
    }

    async fn atomic_write(dir: &Path, name: &str, value: &serde_json::Value) -> ForgeResult<()> {
        let final_path = dir.join(format!("{name}.json"));
        let tmp_path = dir.join(format!(".{name}.json.tmp"));
        let body = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(&tmp_path, &body).await?;
        tokio::fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }
}
