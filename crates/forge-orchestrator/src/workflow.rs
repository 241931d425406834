use forge_agent::{ExecutionOptions, LlmExecutor};
use forge_artifacts::{parse_refs, ArtifactStore, ArtifactType};
use forge_compliance::SourceFile;
use forge_core::{ForgeError, ForgeResult, LlmErrorKind, WorkspaceId};
use forge_sandbox::RecoveryCoordinator;
use forge_session::{Session, SessionStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::context_sync::ContextSynchronizer;
use crate::iteration::{DevIterationManager, Iteration, IterationDecision};
use crate::parallel::{ParallelBatch, ParallelProcessor, ParallelTask, TaskOutcome};
use crate::registry::{SubagentDescriptor, SubagentName, SubagentRegistry};

/// The seven-phase session state machine (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum WorkflowPhase {
    Discovery = 1,
    Architecture = 2,
    Planning = 3,
    Development = 4,
    Testing = 5,
    Validation = 6,
    Completion = 7,
}

impl WorkflowPhase {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::Discovery),
            2 => Some(Self::Architecture),
            3 => Some(Self::Planning),
            4 => Some(Self::Development),
            5 => Some(Self::Testing),
            6 => Some(Self::Validation),
            7 => Some(Self::Completion),
            _ => None,
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::from_u8(self.as_u8() + 1)
    }

    pub fn prev(self) -> Option<Self> {
        self.as_u8().checked_sub(1).and_then(Self::from_u8)
    }

    fn reference_key(self) -> &'static str {
        match self {
            Self::Discovery => "requirements",
            Self::Architecture => "architecture",
            Self::Planning => "tasks",
            Self::Development => "code",
            Self::Testing => "tests",
            Self::Validation => "review",
            Self::Completion => "artifact-index",
        }
    }
}

/// One recorded phase change. Regressions are allowed and never delete
/// artifacts — the history is append-only, same as artifact versioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: WorkflowPhase,
    pub to: WorkflowPhase,
    pub reason: TransitionReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    UserConfirmed,
    ConfidenceThreshold,
    UserRegression,
}

/// Per-session workflow state: current phase plus transition history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub session_id: Uuid,
    pub current_phase: WorkflowPhase,
    pub history: Vec<PhaseTransition>,
}

impl WorkflowState {
    fn new(session_id: Uuid) -> Self {
        Self { session_id, current_phase: WorkflowPhase::Discovery, history: Vec::new() }
    }
}

/// What one user turn produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTurnResult {
    pub phase: WorkflowPhase,
    pub response: String,
    pub artifact_refs: Vec<String>,
    pub iteration: Option<Iteration>,
    pub advanced_to: Option<WorkflowPhase>,
    pub success: bool,
    pub error: Option<String>,
}

/// Extracts a subagent-reported confidence value embedded as
/// `{"confidence": 0.NN}` anywhere in the response text. Absent or
/// unparseable means "no confidence signal" (`None`), which alone never
/// advances the phase — only an explicit user confirmation does.
fn extract_confidence(response: &str) -> Option<f32> {
    let idx = response.find("\"confidence\"")?;
    let tail = &response[idx..];
    let colon = tail.find(':')?;
    let rest = tail[colon + 1..].trim_start();
    let end = rest.find(|c: char| !(c.is_ascii_digit() || c == '.')).unwrap_or(rest.len());
    rest[..end].parse::<f32>().ok()
}

const CONFIDENCE_THRESHOLD: f32 = 0.8;

/// Drives the C8 phase state machine: resolves the active phase's
/// subagent(s) from C6, dispatches via C5 or C7, routes code-producing
/// phases through C9, persists results to C1, and decides whether the
/// session advances.
pub struct WorkflowManager {
    registry: Arc<SubagentRegistry>,
    executor: Arc<LlmExecutor>,
    parallel: Arc<ParallelProcessor>,
    artifacts: Arc<ArtifactStore>,
    iteration: tokio::sync::Mutex<DevIterationManager>,
    recovery: Option<Arc<RecoveryCoordinator>>,
    context_sync: Option<Arc<ContextSynchronizer>>,
    states: RwLock<HashMap<Uuid, WorkflowState>>,
}

impl WorkflowManager {
    pub fn new(
        registry: Arc<SubagentRegistry>,
        executor: Arc<LlmExecutor>,
        parallel: Arc<ParallelProcessor>,
        artifacts: Arc<ArtifactStore>,
    ) -> Self {
        Self {
            registry,
            executor,
            parallel,
            artifacts,
            iteration: tokio::sync::Mutex::new(DevIterationManager::new()),
            recovery: None,
            context_sync: None,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Wires in C4 recovery for sandbox-related failures surfaced during
    /// dispatch; without it, sandbox errors are surfaced to the caller
    /// undistinguished from any other failure.
    pub fn with_recovery(mut self, recovery: Arc<RecoveryCoordinator>) -> Self {
        self.recovery = Some(recovery);
        self
    }

    /// Wires in C10 so a context-preserving recovery (S1 restart, S2
    /// recreate) re-projects the session's artifacts into the new
    /// sandbox's `.pria/` layout before the caller's turn is retried.
    pub fn with_context_sync(mut self, context_sync: Arc<ContextSynchronizer>) -> Self {
        self.context_sync = Some(context_sync);
        self
    }

    async fn state_for(&self, session_id: Uuid) -> WorkflowState {
        let states = self.states.read().await;
        states.get(&session_id).cloned().unwrap_or_else(|| WorkflowState::new(session_id))
    }

    async fn store_state(&self, state: WorkflowState) {
        self.states.write().await.insert(state.session_id, state);
    }

    pub async fn phase_of(&self, session_id: Uuid) -> WorkflowPhase {
        self.state_for(session_id).await.current_phase
    }

    /// Explicit user-triggered regression. Never deletes artifacts; the
    /// next phase's turn simply writes a new version under the same
    /// reference_key, shadowing rather than replacing history.
    pub async fn regress_to(&self, session_id: Uuid, phase: WorkflowPhase) {
        let mut state = self.state_for(session_id).await;
        if phase < state.current_phase {
            state.history.push(PhaseTransition {
                from: state.current_phase,
                to: phase,
                reason: TransitionReason::UserRegression,
            });
            state.current_phase = phase;
        }
        self.store_state(state).await;
    }

    /// Runs one user turn: dispatches the current phase's subagent(s),
    /// persists artifacts, runs C9 for code-producing phases, and decides
    /// whether to advance.
    pub async fn advance(
        &self,
        workspace_id: WorkspaceId,
        session: &mut Session,
        user_message: &str,
        user_confirmed: bool,
        project_path: &str,
    ) -> ForgeResult<WorkflowTurnResult> {
        let session_id = session.id;
        session.touch();
        let mut state = self.state_for(session_id).await;
        let phase = state.current_phase;

        let descriptors = self.registry.by_phase(phase.as_u8());
        if descriptors.is_empty() {
            return Err(ForgeError::NotFound(format!("no subagent registered for phase {}", phase.as_u8())));
        }
        session.subagent_role =
            Some(descriptors.iter().map(|d| d.name.to_string()).collect::<Vec<_>>().join(","));

        let refs = parse_refs(user_message);
        let dispatch = if descriptors.len() > 1 {
            self.dispatch_parallel(workspace_id, session, &descriptors, user_message, phase, project_path).await
        } else {
            self.dispatch_single(workspace_id, session, descriptors[0], user_message, &refs, phase, project_path)
                .await
        };

        let (response, code_artifacts_present) = match dispatch {
            Ok(r) => r,
            Err(e) => {
                if matches!(e, ForgeError::Llm { kind: LlmErrorKind::Auth, .. }) {
                    session.status = SessionStatus::Failed;
                    return Err(e);
                }
                if let Some(recovery) = &self.recovery {
                    if matches!(e, ForgeError::Sandbox { .. }) {
                        warn!(%session_id, error = %e, "sandbox failure during dispatch, attempting C4 recovery");
                        let strategy = match recovery
                            .recover(workspace_id, session_id, forge_sandbox::FailureSpec::Unknown)
                            .await
                        {
                            Ok(strategy) => strategy,
                            Err(recover_err) => {
                                session.status = SessionStatus::Failed;
                                return Err(recover_err);
                            }
                        };

                        if let Some(env) = recovery.manager().get(workspace_id, session_id).await? {
                            session.sandbox_id = Some(env.id);
                        }

                        if strategy.preserves_context() {
                            if let Some(context_sync) = &self.context_sync {
                                info!(%session_id, ?strategy, "re-projecting artifacts into recovered sandbox via C10");
                                context_sync
                                    .to_sandbox(workspace_id, session_id, Path::new(project_path), phase.as_u8())
                                    .await?;
                            }
                        }

                        let retry = if descriptors.len() > 1 {
                            self.dispatch_parallel(workspace_id, session, &descriptors, user_message, phase, project_path).await
                        } else {
                            self.dispatch_single(
                                workspace_id, session, descriptors[0], user_message, &refs, phase, project_path,
                            )
                            .await
                        };
                        match retry {
                            Ok(r) => r,
                            Err(retry_err) => {
                                session.status = SessionStatus::Failed;
                                return Err(retry_err);
                            }
                        }
                    } else {
                        return Err(e);
                    }
                } else {
                    return Err(e);
                }
            }
        };

        let mut iteration = None;
        if phase == WorkflowPhase::Development && code_artifacts_present {
            iteration = Some(self.run_dev_iteration(workspace_id, session_id, phase.as_u8()).await?);
        }

        let required_ready = self
            .artifacts
            .get(workspace_id, session_id, &format!("@{}/{}", descriptors[0].name, phase.reference_key()))
            .await
            .is_ok();

        let confidence = extract_confidence(&response);
        let blocked = iteration.as_ref().is_some_and(|it| it.decision == IterationDecision::Blocked);

        let mut advanced_to = None;
        if !blocked && required_ready {
            let reason = if user_confirmed {
                Some(TransitionReason::UserConfirmed)
            } else if confidence.is_some_and(|c| c >= CONFIDENCE_THRESHOLD) {
                Some(TransitionReason::ConfidenceThreshold)
            } else {
                None
            };

            if let (Some(reason), Some(next)) = (reason, phase.next()) {
                state.history.push(PhaseTransition { from: phase, to: next, reason });
                state.current_phase = next;
                advanced_to = Some(next);
                info!(%session_id, from = phase.as_u8(), to = next.as_u8(), ?reason, "workflow phase advanced");
                if next == WorkflowPhase::Completion {
                    session.status = SessionStatus::Completed;
                }
            }
        }

        self.store_state(state).await;

        Ok(WorkflowTurnResult {
            phase,
            response,
            artifact_refs: descriptors.iter().map(|d| format!("@{}/{}", d.name, phase.reference_key())).collect(),
            iteration,
            advanced_to,
            success: true,
            error: None,
        })
    }

    async fn dispatch_single(
        &self,
        workspace_id: WorkspaceId,
        session: &mut Session,
        descriptor: &SubagentDescriptor,
        user_message: &str,
        refs: &[forge_artifacts::ArtifactRef],
        phase: WorkflowPhase,
        project_path: &str,
    ) -> ForgeResult<(String, bool)> {
        let prompt = format!("{}\n\n{user_message}", descriptor.system_prompt);
        let opts = ExecutionOptions {
            refs: refs.to_vec(),
            phase: phase.as_u8(),
            project_path: project_path.to_string(),
        };
        let mut result = self.executor.execute(workspace_id, session, &prompt, opts).await;
        if !result.success {
            return Err(result.error_kind.take().unwrap_or_else(|| {
                ForgeError::Internal(result.error.unwrap_or_else(|| "LLM execution failed".to_string()))
            }));
        }

        let has_code_artifacts = result.artifacts.iter().any(|a| a.artifact_type == ArtifactType::Code);
        if !has_code_artifacts {
            let reference_key = format!("@{}/{}", descriptor.name, phase.reference_key());
            self.artifacts
                .put(
                    workspace_id,
                    session.id,
                    &descriptor.name.to_string(),
                    descriptor.produces.first().copied().unwrap_or(ArtifactType::Review),
                    &reference_key,
                    serde_json::json!({ "response": result.response }),
                    phase.as_u8(),
                )
                .await?;
        }

        Ok((result.response, has_code_artifacts))
    }

    async fn dispatch_parallel(
        &self,
        workspace_id: WorkspaceId,
        session: &mut Session,
        descriptors: &[&SubagentDescriptor],
        user_message: &str,
        phase: WorkflowPhase,
        project_path: &str,
    ) -> ForgeResult<(String, bool)> {
        let tasks: Vec<ParallelTask> = descriptors
            .iter()
            .map(|d| {
                ParallelTask::new(format!("{}\n\n{user_message}", d.system_prompt), phase.as_u8())
                    .with_priority(if d.name == SubagentName::CodeGenerator { 10 } else { 0 })
            })
            .collect();

        let batch = ParallelBatch::new(workspace_id, tasks);
        let result = self.parallel.execute(batch, None, None).await?;

        let mut responses = Vec::new();
        let mut any_code = false;
        for outcome in result.outcomes.values() {
            match outcome {
                TaskOutcome::Completed { response, files_modified } => {
                    responses.push(response.clone());
                    any_code |= !files_modified.is_empty();
                }
                TaskOutcome::Failed { error } => {
                    warn!(%error, "parallel subagent task failed during workflow phase dispatch");
                }
                TaskOutcome::Cancelled => {}
            }
        }

        if !any_code {
            let reference_key = format!(
                "@{}/{}",
                descriptors.first().map(|d| d.name.to_string()).unwrap_or_default(),
                phase.reference_key()
            );
            self.artifacts
                .put(
                    workspace_id,
                    session.id,
                    "code-generator",
                    ArtifactType::Code,
                    &reference_key,
                    serde_json::json!({ "responses": responses }),
                    phase.as_u8(),
                )
                .await?;
        }

        Ok((responses.join("\n\n"), true))
    }

    async fn run_dev_iteration(&self, workspace_id: WorkspaceId, session_id: Uuid, phase: u8) -> ForgeResult<Iteration> {
        let all = self.artifacts.all_latest(workspace_id, session_id).await?;
        let files: Vec<SourceFile> = all
            .iter()
            .filter(|a| a.artifact_type == ArtifactType::Code)
            .filter_map(|a| {
                let path = a.payload.get("path")?.as_str()?;
                let content = a.payload.get("content").and_then(|v| v.as_str()).unwrap_or_default();
                Some(SourceFile::new(path, content))
            })
            .collect();

        let task_id = session_id;
        let mut mgr = self.iteration.lock().await;
        let iteration = mgr.run_iteration(task_id, &files);
        drop(mgr);
        let _ = phase;
        Ok(iteration)
    }
}
