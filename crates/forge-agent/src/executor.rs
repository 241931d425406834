use forge_artifacts::{Artifact, ArtifactRef, ArtifactStore, ArtifactType};
use forge_core::{ForgeError, ForgeResult, Message, Role, ToolCall, WorkspaceId};
use forge_security::audit::AuditOutcome;
use forge_security::{AuditLog, PermissionSet};
use forge_session::Session;
use forge_skills::SkillDescriptor;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::llm::{LlmClient, LlmResponse};
use crate::stream::StreamEvent;

/// Retries after the first attempt for a transient LLM transport failure
/// (§4.5/§7): authentication errors are never retried.
const LLM_RETRY_ATTEMPTS: u32 = 2;
const LLM_BACKOFF_BASE_MS: u64 = 1_000;
const LLM_BACKOFF_CAP_MS: u64 = 30_000;

fn llm_backoff_delay(attempt: u32) -> Duration {
    let ms = LLM_BACKOFF_BASE_MS.saturating_mul(1u64 << attempt.min(5)).min(LLM_BACKOFF_CAP_MS);
    Duration::from_millis(ms)
}

/// Caller-supplied shape of the context layer assembled before the user's
/// request (§4.5 step 2): either raw artifact reference keys or an
/// `{agent, type}` filter, resolved via [`ArtifactStore::resolve`].
#[derive(Default)]
pub struct ExecutionOptions {
    pub refs: Vec<ArtifactRef>,
    pub phase: u8,
    pub project_path: String,
}

/// The single-entry-point result shape of the LLM Executor (C5).
pub struct ExecutionResult {
    pub response: String,
    pub artifacts: Vec<Artifact>,
    pub tool_uses: Vec<ToolCall>,
    pub files_modified: Vec<String>,
    pub duration_ms: u64,
    pub success: bool,
    pub error: Option<String>,
    /// The typed failure (§4.5/§7), alongside `error`'s rendered message,
    /// so C8 can branch on `ErrorKind`/`retryable()` instead of a string.
    pub error_kind: Option<ForgeError>,
}

const COMPLIANCE_REMINDER: &str =
    "Every data-layer query must be scoped by workspace_id. Every server entry point must \
     verify identity and workspace access before handling the request. Never hardcode secrets; \
     read them from configuration. Prefer parameterized queries over string-built SQL.";

/// Detects whether a tool call is a file-write/edit operation, and if so,
/// extracts the `(path, content)` pair so the executor can emit a matching
/// artifact. Recognizes argument shapes `{path, content}` and
/// `{file_path, content}`, the two conventions seen across the skill
/// registry's file-mutating tools.
fn file_write_target(call: &ToolCall) -> Option<(String, String)> {
    let name = call.name.to_lowercase();
    if !(name.contains("write") || name.contains("edit") || name.contains("create_file")) {
        return None;
    }
    let path = call.arguments["path"]
        .as_str()
        .or_else(|| call.arguments["file_path"].as_str())?;
    let content = call.arguments["content"].as_str().unwrap_or_default();
    Some((path.to_string(), content.to_string()))
}

/// The sole chokepoint through which every subagent invocation passes
/// (C5). Wraps [`LlmClient`] with per-session mutual exclusion, three-layer
/// context assembly via [`ArtifactStore`], streaming classification into
/// `{response, tool_uses, files_modified}`, and cooperative cancellation.
pub struct LlmExecutor {
    llm: LlmClient,
    skills: Arc<forge_skills::SkillRegistry>,
    permissions: PermissionSet,
    audit: Arc<AuditLog>,
    artifacts: Arc<ArtifactStore>,
    max_turns: u32,
    session_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    cancel_flags: Mutex<HashMap<Uuid, Arc<AtomicBool>>>,
}

impl LlmExecutor {
    pub fn new(
        llm: LlmClient,
        skills: Arc<forge_skills::SkillRegistry>,
        permissions: PermissionSet,
        audit: Arc<AuditLog>,
        artifacts: Arc<ArtifactStore>,
        max_turns: u32,
    ) -> Self {
        Self {
            llm,
            skills,
            permissions,
            audit,
            artifacts,
            max_turns,
            session_locks: Mutex::new(HashMap::new()),
            cancel_flags: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, session_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        Arc::clone(locks.entry(session_id).or_insert_with(|| Arc::new(Mutex::new(()))))
    }

    async fn cancel_flag_for(&self, session_id: Uuid) -> Arc<AtomicBool> {
        let mut flags = self.cancel_flags.lock().await;
        Arc::clone(flags.entry(session_id).or_insert_with(|| Arc::new(AtomicBool::new(false))))
    }

    /// Requests cancellation of the in-flight execution for `session_id`,
    /// if any. The executor checks this flag between agentic-loop turns, so
    /// cancellation takes effect at the next turn boundary rather than
    /// mid-LLM-call.
    pub async fn cancel(&self, session_id: Uuid) {
        let flag = self.cancel_flag_for(session_id).await;
        flag.store(true, Ordering::SeqCst);
    }

    /// Wraps [`LlmClient::chat`] with C5's transient-failure retry policy:
    /// authentication errors fail immediately; network/timeout/SDK errors
    /// are retried up to [`LLM_RETRY_ATTEMPTS`] times with exponential
    /// backoff (§4.5, §7).
    async fn chat_with_retry(
        &self,
        system_prompt: Option<&str>,
        messages: &[Message],
        tools: &[SkillDescriptor],
    ) -> ForgeResult<LlmResponse> {
        let mut last_err = None;
        for attempt in 0..=LLM_RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(llm_backoff_delay(attempt - 1)).await;
            }
            match self.llm.chat(system_prompt, messages, tools).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.retryable() && attempt < LLM_RETRY_ATTEMPTS => {
                    warn!(attempt, error = %e, "C5 LLM call failed, retrying with backoff");
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or_else(|| ForgeError::Internal("LLM retry loop exhausted".into())))
    }

    async fn assemble_context(
        &self,
        workspace_id: WorkspaceId,
        session_id: Uuid,
        opts: &ExecutionOptions,
    ) -> ForgeResult<String> {
        let resolved = self.artifacts.resolve(workspace_id, session_id, &opts.refs).await?;
        Ok(format!(
            "# Session\nsession_id: {session_id}\nworkspace_id: {workspace_id}\nphase: {phase}\nproject_path: {path}\n\n\
             # Resolved artifacts\n{rendered}\n\n\
             # Compliance reminders\n{reminder}",
            phase = opts.phase,
            path = opts.project_path,
            rendered = resolved.rendered,
            reminder = COMPLIANCE_REMINDER,
        ))
    }

    /// The single entry point: `execute(prompt, context, opts) -> Result`.
    /// Serializes with any other in-flight call for the same session, runs
    /// the agentic loop, and classifies streamed messages into the
    /// text/tool-use/tool-result triad described in §4.5.
    pub async fn execute(
        &self,
        workspace_id: WorkspaceId,
        session: &mut Session,
        prompt: &str,
        opts: ExecutionOptions,
    ) -> ExecutionResult {
        let session_id = session.id;
        let lock = self.lock_for(session_id).await;
        let _guard = lock.lock().await;
        let cancel_flag = self.cancel_flag_for(session_id).await;
        cancel_flag.store(false, Ordering::SeqCst);

        let started = Instant::now();
        match self.run_loop(workspace_id, session, prompt, &opts, &cancel_flag).await {
            Ok(result) => ExecutionResult {
                duration_ms: started.elapsed().as_millis() as u64,
                ..result
            },
            Err(err) => {
                let message = err.to_string();
                ExecutionResult {
                    response: String::new(),
                    artifacts: Vec::new(),
                    tool_uses: Vec::new(),
                    files_modified: Vec::new(),
                    duration_ms: started.elapsed().as_millis() as u64,
                    success: false,
                    error: Some(message),
                    error_kind: Some(err),
                }
            }
        }
    }

    async fn run_loop(
        &self,
        workspace_id: WorkspaceId,
        session: &mut Session,
        prompt: &str,
        opts: &ExecutionOptions,
        cancel_flag: &AtomicBool,
    ) -> ForgeResult<ExecutionResult> {
        let session_id = session.id;
        let context_preamble = self.assemble_context(workspace_id, session_id, opts).await?;
        let full_prompt = format!("{context_preamble}\n\n# Request\n{prompt}");

        let user_msg = Message::user(&full_prompt, session_id);
        session.add_message(user_msg);

        let tool_descriptors: Vec<_> = self.skills.list_descriptors().into_iter().cloned().collect();

        let mut response_text = String::new();
        let mut tool_uses = Vec::new();
        let mut artifacts = Vec::new();
        let mut files_modified = Vec::new();

        for turn in 0..self.max_turns {
            if cancel_flag.load(Ordering::SeqCst) {
                return Err(ForgeError::Validation(format!(
                    "execution for session {session_id} cancelled at turn {turn}"
                )));
            }

            let llm_response =
                self.chat_with_retry(Some(&context_preamble), &session.messages, &tool_descriptors).await?;

            match llm_response {
                LlmResponse::Done(text) => {
                    let assistant_msg = Message::assistant(&text, session_id);
                    session.add_message(assistant_msg);
                    response_text.push_str(&text);

                    return Ok(ExecutionResult {
                        response: response_text,
                        artifacts,
                        tool_uses,
                        files_modified,
                        duration_ms: 0,
                        success: true,
                        error: None,
                        error_kind: None,
                    });
                }

                LlmResponse::Text(text) => {
                    let assistant_msg = Message::assistant(&text, session_id);
                    session.add_message(assistant_msg);
                    response_text.push_str(&text);
                }

                LlmResponse::ToolUse { content, tool_calls } => {
                    if let Some(text) = content {
                        let msg = Message::assistant(&text, session_id);
                        session.add_message(msg);
                        response_text.push_str(&text);
                    }

                    for call in tool_calls {
                        info!(%session_id, tool = %call.name, "C5 executing tool call");
                        self.audit.log_action(
                            session_id,
                            "tool_call",
                            Some(call.name.clone()),
                            serde_json::json!({"call_id": call.id, "arguments": call.arguments}),
                            AuditOutcome::Success,
                        );

                        if let Some((path, content)) = file_write_target(&call) {
                            let reference_key = format!("@code-generator/{path}");
                            self.artifacts
                                .put(
                                    workspace_id,
                                    session_id,
                                    "code-generator",
                                    ArtifactType::Code,
                                    &reference_key,
                                    serde_json::json!({"path": path, "content": content, "operation": "write"}),
                                    opts.phase,
                                )
                                .await?;
                            let artifact = self.artifacts.get(workspace_id, session_id, &reference_key).await?;
                            files_modified.push(path);
                            artifacts.push(artifact);
                        }

                        let result = self.skills.execute(call.clone(), &self.permissions).await;
                        tool_uses.push(call.clone());

                        match result {
                            Ok(tool_result) => {
                                let outcome = if tool_result.is_error {
                                    AuditOutcome::Error
                                } else {
                                    AuditOutcome::Success
                                };
                                self.audit.log_action(
                                    session_id,
                                    "tool_result",
                                    Some(call.name.clone()),
                                    serde_json::json!({"call_id": tool_result.call_id, "is_error": tool_result.is_error}),
                                    outcome,
                                );
                                let ack = serde_json::json!({
                                    "type": "tool_result",
                                    "tool_use_id": tool_result.call_id,
                                    "content": tool_result.content,
                                    "is_error": tool_result.is_error,
                                });
                                session.add_message(Message::new(Role::Tool, ack.to_string(), session_id));
                            }
                            Err(e) => {
                                warn!(%session_id, tool = %call.name, error = %e, "tool call failed");
                                self.audit.log_action(
                                    session_id,
                                    "tool_error",
                                    Some(call.name.clone()),
                                    serde_json::json!({"error": e.to_string()}),
                                    AuditOutcome::Error,
                                );
                                session.add_message(Message::new(
                                    Role::Tool,
                                    format!("tool error: {e}"),
                                    session_id,
                                ));
                            }
                        }
                    }
                }
            }
        }

        Err(ForgeError::Timeout(format!(
            "execution for session {session_id} exceeded {} turns",
            self.max_turns
        )))
    }
}

/// Emits the three-kind streaming classification from §4.5 over a channel,
/// for callers that want incremental updates (the gateway's SSE surface)
/// rather than a single aggregated [`ExecutionResult`].
pub fn classify_stream_event(event: &StreamEvent) -> &'static str {
    match event {
        StreamEvent::TextDelta { .. } => "text",
        StreamEvent::ToolCallStart { .. } | StreamEvent::ToolCallDelta { .. } | StreamEvent::ToolCallEnd { .. } => {
            "tool_use"
        }
        StreamEvent::Done => "tool_result",
        StreamEvent::Error { .. } => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_write_tool_with_path_arg() {
        let call = ToolCall {
            id: "1".into(),
            name: "write_file".into(),
            arguments: serde_json::json!({"path": "src/main.rs", "content": "fn main() {}"}),
        };
        let (path, content) = file_write_target(&call).expect("should detect write tool");
        assert_eq!(path, "src/main.rs");
        assert_eq!(content, "fn main() {}");
    }

    #[test]
    fn ignores_non_write_tools() {
        let call = ToolCall {
            id: "1".into(),
            name: "list_files".into(),
            arguments: serde_json::json!({"dir": "."}),
        };
        assert!(file_write_target(&call).is_none());
    }

    #[test]
    fn classifies_stream_events() {
        assert_eq!(classify_stream_event(&StreamEvent::TextDelta { text: "hi".into() }), "text");
        assert_eq!(
            classify_stream_event(&StreamEvent::ToolCallStart { id: "1".into(), name: "x".into() }),
            "tool_use"
        );
        assert_eq!(classify_stream_event(&StreamEvent::Done), "tool_result");
    }
}
