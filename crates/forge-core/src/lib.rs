//! Core types and error definitions for the Forge framework.
//!
//! This crate provides the foundational types shared across all Forge crates,
//! including error handling, message representations, and tool call abstractions.
//!
//! # Main types
//!
//! - [`ForgeError`] — Unified error enum for all Forge subsystems.
//! - [`ForgeResult`] — Convenience alias for `Result<T, ForgeError>`.
//! - [`Role`] — Message role (user, assistant, system, tool).
//! - [`Message`] — A single message within a conversation session.
//! - [`ToolCall`] — Represents an LLM-initiated tool invocation request.
//! - [`ToolResult`] — The result returned after executing a tool call.

/// Approval types for human-in-the-loop workflows.
pub mod approval;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// --- Error types ---

/// Top-level error type for the Forge framework.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    /// An error originating from the agent execution loop.
    #[error("Agent error: {0}")]
    Agent(String),

    /// An error from an outbound HTTP request (e.g. LLM API call).
    #[error("HTTP error: {0}")]
    Http(String),

    /// An error related to session persistence or lookup.
    #[error("Session error: {0}")]
    Session(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error raised by a skill during invocation.
    #[error("Skill error: {0}")]
    Skill(String),

    /// An error from a communication channel (e.g. WebSocket, CLI).
    #[error("Channel error: {0}")]
    Channel(String),

    /// An error from the API gateway layer.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// A security-related error (permissions, TLS, rate limiting).
    #[error("Security error: {0}")]
    Security(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from the multi-agent orchestrator.
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// Missing or invalid user or internal service-to-service token.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Caller authenticated but lacks access to the requested workspace.
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// Malformed input: bad id shape, oversized content, forbidden command.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Session/artifact/sandbox unknown within the caller's tenant scope.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Concurrent state transition conflict (e.g. batch already running).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A parallel task dependency graph contains a cycle.
    #[error("Dependency cycle: {0}")]
    DependencyCycle(String),

    /// An LLM or sandbox operation exceeded its time budget.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Error raised by the LLM Executor (C5).
    #[error("LLM error ({kind:?}): {message}")]
    Llm {
        /// Which subkind of LLM failure this is.
        kind: LlmErrorKind,
        /// Human-readable detail.
        message: String,
    },

    /// Error raised by the Sandbox Manager (C3).
    #[error("Sandbox error ({kind:?}): {message}")]
    Sandbox {
        /// Which subkind of sandbox failure this is.
        kind: SandboxErrorKind,
        /// Human-readable detail.
        message: String,
    },

    /// Phase-4 development iteration blocked by critical compliance issues.
    /// Never propagated as a hard failure; carried as feedback into C9.
    #[error("Compliance block: {0}")]
    ComplianceBlock(String),

    /// A rate-limit token bucket was exhausted.
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Catch-all for conditions that don't fit the taxonomy above.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Subkinds of [`ForgeError::Llm`], mirroring the shape of the underlying
/// transport failure rather than its transport-specific type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmErrorKind {
    /// Invalid or missing LLM API credential.
    Auth,
    /// Network-level failure reaching the LLM transport.
    Network,
    /// Any other SDK/transport-level failure.
    Sdk,
}

/// Subkinds of [`ForgeError::Sandbox`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxErrorKind {
    /// Provisioning a new sandbox failed.
    Create,
    /// A command executed inside the sandbox failed.
    Command,
    /// The sandbox provider reports the sandbox as terminated.
    Terminated,
    /// The sandbox stopped responding to health checks.
    Unresponsive,
}

impl ForgeError {
    /// The stable error kind name surfaced in the HTTP error envelope (§7).
    pub fn kind_name(&self) -> &'static str {
        match self {
            ForgeError::Authentication(_) => "AuthenticationError",
            ForgeError::Authorization(_) => "AuthorizationError",
            ForgeError::Validation(_) => "ValidationError",
            ForgeError::NotFound(_) => "NotFoundError",
            ForgeError::Conflict(_) => "ConflictError",
            ForgeError::DependencyCycle(_) => "DependencyCycleError",
            ForgeError::Timeout(_) => "TimeoutError",
            ForgeError::Llm { .. } => "LLMError",
            ForgeError::Sandbox { .. } => "SandboxError",
            ForgeError::ComplianceBlock(_) => "ComplianceBlockError",
            ForgeError::RateLimit(_) => "RateLimitError",
            ForgeError::Agent(_)
            | ForgeError::Http(_)
            | ForgeError::Session(_)
            | ForgeError::Config(_)
            | ForgeError::Skill(_)
            | ForgeError::Channel(_)
            | ForgeError::Gateway(_)
            | ForgeError::Security(_)
            | ForgeError::Json(_)
            | ForgeError::Io(_)
            | ForgeError::Orchestrator(_)
            | ForgeError::Internal(_) => "InternalError",
        }
    }

    /// Whether the propagation policy (§7) allows retrying this error.
    /// Tenant/auth/validation errors are never retried; transient
    /// LLM/network/timeout errors are retryable up to the caller's budget.
    pub fn retryable(&self) -> bool {
        match self {
            ForgeError::Timeout(_) => true,
            ForgeError::Llm { kind, .. } => matches!(kind, LlmErrorKind::Network | LlmErrorKind::Sdk),
            ForgeError::Sandbox { kind, .. } => {
                matches!(kind, SandboxErrorKind::Command | SandboxErrorKind::Unresponsive)
            }
            ForgeError::RateLimit(_) => true,
            _ => false,
        }
    }
}

/// A convenience `Result` alias using [`ForgeError`].
pub type ForgeResult<T> = Result<T, ForgeError>;

/// The opaque tenant key every entity is scoped by. A thin alias over `Uuid`
/// rather than a bare `Uuid` so call sites can't accidentally pass a
/// `session_id` where a `workspace_id` is expected.
pub type WorkspaceId = Uuid;

// --- Message types ---

/// The role of the participant that authored a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human end-user.
    User,
    /// The AI assistant.
    Assistant,
    /// A system-level instruction or prompt.
    System,
    /// Output produced by a tool invocation.
    Tool,
}

/// A single message exchanged within a conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for this message.
    pub id: Uuid,
    /// The role of the message author.
    pub role: Role,
    /// The textual content of the message.
    pub content: String,
    /// The session this message belongs to.
    pub session_id: Uuid,
    /// UTC timestamp of when the message was created.
    pub timestamp: DateTime<Utc>,
    /// Arbitrary key-value metadata attached to the message.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Message {
    /// Creates a new message with the given role, content, and session ID.
    pub fn new(role: Role, content: impl Into<String>, session_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            session_id,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Creates a new message with [`Role::User`].
    pub fn user(content: impl Into<String>, session_id: Uuid) -> Self {
        Self::new(Role::User, content, session_id)
    }

    /// Creates a new message with [`Role::Assistant`].
    pub fn assistant(content: impl Into<String>, session_id: Uuid) -> Self {
        Self::new(Role::Assistant, content, session_id)
    }

    /// Creates a new message with [`Role::System`].
    pub fn system(content: impl Into<String>, session_id: Uuid) -> Self {
        Self::new(Role::System, content, session_id)
    }
}

// --- Tool types ---

/// A request from the LLM to invoke a specific tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier assigned by the LLM for this tool call.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON arguments to pass to the tool.
    pub arguments: serde_json::Value,
}

/// The result returned after executing a [`ToolCall`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The ID of the [`ToolCall`] this result corresponds to.
    pub call_id: String,
    /// The textual output produced by the tool.
    pub content: String,
    /// Whether the tool execution ended in an error.
    pub is_error: bool,
}

impl ToolResult {
    /// Creates a successful tool result.
    pub fn success(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Creates an error tool result.
    pub fn error(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}
