// Re-export approval types from core for backward compatibility.
pub use forge_core::approval::{
    ApprovalChannel, ApprovalDecision, ApprovalRequest, RiskLevel,
};

use forge_core::{ForgeResult, ToolCall, ToolResult};
use forge_skills::skill::{Skill, SkillDescriptor};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Auto-approve channel for testing and non-interactive environments.
/// Always approves with a system reviewer tag.
pub struct AutoApproveChannel;

#[async_trait]
impl ApprovalChannel for AutoApproveChannel {
    async fn request_approval(&self, request: ApprovalRequest) -> ForgeResult<ApprovalDecision> {
        info!(
            task_id = %request.task_id,
            risk = ?request.risk_level,
            "Auto-approving (no human reviewer configured)"
        );
        Ok(ApprovalDecision {
            approved: true,
            reason: Some("Auto-approved (no human reviewer configured)".into()),
            reviewer: "system".into(),
        })
    }
}

/// Callback-based approval channel. Delegates to a user-provided async function.
pub struct CallbackApprovalChannel<F>
where
    F: Fn(ApprovalRequest) -> std::pin::Pin<Box<dyn std::future::Future<Output = ForgeResult<ApprovalDecision>> + Send>>
        + Send
        + Sync,
{
    callback: F,
}

impl<F> CallbackApprovalChannel<F>
where
    F: Fn(ApprovalRequest) -> std::pin::Pin<Box<dyn std::future::Future<Output = ForgeResult<ApprovalDecision>> + Send>>
        + Send
        + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl<F> ApprovalChannel for CallbackApprovalChannel<F>
where
    F: Fn(ApprovalRequest) -> std::pin::Pin<Box<dyn std::future::Future<Output = ForgeResult<ApprovalDecision>> + Send>>
        + Send
        + Sync,
{
    async fn request_approval(&self, request: ApprovalRequest) -> ForgeResult<ApprovalDecision> {
        (self.callback)(request).await
    }
}

/// HITL (Human-in-the-Loop) approval skill.
/// Agents call this when they need human sign-off on a high-risk operation.
/// The skill blocks until the configured ApprovalChannel returns a decision.
pub struct HumanApprovalSkill {
    descriptor: SkillDescriptor,
    channel: Arc<dyn ApprovalChannel>,
}

impl HumanApprovalSkill {
    pub fn new(channel: Arc<dyn ApprovalChannel>) -> Self {
        Self {
            descriptor: SkillDescriptor {
                name: "human_approval".to_string(),
                description: "Request human approval for a high-risk operation. \
                    The agent should provide a task_id, description of what needs approval, \
                    risk_level (low/medium/high/critical), and relevant context."
                    .to_string(),
                parameters_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "task_id": {
                            "type": "string",
                            "description": "Identifier of the task requiring approval"
                        },
                        "description": {
                            "type": "string",
                            "description": "What action needs human approval and why"
                        },
                        "risk_level": {
                            "type": "string",
                            "enum": ["low", "medium", "high", "critical"],
                            "description": "Risk level of the operation"
                        },
                        "context": {
                            "type": "string",
                            "description": "Additional context (code snippets, security concerns, etc.)"
                        }
                    },
                    "required": ["task_id", "description", "risk_level"]
                }),
                required_capabilities: vec![],
            },
            channel,
        }
    }

    /// Create with auto-approve channel (for testing).
    pub fn auto_approve() -> Self {
        Self::new(Arc::new(AutoApproveChannel))
    }
}

#[async_trait]
impl Skill for HumanApprovalSkill {
    fn descriptor(&self) -> &SkillDescriptor {
        &self.descriptor
    }

    async fn execute(&self, call: ToolCall) -> ForgeResult<ToolResult> {
        let task_id = call.arguments["task_id"]
            .as_str()
            .unwrap_or("unknown")
            .to_string();
        let description = call.arguments["description"]
            .as_str()
            .unwrap_or("")
            .to_string();
        let risk_level = RiskLevel::parse_level(
            call.arguments["risk_level"].as_str().unwrap_or("medium"),
        );
        let context = call.arguments["context"]
            .as_str()
            .unwrap_or("")
            .to_string();

        if description.is_empty() {
            return Ok(ToolResult::error(
                &call.id,
                "Description is required for approval requests",
            ));
        }

        info!(
            task_id = %task_id,
            risk = ?risk_level,
            "Human approval requested"
        );

        let request = ApprovalRequest {
            task_id: task_id.clone(),
            description,
            risk_level,
            context,
        };

        match self.channel.request_approval(request).await {
            Ok(decision) => {
                let response = serde_json::json!({
                    "task_id": task_id,
                    "approved": decision.approved,
                    "reason": decision.reason,
                    "reviewer": decision.reviewer,
                });

                if decision.approved {
                    info!(task_id = %task_id, reviewer = %decision.reviewer, "Approved");
                    Ok(ToolResult::success(&call.id, response.to_string()))
                } else {
                    info!(task_id = %task_id, reviewer = %decision.reviewer, "Rejected");
                    Ok(ToolResult::success(&call.id, response.to_string()))
                }
            }
            Err(e) => Ok(ToolResult::error(
                &call.id,
                format!("Approval channel error: {e}"),
            )),
        }
    }
}
