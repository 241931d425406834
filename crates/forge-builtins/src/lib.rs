//! Built-in skills for the Forge framework.
//!
//! Provides ready-to-use skills covering shell execution, file I/O, HTTP/web
//! fetching, and human-in-the-loop approval — the tool capabilities the C6
//! subagent catalog binds to its phase-bound roles.
//!
//! # Main entry points
//!
//! - [`register_builtins()`] — Register the standard set of built-in skills.
//! - [`register_builtins_with_approval()`] — Register builtins with a custom approval channel.

/// Simple browser skill (URL fetching).
pub mod browser;
/// File read skill.
pub mod file_read;
/// File write skill.
pub mod file_write;
/// HTTP fetch skill.
pub mod http_fetch;
/// Human-in-the-loop approval skill and channels.
pub mod human_approval;
/// Shell command execution skill.
pub mod shell;
/// Stdin-based interactive approval channel.
pub mod stdin_approval;

pub use browser::BrowserSkill;
pub use file_read::FileReadSkill;
pub use file_write::FileWriteSkill;
pub use http_fetch::HttpFetchSkill;
pub use human_approval::{
    ApprovalChannel, ApprovalDecision, ApprovalRequest, AutoApproveChannel,
    CallbackApprovalChannel, HumanApprovalSkill, RiskLevel,
};
pub use shell::ShellSkill;
pub use stdin_approval::StdinApprovalChannel;

use forge_skills::SkillRegistry;
use std::sync::Arc;

/// Register the standard set of built-in skills into the given registry.
pub fn register_builtins(registry: &mut SkillRegistry) {
    registry.register(Arc::new(ShellSkill::new()));
    registry.register(Arc::new(FileReadSkill::new()));
    registry.register(Arc::new(FileWriteSkill::new()));
    registry.register(Arc::new(HttpFetchSkill::new()));
    registry.register(Arc::new(BrowserSkill::new()));
    registry.register(Arc::new(HumanApprovalSkill::auto_approve()));
}

/// Register built-in skills with a custom approval channel for HITL.
pub fn register_builtins_with_approval(
    registry: &mut SkillRegistry,
    approval_channel: Arc<dyn ApprovalChannel>,
) {
    registry.register(Arc::new(ShellSkill::new()));
    registry.register(Arc::new(FileReadSkill::new()));
    registry.register(Arc::new(FileWriteSkill::new()));
    registry.register(Arc::new(HttpFetchSkill::new()));
    registry.register(Arc::new(BrowserSkill::new()));
    registry.register(Arc::new(HumanApprovalSkill::new(approval_channel)));
}
