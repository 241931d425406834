use crate::skill::{Skill, SkillDescriptor};
use forge_core::{ForgeError, ForgeResult, ToolCall, ToolResult};
use forge_security::PermissionSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// A named group of skills for progressive tool disclosure.
///
/// Tool groups allow exposing different sets of skills depending on context:
/// - `minimal`: basic utilities only (echo, time, help)
/// - `coding`: file operations, shell, memory
/// - `web`: HTTP fetch, browser
/// - `messaging`: Slack, Discord, Telegram
/// - `full`: all registered skills
/// - Custom groups defined in forge.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolGroup {
    pub name: String,
    pub description: String,
    pub skills: Vec<String>,
}

impl ToolGroup {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        skills: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            skills,
        }
    }
}

/// Default tool groups that ship with Forge.
pub fn default_tool_groups() -> Vec<ToolGroup> {
    vec![
        ToolGroup::new(
            "minimal",
            "Basic utilities — safe for any context",
            vec!["echo".into(), "time".into(), "help".into()],
        ),
        ToolGroup::new(
            "coding",
            "File operations, shell, and memory for development tasks",
            vec![
                "file_read".into(),
                "file_write".into(),
                "shell".into(),
                "memory_store".into(),
                "memory_search".into(),
            ],
        ),
        ToolGroup::new(
            "web",
            "HTTP and browser access for web tasks",
            vec!["http_fetch".into(), "browser".into()],
        ),
        ToolGroup::new(
            "orchestration",
            "Skills for the orchestrator agent — delegation, approval, artifacts",
            vec![
                "agent_delegate".into(),
                "task_status".into(),
                "human_approval".into(),
                "artifact_store".into(),
                "memory_search".into(),
            ],
        ),
        ToolGroup::new(
            "full",
            "All registered skills — use with caution",
            vec![], // Empty = all skills
        ),
    ]
}

/// Central registry for all available skills.
pub struct SkillRegistry {
    skills: HashMap<String, Arc<dyn Skill>>,
    groups: HashMap<String, ToolGroup>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        let groups: HashMap<String, ToolGroup> = default_tool_groups()
            .into_iter()
            .map(|g| (g.name.clone(), g))
            .collect();

        Self {
            skills: HashMap::new(),
            groups,
        }
    }

    pub fn register(&mut self, skill: Arc<dyn Skill>) {
        let name = skill.descriptor().name.clone();
        info!(skill = %name, "Registered skill");
        self.skills.insert(name, skill);
    }

    /// Register a custom tool group.
    pub fn register_group(&mut self, group: ToolGroup) {
        info!(group = %group.name, skills = group.skills.len(), "Registered tool group");
        self.groups.insert(group.name.clone(), group);
    }

    /// Register multiple custom tool groups.
    pub fn register_groups(&mut self, groups: Vec<ToolGroup>) {
        for group in groups {
            self.register_group(group);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Skill>> {
        self.skills.get(name)
    }

    pub fn list_descriptors(&self) -> Vec<&SkillDescriptor> {
        self.skills.values().map(|s| s.descriptor()).collect()
    }

    /// List all registered tool groups.
    pub fn list_groups(&self) -> Vec<&ToolGroup> {
        self.groups.values().collect()
    }

    /// Get a tool group by name.
    pub fn get_group(&self, name: &str) -> Option<&ToolGroup> {
        self.groups.get(name)
    }

    /// Execute a tool call, checking permissions first.
    pub async fn execute(
        &self,
        call: ToolCall,
        permissions: &PermissionSet,
    ) -> ForgeResult<ToolResult> {
        let skill = self
            .skills
            .get(&call.name)
            .ok_or_else(|| ForgeError::Skill(format!("Unknown skill: {}", call.name)))?;

        // Check required capabilities
        for cap in &skill.descriptor().required_capabilities {
            if !permissions.has(cap) {
                warn!(
                    skill = %call.name,
                    capability = ?cap,
                    "Permission denied for skill execution"
                );
                return Ok(ToolResult::error(
                    &call.id,
                    format!(
                        "Permission denied: skill '{}' requires capability {:?}",
                        call.name, cap
                    ),
                ));
            }
        }

        skill.execute(call).await
    }

    /// Return only skills whose names appear in the given list.
    /// Used for progressive tool disclosure in multi-agent orchestration.
    pub fn filter_by_names(&self, names: &[String]) -> Vec<&SkillDescriptor> {
        let allowed: std::collections::HashSet<&str> = names.iter().map(std::string::String::as_str).collect();
        self.skills
            .values()
            .filter(|s| allowed.contains(s.descriptor().name.as_str()))
            .map(|s| s.descriptor())
            .collect()
    }

    /// Create a new registry containing only skills whose names appear in the given list.
    /// Used for progressive tool disclosure — each worker agent gets only the skills it needs.
    pub fn filter_to_new(&self, names: &[String]) -> Self {
        let allowed: std::collections::HashSet<&str> = names.iter().map(std::string::String::as_str).collect();
        let skills = self
            .skills
            .iter()
            .filter(|(name, _)| allowed.contains(name.as_str()))
            .map(|(name, skill)| (name.clone(), skill.clone()))
            .collect();
        Self {
            skills,
            groups: self.groups.clone(),
        }
    }

    /// Create a new registry containing only skills in the specified tool group.
    /// If the group has an empty skills list (like "full"), returns all skills.
    pub fn filter_by_group(&self, group_name: &str) -> ForgeResult<Self> {
        let group = self
            .groups
            .get(group_name)
            .ok_or_else(|| ForgeError::Config(format!("Unknown tool group: {group_name}")))?;

        if group.skills.is_empty() {
            // "full" group — return everything
            return Ok(Self {
                skills: self.skills.clone(),
                groups: self.groups.clone(),
            });
        }

        let skills = self.filter_to_new(&group.skills);
        Ok(skills)
    }

    /// Get skill names that belong to a specific group.
    pub fn skills_in_group(&self, group_name: &str) -> Vec<String> {
        match self.groups.get(group_name) {
            Some(group) if group.skills.is_empty() => {
                // "full" = all skills
                self.skills.keys().cloned().collect()
            }
            Some(group) => {
                // Return only skills that exist in both the group definition and registry
                group
                    .skills
                    .iter()
                    .filter(|name| self.skills.contains_key(name.as_str()))
                    .cloned()
                    .collect()
            }
            None => vec![],
        }
    }

    pub fn skill_count(&self) -> usize {
        self.skills.len()
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}
