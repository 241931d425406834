use forge_agent::ModelConfig;
use forge_artifacts::ArtifactType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a subagent role. Distinct from [`forge_agent::ModelConfig`]
/// (which a descriptor carries one of) — this is the catalog key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubagentName {
    RequirementsAnalyst,
    SystemArchitect,
    ProjectPlanner,
    CodeGenerator,
    ComponentResearcher,
    IntegrationExpert,
    QaEngineer,
    SecurityAuditor,
}

impl fmt::Display for SubagentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubagentName::RequirementsAnalyst => "requirements-analyst",
            SubagentName::SystemArchitect => "system-architect",
            SubagentName::ProjectPlanner => "project-planner",
            SubagentName::CodeGenerator => "code-generator",
            SubagentName::ComponentResearcher => "component-researcher",
            SubagentName::IntegrationExpert => "integration-expert",
            SubagentName::QaEngineer => "qa-engineer",
            SubagentName::SecurityAuditor => "security-auditor",
        };
        write!(f, "{s}")
    }
}

/// Static catalog entry binding a phase to a role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubagentDescriptor {
    pub name: SubagentName,
    pub phase: u8,
    pub model: ModelConfig,
    pub system_prompt: String,
    /// Artifact kinds this subagent is expected to produce.
    pub produces: Vec<ArtifactType>,
    /// Tool capability names this subagent may invoke (maps to skill names
    /// in `forge-skills`'s registry).
    pub tools: Vec<String>,
    pub max_turns: u32,
}

/// Immutable catalog of subagent descriptors, loaded once at startup.
///
/// Per the concurrency model, this is the one piece of global state that
/// carries no interior mutability — lookups never block.
pub struct SubagentRegistry {
    descriptors: Vec<SubagentDescriptor>,
}

impl SubagentRegistry {
    /// Build the registry with the built-in descriptor set, using `base` as
    /// the template model config for every subagent (temperature/turns
    /// adjusted per role, same pattern as the legacy per-role profiles).
    pub fn with_defaults(base: &ModelConfig) -> Self {
        Self {
            descriptors: default_descriptors(base),
        }
    }

    /// Build a registry from a caller-supplied descriptor set (tests, or an
    /// operator overriding prompts/tool access via config).
    pub fn new(descriptors: Vec<SubagentDescriptor>) -> Self {
        Self { descriptors }
    }

    pub fn by_name(&self, name: SubagentName) -> Option<&SubagentDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// All subagents bound to a given phase, in catalog order (the order
    /// C8 should consider them when phase 4 needs more than one agent).
    pub fn by_phase(&self, phase: u8) -> Vec<&SubagentDescriptor> {
        self.descriptors.iter().filter(|d| d.phase == phase).collect()
    }

    /// Tool capability names declared for a subagent, or an empty slice if
    /// the name isn't registered.
    pub fn tools_for(&self, name: SubagentName) -> &[String] {
        self.by_name(name).map(|d| d.tools.as_slice()).unwrap_or(&[])
    }

    pub fn all(&self) -> &[SubagentDescriptor] {
        &self.descriptors
    }
}

fn descriptor(
    name: SubagentName,
    phase: u8,
    base: &ModelConfig,
    temperature: f32,
    max_turns: u32,
    system_prompt: &str,
    produces: &[ArtifactType],
    tools: &[&str],
) -> SubagentDescriptor {
    let mut model = base.clone();
    model.temperature = temperature;
    model.max_turns = max_turns;
    SubagentDescriptor {
        name,
        phase,
        model,
        system_prompt: system_prompt.to_string(),
        produces: produces.to_vec(),
        tools: tools.iter().map(|s| s.to_string()).collect(),
        max_turns,
    }
}

fn default_descriptors(base: &ModelConfig) -> Vec<SubagentDescriptor> {
    vec![
        descriptor(
            SubagentName::RequirementsAnalyst,
            1,
            base,
            0.4,
            15,
            REQUIREMENTS_PROMPT,
            &[ArtifactType::Requirement],
            &["memory_search", "artifact_store"],
        ),
        descriptor(
            SubagentName::SystemArchitect,
            2,
            base,
            0.3,
            20,
            ARCHITECT_PROMPT,
            &[ArtifactType::Architecture],
            &["memory_search", "artifact_store", "http_fetch"],
        ),
        descriptor(
            SubagentName::ProjectPlanner,
            3,
            base,
            0.3,
            15,
            PLANNER_PROMPT,
            &[ArtifactType::Plan, ArtifactType::Task],
            &["memory_search", "artifact_store"],
        ),
        descriptor(
            SubagentName::CodeGenerator,
            4,
            base,
            0.2,
            30,
            CODE_GENERATOR_PROMPT,
            &[ArtifactType::Code],
            &["file_read", "file_write", "shell", "artifact_store"],
        ),
        descriptor(
            SubagentName::ComponentResearcher,
            4,
            base,
            0.3,
            10,
            COMPONENT_RESEARCHER_PROMPT,
            &[ArtifactType::Code],
            &["file_read", "http_fetch", "memory_search"],
        ),
        descriptor(
            SubagentName::IntegrationExpert,
            4,
            base,
            0.2,
            15,
            INTEGRATION_EXPERT_PROMPT,
            &[ArtifactType::Code],
            &["file_read", "file_write", "shell"],
        ),
        descriptor(
            SubagentName::QaEngineer,
            5,
            base,
            0.2,
            20,
            QA_ENGINEER_PROMPT,
            &[ArtifactType::Test],
            &["file_read", "file_write", "shell", "artifact_store"],
        ),
        descriptor(
            SubagentName::SecurityAuditor,
            6,
            base,
            0.3,
            10,
            SECURITY_AUDITOR_PROMPT,
            &[ArtifactType::Review, ArtifactType::Compliance],
            &["file_read", "artifact_store", "human_approval"],
        ),
    ]
}

const REQUIREMENTS_PROMPT: &str = "\
You are the requirements-analyst subagent. Turn a natural-language product \
idea into a structured requirements artifact: user stories, constraints, \
and acceptance criteria. Reference prior artifacts with @agent/name when \
refining instead of restating them.";

const ARCHITECT_PROMPT: &str = "\
You are the system-architect subagent. Given the requirements artifact, \
produce an architecture artifact: component boundaries, API surface, and \
database schema. Every entity you design must be scoped by workspace_id.";

const PLANNER_PROMPT: &str = "\
You are the project-planner subagent. Break the architecture into an \
ordered task list with explicit dependencies and milestones suitable for \
parallel execution.";

const CODE_GENERATOR_PROMPT: &str = "\
You are the code-generator subagent. Implement one task at a time using \
the file-write tool. Every handler must check tenant identity and \
workspace membership before touching data.";

const COMPONENT_RESEARCHER_PROMPT: &str = "\
You are the component-researcher subagent, invoked by code-generator for \
narrow investigative sub-questions (library choice, existing pattern \
lookup). You do not write files.";

const INTEGRATION_EXPERT_PROMPT: &str = "\
You are the integration-expert subagent, invoked by code-generator to wire \
cross-component integration points (routing, dependency injection, shared \
config) that a single task's author may not see in isolation.";

const QA_ENGINEER_PROMPT: &str = "\
You are the qa-engineer subagent. Write test suites for the generated code \
and report coverage. Prefer integration tests over mocked unit tests for \
tenant-isolation boundaries.";

const SECURITY_AUDITOR_PROMPT: &str = "\
You are the security-auditor subagent. Review the generated code and test \
suite for compliance issues and produce a review artifact. Flag anything \
that should block completion.";
