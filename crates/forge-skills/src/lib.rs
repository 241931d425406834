//! Skill system: the tool-call capabilities agents may invoke.
//!
//! A skill is a single named, capability-gated tool (shell exec, file I/O,
//! HTTP fetch, ...). The set of skills an agent may call is fixed at
//! startup by [`crate::registry::SkillRegistry`] registration — there is no
//! third-party plugin host or dynamically loaded skill format.
//!
//! # Main types
//!
//! - [`Skill`] — Trait that every executable skill implements.
//! - [`SkillDescriptor`] — Metadata describing a skill's name, parameters, and capabilities.
//! - [`SkillRegistry`] — Central registry for discovering and invoking skills.

/// Central skill registry and tool groups.
pub mod registry;
/// Core skill trait and descriptor.
pub mod skill;

pub use registry::{SkillRegistry, ToolGroup};
pub use skill::{Skill, SkillDescriptor};
