//! Phased workflow engine: C6 subagent registry, C7 parallel processor,
//! C8 workflow manager, C9 dev iteration manager, C10 context synchronizer.
//!
//! Routes a user turn through the current workflow phase to the right
//! phase-bound subagent, optionally fans it out across a bounded-concurrency
//! batch, and feeds code-producing output through the compliance/iteration
//! loop before syncing context into the sandbox.
//!
//! # Main types
//!
//! - [`SubagentRegistry`] — Static, phase-bound catalog of specialized agent roles (C6).
//! - [`ParallelProcessor`] — Dependency-wave bounded-concurrency task execution (C7).
//! - [`WorkflowManager`] — Seven-phase workflow state machine (C8).
//! - [`DevIterationManager`] — Quality-gate loop over generated files (C9).
//! - [`ContextSynchronizer`] — Projects session artifacts into/out of a sandbox (C10).

/// Projection of session artifacts into (and back from) a sandbox's
/// `.pria/` file layout.
pub mod context_sync;
/// Phase-4 quality-gate loop over generated files.
pub mod iteration;
/// Dependency-wave bounded-concurrency task execution.
pub mod parallel;
/// Static catalog of named subagents bound to phases.
pub mod registry;
/// Seven-phase workflow state machine (C8).
pub mod workflow;

pub use context_sync::ContextSynchronizer;
pub use iteration::{DevIterationManager, Iteration, IterationDecision, QualityGates};
pub use parallel::{
    BatchResult, ParallelBatch, ParallelProcessor, ParallelTask, ProgressEvent, TaskDependency,
    TaskOutcome,
};
pub use registry::{SubagentDescriptor, SubagentName, SubagentRegistry};
pub use workflow::{
    PhaseTransition, TransitionReason, WorkflowManager, WorkflowPhase, WorkflowState,
    WorkflowTurnResult,
};
