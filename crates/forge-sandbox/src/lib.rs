//! Sandbox provisioning, command execution, and health/recovery for
//! per-session remote execution environments (C3 Sandbox Manager, C4
//! Health & Recovery).

mod health;
mod manager;
mod provider;
mod recovery;
mod types;
mod validate;

pub use health::{HealthPoller, DEFAULT_POLL_INTERVAL, UNHEALTHY_THRESHOLD, UNRESPONSIVE_THRESHOLD};
pub use manager::SandboxManager;
pub use provider::{InMemorySandboxProvider, SandboxProvider};
#[cfg(feature = "docker")]
pub use provider::docker::DockerSandboxProvider;
pub use recovery::RecoveryCoordinator;
pub use types::{ExecOptions, ExecResult, FailureSpec, RecoveryStrategy, SandboxEnv, SandboxStatus};
pub use validate::{sandbox_error, validate_command, validate_path};
