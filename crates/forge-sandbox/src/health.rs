use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::manager::SandboxManager;
use crate::types::SandboxStatus;

/// Consecutive ping failures before `ready`/`degraded` drops to `unhealthy`.
/// A single failure already moves `ready` to `degraded`; this threshold is
/// the next rung.
pub const UNHEALTHY_THRESHOLD: u32 = 3;
/// Consecutive ping failures before `unhealthy` drops to `unresponsive`. On
/// a fixed 30s poll cadence this many misses corresponds to no heartbeat
/// for several poll intervals, at which point recovery is triggered
/// automatically.
pub const UNRESPONSIVE_THRESHOLD: u32 = 6;
/// Default interval between poll sweeps.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Periodically pings every live sandbox and walks its status through the
/// degraded/unhealthy/unresponsive ladder. Runs as a background task; does
/// not own recovery itself, it only classifies state and leaves the
/// decision of what to do about `unresponsive` to the caller (normally
/// [`crate::recovery::RecoveryCoordinator`]).
pub struct HealthPoller {
    manager: Arc<SandboxManager>,
    interval: Duration,
}

impl HealthPoller {
    pub fn new(manager: Arc<SandboxManager>) -> Self {
        Self {
            manager,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Runs one sweep over every sandbox across all workspaces, returning
    /// the sessions that just crossed into `unresponsive` this sweep (the
    /// caller decides whether to recover them).
    pub async fn sweep(&self) -> Vec<uuid::Uuid> {
        let provider = self.manager.provider();
        let mut newly_unresponsive = Vec::new();

        for (_workspace_id, session_id, env) in self.manager.snapshot_all().await {
            if env.status == SandboxStatus::Terminated {
                continue;
            }

            match provider.ping(&env.id).await {
                Ok(()) => {
                    self.manager.record_ping_success(session_id).await;
                }
                Err(err) => {
                    let failures = self.manager.record_ping_failure(session_id).await;
                    warn!(%session_id, failures, error = %err, "sandbox health check failed");

                    if failures == UNRESPONSIVE_THRESHOLD {
                        newly_unresponsive.push(session_id);
                    }
                }
            }
        }
        newly_unresponsive
    }

    /// Runs [`Self::sweep`] on a fixed interval until the returned handle is
    /// dropped or aborted.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                let unresponsive = self.sweep().await;
                if !unresponsive.is_empty() {
                    info!(count = unresponsive.len(), "sandboxes crossed into unresponsive");
                }
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::provider::InMemorySandboxProvider;
    use uuid::Uuid;

    struct FailingProvider {
        inner: InMemorySandboxProvider,
    }

    #[async_trait::async_trait]
    impl crate::provider::SandboxProvider for FailingProvider {
        async fn provision(
            &self,
            template_id: &str,
            env_vars: &std::collections::HashMap<String, String>,
        ) -> forge_core::ForgeResult<String> {
            self.inner.provision(template_id, env_vars).await
        }

        async fn ping(&self, _external_id: &str) -> forge_core::ForgeResult<()> {
            Err(forge_core::ForgeError::Sandbox {
                kind: forge_core::SandboxErrorKind::Unresponsive,
                message: "simulated".into(),
            })
        }

        async fn execute(
            &self,
            external_id: &str,
            command: &str,
            opts: &crate::types::ExecOptions,
        ) -> forge_core::ForgeResult<crate::types::ExecResult> {
            self.inner.execute(external_id, command, opts).await
        }

        async fn write_file(&self, external_id: &str, path: &str, content: &str) -> forge_core::ForgeResult<()> {
            self.inner.write_file(external_id, path, content).await
        }

        async fn read_file(&self, external_id: &str, path: &str) -> forge_core::ForgeResult<String> {
            self.inner.read_file(external_id, path).await
        }

        async fn list(&self, external_id: &str, dir: &str) -> forge_core::ForgeResult<Vec<String>> {
            self.inner.list(external_id, dir).await
        }

        async fn preview_url(&self, external_id: &str, port: u16) -> forge_core::ForgeResult<String> {
            self.inner.preview_url(external_id, port).await
        }

        async fn terminate(&self, external_id: &str) -> forge_core::ForgeResult<()> {
            self.inner.terminate(external_id).await
        }
    }

    #[tokio::test]
    async fn repeated_ping_failures_escalate_to_unresponsive() {
        let provider = Arc::new(FailingProvider {
            inner: InMemorySandboxProvider::new(),
        });
        let manager = Arc::new(SandboxManager::new(provider, "node-20"));
        let ws = Uuid::new_v4();
        let session = Uuid::new_v4();
        manager.create(ws, session, None).await.unwrap();

        let poller = HealthPoller::new(Arc::clone(&manager));
        let mut last_unresponsive = Vec::new();
        for _ in 0..UNRESPONSIVE_THRESHOLD {
            last_unresponsive = poller.sweep().await;
        }
        assert_eq!(last_unresponsive, vec![session]);

        let env = manager.get(ws, session).await.unwrap().unwrap();
        assert_eq!(env.status, SandboxStatus::Unresponsive);
    }

    #[tokio::test]
    async fn successful_ping_recovers_degraded_sandbox() {
        let provider = Arc::new(InMemorySandboxProvider::new());
        let manager = Arc::new(SandboxManager::new(provider, "node-20"));
        let ws = Uuid::new_v4();
        let session = Uuid::new_v4();
        manager.create(ws, session, None).await.unwrap();
        manager.record_ping_failure(session).await;

        let poller = HealthPoller::new(Arc::clone(&manager));
        poller.sweep().await;

        let env = manager.get(ws, session).await.unwrap().unwrap();
        assert_eq!(env.status, SandboxStatus::Ready);
        assert_eq!(env.consecutive_failures, 0);
    }
}

