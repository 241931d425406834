use chrono::{DateTime, Duration as ChronoDuration, Utc};
use forge_core::{ForgeError, ForgeResult, WorkspaceId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::manager::SandboxManager;
use crate::types::{FailureSpec, RecoveryStrategy, SandboxStatus};

/// At most 3 recovery attempts per sandbox per rolling hour; past that the
/// sandbox is left `unresponsive` for manual intervention rather than
/// hammered with further restarts.
const MAX_ATTEMPTS_PER_HOUR: u32 = 3;
/// Upper bound on concurrently in-flight recoveries during
/// [`RecoveryCoordinator::force_recovery_all`].
const MAX_CONCURRENT_RECOVERIES: usize = 4;

/// Maps a failure condition to its recovery strategy, in priority order:
/// cheapest/most context-preserving first. `S1 restart` is tried before
/// `S2 recreate`, which is tried before `S3 clean-slate`; `S4 failover` is
/// reserved for cases where the provider itself is unreachable.
fn strategy_for(spec: FailureSpec, attempt: u32) -> RecoveryStrategy {
    match spec {
        FailureSpec::ConnectionTimeout if attempt == 0 => RecoveryStrategy::Restart,
        FailureSpec::ConnectionTimeout => RecoveryStrategy::Recreate,
        FailureSpec::CommandFailure => RecoveryStrategy::Restart,
        FailureSpec::SandboxTerminated => RecoveryStrategy::Recreate,
        FailureSpec::ResourceExhaustion => RecoveryStrategy::CleanSlate,
        FailureSpec::Unknown if attempt >= 2 => RecoveryStrategy::Failover,
        FailureSpec::Unknown => RecoveryStrategy::Recreate,
    }
}

struct AttemptWindow {
    count: u32,
    window_start: DateTime<Utc>,
}

/// Drives C4's recovery policy: given an unresponsive or failing sandbox,
/// picks one of the four named strategies and executes it, tracking a
/// rolling per-hour attempt budget per session.
pub struct RecoveryCoordinator {
    manager: Arc<SandboxManager>,
    windows: tokio::sync::Mutex<HashMap<Uuid, AttemptWindow>>,
}

impl RecoveryCoordinator {
    pub fn new(manager: Arc<SandboxManager>) -> Self {
        Self {
            manager,
            windows: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// The sandbox manager this coordinator recovers against, for callers
    /// that need to read back post-recovery state (e.g. the new external
    /// sandbox id).
    pub fn manager(&self) -> &Arc<SandboxManager> {
        &self.manager
    }

    async fn admit_attempt(&self, session_id: Uuid) -> ForgeResult<()> {
        let mut windows = self.windows.lock().await;
        let now = Utc::now();
        let entry = windows.entry(session_id).or_insert(AttemptWindow {
            count: 0,
            window_start: now,
        });

        if now - entry.window_start > ChronoDuration::hours(1) {
            entry.count = 0;
            entry.window_start = now;
        }

        if entry.count >= MAX_ATTEMPTS_PER_HOUR {
            return Err(ForgeError::Sandbox {
                kind: forge_core::SandboxErrorKind::Unresponsive,
                message: format!(
                    "session {session_id} exceeded {MAX_ATTEMPTS_PER_HOUR} recovery attempts in the last hour"
                ),
            });
        }
        entry.count += 1;
        Ok(())
    }

    /// Runs recovery for one session against an explicit failure
    /// classification, selecting a strategy from [`strategy_for`] and the
    /// session's current attempt count.
    pub async fn recover(
        &self,
        workspace_id: WorkspaceId,
        session_id: Uuid,
        spec: FailureSpec,
    ) -> ForgeResult<RecoveryStrategy> {
        self.admit_attempt(session_id).await?;

        let env = self
            .manager
            .get(workspace_id, session_id)
            .await?
            .ok_or_else(|| ForgeError::NotFound(format!("no sandbox for session {session_id}")))?;

        let attempt = self.manager.bump_recovery_attempts(session_id).await;
        let strategy = strategy_for(spec, attempt.saturating_sub(1));

        info!(%session_id, ?strategy, attempt, "running sandbox recovery");

        match strategy {
            RecoveryStrategy::Restart => self.restart(session_id, &env.id).await?,
            RecoveryStrategy::Recreate => self.recreate(workspace_id, session_id).await?,
            RecoveryStrategy::CleanSlate => self.clean_slate(workspace_id, session_id).await?,
            RecoveryStrategy::Failover => self.failover(workspace_id, session_id).await?,
        }

        Ok(strategy)
    }

    /// Manually triggered recovery for one session, always starting from
    /// attempt 0's strategy choice (`restart`) regardless of prior attempts
    /// this hour, though the hourly budget still applies.
    pub async fn trigger_manual_recovery(
        &self,
        workspace_id: WorkspaceId,
        session_id: Uuid,
    ) -> ForgeResult<RecoveryStrategy> {
        self.recover(workspace_id, session_id, FailureSpec::Unknown).await
    }

    /// Forces recovery across every known sandbox, bounded to
    /// [`MAX_CONCURRENT_RECOVERIES`] in flight at once. Returns one result
    /// per sandbox, preserving iteration order; a per-sandbox failure does
    /// not abort the others.
    pub async fn force_recovery_all(&self) -> Vec<(Uuid, ForgeResult<RecoveryStrategy>)> {
        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_RECOVERIES));
        let sandboxes = self.manager.snapshot_all().await;

        let mut handles = Vec::with_capacity(sandboxes.len());
        for (workspace_id, session_id, _env) in sandboxes {
            let permit = Arc::clone(&semaphore);
            let coordinator = self;
            handles.push(async move {
                let _permit = permit.acquire().await;
                let result = coordinator.recover(workspace_id, session_id, FailureSpec::Unknown).await;
                (session_id, result)
            });
        }
        futures_util::future::join_all(handles).await
    }

    async fn restart(&self, session_id: Uuid, external_id: &str) -> ForgeResult<()> {
        let provider = self.manager.provider();
        if let Err(err) = provider.terminate(external_id).await {
            warn!(%session_id, %err, "restart: ignoring terminate error on unresponsive sandbox");
        }
        let new_id = provider.provision(self.manager.default_template(), &HashMap::new()).await?;
        self.manager.replace_external_id(session_id, new_id).await;
        self.manager.set_status(session_id, SandboxStatus::Ready).await;
        Ok(())
    }

    async fn recreate(&self, workspace_id: WorkspaceId, session_id: Uuid) -> ForgeResult<()> {
        let env = self
            .manager
            .get(workspace_id, session_id)
            .await?
            .ok_or_else(|| ForgeError::NotFound(format!("no sandbox for session {session_id}")))?;

        let provider = self.manager.provider();
        let _ = provider.terminate(&env.id).await;
        let new_id = provider.provision(self.manager.default_template(), &HashMap::new()).await?;

        // Context (artifacts, prior files) is re-projected by the caller via
        // forge-artifacts -> .pria/ sync after this returns; the sandbox
        // manager only owns the execution environment, not artifact state.
        self.manager.replace_external_id(session_id, new_id).await;
        self.manager.set_status(session_id, SandboxStatus::Ready).await;
        Ok(())
    }

    async fn clean_slate(&self, workspace_id: WorkspaceId, session_id: Uuid) -> ForgeResult<()> {
        let env = self
            .manager
            .get(workspace_id, session_id)
            .await?
            .ok_or_else(|| ForgeError::NotFound(format!("no sandbox for session {session_id}")))?;

        let provider = self.manager.provider();
        let _ = provider.terminate(&env.id).await;
        let new_id = provider.provision(self.manager.default_template(), &HashMap::new()).await?;

        self.manager.replace_external_id(session_id, new_id).await;
        self.manager.set_status(session_id, SandboxStatus::Ready).await;
        error!(%session_id, "clean-slate recovery: prior sandbox context discarded");
        Ok(())
    }

    async fn failover(&self, workspace_id: WorkspaceId, session_id: Uuid) -> ForgeResult<()> {
        // No pre-warmed backup pool exists yet; failover degrades to
        // recreate until one is wired in.
        warn!(%session_id, "failover strategy requested, falling back to recreate");
        self.recreate(workspace_id, session_id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::provider::InMemorySandboxProvider;

    fn coordinator() -> (Arc<SandboxManager>, RecoveryCoordinator) {
        let manager = Arc::new(SandboxManager::new(Arc::new(InMemorySandboxProvider::new()), "node-20"));
        let coordinator = RecoveryCoordinator::new(Arc::clone(&manager));
        (manager, coordinator)
    }

    #[tokio::test]
    async fn restart_is_chosen_for_first_connection_timeout() {
        let (manager, coordinator) = coordinator();
        let ws = Uuid::new_v4();
        let session = Uuid::new_v4();
        let original = manager.create(ws, session, None).await.unwrap();

        let strategy = coordinator
            .recover(ws, session, FailureSpec::ConnectionTimeout)
            .await
            .unwrap();

        assert_eq!(strategy, RecoveryStrategy::Restart);
        let recovered = manager.get(ws, session).await.unwrap().unwrap();
        assert_ne!(recovered.id, original.id);
        assert_eq!(recovered.status, SandboxStatus::Ready);
    }

    #[tokio::test]
    async fn resource_exhaustion_does_not_preserve_context() {
        let (manager, coordinator) = coordinator();
        let ws = Uuid::new_v4();
        let session = Uuid::new_v4();
        manager.create(ws, session, None).await.unwrap();

        let strategy = coordinator
            .recover(ws, session, FailureSpec::ResourceExhaustion)
            .await
            .unwrap();

        assert_eq!(strategy, RecoveryStrategy::CleanSlate);
        assert!(!strategy.preserves_context());
    }

    #[tokio::test]
    async fn hourly_attempt_budget_is_enforced() {
        let (manager, coordinator) = coordinator();
        let ws = Uuid::new_v4();
        let session = Uuid::new_v4();
        manager.create(ws, session, None).await.unwrap();

        for _ in 0..MAX_ATTEMPTS_PER_HOUR {
            coordinator
                .recover(ws, session, FailureSpec::CommandFailure)
                .await
                .unwrap();
        }
        let result = coordinator.recover(ws, session, FailureSpec::CommandFailure).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn force_recovery_all_covers_every_sandbox() {
        let (manager, coordinator) = coordinator();
        let ws = Uuid::new_v4();
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();
        manager.create(ws, s1, None).await.unwrap();
        manager.create(ws, s2, None).await.unwrap();

        let results = coordinator.force_recovery_all().await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
    }
}
