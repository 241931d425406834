use chrono::Utc;
use forge_core::{ForgeError, ForgeResult, SandboxErrorKind, WorkspaceId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::provider::SandboxProvider;
use crate::types::{ExecOptions, ExecResult, SandboxEnv, SandboxStatus};
use crate::validate::sandbox_error;

struct Entry {
    workspace_id: WorkspaceId,
    env: SandboxEnv,
}

/// Owns the `session_id -> SandboxEnv` map and the sandbox state machine.
/// Delegates actual provisioning/exec/file operations to a
/// [`SandboxProvider`]. Tenant-scoped: every lookup is qualified by
/// `workspace_id`, matching the isolation invariant that applies to every
/// entity in the system.
pub struct SandboxManager {
    provider: Arc<dyn SandboxProvider>,
    sandboxes: RwLock<HashMap<Uuid, Entry>>,
    default_template: String,
}

impl SandboxManager {
    pub fn new(provider: Arc<dyn SandboxProvider>, default_template: impl Into<String>) -> Self {
        Self {
            provider,
            sandboxes: RwLock::new(HashMap::new()),
            default_template: default_template.into(),
        }
    }

    /// Provisions a sandbox for `session_id` if one does not already exist;
    /// otherwise returns the existing environment. Idempotent per spec's
    /// sandbox creation contract.
    pub async fn create(
        &self,
        workspace_id: WorkspaceId,
        session_id: Uuid,
        template_id: Option<&str>,
    ) -> ForgeResult<SandboxEnv> {
        if let Some(env) = self.get(workspace_id, session_id).await? {
            return Ok(env);
        }

        let template = template_id.unwrap_or(&self.default_template);
        let external_id = self.provider.provision(template, &HashMap::new()).await?;
        let mut env = SandboxEnv::new(external_id, session_id, "/workspace");
        env.status = SandboxStatus::Ready;
        env.last_heartbeat = Some(Utc::now());

        self.sandboxes.write().await.insert(
            session_id,
            Entry {
                workspace_id,
                env: env.clone(),
            },
        );
        info!(%session_id, sandbox_id = %env.id, "sandbox ready");
        Ok(env)
    }

    /// Looks up a sandbox scoped to `workspace_id`. Returns `None` if no
    /// sandbox has been created for `session_id`, and an error if the
    /// sandbox belongs to a different workspace (cross-tenant access is
    /// always an error, never a silent miss).
    pub async fn get(&self, workspace_id: WorkspaceId, session_id: Uuid) -> ForgeResult<Option<SandboxEnv>> {
        let sandboxes = self.sandboxes.read().await;
        match sandboxes.get(&session_id) {
            Some(entry) if entry.workspace_id == workspace_id => Ok(Some(entry.env.clone())),
            Some(_) => Err(ForgeError::Authorization(format!(
                "sandbox for session {session_id} does not belong to workspace {workspace_id}"
            ))),
            None => Ok(None),
        }
    }

    async fn require(&self, workspace_id: WorkspaceId, session_id: Uuid) -> ForgeResult<SandboxEnv> {
        self.get(workspace_id, session_id)
            .await?
            .ok_or_else(|| ForgeError::NotFound(format!("no sandbox for session {session_id}")))
    }

    pub async fn execute(
        &self,
        workspace_id: WorkspaceId,
        session_id: Uuid,
        command: &str,
        opts: &ExecOptions,
    ) -> ForgeResult<ExecResult> {
        let env = self.require(workspace_id, session_id).await?;
        self.ensure_executable(&env)?;

        match self.provider.execute(&env.id, command, opts).await {
            Ok(result) => {
                self.record_success(session_id).await;
                Ok(result)
            }
            Err(err) => {
                self.record_failure(session_id).await;
                Err(err)
            }
        }
    }

    pub async fn write_file(
        &self,
        workspace_id: WorkspaceId,
        session_id: Uuid,
        path: &str,
        content: &str,
    ) -> ForgeResult<()> {
        let env = self.require(workspace_id, session_id).await?;
        self.ensure_executable(&env)?;
        self.provider.write_file(&env.id, path, content).await
    }

    pub async fn read_file(&self, workspace_id: WorkspaceId, session_id: Uuid, path: &str) -> ForgeResult<String> {
        let env = self.require(workspace_id, session_id).await?;
        self.ensure_executable(&env)?;
        self.provider.read_file(&env.id, path).await
    }

    pub async fn list(&self, workspace_id: WorkspaceId, session_id: Uuid, dir: &str) -> ForgeResult<Vec<String>> {
        let env = self.require(workspace_id, session_id).await?;
        self.ensure_executable(&env)?;
        self.provider.list(&env.id, dir).await
    }

    pub async fn preview_url(&self, workspace_id: WorkspaceId, session_id: Uuid, port: u16) -> ForgeResult<String> {
        let env = self.require(workspace_id, session_id).await?;
        self.ensure_executable(&env)?;
        self.provider.preview_url(&env.id, port).await
    }

    /// Terminates and forgets the sandbox for `session_id`. No-op if none
    /// exists.
    pub async fn terminate(&self, workspace_id: WorkspaceId, session_id: Uuid) -> ForgeResult<()> {
        let Some(env) = self.get(workspace_id, session_id).await? else {
            return Ok(());
        };
        self.provider.terminate(&env.id).await?;
        self.transition(session_id, SandboxStatus::Terminated).await?;
        self.sandboxes.write().await.remove(&session_id);
        Ok(())
    }

    fn ensure_executable(&self, env: &SandboxEnv) -> ForgeResult<()> {
        match env.status {
            SandboxStatus::Ready | SandboxStatus::Degraded => Ok(()),
            SandboxStatus::Terminated => Err(sandbox_error(SandboxErrorKind::Terminated, &env.id)),
            other => Err(sandbox_error(
                SandboxErrorKind::Unresponsive,
                format!("sandbox {} is {:?}, not executable", env.id, other),
            )),
        }
    }

    /// Applies a validated state transition, returning an error for illegal
    /// moves instead of silently clamping.
    pub async fn transition(&self, session_id: Uuid, to: SandboxStatus) -> ForgeResult<()> {
        let mut sandboxes = self.sandboxes.write().await;
        let entry = sandboxes
            .get_mut(&session_id)
            .ok_or_else(|| ForgeError::NotFound(format!("no sandbox for session {session_id}")))?;

        if !entry.env.status.can_transition_to(to) {
            return Err(ForgeError::Validation(format!(
                "illegal sandbox transition {:?} -> {:?}",
                entry.env.status, to
            )));
        }
        entry.env.status = to;
        Ok(())
    }

    async fn record_success(&self, session_id: Uuid) {
        let mut sandboxes = self.sandboxes.write().await;
        if let Some(entry) = sandboxes.get_mut(&session_id) {
            entry.env.consecutive_failures = 0;
            entry.env.last_heartbeat = Some(Utc::now());
            if entry.env.status == SandboxStatus::Degraded {
                entry.env.status = SandboxStatus::Ready;
            }
        }
    }

    async fn record_failure(&self, session_id: Uuid) {
        let mut sandboxes = self.sandboxes.write().await;
        if let Some(entry) = sandboxes.get_mut(&session_id) {
            entry.env.consecutive_failures += 1;
            warn!(
                %session_id,
                failures = entry.env.consecutive_failures,
                "sandbox command failed"
            );
            if entry.env.status == SandboxStatus::Ready {
                entry.env.status = SandboxStatus::Degraded;
            }
        }
    }

    /// Snapshots every sandbox in `workspace_id`. Used by the health poller
    /// (C4) to avoid holding the lock across provider network calls.
    pub async fn snapshot(&self, workspace_id: WorkspaceId) -> Vec<(Uuid, SandboxEnv)> {
        self.sandboxes
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.workspace_id == workspace_id)
            .map(|(id, entry)| (*id, entry.env.clone()))
            .collect()
    }

    /// Snapshots every sandbox across all workspaces. Used internally by the
    /// health poller, which is workspace-agnostic.
    pub async fn snapshot_all(&self) -> Vec<(WorkspaceId, Uuid, SandboxEnv)> {
        self.sandboxes
            .read()
            .await
            .iter()
            .map(|(id, entry)| (entry.workspace_id, *id, entry.env.clone()))
            .collect()
    }

    pub(crate) fn provider(&self) -> Arc<dyn SandboxProvider> {
        Arc::clone(&self.provider)
    }

    pub(crate) async fn set_status(&self, session_id: Uuid, status: SandboxStatus) {
        if let Some(entry) = self.sandboxes.write().await.get_mut(&session_id) {
            entry.env.status = status;
        }
    }

    pub(crate) async fn bump_recovery_attempts(&self, session_id: Uuid) -> u32 {
        let mut sandboxes = self.sandboxes.write().await;
        if let Some(entry) = sandboxes.get_mut(&session_id) {
            entry.env.recovery_attempts += 1;
            entry.env.recovery_attempts
        } else {
            0
        }
    }

    pub(crate) async fn replace_external_id(&self, session_id: Uuid, new_id: String) {
        if let Some(entry) = self.sandboxes.write().await.get_mut(&session_id) {
            entry.env.id = new_id;
            entry.env.consecutive_failures = 0;
            entry.env.last_heartbeat = Some(Utc::now());
        }
    }

    pub(crate) fn default_template(&self) -> &str {
        &self.default_template
    }

    /// Resets the ping failure streak and restores `ready` from `degraded`
    /// or `unhealthy`. Does not touch `unresponsive`: recovery from that
    /// state goes through [`crate::recovery::RecoveryCoordinator`], not a
    /// plain successful ping (an unresponsive sandbox that suddenly answers
    /// one ping still needs its recovery bookkeeping reset deliberately).
    pub(crate) async fn record_ping_success(&self, session_id: Uuid) {
        let mut sandboxes = self.sandboxes.write().await;
        if let Some(entry) = sandboxes.get_mut(&session_id) {
            entry.env.consecutive_failures = 0;
            entry.env.last_heartbeat = Some(Utc::now());
            if matches!(entry.env.status, SandboxStatus::Degraded | SandboxStatus::Unhealthy) {
                entry.env.status = SandboxStatus::Ready;
            }
        }
    }

    /// Increments the ping failure streak and walks the status ladder
    /// `ready/degraded -> unhealthy -> unresponsive` as the thresholds in
    /// [`crate::health`] are crossed. Returns the new failure count.
    pub(crate) async fn record_ping_failure(&self, session_id: Uuid) -> u32 {
        use crate::health::{UNHEALTHY_THRESHOLD, UNRESPONSIVE_THRESHOLD};

        let mut sandboxes = self.sandboxes.write().await;
        let Some(entry) = sandboxes.get_mut(&session_id) else {
            return 0;
        };

        entry.env.consecutive_failures += 1;
        let failures = entry.env.consecutive_failures;

        if failures >= UNRESPONSIVE_THRESHOLD {
            entry.env.status = SandboxStatus::Unresponsive;
        } else if failures >= UNHEALTHY_THRESHOLD {
            entry.env.status = SandboxStatus::Unhealthy;
        } else if entry.env.status == SandboxStatus::Ready {
            entry.env.status = SandboxStatus::Degraded;
        }
        failures
    }

    /// Terminates every sandbox whose last heartbeat (or creation time, if
    /// it never received one) is older than `idle_timeout`. Returns the
    /// terminated session ids. Driven by `SANDBOX_IDLE_TIMEOUT_MS` at the
    /// operator layer, not by C3/C4 themselves.
    pub async fn terminate_idle(&self, idle_timeout: chrono::Duration) -> Vec<Uuid> {
        let cutoff = Utc::now() - idle_timeout;
        let stale: Vec<(WorkspaceId, Uuid)> = self
            .sandboxes
            .read()
            .await
            .iter()
            .filter(|(_, entry)| entry.env.status != SandboxStatus::Terminated)
            .filter(|(_, entry)| entry.env.last_heartbeat.unwrap_or(entry.env.created_at) < cutoff)
            .map(|(id, entry)| (entry.workspace_id, *id))
            .collect();

        let mut terminated = Vec::with_capacity(stale.len());
        for (workspace_id, session_id) in stale {
            if self.terminate(workspace_id, session_id).await.is_ok() {
                terminated.push(session_id);
            }
        }
        terminated
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::provider::InMemorySandboxProvider;

    fn manager() -> SandboxManager {
        SandboxManager::new(Arc::new(InMemorySandboxProvider::new()), "node-20")
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let mgr = manager();
        let ws = Uuid::new_v4();
        let session = Uuid::new_v4();
        let a = mgr.create(ws, session, None).await.unwrap();
        let b = mgr.create(ws, session, None).await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn cross_workspace_lookup_is_rejected() {
        let mgr = manager();
        let ws1 = Uuid::new_v4();
        let ws2 = Uuid::new_v4();
        let session = Uuid::new_v4();
        mgr.create(ws1, session, None).await.unwrap();
        assert!(mgr.get(ws2, session).await.is_err());
    }

    #[tokio::test]
    async fn execute_after_terminate_is_error() {
        let mgr = manager();
        let ws = Uuid::new_v4();
        let session = Uuid::new_v4();
        mgr.create(ws, session, None).await.unwrap();
        mgr.terminate(ws, session).await.unwrap();
        assert!(mgr.get(ws, session).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn illegal_transition_is_rejected() {
        let mgr = manager();
        let ws = Uuid::new_v4();
        let session = Uuid::new_v4();
        mgr.create(ws, session, None).await.unwrap();
        mgr.transition(session, SandboxStatus::Terminated).await.unwrap();
        assert!(mgr.transition(session, SandboxStatus::Ready).await.is_err());
    }

    #[tokio::test]
    async fn terminate_idle_reaps_stale_sandboxes_only() {
        let mgr = manager();
        let ws = Uuid::new_v4();
        let stale = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        mgr.create(ws, stale, None).await.unwrap();
        mgr.create(ws, fresh, None).await.unwrap();

        {
            let mut sandboxes = mgr.sandboxes.write().await;
            sandboxes.get_mut(&stale).unwrap().env.last_heartbeat =
                Some(Utc::now() - chrono::Duration::hours(2));
        }

        let reaped = mgr.terminate_idle(chrono::Duration::minutes(30)).await;
        assert_eq!(reaped, vec![stale]);
        assert!(mgr.get(ws, stale).await.unwrap().is_none());
        assert!(mgr.get(ws, fresh).await.unwrap().is_some());
    }
}
