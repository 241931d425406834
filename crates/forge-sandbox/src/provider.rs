use async_trait::async_trait;
use forge_core::{ForgeResult, SandboxErrorKind};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::types::{ExecOptions, ExecResult};
use crate::validate::{sandbox_error, validate_command, validate_path};

/// The remote execution environment contract. A sandbox provider spawns
/// isolated environments from a named template and exposes commands,
/// filesystem read/write, and port mapping.
///
/// [`crate::manager::SandboxManager`] is provider-agnostic: it owns the
/// `session_id -> SandboxEnv` map and state machine, and delegates actual
/// command/file execution here.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Provisions a new isolated environment from `template_id`. Returns the
    /// provider-assigned external id.
    async fn provision(&self, template_id: &str, env_vars: &HashMap<String, String>) -> ForgeResult<String>;

    /// Runs a liveness/health command. Used by C4's poller.
    async fn ping(&self, external_id: &str) -> ForgeResult<()>;

    async fn execute(
        &self,
        external_id: &str,
        command: &str,
        opts: &ExecOptions,
    ) -> ForgeResult<ExecResult>;

    async fn write_file(&self, external_id: &str, path: &str, content: &str) -> ForgeResult<()>;

    async fn read_file(&self, external_id: &str, path: &str) -> ForgeResult<String>;

    async fn list(&self, external_id: &str, dir: &str) -> ForgeResult<Vec<String>>;

    async fn preview_url(&self, external_id: &str, port: u16) -> ForgeResult<String>;

    async fn terminate(&self, external_id: &str) -> ForgeResult<()>;
}

/// In-memory sandbox provider: a virtual filesystem plus an echo-style
/// command executor. Used for tests and for deployments with no Docker
/// daemon available.
#[derive(Default)]
pub struct InMemorySandboxProvider {
    environments: RwLock<HashMap<String, InMemoryEnv>>,
}

#[derive(Default)]
struct InMemoryEnv {
    files: HashMap<String, String>,
    terminated: bool,
}

impl InMemorySandboxProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SandboxProvider for InMemorySandboxProvider {
    async fn provision(&self, template_id: &str, _env_vars: &HashMap<String, String>) -> ForgeResult<String> {
        let id = format!("mem-{}-{}", template_id, uuid::Uuid::new_v4());
        self.environments.write().await.insert(id.clone(), InMemoryEnv::default());
        Ok(id)
    }

    async fn ping(&self, external_id: &str) -> ForgeResult<()> {
        let envs = self.environments.read().await;
        match envs.get(external_id) {
            Some(env) if !env.terminated => Ok(()),
            Some(_) => Err(sandbox_error(SandboxErrorKind::Terminated, external_id)),
            None => Err(sandbox_error(SandboxErrorKind::Unresponsive, external_id)),
        }
    }

    async fn execute(
        &self,
        external_id: &str,
        command: &str,
        _opts: &ExecOptions,
    ) -> ForgeResult<ExecResult> {
        validate_command(command)?;
        self.ping(external_id).await?;
        Ok(ExecResult {
            stdout: format!("ok: {command}"),
            stderr: String::new(),
            exit_code: 0,
            duration_ms: 0,
        })
    }

    async fn write_file(&self, external_id: &str, path: &str, content: &str) -> ForgeResult<()> {
        validate_path(path)?;
        let mut envs = self.environments.write().await;
        let env = envs
            .get_mut(external_id)
            .ok_or_else(|| sandbox_error(SandboxErrorKind::Unresponsive, external_id))?;
        env.files.insert(path.to_string(), content.to_string());
        Ok(())
    }

    async fn read_file(&self, external_id: &str, path: &str) -> ForgeResult<String> {
        validate_path(path)?;
        let envs = self.environments.read().await;
        let env = envs
            .get(external_id)
            .ok_or_else(|| sandbox_error(SandboxErrorKind::Unresponsive, external_id))?;
        env.files
            .get(path)
            .cloned()
            .ok_or_else(|| forge_core::ForgeError::NotFound(format!("file not found: {path}")))
    }

    async fn list(&self, external_id: &str, dir: &str) -> ForgeResult<Vec<String>> {
        let envs = self.environments.read().await;
        let env = envs
            .get(external_id)
            .ok_or_else(|| sandbox_error(SandboxErrorKind::Unresponsive, external_id))?;
        let prefix = if dir.is_empty() || dir == "." {
            String::new()
        } else {
            format!("{}/", dir.trim_end_matches('/'))
        };
        Ok(env
            .files
            .keys()
            .filter(|p| p.starts_with(&prefix))
            .cloned()
            .collect())
    }

    async fn preview_url(&self, external_id: &str, port: u16) -> ForgeResult<String> {
        Ok(format!("https://{external_id}.preview.local:{port}"))
    }

    async fn terminate(&self, external_id: &str) -> ForgeResult<()> {
        let mut envs = self.environments.write().await;
        if let Some(env) = envs.get_mut(external_id) {
            env.terminated = true;
        }
        Ok(())
    }
}

#[cfg(feature = "docker")]
pub mod docker {
    use super::*;
    use bollard::container::{
        Config as ContainerConfig, CreateContainerOptions, RemoveContainerOptions,
        StartContainerOptions, StopContainerOptions,
    };
    use bollard::exec::{CreateExecOptions, StartExecResults};
    use bollard::models::HostConfig;
    use bollard::Docker;
    use futures_util::StreamExt;

    /// Docker-backed sandbox provider: one container per sandbox.
    pub struct DockerSandboxProvider {
        client: Docker,
        image: String,
        memory_limit_mb: u64,
        cpu_limit: f64,
    }

    impl DockerSandboxProvider {
        pub fn connect(image: impl Into<String>, memory_limit_mb: u64, cpu_limit: f64) -> ForgeResult<Self> {
            let client = Docker::connect_with_local_defaults()
                .map_err(|e| sandbox_error(SandboxErrorKind::Create, format!("docker connect failed: {e}")))?;
            Ok(Self {
                client,
                image: image.into(),
                memory_limit_mb,
                cpu_limit,
            })
        }
    }

    #[async_trait]
    impl SandboxProvider for DockerSandboxProvider {
        async fn provision(&self, _template_id: &str, _env_vars: &HashMap<String, String>) -> ForgeResult<String> {
            let memory_bytes = (self.memory_limit_mb * 1024 * 1024) as i64;
            let cpu_quota = (100_000.0 * self.cpu_limit) as i64;

            let host_config = HostConfig {
                memory: Some(memory_bytes),
                cpu_quota: Some(cpu_quota),
                cpu_period: Some(100_000),
                network_mode: Some("none".to_string()),
                ..Default::default()
            };

            let config = ContainerConfig {
                image: Some(self.image.clone()),
                working_dir: Some("/workspace".to_string()),
                tty: Some(true),
                cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
                host_config: Some(host_config),
                ..Default::default()
            };

            let container = self
                .client
                .create_container(Some(CreateContainerOptions::<String>::default()), config)
                .await
                .map_err(|e| sandbox_error(SandboxErrorKind::Create, e.to_string()))?;

            self.client
                .start_container(&container.id, None::<StartContainerOptions<String>>)
                .await
                .map_err(|e| sandbox_error(SandboxErrorKind::Create, e.to_string()))?;

            Ok(container.id)
        }

        async fn ping(&self, external_id: &str) -> ForgeResult<()> {
            self.client
                .inspect_container(external_id, None)
                .await
                .map_err(|e| sandbox_error(SandboxErrorKind::Unresponsive, e.to_string()))?;
            Ok(())
        }

        async fn execute(
            &self,
            external_id: &str,
            command: &str,
            opts: &ExecOptions,
        ) -> ForgeResult<ExecResult> {
            validate_command(command)?;
            let started = std::time::Instant::now();

            let exec_opts = CreateExecOptions {
                attach_stdout: Some(true),
                attach_stderr: Some(true),
                cmd: Some(vec!["sh".to_string(), "-c".to_string(), command.to_string()]),
                working_dir: opts.working_dir.clone(),
                ..Default::default()
            };

            let created = self
                .client
                .create_exec(external_id, exec_opts)
                .await
                .map_err(|e| sandbox_error(SandboxErrorKind::Command, e.to_string()))?;

            let timeout = std::time::Duration::from_millis(opts.timeout_ms.unwrap_or(30_000));
            let deadline = tokio::time::Instant::now() + timeout;

            let start_result = self
                .client
                .start_exec(&created.id, None)
                .await
                .map_err(|e| sandbox_error(SandboxErrorKind::Command, e.to_string()))?;

            let mut stdout = String::new();
            let mut stderr = String::new();

            if let StartExecResults::Attached { mut output, .. } = start_result {
                loop {
                    match tokio::time::timeout_at(deadline, output.next()).await {
                        Ok(Some(Ok(bollard::container::LogOutput::StdOut { message }))) => {
                            stdout.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(Some(Ok(bollard::container::LogOutput::StdErr { message }))) => {
                            stderr.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(Some(Ok(_))) => {}
                        Ok(Some(Err(e))) => {
                            return Err(sandbox_error(SandboxErrorKind::Command, e.to_string()));
                        }
                        Ok(None) => break,
                        Err(_) => {
                            return Err(forge_core::ForgeError::Timeout(format!(
                                "command exceeded {}ms",
                                timeout.as_millis()
                            )));
                        }
                    }
                }
            }

            let inspect = self
                .client
                .inspect_exec(&created.id)
                .await
                .map_err(|e| sandbox_error(SandboxErrorKind::Command, e.to_string()))?;

            Ok(ExecResult {
                stdout,
                stderr,
                exit_code: inspect.exit_code.unwrap_or(-1),
                duration_ms: started.elapsed().as_millis() as u64,
            })
        }

        async fn write_file(&self, external_id: &str, path: &str, content: &str) -> ForgeResult<()> {
            validate_path(path)?;
            let escaped = content.replace('\'', "'\\''");
            let cmd = format!("mkdir -p \"$(dirname '{path}')\" && printf '%s' '{escaped}' > '{path}'");
            self.execute(external_id, &cmd, &ExecOptions::default()).await?;
            Ok(())
        }

        async fn read_file(&self, external_id: &str, path: &str) -> ForgeResult<String> {
            validate_path(path)?;
            let result = self
                .execute(external_id, &format!("cat '{path}'"), &ExecOptions::default())
                .await?;
            if result.exit_code != 0 {
                return Err(forge_core::ForgeError::NotFound(format!("file not found: {path}")));
            }
            Ok(result.stdout)
        }

        async fn list(&self, external_id: &str, dir: &str) -> ForgeResult<Vec<String>> {
            let result = self
                .execute(external_id, &format!("ls -1 '{dir}'"), &ExecOptions::default())
                .await?;
            Ok(result.stdout.lines().map(str::to_string).collect())
        }

        async fn preview_url(&self, external_id: &str, port: u16) -> ForgeResult<String> {
            Ok(format!("https://{external_id}.preview.local:{port}"))
        }

        async fn terminate(&self, external_id: &str) -> ForgeResult<()> {
            let _ = self
                .client
                .stop_container(external_id, Some(StopContainerOptions { t: 5 }))
                .await;
            self.client
                .remove_container(
                    external_id,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await
                .map_err(|e| sandbox_error(SandboxErrorKind::Terminated, e.to_string()))?;
            Ok(())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn provision_then_ping_succeeds() {
        let provider = InMemorySandboxProvider::new();
        let id = provider.provision("node-20", &HashMap::new()).await.unwrap();
        provider.ping(&id).await.unwrap();
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let provider = InMemorySandboxProvider::new();
        let id = provider.provision("node-20", &HashMap::new()).await.unwrap();
        provider.write_file(&id, "src/main.rs", "fn main() {}").await.unwrap();
        let content = provider.read_file(&id, "src/main.rs").await.unwrap();
        assert_eq!(content, "fn main() {}");
    }

    #[tokio::test]
    async fn terminated_sandbox_rejects_ping() {
        let provider = InMemorySandboxProvider::new();
        let id = provider.provision("node-20", &HashMap::new()).await.unwrap();
        provider.terminate(&id).await.unwrap();
        assert!(provider.ping(&id).await.is_err());
    }

    #[tokio::test]
    async fn unregistered_sandbox_ping_is_not_implicit_create() {
        let provider = InMemorySandboxProvider::new();
        assert!(provider.ping("never-provisioned").await.is_err());
    }
}
