use forge_agent::{AgentRunner, LlmClient, LlmExecutor, ModelConfig};
use forge_artifacts::{ArtifactStore, FileArtifactBackend};
use forge_builtins;
use forge_gateway::{AuthConfig, GatewayServer, WorkflowApiState};
use forge_orchestrator::{ContextSynchronizer, ParallelProcessor, SubagentRegistry, WorkflowManager};
#[cfg(not(feature = "docker"))]
use forge_sandbox::InMemorySandboxProvider;
use forge_sandbox::{HealthPoller, RecoveryCoordinator, SandboxManager, SandboxProvider};
use forge_security::tls;
use forge_security::{AuditLog, Capability, PermissionSet, RateLimiter};
use forge_session::FileSessionStore;
use forge_skills::SkillRegistry;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config_watcher;

/// Exit codes for CLI wrappers around the core engine (§6). Matches the
/// BSD `sysexits.h` convention the spec borrows from.
#[repr(i32)]
enum ExitCode {
    Success = 0,
    Usage = 64,
    Internal = 70,
    Io = 74,
    TemporaryFailure = 75,
}

struct CliError {
    code: ExitCode,
    message: String,
}

impl CliError {
    fn usage(message: impl Into<String>) -> Self {
        Self { code: ExitCode::Usage, message: message.into() }
    }
    fn io(message: impl Into<String>) -> Self {
        Self { code: ExitCode::Io, message: message.into() }
    }
    fn temporary(message: impl Into<String>) -> Self {
        Self { code: ExitCode::TemporaryFailure, message: message.into() }
    }
    fn internal(message: impl Into<String>) -> Self {
        Self { code: ExitCode::Internal, message: message.into() }
    }
}

#[derive(Parser)]
#[command(name = "forge", about = "Forge — Secure AI Agent Framework")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "forge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Manage skills
    Skill {
        #[command(subcommand)]
        action: SkillAction,
    },
}

#[derive(Subcommand)]
enum SkillAction {
    /// List registered skills
    List,
}

/// Operating environment, mapped from the conventional `NODE_ENV` values
/// this system's ancestry carries, to a Rust-idiomatic enum (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
enum AppEnv {
    #[default]
    Development,
    Production,
    Test,
}

impl AppEnv {
    fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "production" | "prod" => AppEnv::Production,
            "test" => AppEnv::Test,
            _ => AppEnv::Development,
        }
    }
}

#[derive(Deserialize)]
struct ForgeConfig {
    model: ModelConfig,
    #[serde(default = "default_data_dir")]
    data_dir: PathBuf,
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    security: SecurityConfig,
    #[serde(default)]
    sandbox: SandboxConfig,
    #[serde(default)]
    internal_signing_secret: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    app_env: AppEnv,
    #[serde(default = "default_health_poll_ms")]
    health_poll_ms: u64,
    #[serde(default = "default_sandbox_idle_timeout_ms")]
    sandbox_idle_timeout_ms: u64,
}

#[derive(Deserialize, Default)]
struct SandboxConfig {
    #[serde(default)]
    api_key: String,
    #[serde(default = "default_sandbox_template")]
    template_id: String,
}

#[derive(Deserialize)]
struct ServerConfig {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    tls: TlsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tls: TlsConfig::default(),
        }
    }
}

#[derive(Deserialize, Default)]
struct TlsConfig {
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    cert_path: String,
    #[serde(default)]
    key_path: String,
    #[serde(default)]
    client_ca_path: String,
}

#[derive(Deserialize)]
struct SecurityConfig {
    #[serde(default = "default_rps")]
    max_requests_per_second: f64,
    #[serde(default = "default_burst")]
    max_burst: f64,
    #[serde(default = "default_max_msg_len")]
    max_message_length: usize,
    #[serde(default)]
    api_keys: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_requests_per_second: default_rps(),
            max_burst: default_burst(),
            max_message_length: default_max_msg_len(),
            api_keys: vec![],
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_rps() -> f64 {
    10.0
}
fn default_burst() -> f64 {
    50.0
}
fn default_max_msg_len() -> usize {
    100_000
}
fn default_sandbox_template() -> String {
    "node-20".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_health_poll_ms() -> u64 {
    30_000
}
fn default_sandbox_idle_timeout_ms() -> u64 {
    1_800_000
}

/// Applies the environment-variable layer (§6) on top of the parsed config
/// file: `clap` flags (applied by the caller) outrank these, these outrank
/// the file, the file outranks the built-in defaults above.
fn apply_env_overrides(config: &mut ForgeConfig) {
    if let Ok(key) = std::env::var("LLM_API_KEY") {
        config.model.api_key = key;
    }
    if let Ok(key) = std::env::var("SANDBOX_API_KEY") {
        config.sandbox.api_key = key;
    }
    if let Ok(template) = std::env::var("SANDBOX_TEMPLATE_ID") {
        config.sandbox.template_id = template;
    }
    if let Ok(secret) = std::env::var("INTERNAL_SIGNING_SECRET") {
        config.internal_signing_secret = secret;
    }
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        config.log_level = level;
    }
    if let Ok(env) = std::env::var("NODE_ENV") {
        config.app_env = AppEnv::parse(&env);
    }
    if let Ok(env) = std::env::var("APP_ENV") {
        config.app_env = AppEnv::parse(&env);
    }
    if let Ok(ms) = std::env::var("HEALTH_POLL_MS").ok().and_then(|v| v.parse().ok()) {
        config.health_poll_ms = ms;
    }
    if let Ok(ms) = std::env::var("SANDBOX_IDLE_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()) {
        config.sandbox_idle_timeout_ms = ms;
    }
}

/// Validates the required-at-runtime settings enumerated in §6, independent
/// of whether they arrived via file or environment.
fn validate_required(config: &ForgeConfig) -> Result<(), CliError> {
    if config.model.api_key.trim().is_empty() {
        return Err(CliError::usage(
            "LLM_API_KEY is required (set it in the environment or `model.api_key` in the config file)",
        ));
    }
    if config.sandbox.api_key.trim().is_empty() {
        return Err(CliError::usage(
            "SANDBOX_API_KEY is required (set it in the environment or `sandbox.api_key` in the config file)",
        ));
    }
    if config.internal_signing_secret.trim().is_empty() {
        return Err(CliError::usage(
            "INTERNAL_SIGNING_SECRET is required (set it in the environment or `internal_signing_secret` in the config file)",
        ));
    }
    Ok(())
}

fn build_sandbox_provider(template_id: &str) -> Result<Arc<dyn SandboxProvider>, CliError> {
    #[cfg(feature = "docker")]
    {
        forge_sandbox::DockerSandboxProvider::connect(template_id, 512, 1.0)
            .map(|p| Arc::new(p) as Arc<dyn SandboxProvider>)
            .map_err(|e| CliError::internal(e.to_string()))
    }
    #[cfg(not(feature = "docker"))]
    {
        let _ = template_id;
        Ok(Arc::new(InMemorySandboxProvider::new()))
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    if let Err(e) = run().await {
        eprintln!("forge: {}", e.message);
        std::process::exit(e.code as i32);
    }
}

async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();

    let config_str = tokio::fs::read_to_string(&cli.config)
        .await
        .map_err(|e| CliError::io(format!("Failed to read config file '{}': {}", cli.config.display(), e)))?;
    let mut config: ForgeConfig = toml::from_str(&config_str)
        .map_err(|e| CliError::usage(format!("Failed to parse config file '{}': {}", cli.config.display(), e)))?;
    apply_env_overrides(&mut config);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    match cli.command {
        Commands::Serve { host, port } => serve(config, cli.config, host, port).await,
        Commands::Skill { action } => skill_command(action).await,
    }
}

async fn serve(
    config: ForgeConfig,
    config_path: PathBuf,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), CliError> {
    validate_required(&config)?;

    let host = host.unwrap_or(config.server.host);
    let port = port.unwrap_or(config.server.port);
    info!(env = ?config.app_env, "Starting Forge gateway on {}:{}", host, port);

    // Security
    let audit = Arc::new(AuditLog::new(config.data_dir.join("audit")));
    let rate_limiter = Arc::new(RateLimiter::new(config.security.max_burst, config.security.max_requests_per_second));
    let auth_config = AuthConfig::new(config.security.api_keys.clone());
    if auth_config.is_enabled() {
        info!(keys = config.security.api_keys.len(), "API key auth enabled");
    }
    let _internal_signer = Arc::new(forge_security::InternalAuthSigner::new(config.internal_signing_secret.clone()));

    // Hot-reloads rate-limit settings on config file changes, without a
    // restart. Log level is intentionally not live-reloaded: the
    // `tracing_subscriber` global dispatcher is fixed at `init()`.
    let _config_watcher = {
        let rate_limiter = rate_limiter.clone();
        match config_watcher::ConfigWatcher::start(config_path.clone(), 500, move |reloaded| {
            if let Some(security) = reloaded.security {
                let rps = security.get("max_requests_per_second").and_then(|v| v.as_f64());
                let burst = security.get("max_burst").and_then(|v| v.as_f64());
                if let (Some(rps), Some(burst)) = (rps, burst) {
                    rate_limiter.reconfigure(burst, rps);
                    info!(rps, burst, "rate limiter reconfigured from hot-reloaded config");
                }
            }
        }) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(error = %e, "config hot-reload watcher failed to start");
                None
            }
        }
    };

    // Sessions
    let sessions = Arc::new(
        FileSessionStore::new(config.data_dir.join("sessions"))
            .await
            .map_err(|e| CliError::io(e.to_string()))?,
    );

    // Skills — a static, compiled-in catalog (no third-party plugin host).
    let mut registry = SkillRegistry::new();
    forge_builtins::register_builtins(&mut registry);
    info!(count = registry.skill_count(), "Built-in skills registered");
    let mut permissions = PermissionSet::new();
    for desc in registry.list_descriptors() {
        for cap in &desc.required_capabilities {
            permissions.grant(cap.clone());
        }
    }
    let skills = Arc::new(registry);

    // C1 Artifact Store
    let artifact_backend = FileArtifactBackend::new(config.data_dir.join("artifacts"))
        .await
        .map_err(|e| CliError::io(e.to_string()))?;
    let artifacts = Arc::new(ArtifactStore::new(Arc::new(artifact_backend)));

    // C5 LLM Executor, built on the same model config used by the legacy
    // single-agent runner below.
    let llm_client = LlmClient::new(config.model.clone());
    let executor = Arc::new(LlmExecutor::new(
        llm_client,
        skills.clone(),
        permissions.clone(),
        audit.clone(),
        artifacts.clone(),
        config.model.max_turns,
    ));

    // C3/C4 Sandbox Manager + Health & Recovery
    let provider = build_sandbox_provider(&config.sandbox.template_id)?;
    let sandbox = Arc::new(SandboxManager::new(provider, config.sandbox.template_id.clone()));
    let recovery = Arc::new(RecoveryCoordinator::new(sandbox.clone()));
    let health_poller =
        Arc::new(HealthPoller::new(sandbox.clone()).with_interval(Duration::from_millis(config.health_poll_ms)));
    health_poller.spawn();
    spawn_idle_reaper(sandbox.clone(), config.sandbox_idle_timeout_ms);

    // C6-C10
    let registry6 = Arc::new(SubagentRegistry::with_defaults(&config.model));
    let parallel = Arc::new(ParallelProcessor::new(executor.clone()));
    let context_sync = Arc::new(ContextSynchronizer::new(artifacts.clone()));
    let workflow = Arc::new(
        WorkflowManager::new(registry6, executor.clone(), parallel.clone(), artifacts.clone())
            .with_recovery(recovery.clone())
            .with_context_sync(context_sync.clone()),
    );

    let workflow_state = Arc::new(WorkflowApiState::new(
        workflow,
        sandbox,
        recovery,
        parallel,
        artifacts,
        context_sync,
        sessions.clone(),
    ));

    // Legacy single-agent WebSocket surface, kept alongside the workflow API.
    let agent = Arc::new(AgentRunner::new(config.model, skills, permissions, audit));

    let app = GatewayServer::build_full(agent, sessions, Some(rate_limiter), auth_config, Some(workflow_state));

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| CliError::io(e.to_string()))?;

    if config.server.tls.enabled {
        let tls_config = forge_security::tls::TlsConfig {
            enabled: true,
            cert_path: config.server.tls.cert_path.clone(),
            key_path: config.server.tls.key_path.clone(),
            client_ca_path: config.server.tls.client_ca_path.clone(),
        };
        tls::validate_tls_config(&tls_config).await.map_err(|e| CliError::usage(e.to_string()))?;
        let acceptor = tls::build_tls_acceptor(&tls_config).await.map_err(|e| CliError::internal(e.to_string()))?;

        info!("Forge gateway listening on {} (TLS enabled)", addr);
        loop {
            let (stream, peer_addr) =
                listener.accept().await.map_err(|e| CliError::temporary(e.to_string()))?;
            let acceptor = acceptor.clone();
            let app = app.clone();
            tokio::spawn(async move {
                match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        let io = hyper_util::rt::TokioIo::new(tls_stream);
                        let svc = hyper_util::service::TowerToHyperService::new(app);
                        let conn = hyper_util::server::conn::auto::Builder::new(hyper_util::rt::TokioExecutor::new());
                        if let Err(e) = conn.serve_connection(io, svc).await {
                            tracing::error!(peer = %peer_addr, error = %e, "TLS connection error");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(peer = %peer_addr, error = %e, "TLS handshake failed");
                    }
                }
            });
        }
    } else {
        info!("Forge gateway listening on {}", addr);
        axum::serve(listener, app).await.map_err(|e| CliError::temporary(e.to_string()))?;
        Ok(())
    }
}

/// Background loop evicting sandboxes idle past `SANDBOX_IDLE_TIMEOUT_MS`.
/// Runs on a fifth of the idle window (floor 30s) so eviction lags the
/// configured timeout by at most that much.
fn spawn_idle_reaper(sandbox: Arc<SandboxManager>, idle_timeout_ms: u64) {
    let sweep_interval = Duration::from_millis((idle_timeout_ms / 5).max(30_000));
    let idle_timeout = chrono::Duration::milliseconds(idle_timeout_ms as i64);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            let reaped = sandbox.terminate_idle(idle_timeout).await;
            if !reaped.is_empty() {
                info!(count = reaped.len(), "reaped idle sandboxes");
            }
        }
    });
}

async fn skill_command(action: SkillAction) -> Result<(), CliError> {
    match action {
        SkillAction::List => {
            let mut registry = SkillRegistry::new();
            forge_builtins::register_builtins(&mut registry);

            let skills = registry.list_descriptors();
            if skills.is_empty() {
                println!("No skills registered.");
                println!("Configure skills in forge.toml under [[skills]]");
            } else {
                println!("Registered skills:");
                for skill in &skills {
                    println!("  {} — {}", skill.name, skill.description);
                    if !skill.required_capabilities.is_empty() {
                        println!("    Capabilities:");
                        for cap in &skill.required_capabilities {
                            match cap {
                                Capability::FileRead { allowed_paths } => {
                                    println!("      file_read: {:?}", allowed_paths);
                                }
                                Capability::FileWrite { allowed_paths } => {
                                    println!("      file_write: {:?}", allowed_paths);
                                }
                                Capability::NetworkAccess { allowed_hosts } => {
                                    println!("      network: {:?}", allowed_hosts);
                                }
                                Capability::ShellExec { allowed_commands } => {
                                    println!("      shell: {:?}", allowed_commands);
                                }
                                _ => {
                                    println!("      {:?}", cap);
                                }
                            }
                        }
                    }
                }
                println!("\nTotal: {} skill(s)", skills.len());
            }
            Ok(())
        }
    }
}
