use forge_agent::{ExecutionOptions, LlmExecutor};
use forge_artifacts::ArtifactRef;
use forge_core::{ForgeError, ForgeResult, WorkspaceId};
use forge_session::Session;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};
use uuid::Uuid;

/// Default bound on concurrently-executing tasks within a wave.
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 3;
/// Default per-task budget before it is treated as failed.
pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;
/// Default number of retries after the first attempt.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 2;
const BACKOFF_BASE_MS: u64 = 1_000;
const BACKOFF_CAP_MS: u64 = 30_000;

/// One task within a [`ParallelBatch`].
#[derive(Debug, Clone)]
pub struct ParallelTask {
    pub id: Uuid,
    pub prompt: String,
    pub refs: Vec<ArtifactRef>,
    pub phase: u8,
    /// Other tasks in the same batch this one depends on, and whether that
    /// dependency is strict (failure cancels this task) or soft (failure
    /// lets this task run with a `null` artifact ref standing in for it).
    pub dependencies: Vec<TaskDependency>,
    pub priority: u8,
    pub estimated_duration_ms: u64,
    pub timeout_ms: u64,
    pub retry_attempts: u32,
}

impl ParallelTask {
    pub fn new(prompt: impl Into<String>, phase: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            refs: Vec::new(),
            phase,
            dependencies: Vec::new(),
            priority: 0,
            estimated_duration_ms: 0,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        }
    }

    pub fn depends_on(mut self, task_id: Uuid, strict: bool) -> Self {
        self.dependencies.push(TaskDependency { task_id, strict });
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_estimated_duration_ms(mut self, ms: u64) -> Self {
        self.estimated_duration_ms = ms;
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TaskDependency {
    pub task_id: Uuid,
    pub strict: bool,
}

/// A set of independent-but-related tasks to run under C7.
pub struct ParallelBatch {
    pub id: Uuid,
    pub workspace_id: WorkspaceId,
    pub tasks: Vec<ParallelTask>,
}

impl ParallelBatch {
    pub fn new(workspace_id: WorkspaceId, tasks: Vec<ParallelTask>) -> Self {
        Self { id: Uuid::new_v4(), workspace_id, tasks }
    }
}

/// Terminal state of one task once the batch finishes with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed { response: String, files_modified: Vec<String> },
    Failed { error: String },
    /// Short-circuited because a strict dependency failed or was cancelled.
    Cancelled,
}

/// Progress emitted after every task transition (§4.7 step 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub batch_id: Uuid,
    pub completed: usize,
    pub total: usize,
    pub percentage: f32,
    pub in_flight: Vec<Uuid>,
}

/// Final result of running a batch to completion (or cancellation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub outcomes: HashMap<Uuid, TaskOutcome>,
    pub cancelled: bool,
}

/// Executes [`ParallelBatch`]es: dependency-graph waves, bounded
/// concurrency, per-task timeout/retry, and progress streaming (C7).
pub struct ParallelProcessor {
    executor: Arc<LlmExecutor>,
    max_concurrent_tasks: usize,
}

impl ParallelProcessor {
    pub fn new(executor: Arc<LlmExecutor>) -> Self {
        Self { executor, max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS }
    }

    pub fn with_max_concurrent_tasks(mut self, n: usize) -> Self {
        self.max_concurrent_tasks = n.max(1);
        self
    }

    /// Partitions `batch.tasks` into dependency waves. Each element of the
    /// returned vec is a wave: a maximal set of task ids whose dependencies
    /// are all satisfied by earlier waves. Rejects cyclic graphs.
    fn plan_waves(tasks: &[ParallelTask]) -> ForgeResult<Vec<Vec<Uuid>>> {
        let ids: HashSet<Uuid> = tasks.iter().map(|t| t.id).collect();
        let mut indegree: HashMap<Uuid, usize> = HashMap::new();
        let mut dependents: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for task in tasks {
            let deps_in_batch =
                task.dependencies.iter().filter(|d| ids.contains(&d.task_id)).count();
            indegree.insert(task.id, deps_in_batch);
            for dep in &task.dependencies {
                dependents.entry(dep.task_id).or_default().push(task.id);
            }
        }

        let mut waves = Vec::new();
        let mut resolved: HashSet<Uuid> = HashSet::new();
        let mut remaining = indegree.clone();

        while !remaining.is_empty() {
            let wave: Vec<Uuid> = remaining
                .iter()
                .filter(|(_, &deg)| deg == 0)
                .map(|(id, _)| *id)
                .collect();

            if wave.is_empty() {
                return Err(ForgeError::DependencyCycle(format!(
                    "{} task(s) form a dependency cycle",
                    remaining.len()
                )));
            }

            for id in &wave {
                remaining.remove(id);
                resolved.insert(*id);
                if let Some(deps) = dependents.get(id) {
                    for dependent in deps {
                        if let Some(deg) = remaining.get_mut(dependent) {
                            *deg = deg.saturating_sub(1);
                        }
                    }
                }
            }
            waves.push(wave);
        }

        Ok(waves)
    }

    /// Sends a progress snapshot including the current in-flight task set
    /// (§4.7 step 6), tolerating a dropped receiver.
    async fn emit_progress(
        tx: &mpsc::UnboundedSender<ProgressEvent>,
        batch_id: Uuid,
        completed: usize,
        total: usize,
        in_flight_ids: &Arc<tokio::sync::Mutex<HashSet<Uuid>>>,
    ) {
        let in_flight: Vec<Uuid> = in_flight_ids.lock().await.iter().copied().collect();
        let _ = tx.send(ProgressEvent {
            batch_id,
            completed,
            total,
            percentage: if total == 0 { 100.0 } else { completed as f32 / total as f32 * 100.0 },
            in_flight,
        });
    }

    fn backoff_delay(attempt: u32) -> Duration {
        let ms = BACKOFF_BASE_MS.saturating_mul(1u64 << attempt.min(5)).min(BACKOFF_CAP_MS);
        Duration::from_millis(ms)
    }

    async fn run_task_with_retry(
        executor: Arc<LlmExecutor>,
        workspace_id: WorkspaceId,
        task: ParallelTask,
    ) -> TaskOutcome {
        let mut last_error = String::new();
        for attempt in 0..=task.retry_attempts {
            if attempt > 0 {
                tokio::time::sleep(Self::backoff_delay(attempt - 1)).await;
            }
            let mut session = Session::new();
            let opts = ExecutionOptions { refs: task.refs.clone(), phase: task.phase, ..Default::default() };
            let fut = executor.execute(workspace_id, &mut session, &task.prompt, opts);
            match tokio::time::timeout(Duration::from_millis(task.timeout_ms), fut).await {
                Ok(result) if result.success => {
                    return TaskOutcome::Completed {
                        response: result.response,
                        files_modified: result.files_modified,
                    };
                }
                Ok(result) => {
                    last_error = result.error.unwrap_or_else(|| "task failed".to_string());
                    warn!(task_id = %task.id, attempt, error = %last_error, "parallel task attempt failed");
                }
                Err(_) => {
                    last_error = format!("task timed out after {}ms", task.timeout_ms);
                    warn!(task_id = %task.id, attempt, "parallel task attempt timed out");
                }
            }
        }
        TaskOutcome::Failed { error: last_error }
    }

    /// Runs `batch` to completion, bounding concurrency within each wave and
    /// emitting a [`ProgressEvent`] after every task transition. `cancel`
    /// lets a caller request cancellation between waves; in-flight tasks in
    /// the wave being cancelled are still awaited (so their session locks
    /// are released) but their results are discarded per C5 cancel
    /// semantics.
    pub async fn execute(
        &self,
        batch: ParallelBatch,
        progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
        cancel: Option<Arc<std::sync::atomic::AtomicBool>>,
    ) -> ForgeResult<BatchResult> {
        let total = batch.tasks.len();
        let waves = Self::plan_waves(&batch.tasks)?;
        let tasks_by_id: HashMap<Uuid, ParallelTask> =
            batch.tasks.into_iter().map(|t| (t.id, t)).collect();

        let mut outcomes: HashMap<Uuid, TaskOutcome> = HashMap::new();
        let mut cancelled_batch = false;
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_tasks));

        'waves: for wave_ids in waves {
            if cancel.as_ref().is_some_and(|c| c.load(std::sync::atomic::Ordering::SeqCst)) {
                cancelled_batch = true;
                for id in &wave_ids {
                    outcomes.insert(*id, TaskOutcome::Cancelled);
                }
                break 'waves;
            }

            // Strict-dependency propagation: a task whose strict dependency
            // already failed or was cancelled never runs.
            let mut runnable = Vec::new();
            for id in wave_ids {
                let task = tasks_by_id.get(&id).expect("wave id came from tasks_by_id");
                let strict_dep_down = task.dependencies.iter().any(|d| {
                    d.strict
                        && matches!(
                            outcomes.get(&d.task_id),
                            Some(TaskOutcome::Failed { .. }) | Some(TaskOutcome::Cancelled)
                        )
                });
                if strict_dep_down {
                    outcomes.insert(id, TaskOutcome::Cancelled);
                } else {
                    runnable.push(task.clone());
                }
            }

            runnable.sort_by(|a, b| {
                b.priority.cmp(&a.priority).then(a.estimated_duration_ms.cmp(&b.estimated_duration_ms))
            });

            let in_flight_ids: Arc<tokio::sync::Mutex<HashSet<Uuid>>> =
                Arc::new(tokio::sync::Mutex::new(HashSet::new()));

            let mut handles = Vec::new();
            for task in runnable {
                let permit = Arc::clone(&semaphore);
                let executor = Arc::clone(&self.executor);
                let workspace_id = batch.workspace_id;
                let task_id = task.id;

                in_flight_ids.lock().await.insert(task_id);
                if let Some(tx) = &progress {
                    Self::emit_progress(tx, batch.id, outcomes.len(), total, &in_flight_ids).await;
                }

                let in_flight_ids = Arc::clone(&in_flight_ids);
                let handle = tokio::spawn(async move {
                    let _permit = permit.acquire_owned().await.expect("semaphore not closed");
                    let outcome = Self::run_task_with_retry(executor, workspace_id, task).await;
                    in_flight_ids.lock().await.remove(&task_id);
                    (task_id, outcome)
                });
                handles.push(handle);
            }

            for handle in handles {
                match handle.await {
                    Ok((task_id, outcome)) => {
                        outcomes.insert(task_id, outcome);
                    }
                    Err(join_err) => {
                        warn!(error = %join_err, "parallel task panicked");
                    }
                }
                if let Some(tx) = &progress {
                    Self::emit_progress(tx, batch.id, outcomes.len(), total, &in_flight_ids).await;
                }
            }
        }

        info!(
            batch_id = %batch.id,
            completed = outcomes.len(),
            total,
            cancelled = cancelled_batch,
            "parallel batch finished"
        );

        Ok(BatchResult { batch_id: batch.id, outcomes, cancelled: cancelled_batch })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn task(priority: u8) -> ParallelTask {
        ParallelTask::new("do work", 4).with_priority(priority)
    }

    #[test]
    fn plan_waves_single_wave_for_independent_tasks() {
        let tasks = vec![task(0), task(0), task(0)];
        let waves = ParallelProcessor::plan_waves(&tasks).unwrap();
        assert_eq!(waves.len(), 1);
        assert_eq!(waves[0].len(), 3);
    }

    #[test]
    fn plan_waves_respects_chain() {
        let a = task(0);
        let b = ParallelTask::new("b", 4).depends_on(a.id, true);
        let c = ParallelTask::new("c", 4).depends_on(b.id, true);
        let waves = ParallelProcessor::plan_waves(&[a, b, c]).unwrap();
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[0].len(), 1);
    }

    #[test]
    fn plan_waves_detects_cycle() {
        let a_id = Uuid::new_v4();
        let b_id = Uuid::new_v4();
        let mut a = ParallelTask::new("a", 4);
        a.id = a_id;
        a.dependencies.push(TaskDependency { task_id: b_id, strict: true });
        let mut b = ParallelTask::new("b", 4);
        b.id = b_id;
        b.dependencies.push(TaskDependency { task_id: a_id, strict: true });

        let err = ParallelProcessor::plan_waves(&[a, b]).unwrap_err();
        assert!(matches!(err, ForgeError::DependencyCycle(_)));
    }

    #[test]
    fn backoff_delay_is_capped() {
        assert_eq!(ParallelProcessor::backoff_delay(0), Duration::from_millis(1000));
        assert_eq!(ParallelProcessor::backoff_delay(10), Duration::from_millis(BACKOFF_CAP_MS));
    }
}
