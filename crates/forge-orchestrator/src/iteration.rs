use chrono::{DateTime, Utc};
use forge_compliance::{analyze, AnalysisReport, SourceFile};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pass/fail result per named quality dimension, computed from an
/// [`AnalysisReport`]'s issue categories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityGates {
    pub tenant_isolation: bool,
    pub authentication: bool,
    pub error_handling: bool,
    pub type_discipline: bool,
    pub security: bool,
    pub accessibility: bool,
    pub overall_quality: bool,
}

impl QualityGates {
    fn from_report(report: &AnalysisReport) -> Self {
        use forge_compliance::{IssueCategory, Severity};

        let any_rule = |prefix: &str, min_severity: Severity| {
            report.issues.iter().any(|i| {
                i.rule_id.starts_with(prefix) && severity_at_least(i.severity, min_severity)
            })
        };

        Self {
            tenant_isolation: !any_rule("tenant-isolation", Severity::Low),
            authentication: !any_rule("authentication", Severity::Low),
            error_handling: !any_rule("error-handling", Severity::High),
            type_discipline: !any_rule("type-discipline", Severity::High),
            security: !report.issues.iter().any(|i| {
                i.category == IssueCategory::Security && i.severity == Severity::Critical
            }),
            accessibility: !any_rule("accessibility", Severity::High),
            overall_quality: report.score >= 85,
        }
    }
}

fn severity_rank(s: forge_compliance::Severity) -> u8 {
    use forge_compliance::Severity;
    match s {
        Severity::Critical => 4,
        Severity::High => 3,
        Severity::Medium => 2,
        Severity::Low => 1,
        Severity::Info => 0,
    }
}

fn severity_at_least(actual: forge_compliance::Severity, min: forge_compliance::Severity) -> bool {
    severity_rank(actual) >= severity_rank(min)
}

/// What C9 decides to do with phase-4 work after one round of review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IterationDecision {
    Completed,
    Blocked,
    CodeReview,
}

/// One round of the phase-4 inner loop, stored append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Iteration {
    pub iteration_number: u32,
    pub task_id: Uuid,
    pub report: AnalysisReport,
    pub gates: QualityGates,
    pub decision: IterationDecision,
    pub feedback: Vec<String>,
    pub improvement_suggestions: Vec<String>,
    pub created_at: DateTime<Utc>,
}

fn feedback_and_suggestions(report: &AnalysisReport) -> (Vec<String>, Vec<String>) {
    let mut feedback = Vec::new();
    let mut suggestions = Vec::new();
    for issue in &report.issues {
        feedback.push(format!(
            "{file}:{line} [{severity:?}] {rule}",
            file = issue.file,
            line = issue.line.unwrap_or(0),
            severity = issue.severity,
            rule = issue.rule_id,
        ));
        if let Some(fix) = &issue.fix {
            if !suggestions.contains(fix) {
                suggestions.push(fix.clone());
            }
        }
    }
    (feedback, suggestions)
}

fn decide(report: &AnalysisReport) -> IterationDecision {
    let critical = report
        .issue_counts_by_severity
        .get("critical")
        .copied()
        .unwrap_or(0);
    if report.score >= 90 && critical == 0 {
        IterationDecision::Completed
    } else if critical > 0 {
        IterationDecision::Blocked
    } else {
        IterationDecision::CodeReview
    }
}

/// Drives the phase-4 inner loop: run C2 over a task's generated files,
/// compute quality gates, decide the task's next state, and keep an
/// append-only iteration history per task.
#[derive(Default)]
pub struct DevIterationManager {
    iterations: std::collections::HashMap<Uuid, Vec<Iteration>>,
}

impl DevIterationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs one iteration for `task_id` over the given files, stores it, and
    /// returns it.
    pub fn run_iteration(&mut self, task_id: Uuid, files: &[SourceFile]) -> Iteration {
        let report = analyze(files);
        let gates = QualityGates::from_report(&report);
        let decision = decide(&report);
        let (feedback, improvement_suggestions) = feedback_and_suggestions(&report);

        let history = self.iterations.entry(task_id).or_default();
        let iteration = Iteration {
            iteration_number: history.len() as u32 + 1,
            task_id,
            report,
            gates,
            decision,
            feedback,
            improvement_suggestions,
            created_at: Utc::now(),
        };
        history.push(iteration.clone());
        iteration
    }

    pub fn history(&self, task_id: Uuid) -> &[Iteration] {
        self.iterations.get(&task_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn latest(&self, task_id: Uuid) -> Option<&Iteration> {
        self.history(task_id).last()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn clean_file() -> SourceFile {
        SourceFile::new(
            "src/handlers/orders.rs",
            "async fn get_orders(ctx: &Ctx) -> Result<()> {\n\
             require_identity(ctx)?;\n\
             require_workspace(ctx)?;\n\
             let rows = sqlx::query(\"SELECT * FROM orders WHERE workspace_id = $1\").bind(ctx.workspace_id);\n\
             Ok(())\n\
             }\n",
        )
    }

    fn critical_file() -> SourceFile {
        SourceFile::new(
            "src/handlers/orders.rs",
            "app.get(\"/orders\", async fn handler() {\n\
             let key = \"sk_live_abcdef1234567890\";\n\
             let q = \"SELECT * FROM orders\";\n\
             })\n",
        )
    }

    #[test]
    fn clean_code_completes_on_first_iteration() {
        let mut mgr = DevIterationManager::new();
        let task_id = Uuid::new_v4();
        let iteration = mgr.run_iteration(task_id, &[clean_file()]);
        assert_eq!(iteration.iteration_number, 1);
        assert_eq!(iteration.decision, IterationDecision::Completed);
        assert!(iteration.gates.overall_quality);
    }

    #[test]
    fn critical_findings_block_the_task() {
        let mut mgr = DevIterationManager::new();
        let task_id = Uuid::new_v4();
        let iteration = mgr.run_iteration(task_id, &[critical_file()]);
        assert_eq!(iteration.decision, IterationDecision::Blocked);
        assert!(!iteration.feedback.is_empty());
    }

    #[test]
    fn history_is_append_only_and_numbered() {
        let mut mgr = DevIterationManager::new();
        let task_id = Uuid::new_v4();
        mgr.run_iteration(task_id, &[critical_file()]);
        mgr.run_iteration(task_id, &[clean_file()]);
        let history = mgr.history(task_id);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].iteration_number, 1);
        assert_eq!(history[1].iteration_number, 2);
        assert_eq!(mgr.latest(task_id).unwrap().iteration_number, 2);
    }

    #[test]
    fn unknown_task_has_empty_history() {
        let mgr = DevIterationManager::new();
        assert!(mgr.history(Uuid::new_v4()).is_empty());
        assert!(mgr.latest(Uuid::new_v4()).is_none());
    }
}
