//! Stateless rule-based static analysis of generated source files (C2).
//!
//! `analyze` runs an ordered table of independent rule functions over every
//! file and merges the results into a single deterministic, scored report.
//! Each rule operates on raw path+content via regex/line scanning; there is
//! no AST, so the rule table can grow without touching scoring or merge
//! logic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::report::Severity;

/// A source file submitted for analysis.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Grouping used to steer remediation, independent of severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueCategory {
    Security,
    Architecture,
    Performance,
    Maintainability,
    Accessibility,
}

/// One finding produced by a single rule against a single file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceIssue {
    pub id: String,
    pub severity: Severity,
    pub category: IssueCategory,
    pub file: String,
    pub line: Option<u32>,
    pub code: Option<String>,
    pub fix: Option<String>,
    pub rule_id: &'static str,
}

/// The full output of [`analyze`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub score: u8,
    pub issue_counts_by_severity: BTreeMap<String, usize>,
    pub issues: Vec<ComplianceIssue>,
    pub summary: String,
    pub recommendations: Vec<String>,
}

fn severity_rank(s: Severity) -> u8 {
    match s {
        Severity::Critical => 0,
        Severity::High => 1,
        Severity::Medium => 2,
        Severity::Low => 3,
        Severity::Info => 4,
    }
}

fn severity_label(s: Severity) -> &'static str {
    match s {
        Severity::Critical => "critical",
        Severity::High => "high",
        Severity::Medium => "medium",
        Severity::Low => "low",
        Severity::Info => "info",
    }
}

type RuleFn = fn(&SourceFile) -> Vec<ComplianceIssue>;

/// Ordered rule table. Order only affects nothing observable (issues are
/// re-sorted after merge), but keeping it in the spec's enumeration order
/// makes the table easy to audit against the rule families it implements.
const RULES: &[RuleFn] = &[
    tenant_isolation_rule,
    authentication_rule,
    error_handling_rule,
    type_discipline_rule,
    secrets_rule,
    injection_rule,
    accessibility_rule,
    performance_architecture_rule,
];

/// Runs every rule against every file and returns a single merged, scored,
/// deterministically ordered report. Same input files always produce the
/// same report, byte for byte.
pub fn analyze(files: &[SourceFile]) -> AnalysisReport {
    let mut issues: Vec<ComplianceIssue> = files
        .iter()
        .flat_map(|file| RULES.iter().flat_map(move |rule| rule(file)))
        .collect();

    issues.sort_by(|a, b| {
        severity_rank(a.severity)
            .cmp(&severity_rank(b.severity))
            .then_with(|| a.file.cmp(&b.file))
            .then_with(|| a.line.cmp(&b.line))
            .then_with(|| a.rule_id.cmp(b.rule_id))
    });

    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for label in ["critical", "high", "medium", "low", "info"] {
        counts.insert(label.to_string(), 0);
    }
    for issue in &issues {
        *counts.entry(severity_label(issue.severity).to_string()).or_insert(0) += 1;
    }

    let critical = counts["critical"] as i32;
    let high = counts["high"] as i32;
    let medium = counts["medium"] as i32;
    let low = counts["low"] as i32;
    let score = (100 - 25 * critical - 10 * high - 5 * medium - 2 * low).max(0) as u8;

    let summary = format!(
        "score {score}/100 across {} files: {critical} critical, {high} high, {medium} medium, {low} low",
        files.len()
    );

    let recommendations = issues
        .iter()
        .filter(|i| matches!(i.severity, Severity::Critical | Severity::High))
        .filter_map(|i| i.fix.clone())
        .fold(Vec::new(), |mut acc, fix| {
            if !acc.contains(&fix) {
                acc.push(fix);
            }
            acc
        });

    AnalysisReport {
        score,
        issue_counts_by_severity: counts,
        issues,
        summary,
        recommendations,
    }
}

fn line_of(content: &str, byte_offset: usize) -> u32 {
    content[..byte_offset].matches('\n').count() as u32 + 1
}

static SQL_STATEMENT: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)\b(SELECT|INSERT\s+INTO|UPDATE|DELETE\s+FROM)\b[^;\n]*")
        .expect("static regex is valid")
});
static TENANT_FILTER: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?i)workspace_id|tenant_id").expect("static regex is valid"));

/// Rule 1: any data-layer statement that omits a tenant filter is critical.
fn tenant_isolation_rule(file: &SourceFile) -> Vec<ComplianceIssue> {
    SQL_STATEMENT
        .find_iter(&file.content)
        .filter(|m| !TENANT_FILTER.is_match(m.as_str()))
        .map(|m| ComplianceIssue {
            id: format!("{}:{}", file.path, line_of(&file.content, m.start())),
            severity: Severity::Critical,
            category: IssueCategory::Security,
            file: file.path.clone(),
            line: Some(line_of(&file.content, m.start())),
            code: Some(m.as_str().trim().to_string()),
            fix: Some("scope this query with workspace_id/tenant_id".to_string()),
            rule_id: "tenant-isolation",
        })
        .collect()
}

static HANDLER_ENTRY: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?m)^.*(app|router)\.(get|post|put|patch|delete)\s*\(").expect("static regex is valid")
});
static IDENTITY_CHECK: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?i)requireAuth|verifyIdentity|getAuthenticatedUser").expect("static regex is valid"));
static WORKSPACE_CHECK: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?i)checkWorkspaceAccess|assertWorkspace").expect("static regex is valid"));

/// Rule 2: server-side entry points must verify identity and workspace
/// access. Missing either is flagged; missing both is the critical case.
fn authentication_rule(file: &SourceFile) -> Vec<ComplianceIssue> {
    if !HANDLER_ENTRY.is_match(&file.content) {
        return Vec::new();
    }
    let has_identity = IDENTITY_CHECK.is_match(&file.content);
    let has_workspace = WORKSPACE_CHECK.is_match(&file.content);

    if has_identity && has_workspace {
        return Vec::new();
    }

    let severity = if !has_identity && !has_workspace {
        Severity::Critical
    } else {
        Severity::High
    };

    vec![ComplianceIssue {
        id: format!("{}:auth", file.path),
        severity,
        category: IssueCategory::Security,
        file: file.path.clone(),
        line: None,
        code: None,
        fix: Some("call an identity verifier and a workspace-access check before handling the request".to_string()),
        rule_id: "authentication",
    }]
}

static ASYNC_FN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?m)^.*\basync\s+function\b.*\{").expect("static regex is valid"));
static CATCH_BLOCK: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"catch\s*\([^)]*\)\s*\{([^}]*)\}").expect("static regex is valid"));
static LOGGER_CALL: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?i)log(ger)?\.(error|warn)|console\.error").expect("static regex is valid"));

/// Rule 3: async functions without structured error recovery, and catch
/// blocks that swallow errors without logging them.
fn error_handling_rule(file: &SourceFile) -> Vec<ComplianceIssue> {
    let mut issues = Vec::new();

    let async_fns = ASYNC_FN.find_iter(&file.content).count();
    let try_blocks = file.content.matches("try {").count() + file.content.matches("try{").count();
    if async_fns > 0 && try_blocks == 0 {
        issues.push(ComplianceIssue {
            id: format!("{}:error-recovery", file.path),
            severity: Severity::Medium,
            category: IssueCategory::Maintainability,
            file: file.path.clone(),
            line: None,
            code: None,
            fix: Some("wrap async operations in try/catch with structured recovery".to_string()),
            rule_id: "error-handling-missing-recovery",
        });
    }

    for cap in CATCH_BLOCK.captures_iter(&file.content) {
        let Some(m) = cap.get(0) else { continue };
        let body = &cap[1];
        if !LOGGER_CALL.is_match(body) {
            issues.push(ComplianceIssue {
                id: format!("{}:{}", file.path, line_of(&file.content, m.start())),
                severity: Severity::Medium,
                category: IssueCategory::Maintainability,
                file: file.path.clone(),
                line: Some(line_of(&file.content, m.start())),
                code: None,
                fix: Some("log the caught error before returning or continuing".to_string()),
                rule_id: "error-handling-silent-catch",
            });
        }
    }
    issues
}

static ANY_ESCAPE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r":\s*any\b").expect("static regex is valid"));
static FN_NO_RETURN_TYPE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?m)^\s*(export\s+)?function\s+\w+\s*\([^)]*\)\s*\{").expect("static regex is valid")
});

/// Rule 4: use of the untyped escape hatch, or functions missing a return
/// type annotation.
fn type_discipline_rule(file: &SourceFile) -> Vec<ComplianceIssue> {
    if !file.path.ends_with(".ts") && !file.path.ends_with(".tsx") {
        return Vec::new();
    }
    let mut issues = Vec::new();

    for m in ANY_ESCAPE.find_iter(&file.content) {
        issues.push(ComplianceIssue {
            id: format!("{}:{}", file.path, line_of(&file.content, m.start())),
            severity: Severity::High,
            category: IssueCategory::Maintainability,
            file: file.path.clone(),
            line: Some(line_of(&file.content, m.start())),
            code: Some(m.as_str().to_string()),
            fix: Some("replace `any` with a precise type or a generic".to_string()),
            rule_id: "type-discipline-any",
        });
    }

    for m in FN_NO_RETURN_TYPE.find_iter(&file.content) {
        issues.push(ComplianceIssue {
            id: format!("{}:{}:fn", file.path, line_of(&file.content, m.start())),
            severity: Severity::Medium,
            category: IssueCategory::Maintainability,
            file: file.path.clone(),
            line: Some(line_of(&file.content, m.start())),
            code: None,
            fix: Some("annotate the function's return type".to_string()),
            rule_id: "type-discipline-missing-return-type",
        });
    }
    issues
}

static SECRET_LITERAL: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r#"(?i)(api[_-]?key|secret|password|token)\s*[:=]\s*['"][A-Za-z0-9_\-/+=]{8,}['"]"#)
        .expect("static regex is valid")
});

/// Rule 5: literal strings matching api-key/password/token shapes.
fn secrets_rule(file: &SourceFile) -> Vec<ComplianceIssue> {
    SECRET_LITERAL
        .find_iter(&file.content)
        .map(|m| ComplianceIssue {
            id: format!("{}:{}", file.path, line_of(&file.content, m.start())),
            severity: Severity::Critical,
            category: IssueCategory::Security,
            file: file.path.clone(),
            line: Some(line_of(&file.content, m.start())),
            code: None,
            fix: Some("move this secret into environment configuration".to_string()),
            rule_id: "secrets-literal",
        })
        .collect()
}

static DYNAMIC_SQL: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r#"(?i)(query|execute)\s*\(\s*(["'`][^"'`]*["'`]\s*\+|`[^`]*\$\{)"#)
        .expect("static regex is valid")
});

/// Rule 6: raw dynamic SQL construction via string concatenation or
/// template interpolation.
fn injection_rule(file: &SourceFile) -> Vec<ComplianceIssue> {
    DYNAMIC_SQL
        .find_iter(&file.content)
        .map(|m| ComplianceIssue {
            id: format!("{}:{}", file.path, line_of(&file.content, m.start())),
            severity: Severity::Critical,
            category: IssueCategory::Security,
            file: file.path.clone(),
            line: Some(line_of(&file.content, m.start())),
            code: Some(m.as_str().to_string()),
            fix: Some("use parameterized queries instead of string-built SQL".to_string()),
            rule_id: "injection-dynamic-sql",
        })
        .collect()
}

static IMG_TAG: LazyLock<regex::Regex> = LazyLock::new(|| regex::Regex::new(r"<img\b[^>]*>").expect("static regex is valid"));
static ALT_ATTR: LazyLock<regex::Regex> = LazyLock::new(|| regex::Regex::new(r#"\balt\s*="#).expect("static regex is valid"));
static INPUT_TAG: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"<input\b[^>]*>").expect("static regex is valid"));
static ARIA_LABEL: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r#"\b(aria-label|aria-labelledby)\s*="#).expect("static regex is valid"));

/// Rule 7: images without text alternatives, inputs without labels.
fn accessibility_rule(file: &SourceFile) -> Vec<ComplianceIssue> {
    let mut issues = Vec::new();
    for m in IMG_TAG.find_iter(&file.content) {
        if !ALT_ATTR.is_match(m.as_str()) {
            issues.push(ComplianceIssue {
                id: format!("{}:{}:img", file.path, line_of(&file.content, m.start())),
                severity: Severity::High,
                category: IssueCategory::Accessibility,
                file: file.path.clone(),
                line: Some(line_of(&file.content, m.start())),
                code: Some(m.as_str().to_string()),
                fix: Some("add an `alt` attribute describing the image".to_string()),
                rule_id: "accessibility-img-alt",
            });
        }
    }
    for m in INPUT_TAG.find_iter(&file.content) {
        if !ARIA_LABEL.is_match(m.as_str()) {
            issues.push(ComplianceIssue {
                id: format!("{}:{}:input", file.path, line_of(&file.content, m.start())),
                severity: Severity::High,
                category: IssueCategory::Accessibility,
                file: file.path.clone(),
                line: Some(line_of(&file.content, m.start())),
                code: Some(m.as_str().to_string()),
                fix: Some("associate a label via `aria-label` or a `<label>` element".to_string()),
                rule_id: "accessibility-input-label",
            });
        }
    }
    issues
}

static LEGACY_ROUTER: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"pages/api/").expect("static regex is valid"));
static NAMESPACE_IMPORT: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?m)^\s*import\s+\*\s+as\s+\w+\s+from").expect("static regex is valid"));

/// Rule 8: legacy router patterns and oversized namespace imports.
fn performance_architecture_rule(file: &SourceFile) -> Vec<ComplianceIssue> {
    let mut issues = Vec::new();
    if LEGACY_ROUTER.is_match(&file.path) {
        issues.push(ComplianceIssue {
            id: format!("{}:legacy-router", file.path),
            severity: Severity::Medium,
            category: IssueCategory::Architecture,
            file: file.path.clone(),
            line: None,
            code: None,
            fix: Some("migrate off the legacy pages router".to_string()),
            rule_id: "architecture-legacy-router",
        });
    }
    for m in NAMESPACE_IMPORT.find_iter(&file.content) {
        issues.push(ComplianceIssue {
            id: format!("{}:{}:import", file.path, line_of(&file.content, m.start())),
            severity: Severity::Low,
            category: IssueCategory::Performance,
            file: file.path.clone(),
            line: Some(line_of(&file.content, m.start())),
            code: Some(m.as_str().trim().to_string()),
            fix: Some("import only the named bindings you use".to_string()),
            rule_id: "performance-namespace-import",
        });
    }
    issues
}
