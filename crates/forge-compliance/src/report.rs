use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supported compliance frameworks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplianceFramework {
    GDPR,
    ISO27001,
    ISO42001,
    DPGA,
}

impl std::fmt::Display for ComplianceFramework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComplianceFramework::GDPR => write!(f, "GDPR"),
            ComplianceFramework::ISO27001 => write!(f, "ISO 27001"),
            ComplianceFramework::ISO42001 => write!(f, "ISO 42001"),
            ComplianceFramework::DPGA => write!(f, "DPGA"),
        }
    }
}

/// Overall compliance status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplianceStatus {
    Compliant,
    PartiallyCompliant,
    NonCompliant,
}

/// Severity level of a compliance finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

/// A specific compliance finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub framework: ComplianceFramework,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub recommendation: String,
    pub compliant: bool,
}

/// A full compliance report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub framework: ComplianceFramework,
    pub status: ComplianceStatus,
    pub findings: Vec<Finding>,
    pub generated_at: DateTime<Utc>,
    pub summary: String,
}

impl ComplianceReport {
    pub fn new(framework: ComplianceFramework, findings: Vec<Finding>) -> Self {
        let compliant_count = findings.iter().filter(|f| f.compliant).count();
        let total = findings.len();

        let status = if compliant_count == total {
            ComplianceStatus::Compliant
        } else if compliant_count == 0 {
            ComplianceStatus::NonCompliant
        } else {
            ComplianceStatus::PartiallyCompliant
        };

        let summary = format!(
            "{}: {}/{} controls compliant",
            framework, compliant_count, total
        );

        Self {
            framework,
            status,
            findings,
            generated_at: Utc::now(),
            summary,
        }
    }

    pub fn critical_findings(&self) -> Vec<&Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Critical && !f.compliant)
            .collect()
    }
}
