//! Run report schema (stable v1)
//!
//! This schema is STABLE and VERSIONED.
//! Breaking changes require a new version.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use crate::diagnostic::{Diagnostic, Severity};

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Overall result of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    Failed,
}

/// Summary statistics for a report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Total number of diagnostics
    pub total: usize,

    /// Number of errors
    pub errors: usize,

    /// Number of warnings
    pub warnings: usize,

    /// Number of info messages
    pub info: usize,
}

/// Dry-run numbers as reported by the warehouse
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimateSummary {
    pub estimated_bytes: u64,
    pub max_bytes_billed: u64,
    pub slot_millis: f64,
}

/// What the reconciler did (or would do) with the remote scheduled query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploySummary {
    /// `created`, `updated`, `would_create` or `would_update`
    pub action: String,

    /// Remote resource name, when one is known
    pub remote_name: Option<String>,

    /// Fully qualified destination table
    pub destination: String,
}

/// Run report (report.json v1)
///
/// Written by every command when `--report` is given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Schema version
    pub version: ReportVersion,

    /// Timestamp (ISO 8601)
    pub timestamp: String,

    /// Command that produced the report (validate, render, dry-run, deploy)
    pub action: String,

    /// Job name, when the spec was readable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,

    pub outcome: RunOutcome,

    /// Summary statistics
    pub summary: ReportSummary,

    /// All diagnostics
    pub diagnostics: Vec<Diagnostic>,

    /// SHA-256 of the rendered SQL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_fingerprint: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimate: Option<EstimateSummary>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeploySummary>,
}

impl Report {
    /// Create a new, successful report with no diagnostics
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            version: ReportVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            action: action.into(),
            job: None,
            outcome: RunOutcome::Succeeded,
            summary: ReportSummary::default(),
            diagnostics: Vec::new(),
            sql_fingerprint: None,
            estimate: None,
            deploy: None,
        }
    }

    /// Create a report from diagnostics; any error marks the run as failed
    pub fn from_diagnostics(action: impl Into<String>, diagnostics: Vec<Diagnostic>) -> Self {
        let mut report = Self::new(action);
        for diagnostic in diagnostics {
            report.add_diagnostic(diagnostic);
        }
        report
    }

    /// Add a diagnostic to the report
    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => {
                self.summary.errors += 1;
                self.outcome = RunOutcome::Failed;
            }
            Severity::Warn => self.summary.warnings += 1,
            Severity::Info => self.summary.info += 1,
        }

        self.summary.total += 1;
        self.diagnostics.push(diagnostic);
    }

    pub fn with_job(mut self, job: impl Into<String>) -> Self {
        self.job = Some(job.into());
        self
    }

    /// Record the fingerprint of the rendered SQL
    pub fn with_sql(mut self, sql: &str) -> Self {
        self.sql_fingerprint = Some(sql_fingerprint(sql));
        self
    }

    /// Check if the report has any errors
    pub fn has_errors(&self) -> bool {
        self.summary.errors > 0
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }
}

/// Hex-encoded SHA-256 of a rendered query
pub fn sql_fingerprint(sql: &str) -> String {
    hex::encode(Sha256::digest(sql.as_bytes()))
}
