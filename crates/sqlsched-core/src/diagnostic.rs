//! Diagnostic codes and error reporting
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // Job spec loading and validation (1xxx)
    /// The job spec file could not be read or parsed
    SpecLoadError,

    /// A required field is absent from the job spec
    SpecMissingField,

    /// A field has the wrong primitive type
    SpecInvalidType,

    /// The job name is empty
    SpecEmptyName,

    /// write_disposition is not TRUNCATE, APPEND or EMPTY
    SpecInvalidWriteDisposition,

    /// schedule is neither cron nor an "every ..." phrase
    SpecInvalidSchedule,

    /// destination_table does not have 2 or 3 segments
    SpecInvalidDestinationTable,

    /// One or more of the owner/domain/environment labels is missing
    SpecMissingLabels,

    /// Resolved environment is not dev, stage or prod
    SpecInvalidEnvironment,

    /// limits.max_bytes_billed is not a non-negative integer
    SpecInvalidLimit,

    // Template rendering (2xxx)
    /// Template file does not exist or escapes the templates root
    TemplateNotFound,

    /// Template references a variable that is not bound
    TemplateUndefinedVariable,

    /// Template failed to load or render
    TemplateRenderError,

    // Cost estimation (3xxx)
    /// Dry-run estimate exceeded the configured byte ceiling
    BudgetExceeded,

    /// The remote dry-run request failed
    EstimateFailed,

    // Remote reconciliation (4xxx)
    /// Listing existing scheduled queries failed
    RemoteListFailed,

    /// Creating the scheduled query failed
    RemoteCreateFailed,

    /// Updating the scheduled query failed
    RemoteUpdateFailed,

    /// A remote call did not finish before its deadline
    RemoteTimeout,

    // Run configuration (5xxx)
    /// A setting needed by the command was given neither on the CLI nor in sqlsched.toml
    ConfigMissingValue,

    // General (9xxx)
    /// General informational message
    Info,

    /// General warning message
    Warning,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpecLoadError => "SPEC_LOAD_ERROR",
            Self::SpecMissingField => "SPEC_MISSING_FIELD",
            Self::SpecInvalidType => "SPEC_INVALID_TYPE",
            Self::SpecEmptyName => "SPEC_EMPTY_NAME",
            Self::SpecInvalidWriteDisposition => "SPEC_INVALID_WRITE_DISPOSITION",
            Self::SpecInvalidSchedule => "SPEC_INVALID_SCHEDULE",
            Self::SpecInvalidDestinationTable => "SPEC_INVALID_DESTINATION_TABLE",
            Self::SpecMissingLabels => "SPEC_MISSING_LABELS",
            Self::SpecInvalidEnvironment => "SPEC_INVALID_ENVIRONMENT",
            Self::SpecInvalidLimit => "SPEC_INVALID_LIMIT",
            Self::TemplateNotFound => "TEMPLATE_NOT_FOUND",
            Self::TemplateUndefinedVariable => "TEMPLATE_UNDEFINED_VARIABLE",
            Self::TemplateRenderError => "TEMPLATE_RENDER_ERROR",
            Self::BudgetExceeded => "BUDGET_EXCEEDED",
            Self::EstimateFailed => "ESTIMATE_FAILED",
            Self::RemoteListFailed => "REMOTE_LIST_FAILED",
            Self::RemoteCreateFailed => "REMOTE_CREATE_FAILED",
            Self::RemoteUpdateFailed => "REMOTE_UPDATE_FAILED",
            Self::RemoteTimeout => "REMOTE_TIMEOUT",
            Self::ConfigMissingValue => "CONFIG_MISSING_VALUE",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - should be reviewed but not blocking
    Warn,

    /// Error - blocking issue that fails the command
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Where a diagnostic points to: a file, optionally narrowed to a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// File path (job spec or template)
    pub file: String,

    /// Dotted field path inside the job spec (e.g. `limits.max_bytes_billed`)
    pub field: Option<String>,
}

impl Location {
    /// Create a new location with just a file path
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            field: None,
        }
    }

    /// Create a location pointing at a field of a file
    pub fn with_field(file: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            field: Some(field.into()),
        }
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Job spec field the diagnostic is about
    pub field: Option<String>,

    /// Source location (best-effort)
    pub location: Option<Location>,

    /// Expected value (for comparison diagnostics)
    pub expected: Option<String>,

    /// Actual value (for comparison diagnostics)
    pub actual: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            field: None,
            location: None,
            expected: None,
            actual: None,
        }
    }

    /// Shorthand for an error-severity diagnostic
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Error, message)
    }

    /// Set the spec field
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Set the location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Set expected/actual values
    pub fn with_comparison(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.field {
            Some(field) => write!(f, "[{}] {}: {}", self.code, field, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}
