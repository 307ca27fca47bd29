//! sqlsched Core
//!
//! Core domain model with stable, versioned types: the validated job spec,
//! destination table identifiers, diagnostics, run reports and tool config.
//! Never rename diagnostic codes - they are part of the public API.

pub mod diagnostic;
pub mod schedule;
pub mod spec;
pub mod table;
pub mod report;
pub mod config;

pub use diagnostic::{Diagnostic, DiagnosticCode, Severity, Location};
pub use spec::{JobSpec, Limits, WriteDisposition, Environment, SpecLoadError, SpecValidationError, REQUIRED_LABELS};
pub use table::{TableId, InvalidTableId};
pub use report::{Report, ReportVersion, ReportSummary, RunOutcome, EstimateSummary, DeploySummary, sql_fingerprint};
pub use config::{Config, ConfigError, WarehouseConfig, DEFAULT_LOCATION, DEFAULT_ACCESS_TOKEN_ENV};
