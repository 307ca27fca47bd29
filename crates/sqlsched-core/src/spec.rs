//! Job spec model and validation (job-spec.yaml)
//!
//! A [`JobSpec`] can only be obtained through validation, so every instance
//! handed to the renderer, the cost gate or the reconciler already satisfies
//! the field and cross-field invariants:
//!
//! - `write_disposition` is one of `WRITE_TRUNCATE`, `WRITE_APPEND`, `WRITE_EMPTY`
//! - `schedule` is a valid cron expression or an `every ...` phrase
//! - `destination_table` has 2 or 3 non-empty dot-separated segments
//! - `labels` contains `owner`, `domain` and `environment`
//! - `environment` equals `labels["environment"]`
//!
//! All violations found in a document are reported together.

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::diagnostic::{Diagnostic, DiagnosticCode, Location};
use crate::schedule::normalize_schedule;
use crate::table::split_segments;

/// Labels every job must carry for cost attribution
pub const REQUIRED_LABELS: [&str; 3] = ["owner", "domain", "environment"];

const KNOWN_FIELDS: [&str; 9] = [
    "name",
    "schedule",
    "sql_template",
    "destination_table",
    "write_disposition",
    "labels",
    "parameters",
    "limits",
    "environment",
];

/// How query results combine with existing destination table contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WriteDisposition {
    /// Replace the table contents
    #[default]
    #[serde(rename = "WRITE_TRUNCATE")]
    Truncate,

    /// Append to the table
    #[serde(rename = "WRITE_APPEND")]
    Append,

    /// Only write if the table is empty
    #[serde(rename = "WRITE_EMPTY")]
    Empty,
}

impl WriteDisposition {
    /// Wire value used by BigQuery
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Truncate => "WRITE_TRUNCATE",
            Self::Append => "WRITE_APPEND",
            Self::Empty => "WRITE_EMPTY",
        }
    }
}

impl FromStr for WriteDisposition {
    type Err = String;

    /// Case-insensitive; the `WRITE_` prefix is optional.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let upper = raw.trim().to_uppercase();
        let bare = upper.strip_prefix("WRITE_").unwrap_or(&upper);

        match bare {
            "TRUNCATE" => Ok(Self::Truncate),
            "APPEND" => Ok(Self::Append),
            "EMPTY" => Ok(Self::Empty),
            _ => Err(format!(
                "write_disposition must be one of WRITE_TRUNCATE, WRITE_APPEND, WRITE_EMPTY, got '{}'",
                raw
            )),
        }
    }
}

impl fmt::Display for WriteDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Stage,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Stage => "stage",
            Self::Prod => "prod",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "dev" => Ok(Self::Dev),
            "stage" => Ok(Self::Stage),
            "prod" => Ok(Self::Prod),
            other => Err(format!(
                "environment must be one of dev/stage/prod (from field or labels), got '{}'",
                other
            )),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Limits {
    /// Byte ceiling for the query (BigQuery maximumBytesBilled)
    pub max_bytes_billed: u64,
}

/// A validated scheduled query job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSpec {
    name: String,
    schedule: String,
    sql_template: String,
    destination_table: String,
    write_disposition: WriteDisposition,
    labels: BTreeMap<String, String>,
    parameters: BTreeMap<String, serde_json::Value>,
    limits: Limits,
    environment: Environment,
}

impl JobSpec {
    /// Logical job name, also the remote display name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schedule(&self) -> &str {
        &self.schedule
    }

    /// Template path relative to the templates root
    pub fn sql_template(&self) -> &str {
        &self.sql_template
    }

    pub fn destination_table(&self) -> &str {
        &self.destination_table
    }

    pub fn write_disposition(&self) -> WriteDisposition {
        self.write_disposition
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn parameters(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.parameters
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn max_bytes_billed(&self) -> u64 {
        self.limits.max_bytes_billed
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    /// Load and validate a job spec from a YAML file
    pub fn load(path: &Path) -> Result<Self, SpecLoadError> {
        if !path.exists() {
            return Err(SpecLoadError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path).map_err(|e| SpecLoadError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::parse_yaml(&contents, path)
    }

    /// Parse and validate a job spec from YAML text
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SpecLoadError> {
        Self::parse_yaml(yaml, Path::new("<inline>"))
    }

    fn parse_yaml(yaml: &str, origin: &Path) -> Result<Self, SpecLoadError> {
        let document: Value = serde_yaml::from_str(yaml).map_err(|e| SpecLoadError::Parse {
            path: origin.to_path_buf(),
            source: e,
        })?;

        if !document.is_mapping() {
            return Err(SpecLoadError::NotAMapping {
                path: origin.to_path_buf(),
                found: yaml_kind(&document),
            });
        }

        Self::from_document(&document).map_err(|e| SpecLoadError::Invalid {
            path: origin.to_path_buf(),
            source: e.with_file(origin),
        })
    }

    /// Validate a parsed document.
    ///
    /// Either every invariant holds and a complete `JobSpec` is returned, or
    /// all violations are returned at once.
    pub fn from_document(document: &Value) -> Result<Self, SpecValidationError> {
        let mut v = Validator::default();

        let Some(map) = document.as_mapping() else {
            v.push(
                Diagnostic::error(
                    DiagnosticCode::SpecInvalidType,
                    format!("job spec must be a mapping, found {}", yaml_kind(document)),
                ),
            );
            return Err(v.into_error());
        };

        for key in map.keys() {
            match key.as_str() {
                Some(k) if KNOWN_FIELDS.contains(&k) => {}
                _ => tracing::warn!(key = ?key, "ignoring unknown job spec field"),
            }
        }

        let name = v.required_string(map, "name");
        if matches!(&name, Some(n) if n.trim().is_empty()) {
            v.push(
                Diagnostic::error(DiagnosticCode::SpecEmptyName, "name must not be empty")
                    .with_field("name"),
            );
        }

        let schedule = v.required_string(map, "schedule").and_then(|raw| {
            v.check(normalize_schedule(&raw), DiagnosticCode::SpecInvalidSchedule, "schedule")
        });

        let sql_template = v.required_string(map, "sql_template");

        let destination_table = v.required_string(map, "destination_table").and_then(|raw| {
            let trimmed = raw.trim().to_string();
            if split_segments(&trimmed).is_some() {
                Some(trimmed)
            } else {
                v.push(
                    Diagnostic::error(
                        DiagnosticCode::SpecInvalidDestinationTable,
                        format!(
                            "destination_table must be 'dataset.table' or 'project.dataset.table', got '{}'",
                            trimmed
                        ),
                    )
                    .with_field("destination_table"),
                );
                None
            }
        });

        let write_disposition = match v.optional_string(map, "write_disposition") {
            Ok(Some(raw)) => v.check(
                raw.parse::<WriteDisposition>(),
                DiagnosticCode::SpecInvalidWriteDisposition,
                "write_disposition",
            ),
            Ok(None) => Some(WriteDisposition::default()),
            Err(()) => None,
        };

        let labels = v.labels(map);
        let parameters = v.parameters(map);
        let limits = v.limits(map);
        let environment_field = v.optional_string(map, "environment").ok().flatten();

        // Cross-field: required labels and environment resolution
        let mut environment = None;
        if let Some(labels) = &labels {
            let missing: Vec<&str> = REQUIRED_LABELS
                .iter()
                .copied()
                .filter(|key| !labels.contains_key(*key))
                .collect();
            if !missing.is_empty() {
                let present: Vec<&str> = REQUIRED_LABELS
                    .iter()
                    .copied()
                    .filter(|key| labels.contains_key(*key))
                    .collect();
                let present = if present.is_empty() {
                    "(none)".to_string()
                } else {
                    present.join(", ")
                };
                v.push(
                    Diagnostic::error(
                        DiagnosticCode::SpecMissingLabels,
                        format!("missing required labels: [{}]", missing.join(", ")),
                    )
                    .with_field("labels")
                    .with_comparison(REQUIRED_LABELS.join(", "), present),
                );
            }

            let label_env = labels.get("environment");
            if let (Some(field), Some(label)) = (&environment_field, label_env) {
                if field != label {
                    tracing::warn!(
                        field = %field,
                        label = %label,
                        "environment field overrides labels.environment"
                    );
                }
            }

            let resolved = environment_field.as_deref().or(label_env.map(String::as_str));
            environment = match resolved {
                Some(raw) => v.check(
                    raw.parse::<Environment>(),
                    DiagnosticCode::SpecInvalidEnvironment,
                    "environment",
                ),
                None => {
                    v.push(
                        Diagnostic::error(
                            DiagnosticCode::SpecInvalidEnvironment,
                            "environment must be one of dev/stage/prod (from field or labels), got none",
                        )
                        .with_field("environment"),
                    );
                    None
                }
            };
        }

        match (
            name,
            schedule,
            sql_template,
            destination_table,
            write_disposition,
            labels,
            parameters,
            limits,
            environment,
        ) {
            (
                Some(name),
                Some(schedule),
                Some(sql_template),
                Some(destination_table),
                Some(write_disposition),
                Some(mut labels),
                Some(parameters),
                Some(limits),
                Some(environment),
            ) if v.is_clean() => {
                labels.insert("environment".to_string(), environment.as_str().to_string());
                Ok(Self {
                    name,
                    schedule,
                    sql_template,
                    destination_table,
                    write_disposition,
                    labels,
                    parameters,
                    limits,
                    environment,
                })
            }
            _ => Err(v.into_error()),
        }
    }
}

/// Collects violations while walking a job spec document
#[derive(Default)]
struct Validator {
    diagnostics: Vec<Diagnostic>,
}

impl Validator {
    fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    fn into_error(self) -> SpecValidationError {
        SpecValidationError {
            diagnostics: self.diagnostics,
        }
    }

    fn check<T>(&mut self, result: Result<T, String>, code: DiagnosticCode, field: &str) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(message) => {
                self.push(Diagnostic::error(code, message).with_field(field));
                None
            }
        }
    }

    fn missing(&mut self, field: &str) {
        self.push(
            Diagnostic::error(DiagnosticCode::SpecMissingField, "field required").with_field(field),
        );
    }

    fn wrong_type(&mut self, field: &str, expected: &str, found: &Value) {
        self.push(
            Diagnostic::error(
                DiagnosticCode::SpecInvalidType,
                format!("expected {}, found {}", expected, yaml_kind(found)),
            )
            .with_field(field)
            .with_comparison(expected, yaml_kind(found)),
        );
    }

    fn required_string(&mut self, map: &Mapping, field: &str) -> Option<String> {
        match self.optional_string(map, field) {
            Ok(Some(value)) => Some(value),
            Ok(None) => {
                self.missing(field);
                None
            }
            Err(()) => None,
        }
    }

    /// `Err(())` means a type violation was already recorded
    fn optional_string(&mut self, map: &Mapping, field: &str) -> Result<Option<String>, ()> {
        match map.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => {
                self.wrong_type(field, "a string", other);
                Err(())
            }
        }
    }

    fn optional_mapping<'a>(&mut self, map: &'a Mapping, field: &str) -> Option<Option<&'a Mapping>> {
        match map.get(field) {
            None | Some(Value::Null) => Some(None),
            Some(Value::Mapping(m)) => Some(Some(m)),
            Some(other) => {
                self.wrong_type(field, "a mapping", other);
                None
            }
        }
    }

    fn labels(&mut self, map: &Mapping) -> Option<BTreeMap<String, String>> {
        let labels = self.optional_mapping(map, "labels")?;
        let mut out = BTreeMap::new();
        let mut ok = true;

        for (key, value) in labels.into_iter().flatten() {
            let Some(key) = key.as_str() else {
                self.wrong_type("labels", "string keys", key);
                ok = false;
                continue;
            };
            match value {
                Value::String(s) => {
                    out.insert(key.to_string(), s.clone());
                }
                other => {
                    self.wrong_type(&format!("labels.{}", key), "a string", other);
                    ok = false;
                }
            }
        }

        ok.then_some(out)
    }

    fn parameters(&mut self, map: &Mapping) -> Option<BTreeMap<String, serde_json::Value>> {
        let parameters = self.optional_mapping(map, "parameters")?;
        let mut out = BTreeMap::new();
        let mut ok = true;

        for (key, value) in parameters.into_iter().flatten() {
            let Some(key) = key.as_str() else {
                self.wrong_type("parameters", "string keys", key);
                ok = false;
                continue;
            };
            match serde_json::to_value(value) {
                Ok(json) => {
                    out.insert(key.to_string(), json);
                }
                Err(e) => {
                    self.push(
                        Diagnostic::error(
                            DiagnosticCode::SpecInvalidType,
                            format!("parameter cannot be represented: {}", e),
                        )
                        .with_field(format!("parameters.{}", key)),
                    );
                    ok = false;
                }
            }
        }

        ok.then_some(out)
    }

    fn limits(&mut self, map: &Mapping) -> Option<Limits> {
        let limits = match self.optional_mapping(map, "limits")? {
            Some(limits) => limits,
            None => {
                self.missing("limits");
                return None;
            }
        };

        const FIELD: &str = "limits.max_bytes_billed";
        match limits.get("max_bytes_billed") {
            None | Some(Value::Null) => {
                self.missing(FIELD);
                None
            }
            Some(Value::Number(n)) => {
                if let Some(bytes) = n.as_u64() {
                    Some(Limits {
                        max_bytes_billed: bytes,
                    })
                } else if n.as_i64().is_some() {
                    self.push(
                        Diagnostic::error(
                            DiagnosticCode::SpecInvalidLimit,
                            format!("max_bytes_billed must be >= 0, got {}", n),
                        )
                        .with_field(FIELD),
                    );
                    None
                } else {
                    self.wrong_type(FIELD, "an integer", &Value::Number(n.clone()));
                    None
                }
            }
            Some(other) => {
                self.wrong_type(FIELD, "an integer", other);
                None
            }
        }
    }
}

fn yaml_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(n) if n.is_f64() => "a float",
        Value::Number(_) => "an integer",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// One or more job spec invariants were violated
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}", summarize(&self.diagnostics))]
pub struct SpecValidationError {
    diagnostics: Vec<Diagnostic>,
}

impl SpecValidationError {
    /// Every violation found, in document order
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Check whether a violation with the given code was reported
    pub fn has(&self, code: DiagnosticCode) -> bool {
        self.diagnostics.iter().any(|d| d.code == code)
    }

    /// Attach the originating file to each diagnostic
    fn with_file(mut self, path: &Path) -> Self {
        let file = path.display().to_string();
        for diag in &mut self.diagnostics {
            diag.location = Some(match &diag.field {
                Some(field) => Location::with_field(file.clone(), field.clone()),
                None => Location::new(file.clone()),
            });
        }
        self
    }
}

fn summarize(diagnostics: &[Diagnostic]) -> String {
    let mut out = format!(
        "job spec is invalid ({} violation{})",
        diagnostics.len(),
        if diagnostics.len() == 1 { "" } else { "s" }
    );
    for diag in diagnostics {
        match &diag.field {
            Some(field) => out.push_str(&format!("\n  - {}: {}", field, diag.message)),
            None => out.push_str(&format!("\n  - {}", diag.message)),
        }
    }
    out
}

/// Errors that can occur when loading a job spec file
#[derive(Debug, thiserror::Error)]
pub enum SpecLoadError {
    #[error("job spec file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read job spec {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse job spec {} as YAML: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("job spec {} must be a YAML mapping, got {found}", path.display())]
    NotAMapping { path: PathBuf, found: &'static str },

    #[error("{source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: SpecValidationError,
    },
}

impl SpecLoadError {
    /// Convert to diagnostics for reports
    pub fn to_diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            SpecLoadError::Invalid { source, .. } => source.diagnostics().to_vec(),
            SpecLoadError::NotFound(path)
            | SpecLoadError::Io { path, .. }
            | SpecLoadError::Parse { path, .. }
            | SpecLoadError::NotAMapping { path, .. } => vec![Diagnostic::error(
                DiagnosticCode::SpecLoadError,
                self.to_string(),
            )
            .with_location(Location::new(path.display().to_string()))],
        }
    }

    /// The validation error, if the file parsed but failed validation
    pub fn validation(&self) -> Option<&SpecValidationError> {
        match self {
            SpecLoadError::Invalid { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const VALID: &str = r#"
name: daily_orders
schedule: "every 24 hours"
sql_template: orders/daily.sql
destination_table: analytics.daily_orders
write_disposition: write_append
labels:
  owner: data-team
  domain: sales
  environment: dev
parameters:
  lookback_days: 7
  regions: [eu, us]
limits:
  max_bytes_billed: 1000000000
"#;

    fn spec_with(replace: &str, with: &str) -> Result<JobSpec, SpecLoadError> {
        JobSpec::from_yaml_str(&VALID.replace(replace, with))
    }

    fn violation_codes(result: Result<JobSpec, SpecLoadError>) -> Vec<DiagnosticCode> {
        let err = result.unwrap_err();
        err.validation()
            .expect("expected a validation error")
            .diagnostics()
            .iter()
            .map(|d| d.code)
            .collect()
    }

    #[test]
    fn parses_valid_spec() {
        let spec = JobSpec::from_yaml_str(VALID).unwrap();
        assert_eq!(spec.name(), "daily_orders");
        assert_eq!(spec.schedule(), "every 24 hours");
        assert_eq!(spec.sql_template(), "orders/daily.sql");
        assert_eq!(spec.destination_table(), "analytics.daily_orders");
        assert_eq!(spec.write_disposition(), WriteDisposition::Append);
        assert_eq!(spec.max_bytes_billed(), 1_000_000_000);
        assert_eq!(spec.environment(), Environment::Dev);
        assert_eq!(spec.parameters()["lookback_days"], serde_json::json!(7));
        assert_eq!(spec.parameters()["regions"], serde_json::json!(["eu", "us"]));
    }

    #[test]
    fn write_disposition_defaults_to_truncate() {
        let spec = spec_with("write_disposition: write_append\n", "").unwrap();
        assert_eq!(spec.write_disposition(), WriteDisposition::Truncate);
    }

    #[test]
    fn write_disposition_is_case_insensitive() {
        for raw in ["write_truncate", "WRITE_TRUNCATE", "Write_Truncate", "truncate"] {
            let spec = spec_with("write_append", raw).unwrap();
            assert_eq!(spec.write_disposition(), WriteDisposition::Truncate, "for {}", raw);
            assert_eq!(spec.write_disposition().as_str(), "WRITE_TRUNCATE");
        }
    }

    #[test]
    fn rejects_unknown_write_disposition() {
        let codes = violation_codes(spec_with("write_append", "WRITE_DELETE"));
        assert_eq!(codes, vec![DiagnosticCode::SpecInvalidWriteDisposition]);
    }

    #[test]
    fn missing_labels_are_named() {
        let yaml = VALID.replace("  owner: data-team\n", "").replace("  domain: sales\n", "");
        let err = JobSpec::from_yaml_str(&yaml).unwrap_err();
        let validation = err.validation().unwrap();
        let diag = validation
            .diagnostics()
            .iter()
            .find(|d| d.code == DiagnosticCode::SpecMissingLabels)
            .unwrap();
        assert!(diag.message.contains("owner"));
        assert!(diag.message.contains("domain"));
        assert!(!diag.message.contains("environment"));
        assert_eq!(diag.expected.as_deref(), Some("owner, domain, environment"));
        assert_eq!(diag.actual.as_deref(), Some("environment"));
    }

    #[test]
    fn missing_labels_with_none_present() {
        let yaml = VALID
            .replace("  owner: data-team\n", "")
            .replace("  domain: sales\n", "")
            .replace("  environment: dev\n", "  team: growth\n");
        let err = JobSpec::from_yaml_str(&yaml).unwrap_err();
        let validation = err.validation().unwrap();
        let diag = validation
            .diagnostics()
            .iter()
            .find(|d| d.code == DiagnosticCode::SpecMissingLabels)
            .unwrap();
        assert_eq!(diag.actual.as_deref(), Some("(none)"));
    }

    #[test]
    fn environment_field_overrides_label_and_syncs() {
        let yaml = format!("{}environment: prod\n", VALID);
        let spec = JobSpec::from_yaml_str(&yaml).unwrap();
        assert_eq!(spec.environment(), Environment::Prod);
        assert_eq!(spec.labels()["environment"], "prod");
    }

    #[test]
    fn environment_from_labels_when_field_absent() {
        let spec = spec_with("environment: dev", "environment: stage").unwrap();
        assert_eq!(spec.environment(), Environment::Stage);
        assert_eq!(spec.labels()["environment"], "stage");
    }

    #[test]
    fn rejects_unknown_environment() {
        let codes = violation_codes(spec_with("environment: dev", "environment: qa"));
        assert_eq!(codes, vec![DiagnosticCode::SpecInvalidEnvironment]);
    }

    #[test]
    fn rejects_bad_destination_tables() {
        for table in ["t", "a.b.c.d", "a..b"] {
            let codes = violation_codes(spec_with("analytics.daily_orders", table));
            assert_eq!(codes, vec![DiagnosticCode::SpecInvalidDestinationTable], "for {}", table);
        }
    }

    #[test]
    fn accepts_three_part_destination_table() {
        let spec = spec_with("analytics.daily_orders", " proj.analytics.daily_orders ").unwrap();
        assert_eq!(spec.destination_table(), "proj.analytics.daily_orders");
    }

    #[test]
    fn rejects_invalid_schedule() {
        let codes = violation_codes(spec_with("\"every 24 hours\"", "\"sometimes\""));
        assert_eq!(codes, vec![DiagnosticCode::SpecInvalidSchedule]);
    }

    #[test]
    fn accepts_cron_schedule() {
        let spec = spec_with("\"every 24 hours\"", "\" 0 6 * * 1-5 \"").unwrap();
        assert_eq!(spec.schedule(), "0 6 * * 1-5");
    }

    #[test]
    fn rejects_negative_limit() {
        let codes = violation_codes(spec_with("1000000000", "-1"));
        assert_eq!(codes, vec![DiagnosticCode::SpecInvalidLimit]);
    }

    #[test]
    fn reports_all_violations_together() {
        let yaml = VALID
            .replace("name: daily_orders\n", "")
            .replace("write_append", "write_delete")
            .replace("analytics.daily_orders", "t")
            .replace("\"every 24 hours\"", "42");
        let codes = violation_codes(JobSpec::from_yaml_str(&yaml));
        assert!(codes.contains(&DiagnosticCode::SpecMissingField));
        assert!(codes.contains(&DiagnosticCode::SpecInvalidWriteDisposition));
        assert!(codes.contains(&DiagnosticCode::SpecInvalidDestinationTable));
        assert!(codes.contains(&DiagnosticCode::SpecInvalidType));
        assert_eq!(codes.len(), 4);
    }

    #[test]
    fn non_string_label_is_type_error() {
        let codes = violation_codes(spec_with("owner: data-team", "owner: 42"));
        assert!(codes.contains(&DiagnosticCode::SpecInvalidType));
    }

    #[test]
    fn top_level_must_be_mapping() {
        let err = JobSpec::from_yaml_str("- just\n- a list\n").unwrap_err();
        assert!(matches!(err, SpecLoadError::NotAMapping { .. }));
    }

    #[test]
    fn unparseable_yaml_is_parse_error() {
        let err = JobSpec::from_yaml_str("name: [unclosed").unwrap_err();
        assert!(matches!(err, SpecLoadError::Parse { .. }));
    }

    #[test]
    fn validation_error_display_lists_violations() {
        let err = spec_with("environment: dev", "environment: qa").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("1 violation)"));
        assert!(text.contains("environment"));
    }
}
