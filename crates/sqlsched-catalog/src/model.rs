//! Remote scheduled query model (Data Transfer Service `TransferConfig`)
//!
//! Field names follow the Data Transfer REST API so configs can be sent and
//! received as-is. Fields this tool does not manage are kept in `other` and
//! round-trip untouched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Data source id of BigQuery scheduled queries
pub const SCHEDULED_QUERY_DATA_SOURCE: &str = "scheduled_query";

/// Project + location namespace that scheduled queries are listed and created in
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectScope {
    pub project_id: String,
    pub location: String,
}

impl ProjectScope {
    pub fn new(project_id: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            location: location.into(),
        }
    }

    /// Resource parent path, e.g. `projects/acme/locations/us`
    pub fn parent(&self) -> String {
        format!(
            "projects/{}/locations/{}",
            self.project_id,
            self.location.to_lowercase()
        )
    }
}

impl fmt::Display for ProjectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.parent())
    }
}

/// Parameters of the `scheduled_query` data source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduledQueryParams {
    #[serde(default)]
    pub query: String,

    /// Bare table id the results are written to
    #[serde(default)]
    pub destination_table_name_template: String,

    #[serde(default)]
    pub write_disposition: String,

    #[serde(default)]
    pub partitioning_field: String,

    /// Parameters set outside this tool
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

/// A scheduled query as stored by the Data Transfer Service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferConfig {
    /// Remote-assigned resource name; `None` until created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub display_name: String,

    #[serde(default)]
    pub destination_dataset_id: String,

    #[serde(default)]
    pub data_source_id: String,

    #[serde(default)]
    pub params: ScheduledQueryParams,

    #[serde(default)]
    pub schedule: String,

    #[serde(default)]
    pub disabled: bool,

    /// Remote-owned fields (owner info, timestamps, state, ...)
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

impl TransferConfig {
    /// The logical key used to find "our" config among the listed ones
    pub fn identity(&self) -> TransferIdentity {
        TransferIdentity {
            display_name: self.display_name.clone(),
            destination_dataset_id: self.destination_dataset_id.clone(),
            data_source_id: self.data_source_id.clone(),
        }
    }

    /// Exact match on the identity triple
    pub fn matches(&self, identity: &TransferIdentity) -> bool {
        self.display_name == identity.display_name
            && self.destination_dataset_id == identity.destination_dataset_id
            && self.data_source_id == identity.data_source_id
    }

    /// Copy the masked fields of `desired` onto `self`, leaving all others alone
    pub fn apply_update(&mut self, desired: &TransferConfig, fields: &[UpdateField]) {
        for field in fields {
            match field {
                UpdateField::Params => self.params = desired.params.clone(),
                UpdateField::Schedule => self.schedule = desired.schedule.clone(),
                UpdateField::DisplayName => self.display_name = desired.display_name.clone(),
            }
        }
    }
}

/// (display name, destination dataset, data source) triple
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferIdentity {
    pub display_name: String,
    pub destination_dataset_id: String,
    pub data_source_id: String,
}

impl fmt::Display for TransferIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' -> dataset '{}' ({})",
            self.display_name, self.destination_dataset_id, self.data_source_id
        )
    }
}

/// Fields an update is allowed to touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateField {
    Params,
    Schedule,
    DisplayName,
}

impl UpdateField {
    /// Path used in the REST `updateMask`
    pub fn mask_path(&self) -> &'static str {
        match self {
            Self::Params => "params",
            Self::Schedule => "schedule",
            Self::DisplayName => "display_name",
        }
    }

    /// Join fields into an `updateMask` value
    pub fn mask(fields: &[UpdateField]) -> String {
        fields
            .iter()
            .map(UpdateField::mask_path)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// The only fields reconciliation ever updates
pub const RECONCILE_UPDATE_MASK: [UpdateField; 3] = [
    UpdateField::Params,
    UpdateField::Schedule,
    UpdateField::DisplayName,
];

/// A dry-run request: never executes, never reads the query cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstimateRequest {
    pub sql: String,
    pub max_bytes_billed: u64,
    /// Attached to the dry-run job for cost attribution
    pub labels: BTreeMap<String, String>,
    pub use_query_cache: bool,
}

impl EstimateRequest {
    pub fn new(sql: impl Into<String>, max_bytes_billed: u64, labels: BTreeMap<String, String>) -> Self {
        Self {
            sql: sql.into(),
            max_bytes_billed,
            labels,
            use_query_cache: false,
        }
    }
}

/// Dry-run result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    pub bytes_processed: u64,
    /// Slot time, when the warehouse reports it
    pub slot_millis: f64,
}
