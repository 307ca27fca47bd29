//! Destination table identifiers

use std::fmt;

/// A fully resolved BigQuery table: project, dataset and table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableId {
    /// Project that owns the dataset
    pub project_id: String,

    /// Dataset name
    pub dataset_id: String,

    /// Table name
    pub table_id: String,
}

/// Error returned when a destination table does not have 2 or 3 segments
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("destination_table must be 'dataset.table' or 'project.dataset.table', got '{0}'")]
pub struct InvalidTableId(pub String);

impl TableId {
    /// Create a new table identifier
    pub fn new(
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        }
    }

    /// Parse `dataset.table` or `project.dataset.table`.
    ///
    /// The two-part form inherits `default_project`; the three-part form
    /// ignores it.
    pub fn parse(destination_table: &str, default_project: &str) -> Result<Self, InvalidTableId> {
        let raw = destination_table.trim();
        let segments = split_segments(raw).ok_or_else(|| InvalidTableId(raw.to_string()))?;

        match segments.as_slice() {
            [dataset, table] => Ok(Self::new(default_project, *dataset, *table)),
            [project, dataset, table] => Ok(Self::new(*project, *dataset, *table)),
            _ => Err(InvalidTableId(raw.to_string())),
        }
    }

    /// Get fully qualified name
    pub fn fqn(&self) -> String {
        format!("{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fqn())
    }
}

/// Split a table reference into its segments if it has 2 or 3 non-empty ones
pub(crate) fn split_segments(raw: &str) -> Option<Vec<&str>> {
    let segments: Vec<&str> = raw.split('.').collect();
    let valid_count = matches!(segments.len(), 2 | 3);
    let all_non_empty = segments.iter().all(|s| !s.trim().is_empty());

    if valid_count && all_non_empty {
        Some(segments)
    } else {
        None
    }
}
