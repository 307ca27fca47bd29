//! Create-or-update of the remote scheduled query
//!
//! A job is identified remotely by the triple (display name, destination
//! dataset, data source). Reconciling lists the configs in the default
//! project's scope, updates the first one with a matching triple and creates
//! a new one otherwise. Repeating a deploy therefore converges instead of
//! piling up duplicates.

use crate::deadline::bounded;
use sqlsched_catalog::{
    ProjectScope, ScheduledQueryParams, ServiceError, TransferConfig, UpdateField, WarehouseService,
    RECONCILE_UPDATE_MASK, SCHEDULED_QUERY_DATA_SOURCE,
};
use sqlsched_core::{Diagnostic, DiagnosticCode, InvalidTableId, JobSpec, TableId};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Remote call made while reconciling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOperation {
    List,
    Create,
    Update,
}

impl fmt::Display for RemoteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RemoteOperation::List => "list",
            RemoteOperation::Create => "create",
            RemoteOperation::Update => "update",
        })
    }
}

/// Reconciliation failure
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Destination(#[from] InvalidTableId),

    #[error("failed to list scheduled queries in {scope}: {source}")]
    List {
        scope: ProjectScope,
        #[source]
        source: ServiceError,
    },

    #[error("failed to create scheduled query '{display_name}': {source}")]
    Create {
        display_name: String,
        #[source]
        source: ServiceError,
    },

    #[error("failed to update scheduled query {name}: {source}")]
    Update {
        name: String,
        #[source]
        source: ServiceError,
    },

    #[error(
        "{operation} of scheduled query timed out after {}s; the remote state is unknown, re-running deploy converges",
        after.as_secs_f64()
    )]
    TimedOut {
        operation: RemoteOperation,
        after: Duration,
    },
}

impl ReconcileError {
    /// Convert to a diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        let code = match self {
            ReconcileError::Destination(_) => DiagnosticCode::SpecInvalidDestinationTable,
            ReconcileError::List { .. } => DiagnosticCode::RemoteListFailed,
            ReconcileError::Create { .. } => DiagnosticCode::RemoteCreateFailed,
            ReconcileError::Update { .. } => DiagnosticCode::RemoteUpdateFailed,
            ReconcileError::TimedOut { .. } => DiagnosticCode::RemoteTimeout,
        };
        Diagnostic::error(code, self.to_string())
    }
}

/// What reconciliation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Created,
    Updated,
}

impl ReconcileAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileAction::Created => "created",
            ReconcileAction::Updated => "updated",
        }
    }
}

/// Result of a successful reconcile
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub action: ReconcileAction,

    /// Config as returned by the service
    pub config: TransferConfig,

    /// Destination the job writes to
    pub table: TableId,
}

/// What reconciling would do, computed without mutating anything
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilePlan {
    pub scope: ProjectScope,
    pub table: TableId,

    /// Desired config built from the job spec
    pub desired: TransferConfig,

    /// Matching remote config; `None` means a create
    pub existing: Option<TransferConfig>,
}

impl ReconcilePlan {
    pub fn is_create(&self) -> bool {
        self.existing.is_none()
    }

    /// `would_create` or `would_update`
    pub fn action_str(&self) -> &'static str {
        if self.is_create() {
            "would_create"
        } else {
            "would_update"
        }
    }

    /// Masked fields whose remote value differs from the desired one
    pub fn changes(&self) -> Vec<UpdateField> {
        let Some(existing) = &self.existing else {
            return RECONCILE_UPDATE_MASK.to_vec();
        };

        RECONCILE_UPDATE_MASK
            .iter()
            .copied()
            .filter(|field| match field {
                UpdateField::Params => existing.params != self.desired.params,
                UpdateField::Schedule => existing.schedule != self.desired.schedule,
                UpdateField::DisplayName => existing.display_name != self.desired.display_name,
            })
            .collect()
    }
}

/// Reconciles job specs against the scheduled queries of one location
pub struct Reconciler<'a> {
    service: &'a dyn WarehouseService,
    location: String,
    timeout: Option<Duration>,
}

impl<'a> Reconciler<'a> {
    pub fn new(service: &'a dyn WarehouseService, location: impl Into<String>) -> Self {
        Self {
            service,
            location: location.into(),
            timeout: None,
        }
    }

    /// Bound each remote call
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the config the job should have remotely
    pub fn desired_config(spec: &JobSpec, sql: &str, table: &TableId) -> TransferConfig {
        TransferConfig {
            name: None,
            display_name: spec.name().to_string(),
            destination_dataset_id: table.dataset_id.clone(),
            data_source_id: SCHEDULED_QUERY_DATA_SOURCE.to_string(),
            params: ScheduledQueryParams {
                query: sql.to_string(),
                destination_table_name_template: table.table_id.clone(),
                write_disposition: spec.write_disposition().as_str().to_string(),
                partitioning_field: String::new(),
                other: BTreeMap::new(),
            },
            schedule: spec.schedule().to_string(),
            disabled: false,
            other: BTreeMap::new(),
        }
    }

    /// Find out whether reconciling would create or update, without mutating.
    ///
    /// Configs are looked up in the default project's scope, even when the
    /// destination table names another project.
    pub async fn plan(&self, spec: &JobSpec, sql: &str, default_project: &str) -> Result<ReconcilePlan, ReconcileError> {
        let table = TableId::parse(spec.destination_table(), default_project)?;
        let scope = ProjectScope::new(default_project, self.location.clone());
        let desired = Self::desired_config(spec, sql, &table);
        let identity = desired.identity();

        let configs = bounded(self.timeout, self.service.list_transfer_configs(&scope))
            .await
            .map_err(|after| ReconcileError::TimedOut {
                operation: RemoteOperation::List,
                after,
            })?
            .map_err(|source| ReconcileError::List {
                scope: scope.clone(),
                source,
            })?;

        let existing = configs.into_iter().find(|c| c.matches(&identity));

        tracing::debug!(
            job = spec.name(),
            scope = %scope,
            matched = existing.as_ref().and_then(|c| c.name.as_deref()).unwrap_or("none"),
            "looked up existing scheduled query"
        );

        Ok(ReconcilePlan {
            scope,
            table,
            desired,
            existing,
        })
    }

    /// Create the scheduled query, or update the one already deployed
    pub async fn reconcile(
        &self,
        spec: &JobSpec,
        sql: &str,
        default_project: &str,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let plan = self.plan(spec, sql, default_project).await?;
        self.apply(plan).await
    }

    /// Carry out a plan
    pub async fn apply(&self, plan: ReconcilePlan) -> Result<ReconcileOutcome, ReconcileError> {
        let ReconcilePlan {
            scope,
            table,
            desired,
            existing,
        } = plan;

        match existing {
            Some(mut current) => {
                let name = match current.name.clone().filter(|n| !n.is_empty()) {
                    Some(name) => name,
                    None => {
                        return Err(ReconcileError::Update {
                            name: format!("'{}'", current.display_name),
                            source: ServiceError::InvalidResponse(
                                "listed scheduled query has no resource name".to_string(),
                            ),
                        })
                    }
                };
                current.apply_update(&desired, &RECONCILE_UPDATE_MASK);

                let config = bounded(
                    self.timeout,
                    self.service.update_transfer_config(&current, &RECONCILE_UPDATE_MASK),
                )
                .await
                .map_err(|after| ReconcileError::TimedOut {
                    operation: RemoteOperation::Update,
                    after,
                })?
                .map_err(|source| ReconcileError::Update {
                    name: name.clone(),
                    source,
                })?;

                tracing::info!(job = %desired.display_name, remote_name = %name, table = %table, "updated scheduled query");
                Ok(ReconcileOutcome {
                    action: ReconcileAction::Updated,
                    config,
                    table,
                })
            }
            None => {
                let config = bounded(self.timeout, self.service.create_transfer_config(&scope, &desired))
                    .await
                    .map_err(|after| ReconcileError::TimedOut {
                        operation: RemoteOperation::Create,
                        after,
                    })?
                    .map_err(|source| ReconcileError::Create {
                        display_name: desired.display_name.clone(),
                        source,
                    })?;

                tracing::info!(
                    job = %desired.display_name,
                    remote_name = config.name.as_deref().unwrap_or(""),
                    table = %table,
                    "created scheduled query"
                );
                Ok(ReconcileOutcome {
                    action: ReconcileAction::Created,
                    config,
                    table,
                })
            }
        }
    }
}
