//! Deploy pipeline: validate, render, estimate, reconcile
//!
//! Each action runs a prefix of the stages in order and stops at the first
//! failure. Nothing is created or updated remotely unless the cost gate
//! passed first.

use crate::cost_gate::{CostGate, EstimateError};
use crate::reconciler::{ReconcileError, ReconcileOutcome, ReconcilePlan, Reconciler};
use sqlsched_catalog::{CostEstimate, WarehouseService};
use sqlsched_core::{Diagnostic, DiagnosticCode, JobSpec, SpecLoadError, DEFAULT_LOCATION};
use sqlsched_jinja::{RenderError, RenderedQuery, SqlRenderer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Pipeline stage, used to attribute failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Spec,
    Render,
    Estimate,
    Reconcile,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Spec => "spec validation",
            Stage::Render => "template rendering",
            Stage::Estimate => "cost estimation",
            Stage::Reconcile => "reconciliation",
        })
    }
}

/// Underlying cause of a pipeline failure
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Spec(#[from] SpecLoadError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Estimate(#[from] EstimateError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("{0}")]
    MissingSetting(String),
}

/// A stage failed; later stages did not run
#[derive(Debug, thiserror::Error)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: StageError,
}

impl PipelineError {
    pub fn new(stage: Stage, source: impl Into<StageError>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }

    /// A setting the stage needs was not provided
    pub fn missing(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            source: StageError::MissingSetting(message.into()),
        }
    }

    /// True when the cost gate rejected the query for its size
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(
            self.source,
            StageError::Estimate(EstimateError::BudgetExceeded { .. })
        )
    }

    /// Convert to diagnostics for the run report
    pub fn to_diagnostics(&self) -> Vec<Diagnostic> {
        match &self.source {
            StageError::Spec(e) => e.to_diagnostics(),
            StageError::Render(e) => vec![e.to_diagnostic()],
            StageError::Estimate(e) => vec![e.to_diagnostic()],
            StageError::Reconcile(e) => vec![e.to_diagnostic()],
            StageError::MissingSetting(message) => {
                vec![Diagnostic::error(DiagnosticCode::ConfigMissingValue, message.clone())]
            }
        }
    }
}

/// Settings shared by all pipeline actions
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Directory SQL templates are resolved against
    pub templates_root: PathBuf,

    /// Default project for two-part destination tables and the remote scope
    pub project: Option<String>,

    /// Remote location scheduled queries live in
    pub location: String,

    /// Deadline for each remote call
    pub timeout: Option<Duration>,
}

impl PipelineOptions {
    pub fn new(templates_root: impl Into<PathBuf>) -> Self {
        Self {
            templates_root: templates_root.into(),
            project: None,
            location: DEFAULT_LOCATION.to_string(),
            timeout: None,
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A validated spec and its rendered SQL
#[derive(Debug, Clone)]
pub struct RenderRun {
    pub spec: JobSpec,
    pub query: RenderedQuery,
}

/// A rendered query that passed the cost gate
#[derive(Debug, Clone)]
pub struct EstimateRun {
    pub spec: JobSpec,
    pub query: RenderedQuery,
    pub estimate: CostEstimate,
}

/// Result of `deploy`
#[derive(Debug, Clone)]
pub struct DeployRun {
    pub spec: JobSpec,
    pub query: RenderedQuery,
    pub estimate: CostEstimate,
    pub outcome: ReconcileOutcome,
}

/// Result of a non-mutating deploy
#[derive(Debug, Clone)]
pub struct PlanRun {
    pub spec: JobSpec,
    pub query: RenderedQuery,
    pub estimate: CostEstimate,
    pub plan: ReconcilePlan,
}

/// Runs job specs through the deploy stages
pub struct Pipeline {
    options: PipelineOptions,
    renderer: SqlRenderer,
    service: Option<Arc<dyn WarehouseService>>,
}

impl Pipeline {
    /// Create a pipeline that can validate and render; remote actions need
    /// [`Pipeline::with_service`]
    pub fn new(options: PipelineOptions) -> Self {
        let renderer = SqlRenderer::new(options.templates_root.clone());
        Self {
            options,
            renderer,
            service: None,
        }
    }

    pub fn with_service(mut self, service: Arc<dyn WarehouseService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Load and validate a job spec file
    pub fn validate(&self, spec_path: &Path) -> Result<JobSpec, PipelineError> {
        let spec = JobSpec::load(spec_path).map_err(|e| PipelineError::new(Stage::Spec, e))?;
        tracing::info!(job = spec.name(), path = %spec_path.display(), "job spec is valid");
        Ok(spec)
    }

    /// Validate, then render the job's SQL template
    pub fn render(&self, spec_path: &Path) -> Result<RenderRun, PipelineError> {
        let spec = self.validate(spec_path)?;
        let query = self
            .renderer
            .render_query(spec.sql_template(), spec.parameters())
            .map_err(|e| PipelineError::new(Stage::Render, e))?;
        Ok(RenderRun { spec, query })
    }

    /// Validate, render, then dry-run against the job's byte ceiling
    pub async fn estimate(&self, spec_path: &Path) -> Result<EstimateRun, PipelineError> {
        let rendered = self.render(spec_path)?;
        self.estimate_rendered(rendered).await
    }

    /// Run the cost gate on an already rendered query
    pub async fn estimate_rendered(&self, rendered: RenderRun) -> Result<EstimateRun, PipelineError> {
        let RenderRun { spec, query } = rendered;
        let service = self.service(Stage::Estimate)?;

        let estimate = CostGate::new(service)
            .with_timeout(self.options.timeout)
            .estimate(&query.sql, spec.max_bytes_billed(), &spec)
            .await
            .map_err(|e| PipelineError::new(Stage::Estimate, e))?;

        Ok(EstimateRun { spec, query, estimate })
    }

    /// Run every stage and create or update the scheduled query
    pub async fn deploy(&self, spec_path: &Path) -> Result<DeployRun, PipelineError> {
        let rendered = self.render(spec_path)?;
        self.deploy_rendered(rendered).await
    }

    /// Gate and reconcile an already rendered query
    pub async fn deploy_rendered(&self, rendered: RenderRun) -> Result<DeployRun, PipelineError> {
        let project = self.require_project(Stage::Reconcile)?.to_string();
        let EstimateRun { spec, query, estimate } = self.estimate_rendered(rendered).await?;

        let outcome = self
            .reconciler()?
            .reconcile(&spec, &query.sql, &project)
            .await
            .map_err(|e| PipelineError::new(Stage::Reconcile, e))?;

        Ok(DeployRun {
            spec,
            query,
            estimate,
            outcome,
        })
    }

    /// Like [`Pipeline::deploy`], but only report what reconciling would do
    pub async fn plan(&self, spec_path: &Path) -> Result<PlanRun, PipelineError> {
        let rendered = self.render(spec_path)?;
        self.plan_rendered(rendered).await
    }

    /// Gate an already rendered query and plan its reconciliation
    pub async fn plan_rendered(&self, rendered: RenderRun) -> Result<PlanRun, PipelineError> {
        let project = self.require_project(Stage::Reconcile)?.to_string();
        let EstimateRun { spec, query, estimate } = self.estimate_rendered(rendered).await?;

        let plan = self
            .reconciler()?
            .plan(&spec, &query.sql, &project)
            .await
            .map_err(|e| PipelineError::new(Stage::Reconcile, e))?;

        Ok(PlanRun {
            spec,
            query,
            estimate,
            plan,
        })
    }

    /// The default project, or a missing-setting failure attributed to `stage`
    pub fn require_project(&self, stage: Stage) -> Result<&str, PipelineError> {
        self.options.project.as_deref().ok_or_else(|| {
            PipelineError::missing(
                stage,
                "a default project is required: pass --project or set warehouse.project_id",
            )
        })
    }

    fn service(&self, stage: Stage) -> Result<&dyn WarehouseService, PipelineError> {
        self.service
            .as_deref()
            .ok_or_else(|| PipelineError::missing(stage, "no warehouse service configured"))
    }

    fn reconciler(&self) -> Result<Reconciler<'_>, PipelineError> {
        Ok(Reconciler::new(self.service(Stage::Reconcile)?, self.options.location.clone())
            .with_timeout(self.options.timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlsched_catalog::MockWarehouseService;

    #[test]
    fn test_stage_display() {
        assert_eq!(Stage::Estimate.to_string(), "cost estimation");
    }

    #[test]
    fn test_missing_setting_diagnostic() {
        let err = PipelineError::missing(Stage::Reconcile, "no project");
        let diags = err.to_diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].code, DiagnosticCode::ConfigMissingValue);
        assert!(!err.is_budget_exceeded());
    }

    fn rendered() -> RenderRun {
        let spec = JobSpec::from_yaml_str(
            r#"name: daily_orders
schedule: "every 24 hours"
sql_template: orders/daily.sql
destination_table: analytics.daily_orders
labels:
  owner: data-team
  domain: sales
  environment: prod
limits:
  max_bytes_billed: 1000
"#,
        )
        .unwrap();
        RenderRun {
            spec,
            query: RenderedQuery::new("orders/daily.sql", "SELECT 1"),
        }
    }

    #[tokio::test]
    async fn test_deploy_without_project_fails_before_any_remote_call() {
        let service = MockWarehouseService::new();
        let pipeline = Pipeline::new(PipelineOptions::new(".")).with_service(Arc::new(service.clone()));

        let err = pipeline.deploy_rendered(rendered()).await.unwrap_err();
        assert_eq!(err.stage, Stage::Reconcile);
        assert!(matches!(err.source, StageError::MissingSetting(_)));
        assert!(service.estimate_requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_spec_errors_win_over_missing_project() {
        let pipeline = Pipeline::new(PipelineOptions::new(".")).with_service(Arc::new(MockWarehouseService::new()));

        let err = pipeline.deploy(Path::new("no/such/job.yaml")).await.unwrap_err();
        assert_eq!(err.stage, Stage::Spec);
    }

    #[tokio::test]
    async fn test_estimate_rendered_uses_given_sql() {
        let service = MockWarehouseService::new().with_estimate(10, 0.0);
        let pipeline = Pipeline::new(PipelineOptions::new(".")).with_service(Arc::new(service.clone()));

        let run = pipeline.estimate_rendered(rendered()).await.unwrap();
        assert_eq!(run.estimate.bytes_processed, 10);
        assert_eq!(service.estimate_requests().await[0].sql, "SELECT 1");
    }

    #[test]
    fn test_missing_spec_file_is_spec_stage() {
        let pipeline = Pipeline::new(PipelineOptions::new("."));
        let err = pipeline.validate(Path::new("no/such/job.yaml")).unwrap_err();
        assert_eq!(err.stage, Stage::Spec);
        assert_eq!(err.to_diagnostics()[0].code, DiagnosticCode::SpecLoadError);
    }
}
