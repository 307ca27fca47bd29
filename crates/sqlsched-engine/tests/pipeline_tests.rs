//! End-to-end pipeline runs against the in-memory warehouse service

use pretty_assertions::assert_eq;
use serde_json::json;
use sqlsched_catalog::{MockOperation, MockWarehouseService, ProjectScope, ServiceError};
use sqlsched_core::DiagnosticCode;
use sqlsched_engine::{EstimateError, Pipeline, PipelineOptions, ReconcileAction, Stage, StageError};
use std::path::{Path, PathBuf};
use std::sync::Arc;

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        let ws = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        ws.write(
            "sql/orders/daily.sql",
            "SELECT *\nFROM `{{ source_table }}`\nWHERE day >= DATE_SUB(CURRENT_DATE(), INTERVAL {{ lookback_days }} DAY)\n",
        );
        ws
    }

    fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn templates_root(&self) -> PathBuf {
        self.dir.path().join("sql")
    }

    fn spec(&self, file: &str, name: &str, destination: &str, schedule: &str, max_bytes: u64) -> PathBuf {
        let yaml = format!(
            r#"name: {name}
schedule: "{schedule}"
sql_template: orders/daily.sql
destination_table: {destination}
labels:
  owner: data-team
  domain: sales
  environment: prod
parameters:
  source_table: raw.orders
  lookback_days: 7
limits:
  max_bytes_billed: {max_bytes}
"#
        );
        self.write(file, &yaml)
    }

    fn pipeline(&self, service: &MockWarehouseService) -> Pipeline {
        Pipeline::new(
            PipelineOptions::new(self.templates_root())
                .with_project("acme")
                .with_location("US"),
        )
        .with_service(Arc::new(service.clone()))
    }
}

fn us() -> ProjectScope {
    ProjectScope::new("acme", "US")
}

#[test]
fn render_trims_and_substitutes() {
    let ws = Workspace::new();
    let spec = ws.spec("job.yaml", "daily_orders", "analytics.daily_orders", "every 24 hours", 1_000);

    let run = Pipeline::new(PipelineOptions::new(ws.templates_root()))
        .render(&spec)
        .unwrap();

    assert_eq!(
        run.query.sql,
        "SELECT *\nFROM `raw.orders`\nWHERE day >= DATE_SUB(CURRENT_DATE(), INTERVAL 7 DAY)"
    );
}

#[test]
fn unbound_variable_fails_in_render_stage() {
    let ws = Workspace::new();
    ws.write("sql/orders/daily.sql", "SELECT * FROM t WHERE d > {{missing_var}}");
    let spec = ws.spec("job.yaml", "daily_orders", "analytics.daily_orders", "every 24 hours", 1_000);

    let err = Pipeline::new(PipelineOptions::new(ws.templates_root()))
        .render(&spec)
        .unwrap_err();

    assert_eq!(err.stage, Stage::Render);
    assert_eq!(err.to_diagnostics()[0].code, DiagnosticCode::TemplateUndefinedVariable);
}

#[test]
fn missing_labels_fail_validation_naming_keys() {
    let ws = Workspace::new();
    let spec = ws.write(
        "job.yaml",
        r#"name: daily_orders
schedule: "every 24 hours"
sql_template: orders/daily.sql
destination_table: analytics.daily_orders
labels:
  owner: data-team
limits:
  max_bytes_billed: 1000
"#,
    );

    let err = Pipeline::new(PipelineOptions::new(ws.templates_root()))
        .validate(&spec)
        .unwrap_err();

    assert_eq!(err.stage, Stage::Spec);
    let diags = err.to_diagnostics();
    let labels = diags
        .iter()
        .find(|d| d.code == DiagnosticCode::SpecMissingLabels)
        .expect("missing labels diagnostic");
    assert!(labels.message.contains("domain"));
    assert!(labels.message.contains("environment"));
}

#[tokio::test]
async fn over_budget_blocks_deploy_without_mutation() {
    let ws = Workspace::new();
    let service = MockWarehouseService::new().with_estimate(1_000_000, 0.0);
    let spec = ws.spec("job.yaml", "daily_orders", "analytics.daily_orders", "every 24 hours", 500_000);

    let err = ws.pipeline(&service).deploy(&spec).await.unwrap_err();

    assert_eq!(err.stage, Stage::Estimate);
    assert!(err.is_budget_exceeded());
    match &err.source {
        StageError::Estimate(EstimateError::BudgetExceeded {
            estimated_bytes,
            max_bytes_billed,
        }) => {
            assert_eq!(*estimated_bytes, 1_000_000);
            assert_eq!(*max_bytes_billed, 500_000);
        }
        other => panic!("expected BudgetExceeded, got {:?}", other),
    }

    assert_eq!(service.call_count(MockOperation::List).await, 0);
    assert_eq!(service.mutation_count().await, 0);
}

#[tokio::test]
async fn under_budget_estimate_passes() {
    let ws = Workspace::new();
    let service = MockWarehouseService::new().with_estimate(400_000, 0.0);
    let spec = ws.spec("job.yaml", "daily_orders", "analytics.daily_orders", "every 24 hours", 500_000);

    let run = ws.pipeline(&service).estimate(&spec).await.unwrap();
    assert_eq!(run.estimate.bytes_processed, 400_000);
    assert_eq!(service.estimate_requests().await[0].sql, run.query.sql);
}

#[tokio::test]
async fn deploying_twice_creates_then_updates() {
    let ws = Workspace::new();
    let service = MockWarehouseService::new().with_estimate(10, 0.0);
    let pipeline = ws.pipeline(&service);

    let first = ws.spec("job.yaml", "daily_orders", "analytics.daily_orders", "every 24 hours", 1_000);
    let created = pipeline.deploy(&first).await.unwrap();
    assert_eq!(created.outcome.action, ReconcileAction::Created);

    ws.write("sql/orders/daily.sql", "SELECT COUNT(*) FROM `{{ source_table }}`");
    let second = ws.spec("job.yaml", "daily_orders", "analytics.daily_orders", "every 12 hours", 1_000);
    let updated = pipeline.deploy(&second).await.unwrap();
    assert_eq!(updated.outcome.action, ReconcileAction::Updated);
    assert_eq!(updated.outcome.config.name, created.outcome.config.name);

    assert_eq!(service.call_count(MockOperation::Create).await, 1);
    assert_eq!(service.call_count(MockOperation::Update).await, 1);

    let stored = service.configs(&us()).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].params.query, "SELECT COUNT(*) FROM `raw.orders`");
    assert_eq!(stored[0].schedule, "every 12 hours");
    assert_eq!(stored[0].display_name, "daily_orders");
}

#[tokio::test]
async fn same_name_different_dataset_creates_twice() {
    let ws = Workspace::new();
    let service = MockWarehouseService::new();
    let pipeline = ws.pipeline(&service);

    let analytics = ws.spec("a.yaml", "daily_orders", "analytics.daily_orders", "every 24 hours", 1_000);
    let staging = ws.spec("b.yaml", "daily_orders", "staging.daily_orders", "every 24 hours", 1_000);

    let a = pipeline.deploy(&analytics).await.unwrap();
    let b = pipeline.deploy(&staging).await.unwrap();

    assert_eq!(a.outcome.action, ReconcileAction::Created);
    assert_eq!(b.outcome.action, ReconcileAction::Created);
    assert_ne!(a.outcome.config.name, b.outcome.config.name);
    assert_eq!(service.configs(&us()).await.len(), 2);
}

#[tokio::test]
async fn preexisting_config_keeps_unmanaged_fields_on_update() {
    let ws = Workspace::new();
    let service = MockWarehouseService::new();

    let mut existing = sqlsched_catalog::TransferConfig {
        display_name: "daily_orders".to_string(),
        destination_dataset_id: "analytics".to_string(),
        data_source_id: "scheduled_query".to_string(),
        schedule: "every 1 hours".to_string(),
        disabled: true,
        ..Default::default()
    };
    existing.params.query = "SELECT 0".to_string();
    existing.other.insert("notificationPubsubTopic".to_string(), json!("projects/acme/topics/jobs"));
    service.seed(&us(), existing).await;

    let spec = ws.spec("job.yaml", "daily_orders", "analytics.daily_orders", "every 24 hours", 1_000);
    let run = ws.pipeline(&service).deploy(&spec).await.unwrap();

    assert_eq!(run.outcome.action, ReconcileAction::Updated);
    let stored = service.configs(&us()).await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].schedule, "every 24 hours");
    assert!(stored[0].params.query.starts_with("SELECT *"));
    assert!(stored[0].disabled);
    assert_eq!(
        stored[0].other["notificationPubsubTopic"],
        json!("projects/acme/topics/jobs")
    );
}

#[tokio::test]
async fn plan_reports_without_mutating() {
    let ws = Workspace::new();
    let service = MockWarehouseService::new();
    let spec = ws.spec("job.yaml", "daily_orders", "analytics.daily_orders", "every 24 hours", 1_000);

    let run = ws.pipeline(&service).plan(&spec).await.unwrap();

    assert!(run.plan.is_create());
    assert_eq!(run.plan.table.fqn(), "acme.analytics.daily_orders");
    assert_eq!(service.mutation_count().await, 0);
    assert_eq!(service.config_count().await, 0);
}

#[tokio::test]
async fn list_failure_is_reconcile_stage() {
    let ws = Workspace::new();
    let service = MockWarehouseService::new().with_failure(
        MockOperation::List,
        ServiceError::AuthenticationError("token expired".to_string()),
    );
    let spec = ws.spec("job.yaml", "daily_orders", "analytics.daily_orders", "every 24 hours", 1_000);

    let err = ws.pipeline(&service).deploy(&spec).await.unwrap_err();
    assert_eq!(err.stage, Stage::Reconcile);
    assert_eq!(err.to_diagnostics()[0].code, DiagnosticCode::RemoteListFailed);
    assert_eq!(service.mutation_count().await, 0);
}

#[tokio::test]
async fn estimate_without_service_is_a_config_error() {
    let ws = Workspace::new();
    let spec = ws.spec("job.yaml", "daily_orders", "analytics.daily_orders", "every 24 hours", 1_000);

    let err = Pipeline::new(PipelineOptions::new(ws.templates_root()))
        .estimate(Path::new(&spec))
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Estimate);
    assert_eq!(err.to_diagnostics()[0].code, DiagnosticCode::ConfigMissingValue);
}

#[tokio::test]
async fn unchanged_spec_twice_leaves_remote_state_identical() {
    let ws = Workspace::new();
    let service = MockWarehouseService::new();
    let pipeline = ws.pipeline(&service);
    let spec = ws.spec("job.yaml", "daily_orders", "analytics.daily_orders", "every 24 hours", 1_000);

    pipeline.deploy(&spec).await.unwrap();
    let after_first = service.configs(&us()).await;

    let second = pipeline.deploy(&spec).await.unwrap();
    let after_second = service.configs(&us()).await;

    assert_eq!(second.outcome.action, ReconcileAction::Updated);
    assert_eq!(after_second, after_first);
    assert_eq!(service.call_count(MockOperation::Create).await, 1);
}

#[tokio::test]
async fn update_failure_is_reconcile_stage() {
    let ws = Workspace::new();
    let service = MockWarehouseService::new();
    let spec = ws.spec("job.yaml", "daily_orders", "analytics.daily_orders", "every 24 hours", 1_000);
    ws.pipeline(&service).deploy(&spec).await.unwrap();
    let before = service.configs(&us()).await;

    let failing = service.clone().with_failure(
        MockOperation::Update,
        ServiceError::PermissionDenied("bigquery.transfers.update denied".to_string()),
    );
    let changed = ws.spec("job.yaml", "daily_orders", "analytics.daily_orders", "every 12 hours", 1_000);
    let err = ws.pipeline(&failing).deploy(&changed).await.unwrap_err();

    assert_eq!(err.stage, Stage::Reconcile);
    assert_eq!(err.to_diagnostics()[0].code, DiagnosticCode::RemoteUpdateFailed);
    assert_eq!(service.configs(&us()).await, before);
}
