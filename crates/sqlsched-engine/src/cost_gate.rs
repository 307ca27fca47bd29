//! Dry-run cost gate
//!
//! Estimates what a rendered query would scan and refuses anything above the
//! job's byte ceiling. A query exactly at the ceiling passes.

use crate::deadline::bounded;
use sqlsched_catalog::{CostEstimate, EstimateRequest, ServiceError, WarehouseService};
use sqlsched_core::{Diagnostic, DiagnosticCode, JobSpec, Severity};
use std::time::Duration;

/// Why a query did not pass the gate
#[derive(Debug, thiserror::Error)]
pub enum EstimateError {
    #[error("estimated bytes processed {estimated_bytes} exceeds max_bytes_billed {max_bytes_billed}")]
    BudgetExceeded {
        estimated_bytes: u64,
        max_bytes_billed: u64,
    },

    #[error("dry run failed: {0}")]
    Service(#[from] ServiceError),

    #[error("dry run did not finish within {}s", after.as_secs_f64())]
    TimedOut { after: Duration },
}

impl EstimateError {
    /// Convert to a diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            EstimateError::BudgetExceeded {
                estimated_bytes,
                max_bytes_billed,
            } => Diagnostic::new(DiagnosticCode::BudgetExceeded, Severity::Error, self.to_string())
                .with_field("limits.max_bytes_billed")
                .with_comparison(
                    format!("<= {} bytes", max_bytes_billed),
                    format!("{} bytes", estimated_bytes),
                ),
            EstimateError::Service(_) => Diagnostic::error(DiagnosticCode::EstimateFailed, self.to_string()),
            EstimateError::TimedOut { .. } => Diagnostic::error(DiagnosticCode::RemoteTimeout, self.to_string()),
        }
    }
}

/// Checks a query against a byte ceiling using a warehouse dry run
pub struct CostGate<'a> {
    service: &'a dyn WarehouseService,
    timeout: Option<Duration>,
}

impl<'a> CostGate<'a> {
    pub fn new(service: &'a dyn WarehouseService) -> Self {
        Self {
            service,
            timeout: None,
        }
    }

    /// Bound the dry-run call
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Dry-run `sql` and fail if it would scan more than `max_bytes_billed`.
    ///
    /// The job's labels are attached to the dry-run job and the query cache
    /// is bypassed, so the estimate reflects a cold run.
    pub async fn estimate(
        &self,
        sql: &str,
        max_bytes_billed: u64,
        spec: &JobSpec,
    ) -> Result<CostEstimate, EstimateError> {
        let request = EstimateRequest::new(sql, max_bytes_billed, spec.labels().clone());

        tracing::debug!(
            job = spec.name(),
            service = self.service.name(),
            max_bytes_billed,
            "estimating query cost"
        );

        let estimate = bounded(self.timeout, self.service.estimate_query_cost(&request))
            .await
            .map_err(|after| EstimateError::TimedOut { after })??;

        tracing::info!(
            job = spec.name(),
            estimated_bytes = estimate.bytes_processed,
            max_bytes_billed,
            slot_millis = estimate.slot_millis,
            "dry run complete"
        );

        check_budget(estimate, max_bytes_billed)
    }
}

/// Pass `estimate` through unless it is over the ceiling
pub fn check_budget(estimate: CostEstimate, max_bytes_billed: u64) -> Result<CostEstimate, EstimateError> {
    if estimate.bytes_processed > max_bytes_billed {
        return Err(EstimateError::BudgetExceeded {
            estimated_bytes: estimate.bytes_processed,
            max_bytes_billed,
        });
    }
    Ok(estimate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sqlsched_catalog::{MockOperation, MockWarehouseService};

    const SPEC: &str = r#"
name: daily_orders
schedule: "every 24 hours"
sql_template: orders.sql
destination_table: analytics.daily_orders
labels:
  owner: data-team
  domain: sales
  environment: prod
limits:
  max_bytes_billed: 500000
"#;

    fn spec() -> JobSpec {
        JobSpec::from_yaml_str(SPEC).unwrap()
    }

    fn estimate(bytes: u64) -> CostEstimate {
        CostEstimate {
            bytes_processed: bytes,
            slot_millis: 0.0,
        }
    }

    #[test]
    fn test_over_budget_reports_both_numbers() {
        let err = check_budget(estimate(1_000_000), 500_000).unwrap_err();
        match &err {
            EstimateError::BudgetExceeded {
                estimated_bytes,
                max_bytes_billed,
            } => {
                assert_eq!(*estimated_bytes, 1_000_000);
                assert_eq!(*max_bytes_billed, 500_000);
            }
            other => panic!("expected BudgetExceeded, got {:?}", other),
        }
        let message = err.to_string();
        assert!(message.contains("1000000"));
        assert!(message.contains("500000"));
    }

    #[test]
    fn test_at_and_under_budget_pass() {
        assert!(check_budget(estimate(500_000), 500_000).is_ok());
        assert!(check_budget(estimate(400_000), 500_000).is_ok());
        assert!(check_budget(estimate(0), 0).is_ok());
    }

    #[test]
    fn test_diagnostic_codes() {
        let over = EstimateError::BudgetExceeded {
            estimated_bytes: 2,
            max_bytes_billed: 1,
        };
        assert_eq!(over.to_diagnostic().code, DiagnosticCode::BudgetExceeded);
        assert_eq!(over.to_diagnostic().severity, Severity::Error);

        let failed = EstimateError::Service(ServiceError::NetworkError("reset".to_string()));
        assert_eq!(failed.to_diagnostic().code, DiagnosticCode::EstimateFailed);

        let slow = EstimateError::TimedOut {
            after: Duration::from_secs(1),
        };
        assert_eq!(slow.to_diagnostic().code, DiagnosticCode::RemoteTimeout);
    }

    #[tokio::test]
    async fn test_request_carries_labels_and_disables_cache() {
        let service = MockWarehouseService::new().with_estimate(400_000, 12.0);
        let spec = spec();

        let result = CostGate::new(&service)
            .estimate("SELECT 1", spec.max_bytes_billed(), &spec)
            .await
            .unwrap();
        assert_eq!(result.bytes_processed, 400_000);

        let requests = service.estimate_requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].sql, "SELECT 1");
        assert_eq!(requests[0].max_bytes_billed, 500_000);
        assert_eq!(requests[0].labels.get("environment").map(String::as_str), Some("prod"));
        assert!(!requests[0].use_query_cache);
    }

    #[tokio::test]
    async fn test_service_failure_is_not_a_budget_error() {
        let service = MockWarehouseService::new().with_failure(
            MockOperation::Estimate,
            ServiceError::InvalidRequest("Syntax error: Unexpected end of script".to_string()),
        );
        let spec = spec();

        let err = CostGate::new(&service)
            .estimate("SELECT", spec.max_bytes_billed(), &spec)
            .await
            .unwrap_err();
        assert!(matches!(err, EstimateError::Service(ServiceError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_slow_dry_run_times_out() {
        let service = MockWarehouseService::new().with_latency(200);
        let spec = spec();

        let err = CostGate::new(&service)
            .with_timeout(Some(Duration::from_millis(20)))
            .estimate("SELECT 1", spec.max_bytes_billed(), &spec)
            .await
            .unwrap_err();
        assert!(matches!(err, EstimateError::TimedOut { .. }));
    }
}
