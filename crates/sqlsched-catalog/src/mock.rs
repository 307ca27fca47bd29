//! In-memory warehouse service for testing
//!
//! Stores transfer configs per project scope and returns a configurable
//! dry-run estimate without connecting to anything. It's useful for:
//! - Unit testing the cost gate and reconciler
//! - Integration testing the deploy pipeline
//! - Simulating failures and slow calls
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sqlsched_catalog::{MockWarehouseService, MockOperation, ServiceError};
//!
//! let service = MockWarehouseService::new()
//!     .with_estimate(1_000_000, 0.0)
//!     .with_latency(50)
//!     .with_failure(MockOperation::Create, ServiceError::PermissionDenied("nope".into()));
//! ```

use crate::adapter::{ServiceError, WarehouseService};
use crate::model::{CostEstimate, EstimateRequest, ProjectScope, TransferConfig, UpdateField};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Operations of [`WarehouseService`], for failure injection and call counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    Estimate,
    List,
    Create,
    Update,
}

/// Mock warehouse service
///
/// Clones share state, so a test can keep a handle while the code under test
/// owns another.
#[derive(Clone)]
pub struct MockWarehouseService {
    /// Stored configs with the scope they were created in
    configs: Arc<RwLock<Vec<(ProjectScope, TransferConfig)>>>,

    /// Estimate returned by every dry run
    estimate: Arc<RwLock<CostEstimate>>,

    /// Errors to return per operation
    failures: Arc<RwLock<HashMap<MockOperation, ServiceError>>>,

    /// Calls received per operation
    calls: Arc<RwLock<HashMap<MockOperation, usize>>>,

    /// Every dry-run request received, in order
    estimate_requests: Arc<RwLock<Vec<EstimateRequest>>>,

    /// Counter for assigned resource names
    next_id: Arc<AtomicU64>,

    /// Simulate call latency (milliseconds)
    latency_ms: u64,
}

impl MockWarehouseService {
    /// Create an empty mock whose dry runs report zero bytes
    pub fn new() -> Self {
        Self {
            configs: Arc::new(RwLock::new(Vec::new())),
            estimate: Arc::new(RwLock::new(CostEstimate {
                bytes_processed: 0,
                slot_millis: 0.0,
            })),
            failures: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(RwLock::new(HashMap::new())),
            estimate_requests: Arc::new(RwLock::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            latency_ms: 0,
        }
    }

    /// Set the estimate every dry run returns
    pub fn with_estimate(mut self, bytes_processed: u64, slot_millis: f64) -> Self {
        self.estimate = Arc::new(RwLock::new(CostEstimate {
            bytes_processed,
            slot_millis,
        }));
        self
    }

    /// Make `operation` fail with `error`
    pub fn with_failure(mut self, operation: MockOperation, error: ServiceError) -> Self {
        let mut failures = self
            .failures
            .try_read()
            .map(|f| f.clone())
            .unwrap_or_default();
        failures.insert(operation, error);
        self.failures = Arc::new(RwLock::new(failures));
        self
    }

    /// Configure simulated latency for all operations
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Change the estimate on a shared mock
    pub async fn set_estimate(&self, bytes_processed: u64, slot_millis: f64) {
        *self.estimate.write().await = CostEstimate {
            bytes_processed,
            slot_millis,
        };
    }

    /// Clear all injected failures
    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    /// Store a config as if it already existed remotely.
    ///
    /// A resource name is assigned when the config has none.
    pub async fn seed(&self, scope: &ProjectScope, mut config: TransferConfig) -> TransferConfig {
        if config.name.is_none() {
            config.name = Some(self.assign_name(scope));
        }
        self.configs.write().await.push((scope.clone(), config.clone()));
        config
    }

    /// Configs currently stored in `scope`
    pub async fn configs(&self, scope: &ProjectScope) -> Vec<TransferConfig> {
        self.configs
            .read()
            .await
            .iter()
            .filter(|(s, _)| s == scope)
            .map(|(_, c)| c.clone())
            .collect()
    }

    /// Total number of stored configs across scopes
    pub async fn config_count(&self) -> usize {
        self.configs.read().await.len()
    }

    /// Number of calls received for `operation`
    pub async fn call_count(&self, operation: MockOperation) -> usize {
        self.calls.read().await.get(&operation).copied().unwrap_or(0)
    }

    /// Number of create and update calls received
    pub async fn mutation_count(&self) -> usize {
        self.call_count(MockOperation::Create).await + self.call_count(MockOperation::Update).await
    }

    /// Dry-run requests received so far
    pub async fn estimate_requests(&self) -> Vec<EstimateRequest> {
        self.estimate_requests.read().await.clone()
    }

    fn assign_name(&self, scope: &ProjectScope) -> String {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{}/transferConfigs/mock-{:06}", scope.parent(), id)
    }

    /// Record the call, wait out the latency, then apply any injected failure
    async fn enter(&self, operation: MockOperation) -> Result<(), ServiceError> {
        *self.calls.write().await.entry(operation).or_insert(0) += 1;

        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }

        match self.failures.read().await.get(&operation) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

impl Default for MockWarehouseService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl WarehouseService for MockWarehouseService {
    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn estimate_query_cost(&self, request: &EstimateRequest) -> Result<CostEstimate, ServiceError> {
        self.estimate_requests.write().await.push(request.clone());
        self.enter(MockOperation::Estimate).await?;
        Ok(*self.estimate.read().await)
    }

    async fn list_transfer_configs(&self, scope: &ProjectScope) -> Result<Vec<TransferConfig>, ServiceError> {
        self.enter(MockOperation::List).await?;
        Ok(self.configs(scope).await)
    }

    async fn create_transfer_config(
        &self,
        scope: &ProjectScope,
        config: &TransferConfig,
    ) -> Result<TransferConfig, ServiceError> {
        self.enter(MockOperation::Create).await?;

        let mut created = config.clone();
        created.name = Some(self.assign_name(scope));
        self.configs.write().await.push((scope.clone(), created.clone()));
        Ok(created)
    }

    async fn update_transfer_config(
        &self,
        config: &TransferConfig,
        fields: &[UpdateField],
    ) -> Result<TransferConfig, ServiceError> {
        self.enter(MockOperation::Update).await?;

        let name = config
            .name
            .as_deref()
            .ok_or_else(|| ServiceError::InvalidRequest("transfer config has no resource name".to_string()))?;

        let mut configs = self.configs.write().await;
        let stored = configs
            .iter_mut()
            .map(|(_, c)| c)
            .find(|c| c.name.as_deref() == Some(name))
            .ok_or_else(|| ServiceError::NotFound(name.to_string()))?;

        stored.apply_update(config, fields);
        Ok(stored.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SCHEDULED_QUERY_DATA_SOURCE;
    use std::collections::BTreeMap;

    fn config(name: &str) -> TransferConfig {
        TransferConfig {
            display_name: name.to_string(),
            destination_dataset_id: "analytics".to_string(),
            data_source_id: SCHEDULED_QUERY_DATA_SOURCE.to_string(),
            schedule: "every 24 hours".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_assigns_name_and_lists_by_scope() {
        let service = MockWarehouseService::new();
        let us = ProjectScope::new("acme", "US");
        let eu = ProjectScope::new("acme", "EU");

        let created = service.create_transfer_config(&us, &config("job")).await.unwrap();
        let name = created.name.unwrap();
        assert!(name.starts_with("projects/acme/locations/us/transferConfigs/"));

        assert_eq!(service.list_transfer_configs(&us).await.unwrap().len(), 1);
        assert!(service.list_transfer_configs(&eu).await.unwrap().is_empty());
        assert_eq!(service.call_count(MockOperation::Create).await, 1);
        assert_eq!(service.call_count(MockOperation::List).await, 2);
    }

    #[tokio::test]
    async fn test_update_unknown_name_is_not_found() {
        let service = MockWarehouseService::new();
        let mut missing = config("job");
        missing.name = Some("projects/acme/locations/us/transferConfigs/nope".to_string());

        let err = service
            .update_transfer_config(&missing, &[UpdateField::Schedule])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_estimate_records_requests() {
        let service = MockWarehouseService::new().with_estimate(42, 7.5);
        let request = EstimateRequest::new("SELECT 1", 100, BTreeMap::new());

        let estimate = service.estimate_query_cost(&request).await.unwrap();
        assert_eq!(estimate.bytes_processed, 42);
        assert_eq!(estimate.slot_millis, 7.5);

        let seen = service.estimate_requests().await;
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].use_query_cache);
    }

    #[tokio::test]
    async fn test_injected_failure_and_clear() {
        let service = MockWarehouseService::new()
            .with_failure(MockOperation::List, ServiceError::NetworkError("down".to_string()));
        let scope = ProjectScope::new("acme", "US");

        assert!(service.list_transfer_configs(&scope).await.is_err());
        service.clear_failures().await;
        assert!(service.list_transfer_configs(&scope).await.is_ok());
    }

    #[tokio::test]
    async fn test_clone_shares_state() {
        let service = MockWarehouseService::new();
        let handle = service.clone();
        let scope = ProjectScope::new("acme", "US");

        service.seed(&scope, config("job")).await;
        assert_eq!(handle.config_count().await, 1);
        assert_eq!(handle.name(), "Mock");
    }
}
