//! Warehouse service trait: dry runs and scheduled query configs

use crate::model::{CostEstimate, EstimateRequest, ProjectScope, TransferConfig, UpdateField};

/// Errors returned by a warehouse service call
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ServiceError {
    /// Classify an HTTP failure by status code
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400 => ServiceError::InvalidRequest(message),
            401 => ServiceError::AuthenticationError(message),
            403 => ServiceError::PermissionDenied(message),
            404 => ServiceError::NotFound(message),
            _ => ServiceError::ApiError { status, message },
        }
    }
}

/// Remote warehouse operations used by the deploy pipeline.
///
/// Implementations never retry; callers decide on retry policy.
#[async_trait::async_trait]
pub trait WarehouseService: Send + Sync {
    /// Get the service name (e.g., "BigQuery", "Mock")
    fn name(&self) -> &'static str;

    /// Dry-run `request.sql` and report what it would scan.
    ///
    /// Must not execute the query and must bypass the query cache.
    async fn estimate_query_cost(&self, request: &EstimateRequest) -> Result<CostEstimate, ServiceError>;

    /// List every scheduled query config in `scope`
    async fn list_transfer_configs(&self, scope: &ProjectScope) -> Result<Vec<TransferConfig>, ServiceError>;

    /// Create a config; the service assigns its `name`
    async fn create_transfer_config(
        &self,
        scope: &ProjectScope,
        config: &TransferConfig,
    ) -> Result<TransferConfig, ServiceError>;

    /// Update the config named by `config.name`, touching only `fields`
    async fn update_transfer_config(
        &self,
        config: &TransferConfig,
        fields: &[UpdateField],
    ) -> Result<TransferConfig, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(matches!(ServiceError::from_status(401, "x"), ServiceError::AuthenticationError(_)));
        assert!(matches!(ServiceError::from_status(403, "x"), ServiceError::PermissionDenied(_)));
        assert!(matches!(ServiceError::from_status(404, "x"), ServiceError::NotFound(_)));
        assert!(matches!(
            ServiceError::from_status(503, "unavailable"),
            ServiceError::ApiError { status: 503, .. }
        ));
    }
}
