//! BigQuery warehouse service
//!
//! Dry runs go through the BigQuery jobs API (`gcp-bigquery-client`).
//! Scheduled queries are managed through the BigQuery Data Transfer REST API
//! (`reqwest`), authenticated with an OAuth access token read from an
//! environment variable.
//!
//! ## Authentication
//!
//! The jobs client supports:
//! 1. Service account JSON file (explicit path)
//! 2. Application Default Credentials (ADC)
//!
//! The Data Transfer calls need `bigquery.transfers.get` and
//! `bigquery.transfers.update`; a token from
//! `gcloud auth print-access-token` is enough.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let service = BigQueryService::with_adc("my-project")
//!     .await?
//!     .with_location("EU");
//! let estimate = service.estimate_query_cost(&request).await?;
//! ```
//!
//! Reference: https://cloud.google.com/bigquery/docs/reference/datatransfer/rest

use crate::adapter::{ServiceError, WarehouseService};
use crate::model::{CostEstimate, EstimateRequest, ProjectScope, TransferConfig, UpdateField};
use sqlsched_core::{DEFAULT_ACCESS_TOKEN_ENV, DEFAULT_LOCATION};

#[cfg(feature = "bigquery")]
use gcp_bigquery_client::{model::query_request::QueryRequest, Client as BigQueryClient};
#[cfg(feature = "bigquery")]
use crate::model::SCHEDULED_QUERY_DATA_SOURCE;

/// Data Transfer REST endpoint
pub const DATA_TRANSFER_ENDPOINT: &str = "https://bigquerydatatransfer.googleapis.com/v1";

#[cfg(not(feature = "bigquery"))]
const NOT_COMPILED: &str =
    "BigQuery support not compiled. Rebuild with: cargo build --features bigquery";

/// BigQuery warehouse service
pub struct BigQueryService {
    /// Project the dry-run jobs are billed to
    project_id: String,

    /// Location for dry-run jobs
    location: String,

    /// Environment variable holding the Data Transfer access token
    access_token_env: String,

    /// BigQuery client (only available with bigquery feature)
    #[cfg(feature = "bigquery")]
    client: BigQueryClient,

    /// HTTP client for the Data Transfer API
    #[cfg(feature = "bigquery")]
    http: reqwest::Client,
}

impl BigQueryService {
    /// Create a new BigQuery service using Application Default Credentials (ADC)
    ///
    /// ADC automatically detects credentials from:
    /// - GOOGLE_APPLICATION_CREDENTIALS environment variable
    /// - gcloud CLI default credentials
    /// - GCE/GKE metadata service
    #[cfg(feature = "bigquery")]
    pub async fn with_adc(project_id: impl Into<String>) -> Result<Self, ServiceError> {
        let client = BigQueryClient::from_application_default_credentials()
            .await
            .map_err(|e| ServiceError::AuthenticationError(format!(
                "Failed to authenticate with ADC: {}. \
                 Ensure GOOGLE_APPLICATION_CREDENTIALS is set or run 'gcloud auth application-default login'",
                e
            )))?;

        Ok(Self::from_client(project_id.into(), client))
    }

    /// Create service without bigquery feature (returns error)
    #[cfg(not(feature = "bigquery"))]
    pub async fn with_adc(project_id: impl Into<String>) -> Result<Self, ServiceError> {
        let _ = project_id;
        Err(ServiceError::ConfigError(NOT_COMPILED.to_string()))
    }

    /// Create a new BigQuery service using a service account key file
    #[cfg(feature = "bigquery")]
    pub async fn from_service_account_file(
        project_id: impl Into<String>,
        key_path: impl AsRef<std::path::Path>,
    ) -> Result<Self, ServiceError> {
        let key_path_str = key_path.as_ref().to_string_lossy().to_string();

        let client = BigQueryClient::from_service_account_key_file(&key_path_str)
            .await
            .map_err(|e| ServiceError::AuthenticationError(format!(
                "Failed to read service account key file '{}': {}",
                key_path_str, e
            )))?;

        Ok(Self::from_client(project_id.into(), client))
    }

    /// Create service without bigquery feature (returns error)
    #[cfg(not(feature = "bigquery"))]
    pub async fn from_service_account_file(
        project_id: impl Into<String>,
        _key_path: impl AsRef<std::path::Path>,
    ) -> Result<Self, ServiceError> {
        let _ = project_id;
        Err(ServiceError::ConfigError(NOT_COMPILED.to_string()))
    }

    #[cfg(feature = "bigquery")]
    fn from_client(project_id: String, client: BigQueryClient) -> Self {
        Self {
            project_id,
            location: DEFAULT_LOCATION.to_string(),
            access_token_env: DEFAULT_ACCESS_TOKEN_ENV.to_string(),
            client,
            http: reqwest::Client::new(),
        }
    }

    /// Set the location dry-run jobs run in
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Set the environment variable the access token is read from
    pub fn with_access_token_env(mut self, name: impl Into<String>) -> Self {
        self.access_token_env = name.into();
        self
    }

    /// Read the Data Transfer access token from the environment
    fn access_token(&self) -> Result<String, ServiceError> {
        access_token_from_env(&self.access_token_env)
    }
}

#[cfg_attr(not(feature = "bigquery"), allow(dead_code))]
fn list_url(scope: &ProjectScope) -> String {
    format!("{}/{}/transferConfigs", DATA_TRANSFER_ENDPOINT, scope.parent())
}

#[cfg_attr(not(feature = "bigquery"), allow(dead_code))]
fn config_url(name: &str) -> String {
    format!("{}/{}", DATA_TRANSFER_ENDPOINT, name.trim_start_matches('/'))
}

/// Look up a non-empty token in `var`
fn access_token_from_env(var: &str) -> Result<String, ServiceError> {
    match std::env::var(var) {
        Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => Err(ServiceError::AuthenticationError(format!(
            "No Data Transfer access token: set {} (e.g. from 'gcloud auth print-access-token')",
            var
        ))),
    }
}

/// Map a jobs API error onto a service error
#[cfg(feature = "bigquery")]
fn classify_bigquery_error(err_str: String) -> ServiceError {
    if err_str.contains("Not found") {
        ServiceError::NotFound(err_str)
    } else if err_str.contains("Access Denied") || err_str.contains("Permission") {
        ServiceError::PermissionDenied(err_str)
    } else if err_str.contains("Request error") {
        ServiceError::NetworkError(err_str)
    } else {
        ServiceError::InvalidRequest(err_str)
    }
}

#[cfg(feature = "bigquery")]
fn classify_http_error(err: reqwest::Error) -> ServiceError {
    if err.is_decode() {
        ServiceError::InvalidResponse(err.to_string())
    } else {
        ServiceError::NetworkError(err.to_string())
    }
}

/// Turn a Data Transfer response into `T`, or a classified error
#[cfg(feature = "bigquery")]
async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, ServiceError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ServiceError::from_status(status.as_u16(), api_error_message(&body)));
    }

    response.json::<T>().await.map_err(classify_http_error)
}

/// Pull `error.message` out of a Google API error body
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(feature = "bigquery")]
#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTransferConfigsResponse {
    #[serde(default)]
    transfer_configs: Vec<TransferConfig>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[async_trait::async_trait]
impl WarehouseService for BigQueryService {
    fn name(&self) -> &'static str {
        "BigQuery"
    }

    #[cfg(feature = "bigquery")]
    async fn estimate_query_cost(&self, request: &EstimateRequest) -> Result<CostEstimate, ServiceError> {
        let mut query = QueryRequest::new(request.sql.clone());
        query.dry_run = Some(true);
        query.use_query_cache = Some(request.use_query_cache);
        query.maximum_bytes_billed = Some(request.max_bytes_billed.to_string());
        query.location = Some(self.location.clone());
        if !request.labels.is_empty() {
            query.labels = Some(
                request
                    .labels
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            );
        }

        tracing::debug!(project = %self.project_id, location = %self.location, "submitting dry run");

        let response = self
            .client
            .job()
            .query(&self.project_id, query)
            .await
            .map_err(|e| classify_bigquery_error(e.to_string()))?;

        let bytes_processed = response
            .total_bytes_processed
            .as_deref()
            .ok_or_else(|| ServiceError::InvalidResponse("dry run returned no totalBytesProcessed".to_string()))?
            .parse::<u64>()
            .map_err(|e| ServiceError::InvalidResponse(format!("invalid totalBytesProcessed: {}", e)))?;

        // The synchronous query endpoint does not report slot time for dry runs.
        Ok(CostEstimate {
            bytes_processed,
            slot_millis: 0.0,
        })
    }

    #[cfg(not(feature = "bigquery"))]
    async fn estimate_query_cost(&self, _request: &EstimateRequest) -> Result<CostEstimate, ServiceError> {
        Err(ServiceError::ConfigError(NOT_COMPILED.to_string()))
    }

    #[cfg(feature = "bigquery")]
    async fn list_transfer_configs(&self, scope: &ProjectScope) -> Result<Vec<TransferConfig>, ServiceError> {
        let token = self.access_token()?;
        let url = list_url(scope);
        let mut configs = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query: Vec<(&str, &str)> = vec![("dataSourceIds", SCHEDULED_QUERY_DATA_SOURCE)];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let response = self
                .http
                .get(&url)
                .bearer_auth(&token)
                .query(&query)
                .send()
                .await
                .map_err(classify_http_error)?;

            let page: ListTransferConfigsResponse = read_json(response).await?;
            configs.extend(page.transfer_configs);

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        tracing::debug!(scope = %scope, count = configs.len(), "listed transfer configs");
        Ok(configs)
    }

    #[cfg(not(feature = "bigquery"))]
    async fn list_transfer_configs(&self, _scope: &ProjectScope) -> Result<Vec<TransferConfig>, ServiceError> {
        Err(ServiceError::ConfigError(NOT_COMPILED.to_string()))
    }

    #[cfg(feature = "bigquery")]
    async fn create_transfer_config(
        &self,
        scope: &ProjectScope,
        config: &TransferConfig,
    ) -> Result<TransferConfig, ServiceError> {
        let token = self.access_token()?;
        let response = self
            .http
            .post(list_url(scope))
            .bearer_auth(&token)
            .json(config)
            .send()
            .await
            .map_err(classify_http_error)?;

        read_json(response).await
    }

    #[cfg(not(feature = "bigquery"))]
    async fn create_transfer_config(
        &self,
        _scope: &ProjectScope,
        _config: &TransferConfig,
    ) -> Result<TransferConfig, ServiceError> {
        Err(ServiceError::ConfigError(NOT_COMPILED.to_string()))
    }

    #[cfg(feature = "bigquery")]
    async fn update_transfer_config(
        &self,
        config: &TransferConfig,
        fields: &[UpdateField],
    ) -> Result<TransferConfig, ServiceError> {
        let name = config
            .name
            .as_deref()
            .ok_or_else(|| ServiceError::InvalidRequest("transfer config has no resource name".to_string()))?;

        let token = self.access_token()?;
        let mask = UpdateField::mask(fields);
        let response = self
            .http
            .patch(config_url(name))
            .bearer_auth(&token)
            .query(&[("updateMask", mask.as_str())])
            .json(config)
            .send()
            .await
            .map_err(classify_http_error)?;

        read_json(response).await
    }

    #[cfg(not(feature = "bigquery"))]
    async fn update_transfer_config(
        &self,
        _config: &TransferConfig,
        _fields: &[UpdateField],
    ) -> Result<TransferConfig, ServiceError> {
        Err(ServiceError::ConfigError(NOT_COMPILED.to_string()))
    }
}
