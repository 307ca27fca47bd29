//! Warehouse services for dry runs and scheduled query configs
//!
//! This crate provides the remote side of a deploy: estimating what a query
//! would scan, and listing, creating and updating BigQuery scheduled queries
//! (Data Transfer Service transfer configs).
//!
//! ## Features
//!
//! Enable warehouse support via Cargo features:
//! - `bigquery` - Google BigQuery + Data Transfer Service support
//!
//! Without it, [`BigQueryService`] compiles but every call returns a
//! configuration error. [`MockWarehouseService`] is always available.
//!
//! ## Example
//!
//! ```rust,ignore
//! use sqlsched_catalog::{BigQueryService, ProjectScope, WarehouseService};
//!
//! let service = BigQueryService::with_adc("my-project").await?;
//! let configs = service
//!     .list_transfer_configs(&ProjectScope::new("my-project", "US"))
//!     .await?;
//! ```

pub mod adapter;
pub mod bigquery;
pub mod mock;
pub mod model;

pub use adapter::{ServiceError, WarehouseService};
pub use bigquery::BigQueryService;
pub use mock::{MockOperation, MockWarehouseService};
pub use model::{
    CostEstimate, EstimateRequest, ProjectScope, ScheduledQueryParams, TransferConfig,
    TransferIdentity, UpdateField, RECONCILE_UPDATE_MASK, SCHEDULED_QUERY_DATA_SOURCE,
};
