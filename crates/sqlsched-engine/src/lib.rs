//! sqlsched engine - Deploy business logic
//!
//! This crate implements the stages that sit on top of the job spec model:
//! - Dry-run cost gate
//! - Create-or-update reconciliation of scheduled queries
//! - The pipeline that sequences validate, render, estimate and reconcile

pub mod cost_gate;
mod deadline;
pub mod pipeline;
pub mod reconciler;

pub use cost_gate::{CostGate, EstimateError};
pub use pipeline::{
    DeployRun, EstimateRun, Pipeline, PipelineError, PipelineOptions, PlanRun, RenderRun, Stage,
    StageError,
};
pub use reconciler::{
    ReconcileAction, ReconcileError, ReconcileOutcome, ReconcilePlan, Reconciler, RemoteOperation,
};
