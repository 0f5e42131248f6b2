//! Hemmer Reconciler
//!
//! This crate drives remote cloud resources through their lifecycle against an
//! eventually consistent control plane: submit desired state, wait for the
//! long-running operation, read back what was built, compare, and tear down.
//! It also ships the acceptance-test harness used to exercise managed
//! resource types.
//!
//! # Overview
//!
//! - **Identifiers**: [`ResourceId`] parses and renders hierarchical resource IDs
//! - **State**: [`DesiredState`] and [`ObservedState`], with [`compare`] to diff them
//! - **Reconciler**: [`Reconciler`] submits writes and deletes and waits on [`OperationHandle`]s
//! - **Control plane**: the [`ControlPlane`] trait hosts implement over their own client
//! - **Schemas**: [`schema`], [`validation`] and built-in [`resources`]
//! - **Testing**: lifecycle scenarios, assertions and an in-memory control plane in [`testing`]
//! - **Logging**: integration with `tracing` for structured logging
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use hemmer_reconciler::{
//!     resources::ddos_protection_plan, DesiredState, Reconciler, ReconcilerOptions, ResourceId,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     hemmer_reconciler::init_logging();
//!
//!     let options = ReconcilerOptions::from_json(serde_json::json!({
//!         "poll": {"initial_interval_ms": 1000}
//!     }))?;
//!     let reconciler = Reconciler::with_options(Arc::new(MyClient::new()), options);
//!
//!     let id = ResourceId::parse(
//!         "/subscriptions/0000/resourceGroups/rg/providers/Microsoft.Network/ddosProtectionPlans/plan",
//!     )?;
//!     let desired = ddos_protection_plan::desired("plan", "westeurope", "rg")
//!         .with_tags([("environment", "Production")]);
//!
//!     let schema = ddos_protection_plan::schema();
//!     Reconciler::<MyClient>::validate(&schema, &id, &desired)?;
//!
//!     let mut handle = reconciler
//!         .create_or_update(&id, &desired, schema.create_mode())
//!         .await?;
//!     reconciler.wait(&mut handle, Duration::from_secs(600)).await?;
//!
//!     let mismatches = reconciler.verify(&id, &desired, &schema.ignored_fields()).await?;
//!     assert!(mismatches.is_empty());
//!
//!     reconciler.destroy(&id).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Absence
//!
//! Only a not-found answer from the control plane means a resource is
//! absent. Throttling, permission and network failures are always surfaced
//! as errors, so [`Reconciler::exists`] never reports `false` because a
//! lookup failed.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod diff;
pub mod error;
pub mod id;
pub mod logging;
pub mod operation;
pub mod reconciler;
pub mod resources;
pub mod schema;
pub mod state;
pub mod testing;
pub mod validation;

// Re-export main types at crate root
pub use client::{CompletedOperation, ControlPlane, OperationStatus, PendingOperation};
pub use config::{PollPolicy, ReconcilerOptions};
pub use diff::{compare, Mismatch, MismatchKind};
pub use error::{ControlPlaneError, ControlPlaneErrorKind, ReconcileError};
pub use id::{ParseError, ParseErrorReason, ResourceId};
pub use logging::{init_logging, init_logging_with_default, try_init_logging, try_init_test_logging};
pub use operation::{HandleState, Operation, OperationHandle, OperationOutcome};
pub use reconciler::{Reconciler, WriteMode};
pub use schema::{Diagnostic, ResourceSchema};
pub use state::{DesiredState, ObservedState};
pub use validation::{split_diagnostics, validate, validate_result, validate_update};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tonic;
pub use tracing;
