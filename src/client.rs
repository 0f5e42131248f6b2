//! The control-plane interface the reconciler drives.
//!
//! The reconciler never talks to a concrete SDK. Hosts implement
//! [`ControlPlane`] over whatever client they already have (HTTP, gRPC, an
//! in-memory fake for tests) and hand it to the
//! [`Reconciler`](crate::Reconciler) explicitly.
//!
//! # Not-found signalling
//!
//! Absence must be reported as a [`ControlPlaneError`] whose kind is
//! [`ControlPlaneErrorKind::NotFound`](crate::error::ControlPlaneErrorKind::NotFound).
//! Remote APIs disagree on how they say "not found" (404, 204 on delete, an
//! error code in the body), so each implementation is responsible for mapping
//! its own contract; [`ControlPlaneError::from_http_status`] and the
//! `tonic::Status` conversion cover the common cases.

use std::fmt;

use crate::error::ControlPlaneError;
use crate::id::ResourceId;
use crate::state::{DesiredState, ObservedState};

/// Status reported by a long-running remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    /// Still running.
    InProgress,
    /// Completed successfully.
    Succeeded,
    /// Completed with an error; carries the provider's detail text.
    Failed(String),
}

/// A long-running operation accepted by the control plane.
#[async_trait::async_trait]
pub trait PendingOperation: Send + Sync {
    /// Ask the control plane for the current status.
    ///
    /// Must not block until completion; the reconciler owns the poll loop.
    async fn poll_status(&self) -> Result<OperationStatus, ControlPlaneError>;
}

impl fmt::Debug for dyn PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PendingOperation")
    }
}

/// A client for the remote control plane.
///
/// Implementations must be safe to share between tasks. The reconciler holds
/// no locks of its own, so any serialization the remote API requires (for
/// example, at most one plan of a kind per region) is the caller's job.
#[async_trait::async_trait]
pub trait ControlPlane: Send + Sync + 'static {
    /// Read the current state of a resource.
    async fn get(&self, id: &ResourceId) -> Result<ObservedState, ControlPlaneError>;

    /// Submit a create-or-update.
    async fn create_or_update(
        &self,
        id: &ResourceId,
        desired: &DesiredState,
    ) -> Result<Box<dyn PendingOperation>, ControlPlaneError>;

    /// Submit a delete.
    async fn delete(&self, id: &ResourceId) -> Result<Box<dyn PendingOperation>, ControlPlaneError>;
}

/// A [`PendingOperation`] that is already finished.
///
/// Useful for control planes whose writes complete synchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedOperation(pub OperationStatus);

impl CompletedOperation {
    /// A successful, already-finished operation.
    pub fn succeeded() -> Box<dyn PendingOperation> {
        Box::new(Self(OperationStatus::Succeeded))
    }

    /// A failed, already-finished operation.
    pub fn failed(detail: impl Into<String>) -> Box<dyn PendingOperation> {
        Box::new(Self(OperationStatus::Failed(detail.into())))
    }
}

#[async_trait::async_trait]
impl PendingOperation for CompletedOperation {
    async fn poll_status(&self) -> Result<OperationStatus, ControlPlaneError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completed_operation() {
        let op = CompletedOperation::succeeded();
        assert_eq!(op.poll_status().await.unwrap(), OperationStatus::Succeeded);

        let op = CompletedOperation::failed("Conflict: region quota");
        assert_eq!(
            op.poll_status().await.unwrap(),
            OperationStatus::Failed("Conflict: region quota".to_string())
        );
    }

    #[test]
    fn test_boxed_operation_debug() {
        let op = CompletedOperation::succeeded();
        assert_eq!(format!("{:?}", op), "PendingOperation");

        let submitted: Result<Box<dyn PendingOperation>, ControlPlaneError> =
            Err(ControlPlaneError::not_found("gone"));
        assert!(submitted.unwrap_err().is_not_found());
    }
}
