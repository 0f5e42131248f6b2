//! Asynchronous operation handles.
//!
//! Writes against the control plane are long-running. A submission returns a
//! [`PendingOperation`](crate::client::PendingOperation) which the reconciler
//! wraps in an [`OperationHandle`]. The handle moves through
//!
//! ```text
//! Submitted -> InProgress -> { Succeeded, Failed }
//! ```
//!
//! and never leaves a terminal state once it reaches one. Giving up on a
//! handle because the caller's budget ran out is not a handle state; see
//! [`Reconciler::wait`](crate::Reconciler::wait).

use std::fmt;

use crate::client::{OperationStatus, PendingOperation};
use crate::error::ControlPlaneError;
use crate::id::ResourceId;

/// The kind of lifecycle operation being performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// A read of the remote resource.
    Read,
    /// A create that must not overwrite an existing resource.
    Create,
    /// A create-or-update (upsert).
    CreateOrUpdate,
    /// A delete.
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "Read",
            Self::Create => "Create",
            Self::CreateOrUpdate => "CreateOrUpdate",
            Self::Delete => "Delete",
        };
        f.write_str(name)
    }
}

/// The result of polling an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    /// The operation completed successfully.
    Succeeded,
    /// The operation failed; carries the provider's error detail verbatim.
    Failed(String),
    /// The target did not exist (a delete of an absent resource).
    NotFound,
    /// The operation has not finished yet.
    InProgress,
}

impl OperationOutcome {
    /// Whether polling can stop.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::InProgress)
    }

    /// Whether the operation achieved its goal.
    ///
    /// `NotFound` counts as success: deleting an absent resource is a no-op.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::NotFound)
    }
}

/// The lifecycle state of an [`OperationHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Accepted by the control plane, not yet polled.
    Submitted,
    /// Polled at least once and still running.
    InProgress,
    /// Finished successfully.
    Succeeded,
    /// Finished with a failure.
    Failed,
}

impl HandleState {
    /// Whether the handle has finished.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// An in-flight (or finished) write against one resource.
pub struct OperationHandle {
    resource_id: ResourceId,
    operation: Operation,
    state: HandleState,
    outcome: Option<OperationOutcome>,
    pending: Option<Box<dyn PendingOperation>>,
}

impl OperationHandle {
    pub(crate) fn submitted(
        resource_id: ResourceId,
        operation: Operation,
        pending: Box<dyn PendingOperation>,
    ) -> Self {
        Self {
            resource_id,
            operation,
            state: HandleState::Submitted,
            outcome: None,
            pending: Some(pending),
        }
    }

    /// A handle that finished without anything being submitted.
    pub(crate) fn completed(
        resource_id: ResourceId,
        operation: Operation,
        outcome: OperationOutcome,
    ) -> Self {
        let state = if outcome.is_success() {
            HandleState::Succeeded
        } else {
            HandleState::Failed
        };
        Self {
            resource_id,
            operation,
            state,
            outcome: Some(outcome),
            pending: None,
        }
    }

    /// The resource this operation targets.
    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }

    /// The operation being performed.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// The current state.
    pub fn state(&self) -> HandleState {
        self.state
    }

    /// The terminal outcome, once reached.
    pub fn outcome(&self) -> Option<&OperationOutcome> {
        self.outcome.as_ref()
    }

    /// Whether the handle has finished.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Poll the control plane once and advance the state machine.
    ///
    /// Once terminal, the cached outcome is returned without another call.
    pub async fn poll(&mut self) -> Result<OperationOutcome, ControlPlaneError> {
        if let Some(outcome) = &self.outcome {
            return Ok(outcome.clone());
        }
        let Some(pending) = &self.pending else {
            return Ok(OperationOutcome::InProgress);
        };

        let outcome = match pending.poll_status().await {
            Ok(OperationStatus::InProgress) => OperationOutcome::InProgress,
            Ok(OperationStatus::Succeeded) => OperationOutcome::Succeeded,
            Ok(OperationStatus::Failed(detail)) => OperationOutcome::Failed(detail),
            // The resource vanishing while a delete is in flight is the goal.
            Err(err) if err.is_not_found() && self.operation == Operation::Delete => {
                OperationOutcome::NotFound
            },
            Err(err) => return Err(err),
        };

        self.state = match &outcome {
            OperationOutcome::InProgress => HandleState::InProgress,
            OperationOutcome::Failed(_) => HandleState::Failed,
            OperationOutcome::Succeeded | OperationOutcome::NotFound => HandleState::Succeeded,
        };
        if outcome.is_terminal() {
            self.outcome = Some(outcome.clone());
            self.pending = None;
        }
        Ok(outcome)
    }
}

impl fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationHandle")
            .field("resource_id", &self.resource_id)
            .field("operation", &self.operation)
            .field("state", &self.state)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}
