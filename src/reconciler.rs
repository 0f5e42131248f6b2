//! The resource lifecycle reconciler.
//!
//! [`Reconciler`] drives a single remote resource through its lifecycle:
//! submit desired state, wait for the control plane to finish, read back what
//! it built, compare, and eventually tear it down and confirm it is gone.
//!
//! # Concurrency
//!
//! A reconciler holds only the shared client and immutable options, so it can
//! be cloned into as many tasks as needed. It performs no locking. Where the
//! remote API allows only one resource of a kind per scope (for example, one
//! DDoS protection plan per region), callers must serialize those lifecycles
//! themselves; [`SerialGroup`](crate::testing::SerialGroup) exists for that.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use hemmer_reconciler::{Reconciler, ResourceId, DesiredState, WriteMode};
//!
//! let reconciler = Reconciler::new(Arc::new(my_client));
//! let id = ResourceId::parse(raw_id)?;
//!
//! let mut handle = reconciler
//!     .create_or_update(&id, &desired, WriteMode::CreateOnly)
//!     .await?;
//! reconciler.wait(&mut handle, Duration::from_secs(600)).await?;
//!
//! let observed = reconciler.read(&id).await?.expect("just created");
//! assert!(reconciler.compare(&observed, &desired, &["id"]).is_empty());
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

use crate::client::ControlPlane;
use crate::config::ReconcilerOptions;
use crate::diff::{compare, Mismatch};
use crate::error::{ControlPlaneErrorKind, ReconcileError};
use crate::id::ResourceId;
use crate::operation::{Operation, OperationHandle, OperationOutcome};
use crate::schema::{Diagnostic, ResourceSchema};
use crate::state::{DesiredState, ObservedState};
use crate::validation::{split_diagnostics, validate_result, validate_update};

/// How a write treats an existing resource with the same identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Create or converge an existing resource.
    #[default]
    Upsert,
    /// Refuse to touch an existing resource; it must be imported instead.
    CreateOnly,
}

impl WriteMode {
    fn operation(self) -> Operation {
        match self {
            Self::Upsert => Operation::CreateOrUpdate,
            Self::CreateOnly => Operation::Create,
        }
    }
}

/// Drives remote resources to a desired state through a [`ControlPlane`].
pub struct Reconciler<C> {
    client: Arc<C>,
    options: ReconcilerOptions,
}

impl<C> Clone for Reconciler<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            options: self.options.clone(),
        }
    }
}

impl<C: ControlPlane> Reconciler<C> {
    /// Create a reconciler with default options.
    pub fn new(client: Arc<C>) -> Self {
        Self::with_options(client, ReconcilerOptions::default())
    }

    /// Create a reconciler with explicit options.
    pub fn with_options(client: Arc<C>, options: ReconcilerOptions) -> Self {
        Self { client, options }
    }

    /// The control-plane client.
    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// The options in effect.
    pub fn options(&self) -> &ReconcilerOptions {
        &self.options
    }

    /// Parse an identifier returned by the control plane.
    pub fn parse(input: &str) -> Result<ResourceId, ReconcileError> {
        Ok(ResourceId::parse(input)?)
    }

    /// Check desired state against a resource schema.
    ///
    /// Also checks that `id` names the schema's resource type.
    pub fn validate(
        schema: &ResourceSchema,
        id: &ResourceId,
        desired: &DesiredState,
    ) -> Result<(), ReconcileError> {
        id.expect_type(&schema.resource_type)?;
        validate_result(schema, desired).map_err(|diagnostics| ReconcileError::Validation {
            resource_id: id.clone(),
            operation: schema.create_mode().operation(),
            diagnostics,
        })
    }

    /// Check an update of an existing resource against a schema.
    ///
    /// Like [`validate`](Self::validate), but compared with `prior` as well.
    /// Returns the warnings, such as a `force_new` attribute that would be
    /// replaced, when nothing blocks the update.
    pub fn validate_update(
        schema: &ResourceSchema,
        id: &ResourceId,
        prior: &ObservedState,
        desired: &DesiredState,
    ) -> Result<Vec<Diagnostic>, ReconcileError> {
        id.expect_type(&schema.resource_type)?;
        split_diagnostics(validate_update(schema, prior, desired)).map_err(|diagnostics| {
            ReconcileError::Validation {
                resource_id: id.clone(),
                operation: Operation::CreateOrUpdate,
                diagnostics,
            }
        })
    }

    /// Read the current remote state.
    ///
    /// Returns `None` only when the control plane confirms the resource does
    /// not exist. Every other failure is a [`ReconcileError::Lookup`].
    #[instrument(skip(self), fields(resource_id = %id))]
    pub async fn read(&self, id: &ResourceId) -> Result<Option<ObservedState>, ReconcileError> {
        self.lookup(id, Operation::Read).await
    }

    /// Whether the resource exists.
    pub async fn exists(&self, id: &ResourceId) -> Result<bool, ReconcileError> {
        Ok(self.read(id).await?.is_some())
    }

    /// Submit desired state.
    ///
    /// With [`WriteMode::CreateOnly`] the resource is read first, and an
    /// existing resource fails the call with [`ReconcileError::AlreadyExists`]
    /// without submitting anything. A conflict reported by the control plane
    /// maps to the same error in either mode.
    #[instrument(skip(self, desired), fields(resource_id = %id))]
    pub async fn create_or_update(
        &self,
        id: &ResourceId,
        desired: &DesiredState,
        mode: WriteMode,
    ) -> Result<OperationHandle, ReconcileError> {
        let operation = mode.operation();

        if mode == WriteMode::CreateOnly && self.lookup(id, operation).await?.is_some() {
            warn!("Resource already exists, refusing to create");
            return Err(ReconcileError::AlreadyExists {
                resource_id: id.clone(),
                operation,
                detail: "an existing resource was found before submitting".to_string(),
            });
        }

        match self.client.create_or_update(id, desired).await {
            Ok(pending) => {
                info!(%operation, attributes = desired.len(), "Submitted");
                Ok(OperationHandle::submitted(id.clone(), operation, pending))
            },
            Err(err) if err.kind() == ControlPlaneErrorKind::Conflict => {
                warn!(error = %err, "Control plane reported a conflict");
                Err(ReconcileError::AlreadyExists {
                    resource_id: id.clone(),
                    operation,
                    detail: err.message().to_string(),
                })
            },
            Err(source) => {
                error!(%operation, error = %source, "Submission failed");
                Err(ReconcileError::Unexpected {
                    resource_id: id.clone(),
                    operation,
                    source,
                })
            },
        }
    }

    /// Submit a delete.
    ///
    /// Deleting a resource that does not exist succeeds: the returned handle
    /// is already terminal with [`OperationOutcome::NotFound`].
    #[instrument(skip(self), fields(resource_id = %id))]
    pub async fn delete(&self, id: &ResourceId) -> Result<OperationHandle, ReconcileError> {
        match self.client.delete(id).await {
            Ok(pending) => {
                info!("Delete submitted");
                Ok(OperationHandle::submitted(
                    id.clone(),
                    Operation::Delete,
                    pending,
                ))
            },
            Err(err) if err.is_not_found() => {
                debug!("Resource already absent, nothing to delete");
                Ok(OperationHandle::completed(
                    id.clone(),
                    Operation::Delete,
                    OperationOutcome::NotFound,
                ))
            },
            Err(source) => {
                error!(error = %source, "Delete submission failed");
                Err(ReconcileError::Unexpected {
                    resource_id: id.clone(),
                    operation: Operation::Delete,
                    source,
                })
            },
        }
    }

    /// Poll a handle until it is terminal or `timeout` elapses.
    ///
    /// Returns `Succeeded` or `NotFound`. A terminal failure becomes
    /// [`ReconcileError::ConvergenceFailure`]. On [`ReconcileError::Timeout`]
    /// the poll loop is dropped, but the remote operation may still complete
    /// later; nothing is rolled back. Throttling and unavailability while
    /// polling are retried within the budget.
    #[instrument(
        skip(self, handle),
        fields(resource_id = %handle.resource_id(), operation = %handle.operation())
    )]
    pub async fn wait(
        &self,
        handle: &mut OperationHandle,
        timeout: Duration,
    ) -> Result<OperationOutcome, ReconcileError> {
        let resource_id = handle.resource_id().clone();
        let operation = handle.operation();

        match tokio::time::timeout(timeout, self.poll_until_terminal(handle)).await {
            Ok(Ok(OperationOutcome::Failed(detail))) => {
                error!(%detail, "Operation failed");
                Err(ReconcileError::ConvergenceFailure {
                    resource_id,
                    operation,
                    detail,
                })
            },
            Ok(Ok(outcome)) => {
                info!(?outcome, "Operation completed");
                Ok(outcome)
            },
            Ok(Err(err)) => Err(err),
            Err(_) => {
                warn!(?timeout, "Gave up waiting; remote operation state is unknown");
                Err(ReconcileError::Timeout {
                    resource_id,
                    operation,
                    timeout,
                })
            },
        }
    }

    /// [`wait`](Self::wait) with the configured default budget.
    pub async fn wait_for_completion(
        &self,
        handle: &mut OperationHandle,
    ) -> Result<OperationOutcome, ReconcileError> {
        self.wait(handle, self.options.poll.timeout).await
    }

    /// Diff observed state against desired state, skipping `ignored` paths.
    pub fn compare<S: AsRef<str>>(
        &self,
        observed: &ObservedState,
        desired: &DesiredState,
        ignored: &[S],
    ) -> Vec<Mismatch> {
        compare(observed, desired, ignored)
    }

    /// Read the resource and diff it against desired state.
    ///
    /// An absent resource reports every desired attribute as missing.
    pub async fn verify<S: AsRef<str>>(
        &self,
        id: &ResourceId,
        desired: &DesiredState,
        ignored: &[S],
    ) -> Result<Vec<Mismatch>, ReconcileError> {
        let observed = self.read(id).await?.unwrap_or_default();
        Ok(compare(&observed, desired, ignored))
    }

    /// Submit, wait with the default budget, and read back.
    pub async fn apply(
        &self,
        id: &ResourceId,
        desired: &DesiredState,
        mode: WriteMode,
    ) -> Result<ObservedState, ReconcileError> {
        let mut handle = self.create_or_update(id, desired, mode).await?;
        self.wait_for_completion(&mut handle).await?;
        self.read(id)
            .await?
            .ok_or_else(|| ReconcileError::ConvergenceFailure {
                resource_id: id.clone(),
                operation: mode.operation(),
                detail: "the operation succeeded but the resource could not be read back"
                    .to_string(),
            })
    }

    /// Delete, wait with the default budget, and confirm absence.
    pub async fn destroy(&self, id: &ResourceId) -> Result<(), ReconcileError> {
        let mut handle = self.delete(id).await?;
        self.wait_for_completion(&mut handle).await?;
        self.verify_absent(id).await
    }

    /// Re-read until the resource is gone or the consistency window elapses.
    #[instrument(skip(self), fields(resource_id = %id))]
    pub async fn verify_absent(&self, id: &ResourceId) -> Result<(), ReconcileError> {
        let window = self.options.consistency_window;
        let poll = &self.options.poll;

        let check = async {
            let mut interval = poll.initial_interval;
            loop {
                if !self.exists(id).await? {
                    return Ok::<(), ReconcileError>(());
                }
                debug!(?interval, "Resource still visible after delete");
                tokio::time::sleep(interval).await;
                interval = poll.next_interval(interval);
            }
        };

        match tokio::time::timeout(window, check).await {
            Ok(result) => result,
            Err(_) => Err(ReconcileError::ConvergenceFailure {
                resource_id: id.clone(),
                operation: Operation::Delete,
                detail: format!("resource still present {:?} after delete", window),
            }),
        }
    }

    async fn lookup(
        &self,
        id: &ResourceId,
        operation: Operation,
    ) -> Result<Option<ObservedState>, ReconcileError> {
        match self.client.get(id).await {
            Ok(state) => Ok(Some(state)),
            Err(err) if err.is_not_found() => {
                debug!(%operation, "Resource not found");
                Ok(None)
            },
            Err(source) => {
                warn!(%operation, error = %source, "Lookup failed");
                Err(ReconcileError::Lookup {
                    resource_id: id.clone(),
                    operation,
                    source,
                })
            },
        }
    }

    async fn poll_until_terminal(
        &self,
        handle: &mut OperationHandle,
    ) -> Result<OperationOutcome, ReconcileError> {
        let poll = &self.options.poll;
        let mut interval = poll.initial_interval;

        loop {
            match handle.poll().await {
                Ok(outcome) if outcome.is_terminal() => return Ok(outcome),
                Ok(_) => debug!(?interval, "Operation in progress"),
                Err(err) if err.is_transient() => {
                    warn!(error = %err, "Transient error while polling, retrying");
                },
                Err(source) => {
                    return Err(ReconcileError::Unexpected {
                        resource_id: handle.resource_id().clone(),
                        operation: handle.operation(),
                        source,
                    });
                },
            }
            tokio::time::sleep(interval).await;
            interval = poll.next_interval(interval);
        }
    }
}
