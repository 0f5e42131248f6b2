//! Error types for the reconciler.
//!
//! Two layers of errors exist:
//!
//! - [`ControlPlaneError`] is what a [`ControlPlane`](crate::client::ControlPlane)
//!   client returns. It carries the raw text the remote API produced together
//!   with a coarse [`ControlPlaneErrorKind`] classification.
//! - [`ReconcileError`] is what the [`Reconciler`](crate::Reconciler) returns.
//!   Every variant names the resource, the operation attempted and keeps the
//!   control-plane text verbatim.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::id::{ParseError, ResourceId};
use crate::operation::Operation;
use crate::schema::Diagnostic;

/// Coarse classification of a control-plane failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlPlaneErrorKind {
    /// The control plane confirmed the resource does not exist.
    NotFound,
    /// A resource with the same name already exists.
    Conflict,
    /// Authentication or authorization failed.
    PermissionDenied,
    /// The request was throttled.
    Throttled,
    /// The service is temporarily unavailable (including network faults).
    Unavailable,
    /// The control plane rejected the request body.
    InvalidRequest,
    /// Anything else.
    Other,
}

impl ControlPlaneErrorKind {
    /// Classify an HTTP status code.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            404 | 410 => Self::NotFound,
            409 => Self::Conflict,
            401 | 403 => Self::PermissionDenied,
            429 => Self::Throttled,
            400 | 422 => Self::InvalidRequest,
            502..=504 => Self::Unavailable,
            _ => Self::Other,
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Throttled | Self::Unavailable)
    }
}

impl fmt::Display for ControlPlaneErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotFound => "not found",
            Self::Conflict => "conflict",
            Self::PermissionDenied => "permission denied",
            Self::Throttled => "throttled",
            Self::Unavailable => "unavailable",
            Self::InvalidRequest => "invalid request",
            Self::Other => "error",
        };
        f.write_str(name)
    }
}

impl From<tonic::Code> for ControlPlaneErrorKind {
    fn from(code: tonic::Code) -> Self {
        match code {
            tonic::Code::NotFound => Self::NotFound,
            tonic::Code::AlreadyExists => Self::Conflict,
            tonic::Code::PermissionDenied | tonic::Code::Unauthenticated => {
                Self::PermissionDenied
            },
            tonic::Code::ResourceExhausted => Self::Throttled,
            tonic::Code::Unavailable | tonic::Code::DeadlineExceeded => Self::Unavailable,
            tonic::Code::InvalidArgument | tonic::Code::FailedPrecondition => {
                Self::InvalidRequest
            },
            _ => Self::Other,
        }
    }
}

/// An error returned by a control-plane client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ControlPlaneError {
    kind: ControlPlaneErrorKind,
    message: String,
    status: Option<u16>,
}

impl ControlPlaneError {
    /// Create a new error of the given kind.
    pub fn new(kind: ControlPlaneErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
        }
    }

    /// Create an error from an HTTP response status and body.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ControlPlaneErrorKind::from_http_status(status),
            message: message.into(),
            status: Some(status),
        }
    }

    /// Shorthand for a [`ControlPlaneErrorKind::NotFound`] error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ControlPlaneErrorKind::NotFound, message)
    }

    /// Shorthand for a [`ControlPlaneErrorKind::Conflict`] error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ControlPlaneErrorKind::Conflict, message)
    }

    /// Shorthand for a [`ControlPlaneErrorKind::PermissionDenied`] error.
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ControlPlaneErrorKind::PermissionDenied, message)
    }

    /// Shorthand for a [`ControlPlaneErrorKind::Throttled`] error.
    pub fn throttled(message: impl Into<String>) -> Self {
        Self::new(ControlPlaneErrorKind::Throttled, message)
    }

    /// Shorthand for a [`ControlPlaneErrorKind::Unavailable`] error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ControlPlaneErrorKind::Unavailable, message)
    }

    /// The classification of this error.
    pub fn kind(&self) -> ControlPlaneErrorKind {
        self.kind
    }

    /// The raw text returned by the control plane.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The HTTP status code, when the error came from an HTTP response.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Whether the control plane confirmed the resource is absent.
    pub fn is_not_found(&self) -> bool {
        self.kind == ControlPlaneErrorKind::NotFound
    }

    /// Whether retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

impl From<tonic::Status> for ControlPlaneError {
    fn from(status: tonic::Status) -> Self {
        Self::new(status.code().into(), status.message())
    }
}

impl From<ControlPlaneError> for tonic::Status {
    fn from(err: ControlPlaneError) -> Self {
        match err.kind {
            ControlPlaneErrorKind::NotFound => tonic::Status::not_found(err.message),
            ControlPlaneErrorKind::Conflict => tonic::Status::already_exists(err.message),
            ControlPlaneErrorKind::PermissionDenied => {
                tonic::Status::permission_denied(err.message)
            },
            ControlPlaneErrorKind::Throttled => tonic::Status::resource_exhausted(err.message),
            ControlPlaneErrorKind::Unavailable => tonic::Status::unavailable(err.message),
            ControlPlaneErrorKind::InvalidRequest => tonic::Status::invalid_argument(err.message),
            ControlPlaneErrorKind::Other => tonic::Status::unknown(err.message),
        }
    }
}

/// Errors returned by the [`Reconciler`](crate::Reconciler).
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A resource identifier did not match the expected grammar.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A create-only submission found the name already taken.
    #[error(
        "{operation} {resource_id}: a resource with this ID already exists - to be managed \
         via Hemmer this resource needs to be imported into the state ({detail})"
    )]
    AlreadyExists {
        /// The resource that already exists.
        resource_id: ResourceId,
        /// The operation that was attempted.
        operation: Operation,
        /// Control-plane text, or a description of how the conflict was detected.
        detail: String,
    },

    /// A read failed for a reason other than confirmed absence.
    #[error("{operation} {resource_id}: lookup failed: {source}")]
    Lookup {
        /// The resource being read.
        resource_id: ResourceId,
        /// The operation that was attempted.
        operation: Operation,
        /// The underlying control-plane error.
        #[source]
        source: ControlPlaneError,
    },

    /// The caller's wait budget elapsed before the operation finished.
    ///
    /// The remote operation may still complete later.
    #[error("{operation} {resource_id}: timed out after {timeout:?}")]
    Timeout {
        /// The resource being waited on.
        resource_id: ResourceId,
        /// The operation that was attempted.
        operation: Operation,
        /// The budget that elapsed.
        timeout: Duration,
    },

    /// The control plane reported a terminal failure.
    #[error("{operation} {resource_id}: operation failed: {detail}")]
    ConvergenceFailure {
        /// The resource the operation targeted.
        resource_id: ResourceId,
        /// The operation that was attempted.
        operation: Operation,
        /// The provider's error detail, verbatim.
        detail: String,
    },

    /// The desired state does not satisfy the resource schema.
    #[error("{operation} {resource_id}: invalid desired state: {}", summarize(.diagnostics))]
    Validation {
        /// The resource the desired state was meant for.
        resource_id: ResourceId,
        /// The operation that was attempted.
        operation: Operation,
        /// Every validation failure found.
        diagnostics: Vec<Diagnostic>,
    },

    /// Any other control-plane failure.
    #[error("{operation} {resource_id}: {source}")]
    Unexpected {
        /// The resource the operation targeted.
        resource_id: ResourceId,
        /// The operation that was attempted.
        operation: Operation,
        /// The underlying control-plane error.
        #[source]
        source: ControlPlaneError,
    },
}

impl ReconcileError {
    /// The resource this error concerns, if one was parsed.
    pub fn resource_id(&self) -> Option<&ResourceId> {
        match self {
            Self::Parse(_) => None,
            Self::AlreadyExists { resource_id, .. }
            | Self::Lookup { resource_id, .. }
            | Self::Timeout { resource_id, .. }
            | Self::ConvergenceFailure { resource_id, .. }
            | Self::Validation { resource_id, .. }
            | Self::Unexpected { resource_id, .. } => Some(resource_id),
        }
    }

    /// The operation that failed, if one was attempted.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::Parse(_) => None,
            Self::AlreadyExists { operation, .. }
            | Self::Lookup { operation, .. }
            | Self::Timeout { operation, .. }
            | Self::ConvergenceFailure { operation, .. }
            | Self::Validation { operation, .. }
            | Self::Unexpected { operation, .. } => Some(*operation),
        }
    }

    /// Whether this is an [`ReconcileError::AlreadyExists`] error.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Whether this is a [`ReconcileError::Timeout`] error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<ReconcileError> for tonic::Status {
    fn from(err: ReconcileError) -> Self {
        let message = err.to_string();
        match err {
            ReconcileError::Parse(_) | ReconcileError::Validation { .. } => {
                tonic::Status::invalid_argument(message)
            },
            ReconcileError::AlreadyExists { .. } => tonic::Status::already_exists(message),
            ReconcileError::Timeout { .. } => tonic::Status::deadline_exceeded(message),
            ReconcileError::ConvergenceFailure { .. } => tonic::Status::aborted(message),
            ReconcileError::Lookup { source, .. } | ReconcileError::Unexpected { source, .. } => {
                tonic::Status::new(tonic::Status::from(source).code(), message)
            },
        }
    }
}

fn summarize(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| match &d.attribute {
            Some(attr) => format!("{} (at {})", d.summary, attr),
            None => d.summary.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}
