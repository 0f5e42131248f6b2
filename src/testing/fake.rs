//! An in-memory [`ControlPlane`] for exercising the reconciler without a
//! network.
//!
//! Writes and deletes are asynchronous the way real control planes are: a
//! submission returns a pending operation, and the change only lands once
//! that operation has been polled to completion. Faults can be injected to
//! drive the error paths. Reads can be made to lag behind deletes, the way
//! eventually consistent control planes do.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::client::{ControlPlane, OperationStatus, PendingOperation};
use crate::error::{ControlPlaneError, ControlPlaneErrorKind};
use crate::id::ResourceId;
use crate::state::{DesiredState, ObservedState};

#[derive(Default)]
struct Inner {
    resources: BTreeMap<ResourceId, Map<String, Value>>,
    polls_to_complete: usize,
    computed: BTreeMap<String, Map<String, Value>>,
    region_singletons: BTreeSet<String>,
    read_fault: Option<ControlPlaneError>,
    write_faults: VecDeque<ControlPlaneError>,
    poll_faults: VecDeque<ControlPlaneError>,
    operation_failures: VecDeque<String>,
    stalled: bool,
    stale_reads: usize,
    lingering: BTreeMap<ResourceId, (Map<String, Value>, usize)>,
    writes: usize,
    deletes: usize,
}

enum Action {
    Write {
        id: ResourceId,
        attributes: Map<String, Value>,
    },
    Delete {
        id: ResourceId,
    },
    Fail(String),
}

impl Inner {
    fn complete(&mut self, action: &Action) -> OperationStatus {
        match action {
            Action::Write { id, attributes } => {
                let mut stored = self
                    .computed
                    .get(&id.resource_type())
                    .cloned()
                    .unwrap_or_default();
                stored.extend(attributes.clone());
                stored.insert("id".to_string(), Value::String(id.to_string()));
                self.lingering.remove(id);
                self.resources.insert(id.clone(), stored);
                OperationStatus::Succeeded
            },
            Action::Delete { id } => {
                if let Some(attributes) = self.resources.remove(id) {
                    if self.stale_reads > 0 {
                        self.lingering.insert(id.clone(), (attributes, self.stale_reads));
                    }
                }
                OperationStatus::Succeeded
            },
            Action::Fail(detail) => OperationStatus::Failed(detail.clone()),
        }
    }

    /// The last state of a deleted resource while reads still lag.
    fn stale_read(&mut self, id: &ResourceId) -> Option<Map<String, Value>> {
        let (attributes, remaining) = self.lingering.get_mut(id)?;
        *remaining -= 1;
        let attributes = attributes.clone();
        if *remaining == 0 {
            self.lingering.remove(id);
        }
        Some(attributes)
    }

    fn singleton_conflict(&self, id: &ResourceId, desired: &DesiredState) -> Option<&ResourceId> {
        let resource_type = id.resource_type();
        if !self.region_singletons.contains(&resource_type) {
            return None;
        }
        let location = desired.get("location")?;
        self.resources.iter().find_map(|(other, attributes)| {
            let same_scope = other != id
                && other.subscription_id() == id.subscription_id()
                && other.resource_type() == resource_type
                && attributes.get("location") == Some(location);
            same_scope.then_some(other)
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An in-memory control plane.
///
/// Clones share the same store, so a test can keep one clone for
/// out-of-band changes while the reconciler owns another.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use hemmer_reconciler::testing::InMemoryControlPlane;
/// use hemmer_reconciler::Reconciler;
///
/// let fake = InMemoryControlPlane::new()
///     .with_polls_to_complete(2)
///     .with_region_singleton("Microsoft.Network/ddosProtectionPlans");
/// let reconciler = Reconciler::new(Arc::new(fake.clone()));
/// assert_eq!(fake.len(), 0);
/// # let _ = reconciler;
/// ```
#[derive(Clone, Default)]
pub struct InMemoryControlPlane {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryControlPlane {
    /// Create an empty control plane whose operations finish on the first poll.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `InProgress` this many times before an operation finishes.
    pub fn with_polls_to_complete(self, polls: usize) -> Self {
        self.state().polls_to_complete = polls;
        self
    }

    /// Attach a server-assigned attribute to every written resource of a type.
    ///
    /// A value supplied in desired state takes precedence.
    pub fn with_computed_attribute(
        self,
        resource_type: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.state()
            .computed
            .entry(resource_type.into())
            .or_default()
            .insert(name.into(), value.into());
        self
    }

    /// Allow at most one resource of this type per location and subscription.
    pub fn with_region_singleton(self, resource_type: impl Into<String>) -> Self {
        self.state().region_singletons.insert(resource_type.into());
        self
    }

    /// Keep serving a deleted resource for this many reads after its delete
    /// completes.
    pub fn with_stale_reads_after_delete(self, reads: usize) -> Self {
        self.state().stale_reads = reads;
        self
    }

    /// Fail every read with `error` until cleared with `None`.
    pub fn fail_reads_with(&self, error: Option<ControlPlaneError>) {
        self.state().read_fault = error;
    }

    /// Reject the next write or delete submission with `error`.
    pub fn fail_next_write_with(&self, error: ControlPlaneError) {
        self.state().write_faults.push_back(error);
    }

    /// Return `error` from the next status poll of any operation.
    pub fn fail_next_poll_with(&self, error: ControlPlaneError) {
        self.state().poll_faults.push_back(error);
    }

    /// Make the next submitted operation finish as failed with `detail`.
    pub fn fail_next_operation(&self, detail: impl Into<String>) {
        self.state().operation_failures.push_back(detail.into());
    }

    /// While stalled, every operation reports `InProgress`.
    pub fn stall_operations(&self, stalled: bool) {
        self.state().stalled = stalled;
    }

    /// Store a resource directly, bypassing the operation machinery.
    ///
    /// `attributes` must be a JSON object; anything else stores an empty one.
    pub fn insert(&self, id: &ResourceId, attributes: Value) {
        let mut attributes = match attributes {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        attributes
            .entry("id")
            .or_insert_with(|| Value::String(id.to_string()));
        let mut state = self.state();
        state.lingering.remove(id);
        state.resources.insert(id.clone(), attributes);
    }

    /// Remove a resource out of band. Returns whether it existed.
    pub fn remove(&self, id: &ResourceId) -> bool {
        self.state().resources.remove(id).is_some()
    }

    /// The stored state of a resource, without fault injection.
    pub fn snapshot(&self, id: &ResourceId) -> Option<ObservedState> {
        self.state()
            .resources
            .get(id)
            .cloned()
            .map(ObservedState::from_map)
    }

    /// Number of stored resources.
    pub fn len(&self) -> usize {
        self.state().resources.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of accepted create-or-update submissions.
    pub fn write_count(&self) -> usize {
        self.state().writes
    }

    /// Number of accepted delete submissions.
    pub fn delete_count(&self) -> usize {
        self.state().deletes
    }

    fn state(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }

    fn submit(&self, action: Action) -> Box<dyn PendingOperation> {
        let mut state = self.state();
        let action = match state.operation_failures.pop_front() {
            Some(detail) => Action::Fail(detail),
            None => action,
        };
        Box::new(FakeOperation {
            store: Arc::clone(&self.inner),
            action,
            progress: Mutex::new(Progress {
                remaining: state.polls_to_complete,
                result: None,
            }),
        })
    }
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    async fn get(&self, id: &ResourceId) -> Result<ObservedState, ControlPlaneError> {
        let mut state = self.state();
        if let Some(err) = &state.read_fault {
            return Err(err.clone());
        }
        let stored = state.resources.get(id).cloned();
        stored
            .or_else(|| state.stale_read(id))
            .map(ObservedState::from_map)
            .ok_or_else(|| ControlPlaneError::from_http_status(404, format!("ResourceNotFound: {} was not found", id)))
    }

    async fn create_or_update(
        &self,
        id: &ResourceId,
        desired: &DesiredState,
    ) -> Result<Box<dyn PendingOperation>, ControlPlaneError> {
        {
            let mut state = self.state();
            if let Some(err) = state.write_faults.pop_front() {
                return Err(err);
            }
            if let Some(other) = state.singleton_conflict(id, desired) {
                return Err(ControlPlaneError::new(
                    ControlPlaneErrorKind::InvalidRequest,
                    format!(
                        "only one {} is allowed per region; {} already exists",
                        id.resource_type(),
                        other
                    ),
                ));
            }
            state.writes += 1;
        }
        debug!(resource_id = %id, "Fake write accepted");
        Ok(self.submit(Action::Write {
            id: id.clone(),
            attributes: desired.attributes().clone(),
        }))
    }

    async fn delete(&self, id: &ResourceId) -> Result<Box<dyn PendingOperation>, ControlPlaneError> {
        {
            let mut state = self.state();
            if let Some(err) = state.write_faults.pop_front() {
                return Err(err);
            }
            if !state.resources.contains_key(id) {
                return Err(ControlPlaneError::from_http_status(
                    404,
                    format!("ResourceNotFound: {} was not found", id),
                ));
            }
            state.deletes += 1;
        }
        debug!(resource_id = %id, "Fake delete accepted");
        Ok(self.submit(Action::Delete { id: id.clone() }))
    }
}

struct Progress {
    remaining: usize,
    result: Option<OperationStatus>,
}

struct FakeOperation {
    store: Arc<Mutex<Inner>>,
    action: Action,
    progress: Mutex<Progress>,
}

impl FakeOperation {
    fn poll_once(&self) -> Result<OperationStatus, ControlPlaneError> {
        let mut progress = lock(&self.progress);
        if let Some(result) = &progress.result {
            return Ok(result.clone());
        }

        let mut store = lock(&self.store);
        if let Some(err) = store.poll_faults.pop_front() {
            return Err(err);
        }
        if store.stalled {
            return Ok(OperationStatus::InProgress);
        }
        if progress.remaining > 0 {
            progress.remaining -= 1;
            return Ok(OperationStatus::InProgress);
        }

        let status = store.complete(&self.action);
        progress.result = Some(status.clone());
        Ok(status)
    }
}

#[async_trait]
impl PendingOperation for FakeOperation {
    async fn poll_status(&self) -> Result<OperationStatus, ControlPlaneError> {
        self.poll_once()
    }
}
