//! Acceptance-test harness for managed resources.
//!
//! [`LifecycleTester`] runs the standard lifecycle scenarios against any
//! [`ControlPlane`]: basic create and destroy, tag updates, refusing to adopt
//! an existing resource, out-of-band disappearance, and import. The
//! [`InMemoryControlPlane`] lets the same scenarios run without a network.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hemmer_reconciler::resources::ddos_protection_plan;
//! use hemmer_reconciler::testing::{LifecycleTester, SerialGroup, TestData};
//! use hemmer_reconciler::Reconciler;
//!
//! #[tokio::test]
//! async fn test_ddos_protection_plan_basic() {
//!     let data = TestData::new(ddos_protection_plan::NAME);
//!     // One plan per region: hold the location for the whole test.
//!     let _serial = SerialGroup::global().lock(&data.location).await;
//!
//!     let tester = LifecycleTester::new(
//!         Reconciler::new(Arc::new(my_client())),
//!         ddos_protection_plan::schema(),
//!     );
//!     let id = data.resource_id("Microsoft.Network", "ddosProtectionPlans", "acctestddospplan");
//!     let desired = ddos_protection_plan::desired(id.name(), &data.location, data.resource_group());
//!
//!     let state = tester.create(&id, &desired).await.unwrap();
//!     tester.import_step(&id, &state).await.unwrap();
//!     tester.destroy(&id).await.unwrap();
//!     tester.check_destroyed(&id).await.unwrap();
//! }
//! ```

mod assertions;
mod data;
mod fake;

pub use assertions::{
    assert_attribute, assert_attribute_absent, assert_attribute_exists, assert_converged,
    assert_map_len,
};
pub use data::{SerialGroup, SerialGuard, TestData, LOCATION_ENV, SUBSCRIPTION_ENV};
pub use fake::InMemoryControlPlane;

use tracing::{debug, info, warn};

use crate::client::ControlPlane;
use crate::diff::Mismatch;
use crate::error::ReconcileError;
use crate::id::ResourceId;
use crate::operation::Operation;
use crate::reconciler::{Reconciler, WriteMode};
use crate::schema::ResourceSchema;
use crate::state::{DesiredState, ObservedState};

/// Runs lifecycle scenarios for one resource type.
pub struct LifecycleTester<C: ControlPlane> {
    reconciler: Reconciler<C>,
    schema: ResourceSchema,
    ignored: Vec<String>,
}

impl<C: ControlPlane> LifecycleTester<C> {
    /// Create a tester. Fields the schema marks computed or sensitive are
    /// skipped in every comparison.
    pub fn new(reconciler: Reconciler<C>, schema: ResourceSchema) -> Self {
        let ignored = schema.ignored_fields();
        Self {
            reconciler,
            schema,
            ignored,
        }
    }

    /// Skip an additional field (or dotted path) in comparisons.
    pub fn with_ignored(mut self, field: impl Into<String>) -> Self {
        self.ignored.push(field.into());
        self
    }

    /// The reconciler in use.
    pub fn reconciler(&self) -> &Reconciler<C> {
        &self.reconciler
    }

    /// The schema under test.
    pub fn schema(&self) -> &ResourceSchema {
        &self.schema
    }

    /// Fields skipped in comparisons.
    pub fn ignored(&self) -> &[String] {
        &self.ignored
    }

    // =========================================================================
    // Steps
    // =========================================================================

    /// Validate, create with the schema's create mode, and check convergence.
    pub async fn create(
        &self,
        id: &ResourceId,
        desired: &DesiredState,
    ) -> Result<ObservedState, TestError> {
        self.apply(id, desired, self.schema.create_mode()).await
    }

    /// Validate, upsert, and check convergence.
    ///
    /// Changes to `force_new` attributes of an existing resource are logged
    /// as warnings.
    pub async fn update(
        &self,
        id: &ResourceId,
        desired: &DesiredState,
    ) -> Result<ObservedState, TestError> {
        if let Some(prior) = self.reconciler.read(id).await? {
            let warnings = Reconciler::<C>::validate_update(&self.schema, id, &prior, desired)?;
            for warning in warnings {
                warn!(
                    resource_id = %id,
                    attribute = warning.attribute.as_deref().unwrap_or_default(),
                    detail = warning.detail.as_deref().unwrap_or_default(),
                    "{}",
                    warning.summary
                );
            }
        }
        self.apply(id, desired, WriteMode::Upsert).await
    }

    /// Read the resource, failing if it does not exist.
    pub async fn check_exists(&self, id: &ResourceId) -> Result<ObservedState, TestError> {
        self.reconciler
            .read(id)
            .await?
            .ok_or_else(|| TestError::NotFound {
                resource_id: id.clone(),
                operation: Operation::Read,
            })
    }

    /// Fail unless the control plane confirms the resource is gone.
    ///
    /// Lookup errors are returned as-is and never count as absence.
    pub async fn check_destroyed(&self, id: &ResourceId) -> Result<(), TestError> {
        if self.reconciler.exists(id).await? {
            return Err(TestError::StillExists {
                resource_id: id.clone(),
            });
        }
        Ok(())
    }

    /// Delete and wait until reads agree the resource is gone.
    pub async fn destroy(&self, id: &ResourceId) -> Result<(), TestError> {
        self.reconciler.destroy(id).await?;
        Ok(())
    }

    /// Re-read by id and check the result matches a previous step's state.
    pub async fn import_step(
        &self,
        id: &ResourceId,
        state: &ObservedState,
    ) -> Result<(), TestError> {
        let imported = self.check_exists(id).await?;
        let mismatches = self
            .reconciler
            .compare(&imported, &state.to_desired(), &self.ignored);
        if !mismatches.is_empty() {
            return Err(TestError::Drift {
                resource_id: id.clone(),
                operation: Operation::Read,
                mismatches,
            });
        }
        Ok(())
    }

    // =========================================================================
    // Scenarios
    // =========================================================================

    /// Create, then check a second create-only submission is refused.
    ///
    /// Returns the state of the first create; the caller destroys it.
    pub async fn requires_import(
        &self,
        id: &ResourceId,
        desired: &DesiredState,
    ) -> Result<ObservedState, TestError> {
        let observed = self.create(id, desired).await?;
        match self
            .reconciler
            .create_or_update(id, desired, WriteMode::CreateOnly)
            .await
        {
            Err(err) if err.is_already_exists() => {
                debug!(resource_id = %id, "Second create refused as expected");
                Ok(observed)
            },
            Err(err) => Err(err.into()),
            Ok(_) => Err(TestError::ExpectedFailure {
                resource_id: id.clone(),
                operation: Operation::Create,
                expected: "AlreadyExists",
            }),
        }
    }

    /// Create, delete behind the configuration's back, and check absence.
    pub async fn disappears(&self, id: &ResourceId, desired: &DesiredState) -> Result<(), TestError> {
        self.create(id, desired).await?;
        let mut handle = self.reconciler.delete(id).await?;
        self.reconciler.wait_for_completion(&mut handle).await?;
        self.check_destroyed(id).await
    }

    /// Create, import, update, import, destroy, and check destroyed.
    ///
    /// Returns the state after the update.
    pub async fn lifecycle_crud(
        &self,
        id: &ResourceId,
        initial: &DesiredState,
        updated: &DesiredState,
    ) -> Result<ObservedState, TestError> {
        let created = self.create(id, initial).await?;
        self.import_step(id, &created).await?;

        let updated_state = self.update(id, updated).await?;
        self.import_step(id, &updated_state).await?;

        self.destroy(id).await?;
        self.check_destroyed(id).await?;

        info!(resource_id = %id, "Lifecycle completed");
        Ok(updated_state)
    }

    async fn apply(
        &self,
        id: &ResourceId,
        desired: &DesiredState,
        mode: WriteMode,
    ) -> Result<ObservedState, TestError> {
        Reconciler::<C>::validate(&self.schema, id, desired)?;
        let observed = self.reconciler.apply(id, desired, mode).await?;

        let mismatches = self.reconciler.compare(&observed, desired, &self.ignored);
        if !mismatches.is_empty() {
            return Err(TestError::Drift {
                resource_id: id.clone(),
                operation: match mode {
                    WriteMode::Upsert => Operation::CreateOrUpdate,
                    WriteMode::CreateOnly => Operation::Create,
                },
                mismatches,
            });
        }
        Ok(observed)
    }
}

/// Error type for lifecycle test steps.
#[derive(Debug)]
pub enum TestError {
    /// The reconciler returned an error.
    Reconcile(ReconcileError),
    /// The resource was expected to exist.
    NotFound {
        /// The missing resource.
        resource_id: ResourceId,
        /// The step that looked for it.
        operation: Operation,
    },
    /// The resource was expected to be gone.
    StillExists {
        /// The resource that is still present.
        resource_id: ResourceId,
    },
    /// Observed state does not match what the step expected.
    Drift {
        /// The drifted resource.
        resource_id: ResourceId,
        /// The step that detected it.
        operation: Operation,
        /// Every disagreement found.
        mismatches: Vec<Mismatch>,
    },
    /// A step that should have failed succeeded.
    ExpectedFailure {
        /// The resource the step targeted.
        resource_id: ResourceId,
        /// The operation that unexpectedly succeeded.
        operation: Operation,
        /// The error that was expected.
        expected: &'static str,
    },
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Reconcile(e) => write!(f, "Bad: {}", e),
            TestError::NotFound {
                resource_id,
                operation,
            } => write!(f, "Bad: {} {}: resource does not exist", operation, resource_id),
            TestError::StillExists { resource_id } => {
                write!(f, "Bad: Delete {}: resource still exists", resource_id)
            },
            TestError::Drift {
                resource_id,
                operation,
                mismatches,
            } => {
                writeln!(
                    f,
                    "Bad: {} {}: {} attribute(s) differ:",
                    operation,
                    resource_id,
                    mismatches.len()
                )?;
                for m in mismatches {
                    writeln!(f, "  {}", m)?;
                }
                Ok(())
            },
            TestError::ExpectedFailure {
                resource_id,
                operation,
                expected,
            } => write!(
                f,
                "Bad: {} {}: expected {} but the operation succeeded",
                operation, resource_id, expected
            ),
        }
    }
}

impl std::error::Error for TestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TestError::Reconcile(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ReconcileError> for TestError {
    fn from(e: ReconcileError) -> Self {
        TestError::Reconcile(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PollPolicy, ReconcilerOptions};
    use crate::error::ControlPlaneError;
    use crate::resources::app_service_hybrid_connection::{
        self, HybridConnectionConfig, HybridConnectionId,
    };
    use crate::resources::ddos_protection_plan;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    const PLAN_TYPE: &str = ddos_protection_plan::RESOURCE_TYPE;

    fn fake() -> InMemoryControlPlane {
        InMemoryControlPlane::new()
            .with_polls_to_complete(2)
            .with_region_singleton(PLAN_TYPE)
            .with_computed_attribute(PLAN_TYPE, "virtual_network_ids", json!([]))
    }

    fn options() -> ReconcilerOptions {
        ReconcilerOptions::new()
            .with_poll_policy(PollPolicy::fixed(Duration::from_secs(5)).with_timeout(Duration::from_secs(1800)))
            .with_consistency_window(Duration::from_secs(120))
    }

    fn plan_tester(client: &InMemoryControlPlane) -> LifecycleTester<InMemoryControlPlane> {
        LifecycleTester::new(
            Reconciler::with_options(Arc::new(client.clone()), options()),
            ddos_protection_plan::schema(),
        )
    }

    fn plan(data: &TestData) -> (ResourceId, DesiredState) {
        let id = data.resource_id("Microsoft.Network", "ddosProtectionPlans", "acctestddospplan");
        let desired = ddos_protection_plan::desired(id.name(), &data.location, data.resource_group());
        (id, desired)
    }

    fn data(n: u64) -> TestData {
        TestData::new(ddos_protection_plan::NAME)
            .with_random_integer(n)
            .with_location("westeurope")
            .with_subscription("0000")
    }

    #[tokio::test(start_paused = true)]
    async fn test_ddos_protection_plan_basic() {
        let client = fake();
        let tester = plan_tester(&client);
        let (id, desired) = plan(&data(1));

        let state = tester.create(&id, &desired).await.unwrap();
        assert_attribute(&state, "name", "acctestddospplan-1");
        assert_attribute_exists(&state, "virtual_network_ids");
        assert_map_len(&state, "virtual_network_ids", 0);
        tester.check_exists(&id).await.unwrap();
        tester.import_step(&id, &state).await.unwrap();

        tester.destroy(&id).await.unwrap();
        tester.check_destroyed(&id).await.unwrap();
        assert!(client.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ddos_protection_plan_requires_import() {
        let client = fake();
        let tester = plan_tester(&client);
        let (id, desired) = plan(&data(2));

        let state = tester.requires_import(&id, &desired).await.unwrap();
        assert_eq!(client.write_count(), 1);
        assert_eq!(client.snapshot(&id).unwrap(), state);

        tester.destroy(&id).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ddos_protection_plan_with_tags() {
        let client = fake();
        let tester = plan_tester(&client);
        let (id, desired) = plan(&data(4));

        let tagged = desired
            .clone()
            .with_tags([("environment", "Production"), ("cost_center", "MSFT")]);
        let state = tester.create(&id, &tagged).await.unwrap();
        assert_map_len(&state, "tags", 2);
        assert_attribute(&state, "tags.environment", "Production");
        assert_attribute(&state, "tags.cost_center", "MSFT");

        let retagged = desired.with_tags([("environment", "Staging")]);
        let state = tester.update(&id, &retagged).await.unwrap();
        assert_map_len(&state, "tags", 1);
        assert_attribute(&state, "tags.environment", "Staging");
        assert_attribute_absent(&state, "tags.cost_center");
        assert_attribute(&state, "location", "westeurope");

        tester.destroy(&id).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_forcing_replacement_is_not_blocked() {
        let client = fake();
        let tester = plan_tester(&client);
        let (id, desired) = plan(&data(6));
        tester.create(&id, &desired).await.unwrap();

        let moved = desired.with_attribute("location", "northeurope");
        let state = tester.update(&id, &moved).await.unwrap();
        assert_attribute(&state, "location", "northeurope");

        let err = tester
            .update(&id, &moved.clone().with_attribute("sku", "Premium"))
            .await
            .unwrap_err();
        assert!(matches!(err, TestError::Reconcile(ReconcileError::Validation { .. })));
        assert_eq!(client.write_count(), 2);

        tester.destroy(&id).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ddos_protection_plan_disappears() {
        let client = fake();
        let tester = plan_tester(&client);
        let (id, desired) = plan(&data(5));

        tester.disappears(&id, &desired).await.unwrap();
        assert!(client.snapshot(&id).is_none());
        // Destroying what already vanished is not an error.
        tester.destroy(&id).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_destroyed_does_not_swallow_errors() {
        let client = fake();
        let tester = plan_tester(&client);
        let (id, _) = plan(&data(6));

        client.fail_reads_with(Some(ControlPlaneError::permission_denied(
            "AuthorizationFailed",
        )));
        let err = tester.check_destroyed(&id).await.unwrap_err();
        assert!(matches!(
            err,
            TestError::Reconcile(ReconcileError::Lookup { .. })
        ));
        assert!(err.to_string().contains("AuthorizationFailed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_import_step_detects_drift() {
        let client = fake();
        let tester = plan_tester(&client);
        let (id, desired) = plan(&data(7));

        let state = tester
            .create(&id, &desired.with_tags([("environment", "Production")]))
            .await
            .unwrap();
        client.insert(
            &id,
            json!({
                "name": "acctestddospplan-7",
                "location": "westeurope",
                "resource_group_name": "acctestRG-7",
                "tags": {"environment": "Production", "managed_by": "policy"}
            }),
        );

        let err = tester.import_step(&id, &state).await.unwrap_err();
        match &err {
            TestError::Drift { mismatches, .. } => {
                assert_eq!(mismatches.len(), 1);
                assert_eq!(mismatches[0].path, "tags.managed_by");
            },
            other => panic!("unexpected error: {}", other),
        }
        assert!(err.to_string().contains("tags.managed_by"));

        let tester = tester.with_ignored("tags.managed_by");
        tester.import_step(&id, &state).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_desired_state_is_not_submitted() {
        let client = fake();
        let tester = plan_tester(&client);
        let (id, desired) = plan(&data(8));

        let err = tester
            .create(&id, &desired.without_attribute("location"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TestError::Reconcile(ReconcileError::Validation { .. })
        ));
        assert_eq!(client.write_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_region_singletons_run_serially() {
        let client = fake();
        let serial = SerialGroup::new();

        let tasks: Vec<_> = (10..14)
            .map(|n| {
                let client = client.clone();
                let serial = serial.clone();
                tokio::spawn(async move {
                    let data = data(n);
                    let _guard = serial.lock(data.location.clone()).await;
                    let tester = plan_tester(&client);
                    let (id, desired) = plan(&data);
                    let retagged = desired.clone().with_tags([("environment", "Staging")]);
                    tester.lifecycle_crud(&id, &desired, &retagged).await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert!(client.is_empty());
        assert_eq!(client.write_count(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_app_service_hybrid_connection_basic() {
        let client = InMemoryControlPlane::new()
            .with_polls_to_complete(1)
            .with_computed_attribute(
                app_service_hybrid_connection::RESOURCE_TYPE,
                "service_bus_suffix",
                ".servicebus.windows.net",
            );
        let tester = LifecycleTester::new(
            Reconciler::with_options(Arc::new(client.clone()), options()),
            app_service_hybrid_connection::schema(),
        );

        let data = data(20);
        let config = HybridConnectionConfig {
            id: HybridConnectionId::new(
                &data.subscription_id,
                data.resource_group(),
                data.name("acctestAS"),
                data.name("acctestrn"),
                data.name("acctestrnhc"),
            ),
            relay_arm_uri: format!(
                "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Relay/namespaces/{}/hybridConnections/{}",
                data.subscription_id,
                data.resource_group(),
                data.name("acctestrn"),
                data.name("acctestrnhc")
            ),
            hostname: "testhostname.hemmertest".to_string(),
            port: 80,
            service_bus_namespace: data.name("acctestservicebusnamespace"),
            send_key_name: "RootManageSharedAccessKey".to_string(),
            send_key_value: "c2VjcmV0".to_string(),
        };
        let id = config.id.to_resource_id();

        let mut updated = config.clone();
        updated.port = 8080;

        let state = tester
            .lifecycle_crud(&id, &config.to_desired(), &updated.to_desired())
            .await
            .unwrap();
        assert_attribute(&state, "port", 8080);
        assert_attribute(&state, "service_bus_suffix", ".servicebus.windows.net");
        assert!(client.is_empty());
    }

    #[test]
    fn test_error_display() {
        let id = ResourceId::new("0000", "rg", "Microsoft.Network", "ddosProtectionPlans", "p");

        let err = TestError::NotFound {
            resource_id: id.clone(),
            operation: Operation::Read,
        };
        assert_eq!(
            err.to_string(),
            format!("Bad: Read {}: resource does not exist", id)
        );

        let err = TestError::Reconcile(ReconcileError::ConvergenceFailure {
            resource_id: id.clone(),
            operation: Operation::Delete,
            detail: "InternalServerError".to_string(),
        });
        let text = err.to_string();
        assert!(text.contains("Delete"));
        assert!(text.contains(&id.to_string()));
        assert!(text.contains("InternalServerError"));

        let err = TestError::ExpectedFailure {
            resource_id: id,
            operation: Operation::Create,
            expected: "AlreadyExists",
        };
        assert!(err.to_string().contains("expected AlreadyExists"));
    }
}
