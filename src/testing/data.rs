//! Per-test naming data and serialization of region-scoped tests.

use std::collections::HashMap;
use std::env;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::id::ResourceId;

/// Environment variable overriding the primary test location.
pub const LOCATION_ENV: &str = "HEMMER_TEST_LOCATION";

/// Environment variable naming the subscription tests run in.
pub const SUBSCRIPTION_ENV: &str = "HEMMER_TEST_SUBSCRIPTION";

const DEFAULT_LOCATION: &str = "westeurope";
const DEFAULT_SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";

/// Names and scopes for one test run.
///
/// Every name embeds the same random integer so parallel runs never collide
/// and everything one test created can be found by its suffix.
///
/// ```
/// use hemmer_reconciler::testing::TestData;
///
/// let data = TestData::new("network_ddos_protection_plan").with_random_integer(42);
/// assert_eq!(data.resource_group(), "acctestRG-42");
/// assert_eq!(data.name("acctestddospplan"), "acctestddospplan-42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestData {
    /// The resource type under test.
    pub resource_type: String,
    /// Suffix shared by every name in the test.
    pub random_integer: u64,
    /// Primary location.
    pub location: String,
    /// Subscription scope.
    pub subscription_id: String,
}

impl TestData {
    /// Fresh test data, reading the location and subscription from the
    /// environment.
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            random_integer: random_integer(),
            location: env_or(LOCATION_ENV, DEFAULT_LOCATION),
            subscription_id: env_or(SUBSCRIPTION_ENV, DEFAULT_SUBSCRIPTION),
        }
    }

    /// Use a fixed suffix.
    pub fn with_random_integer(mut self, value: u64) -> Self {
        self.random_integer = value;
        self
    }

    /// Use a different location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Use a different subscription.
    pub fn with_subscription(mut self, subscription_id: impl Into<String>) -> Self {
        self.subscription_id = subscription_id.into();
        self
    }

    /// `{prefix}-{random_integer}`.
    pub fn name(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.random_integer)
    }

    /// The resource group the test creates its resources in.
    pub fn resource_group(&self) -> String {
        self.name("acctestRG")
    }

    /// A top-level identifier in the test's resource group.
    pub fn resource_id(&self, namespace: &str, type_key: &str, prefix: &str) -> ResourceId {
        ResourceId::new(
            &self.subscription_id,
            self.resource_group(),
            namespace,
            type_key,
            self.name(prefix),
        )
    }
}

fn random_integer() -> u64 {
    // Fifteen digits keeps generated names comfortably inside length limits.
    (Uuid::new_v4().as_u128() % 1_000_000_000_000_000) as u64
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Keyed async locks for tests that cannot overlap.
///
/// Some resource types allow only one instance per region. Tests for them
/// take the lock for the region before creating anything and hold it until
/// destroy has been verified.
///
/// ```
/// use hemmer_reconciler::testing::SerialGroup;
///
/// # tokio_test::block_on(async {
/// let group = SerialGroup::new();
/// let guard = group.lock("westeurope").await;
/// assert_eq!(guard.key(), "westeurope");
/// # });
/// ```
#[derive(Clone, Default)]
pub struct SerialGroup {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl SerialGroup {
    /// Create an empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// A process-wide group.
    pub fn global() -> &'static SerialGroup {
        static GLOBAL: OnceLock<SerialGroup> = OnceLock::new();
        GLOBAL.get_or_init(SerialGroup::new)
    }

    /// Wait until no other holder of `key` remains, then hold it.
    ///
    /// Keys nobody holds or waits for are dropped from the group here.
    pub async fn lock(&self, key: impl Into<String>) -> SerialGuard {
        let key = key.into();
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Holders and waiters each keep a clone of the entry.
            locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        debug!(%key, "Waiting for serial lock");
        let guard = mutex.lock_owned().await;
        debug!(%key, "Acquired serial lock");
        SerialGuard { key, _guard: guard }
    }
}

/// Holds a [`SerialGroup`] key until dropped.
pub struct SerialGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl SerialGuard {
    /// The key being held.
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn test_names_share_suffix() {
        let data = TestData::new("network_ddos_protection_plan")
            .with_random_integer(7)
            .with_location("northeurope")
            .with_subscription("1111");

        let id = data.resource_id("Microsoft.Network", "ddosProtectionPlans", "acctestddospplan");
        assert_eq!(
            id.to_string(),
            "/subscriptions/1111/resourceGroups/acctestRG-7/providers/Microsoft.Network/ddosProtectionPlans/acctestddospplan-7"
        );
        assert_eq!(data.location, "northeurope");
    }

    #[test]
    fn test_random_integers_differ() {
        let a = TestData::new("x");
        let b = TestData::new("x");
        assert_ne!(a.random_integer, b.random_integer);
        assert!(a.random_integer < 1_000_000_000_000_000);
    }

    #[tokio::test]
    async fn test_same_key_serializes() {
        let group = SerialGroup::new();
        let first = group.lock("westeurope").await;

        let acquired = Arc::new(AtomicBool::new(false));
        let task = {
            let group = group.clone();
            let acquired = Arc::clone(&acquired);
            tokio::spawn(async move {
                let _guard = group.lock("westeurope").await;
                acquired.store(true, Ordering::SeqCst);
            })
        };

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!acquired.load(Ordering::SeqCst));

        drop(first);
        task.await.unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_released_keys_are_pruned() {
        let group = SerialGroup::new();
        let key_count = || group.locks.lock().unwrap().len();

        for i in 0..50 {
            let _guard = group.lock(format!("region-{}", i)).await;
        }
        assert_eq!(key_count(), 1);

        let held = group.lock("westeurope").await;
        drop(group.lock("northeurope").await);
        let _next = group.lock("eastus").await;
        assert_eq!(key_count(), 2);
        assert_eq!(held.key(), "westeurope");
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let group = SerialGroup::new();
        let _west = group.lock("westeurope").await;
        let north = tokio::time::timeout(Duration::from_secs(1), group.lock("northeurope")).await;
        assert!(north.is_ok());
    }
}
