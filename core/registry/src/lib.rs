//! User Registry interface for kportal.
//!
//! The registry persists one [`Identity`] record per user and is the single source of truth
//! for application roles. Records are keyed by identity ID (`issuer#subject`).
//!
//! Besides the usual CRUD-like operations the registry exposes a subscription to changes
//! as typed [`RegistryEvent`]s, which the background controller reconciles onto cluster bindings.
//!
//! All operations are bounded by a deadline: requests that do not complete in time
//! fail with [`Unavailable`](kportal_errors::Unavailable).
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value as Json;

use kportal_context::Context;
use kportal_errors::NotFound;
use kportal_errors::Unavailable;

mod events;
pub mod memory;
mod models;
mod telemetry;

pub use self::events::RegistryEvent;
pub use self::events::RegistryEventStream;
pub use self::events::WatchLagged;
pub use self::models::object_name;
pub use self::models::Identity;
pub use self::models::Role;
pub use self::telemetry::register_metrics;

/// Default deadline for registry operations.
const DEFAULT_DEADLINE: Duration = Duration::from_secs(10);

/// Name of the service reported by deadline errors.
const SERVICE: &str = "user registry";

/// Access identity records in the User Registry.
#[derive(Clone)]
pub struct Registry {
    deadline: Duration,
    inner: Arc<dyn RegistryBackend>,
}

impl Registry {
    /// Register a new identity, failing with `AlreadyExists` if the ID is in use.
    pub async fn create(&self, context: &Context, identity: Identity) -> Result<Identity> {
        let unavailable = Unavailable::new(SERVICE, "create identity");
        let result = kportal_errors::with_deadline(
            self.deadline,
            unavailable,
            self.inner.create(context, identity),
        )
        .await;
        telemetry::observe("create", &result);
        result
    }

    /// Fetch an identity record, if it exists.
    pub async fn get(&self, context: &Context, id: &str) -> Result<Option<Identity>> {
        let unavailable = Unavailable::new(SERVICE, "get identity");
        let result =
            kportal_errors::with_deadline(self.deadline, unavailable, self.inner.get(context, id))
                .await;
        telemetry::observe("get", &result);
        result
    }

    /// List all identity records.
    pub async fn list(&self, context: &Context) -> Result<Vec<Identity>> {
        let unavailable = Unavailable::new(SERVICE, "list identities");
        let result =
            kportal_errors::with_deadline(self.deadline, unavailable, self.inner.list(context))
                .await;
        telemetry::observe("list", &result);
        result
    }

    /// Fetch an identity record that is expected to exist.
    pub async fn lookup(&self, context: &Context, id: &str) -> Result<Identity> {
        match self.get(context, id).await? {
            Some(identity) => Ok(identity),
            None => anyhow::bail!(NotFound::new("identity", id)),
        }
    }

    /// Persist changes to an existing identity record.
    ///
    /// If the record carries a version the update fails with `Conflict`
    /// when the stored record was changed since it was read.
    pub async fn update(&self, context: &Context, identity: Identity) -> Result<Identity> {
        let unavailable = Unavailable::new(SERVICE, "update identity");
        let result = kportal_errors::with_deadline(
            self.deadline,
            unavailable,
            self.inner.update(context, identity),
        )
        .await;
        telemetry::observe("update", &result);
        result
    }

    /// Subscribe to changes of identity records.
    ///
    /// The deadline applies to establishing the subscription only.
    pub async fn watch(&self, context: &Context) -> Result<RegistryEventStream> {
        let unavailable = Unavailable::new(SERVICE, "watch identities");
        let result =
            kportal_errors::with_deadline(self.deadline, unavailable, self.inner.watch(context))
                .await;
        telemetry::observe("watch", &result);
        result
    }

    /// Set the deadline for individual registry operations.
    pub fn with_deadline(mut self, deadline: Duration) -> Registry {
        self.deadline = deadline;
        self
    }
}

impl<T> From<T> for Registry
where
    T: RegistryBackend + 'static,
{
    fn from(value: T) -> Self {
        Registry {
            deadline: DEFAULT_DEADLINE,
            inner: Arc::new(value),
        }
    }
}

#[cfg(any(test, feature = "test-fixture"))]
impl Registry {
    /// Initialise a registry backed by an empty in-memory store for unit tests.
    pub fn fixture() -> (Registry, memory::MemoryRegistry) {
        let backend = memory::MemoryRegistry::default();
        let registry = Registry::from(backend.clone());
        (registry, backend)
    }
}

/// Operations implemented by User Registry backends supported by kportal.
#[async_trait::async_trait]
pub trait RegistryBackend: Send + Sync {
    /// Register a new identity, failing with `AlreadyExists` if the ID is in use.
    async fn create(&self, context: &Context, identity: Identity) -> Result<Identity>;

    /// Fetch an identity record, if it exists.
    async fn get(&self, context: &Context, id: &str) -> Result<Option<Identity>>;

    /// List all identity records.
    async fn list(&self, context: &Context) -> Result<Vec<Identity>>;

    /// Persist changes to an existing identity record.
    ///
    /// Backends must fail with `NotFound` if the record does not exist
    /// and with `Conflict` if the record version does not match the stored version.
    async fn update(&self, context: &Context, identity: Identity) -> Result<Identity>;

    /// Subscribe to changes of identity records.
    async fn watch(&self, context: &Context) -> Result<RegistryEventStream>;
}

/// Initialisation logic for the User Registry and the client to access it.
#[async_trait::async_trait]
pub trait RegistryFactory: Send + Sync {
    /// Validate the user provided configuration for the backend.
    fn conf_check(&self, context: &Context, conf: &Json) -> Result<()>;

    /// Register backend specific metrics.
    fn register_metrics(&self, registry: &prometheus::Registry) -> Result<()>;

    /// Instantiate a [`Registry`] object to access identity records.
    async fn registry<'a>(&self, args: RegistryFactoryArgs<'a>) -> Result<Registry>;

    /// Synchronise (initialise or migrate) the registry storage to handle [`Registry`] operations.
    async fn sync<'a>(&self, args: RegistryFactoryArgs<'a>) -> Result<()>;
}

/// Arguments passed to the [`RegistryFactory`] methods.
pub struct RegistryFactoryArgs<'a> {
    /// The configuration block for the backend to initialise.
    pub conf: &'a Json,

    /// Container for operation scoped values.
    pub context: &'a Context,
}
