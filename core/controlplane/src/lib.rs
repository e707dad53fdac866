//! Interface to the cluster control plane for the objects kportal manages.
//!
//! The portal only needs a narrow slice of the control plane:
//!
//! - Bindings granting privilege bundles to identities, at cluster or namespace scope.
//! - Namespaces and their default resource limits.
//! - Simulated authorisation checks on behalf of an identity (access reviews).
//!
//! Bindings are versioned objects: writes carrying a stale version fail with
//! [`Conflict`](kportal_errors::Conflict) so callers can re-read and re-apply their change.
//! All operations are bounded by a deadline and fail with
//! [`Unavailable`](kportal_errors::Unavailable) when it expires.
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde_json::Value as Json;

use kportal_context::Context;
use kportal_errors::Unavailable;

pub mod memory;
mod models;
mod telemetry;

pub use self::models::AccessReview;
pub use self::models::Binding;
pub use self::models::LimitRange;
pub use self::models::Namespace;
pub use self::models::OtherSubject;
pub use self::models::Privilege;
pub use self::models::Scope;
pub use self::models::BINDING_PREFIX;
pub use self::telemetry::register_metrics;

/// Default deadline for control plane operations.
const DEFAULT_DEADLINE: Duration = Duration::from_secs(10);

/// Name of the service reported by deadline errors.
const SERVICE: &str = "cluster control plane";

/// Access the cluster control plane.
#[derive(Clone)]
pub struct ControlPlane {
    deadline: Duration,
    inner: Arc<dyn ControlPlaneBackend>,
}

impl ControlPlane {
    /// Check if the identity is allowed to perform the reviewed action.
    pub async fn access_review(&self, context: &Context, review: &AccessReview) -> Result<bool> {
        let call = self.inner.access_review(context, review);
        self.call("access_review", "review access", call).await
    }

    /// Create a binding, failing with `AlreadyExists` if the name is in use within its scope.
    pub async fn create_binding(&self, context: &Context, binding: Binding) -> Result<Binding> {
        let call = self.inner.create_binding(context, binding);
        self.call("create_binding", "create binding", call).await
    }

    /// Attach default resource limits to a namespace.
    pub async fn create_limits(&self, context: &Context, limits: LimitRange) -> Result<()> {
        let call = self.inner.create_limits(context, limits);
        self.call("create_limits", "create limits", call).await
    }

    /// Create a namespace, failing with `AlreadyExists` if the name is in use.
    pub async fn create_namespace(&self, context: &Context, name: &str) -> Result<Namespace> {
        let call = self.inner.create_namespace(context, name);
        self.call("create_namespace", "create namespace", call).await
    }

    /// Delete a binding if the stored version matches the given binding.
    pub async fn delete_binding(&self, context: &Context, binding: &Binding) -> Result<()> {
        let call = self.inner.delete_binding(context, binding);
        self.call("delete_binding", "delete binding", call).await
    }

    /// Request deletion of a namespace and everything in it.
    ///
    /// Deletion completes asynchronously on the control plane.
    pub async fn delete_namespace(&self, context: &Context, name: &str) -> Result<()> {
        let call = self.inner.delete_namespace(context, name);
        self.call("delete_namespace", "delete namespace", call).await
    }

    /// Fetch a binding by name, if it exists.
    pub async fn get_binding(
        &self,
        context: &Context,
        scope: &Scope,
        name: &str,
    ) -> Result<Option<Binding>> {
        let call = self.inner.get_binding(context, scope, name);
        self.call("get_binding", "get binding", call).await
    }

    /// Fetch a namespace by name, if it exists.
    pub async fn get_namespace(&self, context: &Context, name: &str) -> Result<Option<Namespace>> {
        let call = self.inner.get_namespace(context, name);
        self.call("get_namespace", "get namespace", call).await
    }

    /// List all bindings in a scope.
    pub async fn list_bindings(&self, context: &Context, scope: &Scope) -> Result<Vec<Binding>> {
        let call = self.inner.list_bindings(context, scope);
        self.call("list_bindings", "list bindings", call).await
    }

    /// List all namespaces in the cluster.
    pub async fn list_namespaces(&self, context: &Context) -> Result<Vec<Namespace>> {
        let call = self.inner.list_namespaces(context);
        self.call("list_namespaces", "list namespaces", call).await
    }

    /// The control plane can simulate authorisation checks with [`ControlPlane::access_review`].
    pub fn supports_access_review(&self) -> bool {
        self.inner.supports_access_review()
    }

    /// Replace the binding, failing with `Conflict` if its version is stale.
    pub async fn update_binding(&self, context: &Context, binding: Binding) -> Result<Binding> {
        let call = self.inner.update_binding(context, binding);
        self.call("update_binding", "update binding", call).await
    }

    /// Set the deadline for individual control plane operations.
    pub fn with_deadline(mut self, deadline: Duration) -> ControlPlane {
        self.deadline = deadline;
        self
    }

    async fn call<Fut, T>(&self, op: &str, operation: &'static str, call: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let unavailable = Unavailable::new(SERVICE, operation);
        let result = kportal_errors::with_deadline(self.deadline, unavailable, call).await;
        telemetry::observe(op, &result);
        result
    }
}

impl<T> From<T> for ControlPlane
where
    T: ControlPlaneBackend + 'static,
{
    fn from(value: T) -> Self {
        ControlPlane {
            deadline: DEFAULT_DEADLINE,
            inner: Arc::new(value),
        }
    }
}

#[cfg(any(test, feature = "test-fixture"))]
impl ControlPlane {
    /// Initialise a control plane backed by an empty in-memory cluster for unit tests.
    pub fn fixture() -> (ControlPlane, memory::MemoryControlPlane) {
        let backend = memory::MemoryControlPlane::default();
        let control_plane = ControlPlane::from(backend.clone());
        (control_plane, backend)
    }
}

/// Operations implemented by control planes supported by kportal.
///
/// Backends must report failures with the `kportal_errors` taxonomy:
///
/// - `AlreadyExists` when creating objects with names in use.
/// - `Conflict` when updating or deleting bindings with a stale version.
/// - `NotFound` when updating or deleting objects that do not exist.
/// - `Unavailable` when the control plane can't be reached.
#[async_trait::async_trait]
pub trait ControlPlaneBackend: Send + Sync {
    /// Check if the identity is allowed to perform the reviewed action.
    async fn access_review(&self, context: &Context, review: &AccessReview) -> Result<bool>;

    /// Create a new binding.
    async fn create_binding(&self, context: &Context, binding: Binding) -> Result<Binding>;

    /// Attach default resource limits to a namespace.
    async fn create_limits(&self, context: &Context, limits: LimitRange) -> Result<()>;

    /// Create a new namespace.
    async fn create_namespace(&self, context: &Context, name: &str) -> Result<Namespace>;

    /// Delete a binding, with the binding version as precondition if set.
    async fn delete_binding(&self, context: &Context, binding: &Binding) -> Result<()>;

    /// Request deletion of a namespace.
    async fn delete_namespace(&self, context: &Context, name: &str) -> Result<()>;

    /// Fetch a binding by name, if it exists.
    async fn get_binding(
        &self,
        context: &Context,
        scope: &Scope,
        name: &str,
    ) -> Result<Option<Binding>>;

    /// Fetch a namespace by name, if it exists.
    async fn get_namespace(&self, context: &Context, name: &str) -> Result<Option<Namespace>>;

    /// List all bindings in a scope.
    async fn list_bindings(&self, context: &Context, scope: &Scope) -> Result<Vec<Binding>>;

    /// List all namespaces in the cluster.
    async fn list_namespaces(&self, context: &Context) -> Result<Vec<Namespace>>;

    /// The backend implements [`ControlPlaneBackend::access_review`].
    fn supports_access_review(&self) -> bool;

    /// Replace a binding, with the binding version as precondition.
    async fn update_binding(&self, context: &Context, binding: Binding) -> Result<Binding>;
}

/// Initialisation logic for control plane clients.
#[async_trait::async_trait]
pub trait ControlPlaneFactory: Send + Sync {
    /// Validate the user provided configuration for the backend.
    fn conf_check(&self, context: &Context, conf: &Json) -> Result<()>;

    /// Register backend specific metrics.
    fn register_metrics(&self, registry: &prometheus::Registry) -> Result<()>;

    /// Instantiate a [`ControlPlane`] client.
    async fn control_plane<'a>(&self, args: ControlPlaneFactoryArgs<'a>) -> Result<ControlPlane>;
}

/// Arguments passed to the [`ControlPlaneFactory`] initialisation method.
pub struct ControlPlaneFactoryArgs<'a> {
    /// The configuration block for the backend to initialise.
    pub conf: &'a Json,

    /// Container for operation scoped values.
    pub context: &'a Context,
}
