//! In-memory cluster control plane for development and unit tests.
//!
//! The in-memory cluster models the parts of a real control plane the portal depends on,
//! including versioned bindings and an authoriser that evaluates access reviews against
//! the stored bindings.
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use anyhow::Result;
use serde_json::Value as Json;

use kportal_context::Context;
use kportal_errors::AlreadyExists;
use kportal_errors::Conflict;
use kportal_errors::NotFound;
use kportal_errors::Unavailable;

use super::AccessReview;
use super::Binding;
use super::ControlPlane;
use super::ControlPlaneBackend;
use super::ControlPlaneFactory;
use super::ControlPlaneFactoryArgs;
use super::LimitRange;
use super::Namespace;
use super::Privilege;
use super::Scope;

/// Resources that grant control over access within a namespace.
const ACCESS_CONTROL_RESOURCES: [&str; 2] = ["rolebindings", "roles"];

/// Verbs that do not change the state of the cluster.
const READ_VERBS: [&str; 3] = ["get", "list", "watch"];

/// Cluster-wide resources members of the cluster can read.
const MEMBER_RESOURCES: [&str; 2] = ["namespaces", "nodes"];

/// Cluster control plane storing objects in process memory.
#[derive(Clone)]
pub struct MemoryControlPlane {
    state: Arc<Mutex<MemoryState>>,
}

struct MemoryState {
    access_review: bool,
    bindings: BTreeMap<(Scope, String), Binding>,
    conflicts: u32,
    failures: HashMap<&'static str, u32>,
    last_version: u64,
    limits: BTreeMap<(String, String), LimitRange>,
    namespaces: BTreeMap<String, Namespace>,
}

impl MemoryState {
    fn check_available(&mut self, op: &'static str) -> Result<()> {
        if let Some(count) = self.failures.get_mut(op) {
            if *count > 0 {
                *count -= 1;
                anyhow::bail!(Unavailable::new("cluster control plane", op));
            }
        }
        Ok(())
    }

    fn next_version(&mut self) -> Option<String> {
        self.last_version += 1;
        Some(self.last_version.to_string())
    }
}

impl Default for MemoryControlPlane {
    fn default() -> Self {
        let state = MemoryState {
            access_review: true,
            bindings: Default::default(),
            conflicts: 0,
            failures: Default::default(),
            last_version: 0,
            limits: Default::default(),
            namespaces: Default::default(),
        };
        MemoryControlPlane {
            state: Arc::new(Mutex::new(state)),
        }
    }
}

impl MemoryControlPlane {
    /// Access the internal state of the control plane.
    fn access(&self) -> MutexGuard<MemoryState> {
        self.state
            .lock()
            .expect("MemoryControlPlane state lock poisoned")
    }

    /// Fetch a binding directly from storage.
    pub fn binding(&self, scope: &Scope, name: &str) -> Option<Binding> {
        let key = (scope.clone(), name.to_string());
        self.access().bindings.get(&key).cloned()
    }

    /// Make the next `count` binding updates fail as if another writer changed them first.
    pub fn conflict_next_updates(&self, count: u32) {
        self.access().conflicts = count;
    }

    /// Make the next `count` invocations of an operation fail as if the cluster was unreachable.
    ///
    /// Operations are named after [`ControlPlaneBackend`] methods, such as `create_limits`.
    pub fn fail_next(&self, op: &'static str, count: u32) {
        self.access().failures.insert(op, count);
    }

    /// Store a binding directly, bypassing all checks.
    pub fn insert_binding(&self, mut binding: Binding) -> Binding {
        let mut state = self.access();
        binding.version = state.next_version();
        let key = (binding.scope.clone(), binding.name.clone());
        state.bindings.insert(key, binding.clone());
        binding
    }

    /// Store a namespace directly, bypassing all checks.
    pub fn insert_namespace(&self, name: &str) {
        let namespace = Namespace {
            name: name.to_string(),
            terminating: false,
        };
        self.access()
            .namespaces
            .insert(name.to_string(), namespace);
    }

    /// Fetch the default limits of a namespace directly from storage.
    pub fn limits(&self, namespace: &str) -> Vec<LimitRange> {
        self.access()
            .limits
            .values()
            .filter(|limits| limits.namespace == namespace)
            .cloned()
            .collect()
    }

    /// Disable access reviews to emulate control planes that can't simulate checks.
    pub fn without_access_review(self) -> Self {
        self.access().access_review = false;
        self
    }
}

#[async_trait::async_trait]
impl ControlPlaneBackend for MemoryControlPlane {
    async fn access_review(&self, _: &Context, review: &AccessReview) -> Result<bool> {
        let mut state = self.access();
        state.check_available("access_review")?;
        if !state.access_review {
            anyhow::bail!("the in-memory control plane has access reviews disabled");
        }
        let allowed = state
            .bindings
            .values()
            .filter(|binding| binding.has_subject(&review.identity))
            .any(|binding| binding_allows(binding, review));
        Ok(allowed)
    }

    async fn create_binding(&self, _: &Context, mut binding: Binding) -> Result<Binding> {
        let mut state = self.access();
        state.check_available("create_binding")?;
        let key = (binding.scope.clone(), binding.name.clone());
        if state.bindings.contains_key(&key) {
            anyhow::bail!(AlreadyExists::new("binding", binding.name));
        }
        if let Scope::Namespace(namespace) = &binding.scope {
            if !state.namespaces.contains_key(namespace) {
                anyhow::bail!(NotFound::new("namespace", namespace.clone()));
            }
        }
        binding.version = state.next_version();
        state.bindings.insert(key, binding.clone());
        Ok(binding)
    }

    async fn create_limits(&self, _: &Context, limits: LimitRange) -> Result<()> {
        let mut state = self.access();
        state.check_available("create_limits")?;
        if !state.namespaces.contains_key(&limits.namespace) {
            anyhow::bail!(NotFound::new("namespace", limits.namespace));
        }
        let key = (limits.namespace.clone(), limits.name.clone());
        if state.limits.contains_key(&key) {
            anyhow::bail!(AlreadyExists::new("limit range", limits.name));
        }
        state.limits.insert(key, limits);
        Ok(())
    }

    async fn create_namespace(&self, _: &Context, name: &str) -> Result<Namespace> {
        let mut state = self.access();
        state.check_available("create_namespace")?;
        if state.namespaces.contains_key(name) {
            anyhow::bail!(AlreadyExists::new("namespace", name));
        }
        let namespace = Namespace {
            name: name.to_string(),
            terminating: false,
        };
        state
            .namespaces
            .insert(name.to_string(), namespace.clone());
        Ok(namespace)
    }

    async fn delete_binding(&self, _: &Context, binding: &Binding) -> Result<()> {
        let mut state = self.access();
        state.check_available("delete_binding")?;
        let key = (binding.scope.clone(), binding.name.clone());
        let stored = match state.bindings.get(&key) {
            None => anyhow::bail!(NotFound::new("binding", binding.name.clone())),
            Some(stored) => stored,
        };
        if binding.version.is_some() && binding.version != stored.version {
            anyhow::bail!(Conflict::new("binding", binding.name.clone()));
        }
        state.bindings.remove(&key);
        Ok(())
    }

    async fn delete_namespace(&self, _: &Context, name: &str) -> Result<()> {
        let mut state = self.access();
        state.check_available("delete_namespace")?;
        if state.namespaces.remove(name).is_none() {
            anyhow::bail!(NotFound::new("namespace", name));
        }
        let scope = Scope::namespace(name);
        state.bindings.retain(|(binding_scope, _), _| *binding_scope != scope);
        state.limits.retain(|(namespace, _), _| namespace != name);
        Ok(())
    }

    async fn get_binding(
        &self,
        _: &Context,
        scope: &Scope,
        name: &str,
    ) -> Result<Option<Binding>> {
        let mut state = self.access();
        state.check_available("get_binding")?;
        let key = (scope.clone(), name.to_string());
        Ok(state.bindings.get(&key).cloned())
    }

    async fn get_namespace(&self, _: &Context, name: &str) -> Result<Option<Namespace>> {
        let mut state = self.access();
        state.check_available("get_namespace")?;
        Ok(state.namespaces.get(name).cloned())
    }

    async fn list_bindings(&self, _: &Context, scope: &Scope) -> Result<Vec<Binding>> {
        let mut state = self.access();
        state.check_available("list_bindings")?;
        let bindings = state
            .bindings
            .values()
            .filter(|binding| binding.scope == *scope)
            .cloned()
            .collect();
        Ok(bindings)
    }

    async fn list_namespaces(&self, _: &Context) -> Result<Vec<Namespace>> {
        let mut state = self.access();
        state.check_available("list_namespaces")?;
        Ok(state.namespaces.values().cloned().collect())
    }

    fn supports_access_review(&self) -> bool {
        self.access().access_review
    }

    async fn update_binding(&self, _: &Context, mut binding: Binding) -> Result<Binding> {
        let mut state = self.access();
        state.check_available("update_binding")?;
        let key = (binding.scope.clone(), binding.name.clone());
        if !state.bindings.contains_key(&key) {
            anyhow::bail!(NotFound::new("binding", binding.name));
        }

        // Emulate another writer updating the binding first.
        if state.conflicts > 0 {
            state.conflicts -= 1;
            let version = state.next_version();
            if let Some(stored) = state.bindings.get_mut(&key) {
                stored.version = version;
            }
            anyhow::bail!(Conflict::new("binding", binding.name));
        }

        let stored_version = state.bindings.get(&key).and_then(|stored| stored.version.clone());
        if binding.version.is_some() && binding.version != stored_version {
            anyhow::bail!(Conflict::new("binding", binding.name));
        }
        binding.version = state.next_version();
        state.bindings.insert(key, binding.clone());
        Ok(binding)
    }
}

/// Evaluate a review against the rules of the privilege granted by a binding.
fn binding_allows(binding: &Binding, review: &AccessReview) -> bool {
    let privilege = match binding.privilege() {
        None => return false,
        Some(privilege) => privilege,
    };
    let in_scope = match (&binding.scope, &review.namespace) {
        (Scope::Cluster, _) => true,
        (Scope::Namespace(bound), Some(reviewed)) => bound == reviewed,
        (Scope::Namespace(_), None) => false,
    };
    if !in_scope {
        return false;
    }

    let verb = review.verb.as_str();
    let resource = review.resource.as_str();
    match privilege {
        Privilege::ClusterAdmin => true,
        Privilege::ClusterMember => READ_VERBS.contains(&verb) && MEMBER_RESOURCES.contains(&resource),
        Privilege::ClusterNamespaceAdmin => resource == "namespaces",
        Privilege::NamespaceAdmin => review.namespace.is_some(),
        Privilege::NamespaceEdit => {
            review.namespace.is_some() && !ACCESS_CONTROL_RESOURCES.contains(&resource)
        }
    }
}

/// Initialise in-memory control planes.
pub struct MemoryControlPlaneFactory;

#[async_trait::async_trait]
impl ControlPlaneFactory for MemoryControlPlaneFactory {
    fn conf_check(&self, _: &Context, _: &Json) -> Result<()> {
        Ok(())
    }

    fn register_metrics(&self, _: &prometheus::Registry) -> Result<()> {
        Ok(())
    }

    async fn control_plane<'a>(&self, args: ControlPlaneFactoryArgs<'a>) -> Result<ControlPlane> {
        slog::warn!(
            args.context.logger,
            "Using the in-memory control plane: cluster state will be lost on exit"
        );
        let backend = MemoryControlPlane::default();
        for name in ["default", "kube-system", "kube-public"] {
            backend.insert_namespace(name);
        }
        Ok(ControlPlane::from(backend))
    }
}

#[cfg(test)]
mod tests {
    use kportal_context::Context;
    use kportal_errors::ErrorKind;

    use crate::AccessReview;
    use crate::Binding;
    use crate::ControlPlane;
    use crate::Privilege;
    use crate::Scope;

    fn review(identity: &str, verb: &str, resource: &str, namespace: Option<&str>) -> AccessReview {
        AccessReview {
            group: String::new(),
            identity: identity.to_string(),
            namespace: namespace.map(String::from),
            resource: resource.to_string(),
            verb: verb.to_string(),
        }
    }

    #[tokio::test]
    async fn binding_versions_guard_updates() {
        let context = Context::fixture();
        let (control_plane, _) = ControlPlane::fixture();
        let binding = Binding::for_privilege(
            Privilege::ClusterMember,
            Scope::Cluster,
            vec!["iss#alice".into()],
        );
        let created = control_plane.create_binding(&context, binding).await.unwrap();

        let mut first = created.clone();
        first.subjects.push("iss#bob".into());
        control_plane.update_binding(&context, first).await.unwrap();

        let mut stale = created;
        stale.subjects.push("iss#carol".into());
        let error = control_plane.update_binding(&context, stale).await.unwrap_err();
        assert!(ErrorKind::Conflict.matches(&error));
    }

    #[tokio::test]
    async fn bindings_need_namespace() {
        let context = Context::fixture();
        let (control_plane, _) = ControlPlane::fixture();
        let binding = Binding::for_privilege(
            Privilege::NamespaceEdit,
            Scope::namespace("missing"),
            vec!["iss#alice".into()],
        );
        let error = control_plane.create_binding(&context, binding).await.unwrap_err();
        assert!(ErrorKind::NotFound.matches(&error));
    }

    #[tokio::test]
    async fn delete_namespace_cascades() {
        let context = Context::fixture();
        let (control_plane, backend) = ControlPlane::fixture();
        backend.insert_namespace("team-x");
        backend.insert_binding(Binding::for_privilege(
            Privilege::NamespaceAdmin,
            Scope::namespace("team-x"),
            vec!["iss#bob".into()],
        ));
        control_plane.delete_namespace(&context, "team-x").await.unwrap();

        let bindings = control_plane
            .list_bindings(&context, &Scope::namespace("team-x"))
            .await
            .unwrap();
        assert!(bindings.is_empty());
        let error = control_plane
            .delete_namespace(&context, "team-x")
            .await
            .unwrap_err();
        assert!(ErrorKind::NotFound.matches(&error));
    }

    #[tokio::test]
    async fn review_namespace_admin() {
        let context = Context::fixture();
        let (control_plane, backend) = ControlPlane::fixture();
        backend.insert_namespace("team-x");
        backend.insert_binding(Binding::for_privilege(
            Privilege::NamespaceAdmin,
            Scope::namespace("team-x"),
            vec!["iss#bob".into()],
        ));
        backend.insert_binding(Binding::for_privilege(
            Privilege::NamespaceEdit,
            Scope::namespace("team-x"),
            vec!["iss#carol".into()],
        ));

        let bob = review("iss#bob", "create", "rolebindings", Some("team-x"));
        assert!(control_plane.access_review(&context, &bob).await.unwrap());
        let carol = review("iss#carol", "create", "rolebindings", Some("team-x"));
        assert!(!control_plane.access_review(&context, &carol).await.unwrap());
        let carol = review("iss#carol", "create", "pods", Some("team-x"));
        assert!(control_plane.access_review(&context, &carol).await.unwrap());
        let elsewhere = review("iss#bob", "create", "rolebindings", Some("team-y"));
        assert!(!control_plane.access_review(&context, &elsewhere).await.unwrap());
    }

    #[tokio::test]
    async fn review_cluster_privileges() {
        let context = Context::fixture();
        let (control_plane, backend) = ControlPlane::fixture();
        backend.insert_binding(Binding::for_privilege(
            Privilege::ClusterMember,
            Scope::Cluster,
            vec!["iss#alice".into(), "iss#bob".into()],
        ));
        backend.insert_binding(Binding::for_privilege(
            Privilege::ClusterNamespaceAdmin,
            Scope::Cluster,
            vec!["iss#alice".into()],
        ));

        let list = review("iss#bob", "list", "nodes", None);
        assert!(control_plane.access_review(&context, &list).await.unwrap());
        let delete = review("iss#bob", "delete", "namespaces", None);
        assert!(!control_plane.access_review(&context, &delete).await.unwrap());
        let delete = review("iss#alice", "delete", "namespaces", None);
        assert!(control_plane.access_review(&context, &delete).await.unwrap());
    }

    #[tokio::test]
    async fn review_disabled() {
        let (_, backend) = ControlPlane::fixture();
        let control_plane = ControlPlane::from(backend.without_access_review());
        assert!(!control_plane.supports_access_review());
    }
}
