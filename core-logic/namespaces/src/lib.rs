//! Self-service namespace lifecycle.
//!
//! Namespaces are created with default resource limits and an administrative binding
//! for the identity that requested them. Creation is not transactional: if the limits or
//! the binding can't be created after the namespace is, the error is logged and
//! [`Lifecycle::ensure_namespace`] or a new grant can be used to complete the setup.
//!
//! Deletion is only requested: the control plane removes the namespace asynchronously.
use anyhow::Result;

use kportal_access::Evaluator;
use kportal_bindings::Synchronizer;
use kportal_conf::NamespacesConf;
use kportal_context::Context;
use kportal_controlplane::ControlPlane;
use kportal_controlplane::LimitRange;
use kportal_controlplane::Namespace;
use kportal_controlplane::Scope;
use kportal_errors::AlreadyExists;
use kportal_errors::ErrorKind;
use kportal_errors::PermissionDenied;
use kportal_errors::Protected;
use kportal_registry::Role;

mod names;

#[cfg(test)]
mod tests;

pub use self::names::derive_namespace;
pub use self::names::validate_name;

/// Create and delete namespaces on behalf of identities.
#[derive(Clone)]
pub struct Lifecycle {
    conf: NamespacesConf,
    control_plane: ControlPlane,
    evaluator: Evaluator,
    sync: Synchronizer,
}

impl Lifecycle {
    pub fn new(
        control_plane: ControlPlane,
        evaluator: Evaluator,
        sync: Synchronizer,
        conf: &NamespacesConf,
    ) -> Lifecycle {
        Lifecycle {
            conf: conf.clone(),
            control_plane,
            evaluator,
            sync,
        }
    }

    /// Create a namespace administered by the requesting identity.
    pub async fn create_namespace(
        &self,
        context: &Context,
        name: &str,
        identity: &str,
    ) -> Result<Namespace> {
        if self.conf.is_protected(name) {
            anyhow::bail!(Protected::new(name));
        }
        validate_name(name)?;
        let namespaces = self.control_plane.list_namespaces(context).await?;
        if namespaces.iter().any(|namespace| namespace.name == name) {
            anyhow::bail!(AlreadyExists::new("namespace", name));
        }

        let namespace = self.control_plane.create_namespace(context, name).await?;
        slog::info!(
            context.logger, "Namespace created";
            "namespace" => name,
            "identity" => identity,
        );

        if let Err(error) = self.create_limits(context, name).await {
            slog::warn!(
                context.logger, "Unable to attach default limits to new namespace";
                "namespace" => name,
                replisdk::utils::error::slog::ErrorAttributes::from(&error),
            );
        }
        let scope = Scope::namespace(name);
        if let Err(error) = self.sync.grant(context, identity, &scope, Role::Admin).await {
            slog::warn!(
                context.logger, "Unable to grant namespace administration to its creator";
                "namespace" => name,
                "identity" => identity,
                replisdk::utils::error::slog::ErrorAttributes::from(&error),
            );
        }
        Ok(namespace)
    }

    /// Request deletion of a namespace administered by the requesting identity.
    pub async fn delete_namespace(
        &self,
        context: &Context,
        name: &str,
        identity: &str,
    ) -> Result<()> {
        if self.conf.is_protected(name) {
            anyhow::bail!(Protected::new(name));
        }
        if !self.evaluator.is_namespace_admin(context, identity, name).await {
            anyhow::bail!(PermissionDenied::new(identity, "delete namespace", name));
        }
        self.control_plane.delete_namespace(context, name).await?;
        slog::info!(
            context.logger, "Namespace deletion requested";
            "namespace" => name,
            "identity" => identity,
        );
        Ok(())
    }

    /// Ensure a namespace and its default limits exist, without granting any privileges.
    pub async fn ensure_namespace(&self, context: &Context, name: &str) -> Result<()> {
        if self.conf.is_protected(name) {
            anyhow::bail!(Protected::new(name));
        }
        validate_name(name)?;
        if self.control_plane.get_namespace(context, name).await?.is_none() {
            match self.control_plane.create_namespace(context, name).await {
                Err(error) if !ErrorKind::AlreadyExists.matches(&error) => return Err(error),
                _ => (),
            }
        }
        self.create_limits(context, name).await
    }

    /// Check if the namespace is reserved and can't be managed through the portal.
    pub fn is_protected(&self, name: &str) -> bool {
        self.conf.is_protected(name)
    }

    /// Attach default limits to the namespace, unless already attached.
    async fn create_limits(&self, context: &Context, name: &str) -> Result<()> {
        let limits = LimitRange::memory(
            name,
            &self.conf.limits.memory_limit,
            &self.conf.limits.memory_request,
        );
        match self.control_plane.create_limits(context, limits).await {
            Err(error) if ErrorKind::AlreadyExists.matches(&error) => Ok(()),
            result => result,
        }
    }
}
