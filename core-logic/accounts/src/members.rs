//! Self-service management of namespace members.
use anyhow::Result;
use serde::Serialize;

use kportal_bindings::roles;
use kportal_context::Context;
use kportal_controlplane::Scope;
use kportal_errors::InvalidRole;
use kportal_errors::PermissionDenied;
use kportal_registry::Role;

use super::Accounts;

/// Identity granted the use of a namespace.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Member {
    pub identity: String,

    /// Application role the identity holds within the namespace.
    pub role: Role,
}

impl Accounts {
    /// Grant an existing identity a role within a namespace administered by the caller.
    pub async fn add_member(
        &self,
        context: &Context,
        caller: &str,
        namespace: &str,
        target: &str,
        role: Role,
    ) -> Result<()> {
        check_member_role(role, "add namespace member")?;
        self.ensure_namespace_admin(context, caller, namespace).await?;
        self.registry.lookup(context, target).await?;
        self.sync
            .grant(context, target, &Scope::namespace(namespace), role)
            .await?;
        slog::info!(
            context.logger, "Namespace member added";
            "caller" => caller,
            "namespace" => namespace,
            "identity" => target,
            "role" => role.as_str(),
        );
        Ok(())
    }

    /// List identities granted the use of a namespace administered by the caller.
    pub async fn list_members(
        &self,
        context: &Context,
        caller: &str,
        namespace: &str,
    ) -> Result<Vec<Member>> {
        self.ensure_namespace_admin(context, caller, namespace).await?;
        let scope = Scope::namespace(namespace);
        let mut members = Vec::new();
        for privilege in roles::NAMESPACE_PRIVILEGES {
            let role = match roles::namespace_role(privilege) {
                Some(role) => role,
                None => continue,
            };
            let subjects = self.sync.subjects(context, &scope, privilege).await?;
            members.extend(
                subjects
                    .into_iter()
                    .map(|identity| Member { identity, role }),
            );
        }
        Ok(members)
    }

    /// Revoke a role within a namespace administered by the caller.
    ///
    /// The target does not need to be in the registry so stale grants can be removed.
    pub async fn remove_member(
        &self,
        context: &Context,
        caller: &str,
        namespace: &str,
        target: &str,
        role: Role,
    ) -> Result<()> {
        check_member_role(role, "remove namespace member")?;
        self.ensure_namespace_admin(context, caller, namespace).await?;
        self.sync
            .revoke(context, target, &Scope::namespace(namespace), role)
            .await?;
        slog::info!(
            context.logger, "Namespace member removed";
            "caller" => caller,
            "namespace" => namespace,
            "identity" => target,
            "role" => role.as_str(),
        );
        Ok(())
    }

    async fn ensure_namespace_admin(
        &self,
        context: &Context,
        caller: &str,
        namespace: &str,
    ) -> Result<()> {
        if self
            .evaluator
            .is_namespace_admin(context, caller, namespace)
            .await
        {
            return Ok(());
        }
        anyhow::bail!(PermissionDenied::new(
            caller,
            "manage members of namespace",
            namespace,
        ))
    }
}

/// Only roles granting namespace privileges can be assigned to members.
fn check_member_role(role: Role, action: &'static str) -> Result<()> {
    if roles::namespace_privileges(role).is_empty() {
        anyhow::bail!(InvalidRole::new(role.as_str(), action));
    }
    Ok(())
}
