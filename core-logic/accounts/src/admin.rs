//! Portal administration of application roles.
use anyhow::Result;

use kportal_context::Context;
use kportal_errors::PermissionDenied;
use kportal_registry::Identity;
use kportal_registry::Role;

use super::redact;
use super::Accounts;

impl Accounts {
    /// List all identities known to the portal.
    pub async fn list(&self, context: &Context, caller: &str) -> Result<Vec<Identity>> {
        self.ensure_admin(context, caller, "list identities").await?;
        let identities = self.registry.list(context).await?;
        Ok(identities.into_iter().map(redact).collect())
    }

    /// Find identities with a name or email containing the term, ignoring case.
    pub async fn search(
        &self,
        context: &Context,
        caller: &str,
        term: &str,
    ) -> Result<Vec<Identity>> {
        self.ensure_admin(context, caller, "search identities").await?;
        let term = term.to_lowercase();
        let identities = self.registry.list(context).await?;
        let found = identities
            .into_iter()
            .filter(|identity| {
                identity.display_name.to_lowercase().contains(&term)
                    || identity.email.to_lowercase().contains(&term)
            })
            .map(redact)
            .collect();
        Ok(found)
    }

    /// Change the application role of an identity.
    ///
    /// Cluster privileges follow the new role once the registry watch controller
    /// processes the change.
    pub async fn set_role(
        &self,
        context: &Context,
        caller: &str,
        target: &str,
        role: Role,
    ) -> Result<Identity> {
        self.ensure_admin(context, caller, "change the role of").await?;
        let identity = self.change_role(context, target, |_| Some(role)).await?;
        slog::info!(
            context.logger, "Application role changed";
            "caller" => caller,
            "identity" => target,
            "role" => role.as_str(),
        );
        Ok(identity)
    }

    /// Promote a guest to user. Identities with other roles are unchanged.
    pub async fn validate(
        &self,
        context: &Context,
        caller: &str,
        target: &str,
    ) -> Result<Identity> {
        self.ensure_admin(context, caller, "validate").await?;
        self.change_role(context, target, |role| match role {
            Role::Guest => Some(Role::User),
            _ => None,
        })
        .await
    }

    /// Demote a user to guest. Identities with other roles are unchanged.
    pub async fn unvalidate(
        &self,
        context: &Context,
        caller: &str,
        target: &str,
    ) -> Result<Identity> {
        self.ensure_admin(context, caller, "unvalidate").await?;
        self.change_role(context, target, |role| match role {
            Role::User => Some(Role::Guest),
            _ => None,
        })
        .await
    }

    /// Check the caller is a portal or cluster administrator.
    async fn ensure_admin(
        &self,
        context: &Context,
        caller: &str,
        action: &'static str,
    ) -> Result<()> {
        let role = self
            .registry
            .get(context, caller)
            .await?
            .map(|identity| identity.role);
        if role == Some(Role::Admin) || self.evaluator.is_cluster_admin(context, caller).await {
            return Ok(());
        }
        anyhow::bail!(PermissionDenied::new(caller, action, "identities"))
    }

    /// Write a new role computed from the current one, retrying on conflicts.
    ///
    /// When `next` returns `None` the record is left unchanged.
    async fn change_role<F>(&self, context: &Context, target: &str, next: F) -> Result<Identity>
    where
        F: Fn(Role) -> Option<Role>,
    {
        let next = &next;
        let identity = kportal_errors::retry_on_conflict(self.max_conflict_retries, || async move {
            let mut identity = self.registry.lookup(context, target).await?;
            match next(identity.role) {
                Some(role) if role != identity.role => {
                    identity.role = role;
                    self.registry.update(context, identity).await
                }
                _ => Ok(identity),
            }
        })
        .await?;
        Ok(redact(identity))
    }
}
