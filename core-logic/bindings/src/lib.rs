//! Make bindings grant privileges to exactly the intended identities.
//!
//! The [`Synchronizer`] applies idempotent grant and revoke operations to bindings
//! identified by deterministic names, so repeated reconciliation always finds the same object.
//!
//! Bindings are changed with optimistic concurrency: every read-modify-write is retried
//! a bounded number of times if another writer changed the binding in the meantime.
//! Subjects are deduplicated before every write and bindings left with no subjects are deleted.
use std::collections::HashSet;

use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;

use kportal_conf::SyncConf;
use kportal_context::Context;
use kportal_controlplane::Binding;
use kportal_controlplane::ControlPlane;
use kportal_controlplane::Privilege;
use kportal_controlplane::Scope;
use kportal_errors::Conflict;
use kportal_errors::ErrorKind;
use kportal_registry::Role;

pub mod roles;
mod telemetry;


pub use self::telemetry::register_metrics;

/// A privilege bundle can't be granted at the requested scope.
#[derive(Debug, thiserror::Error)]
#[error("the privilege '{privilege}' can't be granted at {scope} scope")]
pub struct ScopeMismatch {
    pub privilege: Privilege,
    pub scope: Scope,
}

/// Change applied to a binding by a grant or revoke operation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Applied {
    /// The binding did not exist and was created.
    Created,

    /// The binding lost its last subject and was deleted.
    Deleted,

    /// The binding already granted the intended subjects.
    Unchanged,

    /// The subjects of the binding were updated.
    Updated,
}

impl Applied {
    fn as_str(&self) -> &'static str {
        match self {
            Applied::Created => "created",
            Applied::Deleted => "deleted",
            Applied::Unchanged => "unchanged",
            Applied::Updated => "updated",
        }
    }
}

/// Grant and revoke privileges to identities.
#[derive(Clone)]
pub struct Synchronizer {
    control_plane: ControlPlane,
    max_conflict_retries: u16,
}

impl Synchronizer {
    pub fn new(control_plane: ControlPlane, conf: &SyncConf) -> Synchronizer {
        Synchronizer {
            control_plane,
            max_conflict_retries: conf.max_conflict_retries,
        }
    }

    /// Grant the identity all privileges the role has within the scope.
    pub async fn grant(
        &self,
        context: &Context,
        identity: &str,
        scope: &Scope,
        role: Role,
    ) -> Result<()> {
        for privilege in roles::privileges(role, scope) {
            self.grant_privilege(context, identity, scope, *privilege)
                .await?;
        }
        Ok(())
    }

    /// Ensure the binding for the privilege within the scope has the identity as a subject.
    pub async fn grant_privilege(
        &self,
        context: &Context,
        identity: &str,
        scope: &Scope,
        privilege: Privilege,
    ) -> Result<Applied> {
        check_scope(privilege, scope)?;
        let result = kportal_errors::retry_on_conflict(self.max_conflict_retries, move || {
            self.try_grant(context, identity, scope, privilege)
        })
        .await;
        self.observe(context, "grant", identity, scope, privilege, result)
    }

    /// Revoke from the identity all privileges the role has within the scope.
    pub async fn revoke(
        &self,
        context: &Context,
        identity: &str,
        scope: &Scope,
        role: Role,
    ) -> Result<()> {
        for privilege in roles::privileges(role, scope) {
            self.revoke_privilege(context, identity, scope, *privilege)
                .await?;
        }
        Ok(())
    }

    /// Ensure the binding for the privilege within the scope does not have the identity as a subject.
    ///
    /// Bindings left without subjects are deleted.
    pub async fn revoke_privilege(
        &self,
        context: &Context,
        identity: &str,
        scope: &Scope,
        privilege: Privilege,
    ) -> Result<Applied> {
        check_scope(privilege, scope)?;
        let result = kportal_errors::retry_on_conflict(self.max_conflict_retries, move || {
            self.try_revoke(context, identity, scope, privilege)
        })
        .await;
        self.observe(context, "revoke", identity, scope, privilege, result)
    }

    /// List the identities granted the privilege within the scope.
    pub async fn subjects(
        &self,
        context: &Context,
        scope: &Scope,
        privilege: Privilege,
    ) -> Result<Vec<String>> {
        let name = privilege.binding_name();
        let binding = self.control_plane.get_binding(context, scope, &name).await?;
        let mut subjects = binding.map(|binding| binding.subjects).unwrap_or_default();
        dedupe(&mut subjects);
        Ok(subjects)
    }

    async fn try_grant(
        &self,
        context: &Context,
        identity: &str,
        scope: &Scope,
        privilege: Privilege,
    ) -> Result<Applied> {
        let name = privilege.binding_name();
        let binding = self.control_plane.get_binding(context, scope, &name).await?;
        let mut binding = match binding {
            Some(binding) => binding,
            None => {
                let binding =
                    Binding::for_privilege(privilege, scope.clone(), vec![identity.to_string()]);
                return match self.control_plane.create_binding(context, binding).await {
                    Ok(_) => Ok(Applied::Created),
                    // Another writer created the binding first: re-read and update it.
                    Err(error) if ErrorKind::AlreadyExists.matches(&error) => {
                        Err(error.context(Conflict::new("binding", name)))
                    }
                    Err(error) => Err(error),
                };
            }
        };

        let deduped = dedupe(&mut binding.subjects);
        if binding.has_subject(identity) && !deduped {
            return Ok(Applied::Unchanged);
        }
        if !binding.has_subject(identity) {
            binding.subjects.push(identity.to_string());
        }
        match self.control_plane.update_binding(context, binding).await {
            Ok(_) => Ok(Applied::Updated),
            // The binding was deleted since it was read: re-read and create it.
            Err(error) if ErrorKind::NotFound.matches(&error) => {
                Err(error.context(Conflict::new("binding", name)))
            }
            Err(error) => Err(error),
        }
    }

    async fn try_revoke(
        &self,
        context: &Context,
        identity: &str,
        scope: &Scope,
        privilege: Privilege,
    ) -> Result<Applied> {
        let name = privilege.binding_name();
        let binding = self.control_plane.get_binding(context, scope, &name).await?;
        let mut binding = match binding {
            None => return Ok(Applied::Unchanged),
            Some(binding) => binding,
        };

        let deduped = dedupe(&mut binding.subjects);
        if !binding.has_subject(identity) && !deduped {
            return Ok(Applied::Unchanged);
        }
        binding.subjects.retain(|subject| subject != identity);

        let result = if binding.is_empty() {
            self.control_plane
                .delete_binding(context, &binding)
                .await
                .map(|_| Applied::Deleted)
        } else {
            self.control_plane
                .update_binding(context, binding)
                .await
                .map(|_| Applied::Updated)
        };
        match result {
            // Someone else already removed the binding.
            Err(error) if ErrorKind::NotFound.matches(&error) => Ok(Applied::Deleted),
            result => result,
        }
    }

    fn observe(
        &self,
        context: &Context,
        op: &'static str,
        identity: &str,
        scope: &Scope,
        privilege: Privilege,
        result: Result<Applied>,
    ) -> Result<Applied> {
        match &result {
            Err(_) => telemetry::SYNC_ERR.with_label_values(&[op]).inc(),
            Ok(applied) => {
                telemetry::SYNC_COUNT
                    .with_label_values(&[op, applied.as_str()])
                    .inc();
                if *applied != Applied::Unchanged {
                    slog::debug!(
                        context.logger, "Binding synchronised";
                        "op" => op,
                        "applied" => applied.as_str(),
                        "identity" => identity,
                        "privilege" => privilege.slug(),
                        "scope" => scope.to_string(),
                    );
                }
            }
        }
        result
    }
}

fn check_scope(privilege: Privilege, scope: &Scope) -> Result<()> {
    let cluster = matches!(scope, Scope::Cluster);
    if privilege.is_cluster_scoped() != cluster {
        anyhow::bail!(ScopeMismatch {
            privilege,
            scope: scope.clone(),
        });
    }
    Ok(())
}

/// Remove repeated subjects, keeping the first occurrence.
///
/// Returns `true` if any subject was removed.
fn dedupe(subjects: &mut Vec<String>) -> bool {
    let before = subjects.len();
    let mut seen = HashSet::new();
    subjects.retain(|subject| seen.insert(subject.clone()));
    before != subjects.len()
}
