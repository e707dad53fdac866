//! Self-service operations on behalf of authenticated identities.
//!
//! - Login: register or refresh identity records and issue credential download tokens.
//! - Administration: portal administrators manage application roles.
//! - Membership: namespace administrators manage who can use their namespaces.
//! - Profile: report the privileges an identity holds.
//!
//! Only namespace scoped bindings are changed here.
//! Cluster scoped bindings follow application roles through the registry watch controller.
use anyhow::Result;
use serde::Serialize;

use kportal_access::Evaluator;
use kportal_bindings::Synchronizer;
use kportal_conf::CredentialsConf;
use kportal_conf::SyncConf;
use kportal_context::Context;
use kportal_controlplane::ControlPlane;
use kportal_controlplane::Privilege;
use kportal_controlplane::Scope;
use kportal_ephemeral::EphemeralStore;
use kportal_errors::NotFound;
use kportal_namespaces::Lifecycle;
use kportal_registry::Identity;
use kportal_registry::Registry;

mod admin;
mod login;
mod members;

#[cfg(test)]
mod tests;

pub use self::login::Claims;
pub use self::login::LoginOutcome;
pub use self::members::Member;

/// A binding the identity is a subject of.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Membership {
    /// Namespace the privilege is granted in, or `None` for cluster privileges.
    pub namespace: Option<String>,
    pub privilege: Privilege,
}

/// Identity record and privileges of the caller.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Profile {
    /// Registry record of the identity, if the identity ever logged in.
    pub identity: Option<Identity>,
    pub memberships: Vec<Membership>,
}

/// Self-service account operations.
#[derive(Clone)]
pub struct Accounts {
    control_plane: ControlPlane,
    evaluator: Evaluator,
    lifecycle: Lifecycle,
    max_conflict_retries: u16,
    registry: Registry,
    sync: Synchronizer,
    tokens: EphemeralStore<String>,
}

/// Services [`Accounts`] operations depend on.
pub struct AccountsDeps {
    pub control_plane: ControlPlane,
    pub evaluator: Evaluator,
    pub lifecycle: Lifecycle,
    pub registry: Registry,
    pub sync: Synchronizer,
}

impl Accounts {
    pub fn new(deps: AccountsDeps, sync: &SyncConf, credentials: &CredentialsConf) -> Accounts {
        Accounts {
            control_plane: deps.control_plane,
            evaluator: deps.evaluator,
            lifecycle: deps.lifecycle,
            max_conflict_retries: sync.max_conflict_retries,
            registry: deps.registry,
            sync: deps.sync,
            tokens: EphemeralStore::new(credentials.max_tokens, credentials.token_ttl()),
        }
    }

    /// Exchange a one-time download token for the credential material it was issued for.
    pub fn download(&self, context: &Context, token: &str) -> Result<String> {
        match self.tokens.take(token) {
            Some(credentials) => Ok(credentials),
            None => {
                slog::debug!(context.logger, "Credentials download token not found or expired");
                anyhow::bail!(NotFound::new("download token", token))
            }
        }
    }

    /// Report the registry record of the caller and the bindings it is a subject of.
    pub async fn profile(&self, context: &Context, caller: &str) -> Result<Profile> {
        let identity = self.registry.get(context, caller).await?;
        let mut scopes = vec![Scope::Cluster];
        for namespace in self.control_plane.list_namespaces(context).await? {
            scopes.push(Scope::namespace(namespace.name));
        }

        let mut memberships = Vec::new();
        for scope in scopes {
            let bindings = self.control_plane.list_bindings(context, &scope).await?;
            for binding in bindings {
                if !binding.has_subject(caller) {
                    continue;
                }
                if let Some(privilege) = binding.privilege() {
                    memberships.push(Membership {
                        namespace: scope.namespace_name().map(String::from),
                        privilege,
                    });
                }
            }
        }
        Ok(Profile {
            identity: identity.map(redact),
            memberships,
        })
    }
}

/// Drop credential material from records returned to callers.
fn redact(mut identity: Identity) -> Identity {
    identity.credentials = None;
    identity
}
