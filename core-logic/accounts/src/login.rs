//! Resolve identities verified by the identity provider into registry records.
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;

use kportal_context::Context;
use kportal_controlplane::Scope;
use kportal_errors::Conflict;
use kportal_errors::ErrorKind;
use kportal_errors::InvalidName;
use kportal_registry::Identity;
use kportal_registry::Role;

use super::redact;
use super::Accounts;

/// Claims about an identity, already verified by the identity provider.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub issuer: String,
    pub subject: String,
    pub email: String,
    pub name: String,

    /// Name of the identity provider the identity authenticated with.
    #[serde(default)]
    pub identity_provider: String,

    /// Material the identity needs to access the cluster, made available for download once.
    #[serde(default)]
    pub credentials: Option<String>,
}

impl Claims {
    /// Stable `issuer#subject` ID of the identity.
    pub fn id(&self) -> String {
        format!("{}#{}", self.issuer, self.subject)
    }

    fn check(&self) -> Result<()> {
        if self.issuer.is_empty() || self.issuer.contains('#') {
            anyhow::bail!(InvalidName::new(
                "identity",
                self.id(),
                "the issuer must be set and can't contain '#'",
            ));
        }
        if self.subject.is_empty() {
            anyhow::bail!(InvalidName::new(
                "identity",
                self.id(),
                "the subject must be set",
            ));
        }
        Ok(())
    }

    /// Check if a stored record already reflects these claims.
    fn matches(&self, identity: &Identity) -> bool {
        identity.email == self.email
            && identity.display_name == self.name
            && identity.identity_provider == self.identity_provider
            && (self.credentials.is_none() || identity.credentials == self.credentials)
    }
}

/// Result of a successful login.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct LoginOutcome {
    /// Registry record of the identity, without credential material.
    pub identity: Identity,

    /// Default namespace of the identity, derived from its email.
    ///
    /// Unset when the namespace could not be derived or set up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// One-time token to download credential material, if any was provided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Accounts {
    /// Register or refresh the identity described by the claims.
    ///
    /// New identities are registered as guests. Once validated, identities are
    /// granted the use of the namespace derived from their email domain.
    ///
    /// Namespace setup does not fail the login: errors are logged and a later login
    /// completes the setup.
    pub async fn login(&self, context: &Context, claims: Claims) -> Result<LoginOutcome> {
        claims.check()?;
        let identity = kportal_errors::retry_on_conflict(self.max_conflict_retries, || {
            self.refresh(context, &claims)
        })
        .await?;
        let namespace = self.setup_namespace(context, &identity).await;

        let token = claims.credentials.map(|credentials| {
            let token = uuid::Uuid::new_v4().to_string();
            self.tokens.insert(token.clone(), credentials);
            token
        });
        slog::info!(
            context.logger, "Identity logged in";
            "identity" => &identity.id,
            "role" => identity.role.as_str(),
            "namespace" => namespace.as_deref().unwrap_or(""),
        );
        Ok(LoginOutcome {
            identity: redact(identity),
            namespace,
            token,
        })
    }

    /// Ensure the email-derived namespace exists and validated identities can use it.
    async fn setup_namespace(&self, context: &Context, identity: &Identity) -> Option<String> {
        let namespace = match kportal_namespaces::derive_namespace(&identity.email) {
            Ok(namespace) => namespace,
            Err(error) => {
                slog::warn!(
                    context.logger, "Unable to derive a namespace for identity";
                    "identity" => &identity.id,
                    replisdk::utils::error::slog::ErrorAttributes::from(&error),
                );
                return None;
            }
        };
        if let Err(error) = self.lifecycle.ensure_namespace(context, &namespace).await {
            slog::warn!(
                context.logger, "Unable to set up namespace for identity";
                "identity" => &identity.id,
                "namespace" => &namespace,
                replisdk::utils::error::slog::ErrorAttributes::from(&error),
            );
            return None;
        }
        if identity.role.is_member() {
            let scope = Scope::namespace(&namespace);
            let grant = self
                .sync
                .grant(context, &identity.id, &scope, Role::User)
                .await;
            if let Err(error) = grant {
                slog::warn!(
                    context.logger, "Unable to grant namespace use to identity";
                    "identity" => &identity.id,
                    "namespace" => &namespace,
                    replisdk::utils::error::slog::ErrorAttributes::from(&error),
                );
            }
        }
        Some(namespace)
    }

    /// Create the identity record as a guest or refresh the descriptive fields of an existing one.
    async fn refresh(&self, context: &Context, claims: &Claims) -> Result<Identity> {
        let id = claims.id();
        let mut identity = match self.registry.get(context, &id).await? {
            Some(identity) => identity,
            None => {
                let mut identity = Identity::new(&id, &claims.email, &claims.name);
                identity.identity_provider = claims.identity_provider.clone();
                identity.credentials = claims.credentials.clone();
                // Concurrent logins race to create the record: retry as an update.
                return self
                    .registry
                    .create(context, identity)
                    .await
                    .map_err(|error| {
                        if ErrorKind::AlreadyExists.matches(&error) {
                            error.context(Conflict::new("identity", &id))
                        } else {
                            error
                        }
                    });
            }
        };

        if claims.matches(&identity) {
            return Ok(identity);
        }
        identity.email = claims.email.clone();
        identity.display_name = claims.name.clone();
        identity.identity_provider = claims.identity_provider.clone();
        if claims.credentials.is_some() {
            identity.credentials = claims.credentials.clone();
        }
        self.registry.update(context, identity).await
    }
}
