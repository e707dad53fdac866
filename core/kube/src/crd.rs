//! The `PortalUser` custom resource storing identity records.
use anyhow::Result;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::Api;
use kube::api::Patch;
use kube::api::PatchParams;
use kube::CustomResource;
use kube::CustomResourceExt;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use kportal_context::Context;
use kportal_registry::Identity;
use kportal_registry::Role;

use super::FIELD_MANAGER;
use super::MANAGED_BY_LABEL;

/// Identity record of a portal user.
///
/// Object names encode the identity ID, which is kept in full as `spec.id`.
#[derive(CustomResource, Clone, Debug, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[kube(
    group = "kportal.io",
    version = "v1alpha1",
    kind = "PortalUser",
    plural = "portalusers",
    shortname = "pu"
)]
#[serde(rename_all = "camelCase")]
pub struct PortalUserSpec {
    /// Stable `issuer#subject` ID of the identity.
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<String>,

    pub display_name: String,
    pub email: String,

    #[serde(default)]
    pub identity_provider: String,

    /// Application role of the identity: `guest`, `user` or `admin`.
    #[serde(default)]
    pub role: String,
}

impl PortalUser {
    /// Build the object storing an identity record.
    pub fn from_identity(identity: Identity) -> PortalUser {
        let spec = PortalUserSpec {
            id: identity.id.clone(),
            credentials: identity.credentials.clone(),
            display_name: identity.display_name.clone(),
            email: identity.email.clone(),
            identity_provider: identity.identity_provider.clone(),
            role: identity.role.as_str().to_string(),
        };
        let mut user = PortalUser::new(&identity.object_name(), spec);
        user.metadata.resource_version = identity.version;
        user.metadata.labels = Some(
            [(MANAGED_BY_LABEL.to_string(), FIELD_MANAGER.to_string())]
                .into_iter()
                .collect(),
        );
        user
    }

    /// Decode the identity record stored in the object.
    ///
    /// Unknown roles are read as [`Role::Guest`].
    pub fn into_identity(self) -> Identity {
        let role = self.spec.role.parse().unwrap_or(Role::Guest);
        Identity {
            id: self.spec.id,
            credentials: self.spec.credentials,
            display_name: self.spec.display_name,
            email: self.spec.email,
            identity_provider: self.spec.identity_provider,
            role,
            version: self.metadata.resource_version,
        }
    }
}

/// Install or upgrade the `PortalUser` custom resource definition.
pub async fn apply_definition(context: &Context, client: kube::Client) -> Result<()> {
    let definition = PortalUser::crd();
    let name = definition.metadata.name.clone().unwrap_or_default();
    let api: Api<CustomResourceDefinition> = Api::all(client);
    let params = PatchParams::apply(FIELD_MANAGER).force();
    api.patch(&name, &params, &Patch::Apply(&definition)).await?;
    slog::info!(
        context.logger, "Applied custom resource definition";
        "crd" => name,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use kube::CustomResourceExt;

    use kportal_registry::Identity;
    use kportal_registry::Role;

    use super::PortalUser;

    #[test]
    fn definition_names() {
        let definition = PortalUser::crd();
        assert_eq!(
            definition.metadata.name.as_deref(),
            Some("portalusers.kportal.io"),
        );
        assert_eq!(definition.spec.scope, "Cluster");
    }

    #[test]
    fn identity_encoding() {
        let mut identity = Identity::new("https://idp.org#Alice", "alice@example.com", "Alice")
            .with_role(Role::Admin);
        identity.version = Some("42".into());
        let user = PortalUser::from_identity(identity.clone());
        assert_eq!(user.metadata.name.as_deref(), Some("https---idp-org-alice"));
        assert_eq!(user.metadata.resource_version.as_deref(), Some("42"));
        assert_eq!(user.spec.role, "admin");
        assert_eq!(user.into_identity(), identity);
    }

    #[test]
    fn unknown_roles_are_guests() {
        let identity = Identity::new("iss#bob", "bob@example.com", "Bob").with_role(Role::User);
        let mut user = PortalUser::from_identity(identity);
        user.spec.role = "superuser".into();
        assert_eq!(user.into_identity().role, Role::Guest);
    }
}
