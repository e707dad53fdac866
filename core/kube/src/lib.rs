//! User Registry and cluster control plane backends for Kubernetes API servers.
//!
//! - Identity records are stored as cluster scoped `PortalUser` custom resources.
//! - Bindings are `RoleBinding` and `ClusterRoleBinding` objects granting `ClusterRole`s to users.
//! - Access reviews use `SelfSubjectAccessReview`s submitted while impersonating the identity.
use anyhow::Context as AnyContext;
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;

use kportal_context::Context;
use kportal_controlplane::ControlPlane;
use kportal_controlplane::ControlPlaneFactory;
use kportal_controlplane::ControlPlaneFactoryArgs;
use kportal_registry::Registry;
use kportal_registry::RegistryFactory;
use kportal_registry::RegistryFactoryArgs;

mod control_plane;
mod crd;
mod errors;
mod registry;

pub use self::control_plane::KubeControlPlane;
pub use self::crd::PortalUser;
pub use self::crd::PortalUserSpec;
pub use self::registry::KubeRegistry;

/// Field manager name used when applying objects.
const FIELD_MANAGER: &str = "kportal";

/// Label attached to objects created by the portal.
const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Options for connecting to the Kubernetes API server.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct KubeConf {
    /// Kubeconfig context to use instead of the current one.
    ///
    /// When unset the in-cluster configuration is preferred over the local kubeconfig.
    #[serde(default)]
    pub kubeconfig_context: Option<String>,
}

impl KubeConf {
    fn decode(conf: &Json) -> Result<KubeConf> {
        serde_json::from_value(conf.clone()).context("invalid kubernetes backend configuration")
    }

    /// Load client configuration for the API server.
    async fn client_config(&self) -> Result<kube::Config> {
        let config = match &self.kubeconfig_context {
            None => kube::Config::infer().await?,
            Some(context) => {
                let options = kube::config::KubeConfigOptions {
                    context: Some(context.clone()),
                    ..Default::default()
                };
                kube::Config::from_kubeconfig(&options).await?
            }
        };
        Ok(config)
    }
}

/// Initialise User Registry clients backed by `PortalUser` custom resources.
pub struct KubeRegistryFactory;

#[async_trait::async_trait]
impl RegistryFactory for KubeRegistryFactory {
    fn conf_check(&self, _: &Context, conf: &Json) -> Result<()> {
        KubeConf::decode(conf).map(|_| ())
    }

    fn register_metrics(&self, _: &prometheus::Registry) -> Result<()> {
        Ok(())
    }

    async fn registry<'a>(&self, args: RegistryFactoryArgs<'a>) -> Result<Registry> {
        let conf = KubeConf::decode(args.conf)?;
        let config = conf.client_config().await?;
        let client = kube::Client::try_from(config)?;
        slog::debug!(args.context.logger, "Connected to the kubernetes user registry");
        Ok(Registry::from(KubeRegistry::new(client)))
    }

    async fn sync<'a>(&self, args: RegistryFactoryArgs<'a>) -> Result<()> {
        let conf = KubeConf::decode(args.conf)?;
        let config = conf.client_config().await?;
        let client = kube::Client::try_from(config)?;
        self::crd::apply_definition(args.context, client).await
    }
}

/// Initialise cluster control plane clients for Kubernetes API servers.
pub struct KubeControlPlaneFactory;

#[async_trait::async_trait]
impl ControlPlaneFactory for KubeControlPlaneFactory {
    fn conf_check(&self, _: &Context, conf: &Json) -> Result<()> {
        KubeConf::decode(conf).map(|_| ())
    }

    fn register_metrics(&self, _: &prometheus::Registry) -> Result<()> {
        Ok(())
    }

    async fn control_plane<'a>(&self, args: ControlPlaneFactoryArgs<'a>) -> Result<ControlPlane> {
        let conf = KubeConf::decode(args.conf)?;
        let config = conf.client_config().await?;
        let control_plane = KubeControlPlane::new(config)?;
        slog::debug!(args.context.logger, "Connected to the kubernetes control plane");
        Ok(ControlPlane::from(control_plane))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::KubeConf;

    #[test]
    fn decode_conf() {
        let conf = KubeConf::decode(&json!({"kubeconfig_context": "staging"})).unwrap();
        assert_eq!(conf.kubeconfig_context.as_deref(), Some("staging"));
        let conf = KubeConf::decode(&json!({})).unwrap();
        assert_eq!(conf, KubeConf::default());
    }

    #[test]
    fn decode_invalid_conf() {
        let error = KubeConf::decode(&json!({"kubeconfig_context": 42})).unwrap_err();
        assert_eq!(error.to_string(), "invalid kubernetes backend configuration");
    }
}
