//! Answer "can this identity administer a namespace or the cluster?".
//!
//! When the control plane can simulate authorisation checks the [`Evaluator`] asks it
//! whether the identity can perform an administrative action.
//! This composes with aggregated roles and any policy the cluster applies without
//! the portal needing to know how privileges map to permissions.
//!
//! Control planes that can't simulate checks are handled by scanning bindings
//! for administrative privileges granted to the identity (see the [`scan`] module).
//!
//! Evaluation never fails: errors are logged and treated as "not authorised".
use anyhow::Result;

use kportal_conf::AccessConf;
use kportal_context::Context;
use kportal_controlplane::AccessReview;
use kportal_controlplane::ControlPlane;

pub mod scan;
mod telemetry;


pub use self::telemetry::register_metrics;

/// Evaluate administrative access of identities.
#[derive(Clone)]
pub struct Evaluator {
    control_plane: ControlPlane,
    system_prefix: String,
}

impl Evaluator {
    pub fn new(control_plane: ControlPlane, conf: &AccessConf) -> Evaluator {
        Evaluator {
            control_plane,
            system_prefix: conf.system_prefix.clone(),
        }
    }

    /// Check if the identity can administer the cluster.
    pub async fn is_cluster_admin(&self, context: &Context, identity: &str) -> bool {
        let result = if self.control_plane.supports_access_review() {
            let review = AccessReview {
                group: String::new(),
                identity: identity.to_string(),
                namespace: None,
                resource: String::from("namespaces"),
                verb: String::from("delete"),
            };
            self.control_plane.access_review(context, &review).await
        } else {
            scan::cluster_admin(context, &self.control_plane, identity, &self.system_prefix).await
        };
        self.fail_closed(context, "cluster_admin", identity, result)
    }

    /// Check if the identity can administer the namespace.
    ///
    /// Cluster administrators can administer all namespaces.
    pub async fn is_namespace_admin(
        &self,
        context: &Context,
        identity: &str,
        namespace: &str,
    ) -> bool {
        let result = if self.control_plane.supports_access_review() {
            let review = AccessReview {
                group: String::from("rbac.authorization.k8s.io"),
                identity: identity.to_string(),
                namespace: Some(namespace.to_string()),
                resource: String::from("rolebindings"),
                verb: String::from("create"),
            };
            self.control_plane.access_review(context, &review).await
        } else {
            scan::namespace_admin(context, &self.control_plane, identity, namespace).await
        };
        if self.fail_closed(context, "namespace_admin", identity, result) {
            return true;
        }
        self.is_cluster_admin(context, identity).await
    }

    fn fail_closed(
        &self,
        context: &Context,
        check: &'static str,
        identity: &str,
        result: Result<bool>,
    ) -> bool {
        match result {
            Ok(allowed) => {
                telemetry::observe(check, allowed);
                allowed
            }
            Err(error) => {
                telemetry::EVALUATE_ERR.with_label_values(&[check]).inc();
                slog::warn!(
                    context.logger, "Access evaluation failed, denying access";
                    "check" => check,
                    "identity" => identity,
                    replisdk::utils::error::slog::ErrorAttributes::from(&error),
                );
                false
            }
        }
    }
}
