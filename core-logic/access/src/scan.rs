//! Evaluate access by scanning bindings for administrative privileges.
//!
//! Scanning only recognises privilege bundles known to the portal, so it is used
//! only for control planes that can't simulate authorisation checks.
use anyhow::Result;

use kportal_context::Context;
use kportal_controlplane::Binding;
use kportal_controlplane::ControlPlane;
use kportal_controlplane::Scope;

/// Check if the identity is a subject of an administrative cluster binding.
///
/// Bindings with names starting with `system_prefix` are reserved to the control plane
/// and are ignored.
pub async fn cluster_admin(
    context: &Context,
    control_plane: &ControlPlane,
    identity: &str,
    system_prefix: &str,
) -> Result<bool> {
    let bindings = control_plane.list_bindings(context, &Scope::Cluster).await?;
    let found = bindings
        .iter()
        .filter(|binding| !binding.name.starts_with(system_prefix))
        .any(|binding| grants_admin(binding, identity));
    Ok(found)
}

/// Check if the identity is a subject of an administrative binding in the namespace.
///
/// Cluster administrators are not considered by this function.
pub async fn namespace_admin(
    context: &Context,
    control_plane: &ControlPlane,
    identity: &str,
    namespace: &str,
) -> Result<bool> {
    let scope = Scope::namespace(namespace);
    let bindings = control_plane.list_bindings(context, &scope).await?;
    Ok(bindings.iter().any(|binding| grants_admin(binding, identity)))
}

fn grants_admin(binding: &Binding, identity: &str) -> bool {
    let administrative = binding
        .privilege()
        .map(|privilege| privilege.is_administrative())
        .unwrap_or(false);
    administrative && binding.has_subject(identity)
}
