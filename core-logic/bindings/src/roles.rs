//! Mapping of application roles onto the privilege bundles they are granted.
//!
//! | Role    | Namespace scope   | Cluster scope                                   |
//! |---------|-------------------|-------------------------------------------------|
//! | `guest` | none              | none                                            |
//! | `user`  | `namespace-edit`  | `cluster-member`                                |
//! | `admin` | `namespace-admin` | `cluster-member`, `cluster-namespace-admin`     |
//!
//! This is the only place the mapping is defined.
use kportal_controlplane::Privilege;
use kportal_controlplane::Scope;
use kportal_registry::Role;

/// Cluster privileges granted to application roles.
///
/// The registry watch controller owns bindings for these privileges.
pub const CLUSTER_PRIVILEGES: [Privilege; 2] =
    [Privilege::ClusterMember, Privilege::ClusterNamespaceAdmin];

/// Namespace privileges granted to application roles.
pub const NAMESPACE_PRIVILEGES: [Privilege; 2] =
    [Privilege::NamespaceEdit, Privilege::NamespaceAdmin];

/// Privileges granted to the role at cluster scope.
pub fn cluster_privileges(role: Role) -> &'static [Privilege] {
    match role {
        Role::Guest => &[],
        Role::User => &[Privilege::ClusterMember],
        Role::Admin => &[Privilege::ClusterMember, Privilege::ClusterNamespaceAdmin],
    }
}

/// Privileges granted to the role at namespace scope.
pub fn namespace_privileges(role: Role) -> &'static [Privilege] {
    match role {
        Role::Guest => &[],
        Role::User => &[Privilege::NamespaceEdit],
        Role::Admin => &[Privilege::NamespaceAdmin],
    }
}

/// Application role granted a namespace privilege, if any.
pub fn namespace_role(privilege: Privilege) -> Option<Role> {
    Role::ALL
        .into_iter()
        .find(|role| namespace_privileges(*role) == [privilege])
}

/// Privileges granted to the role within the scope.
pub fn privileges(role: Role, scope: &Scope) -> &'static [Privilege] {
    match scope {
        Scope::Cluster => cluster_privileges(role),
        Scope::Namespace(_) => namespace_privileges(role),
    }
}
