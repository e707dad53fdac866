//! Control plane objects managed by the portal.
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// Prefix of all binding names managed by the portal.
pub const BINDING_PREFIX: &str = "kportal-";

/// Where a binding grants its privilege.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(tag = "kind", content = "namespace", rename_all = "lowercase")]
pub enum Scope {
    /// The binding grants cluster-wide privileges.
    Cluster,

    /// The binding grants privileges within one namespace.
    Namespace(String),
}

impl Scope {
    /// Scope for the given namespace.
    pub fn namespace<S: Into<String>>(name: S) -> Scope {
        Scope::Namespace(name.into())
    }

    /// Name of the namespace, for namespace scopes.
    pub fn namespace_name(&self) -> Option<&str> {
        match self {
            Scope::Cluster => None,
            Scope::Namespace(name) => Some(name),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Cluster => write!(f, "cluster"),
            Scope::Namespace(name) => write!(f, "namespace:{}", name),
        }
    }
}

/// Privilege bundles known to the portal.
///
/// Each bundle corresponds to exactly one role reference on the control plane.
/// Bindings referencing any other role are not recognised by the portal.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Privilege {
    /// Full control of the cluster, managed outside of the portal.
    ClusterAdmin,

    /// Read-only access to cluster-wide information required to use the cluster.
    ClusterMember,

    /// Create and delete namespaces anywhere in the cluster.
    ClusterNamespaceAdmin,

    /// Full control of a namespace, including its bindings.
    NamespaceAdmin,

    /// Manage workloads in a namespace.
    NamespaceEdit,
}

impl Privilege {
    /// All known privilege bundles.
    pub const ALL: [Privilege; 5] = [
        Privilege::ClusterAdmin,
        Privilege::ClusterMember,
        Privilege::ClusterNamespaceAdmin,
        Privilege::NamespaceAdmin,
        Privilege::NamespaceEdit,
    ];

    /// Deterministic name of the binding granting this privilege within a scope.
    pub fn binding_name(&self) -> String {
        format!("{}{}", BINDING_PREFIX, self.slug())
    }

    /// Look up the privilege bundle granted by a control plane role.
    pub fn from_role_ref(role_ref: &str) -> Option<Privilege> {
        Privilege::ALL
            .into_iter()
            .find(|privilege| privilege.role_ref() == role_ref)
    }

    /// The privilege bundle grants administrative access over its scope.
    pub fn is_administrative(&self) -> bool {
        matches!(
            self,
            Privilege::ClusterAdmin | Privilege::ClusterNamespaceAdmin | Privilege::NamespaceAdmin
        )
    }

    /// The privilege bundle can only be granted at cluster scope.
    pub fn is_cluster_scoped(&self) -> bool {
        matches!(
            self,
            Privilege::ClusterAdmin | Privilege::ClusterMember | Privilege::ClusterNamespaceAdmin
        )
    }

    /// Name of the control plane role granting this privilege bundle.
    pub fn role_ref(&self) -> &'static str {
        match self {
            Privilege::ClusterAdmin => "cluster-admin",
            Privilege::ClusterMember => "kportal:member",
            Privilege::ClusterNamespaceAdmin => "kportal:namespace-admin",
            Privilege::NamespaceAdmin => "admin",
            Privilege::NamespaceEdit => "edit",
        }
    }

    /// Short identifier of the privilege bundle.
    pub fn slug(&self) -> &'static str {
        match self {
            Privilege::ClusterAdmin => "cluster-admin",
            Privilege::ClusterMember => "cluster-member",
            Privilege::ClusterNamespaceAdmin => "cluster-namespace-admin",
            Privilege::NamespaceAdmin => "namespace-admin",
            Privilege::NamespaceEdit => "namespace-edit",
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Grant of a control plane role to a set of identities.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,

    /// Name of the control plane role granted by the binding.
    pub role_ref: String,

    pub scope: Scope,

    /// IDs of identities the role is granted to.
    pub subjects: Vec<String>,

    /// Subjects that are not portal identities, such as groups or service accounts.
    ///
    /// These are attached by cluster operators and are written back unchanged.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other_subjects: Vec<OtherSubject>,

    /// Version of the stored object, for optimistic concurrency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Binding {
    /// Define a new binding for a privilege bundle, using its deterministic name.
    pub fn for_privilege(privilege: Privilege, scope: Scope, subjects: Vec<String>) -> Binding {
        Binding {
            name: privilege.binding_name(),
            role_ref: privilege.role_ref().to_string(),
            scope,
            subjects,
            other_subjects: Vec::new(),
            version: None,
        }
    }

    /// Check if the binding grants the role to no one.
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty() && self.other_subjects.is_empty()
    }

    /// Check if the identity is a subject of the binding.
    pub fn has_subject(&self, identity: &str) -> bool {
        self.subjects.iter().any(|subject| subject == identity)
    }

    /// Privilege bundle granted by the binding, if recognised.
    pub fn privilege(&self) -> Option<Privilege> {
        Privilege::from_role_ref(&self.role_ref)
    }
}

/// Binding subject the portal does not manage.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct OtherSubject {
    pub kind: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Default resource limits for containers in a namespace.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LimitRange {
    pub name: String,
    pub namespace: String,

    /// Default container memory limit.
    pub memory_limit: String,

    /// Default container memory request.
    pub memory_request: String,
}

impl LimitRange {
    /// Define the default memory limits object for a namespace.
    pub fn memory<S1, S2>(namespace: &str, memory_limit: S1, memory_request: S2) -> LimitRange
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        LimitRange {
            name: format!("{}-mem", namespace),
            namespace: namespace.to_string(),
            memory_limit: memory_limit.into(),
            memory_request: memory_request.into(),
        }
    }
}

/// Control plane namespace.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Namespace {
    pub name: String,

    /// The namespace is being deleted.
    #[serde(default)]
    pub terminating: bool,
}

/// Request to check if an identity is allowed to perform an action.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AccessReview {
    /// API group of the resource, empty for the core group.
    pub group: String,

    /// ID of the identity to check access for.
    pub identity: String,

    /// Namespace the check applies to, or `None` for cluster-wide access.
    pub namespace: Option<String>,

    pub resource: String,
    pub verb: String,
}

#[cfg(test)]
mod tests {
    use super::Binding;
    use super::Privilege;
    use super::Scope;

    #[test]
    fn binding_names_are_deterministic() {
        let binding = Binding::for_privilege(Privilege::NamespaceAdmin, Scope::namespace("x"), vec![]);
        assert_eq!(binding.name, "kportal-namespace-admin");
        assert_eq!(binding.role_ref, "admin");
        assert_eq!(binding.privilege(), Some(Privilege::NamespaceAdmin));
    }

    #[test]
    fn role_refs_round_trip() {
        for privilege in Privilege::ALL {
            assert_eq!(Privilege::from_role_ref(privilege.role_ref()), Some(privilege));
        }
        assert_eq!(Privilege::from_role_ref("view"), None);
    }

    #[test]
    fn scope_display() {
        assert_eq!(Scope::Cluster.to_string(), "cluster");
        assert_eq!(Scope::namespace("team-x").to_string(), "namespace:team-x");
    }
}
