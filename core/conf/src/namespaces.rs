//! Namespace lifecycle options.
use serde::Deserialize;
use serde::Serialize;

/// Default resource limits attached to new namespaces.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LimitsConf {
    /// Default container memory limit.
    #[serde(default = "LimitsConf::default_memory_limit")]
    pub memory_limit: String,

    /// Default container memory request.
    #[serde(default = "LimitsConf::default_memory_request")]
    pub memory_request: String,
}

impl Default for LimitsConf {
    fn default() -> Self {
        LimitsConf {
            memory_limit: Self::default_memory_limit(),
            memory_request: Self::default_memory_request(),
        }
    }
}

impl LimitsConf {
    fn default_memory_limit() -> String {
        String::from("4Gi")
    }

    fn default_memory_request() -> String {
        String::from("256Mi")
    }
}

/// Namespace lifecycle options.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NamespacesConf {
    /// Default resource limits attached to new namespaces.
    #[serde(default)]
    pub limits: LimitsConf,

    /// Namespaces that can never be created or deleted through the portal.
    #[serde(default = "NamespacesConf::default_protected_names")]
    pub protected_names: Vec<String>,

    /// Namespaces with these prefixes can never be created or deleted through the portal.
    #[serde(default = "NamespacesConf::default_protected_prefixes")]
    pub protected_prefixes: Vec<String>,
}

impl Default for NamespacesConf {
    fn default() -> Self {
        NamespacesConf {
            limits: Default::default(),
            protected_names: Self::default_protected_names(),
            protected_prefixes: Self::default_protected_prefixes(),
        }
    }
}

impl NamespacesConf {
    fn default_protected_names() -> Vec<String> {
        vec![String::from("default")]
    }

    fn default_protected_prefixes() -> Vec<String> {
        vec![String::from("kube-")]
    }

    /// Check if the given namespace is reserved.
    pub fn is_protected(&self, namespace: &str) -> bool {
        self.protected_names.iter().any(|name| name == namespace)
            || self
                .protected_prefixes
                .iter()
                .any(|prefix| namespace.starts_with(prefix.as_str()))
    }
}
