//! Data object storing kportal's configuration.
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use replisdk::runtime::actix_web::ServerConfig;
use replisdk::runtime::shutdown::DEFAULT_SHUTDOWN_GRACE_TIMEOUT;
use replisdk::runtime::telemetry::TelemetryConfig;
use replisdk::runtime::tokio_conf::TokioRuntimeConf;

use super::ControllerConf;
use super::NamespacesConf;

/// Global configuration for the kportal process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conf {
    /// Access evaluation options.
    #[serde(default)]
    pub access: AccessConf,

    /// Identification of callers for HTTP requests.
    #[serde(default)]
    pub auth: AuthConf,

    /// Cluster control plane service configuration.
    pub cluster: BackendConf,

    /// Registry watch controller configuration.
    #[serde(default)]
    pub controller: ControllerConf,

    /// One-time credential download tokens.
    #[serde(default)]
    pub credentials: CredentialsConf,

    /// HTTP Server configuration.
    #[serde(default)]
    pub http: ServerConfig,

    /// Namespace lifecycle options.
    #[serde(default)]
    pub namespaces: NamespacesConf,

    /// User Registry service configuration.
    pub registry: BackendConf,

    /// Process runtime configuration.
    #[serde(default)]
    pub runtime: RuntimeConf,

    /// Binding synchronisation options.
    #[serde(default)]
    pub sync: SyncConf,

    /// Telemetry configuration for the process.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Deadlines applied to calls to external services.
    #[serde(default)]
    pub timeouts: TimeoutsConf,
}

/// Access evaluation options.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AccessConf {
    /// Cluster bindings with names starting with this prefix are ignored when scanning.
    #[serde(default = "AccessConf::default_system_prefix")]
    pub system_prefix: String,
}

impl Default for AccessConf {
    fn default() -> Self {
        AccessConf {
            system_prefix: Self::default_system_prefix(),
        }
    }
}

impl AccessConf {
    fn default_system_prefix() -> String {
        String::from("system:")
    }
}

/// Identification of callers for HTTP requests.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AuthConf {
    /// Header set by the trusted session layer with the ID of the authenticated identity.
    #[serde(default = "AuthConf::default_identity_header")]
    pub identity_header: String,
}

impl Default for AuthConf {
    fn default() -> Self {
        AuthConf {
            identity_header: Self::default_identity_header(),
        }
    }
}

impl AuthConf {
    fn default_identity_header() -> String {
        String::from("X-Portal-Identity")
    }
}

/// Unstructured configuration for runtime selected service backends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackendConf {
    /// ID of the backend selected to provide the service.
    pub backend: String,

    /// Backend specific configuration options.
    #[serde(default, flatten)]
    pub options: serde_json::Value,
}

impl BackendConf {
    /// Select a backend without any additional options.
    pub fn named<S: Into<String>>(backend: S) -> BackendConf {
        BackendConf {
            backend: backend.into(),
            options: serde_json::Value::Object(Default::default()),
        }
    }
}

/// One-time credential download tokens.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CredentialsConf {
    /// Maximum number of outstanding download tokens.
    #[serde(default = "CredentialsConf::default_max_tokens")]
    pub max_tokens: usize,

    /// Time, in seconds, a download token remains valid.
    #[serde(default = "CredentialsConf::default_token_ttl")]
    pub token_ttl_sec: u64,
}

impl Default for CredentialsConf {
    fn default() -> Self {
        CredentialsConf {
            max_tokens: Self::default_max_tokens(),
            token_ttl_sec: Self::default_token_ttl(),
        }
    }
}

impl CredentialsConf {
    fn default_max_tokens() -> usize {
        1024
    }

    fn default_token_ttl() -> u64 {
        60
    }

    /// Time a download token remains valid.
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_sec)
    }
}

/// Container for the complete process runtime configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConf {
    /// Allowed time, in seconds, for running operations to complete once process shutdown begins.
    #[serde(default = "RuntimeConf::default_shutdown_grace")]
    pub shutdown_grace_sec: u64,

    /// Tokio Runtime configuration.
    #[serde(default, flatten)]
    pub tokio: TokioRuntimeConf,
}

impl Default for RuntimeConf {
    fn default() -> Self {
        RuntimeConf {
            shutdown_grace_sec: Self::default_shutdown_grace(),
            tokio: Default::default(),
        }
    }
}

impl RuntimeConf {
    fn default_shutdown_grace() -> u64 {
        DEFAULT_SHUTDOWN_GRACE_TIMEOUT
    }
}

/// Binding synchronisation options.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SyncConf {
    /// Number of times a conflicting write is re-applied before giving up.
    #[serde(default = "SyncConf::default_max_conflict_retries")]
    pub max_conflict_retries: u16,
}

impl Default for SyncConf {
    fn default() -> Self {
        SyncConf {
            max_conflict_retries: Self::default_max_conflict_retries(),
        }
    }
}

impl SyncConf {
    fn default_max_conflict_retries() -> u16 {
        5
    }
}

/// Deadlines applied to calls to external services.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TimeoutsConf {
    /// Deadline, in milliseconds, for any single registry or control plane request.
    #[serde(default = "TimeoutsConf::default_request")]
    pub request_ms: u64,
}

impl Default for TimeoutsConf {
    fn default() -> Self {
        TimeoutsConf {
            request_ms: Self::default_request(),
        }
    }
}

impl TimeoutsConf {
    fn default_request() -> u64 {
        10_000
    }

    /// Deadline for any single registry or control plane request.
    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::Conf;

    #[test]
    fn decode_minimal() {
        let conf: Conf = serde_yaml::from_str(
            r#"
cluster:
  backend: kubernetes
  kubeconfig_context: portal
registry:
  backend: memory
"#,
        )
        .unwrap();
        assert_eq!(conf.cluster.backend, "kubernetes");
        assert_eq!(conf.cluster.options["kubeconfig_context"], "portal");
        assert_eq!(conf.registry.backend, "memory");
        assert_eq!(conf.access.system_prefix, "system:");
        assert_eq!(conf.auth.identity_header, "X-Portal-Identity");
        assert_eq!(conf.controller.resync_interval_sec, 600);
        assert_eq!(conf.namespaces.limits.memory_limit, "4Gi");
        assert_eq!(conf.sync.max_conflict_retries, 5);
        assert_eq!(conf.timeouts.request_ms, 10_000);
    }

    #[test]
    fn decode_overrides() {
        let conf: Conf = serde_yaml::from_str(
            r#"
cluster:
  backend: memory
registry:
  backend: memory
controller:
  resync_interval_sec: 30
  backoff:
    max_retries: 3
namespaces:
  protected_names: [default, portal]
sync:
  max_conflict_retries: 2
"#,
        )
        .unwrap();
        assert_eq!(conf.controller.resync_interval_sec, 30);
        assert_eq!(conf.controller.startup_grace_sec, 3);
        assert_eq!(conf.controller.backoff.max_retries, 3);
        assert_eq!(conf.controller.backoff.multiplier, 2);
        assert_eq!(conf.namespaces.protected_names, vec!["default", "portal"]);
        assert_eq!(conf.namespaces.protected_prefixes, vec!["kube-"]);
        assert_eq!(conf.sync.max_conflict_retries, 2);
    }
}
