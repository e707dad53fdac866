//! Dependency injection to enable easy access to Process Global resources.
use std::sync::RwLock;

use once_cell::sync::Lazy;

use kportal_access::Evaluator;
use kportal_accounts::Accounts;
use kportal_accounts::AccountsDeps;
use kportal_auth::Authenticator;
use kportal_bindings::Synchronizer;
use kportal_conf::Conf;
use kportal_context::Context;
use kportal_controller::Controller;
use kportal_controlplane::ControlPlane;
use kportal_namespaces::Lifecycle;
use kportal_registry::Registry;

/// Singleton instance of the Process Globals container.
static GLOBAL_INJECTOR: Lazy<RwLock<Option<Injector>>> = Lazy::new(|| RwLock::new(None));

/// Container for all process global dependencies to be injected in other components.
#[derive(Clone)]
pub struct Injector {
    /// Self-service account operations.
    pub accounts: Accounts,

    /// Identify callers of HTTP requests.
    pub authenticator: Authenticator,

    /// Process global configuration.
    pub conf: Conf,

    /// Root context for the process.
    pub context: Context,

    /// Reconcile application roles onto cluster bindings.
    pub controller: Controller,

    /// Client to the cluster control plane.
    pub control_plane: ControlPlane,

    pub evaluator: Evaluator,

    /// Create and delete namespaces on behalf of identities.
    pub lifecycle: Lifecycle,

    /// Client to the User Registry.
    pub registry: Registry,

    pub sync: Synchronizer,
}

/// Clients to external services the [`Injector`] builds on.
pub struct InjectorServices {
    pub authenticator: Authenticator,
    pub control_plane: ControlPlane,
    pub registry: Registry,
}

impl Injector {
    /// Wire process global dependencies together from the clients to external services.
    pub fn build(conf: Conf, context: Context, services: InjectorServices) -> Injector {
        let deadline = conf.timeouts.request();
        let control_plane = services.control_plane.with_deadline(deadline);
        let registry = services.registry.with_deadline(deadline);

        let evaluator = Evaluator::new(control_plane.clone(), &conf.access);
        let sync = Synchronizer::new(control_plane.clone(), &conf.sync);
        let lifecycle = Lifecycle::new(
            control_plane.clone(),
            evaluator.clone(),
            sync.clone(),
            &conf.namespaces,
        );
        let controller = Controller::new(registry.clone(), sync.clone(), &conf.controller);
        let deps = AccountsDeps {
            control_plane: control_plane.clone(),
            evaluator: evaluator.clone(),
            lifecycle: lifecycle.clone(),
            registry: registry.clone(),
            sync: sync.clone(),
        };
        let accounts = Accounts::new(deps, &conf.sync, &conf.credentials);

        Injector {
            accounts,
            authenticator: services.authenticator,
            conf,
            context,
            controller,
            control_plane,
            evaluator,
            lifecycle,
            registry,
            sync,
        }
    }

    /// Get the globally set [`Injector`] instance.
    ///
    /// # Panics
    ///
    /// Panics if no [`Injector`] was set during process initialisation.
    pub fn global() -> Injector {
        GLOBAL_INJECTOR
            .read()
            .expect("GLOBAL_INJECTOR RwLock poisoned")
            .as_ref()
            .expect("global injector is not initialised")
            .clone()
    }

    /// Set the [`Injector`] instance for the process to fetch with [`Injector::global`].
    ///
    /// # Panics
    ///
    /// Panics if an [`Injector`] has already been set.
    pub fn set_global(injector: Injector) {
        // Obtain a lock to initialise the global injector.
        let mut global_injector = GLOBAL_INJECTOR
            .write()
            .expect("GLOBAL_INJECTOR RwLock poisoned");

        // If the global injector is already initialised panic (without poisoning the lock).
        if global_injector.is_some() {
            drop(global_injector);
            panic!("global injector already initialised");
        }

        slog::trace!(
            injector.context.logger,
            "Initialising Global Injector for the process"
        );
        *global_injector = Some(injector);
    }
}

#[cfg(any(test, feature = "test-fixture"))]
impl Injector {
    /// [`Injector`] instance to be used with unit tests.
    ///
    /// External services are in-memory and returned for tests to inspect and manipulate.
    pub fn fixture() -> InjectorFixture {
        let conf = Conf {
            access: Default::default(),
            auth: Default::default(),
            cluster: kportal_conf::BackendConf::named("memory"),
            controller: Default::default(),
            credentials: Default::default(),
            http: Default::default(),
            namespaces: Default::default(),
            registry: kportal_conf::BackendConf::named("memory"),
            runtime: Default::default(),
            sync: Default::default(),
            telemetry: Default::default(),
            timeouts: Default::default(),
        };
        let (control_plane, control_plane_backend) = ControlPlane::fixture();
        let (registry, registry_backend) = Registry::fixture();
        let authenticator = Authenticator::from(kportal_auth::header::TrustedHeader::new(
            conf.auth.identity_header.clone(),
        ));
        let services = InjectorServices {
            authenticator,
            control_plane,
            registry,
        };
        let injector = Injector::build(conf, Context::fixture(), services);
        InjectorFixture {
            control_plane: control_plane_backend,
            injector,
            registry: registry_backend,
        }
    }
}

/// [`Injector`] for unit tests along with the in-memory backends it uses.
#[cfg(any(test, feature = "test-fixture"))]
pub struct InjectorFixture {
    pub control_plane: kportal_controlplane::memory::MemoryControlPlane,
    pub injector: Injector,
    pub registry: kportal_registry::memory::MemoryRegistry,
}

#[cfg(test)]
mod tests {
    use kportal_context::Context;
    use kportal_registry::Identity;

    use super::Injector;

    #[tokio::test]
    async fn fixture_services_are_shared() {
        let context = Context::fixture();
        let fixture = Injector::fixture();
        fixture.control_plane.insert_namespace("team-x");
        let identity = Identity::new("iss#alice", "alice@example.com", "Alice");
        fixture
            .injector
            .registry
            .create(&context, identity)
            .await
            .unwrap();

        let namespace = fixture
            .injector
            .control_plane
            .get_namespace(&context, "team-x")
            .await
            .unwrap();
        assert!(namespace.is_some());
        let profile = fixture
            .injector
            .accounts
            .profile(&context, "iss#alice")
            .await
            .unwrap();
        assert!(profile.identity.is_some());
        assert_eq!(fixture.registry.watchers(), 0);
    }
}
