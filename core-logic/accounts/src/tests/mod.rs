use kportal_access::Evaluator;
use kportal_bindings::Synchronizer;
use kportal_conf::AccessConf;
use kportal_conf::CredentialsConf;
use kportal_conf::NamespacesConf;
use kportal_conf::SyncConf;
use kportal_context::Context;
use kportal_controlplane::memory::MemoryControlPlane;
use kportal_controlplane::Binding;
use kportal_controlplane::ControlPlane;
use kportal_controlplane::Privilege;
use kportal_controlplane::Scope;
use kportal_namespaces::Lifecycle;
use kportal_registry::memory::MemoryRegistry;
use kportal_registry::Identity;
use kportal_registry::Registry;
use kportal_registry::Role;

use super::Accounts;
use super::AccountsDeps;
use super::Claims;
use super::Membership;

mod admin;
mod members;

const ALICE: &str = "iss#alice";
const BOB: &str = "iss#bob";
const CAROL: &str = "iss#carol";
const ROOT: &str = "iss#root";

pub struct Fixture {
    pub accounts: Accounts,
    pub control_plane: MemoryControlPlane,
    pub lifecycle: Lifecycle,
    pub registry: Registry,
    pub registry_backend: MemoryRegistry,
}

pub fn fixture() -> Fixture {
    let (control_plane, control_plane_backend) = ControlPlane::fixture();
    for name in ["default", "kube-system"] {
        control_plane_backend.insert_namespace(name);
    }
    control_plane_backend.insert_binding(Binding::for_privilege(
        Privilege::ClusterAdmin,
        Scope::Cluster,
        vec![ROOT.to_string()],
    ));
    let (registry, registry_backend) = Registry::fixture();

    let evaluator = Evaluator::new(control_plane.clone(), &AccessConf::default());
    let sync = Synchronizer::new(control_plane.clone(), &SyncConf::default());
    let lifecycle = Lifecycle::new(
        control_plane.clone(),
        evaluator.clone(),
        sync.clone(),
        &NamespacesConf::default(),
    );
    let deps = AccountsDeps {
        control_plane,
        evaluator,
        lifecycle: lifecycle.clone(),
        registry: registry.clone(),
        sync,
    };
    let accounts = Accounts::new(deps, &SyncConf::default(), &CredentialsConf::default());
    Fixture {
        accounts,
        control_plane: control_plane_backend,
        lifecycle,
        registry,
        registry_backend,
    }
}

pub fn claims(id: &str, email: &str) -> Claims {
    let (issuer, subject) = id.split_once('#').unwrap();
    Claims {
        issuer: issuer.to_string(),
        subject: subject.to_string(),
        email: email.to_string(),
        name: subject.to_string(),
        identity_provider: "idp".to_string(),
        credentials: Some(format!("token-of-{}", subject)),
    }
}

pub async fn register(fixture: &Fixture, id: &str, role: Role) -> Identity {
    let context = Context::fixture();
    let name = id.trim_start_matches("iss#");
    let identity = Identity::new(id, format!("{}@example.com", name), name).with_role(role);
    fixture.registry.create(&context, identity).await.unwrap()
}

#[tokio::test]
async fn profile_lists_memberships() {
    let context = Context::fixture();
    let fixture = fixture();
    register(&fixture, BOB, Role::User).await;
    fixture
        .lifecycle
        .create_namespace(&context, "team-x", BOB)
        .await
        .unwrap();
    fixture.control_plane.insert_binding(Binding::for_privilege(
        Privilege::ClusterMember,
        Scope::Cluster,
        vec![BOB.to_string()],
    ));

    let profile = fixture.accounts.profile(&context, BOB).await.unwrap();
    assert_eq!(profile.identity.unwrap().id, BOB);
    assert_eq!(
        profile.memberships,
        vec![
            Membership {
                namespace: None,
                privilege: Privilege::ClusterMember,
            },
            Membership {
                namespace: Some("team-x".into()),
                privilege: Privilege::NamespaceAdmin,
            },
        ],
    );
}

#[tokio::test]
async fn profile_of_unknown_identity() {
    let context = Context::fixture();
    let fixture = fixture();
    let profile = fixture.accounts.profile(&context, CAROL).await.unwrap();
    assert_eq!(profile.identity, None);
    assert!(profile.memberships.is_empty());
}

#[tokio::test]
async fn profile_includes_unmanaged_privileges() {
    let context = Context::fixture();
    let fixture = fixture();
    let profile = fixture.accounts.profile(&context, ROOT).await.unwrap();
    assert_eq!(
        profile.memberships,
        vec![Membership {
            namespace: None,
            privilege: Privilege::ClusterAdmin,
        }],
    );
    let profile = fixture.accounts.profile(&context, ALICE).await.unwrap();
    assert!(profile.memberships.is_empty());
}
