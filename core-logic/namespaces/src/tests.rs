use kportal_access::Evaluator;
use kportal_bindings::Synchronizer;
use kportal_conf::AccessConf;
use kportal_conf::NamespacesConf;
use kportal_conf::SyncConf;
use kportal_context::Context;
use kportal_controlplane::memory::MemoryControlPlane;
use kportal_controlplane::Binding;
use kportal_controlplane::ControlPlane;
use kportal_controlplane::Privilege;
use kportal_controlplane::Scope;
use kportal_errors::ErrorKind;

use super::Lifecycle;

const BOB: &str = "iss#bob";
const CAROL: &str = "iss#carol";
const ROOT: &str = "iss#root";

struct Fixture {
    backend: MemoryControlPlane,
    evaluator: Evaluator,
    lifecycle: Lifecycle,
}

fn fixture() -> Fixture {
    let (control_plane, backend) = ControlPlane::fixture();
    for name in ["default", "kube-system"] {
        backend.insert_namespace(name);
    }
    backend.insert_binding(Binding::for_privilege(
        Privilege::ClusterAdmin,
        Scope::Cluster,
        vec![ROOT.to_string()],
    ));
    let evaluator = Evaluator::new(control_plane.clone(), &AccessConf::default());
    let sync = Synchronizer::new(control_plane.clone(), &SyncConf::default());
    let lifecycle = Lifecycle::new(
        control_plane,
        evaluator.clone(),
        sync,
        &NamespacesConf::default(),
    );
    Fixture {
        backend,
        evaluator,
        lifecycle,
    }
}

#[tokio::test]
async fn create_namespace_with_limits_and_admin() {
    let context = Context::fixture();
    let fixture = fixture();
    let namespace = fixture
        .lifecycle
        .create_namespace(&context, "team-x", BOB)
        .await
        .unwrap();
    assert_eq!(namespace.name, "team-x");

    let limits = fixture.backend.limits("team-x");
    assert_eq!(limits.len(), 1);
    assert_eq!(limits[0].name, "team-x-mem");
    assert_eq!(limits[0].memory_limit, "4Gi");
    assert_eq!(limits[0].memory_request, "256Mi");

    let binding = fixture
        .backend
        .binding(&Scope::namespace("team-x"), "kportal-namespace-admin")
        .unwrap();
    assert_eq!(binding.subjects, vec![BOB]);
}

#[tokio::test]
async fn create_existing_namespace() {
    let context = Context::fixture();
    let fixture = fixture();
    fixture
        .lifecycle
        .create_namespace(&context, "team-x", BOB)
        .await
        .unwrap();
    let error = fixture
        .lifecycle
        .create_namespace(&context, "team-x", CAROL)
        .await
        .unwrap_err();
    assert!(ErrorKind::AlreadyExists.matches(&error));

    let evaluator = &fixture.evaluator;
    assert!(evaluator.is_namespace_admin(&context, BOB, "team-x").await);
    assert!(!evaluator.is_namespace_admin(&context, CAROL, "team-x").await);
}

#[tokio::test]
async fn create_protected_namespace() {
    let context = Context::fixture();
    let fixture = fixture();
    for name in ["default", "kube-system", "kube-new"] {
        let error = fixture
            .lifecycle
            .create_namespace(&context, name, ROOT)
            .await
            .unwrap_err();
        assert!(ErrorKind::Protected.matches(&error), "{}", name);
    }
}

#[tokio::test]
async fn create_invalid_name() {
    let context = Context::fixture();
    let fixture = fixture();
    let error = fixture
        .lifecycle
        .create_namespace(&context, "Team_X", BOB)
        .await
        .unwrap_err();
    assert!(ErrorKind::InvalidName.matches(&error));
}

#[tokio::test]
async fn create_partial_failure_is_not_rolled_back() {
    let context = Context::fixture();
    let fixture = fixture();
    fixture.backend.fail_next("create_limits", 1);
    fixture
        .lifecycle
        .create_namespace(&context, "team-x", BOB)
        .await
        .unwrap();
    assert!(fixture.backend.limits("team-x").is_empty());
    assert!(fixture
        .evaluator
        .is_namespace_admin(&context, BOB, "team-x")
        .await);

    fixture
        .lifecycle
        .ensure_namespace(&context, "team-x")
        .await
        .unwrap();
    assert_eq!(fixture.backend.limits("team-x").len(), 1);
}

#[tokio::test]
async fn delete_protected_namespace() {
    let context = Context::fixture();
    let fixture = fixture();
    for name in ["default", "kube-system"] {
        for identity in [ROOT, BOB] {
            let error = fixture
                .lifecycle
                .delete_namespace(&context, name, identity)
                .await
                .unwrap_err();
            assert!(ErrorKind::Protected.matches(&error), "{}", name);
        }
    }
}

#[tokio::test]
async fn delete_needs_namespace_admin() {
    let context = Context::fixture();
    let fixture = fixture();
    fixture
        .lifecycle
        .create_namespace(&context, "team-x", BOB)
        .await
        .unwrap();
    let error = fixture
        .lifecycle
        .delete_namespace(&context, "team-x", CAROL)
        .await
        .unwrap_err();
    assert!(ErrorKind::PermissionDenied.matches(&error));

    fixture
        .lifecycle
        .delete_namespace(&context, "team-x", BOB)
        .await
        .unwrap();
    let control_plane = ControlPlane::from(fixture.backend.clone());
    let namespace = control_plane.get_namespace(&context, "team-x").await.unwrap();
    assert_eq!(namespace, None);
}

#[tokio::test]
async fn cluster_admins_delete_any_namespace() {
    let context = Context::fixture();
    let fixture = fixture();
    fixture
        .lifecycle
        .create_namespace(&context, "team-x", BOB)
        .await
        .unwrap();
    fixture
        .lifecycle
        .delete_namespace(&context, "team-x", ROOT)
        .await
        .unwrap();
}

#[tokio::test]
async fn ensure_namespace_is_idempotent() {
    let context = Context::fixture();
    let fixture = fixture();
    for _ in 0..2 {
        fixture
            .lifecycle
            .ensure_namespace(&context, "ucsd-edu")
            .await
            .unwrap();
    }
    assert_eq!(fixture.backend.limits("ucsd-edu").len(), 1);
    let binding = fixture
        .backend
        .binding(&Scope::namespace("ucsd-edu"), "kportal-namespace-admin");
    assert_eq!(binding, None);
}
