use kportal_context::Context;
use kportal_errors::ErrorKind;
use kportal_registry::Role;

use super::fixture;
use super::register;
use super::Fixture;
use super::ALICE;
use super::BOB;
use super::CAROL;
use crate::Member;

async fn team_x() -> Fixture {
    let context = Context::fixture();
    let fixture = fixture();
    register(&fixture, BOB, Role::User).await;
    register(&fixture, CAROL, Role::User).await;
    fixture
        .lifecycle
        .create_namespace(&context, "team-x", BOB)
        .await
        .unwrap();
    fixture
}

#[tokio::test]
async fn add_and_remove_members() {
    let context = Context::fixture();
    let fixture = team_x().await;
    fixture
        .accounts
        .add_member(&context, BOB, "team-x", CAROL, Role::User)
        .await
        .unwrap();
    let members = fixture
        .accounts
        .list_members(&context, BOB, "team-x")
        .await
        .unwrap();
    assert_eq!(
        members,
        vec![
            Member {
                identity: CAROL.into(),
                role: Role::User,
            },
            Member {
                identity: BOB.into(),
                role: Role::Admin,
            },
        ],
    );

    fixture
        .accounts
        .remove_member(&context, BOB, "team-x", CAROL, Role::User)
        .await
        .unwrap();
    let members = fixture
        .accounts
        .list_members(&context, BOB, "team-x")
        .await
        .unwrap();
    assert_eq!(
        members,
        vec![Member {
            identity: BOB.into(),
            role: Role::Admin,
        }],
    );
}

#[tokio::test]
async fn members_need_namespace_admin() {
    let context = Context::fixture();
    let fixture = team_x().await;
    let error = fixture
        .accounts
        .add_member(&context, CAROL, "team-x", CAROL, Role::Admin)
        .await
        .unwrap_err();
    assert!(ErrorKind::PermissionDenied.matches(&error));
    let error = fixture
        .accounts
        .list_members(&context, CAROL, "team-x")
        .await
        .unwrap_err();
    assert!(ErrorKind::PermissionDenied.matches(&error));
    let error = fixture
        .accounts
        .remove_member(&context, CAROL, "team-x", BOB, Role::Admin)
        .await
        .unwrap_err();
    assert!(ErrorKind::PermissionDenied.matches(&error));
}

#[tokio::test]
async fn members_must_be_registered() {
    let context = Context::fixture();
    let fixture = team_x().await;
    let error = fixture
        .accounts
        .add_member(&context, BOB, "team-x", ALICE, Role::User)
        .await
        .unwrap_err();
    assert!(ErrorKind::NotFound.matches(&error));
}

#[tokio::test]
async fn guest_is_not_a_member_role() {
    let context = Context::fixture();
    let fixture = team_x().await;
    let error = fixture
        .accounts
        .add_member(&context, BOB, "team-x", CAROL, Role::Guest)
        .await
        .unwrap_err();
    assert!(ErrorKind::InvalidRole.matches(&error));
    let error = fixture
        .accounts
        .remove_member(&context, BOB, "team-x", CAROL, Role::Guest)
        .await
        .unwrap_err();
    assert!(ErrorKind::InvalidRole.matches(&error));
}

#[tokio::test]
async fn remove_unregistered_member() {
    let context = Context::fixture();
    let fixture = team_x().await;
    fixture
        .control_plane
        .insert_binding(kportal_controlplane::Binding::for_privilege(
            kportal_controlplane::Privilege::NamespaceEdit,
            kportal_controlplane::Scope::namespace("team-x"),
            vec![ALICE.to_string()],
        ));
    fixture
        .accounts
        .remove_member(&context, BOB, "team-x", ALICE, Role::User)
        .await
        .unwrap();
}
