use kportal_context::Context;
use kportal_errors::ErrorKind;
use kportal_registry::Role;

use super::fixture;
use super::register;
use super::ALICE;
use super::BOB;
use super::CAROL;
use super::ROOT;

#[tokio::test]
async fn admin_operations_need_admins() {
    let context = Context::fixture();
    let fixture = fixture();
    register(&fixture, ALICE, Role::User).await;
    register(&fixture, BOB, Role::Guest).await;

    let error = fixture.accounts.list(&context, ALICE).await.unwrap_err();
    assert!(ErrorKind::PermissionDenied.matches(&error));
    let error = fixture
        .accounts
        .search(&context, ALICE, "bob")
        .await
        .unwrap_err();
    assert!(ErrorKind::PermissionDenied.matches(&error));
    let error = fixture
        .accounts
        .set_role(&context, ALICE, BOB, Role::Admin)
        .await
        .unwrap_err();
    assert!(ErrorKind::PermissionDenied.matches(&error));
    let error = fixture
        .accounts
        .validate(&context, CAROL, BOB)
        .await
        .unwrap_err();
    assert!(ErrorKind::PermissionDenied.matches(&error));

    let bob = fixture.registry.lookup(&context, BOB).await.unwrap();
    assert_eq!(bob.role, Role::Guest);
}

#[tokio::test]
async fn registry_admin_sets_role() {
    let context = Context::fixture();
    let fixture = fixture();
    register(&fixture, ALICE, Role::Admin).await;
    register(&fixture, BOB, Role::Guest).await;
    let bob = fixture
        .accounts
        .set_role(&context, ALICE, BOB, Role::User)
        .await
        .unwrap();
    assert_eq!(bob.role, Role::User);
    let stored = fixture.registry.lookup(&context, BOB).await.unwrap();
    assert_eq!(stored.role, Role::User);
}

#[tokio::test]
async fn cluster_admin_sets_role() {
    let context = Context::fixture();
    let fixture = fixture();
    register(&fixture, BOB, Role::Guest).await;
    fixture
        .accounts
        .set_role(&context, ROOT, BOB, Role::Admin)
        .await
        .unwrap();
    let stored = fixture.registry.lookup(&context, BOB).await.unwrap();
    assert_eq!(stored.role, Role::Admin);
}

#[tokio::test]
async fn set_role_of_unknown_identity() {
    let context = Context::fixture();
    let fixture = fixture();
    let error = fixture
        .accounts
        .set_role(&context, ROOT, BOB, Role::User)
        .await
        .unwrap_err();
    assert!(ErrorKind::NotFound.matches(&error));
}

#[tokio::test]
async fn validate_and_unvalidate() {
    let context = Context::fixture();
    let fixture = fixture();
    register(&fixture, BOB, Role::Guest).await;
    register(&fixture, CAROL, Role::Admin).await;

    let bob = fixture.accounts.validate(&context, ROOT, BOB).await.unwrap();
    assert_eq!(bob.role, Role::User);
    let carol = fixture
        .accounts
        .validate(&context, ROOT, CAROL)
        .await
        .unwrap();
    assert_eq!(carol.role, Role::Admin);

    let bob = fixture
        .accounts
        .unvalidate(&context, ROOT, BOB)
        .await
        .unwrap();
    assert_eq!(bob.role, Role::Guest);
    let carol = fixture
        .accounts
        .unvalidate(&context, ROOT, CAROL)
        .await
        .unwrap();
    assert_eq!(carol.role, Role::Admin);
}

#[tokio::test]
async fn search_ignores_case() {
    let context = Context::fixture();
    let fixture = fixture();
    register(&fixture, ALICE, Role::Guest).await;
    register(&fixture, BOB, Role::Guest).await;

    let found = fixture
        .accounts
        .search(&context, ROOT, "ALI")
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, ALICE);

    let found = fixture
        .accounts
        .search(&context, ROOT, "EXAMPLE.com")
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
}

#[tokio::test]
async fn list_hides_credentials() {
    let context = Context::fixture();
    let fixture = fixture();
    let mut alice = register(&fixture, ALICE, Role::Guest).await;
    alice.credentials = Some("secret".into());
    fixture.registry.update(&context, alice).await.unwrap();

    let identities = fixture.accounts.list(&context, ROOT).await.unwrap();
    assert_eq!(identities.len(), 1);
    assert_eq!(identities[0].credentials, None);
}
