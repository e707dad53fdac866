use actix_web::http::StatusCode;
use actix_web::test::call_service;
use actix_web::test::init_service;
use actix_web::test::read_body_json;
use actix_web::test::TestRequest;
use actix_web::App;
use serde_json::json;
use serde_json::Value;

use kportal_context::Context;
use kportal_controlplane::Binding;
use kportal_controlplane::Privilege;
use kportal_controlplane::Scope;
use kportal_injector::Injector;
use kportal_injector::InjectorFixture;
use kportal_registry::Identity;
use kportal_registry::Role;

use super::context::ContextMiddleware;

const HEADER: &str = "X-Portal-Identity";
const BOB: &str = "iss#bob";
const CAROL: &str = "iss#carol";
const DAVE: &str = "iss#dave";
const ROOT: &str = "iss#root";

/// Initialise the API as served by the process, on top of in-memory services.
macro_rules! app {
    ($fixture:expr) => {{
        let injector = $fixture.injector.clone();
        let middleware =
            ContextMiddleware::new(injector.context.clone(), injector.authenticator.clone());
        let app = App::new()
            .configure(move |config| super::configure_with(config, injector.clone()))
            .wrap(middleware);
        init_service(app).await
    }};
}

async fn fixture() -> InjectorFixture {
    let fixture = Injector::fixture();
    fixture.control_plane.insert_namespace("default");
    fixture.control_plane.insert_binding(Binding::for_privilege(
        Privilege::ClusterAdmin,
        Scope::Cluster,
        vec![ROOT.to_string()],
    ));
    for (id, role) in [(BOB, Role::User), (CAROL, Role::User), (DAVE, Role::Guest)] {
        let name = id.trim_start_matches("iss#");
        let identity = Identity::new(id, format!("{}@example.com", name), name).with_role(role);
        fixture
            .injector
            .registry
            .create(&Context::fixture(), identity)
            .await
            .unwrap();
    }
    fixture
}

#[actix_web::test]
async fn login_issues_download_token() {
    let fixture = fixture().await;
    let app = app!(fixture);

    let request = TestRequest::post()
        .uri("/api/v0/login")
        .set_json(json!({
            "issuer": "https://idp.example",
            "subject": "alice",
            "email": "alice@ucsd.edu",
            "name": "Alice",
            "credentials": "kubeconfig-of-alice",
        }))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let outcome: Value = read_body_json(response).await;
    assert_eq!(outcome["identity"]["id"], "https://idp.example#alice");
    assert_eq!(outcome["identity"]["role"], "guest");
    assert_eq!(outcome["identity"].get("credentials"), None);
    assert_eq!(outcome["namespace"], "ucsd-edu");

    let token = outcome["token"].as_str().unwrap();
    let uri = format!("/api/v0/credentials/{}", token);
    let request = TestRequest::get()
        .uri(&uri)
        .insert_header((HEADER, "https://idp.example#alice"))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = read_body_json(response).await;
    assert_eq!(body["credentials"], "kubeconfig-of-alice");

    let request = TestRequest::get()
        .uri(&uri)
        .insert_header((HEADER, "https://idp.example#alice"))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn login_rejects_invalid_claims() {
    let fixture = fixture().await;
    let app = app!(fixture);
    let request = TestRequest::post()
        .uri("/api/v0/login")
        .set_json(json!({
            "issuer": "",
            "subject": "alice",
            "email": "alice@ucsd.edu",
            "name": "Alice",
        }))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn login_matches_header_identity() {
    let fixture = fixture().await;
    let app = app!(fixture);
    let claims = json!({
        "issuer": "iss",
        "subject": "bob",
        "email": "mallory@ucsd.edu",
        "name": "Mallory",
    });
    let request = TestRequest::post()
        .uri("/api/v0/login")
        .insert_header((HEADER, CAROL))
        .set_json(&claims)
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let stored = fixture
        .injector
        .registry
        .lookup(&Context::fixture(), BOB)
        .await
        .unwrap();
    assert_eq!(stored.email, "bob@example.com");

    let request = TestRequest::post()
        .uri("/api/v0/login")
        .insert_header((HEADER, BOB))
        .set_json(&claims)
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[actix_web::test]
async fn anonymous_callers_are_rejected() {
    let fixture = fixture().await;
    let app = app!(fixture);
    let requests = [
        TestRequest::get().uri("/api/v0/profile"),
        TestRequest::get().uri("/api/v0/users"),
        TestRequest::post()
            .uri("/api/v0/namespaces")
            .set_json(json!({"name": "team-x"})),
    ];
    for request in requests {
        let response = call_service(&app, request.to_request()).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

#[actix_web::test]
async fn namespace_creation_is_first_come() {
    let fixture = fixture().await;
    let app = app!(fixture);

    let request = TestRequest::post()
        .uri("/api/v0/namespaces")
        .insert_header((HEADER, BOB))
        .set_json(json!({"name": "team-x"}))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let namespace: Value = read_body_json(response).await;
    assert_eq!(namespace["name"], "team-x");

    let request = TestRequest::post()
        .uri("/api/v0/namespaces")
        .insert_header((HEADER, CAROL))
        .set_json(json!({"name": "team-x"}))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let request = TestRequest::get()
        .uri("/api/v0/profile")
        .insert_header((HEADER, BOB))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let profile: Value = read_body_json(response).await;
    assert_eq!(
        profile["memberships"],
        json!([{"namespace": "team-x", "privilege": "namespace-admin"}]),
    );

    let request = TestRequest::delete()
        .uri("/api/v0/namespaces/team-x")
        .insert_header((HEADER, CAROL))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let request = TestRequest::delete()
        .uri("/api/v0/namespaces/team-x")
        .insert_header((HEADER, BOB))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[actix_web::test]
async fn namespace_creation_errors() {
    let fixture = fixture().await;
    let app = app!(fixture);
    let cases = [
        ("default", StatusCode::FORBIDDEN),
        ("kube-system", StatusCode::FORBIDDEN),
        ("Team X", StatusCode::BAD_REQUEST),
    ];
    for (name, status) in cases {
        let request = TestRequest::post()
            .uri("/api/v0/namespaces")
            .insert_header((HEADER, BOB))
            .set_json(json!({ "name": name }))
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), status, "{}", name);
    }
}

#[actix_web::test]
async fn namespace_admins_manage_members() {
    let fixture = fixture().await;
    let app = app!(fixture);
    let request = TestRequest::post()
        .uri("/api/v0/namespaces")
        .insert_header((HEADER, BOB))
        .set_json(json!({"name": "team-x"}))
        .to_request();
    call_service(&app, request).await;

    let request = TestRequest::put()
        .uri("/api/v0/namespaces/team-x/members/user")
        .insert_header((HEADER, BOB))
        .set_json(json!({ "identity": CAROL }))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let request = TestRequest::get()
        .uri("/api/v0/namespaces/team-x/members")
        .insert_header((HEADER, BOB))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let members: Value = read_body_json(response).await;
    assert_eq!(
        members,
        json!([
            {"identity": CAROL, "role": "user"},
            {"identity": BOB, "role": "admin"},
        ]),
    );

    let request = TestRequest::get()
        .uri("/api/v0/namespaces/team-x/members")
        .insert_header((HEADER, CAROL))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let request = TestRequest::delete()
        .uri("/api/v0/namespaces/team-x/members/user/iss%23carol")
        .insert_header((HEADER, BOB))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let binding = fixture.control_plane.binding(
        &Scope::namespace("team-x"),
        &Privilege::NamespaceEdit.binding_name(),
    );
    assert_eq!(binding, None);
}

#[actix_web::test]
async fn member_errors() {
    let fixture = fixture().await;
    let app = app!(fixture);
    let request = TestRequest::post()
        .uri("/api/v0/namespaces")
        .insert_header((HEADER, BOB))
        .set_json(json!({"name": "team-x"}))
        .to_request();
    call_service(&app, request).await;

    let cases = [
        ("guest", CAROL, StatusCode::BAD_REQUEST),
        ("superuser", CAROL, StatusCode::BAD_REQUEST),
        ("user", "iss#nobody", StatusCode::NOT_FOUND),
    ];
    for (role, identity, status) in cases {
        let uri = format!("/api/v0/namespaces/team-x/members/{}", role);
        let request = TestRequest::put()
            .uri(&uri)
            .insert_header((HEADER, BOB))
            .set_json(json!({ "identity": identity }))
            .to_request();
        let response = call_service(&app, request).await;
        assert_eq!(response.status(), status, "{} {}", role, identity);
    }
}

#[actix_web::test]
async fn admins_list_and_search_users() {
    let fixture = fixture().await;
    let app = app!(fixture);

    let request = TestRequest::get()
        .uri("/api/v0/users")
        .insert_header((HEADER, ROOT))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let users: Value = read_body_json(response).await;
    assert_eq!(users.as_array().unwrap().len(), 3);

    let request = TestRequest::get()
        .uri("/api/v0/users?term=CAR")
        .insert_header((HEADER, ROOT))
        .to_request();
    let response = call_service(&app, request).await;
    let users: Value = read_body_json(response).await;
    let ids: Vec<&str> = users
        .as_array()
        .unwrap()
        .iter()
        .map(|user| user["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![CAROL]);

    let request = TestRequest::get()
        .uri("/api/v0/users")
        .insert_header((HEADER, BOB))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn admins_change_roles() {
    let fixture = fixture().await;
    let app = app!(fixture);

    let request = TestRequest::put()
        .uri("/api/v0/users/iss%23carol/role")
        .insert_header((HEADER, ROOT))
        .set_json(json!({"role": "admin"}))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let user: Value = read_body_json(response).await;
    assert_eq!(user["role"], "admin");

    let request = TestRequest::post()
        .uri("/api/v0/users/iss%23dave/validate")
        .insert_header((HEADER, CAROL))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let user: Value = read_body_json(response).await;
    assert_eq!(user["role"], "user");

    let request = TestRequest::post()
        .uri("/api/v0/users/iss%23dave/unvalidate")
        .insert_header((HEADER, BOB))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let request = TestRequest::put()
        .uri("/api/v0/users/iss%23nobody/role")
        .insert_header((HEADER, ROOT))
        .set_json(json!({"role": "user"}))
        .to_request();
    let response = call_service(&app, request).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
