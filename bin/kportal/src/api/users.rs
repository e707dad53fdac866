//! Identity administration endpoints for portal administrators.
use actix_web::web::Data;
use actix_web::web::Json;
use actix_web::web::Path;
use actix_web::web::Query;
use actix_web::HttpResponse;
use serde::Deserialize;

use replisdk::utils::actix::error::Error;

use kportal_context::Context;
use kportal_injector::Injector;
use kportal_registry::Role;

/// Optional filter on listed identities.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub term: Option<String>,
}

/// Request to change the application role of an identity.
#[derive(Debug, Deserialize)]
pub struct SetRole {
    pub role: Role,
}

/// List all identities, or only those matching a search term.
#[actix_web::get("/users")]
pub async fn list(
    context: Context,
    injector: Data<Injector>,
    query: Query<ListQuery>,
) -> Result<HttpResponse, Error> {
    let caller = super::caller(&context)?;
    let identities = match query.term.as_deref() {
        Some(term) if !term.is_empty() => {
            injector.accounts.search(&context, caller, term).await
        }
        _ => injector.accounts.list(&context, caller).await,
    };
    let identities = identities.map_err(super::error)?;
    Ok(HttpResponse::Ok().json(identities))
}

#[actix_web::put("/users/{identity:.+}/role")]
pub async fn set_role(
    context: Context,
    injector: Data<Injector>,
    path: Path<String>,
    request: Json<SetRole>,
) -> Result<HttpResponse, Error> {
    let caller = super::caller(&context)?;
    let identity = injector
        .accounts
        .set_role(&context, caller, &path, request.role)
        .await
        .map_err(super::error)?;
    Ok(HttpResponse::Ok().json(identity))
}

/// Promote a guest to a user.
#[actix_web::post("/users/{identity:.+}/validate")]
pub async fn validate(
    context: Context,
    injector: Data<Injector>,
    path: Path<String>,
) -> Result<HttpResponse, Error> {
    let caller = super::caller(&context)?;
    let identity = injector
        .accounts
        .validate(&context, caller, &path)
        .await
        .map_err(super::error)?;
    Ok(HttpResponse::Ok().json(identity))
}

/// Demote a user back to a guest.
#[actix_web::post("/users/{identity:.+}/unvalidate")]
pub async fn unvalidate(
    context: Context,
    injector: Data<Injector>,
    path: Path<String>,
) -> Result<HttpResponse, Error> {
    let caller = super::caller(&context)?;
    let identity = injector
        .accounts
        .unvalidate(&context, caller, &path)
        .await
        .map_err(super::error)?;
    Ok(HttpResponse::Ok().json(identity))
}
