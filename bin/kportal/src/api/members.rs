//! Namespace membership management by namespace administrators.
//!
//! Identity IDs in paths are percent-encoded, in particular the `#` separator.
use actix_web::web::Data;
use actix_web::web::Json;
use actix_web::web::Path;
use actix_web::HttpResponse;
use serde::Deserialize;

use replisdk::utils::actix::error::Error;

use kportal_context::Context;
use kportal_injector::Injector;
use kportal_registry::Role;

/// Request to grant an identity a role within a namespace.
#[derive(Debug, Deserialize)]
pub struct AddMember {
    pub identity: String,
}

/// Parse an application role from a request path.
fn role(role: &str) -> Result<Role, Error> {
    role.parse::<Role>()
        .map_err(|error| super::error(anyhow::anyhow!(error)))
}

#[actix_web::put("/namespaces/{name}/members/{role}")]
pub async fn add(
    context: Context,
    injector: Data<Injector>,
    path: Path<(String, String)>,
    request: Json<AddMember>,
) -> Result<HttpResponse, Error> {
    let caller = super::caller(&context)?;
    let (namespace, role_name) = path.into_inner();
    let role = role(&role_name)?;
    injector
        .accounts
        .add_member(&context, caller, &namespace, &request.identity, role)
        .await
        .map_err(super::error)?;
    Ok(super::done())
}

#[actix_web::get("/namespaces/{name}/members")]
pub async fn list(
    context: Context,
    injector: Data<Injector>,
    path: Path<String>,
) -> Result<HttpResponse, Error> {
    let caller = super::caller(&context)?;
    let members = injector
        .accounts
        .list_members(&context, caller, &path)
        .await
        .map_err(super::error)?;
    Ok(HttpResponse::Ok().json(members))
}

#[actix_web::delete("/namespaces/{name}/members/{role}/{identity:.+}")]
pub async fn remove(
    context: Context,
    injector: Data<Injector>,
    path: Path<(String, String, String)>,
) -> Result<HttpResponse, Error> {
    let caller = super::caller(&context)?;
    let (namespace, role_name, identity) = path.into_inner();
    let role = role(&role_name)?;
    injector
        .accounts
        .remove_member(&context, caller, &namespace, &identity, role)
        .await
        .map_err(super::error)?;
    Ok(super::done())
}
