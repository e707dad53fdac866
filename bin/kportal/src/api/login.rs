//! Login and credential download endpoints.
use actix_web::web::Data;
use actix_web::web::Json;
use actix_web::web::Path;
use actix_web::HttpResponse;

use replisdk::utils::actix::error::Error;

use kportal_accounts::Claims;
use kportal_context::Context;
use kportal_errors::PermissionDenied;
use kportal_injector::Injector;

/// Register or refresh the identity described by claims verified by the session layer.
///
/// Requests that already carry an identity can only log in as that identity.
#[actix_web::post("/login")]
pub async fn login(
    context: Context,
    injector: Data<Injector>,
    claims: Json<Claims>,
) -> Result<HttpResponse, Error> {
    let claims = claims.into_inner();
    if let Some(identity) = context.identity() {
        if identity != claims.id() {
            let error = PermissionDenied::new(identity, "log in as", claims.id());
            return Err(super::error(anyhow::anyhow!(error)));
        }
    }
    let outcome = injector
        .accounts
        .login(&context, claims)
        .await
        .map_err(super::error)?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// Exchange a one-time download token for credential material.
#[actix_web::get("/credentials/{token}")]
pub async fn credentials(
    context: Context,
    injector: Data<Injector>,
    path: Path<String>,
) -> Result<HttpResponse, Error> {
    super::caller(&context)?;
    let credentials = injector
        .accounts
        .download(&context, &path)
        .map_err(super::error)?;
    let response = serde_json::json!({ "credentials": credentials });
    Ok(HttpResponse::Ok().json(response))
}
