//! Self-service namespace creation and deletion.
use actix_web::web::Data;
use actix_web::web::Json;
use actix_web::web::Path;
use actix_web::HttpResponse;
use serde::Deserialize;

use replisdk::utils::actix::error::Error;

use kportal_context::Context;
use kportal_injector::Injector;

/// Request to create a namespace.
#[derive(Debug, Deserialize)]
pub struct CreateNamespace {
    pub name: String,
}

/// Create a namespace administered by the caller.
#[actix_web::post("/namespaces")]
pub async fn create(
    context: Context,
    injector: Data<Injector>,
    request: Json<CreateNamespace>,
) -> Result<HttpResponse, Error> {
    let caller = super::caller(&context)?;
    let namespace = injector
        .lifecycle
        .create_namespace(&context, &request.name, caller)
        .await
        .map_err(super::error)?;
    Ok(HttpResponse::Created().json(namespace))
}

/// Delete a namespace administered by the caller.
#[actix_web::delete("/namespaces/{name}")]
pub async fn delete(
    context: Context,
    injector: Data<Injector>,
    path: Path<String>,
) -> Result<HttpResponse, Error> {
    let caller = super::caller(&context)?;
    injector
        .lifecycle
        .delete_namespace(&context, &path, caller)
        .await
        .map_err(super::error)?;
    Ok(super::done())
}
