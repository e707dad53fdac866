//! API related tools (such as middlewares) and endpoints.
use actix_web::http::StatusCode;
use actix_web::web::Data;
use actix_web::web::ServiceConfig;
use actix_web::HttpResponse;

use replisdk::utils::actix::error::Error;

use kportal_context::Context;
use kportal_errors::ErrorKind;
use kportal_injector::Injector;

pub mod context;
mod login;
mod members;
mod namespaces;
mod profile;
mod users;

#[cfg(test)]
mod tests;

/// The request reached an endpoint that requires an identity without one.
#[derive(Debug, thiserror::Error)]
#[error("the request is not authenticated")]
pub struct Unauthenticated;

/// Configure an HTTP Server with all endpoints in this API module.
pub fn configure(config: &mut ServiceConfig) {
    let injector = Injector::global();
    configure_with(config, injector);
}

/// Configure an HTTP Server with all endpoints served with the given dependencies.
pub fn configure_with(config: &mut ServiceConfig, injector: Injector) {
    let scope = actix_web::web::scope("/api/v0")
        .app_data(Data::new(injector))
        .service(self::login::credentials)
        .service(self::login::login)
        .service(self::members::add)
        .service(self::members::list)
        .service(self::members::remove)
        .service(self::namespaces::create)
        .service(self::namespaces::delete)
        .service(self::profile::profile)
        .service(self::users::list)
        .service(self::users::set_role)
        .service(self::users::unvalidate)
        .service(self::users::validate);
    config.service(scope);
}

/// Return the ID of the identity performing the request, or a 401 error for other callers.
fn caller(context: &Context) -> Result<&str, Error> {
    context.identity().ok_or_else(|| {
        let error = anyhow::anyhow!(Unauthenticated);
        Error::with_status(StatusCode::UNAUTHORIZED, error)
    })
}

/// Empty response for successful operations with nothing to report.
fn done() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({}))
}

/// Convert operation errors into responses with a status code matching the error class.
fn error(error: anyhow::Error) -> Error {
    let status = match ErrorKind::of(&error) {
        Some(ErrorKind::AlreadyExists) => StatusCode::CONFLICT,
        Some(ErrorKind::Conflict) => StatusCode::CONFLICT,
        Some(ErrorKind::InvalidName) => StatusCode::BAD_REQUEST,
        Some(ErrorKind::InvalidRole) => StatusCode::BAD_REQUEST,
        Some(ErrorKind::NotFound) => StatusCode::NOT_FOUND,
        Some(ErrorKind::PermissionDenied) => StatusCode::FORBIDDEN,
        Some(ErrorKind::Protected) => StatusCode::FORBIDDEN,
        Some(ErrorKind::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
        None => return Error::from(error),
    };
    Error::with_status(status, error)
}
