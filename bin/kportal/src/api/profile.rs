//! Report details about the caller.
use actix_web::web::Data;
use actix_web::HttpResponse;

use replisdk::utils::actix::error::Error;

use kportal_context::Context;
use kportal_injector::Injector;

#[actix_web::get("/profile")]
pub async fn profile(context: Context, injector: Data<Injector>) -> Result<HttpResponse, Error> {
    let caller = super::caller(&context)?;
    let profile = injector
        .accounts
        .profile(&context, caller)
        .await
        .map_err(super::error)?;
    Ok(HttpResponse::Ok().json(profile))
}
