//! ActixWeb Middleware to attach [`Context`] objects to requests.
use std::future::Ready;
use std::sync::Arc;

use actix_web::dev::forward_ready;
use actix_web::dev::Service;
use actix_web::dev::ServiceRequest;
use actix_web::dev::ServiceResponse;
use actix_web::dev::Transform;
use actix_web::http::StatusCode;
use actix_web::web::Data;
use actix_web::Error;
use actix_web::HttpMessage;
use anyhow::Result;
use futures_util::future::LocalBoxFuture;

use kportal_auth::Authenticator;
use kportal_context::Context;
use kportal_context::ContextBuilder;

/// Derive a per-request [`Context`] and attach it to requests before they are handled.
pub struct ContextService<S> {
    authenticator: Authenticator,
    config: ContextConfig,
    root: Context,
    service: Arc<S>,
}

impl<S, B> Service<ServiceRequest> for ContextService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, request: ServiceRequest) -> Self::Future {
        // Extract root context and optional middleware configuration.
        let root = request.app_data::<Data<Context>>();
        let config = request
            .app_data::<Data<ContextConfig>>()
            .map(|data| data.as_ref())
            .unwrap_or(&self.config)
            .clone();

        // Derive the per-request context.
        let context = root
            .map(|root| root.derive())
            .unwrap_or_else(|| self.root.derive());
        let pcontext = root
            .map(|root| root.as_ref().clone())
            .unwrap_or_else(|| self.root.clone());

        // Delay invoking the service so we can configure the request asynchronously.
        let authenticator = self.authenticator.clone();
        let service = Arc::clone(&self.service);
        Box::pin(async move {
            let context = context_derive_logging(context, &config);
            let context = context_derive_auth(authenticator, &pcontext, context, &request)
                .await
                .map_err(|error| {
                    replisdk::utils::actix::error::Error::with_status(
                        StatusCode::UNAUTHORIZED,
                        error,
                    )
                })?;
            let context = context.build();

            // Attach the derived context to the request.
            request.extensions_mut().insert(context);

            // Proceed to the wrapped service and handle the request.
            let service = service.call(request);
            service.await
        })
    }
}

/// Wrap an [`App`](actix_web::App) with a middleware that derives per-request contexts.
#[derive(Clone)]
pub struct ContextMiddleware {
    authenticator: Authenticator,
    config: ContextConfig,
    root: Context,
}

impl ContextMiddleware {
    /// Initialise a [`ContextMiddleware`] with a root [`Context`] to use as a fallback.
    pub fn new(root: Context, authenticator: Authenticator) -> Self {
        let config = ContextConfig::default();
        Self {
            authenticator,
            config,
            root,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for ContextMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = ContextService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        let middleware = ContextService {
            authenticator: self.authenticator.clone(),
            config: self.config.clone(),
            root: self.root.clone(),
            service: Arc::new(service),
        };
        std::future::ready(Ok(middleware))
    }
}

/// Configuration of the per-request [`Context`] derivation process.
#[derive(Clone, Debug)]
pub struct ContextConfig {
    /// Enable adding the current trace ID to logs (if a trace ID is available).
    pub add_trace_id: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        ContextConfig { add_trace_id: true }
    }
}

/// Attach the caller identified by the authenticator to the derived context.
async fn context_derive_auth(
    authenticator: Authenticator,
    pcontext: &Context,
    context: ContextBuilder,
    request: &ServiceRequest,
) -> Result<ContextBuilder> {
    let caller = authenticator
        .authenticate(pcontext, request.request())
        .await?;
    Ok(context.authenticated(caller))
}

/// Configure logging options for the derived context.
fn context_derive_logging(context: ContextBuilder, config: &ContextConfig) -> ContextBuilder {
    if config.add_trace_id {
        context.log_trace()
    } else {
        context
    }
}
