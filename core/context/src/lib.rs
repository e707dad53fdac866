//! The [`Context`] is a general purpose immutable container to carry scoped values around.
//!
//! Code executed as part of kportal processes can access operation scoped values.
//!
//! Contexts are organised into a tree structure:
//!
//! - A root context represents the general process wide scope.
//! - Derived contexts represents a narrower scope within their parent with additional
//!   or updated information attached to them.
//!
//! For example: [`Context`]s provide access to the current [`Logger`].
//! For the root context this is the process-wide logger with no additional attributes.
//! For HTTP requests a derived context carries the authenticated [`Caller`] and a
//! [`Logger`] decorated with the request trace ID.
use std::future::Ready;

use actix_web::dev::Payload;
use actix_web::Error;
use actix_web::FromRequest;
use actix_web::HttpMessage;
use actix_web::HttpRequest;
use opentelemetry_api::trace::TraceContextExt;
use opentelemetry_api::trace::TraceId;
use opentelemetry_api::Context as OtelContext;
use serde::Deserialize;
use serde::Serialize;
use slog::Logger;
use slog::OwnedKV;
use slog::SendSyncRefUnwindSafeKV;

/// Entity on whose behalf an operation is performed.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Caller {
    /// No identity information was attached to the operation.
    #[default]
    Anonymous,

    /// A portal identity, by `issuer#subject` ID.
    Identity(String),

    /// The process itself, for example the background controller.
    System,
}

/// The [`Context`] is a general purpose container to carry scoped values around.
///
/// Refer to the [crate level docs](crate) for details.
#[derive(Clone, Debug)]
pub struct Context {
    /// Entity the current operation is performed for.
    pub caller: Caller,

    /// Logger with contextual attributes attached to it.
    pub logger: Logger,
}

impl Context {
    /// Derive a new [`Context`] by making changes to the current one.
    pub fn derive(&self) -> ContextBuilder {
        ContextBuilder {
            caller: self.caller.clone(),
            logger: self.logger.clone(),
        }
    }

    /// Derive a new [`Context`] by making changes to the current one using the provided callback.
    pub fn derive_with<F>(&self, callback: F) -> Context
    where
        F: FnOnce(ContextBuilder) -> ContextBuilder,
    {
        let builder = callback(self.derive());
        builder.build()
    }

    /// ID of the portal identity performing the operation, if any.
    pub fn identity(&self) -> Option<&str> {
        match &self.caller {
            Caller::Identity(id) => Some(id),
            _ => None,
        }
    }

    /// Initialise a new root context with no values attached.
    pub fn root(logger: Logger) -> ContextBuilder {
        ContextBuilder {
            caller: Caller::Anonymous,
            logger,
        }
    }
}

impl FromRequest for Context {
    type Error = Error;
    type Future = Ready<std::result::Result<Self, Self::Error>>;

    fn from_request(request: &HttpRequest, _: &mut Payload) -> Self::Future {
        let context = request
            .extensions()
            .get::<Context>()
            .expect("request has no context to extract")
            .clone();
        std::future::ready(Ok(context))
    }
}

/// A builder for root and derived contexts.
pub struct ContextBuilder {
    caller: Caller,
    logger: Logger,
}

impl ContextBuilder {
    /// Mark the context to be created as performed on behalf of the given caller.
    ///
    /// Identity callers are also attached to the context logger.
    pub fn authenticated(mut self, caller: Caller) -> Self {
        if let Caller::Identity(id) = &caller {
            self.logger = self.logger.new(slog::o!("identity" => id.clone()));
        }
        self.caller = caller;
        self
    }

    /// Finalise the build process and return a new [`Context`].
    pub fn build(self) -> Context {
        Context {
            caller: self.caller,
            logger: self.logger,
        }
    }

    /// Decorate the [`Context`]'s logger with the trace ID of the current OpenTelemetry span.
    ///
    /// [`Context`]: super::Context
    pub fn log_trace(self) -> Self {
        let context = OtelContext::current();
        let span = context.span();
        let trace_id = span.span_context().trace_id();
        if trace_id == TraceId::INVALID {
            self
        } else {
            let trace_id = trace_id.to_string();
            self.log_values(slog::o!("trace_id" => trace_id))
        }
    }

    /// Update the [`Context`] logger to attach new log key/pair values.
    pub fn log_values<T>(mut self, entries: OwnedKV<T>) -> Self
    where
        T: SendSyncRefUnwindSafeKV + 'static,
    {
        self.logger = self.logger.new(entries);
        self
    }
}

#[cfg(any(test, feature = "test-fixture"))]
impl Context {
    /// Create an empty context useful for test.
    pub fn fixture() -> Context {
        let logger = Logger::root(slog::Discard, slog::o!());
        Context {
            caller: Caller::Anonymous,
            logger,
        }
    }

    /// Create a context for the given identity useful for test.
    pub fn fixture_for(identity: &str) -> Context {
        Context::fixture()
            .derive()
            .authenticated(Caller::Identity(identity.to_string()))
            .build()
    }
}
