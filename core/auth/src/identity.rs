//! Determine which identity is performing a request.
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value as Json;

use kportal_context::Caller;
use kportal_context::Context;

/// Operations implemented by caller identification mechanisms supported by kportal.
#[async_trait::async_trait]
pub trait Authentication: Send + Sync {
    /// Determine the [`Caller`] performing a request.
    ///
    /// [`Authentication`] implementations must respect the following expectations:
    ///
    /// - Only trust identity information the deployment guarantees was not tampered with.
    /// - If identity information is not part of the request return [`Caller::Anonymous`].
    /// - If identity information is part of the request but not valid return an error.
    async fn authenticate(&self, context: &Context, transport: &dyn IdentityReader)
        -> Result<Caller>;
}

/// Initialisation logic for [`Authentication`] implementations.
pub trait AuthenticationFactory: Send + Sync {
    /// Validate the user provided configuration for the backend.
    fn conf_check(&self, context: &Context, conf: &Json) -> Result<()>;

    /// Initialise an [`Authenticator`] object.
    fn authenticator(&self, conf: &Json) -> Result<Authenticator>;
}

/// Determine the [`Caller`] performing requests.
#[derive(Clone)]
pub struct Authenticator {
    inner: Arc<dyn Authentication>,
}

impl Authenticator {
    /// Determine the [`Caller`] performing a request.
    ///
    /// For details see [`Authentication::authenticate`].
    pub async fn authenticate(
        &self,
        context: &Context,
        transport: &dyn IdentityReader,
    ) -> Result<Caller> {
        self.inner.authenticate(context, transport).await
    }
}

impl<T> From<T> for Authenticator
where
    T: Authentication + 'static,
{
    fn from(value: T) -> Self {
        let inner = Arc::new(value);
        Authenticator { inner }
    }
}

/// Read identity information from the transport of a request.
pub trait IdentityReader {
    /// Look for a metadata value with the given key.
    ///
    /// Returns `None` if the entry is missing or an `Err` if the metadata could
    /// not be read or decoded.
    ///
    /// For example in HTTP(S) requests metadata should be extracted from headers.
    fn metadata(&self, name: &str) -> Result<Option<&str>>;
}

#[cfg(feature = "actix-web")]
impl IdentityReader for actix_web::HttpRequest {
    fn metadata(&self, name: &str) -> Result<Option<&str>> {
        match self.headers().get(name) {
            None => Ok(None),
            Some(header) => {
                let value = header.to_str()?;
                Ok(Some(value))
            }
        }
    }
}
