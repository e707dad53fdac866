//! Identify callers from a header set by a trusted session layer.
//!
//! The portal sits behind a session layer that completes the login flow with the
//! identity provider and forwards requests with the ID of the logged in identity attached.
//! Requests must not be able to reach the portal without passing through that layer.
use anyhow::Result;
use serde::Deserialize;
use serde_json::Value as Json;

use kportal_context::Caller;
use kportal_context::Context;

use super::Authentication;
use super::AuthenticationFactory;
use super::Authenticator;
use super::IdentityReader;

/// The identity header does not carry a valid `issuer#subject` ID.
#[derive(Debug, thiserror::Error)]
#[error("the identity header '{header}' does not carry a valid identity ID")]
pub struct InvalidIdentityHeader {
    pub header: String,
}

/// Configuration options for the [`TrustedHeader`] backend.
#[derive(Clone, Debug, Deserialize)]
pub struct TrustedHeaderConf {
    /// Name of the header carrying the identity ID.
    pub identity_header: String,
}

/// Identify callers from the value of a header.
pub struct TrustedHeader {
    header: String,
}

impl TrustedHeader {
    pub fn new<S: Into<String>>(header: S) -> TrustedHeader {
        TrustedHeader {
            header: header.into(),
        }
    }
}

#[async_trait::async_trait]
impl Authentication for TrustedHeader {
    async fn authenticate(&self, _: &Context, transport: &dyn IdentityReader) -> Result<Caller> {
        let value = match transport.metadata(&self.header)? {
            None => return Ok(Caller::Anonymous),
            Some(value) => value.trim(),
        };
        match value.split_once('#') {
            Some((issuer, subject)) if !issuer.is_empty() && !subject.is_empty() => {
                Ok(Caller::Identity(value.to_string()))
            }
            _ => anyhow::bail!(InvalidIdentityHeader {
                header: self.header.clone(),
            }),
        }
    }
}

/// Initialise [`TrustedHeader`] authenticators.
pub struct TrustedHeaderFactory;

impl AuthenticationFactory for TrustedHeaderFactory {
    fn conf_check(&self, _: &Context, conf: &Json) -> Result<()> {
        serde_json::from_value::<TrustedHeaderConf>(conf.clone())?;
        Ok(())
    }

    fn authenticator(&self, conf: &Json) -> Result<Authenticator> {
        let conf: TrustedHeaderConf = serde_json::from_value(conf.clone())?;
        Ok(Authenticator::from(TrustedHeader::new(conf.identity_header)))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use anyhow::Result;

    use kportal_context::Caller;
    use kportal_context::Context;

    use super::InvalidIdentityHeader;
    use super::TrustedHeader;
    use crate::IdentityReader;

    #[derive(Default)]
    struct Headers(HashMap<String, String>);

    impl IdentityReader for Headers {
        fn metadata(&self, name: &str) -> Result<Option<&str>> {
            Ok(self.0.get(name).map(String::as_str))
        }
    }

    fn headers(value: &str) -> Headers {
        let mut headers = Headers::default();
        headers.0.insert("X-Portal-Identity".into(), value.into());
        headers
    }

    #[tokio::test]
    async fn anonymous_without_header() {
        let context = Context::fixture();
        let auth = TrustedHeader::new("X-Portal-Identity");
        let caller = crate::Authentication::authenticate(&auth, &context, &Headers::default())
            .await
            .unwrap();
        assert_eq!(caller, Caller::Anonymous);
    }

    #[tokio::test]
    async fn identity_from_header() {
        let context = Context::fixture();
        let auth = crate::Authenticator::from(TrustedHeader::new("X-Portal-Identity"));
        let caller = auth
            .authenticate(&context, &headers("https://idp.example#alice"))
            .await
            .unwrap();
        assert_eq!(caller, Caller::Identity("https://idp.example#alice".into()));
    }

    #[tokio::test]
    async fn reject_malformed_id() {
        let context = Context::fixture();
        let auth = crate::Authenticator::from(TrustedHeader::new("X-Portal-Identity"));
        let error = auth
            .authenticate(&context, &headers("alice"))
            .await
            .unwrap_err();
        assert!(error.is::<InvalidIdentityHeader>());
    }
}
