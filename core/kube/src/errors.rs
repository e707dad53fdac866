//! Classify API server errors with the portal error taxonomy.
use kportal_errors::AlreadyExists;
use kportal_errors::Conflict;
use kportal_errors::NotFound;
use kportal_errors::Unavailable;

const SERVICE: &str = "kubernetes api server";

/// Convert a client error into a classified error about the named object.
pub fn classify(
    error: kube::Error,
    kind: &'static str,
    name: &str,
    operation: &'static str,
) -> anyhow::Error {
    let classified = match &error {
        kube::Error::Api(response) => match response.code {
            404 => Some(anyhow::anyhow!(NotFound::new(kind, name))),
            409 if response.reason == "AlreadyExists" => {
                Some(anyhow::anyhow!(AlreadyExists::new(kind, name)))
            }
            409 => Some(anyhow::anyhow!(Conflict::new(kind, name))),
            429 | 500..=599 => Some(anyhow::anyhow!(Unavailable::new(SERVICE, operation))),
            _ => None,
        },
        kube::Error::HyperError(_) | kube::Error::Service(_) => {
            Some(anyhow::anyhow!(Unavailable::new(SERVICE, operation)))
        }
        _ => None,
    };
    match classified {
        Some(classified) => classified.context(error.to_string()),
        None => anyhow::Error::new(error),
    }
}

#[cfg(test)]
mod tests {
    use kube::error::ErrorResponse;

    use kportal_errors::ErrorKind;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: "test".into(),
            reason: reason.into(),
            code,
        })
    }

    #[test]
    fn classify_api_errors() {
        let cases = [
            (404, "NotFound", Some(ErrorKind::NotFound)),
            (409, "AlreadyExists", Some(ErrorKind::AlreadyExists)),
            (409, "Conflict", Some(ErrorKind::Conflict)),
            (503, "ServiceUnavailable", Some(ErrorKind::Unavailable)),
            (429, "TooManyRequests", Some(ErrorKind::Unavailable)),
            (403, "Forbidden", None),
            (422, "Invalid", None),
        ];
        for (code, reason, expected) in cases {
            let error = super::classify(api_error(code, reason), "binding", "b", "get binding");
            assert_eq!(ErrorKind::of(&error), expected, "{} {}", code, reason);
        }
    }
}
