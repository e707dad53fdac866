//! Error taxonomy shared by all kportal components.
//!
//! Errors are returned as [`anyhow::Error`]s wrapping one of the types in this crate.
//! Callers that need to branch on the error class use [`ErrorKind::of`], which inspects
//! the whole error chain so additional context does not hide the original error.
use std::future::Future;
use std::time::Duration;

use anyhow::Result;

/// An object the operation was going to create is already present.
#[derive(Debug, thiserror::Error)]
#[error("the {kind} '{name}' already exists")]
pub struct AlreadyExists {
    pub kind: &'static str,
    pub name: String,
}

impl AlreadyExists {
    /// An object the operation was going to create is already present.
    pub fn new<S: Into<String>>(kind: &'static str, name: S) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// A write was rejected because the stored object version no longer matches.
#[derive(Debug, thiserror::Error)]
#[error("the {kind} '{name}' was modified concurrently")]
pub struct Conflict {
    pub kind: &'static str,
    pub name: String,
}

impl Conflict {
    /// A write was rejected because the stored object version no longer matches.
    pub fn new<S: Into<String>>(kind: &'static str, name: S) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// A name does not satisfy the naming constraints of the object it identifies.
#[derive(Debug, thiserror::Error)]
#[error("the {kind} name '{name}' is not valid: {reason}")]
pub struct InvalidName {
    pub kind: &'static str,
    pub name: String,
    pub reason: &'static str,
}

impl InvalidName {
    /// A name does not satisfy the naming constraints of the object it identifies.
    pub fn new<S: Into<String>>(kind: &'static str, name: S, reason: &'static str) -> Self {
        Self {
            kind,
            name: name.into(),
            reason,
        }
    }
}

/// The requested application role is not valid for the operation.
#[derive(Debug, thiserror::Error)]
#[error("the role '{role}' can't be used to {action}")]
pub struct InvalidRole {
    pub action: &'static str,
    pub role: String,
}

impl InvalidRole {
    pub fn new<S: Into<String>>(role: S, action: &'static str) -> Self {
        Self {
            action,
            role: role.into(),
        }
    }
}

/// An expected object was not found.
#[derive(Debug, thiserror::Error)]
#[error("the {kind} '{name}' was not found")]
pub struct NotFound {
    pub kind: &'static str,
    pub name: String,
}

impl NotFound {
    /// An expected object was not found.
    pub fn new<S: Into<String>>(kind: &'static str, name: S) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// The identity is not allowed to perform the requested operation.
#[derive(Debug, thiserror::Error)]
#[error("identity '{identity}' is not allowed to {action} '{resource}'")]
pub struct PermissionDenied {
    pub action: &'static str,
    pub identity: String,
    pub resource: String,
}

impl PermissionDenied {
    /// The identity is not allowed to perform the requested operation.
    pub fn new<S1, S2>(identity: S1, action: &'static str, resource: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self {
            action,
            identity: identity.into(),
            resource: resource.into(),
        }
    }
}

/// The namespace is reserved and can't be managed through the portal.
#[derive(Debug, thiserror::Error)]
#[error("the namespace '{namespace}' is protected")]
pub struct Protected {
    pub namespace: String,
}

impl Protected {
    pub fn new<S: Into<String>>(namespace: S) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

/// An operation kept failing after the maximum number of retries.
#[derive(Debug, thiserror::Error)]
#[error("operation failed after {attempts} attempts")]
pub struct RetriesExceeded {
    pub attempts: u16,
}

impl RetriesExceeded {
    pub fn new(attempts: u16) -> Self {
        Self { attempts }
    }
}

/// A dependency could not be reached or did not respond in time.
#[derive(Debug, thiserror::Error)]
#[error("the {service} is unavailable while attempting to {operation}")]
pub struct Unavailable {
    pub operation: &'static str,
    pub service: &'static str,
}

impl Unavailable {
    /// A dependency could not be reached or did not respond in time.
    pub fn new(service: &'static str, operation: &'static str) -> Self {
        Self { operation, service }
    }
}

/// Classification of errors used to decide how to handle them.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    AlreadyExists,
    Conflict,
    InvalidName,
    InvalidRole,
    NotFound,
    PermissionDenied,
    Protected,
    Unavailable,
}

impl ErrorKind {
    /// Find the first classified error in the chain of the given error.
    ///
    /// A [`Conflict`] attached as context reclassifies the error it wraps.
    pub fn of(error: &anyhow::Error) -> Option<ErrorKind> {
        if error.is::<Conflict>() {
            return Some(ErrorKind::Conflict);
        }
        for cause in error.chain() {
            let kind = if cause.is::<AlreadyExists>() {
                ErrorKind::AlreadyExists
            } else if cause.is::<Conflict>() {
                ErrorKind::Conflict
            } else if cause.is::<InvalidName>() {
                ErrorKind::InvalidName
            } else if cause.is::<InvalidRole>() {
                ErrorKind::InvalidRole
            } else if cause.is::<NotFound>() {
                ErrorKind::NotFound
            } else if cause.is::<PermissionDenied>() {
                ErrorKind::PermissionDenied
            } else if cause.is::<Protected>() {
                ErrorKind::Protected
            } else if cause.is::<Unavailable>() {
                ErrorKind::Unavailable
            } else {
                continue;
            };
            return Some(kind);
        }

        // Other kinds attached as context are only visible through downcasting.
        if error.is::<AlreadyExists>() {
            Some(ErrorKind::AlreadyExists)
        } else if error.is::<NotFound>() {
            Some(ErrorKind::NotFound)
        } else if error.is::<PermissionDenied>() {
            Some(ErrorKind::PermissionDenied)
        } else if error.is::<Unavailable>() {
            Some(ErrorKind::Unavailable)
        } else {
            None
        }
    }

    /// Check if the given error is classified as this kind.
    pub fn matches(self, error: &anyhow::Error) -> bool {
        ErrorKind::of(error) == Some(self)
    }
}

/// Run an optimistic read-modify-write operation until it stops conflicting.
///
/// The operation is invoked at most `max_retries + 1` times.
/// Errors other than [`Conflict`] are returned immediately.
pub async fn retry_on_conflict<F, Fut, T>(max_retries: u16, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Err(error) if ErrorKind::Conflict.matches(&error) => {
                if attempt > max_retries {
                    return Err(error.context(RetriesExceeded::new(attempt)));
                }
            }
            result => return result,
        }
    }
}

/// Await an operation on an external service, failing with [`Unavailable`] past the deadline.
pub async fn with_deadline<Fut, T>(
    deadline: Duration,
    unavailable: Unavailable,
    operation: Fut,
) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(result) => result,
        Err(_) => anyhow::bail!(unavailable),
    }
}
