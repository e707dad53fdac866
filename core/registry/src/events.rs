//! Typed change notifications produced by registry subscriptions.
use anyhow::Result;
use futures::stream::BoxStream;

use super::Identity;

/// Stream of changes to identity records, as returned by [`Registry::watch`].
///
/// [`Registry::watch`]: super::Registry::watch
pub type RegistryEventStream = BoxStream<'static, Result<RegistryEvent>>;

/// A change to an identity record in the registry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RegistryEvent {
    /// A new identity was registered.
    Added(Identity),

    /// An identity record changed, carrying the record before and after the change.
    Updated(Identity, Identity),

    /// An identity record was removed from the registry.
    Deleted(Identity),
}

impl RegistryEvent {
    /// Most recent known state of the identity the event is about.
    pub fn identity(&self) -> &Identity {
        match self {
            RegistryEvent::Added(identity) => identity,
            RegistryEvent::Updated(_, identity) => identity,
            RegistryEvent::Deleted(identity) => identity,
        }
    }

    /// Short label of the event type, for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RegistryEvent::Added(_) => "added",
            RegistryEvent::Updated(_, _) => "updated",
            RegistryEvent::Deleted(_) => "deleted",
        }
    }
}

/// The subscription fell behind and some changes were dropped.
#[derive(Debug, thiserror::Error)]
#[error("the registry subscription skipped {0} changes")]
pub struct WatchLagged(pub u64);
