//! In-memory User Registry for development and unit tests.
//!
//! Records are lost when the process exits so this backend is not meant for production use.
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use anyhow::Result;
use futures::StreamExt;
use serde_json::Value as Json;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use kportal_context::Context;
use kportal_errors::AlreadyExists;
use kportal_errors::Conflict;
use kportal_errors::NotFound;
use kportal_errors::Unavailable;

use super::Identity;
use super::Registry;
use super::RegistryBackend;
use super::RegistryEvent;
use super::RegistryEventStream;
use super::RegistryFactory;
use super::RegistryFactoryArgs;
use super::WatchLagged;

/// Number of changes buffered for each subscriber.
const EVENTS_BUFFER: usize = 1024;

/// User Registry storing identity records in process memory.
#[derive(Clone)]
pub struct MemoryRegistry {
    events: broadcast::Sender<RegistryEvent>,
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    identities: BTreeMap<String, Identity>,
    last_version: u64,
    unavailable: u32,
}

impl MemoryState {
    fn next_version(&mut self) -> Option<String> {
        self.last_version += 1;
        Some(self.last_version.to_string())
    }

    fn check_available(&mut self, operation: &'static str) -> Result<()> {
        if self.unavailable > 0 {
            self.unavailable -= 1;
            anyhow::bail!(Unavailable::new("user registry", operation));
        }
        Ok(())
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self {
        let (events, _) = broadcast::channel(EVENTS_BUFFER);
        MemoryRegistry {
            events,
            state: Default::default(),
        }
    }
}

impl MemoryRegistry {
    /// Access the internal state of the registry.
    fn access(&self) -> MutexGuard<MemoryState> {
        self.state
            .lock()
            .expect("MemoryRegistry state lock poisoned")
    }

    /// Remove an identity record, as an administrator acting directly on the storage would.
    ///
    /// Returns the removed record, if any.
    pub fn delete(&self, id: &str) -> Option<Identity> {
        let removed = self.access().identities.remove(id);
        if let Some(identity) = &removed {
            let _ = self.events.send(RegistryEvent::Deleted(identity.clone()));
        }
        removed
    }

    /// Make the next `count` operations fail as if the registry was unreachable.
    pub fn fail_next(&self, count: u32) {
        self.access().unavailable = count;
    }

    /// Number of active change subscriptions.
    pub fn watchers(&self) -> usize {
        self.events.receiver_count()
    }
}

#[async_trait::async_trait]
impl RegistryBackend for MemoryRegistry {
    async fn create(&self, _: &Context, mut identity: Identity) -> Result<Identity> {
        let mut state = self.access();
        state.check_available("create identity")?;
        if state.identities.contains_key(&identity.id) {
            anyhow::bail!(AlreadyExists::new("identity", identity.id));
        }
        identity.version = state.next_version();
        state
            .identities
            .insert(identity.id.clone(), identity.clone());
        let _ = self.events.send(RegistryEvent::Added(identity.clone()));
        Ok(identity)
    }

    async fn get(&self, _: &Context, id: &str) -> Result<Option<Identity>> {
        let mut state = self.access();
        state.check_available("get identity")?;
        Ok(state.identities.get(id).cloned())
    }

    async fn list(&self, _: &Context) -> Result<Vec<Identity>> {
        let mut state = self.access();
        state.check_available("list identities")?;
        Ok(state.identities.values().cloned().collect())
    }

    async fn update(&self, _: &Context, mut identity: Identity) -> Result<Identity> {
        let mut state = self.access();
        state.check_available("update identity")?;
        let current = match state.identities.get(&identity.id) {
            None => anyhow::bail!(NotFound::new("identity", identity.id)),
            Some(current) => current.clone(),
        };
        if identity.version.is_some() && identity.version != current.version {
            anyhow::bail!(Conflict::new("identity", identity.id));
        }
        identity.version = state.next_version();
        state
            .identities
            .insert(identity.id.clone(), identity.clone());
        let _ = self
            .events
            .send(RegistryEvent::Updated(current, identity.clone()));
        Ok(identity)
    }

    async fn watch(&self, _: &Context) -> Result<RegistryEventStream> {
        self.access().check_available("watch identities")?;
        let receiver = self.events.subscribe();
        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            match receiver.recv().await {
                Ok(event) => Some((Ok(event), receiver)),
                Err(RecvError::Lagged(skipped)) => {
                    Some((Err(anyhow::anyhow!(WatchLagged(skipped))), receiver))
                }
                Err(RecvError::Closed) => None,
            }
        });
        Ok(stream.boxed())
    }
}

/// Initialise in-memory registries.
pub struct MemoryRegistryFactory;

#[async_trait::async_trait]
impl RegistryFactory for MemoryRegistryFactory {
    fn conf_check(&self, _: &Context, _: &Json) -> Result<()> {
        Ok(())
    }

    fn register_metrics(&self, _: &prometheus::Registry) -> Result<()> {
        Ok(())
    }

    async fn registry<'a>(&self, args: RegistryFactoryArgs<'a>) -> Result<Registry> {
        slog::warn!(
            args.context.logger,
            "Using the in-memory user registry: records will be lost on exit"
        );
        Ok(Registry::from(MemoryRegistry::default()))
    }

    async fn sync<'a>(&self, _: RegistryFactoryArgs<'a>) -> Result<()> {
        Ok(())
    }
}
