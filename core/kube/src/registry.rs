//! User Registry backed by `PortalUser` custom resources.
use std::collections::HashMap;
use std::collections::HashSet;

use anyhow::Result;
use futures::StreamExt;
use kube::api::Api;
use kube::api::ListParams;
use kube::api::PostParams;
use kube::runtime::watcher;
use kube::runtime::WatchStreamExt;

use kportal_context::Context;
use kportal_registry::object_name;
use kportal_registry::Identity;
use kportal_registry::RegistryBackend;
use kportal_registry::RegistryEvent;
use kportal_registry::RegistryEventStream;
use kportal_registry::WatchLagged;

use super::crd::PortalUser;
use super::errors::classify;

/// User Registry storing identity records as `PortalUser` custom resources.
#[derive(Clone)]
pub struct KubeRegistry {
    api: Api<PortalUser>,
}

impl KubeRegistry {
    pub fn new(client: kube::Client) -> KubeRegistry {
        KubeRegistry {
            api: Api::all(client),
        }
    }
}

#[async_trait::async_trait]
impl RegistryBackend for KubeRegistry {
    async fn create(&self, _: &Context, mut identity: Identity) -> Result<Identity> {
        identity.version = None;
        let name = identity.object_name();
        let user = PortalUser::from_identity(identity);
        let user = self
            .api
            .create(&PostParams::default(), &user)
            .await
            .map_err(|error| classify(error, "identity", &name, "create identity"))?;
        Ok(user.into_identity())
    }

    async fn get(&self, _: &Context, id: &str) -> Result<Option<Identity>> {
        let name = object_name(id);
        let user = self
            .api
            .get_opt(&name)
            .await
            .map_err(|error| classify(error, "identity", &name, "get identity"))?;
        // Distinct IDs can encode to the same object name.
        let identity = user
            .map(PortalUser::into_identity)
            .filter(|identity| identity.id == id);
        Ok(identity)
    }

    async fn list(&self, _: &Context) -> Result<Vec<Identity>> {
        let users = self
            .api
            .list(&ListParams::default())
            .await
            .map_err(|error| classify(error, "identity", "*", "list identities"))?;
        Ok(users.into_iter().map(PortalUser::into_identity).collect())
    }

    async fn update(&self, _: &Context, identity: Identity) -> Result<Identity> {
        let name = identity.object_name();
        let user = PortalUser::from_identity(identity);
        let user = self
            .api
            .replace(&name, &PostParams::default(), &user)
            .await
            .map_err(|error| classify(error, "identity", &name, "update identity"))?;
        Ok(user.into_identity())
    }

    async fn watch(&self, _: &Context) -> Result<RegistryEventStream> {
        let mut cache = EventCache::default();
        let events = watcher(self.api.clone(), watcher::Config::default())
            .default_backoff()
            .map(move |event| match event {
                Ok(event) => cache.apply(event),
                Err(error) => {
                    let error = anyhow::Error::new(error).context(WatchLagged(0));
                    vec![Err(error)]
                }
            })
            .flat_map(futures::stream::iter);
        Ok(events.boxed())
    }
}

/// Last known state of watched records, to emit typed change events.
#[derive(Default)]
struct EventCache {
    identities: HashMap<String, Identity>,
}

impl EventCache {
    /// Convert a watcher event into registry events, updating the cache.
    fn apply(&mut self, event: watcher::Event<PortalUser>) -> Vec<Result<RegistryEvent>> {
        match event {
            watcher::Event::Applied(user) => {
                let identity = user.into_identity();
                self.upsert(identity).into_iter().map(Ok).collect()
            }
            watcher::Event::Deleted(user) => {
                let identity = user.into_identity();
                self.identities.remove(&identity.id);
                vec![Ok(RegistryEvent::Deleted(identity))]
            }
            watcher::Event::Restarted(users) => {
                let mut seen = HashSet::new();
                let mut events = Vec::new();
                for user in users {
                    let identity = user.into_identity();
                    seen.insert(identity.id.clone());
                    events.extend(self.upsert(identity).map(Ok));
                }
                let removed: Vec<String> = self
                    .identities
                    .keys()
                    .filter(|id| !seen.contains(*id))
                    .cloned()
                    .collect();
                for id in removed {
                    if let Some(identity) = self.identities.remove(&id) {
                        events.push(Ok(RegistryEvent::Deleted(identity)));
                    }
                }
                events
            }
        }
    }

    /// Record the latest state of an identity, returning the change if any.
    fn upsert(&mut self, identity: Identity) -> Option<RegistryEvent> {
        let previous = self
            .identities
            .insert(identity.id.clone(), identity.clone());
        match previous {
            None => Some(RegistryEvent::Added(identity)),
            Some(previous) if previous.version == identity.version => None,
            Some(previous) => Some(RegistryEvent::Updated(previous, identity)),
        }
    }
}

#[cfg(test)]
mod tests {
    use kube::runtime::watcher::Event;

    use kportal_registry::Identity;
    use kportal_registry::RegistryEvent;
    use kportal_registry::Role;

    use super::EventCache;
    use crate::PortalUser;

    fn user(id: &str, role: Role, version: &str) -> PortalUser {
        let mut identity = Identity::new(id, "someone@example.com", "Someone").with_role(role);
        identity.version = Some(version.to_string());
        PortalUser::from_identity(identity)
    }

    fn events(cache: &mut EventCache, event: Event<PortalUser>) -> Vec<RegistryEvent> {
        cache
            .apply(event)
            .into_iter()
            .map(|event| event.unwrap())
            .collect()
    }

    #[test]
    fn typed_events() {
        let mut cache = EventCache::default();
        let added = events(&mut cache, Event::Applied(user("iss#a", Role::Guest, "1")));
        assert_eq!(added.len(), 1);
        assert!(matches!(&added[0], RegistryEvent::Added(identity) if identity.id == "iss#a"));

        let updated = events(&mut cache, Event::Applied(user("iss#a", Role::User, "2")));
        match &updated[..] {
            [RegistryEvent::Updated(old, new)] => {
                assert_eq!(old.role, Role::Guest);
                assert_eq!(new.role, Role::User);
            }
            other => panic!("unexpected events: {:?}", other),
        }

        let same = events(&mut cache, Event::Applied(user("iss#a", Role::User, "2")));
        assert!(same.is_empty());

        let deleted = events(&mut cache, Event::Deleted(user("iss#a", Role::User, "2")));
        assert!(matches!(&deleted[..], [RegistryEvent::Deleted(identity)] if identity.id == "iss#a"));
    }

    #[test]
    fn restarts_diff_the_cache() {
        let mut cache = EventCache::default();
        events(&mut cache, Event::Applied(user("iss#a", Role::User, "1")));
        events(&mut cache, Event::Applied(user("iss#b", Role::User, "2")));

        let restarted = events(
            &mut cache,
            Event::Restarted(vec![
                user("iss#a", Role::User, "1"),
                user("iss#c", Role::Guest, "3"),
            ]),
        );
        assert_eq!(restarted.len(), 2);
        assert!(matches!(&restarted[0], RegistryEvent::Added(identity) if identity.id == "iss#c"));
        assert!(matches!(&restarted[1], RegistryEvent::Deleted(identity) if identity.id == "iss#b"));
    }
}
