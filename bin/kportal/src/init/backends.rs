//! Dependency backends configuration and initialisation logic.
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use kportal_controlplane::ControlPlaneFactory;
use kportal_registry::RegistryFactory;

/// Error looking for a specific backend implementation.
#[derive(Debug, thiserror::Error)]
pub enum BackendNotFound {
    /// Cluster control plane backend not recognised.
    #[error("cluster control plane backend '{0}' not recognised")]
    // (id,)
    ControlPlane(String),

    /// User Registry backend not recognised.
    #[error("user registry backend '{0}' not recognised")]
    // (id,)
    Registry(String),
}

impl BackendNotFound {
    /// Cluster control plane backend not recognised.
    pub fn control_plane(id: &str) -> Self {
        Self::ControlPlane(id.to_string())
    }

    /// User Registry backend not recognised.
    pub fn registry(id: &str) -> Self {
        Self::Registry(id.to_string())
    }
}

/// Registers of backend factories for implementations supported by the process/build.
#[derive(Clone, Default)]
pub struct Backends {
    /// Supported cluster control plane backends.
    control_planes: HashMap<String, Arc<dyn ControlPlaneFactory>>,

    /// Supported User Registry backends.
    registries: HashMap<String, Arc<dyn RegistryFactory>>,
}

impl Backends {
    /// Lookup a [`ControlPlaneFactory`] by ID.
    pub fn control_plane(&self, id: &str) -> Result<&dyn ControlPlaneFactory> {
        let factory = self
            .control_planes
            .get(id)
            .ok_or_else(|| BackendNotFound::control_plane(id))?;
        Ok(factory.as_ref())
    }

    /// Lookup a [`RegistryFactory`] by ID.
    pub fn registry(&self, id: &str) -> Result<&dyn RegistryFactory> {
        let factory = self
            .registries
            .get(id)
            .ok_or_else(|| BackendNotFound::registry(id))?;
        Ok(factory.as_ref())
    }

    /// Register a new factory for a cluster control plane implementation.
    ///
    /// # Panics
    ///
    /// This method panics if the identifier of the new control plane backend is already in use.
    pub fn register_control_plane<B, S>(&mut self, id: S, backend: B) -> &mut Self
    where
        B: ControlPlaneFactory + 'static,
        S: Into<String>,
    {
        match self.control_planes.entry(id.into()) {
            Entry::Occupied(entry) => {
                panic!(
                    "a ControlPlaneBackend with id '{}' is already registered",
                    entry.key()
                )
            }
            Entry::Vacant(entry) => entry.insert(Arc::new(backend)),
        };
        self
    }

    /// Register a new factory for a User Registry implementation.
    ///
    /// # Panics
    ///
    /// This method panics if the identifier of the new registry backend is already in use.
    pub fn register_registry<B, S>(&mut self, id: S, backend: B) -> &mut Self
    where
        B: RegistryFactory + 'static,
        S: Into<String>,
    {
        match self.registries.entry(id.into()) {
            Entry::Occupied(entry) => {
                panic!(
                    "a RegistryBackend with id '{}' is already registered",
                    entry.key()
                )
            }
            Entry::Vacant(entry) => entry.insert(Arc::new(backend)),
        };
        self
    }
}

#[cfg(test)]
mod tests {
    use kportal_controlplane::memory::MemoryControlPlaneFactory;
    use kportal_registry::memory::MemoryRegistryFactory;

    use super::BackendNotFound;
    use super::Backends;

    #[test]
    fn lookup_registered_backends() {
        let mut backends = Backends::default();
        backends
            .register_control_plane("memory", MemoryControlPlaneFactory)
            .register_registry("memory", MemoryRegistryFactory);
        assert!(backends.control_plane("memory").is_ok());
        assert!(backends.registry("memory").is_ok());
    }

    #[test]
    fn lookup_unknown_backend() {
        let backends = Backends::default();
        let error = backends.registry("etcd").err().unwrap();
        let error = error.downcast::<BackendNotFound>().unwrap();
        assert!(matches!(error, BackendNotFound::Registry(id) if id == "etcd"));
    }

    #[test]
    #[should_panic(expected = "a RegistryBackend with id 'memory' is already registered")]
    fn register_twice() {
        let mut backends = Backends::default();
        backends
            .register_registry("memory", MemoryRegistryFactory)
            .register_registry("memory", MemoryRegistryFactory);
    }
}
