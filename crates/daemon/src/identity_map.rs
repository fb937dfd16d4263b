//! The identity → client-instance map every accepted connection is routed
//! through.

use std::collections::HashMap;
use std::sync::Arc;

use xcp_identity::Identity;
use xcp_rundown::Rundown;

use crate::instance::ClientInstance;

/// Maps a portal connection's identity to the [`ClientInstance`] it created,
/// so a later channel connection carrying the same identity finds its way
/// to the right transfer.
#[derive(Default)]
pub struct IdentityMap {
    inner: Rundown<HashMap<Identity, Arc<ClientInstance>>>,
}

impl IdentityMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rundown::new(HashMap::new()),
        }
    }

    /// Inserts a freshly constructed instance, or returns `None` if the
    /// daemon is shutting down and no new transfers should start.
    #[must_use]
    pub fn insert(&self, instance: Arc<ClientInstance>) -> Option<Arc<ClientInstance>> {
        let mut guard = self.inner.acquire_unique()?;
        guard.insert(instance.identity(), Arc::clone(&instance));
        Some(instance)
    }

    /// Looks up the instance for `identity`, or `None` if absent or the
    /// daemon is shutting down.
    #[must_use]
    pub fn get(&self, identity: Identity) -> Option<Arc<ClientInstance>> {
        let guard = self.inner.acquire_shared()?;
        guard.get(&identity).cloned()
    }

    /// Removes `identity` from the map. Used once its transfer has finished
    /// so the map does not grow without bound over a long-lived daemon.
    pub fn remove(&self, identity: Identity) {
        if let Some(mut guard) = self.inner.acquire_unique() {
            guard.remove(&identity);
        }
    }

    /// Begins teardown: every subsequent `insert`/`get` fails, and every
    /// currently tracked instance is disposed.
    pub fn shutdown(&self) {
        let mut guard = self.inner.begin();
        for instance in guard.values() {
            instance.dispose();
        }
        guard.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_lookup_round_trips() {
        let map = IdentityMap::new();
        let identity = Identity::new();
        let instance = Arc::new(ClientInstance::new(identity, 0));
        map.insert(Arc::clone(&instance));
        assert!(map.get(identity).is_some());
        assert!(map.get(Identity::new()).is_none());
    }

    #[test]
    fn shutdown_disposes_tracked_instances_and_refuses_new_ones() {
        let map = IdentityMap::new();
        let identity = Identity::new();
        let instance = Arc::new(ClientInstance::new(identity, 0));
        map.insert(Arc::clone(&instance));

        map.shutdown();

        assert!(instance.is_closing());
        assert!(map.get(identity).is_none());
        assert!(map.insert(Arc::new(ClientInstance::new(Identity::new(), 0))).is_none());
    }
}
