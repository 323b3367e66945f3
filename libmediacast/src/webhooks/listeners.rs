//! Per-platform engagement listener registry.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::types::{EngagementEvent, Platform};

/// Callback invoked for every event emitted on its platform.
///
/// Returning an error (or panicking) is logged and counted but never stops
/// delivery to the other listeners.
pub type Listener = Arc<dyn Fn(&EngagementEvent) -> anyhow::Result<()> + Send + Sync>;

/// Ids are handed out in registration order, so iterating a platform's
/// `BTreeMap` delivers events in that order.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    by_platform: HashMap<Platform, BTreeMap<u64, Listener>>,
}

impl ListenerRegistry {
    pub(crate) fn add(&mut self, platform: Platform, listener: Listener) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.by_platform
            .entry(platform)
            .or_default()
            .insert(id, listener);
        id
    }

    pub(crate) fn remove(&mut self, platform: Platform, id: u64) -> bool {
        let Some(listeners) = self.by_platform.get_mut(&platform) else {
            return false;
        };
        let removed = listeners.remove(&id).is_some();
        if listeners.is_empty() {
            self.by_platform.remove(&platform);
        }
        removed
    }

    /// Clone of the platform's listeners, so they can run without the lock.
    pub(crate) fn snapshot(&self, platform: Platform) -> Vec<Listener> {
        self.by_platform
            .get(&platform)
            .map(|listeners| listeners.values().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn count(&self, platform: Platform) -> usize {
        self.by_platform.get(&platform).map_or(0, BTreeMap::len)
    }

    pub(crate) fn total(&self) -> usize {
        self.by_platform.values().map(BTreeMap::len).sum()
    }
}

pub(crate) type SharedRegistry = Arc<Mutex<ListenerRegistry>>;

pub(crate) fn lock(registry: &Mutex<ListenerRegistry>) -> MutexGuard<'_, ListenerRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle returned by `WebhookManager::on`.
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug, Clone)]
pub struct Subscription {
    registry: Weak<Mutex<ListenerRegistry>>,
    platform: Platform,
    id: u64,
}

impl Subscription {
    pub(crate) fn new(registry: &SharedRegistry, platform: Platform, id: u64) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            platform,
            id,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the listener. Returns false if it was already removed or the
    /// manager is gone.
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => lock(&registry).remove(self.platform, self.id),
            None => false,
        }
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("next_id", &self.next_id)
            .field("listeners", &self.total())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Listener {
        Arc::new(|_: &EngagementEvent| Ok(()))
    }

    #[test]
    fn ids_follow_registration_order() {
        let mut registry = ListenerRegistry::default();
        let first = registry.add(Platform::TikTok, noop());
        let second = registry.add(Platform::YouTube, noop());
        let third = registry.add(Platform::TikTok, noop());

        assert!(first < second && second < third);
        assert_eq!(registry.count(Platform::TikTok), 2);
        assert_eq!(registry.total(), 3);
    }

    #[test]
    fn remove_only_matches_own_platform() {
        let mut registry = ListenerRegistry::default();
        let id = registry.add(Platform::Facebook, noop());

        assert!(!registry.remove(Platform::Instagram, id));
        assert!(registry.remove(Platform::Facebook, id));
        assert!(!registry.remove(Platform::Facebook, id));
        assert_eq!(registry.total(), 0);
    }

    #[test]
    fn unsubscribe_after_registry_dropped() {
        let registry: SharedRegistry = Arc::default();
        let id = lock(&registry).add(Platform::TikTok, noop());
        let subscription = Subscription::new(&registry, Platform::TikTok, id);

        drop(registry);

        assert!(!subscription.unsubscribe());
    }
}
