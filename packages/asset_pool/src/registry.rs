//! Bookkeeping of every live object the pool has created.

use std::cell::{Cell, RefCell};
use std::fmt;

use foldhash::{HashMap, HashMapExt};
use tracing::error;

use crate::{AssetKey, InstanceId, PoolObject};

struct RegistryEntry<O> {
    key: AssetKey,
    object: O,
    active: bool,
    display_name: Option<String>,
}

/// Maps every live object the pool created to the key it was created from.
///
/// Objects stay registered while they sit inactive in the pool. They leave the registry only
/// when they are destroyed.
pub(crate) struct InstanceRegistry<O> {
    entries: RefCell<HashMap<InstanceId, RegistryEntry<O>>>,

    /// While set, destruction notifications do not touch the registry. Bulk clear sets it
    /// because it destroys from a snapshot and wipes the registry afterwards.
    bulk_clearing: Cell<bool>,
}

impl<O> fmt::Debug for InstanceRegistry<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceRegistry")
            .field("entries", &self.entries.borrow().len())
            .field("bulk_clearing", &self.bulk_clearing.get())
            .finish()
    }
}

impl<O: PoolObject> InstanceRegistry<O> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
            bulk_clearing: Cell::new(false),
        }
    }

    /// Registers a freshly created object.
    ///
    /// Returns `false` and leaves the existing entry untouched if the identity is already
    /// registered. That means the host reused an identity of a live object.
    pub(crate) fn register(
        &self,
        key: &AssetKey,
        object: &O,
        active: bool,
        display_name: Option<String>,
    ) -> bool {
        let id = object.id();
        let mut entries = self.entries.borrow_mut();

        if let Some(existing) = entries.get(&id) {
            error!(
                %id,
                %key,
                existing_key = %existing.key,
                "object identity is already registered, ignoring duplicate registration"
            );
            return false;
        }

        entries.insert(
            id,
            RegistryEntry {
                key: key.clone(),
                object: object.clone(),
                active,
                display_name,
            },
        );

        true
    }

    pub(crate) fn lookup(&self, id: InstanceId) -> Option<AssetKey> {
        self.entries.borrow().get(&id).map(|entry| entry.key.clone())
    }

    pub(crate) fn is_active(&self, id: InstanceId) -> Option<bool> {
        self.entries.borrow().get(&id).map(|entry| entry.active)
    }

    pub(crate) fn mark_active(&self, id: InstanceId, active: bool) {
        if let Some(entry) = self.entries.borrow_mut().get_mut(&id) {
            entry.active = active;
        }
    }

    pub(crate) fn display_name(&self, id: InstanceId) -> Option<String> {
        self.entries
            .borrow()
            .get(&id)
            .and_then(|entry| entry.display_name.clone())
    }

    /// Forgets a destroyed object. Does nothing while a bulk clear is in progress.
    ///
    /// Returns the key the object was created from if an entry was removed.
    pub(crate) fn unregister(&self, id: InstanceId) -> Option<AssetKey> {
        if self.bulk_clearing.get() {
            return None;
        }

        self.entries.borrow_mut().remove(&id).map(|entry| entry.key)
    }

    /// Snapshot of every registered object, active or pooled.
    pub(crate) fn all_instances(&self) -> Vec<O> {
        self.entries
            .borrow()
            .values()
            .map(|entry| entry.object.clone())
            .collect()
    }

    /// Snapshot of the objects currently handed out to callers.
    pub(crate) fn active_instances(&self) -> Vec<O> {
        self.entries
            .borrow()
            .values()
            .filter(|entry| entry.active)
            .map(|entry| entry.object.clone())
            .collect()
    }

    /// Number of active objects per key.
    pub(crate) fn active_counts(&self) -> HashMap<AssetKey, usize> {
        let mut counts = HashMap::new();

        for entry in self.entries.borrow().values().filter(|entry| entry.active) {
            let count: &mut usize = counts.entry(entry.key.clone()).or_default();
            *count = count.saturating_add(1);
        }

        counts
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub(crate) fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    pub(crate) fn set_bulk_clearing(&self, value: bool) {
        self.bulk_clearing.set(value);
    }
}
