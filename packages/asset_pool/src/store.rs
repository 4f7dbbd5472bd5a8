//! Inactive objects waiting to be reused.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::mem;

use foldhash::{HashMap, HashMapExt};

use crate::{AssetKey, InstanceId, PoolObject};

/// Per-key FIFO queues of inactive objects.
///
/// Objects are reused in the order they were released so that every pooled object ages at the
/// same rate. Always reusing the most recently released object would hide stale-state defects
/// in the objects that sit at the bottom of a stack.
pub(crate) struct PoolStore<O> {
    queues: RefCell<HashMap<AssetKey, VecDeque<O>>>,
}

impl<O> fmt::Debug for PoolStore<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolStore")
            .field("keys", &self.queues.borrow().len())
            .field("objects", &self.total())
            .finish()
    }
}

impl<O> PoolStore<O> {
    pub(crate) fn new() -> Self {
        Self {
            queues: RefCell::new(HashMap::new()),
        }
    }

    /// Removes the longest-waiting object for `key`, if any.
    pub(crate) fn try_take(&self, key: &AssetKey) -> Option<O> {
        self.queues
            .borrow_mut()
            .get_mut(key)
            .and_then(VecDeque::pop_front)
    }

    pub(crate) fn put(&self, key: &AssetKey, object: O) {
        self.queues
            .borrow_mut()
            .entry(key.clone())
            .or_default()
            .push_back(object);
    }

    pub(crate) fn count_for(&self, key: &AssetKey) -> usize {
        self.queues.borrow().get(key).map_or(0, VecDeque::len)
    }

    pub(crate) fn total(&self) -> usize {
        self.queues.borrow().values().map(VecDeque::len).sum()
    }

    /// Number of pooled objects per key, omitting keys with empty queues.
    pub(crate) fn counts(&self) -> Vec<(AssetKey, usize)> {
        self.queues
            .borrow()
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(key, queue)| (key.clone(), queue.len()))
            .collect()
    }

    /// Empties every queue and returns the contents.
    pub(crate) fn drain_all(&self) -> Vec<(AssetKey, O)> {
        let queues = mem::take(&mut *self.queues.borrow_mut());

        queues
            .into_iter()
            .flat_map(|(key, queue)| queue.into_iter().map(move |object| (key.clone(), object)))
            .collect()
    }
}

impl<O: PoolObject> PoolStore<O> {
    /// Removes the object with identity `id` from the queue for `key`, keeping the order of
    /// the rest. Returns whether it was queued.
    pub(crate) fn remove(&self, key: &AssetKey, id: InstanceId) -> bool {
        let mut queues = self.queues.borrow_mut();

        let Some(queue) = queues.get_mut(key) else {
            return false;
        };

        let before = queue.len();
        queue.retain(|object| object.id() != id);

        queue.len() != before
    }
}
