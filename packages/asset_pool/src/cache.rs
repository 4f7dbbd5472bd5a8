//! Deduplicated template loading.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};
use std::time::Instant;

use foldhash::{HashMap, HashMapExt};
use futures::future::{FutureExt, LocalBoxFuture, Shared};
use tracing::{debug, warn};

use crate::error::Result;
use crate::metrics::LOAD_TIME_MS;
use crate::{AssetKey, AssetLoader, Error};

/// A load that any number of callers can await. The first poll drives the loader, everyone
/// else receives a clone of the outcome.
type SharedLoad<T> = Shared<LocalBoxFuture<'static, Result<Rc<T>>>>;

type Entries<T> = RefCell<HashMap<AssetKey, LoadEntry<T>>>;

struct LoadEntry<T> {
    /// Distinguishes this entry from earlier entries for the same key that have since been
    /// released or evicted. A load that completes for a superseded generation is an orphan.
    generation: u64,
    load: SharedLoad<T>,
    display_name: Option<String>,
    requests: u64,
}

/// What the cache knows about one key, for diagnostics.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct CacheEntryInfo {
    pub(crate) loaded: bool,
    pub(crate) requests: u64,
    pub(crate) display_name: Option<String>,
}

/// Resolves asset keys to templates, starting at most one load per key.
pub(crate) struct AssetCache<L: AssetLoader> {
    loader: Rc<L>,
    entries: Rc<Entries<L::Template>>,
    next_generation: Cell<u64>,
}

impl<L: AssetLoader> fmt::Debug for AssetCache<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetCache")
            .field("entries", &self.entries.borrow().len())
            .finish_non_exhaustive()
    }
}

impl<L: AssetLoader> AssetCache<L> {
    pub(crate) fn new(loader: Rc<L>) -> Self {
        Self {
            loader,
            entries: Rc::new(RefCell::new(HashMap::new())),
            next_generation: Cell::new(0),
        }
    }

    /// Resolves `key` to its template, loading it if no load has been started yet.
    ///
    /// Concurrent callers for the same key await the same load and observe the same outcome.
    /// A failed load is forgotten once it completes, so the next call starts a fresh attempt.
    pub(crate) async fn resolve(&self, key: &AssetKey) -> Result<Rc<L::Template>> {
        if !key.is_valid() {
            return Err(Error::InvalidKey { key: key.clone() });
        }

        let (generation, load) = self.join_or_start(key);

        let outcome = load.await;

        match &outcome {
            Ok(template) => self.record_display_name(key, generation, template),
            Err(_) => self.forget(key, generation),
        }

        outcome
    }

    fn join_or_start(&self, key: &AssetKey) -> (u64, SharedLoad<L::Template>) {
        let mut entries = self.entries.borrow_mut();

        if let Some(entry) = entries.get_mut(key) {
            entry.requests = entry.requests.saturating_add(1);
            return (entry.generation, entry.load.clone());
        }

        let generation = self.next_generation.get();
        self.next_generation.set(generation.wrapping_add(1));

        let load = start_load(
            Rc::clone(&self.loader),
            Rc::downgrade(&self.entries),
            key.clone(),
            generation,
        );

        entries.insert(
            key.clone(),
            LoadEntry {
                generation,
                load: load.clone(),
                display_name: None,
                requests: 1,
            },
        );

        (generation, load)
    }

    fn record_display_name(&self, key: &AssetKey, generation: u64, template: &L::Template) {
        let needs_name = self
            .entries
            .borrow()
            .get(key)
            .is_some_and(|entry| entry.generation == generation && entry.display_name.is_none());

        if !needs_name {
            return;
        }

        // The loader is host code, so it runs without any borrow held.
        let name = self.loader.display_name(key, template);

        let mut entries = self.entries.borrow_mut();

        if let Some(entry) = entries
            .get_mut(key)
            .filter(|entry| entry.generation == generation)
        {
            entry.display_name.get_or_insert(name);
        }
    }

    fn forget(&self, key: &AssetKey, generation: u64) {
        let mut entries = self.entries.borrow_mut();

        if entries
            .get(key)
            .is_some_and(|entry| entry.generation == generation)
        {
            entries.remove(key);
        }
    }

    /// Hands every loaded template back to the loader and empties the cache.
    ///
    /// Loads still in flight are abandoned. Whichever of them still completes releases its own
    /// template and reports [`Error::Cancelled`] to its waiters.
    ///
    /// The caller guarantees that no object created from any of the templates is still alive.
    pub(crate) fn release_all(&self) {
        let entries = mem::take(&mut *self.entries.borrow_mut());

        let mut released = 0_usize;
        let mut abandoned = 0_usize;

        for (key, entry) in entries {
            match entry.load.peek() {
                Some(Ok(template)) => {
                    self.loader.release(&key, template);
                    released = released.saturating_add(1);
                }
                Some(Err(_)) => {}
                None => abandoned = abandoned.saturating_add(1),
            }
        }

        debug!(released, abandoned, "released cached asset templates");
    }

    /// The display name recorded for `key`, if the key has resolved successfully.
    pub(crate) fn display_name(&self, key: &AssetKey) -> Option<String> {
        self.entries
            .borrow()
            .get(key)
            .and_then(|entry| entry.display_name.clone())
    }

    pub(crate) fn info(&self) -> Vec<(AssetKey, CacheEntryInfo)> {
        self.entries
            .borrow()
            .iter()
            .map(|(key, entry)| {
                (
                    key.clone(),
                    CacheEntryInfo {
                        loaded: entry.load.peek().is_some_and(Result::is_ok),
                        requests: entry.requests,
                        display_name: entry.display_name.clone(),
                    },
                )
            })
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

fn start_load<L: AssetLoader>(
    loader: Rc<L>,
    entries: Weak<Entries<L::Template>>,
    key: AssetKey,
    generation: u64,
) -> SharedLoad<L::Template> {
    async move {
        debug!(%key, generation, "loading asset");

        let started = Instant::now();
        let loaded = loader.load(&key).await;
        LOAD_TIME_MS.with(|e| e.observe_millis(started.elapsed()));

        let template = match loaded {
            Ok(template) => Rc::new(template),
            Err(source) => {
                warn!(%key, %source, "asset failed to load");
                return Err(Error::Load { key, source });
            }
        };

        let still_cached = entries.upgrade().is_some_and(|entries| {
            entries
                .borrow()
                .get(&key)
                .is_some_and(|entry| entry.generation == generation)
        });

        if !still_cached {
            debug!(%key, generation, "cache was cleared during load, releasing orphaned template");
            loader.release(&key, &template);
            return Err(Error::Cancelled { key });
        }

        debug!(%key, generation, "asset loaded");
        Ok(template)
    }
    .boxed_local()
    .shared()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use futures::channel::oneshot;
    use futures::executor::{LocalPool, block_on};
    use futures::future::join;
    use futures::task::LocalSpawnExt;

    use super::*;
    use crate::BackendError;

    /// Loader that resolves immediately and records every call.
    #[derive(Debug, Default)]
    struct CountingLoader {
        loads: RefCell<Vec<AssetKey>>,
        releases: RefCell<Vec<(AssetKey, String)>>,
    }

    impl AssetLoader for CountingLoader {
        type Template = String;

        async fn load(&self, key: &AssetKey) -> std::result::Result<String, BackendError> {
            self.loads.borrow_mut().push(key.clone());
            Ok(format!("template:{key}"))
        }

        fn release(&self, key: &AssetKey, template: &String) {
            self.releases
                .borrow_mut()
                .push((key.clone(), template.clone()));
        }

        fn display_name(&self, _key: &AssetKey, template: &String) -> String {
            template.to_uppercase()
        }
    }

    /// Loader whose loads complete only when the test sends the template.
    #[derive(Debug, Default)]
    struct GatedLoader {
        gates: RefCell<Vec<oneshot::Sender<String>>>,
        releases: RefCell<Vec<AssetKey>>,
    }

    impl AssetLoader for GatedLoader {
        type Template = String;

        async fn load(&self, _key: &AssetKey) -> std::result::Result<String, BackendError> {
            let (sender, receiver) = oneshot::channel();
            self.gates.borrow_mut().push(sender);

            receiver
                .await
                .map_err(|_canceled| BackendError::new("gate dropped"))
        }

        fn release(&self, key: &AssetKey, _template: &String) {
            self.releases.borrow_mut().push(key.clone());
        }
    }

    #[test]
    fn resolves_template() {
        let cache = AssetCache::new(Rc::new(CountingLoader::default()));

        let template = block_on(cache.resolve(&AssetKey::new("cube"))).unwrap();

        assert_eq!(*template, "template:cube");
        assert_eq!(
            cache.display_name(&AssetKey::new("cube")).as_deref(),
            Some("TEMPLATE:CUBE")
        );
    }

    #[test]
    fn repeated_resolves_load_once() {
        let loader = Rc::new(CountingLoader::default());
        let cache = AssetCache::new(Rc::clone(&loader));
        let key = AssetKey::new("cube");

        let (a, b) = block_on(join(cache.resolve(&key), cache.resolve(&key)));
        let c = block_on(cache.resolve(&key));

        assert!(Rc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(*c.unwrap(), "template:cube");
        assert_eq!(loader.loads.borrow().len(), 1);

        let info = cache.info();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].1.requests, 3);
        assert!(info[0].1.loaded);
    }

    #[test]
    fn concurrent_waiters_share_one_pending_load() {
        let loader = Rc::new(GatedLoader::default());
        let cache = Rc::new(AssetCache::new(Rc::clone(&loader)));
        let results = Rc::new(RefCell::new(Vec::new()));

        let mut pool = LocalPool::new();
        let spawner = pool.spawner();

        for _ in 0..3 {
            let cache = Rc::clone(&cache);
            let results = Rc::clone(&results);
            spawner
                .spawn_local(async move {
                    let outcome = cache.resolve(&AssetKey::new("cube")).await;
                    results.borrow_mut().push(outcome);
                })
                .unwrap();
        }

        pool.run_until_stalled();
        assert_eq!(loader.gates.borrow().len(), 1);

        let gate = loader.gates.borrow_mut().pop().unwrap();
        gate.send("cube!".to_string()).unwrap();
        pool.run_until_stalled();

        let results = results.borrow();
        assert_eq!(results.len(), 3);
        assert!(
            results
                .iter()
                .all(|r| matches!(r.as_deref().map(String::as_str), Ok("cube!")))
        );
    }

    #[test]
    fn failure_is_shared_then_forgotten() {
        let loader = Rc::new(GatedLoader::default());
        let cache = Rc::new(AssetCache::new(Rc::clone(&loader)));
        let results = Rc::new(RefCell::new(Vec::new()));

        let mut pool = LocalPool::new();
        let spawner = pool.spawner();

        for _ in 0..2 {
            let cache = Rc::clone(&cache);
            let results = Rc::clone(&results);
            spawner
                .spawn_local(async move {
                    let outcome = cache.resolve(&AssetKey::new("broken")).await;
                    results.borrow_mut().push(outcome);
                })
                .unwrap();
        }

        pool.run_until_stalled();
        assert_eq!(loader.gates.borrow().len(), 1);

        // Dropping the gate fails the load.
        loader.gates.borrow_mut().clear();
        pool.run_until_stalled();

        assert_eq!(results.borrow().len(), 2);
        assert!(
            results
                .borrow()
                .iter()
                .all(|r| matches!(r, Err(Error::Load { .. })))
        );
        assert_eq!(cache.len(), 0);

        // A later attempt starts over.
        let cache_clone = Rc::clone(&cache);
        spawner
            .spawn_local(async move {
                drop(cache_clone.resolve(&AssetKey::new("broken")).await);
            })
            .unwrap();
        pool.run_until_stalled();
        assert_eq!(loader.gates.borrow().len(), 1);
    }

    #[test]
    fn invalid_key_is_rejected_without_loading() {
        let loader = Rc::new(CountingLoader::default());
        let cache = AssetCache::new(Rc::clone(&loader));

        let outcome = block_on(cache.resolve(&AssetKey::new("")));

        assert!(matches!(outcome, Err(Error::InvalidKey { .. })));
        assert!(loader.loads.borrow().is_empty());
    }

    #[test]
    fn release_all_returns_templates_and_forgets() {
        let loader = Rc::new(CountingLoader::default());
        let cache = AssetCache::new(Rc::clone(&loader));

        block_on(cache.resolve(&AssetKey::new("a"))).unwrap();
        block_on(cache.resolve(&AssetKey::new("b"))).unwrap();

        cache.release_all();

        let mut released: Vec<_> = loader
            .releases
            .borrow()
            .iter()
            .map(|(key, _)| key.clone())
            .collect();
        released.sort();
        assert_eq!(released, vec![AssetKey::new("a"), AssetKey::new("b")]);
        assert_eq!(cache.len(), 0);

        block_on(cache.resolve(&AssetKey::new("a"))).unwrap();
        assert_eq!(loader.loads.borrow().len(), 3);
    }

    #[test]
    fn load_completing_after_release_all_releases_itself() {
        let loader = Rc::new(GatedLoader::default());
        let cache = Rc::new(AssetCache::new(Rc::clone(&loader)));
        let outcome = Rc::new(RefCell::new(None));

        let mut pool = LocalPool::new();
        {
            let cache = Rc::clone(&cache);
            let outcome = Rc::clone(&outcome);
            pool.spawner()
                .spawn_local(async move {
                    *outcome.borrow_mut() = Some(cache.resolve(&AssetKey::new("cube")).await);
                })
                .unwrap();
        }

        pool.run_until_stalled();
        cache.release_all();
        assert!(loader.releases.borrow().is_empty());

        let gate = loader.gates.borrow_mut().pop().unwrap();
        gate.send("late".to_string()).unwrap();
        pool.run_until_stalled();

        assert!(matches!(
            outcome.borrow().as_ref(),
            Some(Err(Error::Cancelled { .. }))
        ));
        assert_eq!(*loader.releases.borrow(), vec![AssetKey::new("cube")]);
    }
}
