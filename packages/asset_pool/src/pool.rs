//! The pool façade and its lifecycle.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use nm::Event;
use tracing::{debug, error, trace, warn};

use crate::cache::AssetCache;
use crate::error::Result;
use crate::metrics::{ACQUIRE_CREATED, ACQUIRE_REUSED, DEAD_DISCARDED, EVICTED, PREWARM_CREATED};
use crate::registry::InstanceRegistry;
use crate::store::PoolStore;
use crate::tracker::OperationTracker;
use crate::{
    AssetKey, AssetLoader, AssetPoolBuilder, Error, InstanceId, Instantiator, KeyStats,
    Placement, PoolCapacity, PoolObject, PoolStats,
};

pub(crate) struct PoolInner<L, I>
where
    L: AssetLoader,
    I: Instantiator<Template = L::Template>,
{
    cache: AssetCache<L>,
    registry: InstanceRegistry<I::Object>,
    store: PoolStore<I::Object>,
    tracker: OperationTracker,
    instantiator: I,
    capacity: PoolCapacity,
}

impl<L, I> fmt::Debug for PoolInner<L, I>
where
    L: AssetLoader,
    I: Instantiator<Template = L::Template>,
{
    #[cfg_attr(test, mutants::skip)] // Diagnostic output only.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolInner")
            .field("cache", &self.cache)
            .field("registry", &self.registry)
            .field("store", &self.store)
            .field("tracker", &self.tracker)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl<L, I> PoolInner<L, I>
where
    L: AssetLoader,
    I: Instantiator<Template = L::Template>,
{
    /// Instantiates `template`, checks the poolable capability and registers the new object
    /// as inactive.
    fn instantiate(&self, key: &AssetKey, template: &L::Template) -> Result<I::Object> {
        let object = self
            .instantiator
            .instantiate(template)
            .map_err(|source| Error::Instantiate {
                key: key.clone(),
                source,
            })?;

        if object.poolable().is_none() {
            error!(%key, id = %object.id(), "asset produced an object without the poolable capability");
            self.destroy(&object);
            return Err(Error::InvalidAsset { key: key.clone() });
        }

        self.registry
            .register(key, &object, false, self.cache.display_name(key));

        Ok(object)
    }

    /// Pops pooled objects for `key` until a live one turns up.
    fn take_pooled(&self, key: &AssetKey) -> Option<I::Object> {
        loop {
            let object = self.store.try_take(key)?;

            if object.is_alive() {
                return Some(object);
            }

            warn!(%key, id = %object.id(), "pooled object was destroyed externally, discarding it");
            DEAD_DISCARDED.with(Event::observe_once);
            self.registry.unregister(object.id());
        }
    }

    fn activate(&self, object: &I::Object, placement: &Placement) {
        object.place(placement);
        object.set_active(true);
        self.registry.mark_active(object.id(), true);

        if let Some(poolable) = object.poolable() {
            poolable.on_acquire();
        }
    }

    fn deactivate(object: &I::Object) {
        object.set_active(false);
        object.park();
    }

    fn destroy(&self, object: &I::Object) {
        if object.is_alive() {
            self.instantiator.destroy(object);
        }
    }

    fn release(&self, object: &I::Object) -> Result<()> {
        let id = object.id();

        let Some(key) = self.registry.lookup(id) else {
            warn!(%id, "release of an object this pool does not track");
            return Err(Error::UnknownInstance { id });
        };

        if self.registry.is_active(id) == Some(false) {
            warn!(%id, %key, "release of an object that is already pooled");
            return Err(Error::NotActive { id });
        }

        if !object.is_alive() {
            debug!(%id, %key, "released object was already destroyed, forgetting it");
            self.registry.unregister(id);
            return Ok(());
        }

        if let Some(poolable) = object.poolable() {
            poolable.on_release();
        }

        Self::deactivate(object);
        self.registry.mark_active(id, false);

        if self.capacity.admits(self.store.count_for(&key)) {
            trace!(%id, %key, "object returned to pool");
            self.store.put(&key, object.clone());
        } else {
            trace!(%id, %key, name = ?self.registry.display_name(id), "pool is full, destroying released object");
            EVICTED.with(Event::observe_once);
            self.registry.unregister(id);
            self.destroy(object);
        }

        Ok(())
    }

    fn release_all(&self) -> usize {
        let active = self.registry.active_instances();
        let mut released = 0_usize;

        for object in &active {
            match self.release(object) {
                Ok(()) => released = released.saturating_add(1),
                Err(error) => debug!(%error, "object could not be released during release-all"),
            }
        }

        released
    }

    fn clear_all(&self, release_assets: bool) {
        self.registry.set_bulk_clearing(true);

        // Whatever happens to the host callbacks below, destruction notifications must reach
        // the registry again afterwards.
        let _clearing = scopeguard::guard(&self.registry, |registry| {
            registry.set_bulk_clearing(false);
        });

        let pooled = self.store.drain_all();

        for (_, object) in &pooled {
            self.destroy(object);
        }

        // Pooled objects are still registered, `destroy()` skips the ones already gone.
        let registered = self.registry.all_instances();

        for object in &registered {
            self.destroy(object);
        }

        self.registry.clear();

        if release_assets {
            self.cache.release_all();
        }

        debug!(
            pooled = pooled.len(),
            registered = registered.len(),
            release_assets,
            "cleared asset pool"
        );
    }

    fn stats(&self) -> PoolStats {
        let mut keys: BTreeMap<AssetKey, KeyStats> = BTreeMap::new();

        for (key, info) in self.cache.info() {
            let stats = keys
                .entry(key.clone())
                .or_insert_with(|| KeyStats::empty(key));
            stats.template_loaded = info.loaded;
            stats.load_requests = info.requests;
            stats.display_name = info.display_name;
        }

        for (key, pooled) in self.store.counts() {
            keys.entry(key.clone())
                .or_insert_with(|| KeyStats::empty(key))
                .pooled = pooled;
        }

        for (key, active) in self.registry.active_counts() {
            keys.entry(key.clone())
                .or_insert_with(|| KeyStats::empty(key))
                .active = active;
        }

        for key in self.tracker.prewarming_keys() {
            keys.entry(key.clone())
                .or_insert_with(|| KeyStats::empty(key))
                .prewarming = true;
        }

        PoolStats {
            keys: keys.into_values().collect(),
            acquires_in_flight: self.tracker.acquires_in_flight(),
        }
    }
}

impl<L, I> Drop for PoolInner<L, I>
where
    L: AssetLoader,
    I: Instantiator<Template = L::Template>,
{
    fn drop(&mut self) {
        if self.registry.len() > 0 {
            debug!(
                objects = self.registry.len(),
                "asset pool dropped with live objects, destroying them"
            );
        }

        self.clear_all(true);
    }
}

/// Outcome of a completed [`AssetPool::prewarm()`].
///
/// A prewarm that stops early is not an error. The objects it did create stay in the pool.
#[derive(Clone, Debug)]
pub struct PrewarmReport {
    target: usize,
    already_pooled: usize,
    created: usize,
    stopped: Option<PrewarmStop>,
}

impl PrewarmReport {
    /// The pooled count the prewarm was asked to reach.
    #[must_use]
    pub fn target(&self) -> usize {
        self.target
    }

    /// Pooled objects that existed when the prewarm started.
    #[must_use]
    pub fn already_pooled(&self) -> usize {
        self.already_pooled
    }

    /// Objects created and pooled by this prewarm.
    #[must_use]
    pub fn created(&self) -> usize {
        self.created
    }

    /// Why the prewarm stopped before reaching its target, if it did.
    #[must_use]
    pub fn stopped(&self) -> Option<&PrewarmStop> {
        self.stopped.as_ref()
    }

    /// Whether the prewarm reached its target.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.stopped.is_none()
    }
}

/// Reason a prewarm stopped before reaching its target.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum PrewarmStop {
    /// The prewarm was cancelled.
    Cancelled,

    /// Creating an object failed. No further objects were attempted.
    Failed(Error),
}

/// A pool of reusable objects created from loadable assets, keyed by [`AssetKey`].
///
/// The pool loads each asset's template once (concurrent requests for the same key share one
/// load), creates objects from it on demand and keeps released objects for reuse.
///
/// This type is a cloneable handle. All clones refer to the same pool, which lives as long as
/// any handle does. When the last handle is dropped every object the pool created is destroyed
/// and every template released, as if [`shutdown()`][Self::shutdown] had been called.
///
/// # Single-threaded design
///
/// The pool is neither [`Send`] nor [`Sync`]. It is owned by one thread (in a game, the main
/// thread) and concurrency is cooperative: any number of [`acquire()`][Self::acquire] and
/// [`prewarm()`][Self::prewarm] futures may be in flight at once on that thread. Loading a
/// template is the only point at which an operation suspends.
///
/// # Example
///
/// ```rust
/// use asset_pool::{AssetKey, AssetPool, Placement, PoolObject};
/// use futures::executor::block_on;
/// use testing::{FakeHost, FakeInstantiator, FakeLoader};
///
/// let host = FakeHost::new();
/// let pool = AssetPool::builder(FakeLoader::new(&host), FakeInstantiator::new(&host))
///     .max_pool_size(8)
///     .build();
/// let cube = AssetKey::new("cube");
///
/// block_on(async {
///     let object = pool.acquire(&cube, &Placement::new()).await.unwrap();
///     pool.release(&object).unwrap();
///
///     // The released object is reused.
///     let again = pool.acquire(&cube, &Placement::new()).await.unwrap();
///     assert_eq!(object.id(), again.id());
/// });
///
/// pool.shutdown();
/// ```
pub struct AssetPool<L, I>
where
    L: AssetLoader,
    I: Instantiator<Template = L::Template>,
{
    inner: Rc<PoolInner<L, I>>,
}

impl<L, I> AssetPool<L, I>
where
    L: AssetLoader,
    I: Instantiator<Template = L::Template>,
{
    /// Creates a pool with default settings.
    ///
    /// Use [`AssetPool::builder()`] for custom configuration.
    #[must_use]
    pub fn new(loader: L, instantiator: I) -> Self {
        Self::builder(loader, instantiator).build()
    }

    /// Creates a builder for configuring the pool.
    pub fn builder(loader: L, instantiator: I) -> AssetPoolBuilder<L, I> {
        AssetPoolBuilder::new(loader, instantiator)
    }

    pub(crate) fn from_parts(loader: L, instantiator: I, capacity: PoolCapacity) -> Self {
        Self {
            inner: Rc::new(PoolInner {
                cache: AssetCache::new(Rc::new(loader)),
                registry: InstanceRegistry::new(),
                store: PoolStore::new(),
                tracker: OperationTracker::new(),
                instantiator,
                capacity,
            }),
        }
    }

    /// The per-key capacity the pool was built with.
    #[must_use]
    pub fn capacity(&self) -> PoolCapacity {
        self.inner.capacity
    }

    /// Grows the pool for `key` until it holds `target` inactive objects.
    ///
    /// Only the shortfall is created: if the pool already holds `target` objects or more,
    /// nothing happens. Objects are created one at a time and the prewarm stops early, without
    /// failing, if an object cannot be created or the prewarm is cancelled. The objects created
    /// until then stay in the pool. Prewarmed objects are not subject to the pool capacity.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidKey`] if `key` is blank.
    /// * [`Error::AlreadyRunning`] if a prewarm for `key` is already in flight. The request is
    ///   dropped, it is not queued behind the running one.
    pub async fn prewarm(&self, key: &AssetKey, target: usize) -> Result<PrewarmReport> {
        let inner = &*self.inner;

        if !key.is_valid() {
            return Err(Error::InvalidKey { key: key.clone() });
        }

        let Some(scope) = inner.tracker.start_prewarm(key) else {
            debug!(%key, target, "prewarm already running, dropping request");
            return Err(Error::AlreadyRunning { key: key.clone() });
        };

        let already_pooled = inner.store.count_for(key);
        let shortfall = target.saturating_sub(already_pooled);

        let mut created = 0_usize;
        let mut stopped = None;

        for _ in 0..shortfall {
            if scope.is_cancelled() {
                stopped = Some(PrewarmStop::Cancelled);
                break;
            }

            let object = match inner.cache.resolve(key).await {
                Ok(template) => inner.instantiate(key, &template),
                Err(error) => Err(error),
            };

            match object {
                Ok(object) => {
                    PoolInner::<L, I>::deactivate(&object);
                    inner.store.put(key, object);
                    PREWARM_CREATED.with(Event::observe_once);
                    created = created.saturating_add(1);
                }
                Err(error) => {
                    warn!(%key, %error, created, "prewarm stopped early");
                    stopped = Some(PrewarmStop::Failed(error));
                    break;
                }
            }
        }

        debug!(%key, target, already_pooled, created, "prewarm finished");

        Ok(PrewarmReport {
            target,
            already_pooled,
            created,
            stopped,
        })
    }

    /// Obtains an active object for `key`, reusing a pooled one if possible.
    ///
    /// The object is placed according to `placement`, activated and then notified through
    /// [`Poolable::on_acquire()`][crate::Poolable::on_acquire]. Pooled objects the host has
    /// destroyed in the meantime are discarded. If no pooled object is available, a new one is
    /// created, which loads the template first unless it is already cached.
    ///
    /// Concurrent acquires for the same key each get their own object.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidKey`] if `key` is blank.
    /// * [`Error::Load`] if the template could not be loaded.
    /// * [`Error::Instantiate`] if the object could not be created.
    /// * [`Error::InvalidAsset`] if the asset produces objects without the poolable capability.
    /// * [`Error::Cancelled`] if the acquire was cancelled while the template was loading.
    pub async fn acquire(&self, key: &AssetKey, placement: &Placement) -> Result<I::Object> {
        let inner = &*self.inner;

        if !key.is_valid() {
            return Err(Error::InvalidKey { key: key.clone() });
        }

        let object = if let Some(object) = inner.take_pooled(key) {
            trace!(%key, id = %object.id(), "acquire served from pool");
            ACQUIRE_REUSED.with(Event::observe_once);
            object
        } else {
            let scope = inner.tracker.track_acquire();
            let template = inner.cache.resolve(key).await?;

            // The load could not be stopped, but nothing further is started on its behalf.
            if scope.is_cancelled() {
                debug!(%key, "acquire cancelled while loading");
                return Err(Error::Cancelled { key: key.clone() });
            }

            let object = inner.instantiate(key, &template)?;
            trace!(%key, id = %object.id(), "acquire created new object");
            ACQUIRE_CREATED.with(Event::observe_once);
            object
        };

        inner.activate(&object, placement);

        Ok(object)
    }

    /// Returns an active object to the pool.
    ///
    /// The object is notified through [`Poolable::on_release()`][crate::Poolable::on_release],
    /// deactivated and parked. If the pool for its key is at capacity, the object is destroyed
    /// instead of being kept.
    ///
    /// # Errors
    ///
    /// * [`Error::UnknownInstance`] if the object was not created by this pool or has been
    ///   destroyed since.
    /// * [`Error::NotActive`] if the object is already in the pool.
    ///
    /// The pool is not modified when an error is returned.
    pub fn release(&self, object: &I::Object) -> Result<()> {
        self.inner.release(object)
    }

    /// Releases every object that is currently active. Returns how many were released.
    pub fn release_all(&self) -> usize {
        self.inner.release_all()
    }

    /// Destroys every object the pool created, active or pooled.
    ///
    /// With `release_assets`, every cached template is then handed back to the loader and the
    /// next request for any key loads it again. Templates are only released after every object
    /// created from them is gone.
    pub fn clear_all(&self, release_assets: bool) {
        self.inner.clear_all(release_assets);
    }

    /// Signals the running prewarm for `key` to stop. Returns whether a prewarm was running.
    ///
    /// The prewarm finishes creating the object it is working on, if any, before it stops.
    pub fn cancel_prewarm(&self, key: &AssetKey) -> bool {
        self.inner.tracker.cancel_prewarm(key)
    }

    /// Signals every running prewarm to stop.
    pub fn cancel_all_prewarms(&self) {
        self.inner.tracker.cancel_all_prewarms();
    }

    /// Signals every acquire that is waiting for a template to give up once the load completes.
    pub fn cancel_all_acquires(&self) {
        self.inner.tracker.cancel_all_acquires();
    }

    /// Informs the pool that the host destroyed an object.
    ///
    /// Hosts call this from their object destruction path, including destructions the pool
    /// itself requested through [`Instantiator::destroy()`]. Returns whether the object was
    /// tracked. Notifications received during [`clear_all()`][Self::clear_all] are ignored.
    ///
    /// A destroyed object that was sitting in the pool leaves the pool too, so it no longer
    /// counts toward the pooled total or the capacity.
    pub fn notify_destroyed(&self, id: InstanceId) -> bool {
        let Some(key) = self.inner.registry.unregister(id) else {
            return false;
        };

        if self.inner.store.remove(&key, id) {
            debug!(%id, %key, "pooled object destroyed by host, removed from pool");
        }

        true
    }

    /// Cancels all in-flight operations, destroys every object and releases every template.
    ///
    /// The pool stays usable afterwards, starting from an empty state.
    pub fn shutdown(&self) {
        debug!("shutting down asset pool");

        self.inner.tracker.cancel_all_prewarms();
        self.inner.tracker.cancel_all_acquires();
        self.inner.clear_all(true);
    }

    /// Number of inactive objects pooled for `key`.
    #[must_use]
    pub fn pooled_count(&self, key: &AssetKey) -> usize {
        self.inner.store.count_for(key)
    }

    /// Number of live objects the pool is tracking, active or pooled.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Whether a prewarm for `key` is in flight.
    #[must_use]
    pub fn is_prewarming(&self, key: &AssetKey) -> bool {
        self.inner.tracker.is_prewarming(key)
    }

    /// Takes a snapshot of the pool state for diagnostics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.inner.stats()
    }
}

impl<L, I> Clone for AssetPool<L, I>
where
    L: AssetLoader,
    I: Instantiator<Template = L::Template>,
{
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<L, I> fmt::Debug for AssetPool<L, I>
where
    L: AssetLoader,
    I: Instantiator<Template = L::Template>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssetPool")
            .field("inner", &self.inner)
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::cell::{Cell, RefCell};

    use futures::executor::block_on;
    use static_assertions::assert_not_impl_any;

    use super::*;
    use crate::{BackendError, Poolable};

    #[derive(Debug, Default)]
    struct World {
        next_id: Cell<u64>,
        destroyed: RefCell<Vec<InstanceId>>,
        released: RefCell<Vec<AssetKey>>,
        without_capability: Cell<bool>,
        broken: Cell<bool>,
    }

    #[derive(Clone, Debug)]
    struct Thing {
        id: InstanceId,
        world: Rc<World>,
        active: Rc<Cell<bool>>,
        poolable: bool,
    }

    impl Poolable for Thing {
        fn on_acquire(&self) {}

        fn on_release(&self) {}
    }

    impl PoolObject for Thing {
        fn id(&self) -> InstanceId {
            self.id
        }

        fn is_alive(&self) -> bool {
            !self.world.destroyed.borrow().contains(&self.id)
        }

        fn is_active(&self) -> bool {
            self.active.get()
        }

        fn set_active(&self, active: bool) {
            self.active.set(active);
        }

        fn place(&self, _placement: &Placement) {}

        fn park(&self) {}

        fn poolable(&self) -> Option<&dyn Poolable> {
            self.poolable.then_some(self as &dyn Poolable)
        }
    }

    #[derive(Debug)]
    struct Loader(Rc<World>);

    impl AssetLoader for Loader {
        type Template = AssetKey;

        async fn load(&self, key: &AssetKey) -> std::result::Result<AssetKey, BackendError> {
            Ok(key.clone())
        }

        fn release(&self, key: &AssetKey, _template: &AssetKey) {
            self.0.released.borrow_mut().push(key.clone());
        }
    }

    #[derive(Debug)]
    struct Maker(Rc<World>);

    impl Instantiator for Maker {
        type Template = AssetKey;
        type Object = Thing;

        fn instantiate(&self, _template: &AssetKey) -> std::result::Result<Thing, BackendError> {
            if self.0.broken.get() {
                return Err(BackendError::new("out of memory"));
            }

            let id = self.0.next_id.get();
            self.0.next_id.set(id.wrapping_add(1));

            Ok(Thing {
                id: InstanceId::new(id),
                world: Rc::clone(&self.0),
                active: Rc::new(Cell::new(true)),
                poolable: !self.0.without_capability.get(),
            })
        }

        fn destroy(&self, object: &Thing) {
            self.0.destroyed.borrow_mut().push(object.id);
        }
    }

    type TestPool = AssetPool<Loader, Maker>;

    assert_not_impl_any!(TestPool: Send, Sync);

    fn new_pool(world: &Rc<World>) -> TestPool {
        AssetPool::new(Loader(Rc::clone(world)), Maker(Rc::clone(world)))
    }

    #[test]
    fn clones_share_state() {
        let world = Rc::new(World::default());
        let pool = new_pool(&world);
        let other = pool.clone();
        let key = AssetKey::new("cube");

        let thing = block_on(pool.acquire(&key, &Placement::new())).unwrap();
        other.release(&thing).unwrap();

        assert_eq!(pool.pooled_count(&key), 1);
        assert_eq!(pool.capacity(), PoolCapacity::Unbounded);
    }

    #[test]
    fn dropping_last_handle_destroys_everything() {
        let world = Rc::new(World::default());
        let pool = new_pool(&world);
        let key = AssetKey::new("cube");

        let active = block_on(pool.acquire(&key, &Placement::new())).unwrap();
        let pooled = block_on(pool.acquire(&key, &Placement::new())).unwrap();
        pool.release(&pooled).unwrap();

        drop(pool);

        let destroyed = world.destroyed.borrow();
        assert!(destroyed.contains(&active.id));
        assert!(destroyed.contains(&pooled.id));
        assert_eq!(*world.released.borrow(), vec![key]);
    }

    #[test]
    fn object_without_capability_is_destroyed() {
        let world = Rc::new(World::default());
        world.without_capability.set(true);
        let pool = new_pool(&world);

        let outcome = block_on(pool.acquire(&AssetKey::new("decal"), &Placement::new()));

        assert!(matches!(outcome, Err(Error::InvalidAsset { .. })));
        assert_eq!(world.destroyed.borrow().len(), 1);
        assert_eq!(pool.live_count(), 0);
    }

    #[test]
    fn instantiate_failure_stops_prewarm() {
        let world = Rc::new(World::default());
        world.broken.set(true);
        let pool = new_pool(&world);
        let key = AssetKey::new("cube");

        let report = block_on(pool.prewarm(&key, 3)).unwrap();

        assert_eq!(report.created(), 0);
        assert!(matches!(
            report.stopped(),
            Some(PrewarmStop::Failed(Error::Instantiate { .. }))
        ));
        assert!(!pool.is_prewarming(&key));
    }

    #[test]
    fn stats_merge_every_source() {
        let world = Rc::new(World::default());
        let pool = new_pool(&world);
        let cube = AssetKey::new("cube");
        let sphere = AssetKey::new("sphere");

        block_on(pool.prewarm(&cube, 2)).unwrap();
        let _sphere = block_on(pool.acquire(&sphere, &Placement::new())).unwrap();

        let stats = pool.stats();

        assert_eq!(stats.pooled_total(), 2);
        assert_eq!(stats.active_total(), 1);
        assert_eq!(stats.acquires_in_flight(), 0);

        let keys: Vec<_> = stats.keys().map(KeyStats::asset_key).cloned().collect();
        assert_eq!(keys, vec![cube.clone(), sphere.clone()]);

        let cube_stats = stats.key(&cube).unwrap();
        assert!(cube_stats.template_loaded());
        assert_eq!(cube_stats.pooled(), 2);
        assert_eq!(cube_stats.load_requests(), 2);
        assert_eq!(cube_stats.display_name(), Some("cube"));

        assert_eq!(stats.key(&sphere).unwrap().active(), 1);
    }
}
