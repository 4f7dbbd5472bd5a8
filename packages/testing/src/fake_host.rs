//! In-memory host for exercising `asset_pool` without a game engine.
//!
//! [`FakeHost`] is the shared world. [`FakeLoader`] and [`FakeInstantiator`] plug it into a
//! pool and [`FakeObject`] is the handle of an object living in it. Tests script failures and
//! delays through the host and inspect what the pool did to the world afterwards.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use asset_pool::{
    AssetKey, AssetLoader, BackendError, InstanceId, Instantiator, Placement, PoolObject,
    Poolable,
};
use foldhash::{HashMap, HashSet};
use futures::channel::oneshot;

type DestroyHook = Box<dyn Fn(InstanceId)>;

#[derive(Default)]
struct HostState {
    next_id: Cell<u64>,
    objects: RefCell<Vec<FakeObject>>,

    loads: RefCell<Vec<AssetKey>>,
    releases: RefCell<Vec<AssetKey>>,
    destroyed: Cell<usize>,

    failing_loads: RefCell<HashSet<AssetKey>>,
    failing_instantiations: RefCell<HashSet<AssetKey>>,
    not_poolable: RefCell<HashSet<AssetKey>>,
    display_names: RefCell<HashMap<AssetKey, String>>,

    gated: Cell<bool>,
    gates: RefCell<Vec<oneshot::Sender<Result<(), BackendError>>>>,

    on_destroy: RefCell<Option<Rc<DestroyHook>>>,
}

/// Shared state of a fake object world.
///
/// Cloning the host yields another handle to the same world.
#[derive(Clone, Default)]
pub struct FakeHost {
    state: Rc<HostState>,
}

impl fmt::Debug for FakeHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeHost")
            .field("objects", &self.state.objects.borrow().len())
            .field("loads", &self.state.loads.borrow().len())
            .field("destroyed", &self.state.destroyed.get())
            .finish_non_exhaustive()
    }
}

impl FakeHost {
    /// Creates an empty world in which every load and instantiation succeeds immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every future load of `key` fail.
    pub fn fail_loads(&self, key: &AssetKey) {
        self.state.failing_loads.borrow_mut().insert(key.clone());
    }

    /// Makes loads of `key` succeed again.
    pub fn heal_loads(&self, key: &AssetKey) {
        self.state.failing_loads.borrow_mut().remove(key);
    }

    /// Makes every future instantiation from the template of `key` fail.
    pub fn fail_instantiations(&self, key: &AssetKey) {
        self.state
            .failing_instantiations
            .borrow_mut()
            .insert(key.clone());
    }

    /// Makes objects created from `key` lack the poolable capability.
    pub fn mark_not_poolable(&self, key: &AssetKey) {
        self.state.not_poolable.borrow_mut().insert(key.clone());
    }

    /// Sets the human-readable name the loader reports for `key`.
    pub fn set_display_name(&self, key: &AssetKey, name: &str) {
        self.state
            .display_names
            .borrow_mut()
            .insert(key.clone(), name.to_owned());
    }

    /// While enabled, loads do not complete until [`open_gates()`][Self::open_gates] or
    /// [`fail_gates()`][Self::fail_gates] is called.
    pub fn gate_loads(&self, gated: bool) {
        self.state.gated.set(gated);
    }

    /// Loads that are waiting at the gate.
    #[must_use]
    pub fn pending_loads(&self) -> usize {
        self.state.gates.borrow().len()
    }

    /// Lets every waiting load complete successfully.
    pub fn open_gates(&self) {
        for gate in self.state.gates.take() {
            drop(gate.send(Ok(())));
        }
    }

    /// Makes every waiting load fail.
    pub fn fail_gates(&self) {
        for gate in self.state.gates.take() {
            drop(gate.send(Err(BackendError::new("load failed at gate"))));
        }
    }

    /// Registers a callback the instantiator invokes after destroying an object, the way an
    /// engine reports destruction back to the pool.
    pub fn on_destroy(&self, hook: impl Fn(InstanceId) + 'static) {
        *self.state.on_destroy.borrow_mut() = Some(Rc::new(Box::new(hook)));
    }

    /// Destroys an object without going through the pool, as gameplay code or a scene unload
    /// would. The destroy hook is not invoked.
    pub fn destroy_externally(&self, object: &FakeObject) {
        object.state.alive.set(false);
        self.state.destroyed.set(self.state.destroyed.get().saturating_add(1));
    }

    /// How many times the template for `key` has been loaded.
    #[must_use]
    pub fn load_count(&self, key: &AssetKey) -> usize {
        self.state
            .loads
            .borrow()
            .iter()
            .filter(|loaded| *loaded == key)
            .count()
    }

    /// How many times the template for `key` has been handed back to the loader.
    #[must_use]
    pub fn release_count(&self, key: &AssetKey) -> usize {
        self.state
            .releases
            .borrow()
            .iter()
            .filter(|released| *released == key)
            .count()
    }

    /// Objects ever created in this world.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.state.objects.borrow().len()
    }

    /// Objects destroyed so far, by the pool or externally.
    #[must_use]
    pub fn destroyed_count(&self) -> usize {
        self.state.destroyed.get()
    }

    /// Objects that are still alive.
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.state
            .objects
            .borrow()
            .iter()
            .filter(|object| object.state.alive.get())
            .count()
    }

    /// Objects that are alive and active.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.state
            .objects
            .borrow()
            .iter()
            .filter(|object| object.state.alive.get() && object.state.active.get())
            .count()
    }

    fn allocate_id(&self) -> InstanceId {
        let id = self.state.next_id.get();
        self.state.next_id.set(id.wrapping_add(1));
        InstanceId::new(id)
    }
}

/// Template produced by [`FakeLoader`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FakeTemplate {
    key: AssetKey,
}

impl FakeTemplate {
    /// The key the template was loaded for.
    #[must_use]
    pub fn key(&self) -> &AssetKey {
        &self.key
    }
}

/// [`AssetLoader`] backed by a [`FakeHost`].
#[derive(Debug)]
pub struct FakeLoader {
    host: FakeHost,
}

impl FakeLoader {
    /// Creates a loader for the world of `host`.
    #[must_use]
    pub fn new(host: &FakeHost) -> Self {
        Self { host: host.clone() }
    }
}

impl AssetLoader for FakeLoader {
    type Template = FakeTemplate;

    async fn load(&self, key: &AssetKey) -> Result<FakeTemplate, BackendError> {
        let state = &self.host.state;
        state.loads.borrow_mut().push(key.clone());

        if state.gated.get() {
            let (sender, receiver) = oneshot::channel();
            state.gates.borrow_mut().push(sender);

            receiver
                .await
                .map_err(|_canceled| BackendError::new("gate was dropped"))??;
        }

        if state.failing_loads.borrow().contains(key) {
            return Err(BackendError::new(format!("no asset at address {key}")));
        }

        Ok(FakeTemplate { key: key.clone() })
    }

    fn release(&self, key: &AssetKey, _template: &FakeTemplate) {
        self.host.state.releases.borrow_mut().push(key.clone());
    }

    fn display_name(&self, key: &AssetKey, _template: &FakeTemplate) -> String {
        self.host
            .state
            .display_names
            .borrow()
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

/// [`Instantiator`] backed by a [`FakeHost`].
#[derive(Debug)]
pub struct FakeInstantiator {
    host: FakeHost,
}

impl FakeInstantiator {
    /// Creates an instantiator for the world of `host`.
    #[must_use]
    pub fn new(host: &FakeHost) -> Self {
        Self { host: host.clone() }
    }
}

impl Instantiator for FakeInstantiator {
    type Template = FakeTemplate;
    type Object = FakeObject;

    fn instantiate(&self, template: &FakeTemplate) -> Result<FakeObject, BackendError> {
        let state = &self.host.state;

        if state.failing_instantiations.borrow().contains(&template.key) {
            return Err(BackendError::new(format!(
                "cannot instantiate {}",
                template.key
            )));
        }

        let object = FakeObject {
            id: self.host.allocate_id(),
            key: template.key.clone(),
            poolable: !state.not_poolable.borrow().contains(&template.key),
            state: Rc::new(ObjectState {
                alive: Cell::new(true),
                // Engines typically spawn objects active.
                active: Cell::new(true),
                ..ObjectState::default()
            }),
        };

        state.objects.borrow_mut().push(object.clone());

        Ok(object)
    }

    fn destroy(&self, object: &FakeObject) {
        object.state.alive.set(false);
        self.host
            .state
            .destroyed
            .set(self.host.state.destroyed.get().saturating_add(1));

        let hook = self.host.state.on_destroy.borrow().as_ref().map(Rc::clone);

        if let Some(hook) = hook {
            hook(object.id);
        }
    }
}

#[derive(Debug, Default)]
struct ObjectState {
    alive: Cell<bool>,
    active: Cell<bool>,
    parked: Cell<bool>,
    acquires: Cell<usize>,
    releases: Cell<usize>,
    placement: Cell<Option<Placement>>,
}

/// Handle of an object living in a [`FakeHost`].
#[derive(Clone, Debug)]
pub struct FakeObject {
    id: InstanceId,
    key: AssetKey,
    poolable: bool,
    state: Rc<ObjectState>,
}

impl FakeObject {
    /// The key of the template the object was created from.
    #[must_use]
    pub fn key(&self) -> &AssetKey {
        &self.key
    }

    /// Times the object has been handed out by the pool.
    #[must_use]
    pub fn acquire_count(&self) -> usize {
        self.state.acquires.get()
    }

    /// Times the object has been returned to the pool.
    #[must_use]
    pub fn release_count(&self) -> usize {
        self.state.releases.get()
    }

    /// Whether the object sits in the holding area for pooled objects.
    #[must_use]
    pub fn is_parked(&self) -> bool {
        self.state.parked.get()
    }

    /// The placement most recently applied to the object.
    #[must_use]
    pub fn placement(&self) -> Option<Placement> {
        self.state.placement.get()
    }
}

impl Poolable for FakeObject {
    fn on_acquire(&self) {
        self.state
            .acquires
            .set(self.state.acquires.get().saturating_add(1));
    }

    fn on_release(&self) {
        self.state
            .releases
            .set(self.state.releases.get().saturating_add(1));
    }
}

impl PoolObject for FakeObject {
    fn id(&self) -> InstanceId {
        self.id
    }

    fn is_alive(&self) -> bool {
        self.state.alive.get()
    }

    fn is_active(&self) -> bool {
        self.state.active.get()
    }

    fn set_active(&self, active: bool) {
        self.state.active.set(active);
    }

    fn place(&self, placement: &Placement) {
        self.state.placement.set(Some(*placement));
        self.state.parked.set(false);
    }

    fn park(&self) {
        self.state.parked.set(true);
    }

    fn poolable(&self) -> Option<&dyn Poolable> {
        if self.poolable { Some(self) } else { None }
    }
}
