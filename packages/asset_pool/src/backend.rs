//! Contracts between the pool and the host that owns assets and objects.
//!
//! The pool never touches asset storage or the object world directly. Everything it does to
//! them goes through the traits in this module, which the host implements:
//!
//! * [`AssetLoader`] turns an [`AssetKey`] into a loaded template and takes templates back.
//! * [`Instantiator`] turns a template into a live object and destroys objects.
//! * [`PoolObject`] is the host's handle to a live object.
//! * [`Poolable`] is the capability an object needs to be managed by the pool.
//!
//! All methods are called on the thread that owns the pool. None of them may call back into
//! the pool, with one exception: [`Instantiator::destroy()`] may synchronously report the
//! destruction through [`AssetPool::notify_destroyed()`][crate::AssetPool::notify_destroyed].

use std::future::Future;

use crate::{AssetKey, BackendError, InstanceId, Placement};

/// Lifecycle hooks of an object managed by the pool.
///
/// The pool calls [`on_acquire()`][Self::on_acquire] after the object has been placed and
/// activated and [`on_release()`][Self::on_release] before it is deactivated. Implementations
/// reset per-use state (timers, velocities, health) in these hooks so nothing leaks from one
/// use of a pooled object into the next.
pub trait Poolable {
    /// The object has been handed out to a caller.
    fn on_acquire(&self);

    /// The object is being returned to the pool or destroyed.
    fn on_release(&self);
}

/// The host's handle to a live object produced from a template.
///
/// Handles are cheap to clone and all clones refer to the same host object, in the way an
/// entity id or a reference-counted pointer would. The pool keeps one clone of every object it
/// created until the object is destroyed.
pub trait PoolObject: Clone + 'static {
    /// Identity of the host object.
    fn id(&self) -> InstanceId;

    /// Whether the host object still exists. Objects can be destroyed behind the pool's back,
    /// in which case the pool discards its handle instead of reusing it.
    fn is_alive(&self) -> bool;

    /// Whether the host object is currently active.
    fn is_active(&self) -> bool;

    /// Activates or deactivates the host object.
    fn set_active(&self, active: bool);

    /// Applies transform parameters before the object is activated.
    fn place(&self, placement: &Placement);

    /// Moves the object into the neutral holding area used for pooled objects.
    fn park(&self);

    /// The poolable capability of the object, if it has one.
    ///
    /// Objects without the capability cannot be pooled. The pool destroys them immediately and
    /// reports [`Error::InvalidAsset`][crate::Error::InvalidAsset].
    fn poolable(&self) -> Option<&dyn Poolable>;
}

/// Loads templates for asset keys.
///
/// The pool deduplicates load requests: `load()` is called at most once per key until the
/// template is released again through [`release()`][Self::release].
pub trait AssetLoader: 'static {
    /// The loaded, not yet instantiated asset.
    type Template: 'static;

    /// Loads the template for `key`.
    fn load(&self, key: &AssetKey) -> impl Future<Output = Result<Self::Template, BackendError>>;

    /// Gives a template obtained from [`load()`][Self::load] back to the loader.
    ///
    /// The pool only calls this once every object created from the template is destroyed.
    fn release(&self, key: &AssetKey, template: &Self::Template);

    /// Human-readable name of the asset, used for diagnostics only.
    fn display_name(&self, key: &AssetKey, _template: &Self::Template) -> String {
        key.to_string()
    }
}

/// Creates and destroys objects from loaded templates.
pub trait Instantiator: 'static {
    /// The template type this instantiator consumes.
    type Template: 'static;

    /// The handle type of the objects this instantiator produces.
    type Object: PoolObject;

    /// Creates a new object from `template`.
    ///
    /// The new object may be active or inactive, the pool sets the activation state it needs.
    fn instantiate(&self, template: &Self::Template) -> Result<Self::Object, BackendError>;

    /// Destroys the host object.
    fn destroy(&self, object: &Self::Object);
}
