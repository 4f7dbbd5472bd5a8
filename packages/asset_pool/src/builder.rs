use crate::{AssetLoader, AssetPool, Instantiator};

/// How many inactive objects the pool keeps per asset key.
///
/// The limit applies to pooled (inactive) objects only. It never limits how many objects can be
/// active at the same time, and it is enforced when objects are released, not when they are
/// created.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum PoolCapacity {
    /// Every released object is kept for reuse. This is the default.
    #[default]
    Unbounded,

    /// At most this many inactive objects are kept per key. Objects released while the pool
    /// for their key is full are destroyed.
    Bounded(usize),
}

impl PoolCapacity {
    /// Whether a pool currently holding `pooled` objects accepts one more.
    #[must_use]
    pub fn admits(self, pooled: usize) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Bounded(limit) => pooled < limit,
        }
    }
}

/// Builder for configuring an [`AssetPool`].
///
/// The configuration is fixed once the pool is built.
///
/// # Example
///
/// ```rust
/// use asset_pool::{AssetPool, PoolCapacity};
/// use testing::{FakeHost, FakeInstantiator, FakeLoader};
///
/// let host = FakeHost::new();
/// let pool = AssetPool::builder(FakeLoader::new(&host), FakeInstantiator::new(&host))
///     .max_pool_size(16)
///     .build();
///
/// assert_eq!(pool.capacity(), PoolCapacity::Bounded(16));
/// ```
#[derive(Debug)]
#[must_use]
pub struct AssetPoolBuilder<L, I> {
    loader: L,
    instantiator: I,
    capacity: PoolCapacity,
}

impl<L, I> AssetPoolBuilder<L, I>
where
    L: AssetLoader,
    I: Instantiator<Template = L::Template>,
{
    pub(crate) fn new(loader: L, instantiator: I) -> Self {
        Self {
            loader,
            instantiator,
            capacity: PoolCapacity::default(),
        }
    }

    /// Keeps at most `size` inactive objects per asset key.
    ///
    /// A size of zero disables reuse: every released object is destroyed. Objects created by
    /// [`AssetPool::prewarm()`] are not subject to the limit.
    pub fn max_pool_size(self, size: usize) -> Self {
        self.capacity(PoolCapacity::Bounded(size))
    }

    /// Sets the per-key capacity. Default is [`PoolCapacity::Unbounded`].
    pub fn capacity(mut self, capacity: PoolCapacity) -> Self {
        self.capacity = capacity;
        self
    }

    /// Builds the pool with the configured settings.
    #[must_use]
    pub fn build(self) -> AssetPool<L, I> {
        AssetPool::from_parts(self.loader, self.instantiator, self.capacity)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn unbounded_admits_everything() {
        assert!(PoolCapacity::Unbounded.admits(0));
        assert!(PoolCapacity::Unbounded.admits(usize::MAX));
    }

    #[test]
    fn bounded_admits_below_limit() {
        let capacity = PoolCapacity::Bounded(2);

        assert!(capacity.admits(0));
        assert!(capacity.admits(1));
        assert!(!capacity.admits(2));
        assert!(!PoolCapacity::Bounded(0).admits(0));
    }
}
