use crate::AssetKey;

/// Point-in-time snapshot of the pool, for diagnostics.
///
/// Obtained from [`AssetPool::stats()`][crate::AssetPool::stats]. Keys appear in the snapshot if
/// they have a cached template, pooled objects, active objects or a prewarm in flight.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PoolStats {
    pub(crate) keys: Vec<KeyStats>,
    pub(crate) acquires_in_flight: usize,
}

impl PoolStats {
    /// Per-key statistics, ordered by key.
    pub fn keys(&self) -> impl Iterator<Item = &KeyStats> {
        self.keys.iter()
    }

    /// Statistics of one key, if the pool knows anything about it.
    #[must_use]
    pub fn key(&self, key: &AssetKey) -> Option<&KeyStats> {
        self.keys
            .binary_search_by(|stats| stats.key.cmp(key))
            .ok()
            .and_then(|index| self.keys.get(index))
    }

    /// Inactive objects across all keys.
    #[must_use]
    pub fn pooled_total(&self) -> usize {
        self.keys.iter().map(|stats| stats.pooled).sum()
    }

    /// Active objects across all keys.
    #[must_use]
    pub fn active_total(&self) -> usize {
        self.keys.iter().map(|stats| stats.active).sum()
    }

    /// Acquires currently waiting for a template to load.
    #[must_use]
    pub fn acquires_in_flight(&self) -> usize {
        self.acquires_in_flight
    }
}

/// Statistics of one asset key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct KeyStats {
    pub(crate) key: AssetKey,
    pub(crate) pooled: usize,
    pub(crate) active: usize,
    pub(crate) template_loaded: bool,
    pub(crate) load_requests: u64,
    pub(crate) display_name: Option<String>,
    pub(crate) prewarming: bool,
}

impl KeyStats {
    pub(crate) fn empty(key: AssetKey) -> Self {
        Self {
            key,
            pooled: 0,
            active: 0,
            template_loaded: false,
            load_requests: 0,
            display_name: None,
            prewarming: false,
        }
    }

    /// The key these statistics describe.
    #[must_use]
    pub fn asset_key(&self) -> &AssetKey {
        &self.key
    }

    /// Inactive objects waiting for reuse.
    #[must_use]
    pub fn pooled(&self) -> usize {
        self.pooled
    }

    /// Objects currently handed out to callers.
    #[must_use]
    pub fn active(&self) -> usize {
        self.active
    }

    /// Whether the template is loaded and cached.
    #[must_use]
    pub fn template_loaded(&self) -> bool {
        self.template_loaded
    }

    /// How many times the template has been requested since it was first loaded.
    ///
    /// A count that keeps growing while [`pooled()`][Self::pooled] stays at zero means objects
    /// are created and never returned.
    #[must_use]
    pub fn load_requests(&self) -> u64 {
        self.load_requests
    }

    /// Human-readable name of the asset, once its template has loaded.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Whether a prewarm for this key is in flight.
    #[must_use]
    pub fn prewarming(&self) -> bool {
        self.prewarming
    }
}
