//! Metrics for the asset pool.
//!
//! Counters describe how the pool satisfies demand: how often an acquire is served from the
//! pool versus by creating a new object, and how many objects are destroyed because the pool
//! for their key was full.

use nm::{Event, Magnitude};

/// Histogram buckets for template load time in milliseconds.
///
/// Loads range from an already-resident asset (sub-millisecond) to a cold read from slow
/// storage or the network.
const LOAD_TIME_MS_BUCKETS: &[Magnitude] = &[0, 1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000];

thread_local! {
    /// Acquire served by reusing a pooled object.
    pub(crate) static ACQUIRE_REUSED: Event = Event::builder()
        .name("asset_pool_acquire_reused")
        .build();

    /// Acquire served by instantiating a new object.
    pub(crate) static ACQUIRE_CREATED: Event = Event::builder()
        .name("asset_pool_acquire_created")
        .build();

    /// Object created by a prewarm.
    pub(crate) static PREWARM_CREATED: Event = Event::builder()
        .name("asset_pool_prewarm_created")
        .build();

    /// Released object destroyed because the pool for its key was at capacity.
    pub(crate) static EVICTED: Event = Event::builder()
        .name("asset_pool_evicted")
        .build();

    /// Pooled object found destroyed by the host when it was about to be reused.
    pub(crate) static DEAD_DISCARDED: Event = Event::builder()
        .name("asset_pool_dead_discarded")
        .build();

    /// Time taken by the asset loader to produce a template.
    pub(crate) static LOAD_TIME_MS: Event = Event::builder()
        .name("asset_pool_load_time_ms")
        .histogram(LOAD_TIME_MS_BUCKETS)
        .build();
}
