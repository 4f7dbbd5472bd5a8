#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A keyed pool of reusable objects created from asynchronously loaded assets.
//!
//! Games and other interactive applications create and destroy the same kinds of objects over
//! and over: projectiles, particles, enemies, UI rows. Creating such an object means loading an
//! asset (a template) and then instantiating it, both of which can be expensive. This package
//! keeps released objects around for reuse and loads each template only once.
//!
//! The pool is host-agnostic. The host engine plugs in through two traits:
//!
//! * [`AssetLoader`] loads and releases templates, identified by [`AssetKey`].
//! * [`Instantiator`] creates objects from templates and destroys them.
//!
//! The objects themselves implement [`PoolObject`], and objects that can be pooled also expose
//! the [`Poolable`] capability to be notified when they are acquired and released.
//!
//! # Operations
//!
//! * [`AssetPool::acquire()`] hands out an active object, reusing a pooled one if possible.
//! * [`AssetPool::release()`] returns an object to the pool, destroying it if the pool for its
//!   key is at capacity.
//! * [`AssetPool::prewarm()`] fills the pool for a key ahead of demand.
//! * [`AssetPool::clear_all()`] and [`AssetPool::shutdown()`] tear everything down.
//!
//! # Example
//!
//! ```rust
//! use asset_pool::{AssetKey, AssetPool, Placement};
//! use futures::executor::block_on;
//! use testing::{FakeHost, FakeInstantiator, FakeLoader};
//!
//! let host = FakeHost::new();
//! let pool = AssetPool::builder(FakeLoader::new(&host), FakeInstantiator::new(&host))
//!     .max_pool_size(2)
//!     .build();
//!
//! let cube = AssetKey::new("cube");
//!
//! block_on(async {
//!     let report = pool.prewarm(&cube, 3).await.unwrap();
//!     assert_eq!(report.created(), 3);
//!
//!     let object = pool
//!         .acquire(&cube, &Placement::new().position([1.0, 2.0, 3.0]))
//!         .await
//!         .unwrap();
//!     assert_eq!(pool.pooled_count(&cube), 2);
//!
//!     pool.release(&object).unwrap();
//! });
//!
//! // The template was loaded only once.
//! assert_eq!(host.load_count(&cube), 1);
//! ```
//!
//! # Threading
//!
//! The pool is single-threaded: [`AssetPool`] is neither [`Send`] nor [`Sync`]. Operations run
//! cooperatively on the owning thread and suspend only while a template loads.

mod backend;
mod builder;
mod cache;
mod error;
mod key;
mod metrics;
mod placement;
mod pool;
mod registry;
mod stats;
mod store;
mod tracker;

pub use backend::*;
pub use builder::*;
pub use error::{BackendError, Error};
pub use key::*;
pub use placement::*;
pub use pool::{AssetPool, PrewarmReport, PrewarmStop};
pub use stats::*;
