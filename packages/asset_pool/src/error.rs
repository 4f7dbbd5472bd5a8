use std::sync::Arc;

use thiserror::Error;

use crate::{AssetKey, InstanceId};

/// Errors reported by [`AssetPool`][crate::AssetPool] operations.
///
/// None of these are fatal to the pool. A failed operation leaves the pool in a consistent state
/// and the caller decides whether to retry, fall back or ignore the failure.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller supplied a key with an empty or blank address.
    #[error("asset key '{key}' is not a valid asset address")]
    InvalidKey {
        /// The rejected key.
        key: AssetKey,
    },

    /// The asset loader failed to produce a template for the key.
    #[error("failed to load asset '{key}': {source}")]
    Load {
        /// The key whose template could not be loaded.
        key: AssetKey,

        /// The failure reported by the loader.
        source: BackendError,
    },

    /// The instantiator failed to produce an object from a loaded template.
    #[error("failed to instantiate asset '{key}': {source}")]
    Instantiate {
        /// The key whose template could not be instantiated.
        key: AssetKey,

        /// The failure reported by the instantiator.
        source: BackendError,
    },

    /// The asset produced an object without the poolable capability. The object was destroyed.
    ///
    /// This is a content defect. Retrying will fail the same way.
    #[error("asset '{key}' produced an object that is not poolable")]
    InvalidAsset {
        /// The misconfigured asset.
        key: AssetKey,
    },

    /// The object was not produced by this pool or has already been destroyed.
    #[error("object {id} is not tracked by this pool")]
    UnknownInstance {
        /// Identity of the rejected object.
        id: InstanceId,
    },

    /// The object is already sitting inactive in the pool.
    #[error("object {id} has already been released")]
    NotActive {
        /// Identity of the rejected object.
        id: InstanceId,
    },

    /// A prewarm for the same key is already in flight. The request was dropped.
    #[error("a prewarm for asset '{key}' is already running")]
    AlreadyRunning {
        /// The key being prewarmed.
        key: AssetKey,
    },

    /// The operation was cancelled before it could produce an object.
    #[error("operation on asset '{key}' was cancelled")]
    Cancelled {
        /// The key the operation was working on.
        key: AssetKey,
    },
}

impl Error {
    /// The asset key involved in the failure, if the failure is tied to one.
    #[must_use]
    pub fn key(&self) -> Option<&AssetKey> {
        match self {
            Self::InvalidKey { key }
            | Self::Load { key, .. }
            | Self::Instantiate { key, .. }
            | Self::InvalidAsset { key }
            | Self::AlreadyRunning { key }
            | Self::Cancelled { key } => Some(key),
            Self::UnknownInstance { .. } | Self::NotActive { .. } => None,
        }
    }
}

/// A failure reported by an [`AssetLoader`][crate::AssetLoader] or
/// [`Instantiator`][crate::Instantiator].
///
/// The message is shared, so the error is cheap to clone when one failed load is observed by
/// many waiters.
///
/// # Example
///
/// ```rust
/// use asset_pool::BackendError;
///
/// let error = BackendError::new("file not found: props/crate.prefab");
/// assert_eq!(error.to_string(), "file not found: props/crate.prefab");
/// ```
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{message}")]
pub struct BackendError {
    message: Arc<str>,
}

impl BackendError {
    /// Creates an error with a human-readable description of the failure.
    #[must_use]
    pub fn new(message: impl Into<Arc<str>>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The human-readable description of the failure.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A specialized `Result` type for pool operations, returning the crate's [`Error`] type as the
/// error value.
pub(crate) type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::fmt::Debug;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(Error: Send, Sync, Debug, Clone);
    assert_impl_all!(BackendError: Send, Sync, Debug, Clone);

    #[test]
    fn load_error_mentions_key_and_cause() {
        let error = Error::Load {
            key: AssetKey::new("cube"),
            source: BackendError::new("disk on fire"),
        };

        let message = error.to_string();
        assert!(message.contains("cube"));
        assert!(message.contains("disk on fire"));
    }

    #[test]
    fn key_is_exposed_where_relevant() {
        let cancelled = Error::Cancelled {
            key: AssetKey::new("cube"),
        };
        assert_eq!(cancelled.key(), Some(&AssetKey::new("cube")));

        let unknown = Error::UnknownInstance {
            id: InstanceId::new(3),
        };
        assert_eq!(unknown.key(), None);
    }
}
