use std::sync::Arc;

use derive_more::derive::Display;

/// Identifies a loadable asset.
///
/// The canonical representation is the address of the asset as understood by the
/// [`AssetLoader`][crate::AssetLoader]. Keys are cheap to clone and are used as the
/// dictionary key in every part of the pool.
///
/// A key whose address is empty or consists only of whitespace is invalid. Operations that
/// take a key reject invalid keys with [`Error::InvalidKey`][crate::Error::InvalidKey].
///
/// # Example
///
/// ```rust
/// use asset_pool::AssetKey;
///
/// let key = AssetKey::new("props/crate.prefab");
///
/// assert_eq!(key.address(), "props/crate.prefab");
/// assert!(key.is_valid());
/// assert!(!AssetKey::new("  ").is_valid());
/// ```
#[derive(Clone, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("{address}")]
pub struct AssetKey {
    address: Arc<str>,
}

impl AssetKey {
    /// Creates a key for the asset at the given address.
    #[must_use]
    pub fn new(address: impl Into<Arc<str>>) -> Self {
        Self {
            address: address.into(),
        }
    }

    /// The address this key refers to.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether the key can be used to load an asset.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.address.trim().is_empty()
    }
}

impl From<&str> for AssetKey {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for AssetKey {
    fn from(address: String) -> Self {
        Self::new(address)
    }
}

/// Identity of a live object produced by an [`Instantiator`][crate::Instantiator].
///
/// The host assigns identities. Two handles to the same host object must report the same
/// identity and two distinct objects alive at the same time must never share one.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("#{_0}")]
pub struct InstanceId(u64);

impl InstanceId {
    /// Wraps a host-assigned identity value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The host-assigned identity value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn keys_with_same_address_are_equal() {
        let a = AssetKey::new("cube");
        let b = AssetKey::from("cube".to_string());

        assert_eq!(a, b);

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn blank_keys_are_invalid() {
        assert!(!AssetKey::new("").is_valid());
        assert!(!AssetKey::new(" \t\n").is_valid());
        assert!(AssetKey::new("a").is_valid());
    }

    #[test]
    fn display_formats() {
        assert_eq!(AssetKey::new("enemies/orc").to_string(), "enemies/orc");
        assert_eq!(InstanceId::new(17).to_string(), "#17");
    }
}
