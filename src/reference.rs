//! Reference keys that address items inside a collection.
//!
//! A `Reference` is opaque to callers: uniqueness within one collection's
//! reference space is the caller's responsibility, and only the collection that
//! produced a reference knows how to resolve it. Expanding mutators address
//! their outputs with `Indexed` references, which nest when expanding layers
//! are stacked.

use std::fmt;
use std::sync::Arc;

use crate::constants::reference::SEPARATOR;
use crate::types::ReferenceKey;

/// Addressable unit inside a collection's reference space.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reference {
    /// A caller- or storage-provided key.
    Direct(Arc<str>),
    /// Output `index` of an expanding mutation applied to the item under the parent reference.
    Indexed(Arc<Reference>, usize),
}

impl Reference {
    /// Build a direct reference from a key.
    pub fn direct(key: impl AsRef<str>) -> Self {
        Self::Direct(Arc::from(key.as_ref()))
    }

    /// Build a reference to the `index`-th output derived from `parent`.
    pub fn indexed(parent: Reference, index: usize) -> Self {
        Self::Indexed(Arc::new(parent), index)
    }

    /// Key of a direct reference, `None` for derived ones.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Direct(key) => Some(key.as_ref()),
            Self::Indexed(..) => None,
        }
    }

    /// Parent reference and output index of a derived reference.
    pub fn parent(&self) -> Option<(&Reference, usize)> {
        match self {
            Self::Direct(_) => None,
            Self::Indexed(parent, index) => Some((parent.as_ref(), *index)),
        }
    }

    /// Key of the direct reference this one was ultimately derived from.
    pub fn root_key(&self) -> &str {
        match self {
            Self::Direct(key) => key.as_ref(),
            Self::Indexed(parent, _) => parent.root_key(),
        }
    }

    /// Render the reference as a flat key, e.g. `rec-1/0/2`.
    pub fn to_key(&self) -> ReferenceKey {
        self.to_string()
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(key) => f.write_str(key),
            Self::Indexed(parent, index) => write!(f, "{parent}{SEPARATOR}{index}"),
        }
    }
}

impl From<&str> for Reference {
    fn from(key: &str) -> Self {
        Self::direct(key)
    }
}

impl From<String> for Reference {
    fn from(key: String) -> Self {
        Self::Direct(Arc::from(key))
    }
}

/// Convert a list of keys into direct references.
pub fn direct_references<I, S>(keys: I) -> Vec<Reference>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keys.into_iter().map(Reference::direct).collect()
}
