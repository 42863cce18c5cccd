//! Collections bound to an externally supplied resolver.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::collection::{CollectionItem, ReferenceCollection, SharedCollection};
use crate::config::IterationConfig;
use crate::constants::shuffle::BASE_SEED;
use crate::errors::CollectionError;
use crate::iter::{BoxedItemIter, ReferenceIter};
use crate::reference::Reference;
use crate::rng::ShuffleSeeds;

/// Storage-facing capability turning reference keys into items.
///
/// Implementations must report a missing key as `CollectionError::NotFound`
/// rather than inventing a placeholder item.
pub trait Resolver<T>: Send + Sync {
    /// Resolve a single key.
    fn resolve(&self, key: &str) -> Result<T, CollectionError>;

    /// Resolve keys positionally; override to amortize round trips.
    fn resolve_batch(&self, keys: &[&str]) -> Result<Vec<T>, CollectionError> {
        keys.iter().map(|key| self.resolve(key)).collect()
    }
}

/// Resolver backed by a per-key closure.
pub struct ResolverFn<F, T> {
    resolve: F,
    _item: PhantomData<fn() -> T>,
}

impl<F, T> ResolverFn<F, T>
where
    F: Fn(&str) -> Result<T, CollectionError> + Send + Sync,
{
    /// Wrap `resolve`.
    pub fn new(resolve: F) -> Self {
        Self {
            resolve,
            _item: PhantomData,
        }
    }
}

impl<F, T> Resolver<T> for ResolverFn<F, T>
where
    F: Fn(&str) -> Result<T, CollectionError> + Send + Sync,
{
    fn resolve(&self, key: &str) -> Result<T, CollectionError> {
        (self.resolve)(key)
    }
}

/// Resolver backed by a batch closure, e.g. one storage round trip per batch.
pub struct BatchResolverFn<F, T> {
    resolve: F,
    _item: PhantomData<fn() -> T>,
}

impl<F, T> BatchResolverFn<F, T>
where
    F: Fn(&[&str]) -> Result<Vec<T>, CollectionError> + Send + Sync,
{
    /// Wrap `resolve`.
    pub fn new(resolve: F) -> Self {
        Self {
            resolve,
            _item: PhantomData,
        }
    }
}

impl<F, T> Resolver<T> for BatchResolverFn<F, T>
where
    F: Fn(&[&str]) -> Result<Vec<T>, CollectionError> + Send + Sync,
{
    fn resolve(&self, key: &str) -> Result<T, CollectionError> {
        let mut items = (self.resolve)(&[key])?;
        CollectionError::ensure_batch_len(1, items.len())?;
        items
            .pop()
            .ok_or_else(|| CollectionError::not_found(&Reference::direct(key)))
    }

    fn resolve_batch(&self, keys: &[&str]) -> Result<Vec<T>, CollectionError> {
        (self.resolve)(keys)
    }
}

/// Base collection whose items come from a caller-supplied `Resolver`.
///
/// Only direct references resolve; derived references report no item.
pub struct DelegatingCollection<T> {
    references: Arc<[Reference]>,
    resolver: Arc<dyn Resolver<T>>,
    seeds: ShuffleSeeds,
}

impl<T: CollectionItem> DelegatingCollection<T> {
    /// Bind `resolver` to the ordered `references`.
    pub fn new(references: Vec<Reference>, resolver: impl Resolver<T> + 'static) -> Self {
        Self::from_shared(references.into(), Arc::new(resolver))
    }

    fn from_shared(references: Arc<[Reference]>, resolver: Arc<dyn Resolver<T>>) -> Self {
        Self {
            references,
            resolver,
            seeds: ShuffleSeeds::new(BASE_SEED),
        }
    }

    /// Wrap into a shared handle.
    pub fn into_shared(self) -> SharedCollection<T> {
        Arc::new(self)
    }
}

impl<T: CollectionItem> ReferenceCollection<T> for DelegatingCollection<T> {
    fn references(&self) -> Result<Arc<[Reference]>, CollectionError> {
        Ok(self.references.clone())
    }

    fn lookup(&self, reference: &Reference) -> Result<Option<T>, CollectionError> {
        match reference.key() {
            Some(key) => self.resolver.resolve(key).map(Some),
            None => Ok(None),
        }
    }

    fn lookup_batch(&self, references: &[Reference]) -> Result<Vec<Option<T>>, CollectionError> {
        let keys: Option<Vec<&str>> = references.iter().map(Reference::key).collect();
        let Some(keys) = keys else {
            return references
                .iter()
                .map(|reference| self.lookup(reference))
                .collect();
        };
        let items = self.resolver.resolve_batch(&keys)?;
        CollectionError::ensure_batch_len(keys.len(), items.len())?;
        Ok(items.into_iter().map(Some).collect())
    }

    fn iter_with(&self, config: IterationConfig) -> Result<BoxedItemIter<'_, T>, CollectionError> {
        Ok(Box::new(ReferenceIter::new(
            self,
            self.references.clone(),
            config,
        )))
    }

    fn rebind(&self, references: Vec<Reference>) -> Result<SharedCollection<T>, CollectionError> {
        Ok(Arc::new(Self::from_shared(
            references.into(),
            self.resolver.clone(),
        )))
    }

    fn shuffle_seeds(&self) -> &ShuffleSeeds {
        &self.seeds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::direct_references;

    fn lengths() -> SharedCollection<usize> {
        let resolver = ResolverFn::new(|key: &str| {
            if key.starts_with('x') {
                Err(CollectionError::not_found(&Reference::direct(key)))
            } else {
                Ok(key.len())
            }
        });
        DelegatingCollection::new(direct_references(["a", "bb", "ccc"]), resolver).into_shared()
    }

    #[test]
    fn resolves_single_and_batch() {
        let collection = lengths();
        assert_eq!(collection.dereference(&"bb".into()).unwrap(), 2);
        let refs = collection.references().unwrap();
        assert_eq!(collection.dereference_batch(&refs).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn resolver_not_found_propagates() {
        let collection = lengths();
        let err = collection.dereference(&"xyz".into()).unwrap_err();
        assert!(matches!(err, CollectionError::NotFound { .. }));
        let derived = Reference::indexed(Reference::direct("a"), 0);
        assert!(matches!(
            collection.dereference(&derived),
            Err(CollectionError::NotFound { .. })
        ));
    }

    #[test]
    fn short_batch_is_inconsistent() {
        let resolver = BatchResolverFn::new(|keys: &[&str]| {
            Ok(keys.iter().skip(1).map(|key| key.to_string()).collect())
        });
        let collection = DelegatingCollection::new(direct_references(["a", "b"]), resolver);
        let refs = collection.references().unwrap();
        assert!(matches!(
            collection.dereference_batch(&refs),
            Err(CollectionError::Inconsistent {
                expected: 2,
                actual: 1
            })
        ));
        assert!(matches!(
            collection.dereference(&"a".into()),
            Err(CollectionError::Inconsistent { .. })
        ));
    }

    #[test]
    fn rebind_keeps_resolver_and_exact_references() {
        let collection = lengths();
        let subset = direct_references(["ccc", "a"]);
        let rebound = collection.rebind(subset.clone()).unwrap();
        assert_eq!(&*rebound.references().unwrap(), subset.as_slice());
        assert_eq!(rebound.to_vec().unwrap(), vec![3, 1]);
    }
}
