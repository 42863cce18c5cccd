//! The collection contract shared by every layer.
//!
//! Ownership model:
//! - Layers hold their wrapped collection as a `SharedCollection<T>` and never
//!   mutate it, so derived views share one resolver read-only.
//! - `rebind` and the shuffles always produce a new view; the receiver keeps its
//!   own references for its whole life.

use std::sync::Arc;

use crate::cache::CachingCollection;
use crate::config::{CacheMode, FilterMode, IterationConfig};
use crate::errors::CollectionError;
use crate::filter::{FilteringCollection, ItemFilter};
use crate::folds::{FoldRole, FoldSpec};
use crate::iter::BoxedItemIter;
use crate::mutate::{Mutator, MutatingCollection};
use crate::reference::Reference;
use crate::rng::{ShuffleSeeds, shuffle_references};
use crate::stride::{StrideCollection, StrideSelection};
use crate::types::ShuffleSeed;

/// Shared handle to any collection layer.
pub type SharedCollection<T> = Arc<dyn ReferenceCollection<T>>;

/// Bounds every item type flowing through the framework satisfies.
pub trait CollectionItem: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> CollectionItem for T {}

/// Ordered reference sequence plus the ability to resolve those references to items.
///
/// Implementations must keep `references()` stable for the life of the instance
/// and produce items from iteration in reference order.
pub trait ReferenceCollection<T>: Send + Sync {
    /// The ordered references addressed by this view.
    fn references(&self) -> Result<Arc<[Reference]>, CollectionError>;

    /// Resolve one reference, `Ok(None)` when no item exists under it.
    fn lookup(&self, reference: &Reference) -> Result<Option<T>, CollectionError>;

    /// Resolve references positionally; the result has one entry per reference.
    fn lookup_batch(&self, references: &[Reference]) -> Result<Vec<Option<T>>, CollectionError> {
        references
            .iter()
            .map(|reference| self.lookup(reference))
            .collect()
    }

    /// Resolve one reference, failing with `NotFound` when it has no item.
    fn dereference(&self, reference: &Reference) -> Result<T, CollectionError> {
        self.lookup(reference)?
            .ok_or_else(|| CollectionError::not_found(reference))
    }

    /// Resolve references positionally, failing when any reference has no item.
    fn dereference_batch(&self, references: &[Reference]) -> Result<Vec<T>, CollectionError> {
        let items = self.lookup_batch(references)?;
        CollectionError::ensure_batch_len(references.len(), items.len())?;
        references
            .iter()
            .zip(items)
            .map(|(reference, item)| item.ok_or_else(|| CollectionError::not_found(reference)))
            .collect()
    }

    /// Number of references in this view.
    fn len(&self) -> Result<usize, CollectionError> {
        Ok(self.references()?.len())
    }

    /// Returns `true` when this view has no references.
    fn is_empty(&self) -> Result<bool, CollectionError> {
        Ok(self.len()? == 0)
    }

    /// Iterate items in reference order using the given resolution strategy.
    fn iter_with(&self, config: IterationConfig) -> Result<BoxedItemIter<'_, T>, CollectionError>;

    /// Iterate items one reference at a time.
    fn iter(&self) -> Result<BoxedItemIter<'_, T>, CollectionError> {
        self.iter_with(IterationConfig::default())
    }

    /// Materialize every item of this view.
    fn to_vec(&self) -> Result<Vec<T>, CollectionError> {
        self.iter()?.collect()
    }

    /// New view over exactly `references`, which must come from this view's reference space.
    fn rebind(&self, references: Vec<Reference>) -> Result<SharedCollection<T>, CollectionError>;

    /// Seed generator backing unseeded shuffles of this instance.
    fn shuffle_seeds(&self) -> &ShuffleSeeds;

    /// New view whose references are a deterministic permutation of these.
    fn shuffle_with_seed(&self, seed: ShuffleSeed) -> Result<SharedCollection<T>, CollectionError> {
        let mut references = self.references()?.to_vec();
        shuffle_references(&mut references, seed);
        self.rebind(references)
    }

    /// New view with a fresh permutation; successive calls on one instance differ.
    fn shuffle(&self) -> Result<SharedCollection<T>, CollectionError> {
        let seed = self.shuffle_seeds().next_seed();
        self.shuffle_with_seed(seed)
    }
}

/// Layering helpers available on every shared collection.
pub trait CollectionExt<T: CollectionItem> {
    /// Keep only items accepted by `filter`.
    fn filtered<F>(&self, filter: F, mode: FilterMode) -> SharedCollection<T>
    where
        F: ItemFilter<T> + 'static,
        T: PartialEq;

    /// Map every item through `mutator`.
    fn mutated<O, M>(&self, mutator: M) -> Result<SharedCollection<O>, CollectionError>
    where
        O: CollectionItem,
        M: Mutator<T, O> + 'static;

    /// Select items by position.
    fn strided(&self, selection: StrideSelection) -> Result<SharedCollection<T>, CollectionError>;

    /// Memoize resolved items by reference.
    fn cached(&self, mode: CacheMode) -> Result<SharedCollection<T>, CollectionError>;

    /// Training or testing view of fold `fold_index` under `spec`.
    fn fold(
        &self,
        spec: &FoldSpec,
        fold_index: usize,
        role: FoldRole,
    ) -> Result<SharedCollection<T>, CollectionError>;
}

impl<T: CollectionItem> CollectionExt<T> for SharedCollection<T> {
    fn filtered<F>(&self, filter: F, mode: FilterMode) -> SharedCollection<T>
    where
        F: ItemFilter<T> + 'static,
        T: PartialEq,
    {
        Arc::new(FilteringCollection::new(self.clone(), filter, mode))
    }

    fn mutated<O, M>(&self, mutator: M) -> Result<SharedCollection<O>, CollectionError>
    where
        O: CollectionItem,
        M: Mutator<T, O> + 'static,
    {
        Ok(Arc::new(MutatingCollection::new(self.clone(), mutator)?))
    }

    fn strided(&self, selection: StrideSelection) -> Result<SharedCollection<T>, CollectionError> {
        Ok(Arc::new(StrideCollection::new(self.clone(), selection)?))
    }

    fn cached(&self, mode: CacheMode) -> Result<SharedCollection<T>, CollectionError> {
        Ok(Arc::new(CachingCollection::new(self.clone(), mode)?))
    }

    fn fold(
        &self,
        spec: &FoldSpec,
        fold_index: usize,
        role: FoldRole,
    ) -> Result<SharedCollection<T>, CollectionError> {
        spec.view(self.clone(), fold_index, role)
    }
}
