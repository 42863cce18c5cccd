//! Positional selection layer.
//!
//! A selection takes the first `first_n` items unconditionally, then walks the
//! rest in strides of `stride_size`, keeping either only the item at
//! `stride_index` of each stride or every item but that one, until `max_items`
//! have been taken. Excluded items are stepped over with
//! [`ItemIterator::skip_next`] and never resolved.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};

use crate::collection::{CollectionItem, ReferenceCollection, SharedCollection};
use crate::config::{IterationConfig, StrideKeep};
use crate::constants::shuffle::FILTER_SEED;
use crate::errors::CollectionError;
use crate::iter::{BoxedItemIter, ItemIterator};
use crate::reference::Reference;
use crate::rng::ShuffleSeeds;
use crate::types::StridePosition;

/// Positional selection parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrideSelection {
    /// Items per stride; `0` disables striding so only the caps apply.
    pub stride_size: usize,
    /// Position within each stride that `keep` refers to.
    pub stride_index: StridePosition,
    /// Whether the item at `stride_index` is the one kept or the one dropped.
    pub keep: StrideKeep,
    /// Upper bound on selected items.
    pub max_items: Option<usize>,
    /// Leading items taken before striding starts.
    pub first_n: usize,
}

impl StrideSelection {
    /// No striding, at most `max_items` items.
    pub fn limit(max_items: usize) -> Self {
        Self {
            stride_size: 0,
            stride_index: 0,
            keep: StrideKeep::Only,
            max_items: Some(max_items),
            first_n: 0,
        }
    }

    /// Keep or drop the item at `stride_index` of every stride of `stride_size` items.
    pub fn every(stride_size: usize, stride_index: StridePosition, keep: StrideKeep) -> Self {
        Self {
            stride_size,
            stride_index,
            keep,
            max_items: None,
            first_n: 0,
        }
    }

    /// Cap the number of selected items.
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }

    /// Take the first `first_n` items before striding.
    pub fn with_first_n(mut self, first_n: usize) -> Self {
        self.first_n = first_n;
        self
    }

    /// Reject out-of-range parameter combinations.
    pub fn validate(&self) -> Result<(), CollectionError> {
        if self.stride_size == 1 {
            return Err(CollectionError::invalid(
                "stride_size must be 0 (no striding) or at least 2",
            ));
        }
        if self.stride_size > 0 && self.stride_index >= self.stride_size {
            return Err(CollectionError::invalid(format!(
                "stride_index {} outside stride of {}",
                self.stride_index, self.stride_size
            )));
        }
        if let Some(max_items) = self.max_items
            && self.first_n > max_items
        {
            return Err(CollectionError::invalid(format!(
                "first_n {} exceeds max_items {max_items}",
                self.first_n
            )));
        }
        Ok(())
    }

    /// Select from an in-memory sequence.
    pub fn apply<X: Clone>(&self, items: &[X]) -> Vec<X> {
        let mut cursor = StrideCursor::new(*self);
        let mut selected = Vec::new();
        for item in items {
            match cursor.step() {
                Step::Take => selected.push(item.clone()),
                Step::Skip => {}
                Step::Stop => break,
            }
        }
        selected
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    Take,
    Skip,
    Stop,
}

/// Decides, one position at a time, whether the next item is selected.
#[derive(Debug)]
struct StrideCursor {
    selection: StrideSelection,
    seen: usize,
    taken: usize,
}

impl StrideCursor {
    fn new(selection: StrideSelection) -> Self {
        Self {
            selection,
            seen: 0,
            taken: 0,
        }
    }

    fn step(&mut self) -> Step {
        let selection = &self.selection;
        if selection.max_items.is_some_and(|max| self.taken >= max) {
            return Step::Stop;
        }
        let position = self.seen;
        self.seen += 1;
        let take = if position < selection.first_n || selection.stride_size == 0 {
            true
        } else {
            let phase = (position - selection.first_n) % selection.stride_size;
            match selection.keep {
                StrideKeep::Only => phase == selection.stride_index,
                StrideKeep::AllBut => phase != selection.stride_index,
            }
        };
        if take {
            self.taken += 1;
            Step::Take
        } else {
            Step::Skip
        }
    }
}

/// Applies a selection to an inner item iterator, skipping excluded items unresolved.
pub struct StrideIter<'a, T> {
    inner: BoxedItemIter<'a, T>,
    cursor: StrideCursor,
    done: bool,
}

impl<'a, T> StrideIter<'a, T> {
    /// Select from `inner` according to `selection`.
    pub fn new(inner: BoxedItemIter<'a, T>, selection: StrideSelection) -> Self {
        Self {
            inner,
            cursor: StrideCursor::new(selection),
            done: false,
        }
    }

    /// Advance the inner iterator to the next selected item without resolving it.
    ///
    /// Returns `Ok(false)` once the selection or the inner iterator is exhausted.
    fn seek(&mut self) -> Result<bool, CollectionError> {
        loop {
            match self.cursor.step() {
                Step::Take => return Ok(true),
                Step::Stop => return Ok(false),
                Step::Skip => {
                    if !self.inner.skip_next()? {
                        return Ok(false);
                    }
                }
            }
        }
    }
}

impl<T> Iterator for StrideIter<'_, T> {
    type Item = Result<T, CollectionError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.seek() {
            Ok(true) => {}
            Ok(false) => {
                self.done = true;
                return None;
            }
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        }
        let next = self.inner.next();
        if !matches!(next, Some(Ok(_))) {
            self.done = true;
        }
        next
    }
}

impl<T> ItemIterator<T> for StrideIter<'_, T> {
    fn skip_next(&mut self) -> Result<bool, CollectionError> {
        if self.done {
            return Ok(false);
        }
        let skipped = self.seek().and_then(|found| {
            if found {
                self.inner.skip_next()
            } else {
                Ok(false)
            }
        });
        if !matches!(skipped, Ok(true)) {
            self.done = true;
        }
        skipped
    }
}

/// Stride/selection layer over a shared collection.
pub struct StrideCollection<T> {
    inner: SharedCollection<T>,
    selection: StrideSelection,
    references: OnceLock<Arc<[Reference]>>,
    seeds: ShuffleSeeds,
}

impl<T: CollectionItem> StrideCollection<T> {
    /// Select from `inner`; fails with `InvalidParameter` on an invalid selection.
    pub fn new(inner: SharedCollection<T>, selection: StrideSelection) -> Result<Self, CollectionError> {
        selection.validate()?;
        Ok(Self {
            inner,
            selection,
            references: OnceLock::new(),
            seeds: ShuffleSeeds::new(FILTER_SEED),
        })
    }

    /// The selection this layer applies.
    pub fn selection(&self) -> &StrideSelection {
        &self.selection
    }
}

impl<T: CollectionItem> ReferenceCollection<T> for StrideCollection<T> {
    fn references(&self) -> Result<Arc<[Reference]>, CollectionError> {
        if let Some(references) = self.references.get() {
            return Ok(references.clone());
        }
        let selected: Arc<[Reference]> = self.selection.apply(&self.inner.references()?).into();
        Ok(self.references.get_or_init(|| selected).clone())
    }

    fn lookup(&self, reference: &Reference) -> Result<Option<T>, CollectionError> {
        self.inner.lookup(reference)
    }

    fn lookup_batch(&self, references: &[Reference]) -> Result<Vec<Option<T>>, CollectionError> {
        self.inner.lookup_batch(references)
    }

    fn iter_with(&self, config: IterationConfig) -> Result<BoxedItemIter<'_, T>, CollectionError> {
        Ok(Box::new(StrideIter::new(
            self.inner.iter_with(config)?,
            self.selection,
        )))
    }

    fn rebind(&self, references: Vec<Reference>) -> Result<SharedCollection<T>, CollectionError> {
        self.inner.rebind(references)
    }

    fn shuffle_seeds(&self) -> &ShuffleSeeds {
        &self.seeds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionExt;
    use crate::delegating::{DelegatingCollection, ResolverFn};
    use crate::memory::MemoryCollection;
    use crate::reference::direct_references;
    use std::sync::Mutex;

    fn zero_to_eight() -> SharedCollection<usize> {
        MemoryCollection::from_items(0..9).into_shared()
    }

    #[test]
    fn excluded_and_included_views_partition_the_input() {
        let collection = zero_to_eight();
        let excluded = collection
            .strided(StrideSelection::every(3, 1, StrideKeep::AllBut))
            .unwrap();
        let included = collection
            .strided(StrideSelection::every(3, 1, StrideKeep::Only))
            .unwrap();
        assert_eq!(excluded.to_vec().unwrap(), vec![0, 2, 3, 5, 6, 8]);
        assert_eq!(included.to_vec().unwrap(), vec![1, 4, 7]);
        assert_eq!(
            &*included.references().unwrap(),
            direct_references(["1", "4", "7"]).as_slice()
        );
    }

    #[test]
    fn first_n_and_max_items_bound_the_selection() {
        let selection = StrideSelection::every(2, 0, StrideKeep::Only)
            .with_first_n(3)
            .with_max_items(5);
        let items: Vec<usize> = (0..20).collect();
        assert_eq!(selection.apply(&items), vec![0, 1, 2, 3, 5]);
        assert_eq!(StrideSelection::limit(4).apply(&items), vec![0, 1, 2, 3]);
        assert!(StrideSelection::limit(0).apply(&items).is_empty());
    }

    #[test]
    fn invalid_selections_are_rejected_at_construction() {
        let collection = zero_to_eight();
        for selection in [
            StrideSelection::every(1, 0, StrideKeep::Only),
            StrideSelection::every(3, 3, StrideKeep::AllBut),
            StrideSelection::limit(2).with_first_n(3),
        ] {
            assert!(matches!(
                collection.strided(selection),
                Err(CollectionError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn excluded_items_are_never_resolved() {
        let resolved = Arc::new(Mutex::new(Vec::new()));
        let log = resolved.clone();
        let collection: SharedCollection<String> = Arc::new(DelegatingCollection::new(
            direct_references((0..7).map(|idx| idx.to_string())),
            ResolverFn::new(move |key: &str| {
                log.lock().unwrap().push(key.to_string());
                Ok(format!("item-{key}"))
            }),
        ));
        let strided = collection
            .strided(StrideSelection::every(3, 0, StrideKeep::Only))
            .unwrap();
        assert_eq!(
            strided.to_vec().unwrap(),
            vec!["item-0", "item-3", "item-6"]
        );
        assert_eq!(*resolved.lock().unwrap(), vec!["0", "3", "6"]);
    }

    #[test]
    fn stacked_strides_skip_through_each_other() {
        let collection = MemoryCollection::from_items(0..30).into_shared();
        let nested = collection
            .strided(StrideSelection::every(3, 0, StrideKeep::AllBut))
            .unwrap()
            .strided(StrideSelection::every(2, 1, StrideKeep::Only).with_max_items(4))
            .unwrap();
        assert_eq!(nested.to_vec().unwrap(), vec![2, 5, 8, 11]);
        let refs = nested.references().unwrap();
        assert_eq!(nested.dereference_batch(&refs).unwrap(), vec![2, 5, 8, 11]);
    }

    #[test]
    fn rebind_goes_straight_to_the_wrapped_collection() {
        let included = zero_to_eight()
            .strided(StrideSelection::every(3, 1, StrideKeep::Only))
            .unwrap();
        let shuffled = included.shuffle_with_seed(9).unwrap();
        let mut items = shuffled.to_vec().unwrap();
        assert_eq!(
            shuffled.references().unwrap().len(),
            included.references().unwrap().len()
        );
        items.sort_unstable();
        assert_eq!(items, vec![1, 4, 7]);
    }

    #[test]
    fn selection_round_trips_through_json() {
        let selection = StrideSelection::every(4, 2, StrideKeep::AllBut).with_max_items(10);
        let json = serde_json::to_string(&selection).unwrap();
        let restored: StrideSelection = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, selection);
    }
}
