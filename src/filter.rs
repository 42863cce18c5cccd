//! Filtering layer.
//!
//! In `FilterMode::Passthrough` the layer forwards its wrapped collection's
//! references untouched and filters only during iteration. In
//! `FilterMode::Repeatable` the references are reconciled to exactly the
//! included items: the filtered pass is walked in lockstep with the wrapped
//! references, each resolved in turn, and each filtered item claims the next
//! reference whose item equals it. That requires the wrapped
//! collection to yield one item per reference and the filter to neither add nor
//! reorder items. When reconciliation fails the filtered items are materialized
//! once into a positional in-memory collection instead.

use std::sync::{Arc, OnceLock};

use tracing::{debug, warn};

use crate::collection::{CollectionItem, ReferenceCollection, SharedCollection};
use crate::config::{FilterMode, IterationConfig};
use crate::constants::shuffle::{FILTER_SEED, MATERIALIZED_SEED};
use crate::errors::CollectionError;
use crate::iter::{BoxedItemIter, ItemIterator, ReferenceIter};
use crate::memory::MemoryCollection;
use crate::reference::Reference;
use crate::rng::ShuffleSeeds;

/// Per-pass inclusion predicate.
pub type PassPredicate<'a, T> = Box<dyn FnMut(&T) -> bool + 'a>;

/// Decides which items a filtering layer keeps.
///
/// Each iteration pass starts a fresh predicate, so a filter may carry state
/// across the items of one pass (counts, positions) without leaking it into
/// the next pass.
pub trait ItemFilter<T>: Send + Sync {
    /// Begin a new pass over the wrapped collection's items.
    fn start_pass(&self) -> PassPredicate<'_, T>;
}

impl<T, F> ItemFilter<T> for F
where
    F: Fn(&T) -> bool + Send + Sync,
{
    fn start_pass(&self) -> PassPredicate<'_, T> {
        Box::new(move |item| self(item))
    }
}

/// Filter whose predicate is rebuilt by a factory at the start of every pass.
pub struct Stateful<G>(G);

/// Build a stateful filter from a factory producing one predicate per pass.
///
/// ```
/// use refsets::filter::stateful;
///
/// // Keep every other item of each pass.
/// let every_other = stateful(|| {
///     let mut position = 0usize;
///     move |_: &u32| {
///         position += 1;
///         position % 2 == 1
///     }
/// });
/// # let _ = every_other;
/// ```
pub fn stateful<G>(factory: G) -> Stateful<G> {
    Stateful(factory)
}

impl<T, G, P> ItemFilter<T> for Stateful<G>
where
    G: Fn() -> P + Send + Sync,
    P: FnMut(&T) -> bool + 'static,
{
    fn start_pass(&self) -> PassPredicate<'_, T> {
        Box::new((self.0)())
    }
}

/// Yields only the items of an inner iterator accepted by a pass predicate.
pub struct FilterIter<'a, T> {
    inner: BoxedItemIter<'a, T>,
    include: PassPredicate<'a, T>,
}

impl<'a, T> FilterIter<'a, T> {
    /// Filter `inner` through `include`.
    pub fn new(inner: BoxedItemIter<'a, T>, include: PassPredicate<'a, T>) -> Self {
        Self { inner, include }
    }
}

impl<T> Iterator for FilterIter<'_, T> {
    type Item = Result<T, CollectionError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok(item) if (self.include)(&item) => return Some(Ok(item)),
                Ok(_) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

impl<T> ItemIterator<T> for FilterIter<'_, T> {}

enum Resolution<T> {
    Reconciled(Arc<[Reference]>),
    Materialized(Arc<MemoryCollection<T>>),
}

/// Filtering layer over a shared collection.
pub struct FilteringCollection<T> {
    inner: SharedCollection<T>,
    filter: Arc<dyn ItemFilter<T>>,
    mode: FilterMode,
    resolution: OnceLock<Resolution<T>>,
    seeds: ShuffleSeeds,
}

impl<T: CollectionItem + PartialEq> FilteringCollection<T> {
    /// Filter `inner` with `filter`.
    pub fn new(inner: SharedCollection<T>, filter: impl ItemFilter<T> + 'static, mode: FilterMode) -> Self {
        Self::with_shared_filter(inner, Arc::new(filter), mode)
    }

    fn with_shared_filter(
        inner: SharedCollection<T>,
        filter: Arc<dyn ItemFilter<T>>,
        mode: FilterMode,
    ) -> Self {
        Self {
            inner,
            filter,
            mode,
            resolution: OnceLock::new(),
            seeds: ShuffleSeeds::new(FILTER_SEED),
        }
    }

    /// Reference mode of this layer.
    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    /// Whether a repeatable filter had to materialize its items.
    pub fn is_materialized(&self) -> bool {
        matches!(self.resolution.get(), Some(Resolution::Materialized(_)))
    }

    fn filtered_items(&self, config: IterationConfig) -> Result<FilterIter<'_, T>, CollectionError> {
        Ok(FilterIter::new(
            self.inner.iter_with(config)?,
            self.filter.start_pass(),
        ))
    }

    fn resolution(&self) -> Result<&Resolution<T>, CollectionError> {
        if let Some(resolution) = self.resolution.get() {
            return Ok(resolution);
        }
        let resolution = match self.reconcile() {
            Ok(references) => Resolution::Reconciled(references.into()),
            Err(CollectionError::ReconciliationFailure(reason)) => {
                warn!(%reason, "materializing filtered items after failed reconciliation");
                Resolution::Materialized(Arc::new(self.materialize()?))
            }
            Err(err) => return Err(err),
        };
        Ok(self.resolution.get_or_init(|| resolution))
    }

    /// Resolution a repeatable filter resolves references against, `None` in passthrough mode.
    fn settled(&self) -> Result<Option<&Resolution<T>>, CollectionError> {
        match self.mode {
            FilterMode::Passthrough => Ok(None),
            FilterMode::Repeatable => self.resolution().map(Some),
        }
    }

    fn reconcile(&self) -> Result<Vec<Reference>, CollectionError> {
        let unfiltered_references = self.inner.references()?;
        let mut unfiltered = unfiltered_references.iter();
        let mut scanned = 0usize;
        let mut matched = Vec::new();
        for filtered in self.filtered_items(IterationConfig::default())? {
            let filtered = filtered?;
            loop {
                let Some(reference) = unfiltered.next() else {
                    return Err(CollectionError::ReconciliationFailure(format!(
                        "filtered item {} not found after {scanned} references; the wrapped \
                         collection does not yield one item per reference or the filter adds \
                         or reorders items",
                        matched.len()
                    )));
                };
                scanned += 1;
                // References without an item never reach the filter.
                let Some(item) = self.inner.lookup(reference)? else {
                    continue;
                };
                if item == filtered {
                    matched.push(reference.clone());
                    break;
                }
            }
        }
        debug!(
            kept = matched.len(),
            scanned,
            total = unfiltered_references.len(),
            "reconciled filtered references"
        );
        Ok(matched)
    }

    fn materialize(&self) -> Result<MemoryCollection<T>, CollectionError> {
        let items = self
            .filtered_items(IterationConfig::default())?
            .collect::<Result<Vec<T>, _>>()?;
        Ok(MemoryCollection::from_items(items).with_seed_origin(MATERIALIZED_SEED))
    }
}

impl<T: CollectionItem + PartialEq> ReferenceCollection<T> for FilteringCollection<T> {
    fn references(&self) -> Result<Arc<[Reference]>, CollectionError> {
        match self.mode {
            FilterMode::Passthrough => self.inner.references(),
            FilterMode::Repeatable => match self.resolution()? {
                Resolution::Reconciled(references) => Ok(references.clone()),
                Resolution::Materialized(items) => items.references(),
            },
        }
    }

    fn lookup(&self, reference: &Reference) -> Result<Option<T>, CollectionError> {
        match self.settled()? {
            Some(Resolution::Materialized(items)) => items.lookup(reference),
            _ => self.inner.lookup(reference),
        }
    }

    fn lookup_batch(&self, references: &[Reference]) -> Result<Vec<Option<T>>, CollectionError> {
        match self.settled()? {
            Some(Resolution::Materialized(items)) => items.lookup_batch(references),
            _ => self.inner.lookup_batch(references),
        }
    }

    fn iter_with(&self, config: IterationConfig) -> Result<BoxedItemIter<'_, T>, CollectionError> {
        match self.mode {
            FilterMode::Passthrough => Ok(Box::new(self.filtered_items(config)?)),
            FilterMode::Repeatable => match self.resolution()? {
                Resolution::Reconciled(references) => Ok(Box::new(ReferenceIter::new(
                    self.inner.as_ref(),
                    references.clone(),
                    config,
                ))),
                Resolution::Materialized(items) => items.iter_with(config),
            },
        }
    }

    fn rebind(&self, references: Vec<Reference>) -> Result<SharedCollection<T>, CollectionError> {
        match self.mode {
            FilterMode::Passthrough => Ok(Arc::new(Self::with_shared_filter(
                self.inner.rebind(references)?,
                self.filter.clone(),
                self.mode,
            ))),
            FilterMode::Repeatable => match self.resolution()? {
                Resolution::Reconciled(_) => self.inner.rebind(references),
                Resolution::Materialized(items) => items.rebind(references),
            },
        }
    }

    fn shuffle_seeds(&self) -> &ShuffleSeeds {
        &self.seeds
    }
}
