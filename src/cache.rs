//! Memoizing layers.
//!
//! `CachingCollection` memoizes resolved items by reference in an `ItemCache`.
//! A cache is only ever shared between a view and the views rebound from it,
//! which resolve references through the same underlying mapping.
//! `Memoized` replays a single-pass iterator from an index-keyed buffer.

use indexmap::IndexMap;
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use crate::collection::{CollectionItem, ReferenceCollection, SharedCollection};
use crate::config::{CacheMode, IterationConfig};
use crate::constants::shuffle::BASE_SEED;
use crate::errors::CollectionError;
use crate::iter::{BoxedItemIter, ReferenceIter};
use crate::metrics::{CacheCounters, CacheStats};
use crate::reference::Reference;
use crate::rng::ShuffleSeeds;

/// Key to item memo capability. Eviction, if any, is the implementation's business.
pub trait ItemCache<T>: Send + Sync {
    /// Cached item under `reference`.
    fn get(&self, reference: &Reference) -> Option<T>;

    /// Store `item` under `reference`, replacing any previous entry.
    fn put(&self, reference: Reference, item: T);

    /// Drop the entry under `reference`, returning it if present.
    fn remove(&self, reference: &Reference) -> Option<T>;

    /// Drop every entry.
    fn clear(&self);

    /// Number of cached entries.
    fn len(&self) -> usize;

    /// Returns `true` when nothing is cached.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unbounded in-memory cache guarded by a read-write lock.
pub struct MemoryCache<T> {
    entries: RwLock<IndexMap<Reference, T>>,
}

impl<T> MemoryCache<T> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(IndexMap::new()),
        }
    }
}

impl<T> Default for MemoryCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CollectionItem> ItemCache<T> for MemoryCache<T> {
    fn get(&self, reference: &Reference) -> Option<T> {
        self.entries
            .read()
            .expect("item cache poisoned")
            .get(reference)
            .cloned()
    }

    fn put(&self, reference: Reference, item: T) {
        self.entries
            .write()
            .expect("item cache poisoned")
            .insert(reference, item);
    }

    fn remove(&self, reference: &Reference) -> Option<T> {
        self.entries
            .write()
            .expect("item cache poisoned")
            .shift_remove(reference)
    }

    fn clear(&self) {
        self.entries.write().expect("item cache poisoned").clear();
    }

    fn len(&self) -> usize {
        self.entries.read().expect("item cache poisoned").len()
    }
}

/// Caching layer over a shared collection.
///
/// In `CacheMode::Shared` rebound and shuffled views reuse this view's cache
/// and counters. In `CacheMode::Exclusive` each view gets a fresh cache and
/// releases its entries when dropped. Iteration skips references the wrapped
/// collection resolves to nothing, so a cache over a transforming layer
/// iterates like the layer itself.
pub struct CachingCollection<T> {
    inner: SharedCollection<T>,
    cache: Arc<dyn ItemCache<T>>,
    counters: Arc<CacheCounters>,
    mode: CacheMode,
    references: Arc<[Reference]>,
    seeds: ShuffleSeeds,
}

impl<T: CollectionItem> CachingCollection<T> {
    /// Cache `inner` in a fresh `MemoryCache`.
    pub fn new(inner: SharedCollection<T>, mode: CacheMode) -> Result<Self, CollectionError> {
        Self::with_cache(inner, Arc::new(MemoryCache::<T>::new()), mode)
    }

    /// Cache `inner` in a caller-supplied cache.
    ///
    /// The cache must not hold entries resolved through a different mapping.
    /// Exclusive views rebound from this one fall back to a fresh `MemoryCache`.
    pub fn with_cache(
        inner: SharedCollection<T>,
        cache: Arc<dyn ItemCache<T>>,
        mode: CacheMode,
    ) -> Result<Self, CollectionError> {
        let references = inner.references()?;
        Ok(Self {
            inner,
            cache,
            counters: Arc::new(CacheCounters::default()),
            mode,
            references,
            seeds: ShuffleSeeds::new(BASE_SEED),
        })
    }

    /// Cache ownership mode of this view.
    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    /// Hit/miss figures accumulated by this view and the views sharing its cache.
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// Resolve every uncached reference of this view in one batch.
    ///
    /// Run once before handing the view to concurrent readers so that no key is
    /// resolved twice. Returns the number of newly cached items.
    pub fn prime(&self) -> Result<usize, CollectionError> {
        let missing: Vec<Reference> = self
            .references
            .iter()
            .filter(|reference| self.cache.get(reference).is_none())
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(0);
        }
        let items = self.inner.lookup_batch(&missing)?;
        CollectionError::ensure_batch_len(missing.len(), items.len())?;
        let mut stored = 0;
        for (reference, item) in missing.into_iter().zip(items) {
            if let Some(item) = item {
                self.cache.put(reference, item);
                stored += 1;
            }
        }
        debug!(stored, total = self.references.len(), "primed item cache");
        Ok(stored)
    }

    /// Drop the cached entries for this view's references.
    pub fn release(&self) {
        for reference in self.references.iter() {
            self.cache.remove(reference);
        }
    }
}

impl<T> Drop for CachingCollection<T> {
    fn drop(&mut self) {
        if self.mode == CacheMode::Exclusive {
            for reference in self.references.iter() {
                self.cache.remove(reference);
            }
        }
    }
}

impl<T: CollectionItem> ReferenceCollection<T> for CachingCollection<T> {
    fn references(&self) -> Result<Arc<[Reference]>, CollectionError> {
        Ok(self.references.clone())
    }

    fn lookup(&self, reference: &Reference) -> Result<Option<T>, CollectionError> {
        if let Some(item) = self.cache.get(reference) {
            self.counters.record_hit();
            return Ok(Some(item));
        }
        self.counters.record_miss();
        debug!(%reference, "item cache miss");
        let item = self.inner.lookup(reference)?;
        if let Some(item) = &item {
            self.cache.put(reference.clone(), item.clone());
        }
        Ok(item)
    }

    fn lookup_batch(&self, references: &[Reference]) -> Result<Vec<Option<T>>, CollectionError> {
        let mut items: Vec<Option<T>> = references
            .iter()
            .map(|reference| self.cache.get(reference))
            .collect();
        let missing: Vec<usize> = items
            .iter()
            .enumerate()
            .filter_map(|(position, item)| item.is_none().then_some(position))
            .collect();
        for _ in 0..references.len() - missing.len() {
            self.counters.record_hit();
        }
        if missing.is_empty() {
            return Ok(items);
        }
        for _ in &missing {
            self.counters.record_miss();
        }
        debug!(misses = missing.len(), "item cache batch misses");
        let keys: Vec<Reference> = missing
            .iter()
            .map(|&position| references[position].clone())
            .collect();
        let resolved = self.inner.lookup_batch(&keys)?;
        CollectionError::ensure_batch_len(keys.len(), resolved.len())?;
        for ((position, reference), item) in missing.into_iter().zip(keys).zip(resolved) {
            if let Some(item) = &item {
                self.cache.put(reference, item.clone());
            }
            items[position] = item;
        }
        Ok(items)
    }

    fn iter_with(&self, config: IterationConfig) -> Result<BoxedItemIter<'_, T>, CollectionError> {
        Ok(Box::new(ReferenceIter::new(
            self,
            self.references.clone(),
            config.skipping_missing(),
        )))
    }

    fn rebind(&self, references: Vec<Reference>) -> Result<SharedCollection<T>, CollectionError> {
        let inner = self.inner.rebind(references)?;
        let (cache, counters) = match self.mode {
            CacheMode::Shared => (self.cache.clone(), self.counters.clone()),
            CacheMode::Exclusive => {
                let cache: Arc<dyn ItemCache<T>> = Arc::new(MemoryCache::<T>::new());
                (cache, Arc::new(CacheCounters::default()))
            }
        };
        let references = inner.references()?;
        Ok(Arc::new(Self {
            inner,
            cache,
            counters,
            mode: self.mode,
            references,
            seeds: ShuffleSeeds::new(BASE_SEED),
        }))
    }

    fn shuffle_seeds(&self) -> &ShuffleSeeds {
        &self.seeds
    }
}

type SourceIter<T> = Box<dyn Iterator<Item = T> + Send>;

struct MemoState<T> {
    source: Option<SourceIter<T>>,
    items: Vec<T>,
    exhausted: bool,
}

/// Re-iterable view of a single-pass item source.
///
/// The first iteration pulls from the source and records every item by
/// position; later iterations replay the recorded items and only touch the
/// source for positions not yet seen. Iterators may run on several threads.
pub struct Memoized<T> {
    factory: Box<dyn Fn() -> SourceIter<T> + Send + Sync>,
    state: Mutex<MemoState<T>>,
}

impl<T: CollectionItem> Memoized<T> {
    /// Memoize the iterator produced by `factory`; it is called again only after `clear`.
    pub fn new<F, I>(factory: F) -> Self
    where
        F: Fn() -> I + Send + Sync + 'static,
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
    {
        Self {
            factory: Box::new(move || -> SourceIter<T> { Box::new(factory().into_iter()) }),
            state: Mutex::new(MemoState {
                source: None,
                items: Vec::new(),
                exhausted: false,
            }),
        }
    }

    /// Iterate all items, pulling from the source only past the recorded prefix.
    pub fn iter(&self) -> MemoizedIter<'_, T> {
        MemoizedIter {
            memo: self,
            position: 0,
        }
    }

    /// Number of items recorded so far.
    pub fn cached_len(&self) -> usize {
        self.state.lock().expect("memoized state poisoned").items.len()
    }

    /// Returns `true` once the source has been drained.
    pub fn is_primed(&self) -> bool {
        self.state.lock().expect("memoized state poisoned").exhausted
    }

    /// Forget recorded items; the next iteration starts a fresh source.
    pub fn clear(&self) {
        let mut state = self.state.lock().expect("memoized state poisoned");
        state.source = None;
        state.items.clear();
        state.exhausted = false;
    }

    fn item_at(&self, position: usize) -> Option<T> {
        let mut state = self.state.lock().expect("memoized state poisoned");
        while state.items.len() <= position {
            if state.exhausted {
                return None;
            }
            if state.source.is_none() {
                state.source = Some((self.factory)());
            }
            match state.source.as_mut().and_then(Iterator::next) {
                Some(item) => state.items.push(item),
                None => {
                    state.exhausted = true;
                    state.source = None;
                }
            }
        }
        state.items.get(position).cloned()
    }
}

/// Iterator over a [`Memoized`] source.
pub struct MemoizedIter<'a, T> {
    memo: &'a Memoized<T>,
    position: usize,
}

impl<T: CollectionItem> Iterator for MemoizedIter<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        let item = self.memo.item_at(self.position)?;
        self.position += 1;
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionExt;
    use crate::delegating::{DelegatingCollection, ResolverFn};
    use crate::reference::direct_references;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_collection(calls: Arc<AtomicUsize>) -> SharedCollection<String> {
        DelegatingCollection::new(
            direct_references(["a", "b", "c", "d"]),
            ResolverFn::new(move |key: &str| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(key.repeat(2))
            }),
        )
        .into_shared()
    }

    #[test]
    fn repeated_lookups_resolve_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cached = CachingCollection::new(counting_collection(calls.clone()), CacheMode::Shared)
            .unwrap();
        let reference = Reference::direct("b");
        assert_eq!(cached.dereference(&reference).unwrap(), "bb");
        assert_eq!(cached.dereference(&reference).unwrap(), "bb");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cached.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn batch_lookups_fetch_only_misses() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cached = CachingCollection::new(counting_collection(calls.clone()), CacheMode::Shared)
            .unwrap();
        cached.dereference(&"a".into()).unwrap();
        let items = cached
            .dereference_batch(&direct_references(["a", "b", "c"]))
            .unwrap();
        assert_eq!(items, vec!["aa", "bb", "cc"]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(cached.to_vec().unwrap(), vec!["aa", "bb", "cc", "dd"]);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn shared_views_reuse_one_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cached = counting_collection(calls.clone())
            .cached(CacheMode::Shared)
            .unwrap();
        cached.to_vec().unwrap();
        let shuffled = cached.shuffle().unwrap();
        let mut items = shuffled.to_vec().unwrap();
        items.sort();
        assert_eq!(items, vec!["aa", "bb", "cc", "dd"]);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn exclusive_views_resolve_independently_and_release_on_drop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache: Arc<MemoryCache<String>> = Arc::new(MemoryCache::new());
        let cached = CachingCollection::with_cache(
            counting_collection(calls.clone()),
            cache.clone(),
            CacheMode::Exclusive,
        )
        .unwrap();
        assert_eq!(cached.prime().unwrap(), 4);
        assert_eq!(cache.len(), 4);
        let rebound = cached.rebind(direct_references(["a"])).unwrap();
        assert_eq!(rebound.to_vec().unwrap(), vec!["aa"]);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        drop(rebound);
        assert_eq!(cache.len(), 4);
        drop(cached);
        assert!(cache.is_empty());
    }

    #[test]
    fn release_drops_only_this_views_entries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache: Arc<MemoryCache<String>> = Arc::new(MemoryCache::new());
        let cached = CachingCollection::with_cache(
            counting_collection(calls),
            cache.clone(),
            CacheMode::Shared,
        )
        .unwrap();
        cache.put(Reference::direct("elsewhere"), "kept".to_string());
        cached.prime().unwrap();
        assert_eq!(cached.prime().unwrap(), 0);
        cached.release();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&"elsewhere".into()).as_deref(), Some("kept"));
    }

    #[test]
    fn memoized_source_is_pulled_once() {
        let pulls = Arc::new(AtomicUsize::new(0));
        let counter = pulls.clone();
        let memo = Memoized::new(move || {
            let counter = counter.clone();
            (0..5).inspect(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        });
        let partial: Vec<i32> = memo.iter().take(2).collect();
        assert_eq!(partial, vec![0, 1]);
        assert!(!memo.is_primed());
        assert_eq!(memo.iter().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
        assert_eq!(memo.iter().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
        assert!(memo.is_primed());
        assert_eq!(pulls.load(Ordering::SeqCst), 5);

        memo.clear();
        assert_eq!(memo.cached_len(), 0);
        assert_eq!(memo.iter().count(), 5);
        assert_eq!(pulls.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn memoized_replays_across_threads() {
        let memo = Arc::new(Memoized::new(|| vec!["x".to_string(), "y".to_string()]));
        assert_eq!(memo.iter().count(), 2);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let memo = memo.clone();
                std::thread::spawn(move || memo.iter().collect::<Vec<_>>())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), vec!["x", "y"]);
        }
    }
}
