use indexmap::IndexMap;
use std::sync::Arc;

use crate::collection::{CollectionItem, ReferenceCollection, SharedCollection};
use crate::config::IterationConfig;
use crate::constants::shuffle::BASE_SEED;
use crate::errors::CollectionError;
use crate::iter::{BoxedItemIter, ReferenceIter};
use crate::reference::Reference;
use crate::rng::ShuffleSeeds;

/// Base collection over items held in memory.
///
/// Rebound views share the item map read-only and accept only references
/// already present in it.
pub struct MemoryCollection<T> {
    items: Arc<IndexMap<Reference, T>>,
    references: Arc<[Reference]>,
    seed_origin: u64,
    seeds: ShuffleSeeds,
}

impl<T: CollectionItem> MemoryCollection<T> {
    /// Address `items` by their position, as references `"0"`, `"1"`, ...
    pub fn from_items(items: impl IntoIterator<Item = T>) -> Self {
        let map: IndexMap<Reference, T> = items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| (Reference::direct(idx.to_string()), item))
            .collect();
        Self::from_map(map)
    }

    /// Address items by caller-supplied keys, preserving the given order.
    pub fn from_keyed<K: AsRef<str>>(
        entries: impl IntoIterator<Item = (K, T)>,
    ) -> Result<Self, CollectionError> {
        let mut map = IndexMap::new();
        for (key, item) in entries {
            let reference = Reference::direct(key);
            if map.contains_key(&reference) {
                return Err(CollectionError::invalid(format!(
                    "duplicate reference key '{reference}'"
                )));
            }
            map.insert(reference, item);
        }
        Ok(Self::from_map(map))
    }

    fn from_map(map: IndexMap<Reference, T>) -> Self {
        let references: Arc<[Reference]> = map.keys().cloned().collect();
        Self {
            items: Arc::new(map),
            references,
            seed_origin: BASE_SEED,
            seeds: ShuffleSeeds::new(BASE_SEED),
        }
    }

    /// Restart unseeded shuffles of this instance, and of views rebound from it, at `origin`.
    pub fn with_seed_origin(mut self, origin: u64) -> Self {
        self.seed_origin = origin;
        self.seeds = ShuffleSeeds::new(origin);
        self
    }

    /// Wrap into a shared handle.
    pub fn into_shared(self) -> SharedCollection<T> {
        Arc::new(self)
    }
}

impl<T: CollectionItem> ReferenceCollection<T> for MemoryCollection<T> {
    fn references(&self) -> Result<Arc<[Reference]>, CollectionError> {
        Ok(self.references.clone())
    }

    fn lookup(&self, reference: &Reference) -> Result<Option<T>, CollectionError> {
        Ok(self.items.get(reference).cloned())
    }

    fn iter_with(&self, config: IterationConfig) -> Result<BoxedItemIter<'_, T>, CollectionError> {
        Ok(Box::new(ReferenceIter::new(
            self,
            self.references.clone(),
            config,
        )))
    }

    fn rebind(&self, references: Vec<Reference>) -> Result<SharedCollection<T>, CollectionError> {
        if let Some(unknown) = references
            .iter()
            .find(|reference| !self.items.contains_key(*reference))
        {
            return Err(CollectionError::not_found(unknown));
        }
        Ok(Arc::new(Self {
            items: self.items.clone(),
            references: references.into(),
            seed_origin: self.seed_origin,
            seeds: ShuffleSeeds::new(self.seed_origin),
        }))
    }

    fn shuffle_seeds(&self) -> &ShuffleSeeds {
        &self.seeds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::direct_references;

    fn letters() -> SharedCollection<char> {
        MemoryCollection::from_keyed([("A", 'a'), ("B", 'b'), ("C", 'c'), ("D", 'd')])
            .unwrap()
            .into_shared()
    }

    #[test]
    fn positional_keys_follow_item_order() {
        let collection = MemoryCollection::from_items(["x", "y"]);
        assert_eq!(
            &*collection.references().unwrap(),
            direct_references(["0", "1"]).as_slice()
        );
        assert_eq!(collection.dereference(&"1".into()).unwrap(), "y");
        assert_eq!(collection.len().unwrap(), 2);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let result = MemoryCollection::from_keyed([("A", 1), ("A", 2)]);
        assert!(matches!(result, Err(CollectionError::InvalidParameter(_))));
    }

    #[test]
    fn unknown_key_is_not_found() {
        let collection = letters();
        assert!(matches!(
            collection.dereference(&"Z".into()),
            Err(CollectionError::NotFound { .. })
        ));
        assert!(matches!(
            collection.dereference_batch(&direct_references(["A", "Z"])),
            Err(CollectionError::NotFound { .. })
        ));
    }

    #[test]
    fn rebind_rejects_added_keys() {
        let collection = letters();
        let rebound = collection.rebind(direct_references(["D", "A"])).unwrap();
        assert_eq!(rebound.to_vec().unwrap(), vec!['d', 'a']);
        assert!(matches!(
            collection.rebind(direct_references(["A", "E"])),
            Err(CollectionError::NotFound { .. })
        ));
    }

    #[test]
    fn seeded_shuffle_is_repeatable_and_unseeded_shuffles_advance() {
        let collection = MemoryCollection::from_items(0..24).into_shared();
        let first = collection.shuffle_with_seed(2).unwrap().references().unwrap();
        let again = collection.shuffle_with_seed(2).unwrap().references().unwrap();
        let other = collection.shuffle_with_seed(3).unwrap().references().unwrap();
        assert_eq!(first, again);
        assert_ne!(first, other);

        let a = collection.shuffle().unwrap().to_vec().unwrap();
        let b = collection.shuffle().unwrap().to_vec().unwrap();
        assert_ne!(a, b);
        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..24).collect::<Vec<_>>());
    }
}
