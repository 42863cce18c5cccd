//! Iteration engine turning a reference sequence into items.
//!
//! `ReferenceIter` resolves references lazily, either one at a time or in
//! batches served from a pending queue, and can step over a reference without
//! resolving it. Every item iterator in the crate implements `ItemIterator`, so
//! positional layers can skip work on any composition.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::collection::ReferenceCollection;
use crate::config::IterationConfig;
use crate::errors::CollectionError;
use crate::reference::Reference;

/// Forward-only item iterator that can step over its next item.
pub trait ItemIterator<T>: Iterator<Item = Result<T, CollectionError>> {
    /// Advance past the next item, resolving it only if unavoidable.
    ///
    /// Returns `Ok(false)` when nothing was left to skip.
    fn skip_next(&mut self) -> Result<bool, CollectionError> {
        match self.next() {
            Some(Ok(_)) => Ok(true),
            Some(Err(err)) => Err(err),
            None => Ok(false),
        }
    }
}

/// Boxed item iterator borrowed from its collection.
pub type BoxedItemIter<'a, T> = Box<dyn ItemIterator<T> + 'a>;

/// Resolves a fixed reference sequence through a collection, in order.
pub struct ReferenceIter<'a, T> {
    collection: &'a dyn ReferenceCollection<T>,
    references: Arc<[Reference]>,
    cursor: usize,
    config: IterationConfig,
    pending: VecDeque<(Reference, Option<T>)>,
    done: bool,
}

impl<'a, T> ReferenceIter<'a, T> {
    /// Iterate `references` resolved through `collection`.
    pub fn new(
        collection: &'a dyn ReferenceCollection<T>,
        references: Arc<[Reference]>,
        config: IterationConfig,
    ) -> Self {
        Self {
            collection,
            references,
            cursor: 0,
            config,
            pending: VecDeque::new(),
            done: false,
        }
    }

    /// References not yet consumed or skipped, including resolved-but-unserved ones.
    pub fn remaining(&self) -> usize {
        if self.done {
            return 0;
        }
        self.pending.len() + (self.references.len() - self.cursor)
    }

    fn fail(&mut self, err: CollectionError) -> Option<Result<T, CollectionError>> {
        self.done = true;
        self.pending.clear();
        Some(Err(err))
    }

    fn next_unresolved(&mut self) -> Option<Reference> {
        let reference = self.references.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(reference)
    }

    fn fill_batch(&mut self) -> Result<(), CollectionError> {
        let end = (self.cursor + self.config.batch_size).min(self.references.len());
        let batch = &self.references[self.cursor..end];
        self.cursor = end;
        let items = self.collection.lookup_batch(batch)?;
        CollectionError::ensure_batch_len(batch.len(), items.len())?;
        self.pending.extend(batch.iter().cloned().zip(items));
        Ok(())
    }
}

impl<T> Iterator for ReferenceIter<'_, T> {
    type Item = Result<T, CollectionError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            let (reference, item) = match self.pending.pop_front() {
                Some(entry) => entry,
                None if self.cursor >= self.references.len() => {
                    self.done = true;
                    return None;
                }
                None if self.config.batch_size > 1 => {
                    if let Err(err) = self.fill_batch() {
                        return self.fail(err);
                    }
                    continue;
                }
                None => {
                    let reference = self.next_unresolved()?;
                    match self.collection.lookup(&reference) {
                        Ok(item) => (reference, item),
                        Err(err) => return self.fail(err),
                    }
                }
            };
            match item {
                Some(item) => return Some(Ok(item)),
                None if self.config.skip_missing => continue,
                None => return self.fail(CollectionError::not_found(&reference)),
            }
        }
    }
}

impl<T> ItemIterator<T> for ReferenceIter<'_, T> {
    fn skip_next(&mut self) -> Result<bool, CollectionError> {
        if self.done {
            return Ok(false);
        }
        if self.pending.pop_front().is_some() {
            return Ok(true);
        }
        Ok(self.next_unresolved().is_some())
    }
}
