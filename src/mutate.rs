//! Transforming layer mapping each input item to zero or more outputs.
//!
//! Unary mutators reuse the wrapped collection's references one-to-one.
//! Expanding mutators get `Indexed` references built once, when the layer is
//! constructed, by mutating every input; resolving one re-mutates its parent
//! item and picks the output at the recorded index. The output count of every
//! parent is recorded then, and any later count that differs is an
//! `InconsistentMutation`.

use indexmap::IndexMap;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::debug;

use crate::collection::{CollectionItem, ReferenceCollection, SharedCollection};
use crate::config::IterationConfig;
use crate::constants::shuffle::BASE_SEED;
use crate::errors::CollectionError;
use crate::iter::{BoxedItemIter, ReferenceIter};
use crate::reference::Reference;
use crate::rng::ShuffleSeeds;

/// Declared output cardinality of a mutator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    /// At most one output per input.
    Unary,
    /// Any number of outputs per input; must be deterministic per input.
    Expanding,
}

/// Maps one input item to zero or more outputs.
pub trait Mutator<I, O>: Send + Sync {
    /// Produce the outputs for `item`.
    fn mutate(&self, item: I) -> Vec<O>;

    /// Declared cardinality.
    fn arity(&self) -> Arity;
}

/// Mutator backed by a closure and a declared arity.
pub struct MutatorFn<F, I, O> {
    arity: Arity,
    mutate: F,
    _types: PhantomData<fn(I) -> O>,
}

/// Build a mutator from a closure.
pub fn mutator_fn<F, I, O>(arity: Arity, mutate: F) -> MutatorFn<F, I, O>
where
    F: Fn(I) -> Vec<O> + Send + Sync,
{
    MutatorFn {
        arity,
        mutate,
        _types: PhantomData,
    }
}

impl<F, I, O> Mutator<I, O> for MutatorFn<F, I, O>
where
    F: Fn(I) -> Vec<O> + Send + Sync,
{
    fn mutate(&self, item: I) -> Vec<O> {
        (self.mutate)(item)
    }

    fn arity(&self) -> Arity {
        self.arity
    }
}

/// Transforming layer over a shared collection.
pub struct MutatingCollection<I, O> {
    inner: SharedCollection<I>,
    mutator: Arc<dyn Mutator<I, O>>,
    output_counts: Arc<IndexMap<Reference, usize>>,
    references: Arc<[Reference]>,
    seeds: ShuffleSeeds,
}

impl<I: CollectionItem, O: CollectionItem> MutatingCollection<I, O> {
    /// Layer `mutator` over `inner`.
    ///
    /// Expanding mutators resolve and mutate every input here to number their outputs.
    pub fn new(
        inner: SharedCollection<I>,
        mutator: impl Mutator<I, O> + 'static,
    ) -> Result<Self, CollectionError> {
        let mutator: Arc<dyn Mutator<I, O>> = Arc::new(mutator);
        let (references, output_counts) = build_references(inner.as_ref(), mutator.as_ref())?;
        Ok(Self {
            inner,
            mutator,
            output_counts: Arc::new(output_counts),
            references,
            seeds: ShuffleSeeds::new(BASE_SEED),
        })
    }

    /// Declared arity of the wrapped mutator.
    pub fn arity(&self) -> Arity {
        self.mutator.arity()
    }

    fn select_output(
        &self,
        reference: &Reference,
        source: &Reference,
        item: Option<I>,
        index: usize,
    ) -> Result<Option<O>, CollectionError> {
        let Some(item) = item else {
            return Ok(None);
        };
        let mut outputs = self.mutator.mutate(item);
        let produced = outputs.len();
        let inconsistent = || CollectionError::InconsistentMutation {
            reference: reference.clone(),
            index,
            produced,
        };
        match self.mutator.arity() {
            Arity::Unary if produced > 1 => Err(CollectionError::UnaryViolation {
                reference: reference.clone(),
                produced,
            }),
            Arity::Unary if produced == 0 => Ok(None),
            Arity::Unary => Ok(outputs.pop()),
            Arity::Expanding => {
                let recorded = self.output_counts.get(source).copied();
                if index >= produced || recorded.is_some_and(|count| count != produced) {
                    return Err(inconsistent());
                }
                Ok(Some(outputs.swap_remove(index)))
            }
        }
    }

    fn source_of<'r>(&self, reference: &'r Reference) -> Option<(&'r Reference, usize)> {
        match self.mutator.arity() {
            Arity::Unary => Some((reference, 0)),
            Arity::Expanding => reference.parent(),
        }
    }
}

/// References of the mutated view, plus the output count of each expanded parent.
fn build_references<I, O>(
    inner: &dyn ReferenceCollection<I>,
    mutator: &dyn Mutator<I, O>,
) -> Result<(Arc<[Reference]>, IndexMap<Reference, usize>), CollectionError> {
    let inputs = inner.references()?;
    if mutator.arity() == Arity::Unary {
        return Ok((inputs, IndexMap::new()));
    }
    let mut references = Vec::with_capacity(inputs.len());
    let mut output_counts = IndexMap::with_capacity(inputs.len());
    for input in inputs.iter() {
        let Some(item) = inner.lookup(input)? else {
            continue;
        };
        let produced = mutator.mutate(item).len();
        output_counts.insert(input.clone(), produced);
        references.extend((0..produced).map(|index| Reference::indexed(input.clone(), index)));
    }
    debug!(
        inputs = inputs.len(),
        outputs = references.len(),
        "built references for expanding mutation"
    );
    Ok((references.into(), output_counts))
}

impl<I: CollectionItem, O: CollectionItem> ReferenceCollection<O> for MutatingCollection<I, O> {
    fn references(&self) -> Result<Arc<[Reference]>, CollectionError> {
        Ok(self.references.clone())
    }

    fn lookup(&self, reference: &Reference) -> Result<Option<O>, CollectionError> {
        let Some((source, index)) = self.source_of(reference) else {
            return Ok(None);
        };
        let item = self.inner.lookup(source)?;
        self.select_output(reference, source, item, index)
    }

    fn lookup_batch(&self, references: &[Reference]) -> Result<Vec<Option<O>>, CollectionError> {
        let sources: Option<Vec<(&Reference, usize)>> = references
            .iter()
            .map(|reference| self.source_of(reference))
            .collect();
        let Some(sources) = sources else {
            return references
                .iter()
                .map(|reference| self.lookup(reference))
                .collect();
        };
        let parents: Vec<Reference> = sources.iter().map(|(parent, _)| (*parent).clone()).collect();
        let items = self.inner.lookup_batch(&parents)?;
        CollectionError::ensure_batch_len(parents.len(), items.len())?;
        references
            .iter()
            .zip(sources)
            .zip(items)
            .map(|((reference, (source, index)), item)| {
                self.select_output(reference, source, item, index)
            })
            .collect()
    }

    fn iter_with(&self, config: IterationConfig) -> Result<BoxedItemIter<'_, O>, CollectionError> {
        Ok(Box::new(ReferenceIter::new(
            self,
            self.references.clone(),
            config.skipping_missing(),
        )))
    }

    fn rebind(&self, references: Vec<Reference>) -> Result<SharedCollection<O>, CollectionError> {
        Ok(Arc::new(Self {
            inner: self.inner.clone(),
            mutator: self.mutator.clone(),
            output_counts: self.output_counts.clone(),
            references: references.into(),
            seeds: ShuffleSeeds::new(BASE_SEED),
        }))
    }

    fn shuffle_seeds(&self) -> &ShuffleSeeds {
        &self.seeds
    }
}
