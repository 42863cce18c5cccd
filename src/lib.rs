#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Key/item memo layers and the memoizing iterable.
pub mod cache;
/// The collection contract and composition helpers.
pub mod collection;
/// Iteration, filtering, and caching configuration types.
pub mod config;
/// Centralized constants used across references, shuffling, and iteration.
pub mod constants;
/// Collections bound to caller-supplied resolvers.
pub mod delegating;
/// Filtering layer and filter predicates.
pub mod filter;
/// k-fold cross-validation views.
pub mod folds;
/// Iteration engine.
pub mod iter;
/// In-memory base collection.
pub mod memory;
/// Cache hit/miss metrics.
pub mod metrics;
/// Transforming layer.
pub mod mutate;
/// Reference keys.
pub mod reference;
/// Deterministic shuffling.
pub mod rng;
/// Positional selection layer.
pub mod stride;
/// Storage transports that resolve references (filesystem today).
pub mod transport;
/// Shared type aliases.
pub mod types;

mod errors;

pub use cache::{CachingCollection, ItemCache, MemoryCache, Memoized};
pub use collection::{CollectionExt, CollectionItem, ReferenceCollection, SharedCollection};
pub use config::{CacheMode, FilterMode, IterationConfig, StrideKeep};
pub use delegating::{BatchResolverFn, DelegatingCollection, Resolver, ResolverFn};
pub use errors::CollectionError;
pub use filter::{FilteringCollection, ItemFilter, stateful};
pub use folds::{FoldRole, FoldSpec};
pub use iter::{BoxedItemIter, ItemIterator, ReferenceIter};
pub use memory::MemoryCollection;
pub use metrics::CacheStats;
pub use mutate::{Arity, MutatingCollection, Mutator, mutator_fn};
pub use reference::Reference;
pub use rng::ShuffleSeeds;
pub use stride::{StrideCollection, StrideSelection};
pub use transport::fs::FileResolver;
pub use types::{ReferenceKey, ShuffleSeed, StridePosition};
