//! k-fold cross-validation views built from two stacked stride layers.

use serde::{Deserialize, Serialize};

use crate::collection::{CollectionExt, CollectionItem, SharedCollection};
use crate::config::StrideKeep;
use crate::errors::CollectionError;
use crate::stride::StrideSelection;

/// Which side of a fold a view represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FoldRole {
    /// Every fold except the held-out one.
    Training,
    /// Only the held-out fold.
    Testing,
}

/// Fold plan: how items are dealt into folds and how many of each fold are used.
///
/// Item `i` belongs to fold `i % fold_count`. The optional second pass keeps the
/// first `first_n_per_fold` items of each fold and then every
/// `mth_after_first_n`-th item, up to `max_items_per_fold` items per fold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldSpec {
    /// Number of folds; at least 2.
    pub fold_count: usize,
    /// Leading items per fold taken before thinning.
    #[serde(default)]
    pub first_n_per_fold: usize,
    /// Cap on items per fold.
    #[serde(default)]
    pub max_items_per_fold: Option<usize>,
    /// Keep every m-th item after the leading ones; `0` keeps all.
    #[serde(default)]
    pub mth_after_first_n: usize,
}

impl FoldSpec {
    /// Plain `fold_count`-way split with no thinning.
    pub fn new(fold_count: usize) -> Self {
        Self {
            fold_count,
            first_n_per_fold: 0,
            max_items_per_fold: None,
            mth_after_first_n: 0,
        }
    }

    /// Take the first `first_n` items per fold, then every `mth` item.
    pub fn with_thinning(mut self, first_n: usize, mth: usize) -> Self {
        self.first_n_per_fold = first_n;
        self.mth_after_first_n = mth;
        self
    }

    /// Cap each fold at `max_items` items.
    pub fn with_max_items_per_fold(mut self, max_items: usize) -> Self {
        self.max_items_per_fold = Some(max_items);
        self
    }

    /// Reject plans that cannot be expressed as stride selections.
    pub fn validate(&self) -> Result<(), CollectionError> {
        if self.fold_count <= 1 {
            return Err(CollectionError::invalid("fold_count must be larger than 1"));
        }
        if self.mth_after_first_n == 1 {
            return Err(CollectionError::invalid(
                "mth_after_first_n must be 0 or at least 2",
            ));
        }
        if let Some(max_items) = self.max_items_per_fold {
            if max_items == 0 {
                return Err(CollectionError::invalid(
                    "max_items_per_fold must be positive when given",
                ));
            }
            if self.first_n_per_fold > max_items {
                return Err(CollectionError::invalid(format!(
                    "first_n_per_fold {} exceeds max_items_per_fold {max_items}",
                    self.first_n_per_fold
                )));
            }
        }
        Ok(())
    }

    /// Selections applied, in order, for the `role` view of `test_fold`.
    pub fn selections(
        &self,
        test_fold: usize,
        role: FoldRole,
    ) -> Result<Vec<StrideSelection>, CollectionError> {
        self.validate()?;
        if test_fold >= self.fold_count {
            return Err(CollectionError::invalid(format!(
                "fold index must be from 0 to {}",
                self.fold_count - 1
            )));
        }
        let (keep, folds_in_view) = match role {
            FoldRole::Training => (StrideKeep::AllBut, self.fold_count - 1),
            FoldRole::Testing => (StrideKeep::Only, 1),
        };
        let mut selections = vec![StrideSelection::every(self.fold_count, test_fold, keep)];
        let scaled = |per_fold: usize, name: &str| {
            per_fold.checked_mul(folds_in_view).ok_or_else(|| {
                CollectionError::invalid(format!(
                    "{name} {per_fold} overflows across {folds_in_view} folds"
                ))
            })
        };
        let max_items = self
            .max_items_per_fold
            .map(|max| scaled(max, "max_items_per_fold"))
            .transpose()?;
        if self.mth_after_first_n > 0 || max_items.is_some() || self.first_n_per_fold > 0 {
            selections.push(StrideSelection {
                stride_size: self.mth_after_first_n,
                stride_index: 0,
                keep: StrideKeep::Only,
                max_items,
                first_n: scaled(self.first_n_per_fold, "first_n_per_fold")?,
            });
        }
        Ok(selections)
    }

    /// Training or testing view of `collection` for held-out fold `test_fold`.
    pub fn view<T: CollectionItem>(
        &self,
        collection: SharedCollection<T>,
        test_fold: usize,
        role: FoldRole,
    ) -> Result<SharedCollection<T>, CollectionError> {
        self.selections(test_fold, role)?
            .into_iter()
            .try_fold(collection, |view, selection| view.strided(selection))
    }
}
