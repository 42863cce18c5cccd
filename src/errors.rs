use std::io;

use thiserror::Error;

use crate::reference::Reference;

/// Error type for resolution, composition, and parameter failures.
#[derive(Debug, Error)]
pub enum CollectionError {
    /// A reference has no item.
    #[error("no item found for reference '{reference}'")]
    NotFound {
        /// The unresolved reference.
        reference: Reference,
    },
    /// A batch resolution did not return one item per reference.
    #[error("batch resolution returned {actual} items for {expected} references")]
    Inconsistent {
        /// References requested.
        expected: usize,
        /// Items returned.
        actual: usize,
    },
    /// A repeatable filter could not map its items back to references.
    #[error("could not reconcile filtered items with references: {0}")]
    ReconciliationFailure(String),
    /// A mutator declared unary produced more than one output.
    #[error("unary mutator produced {produced} outputs for reference '{reference}'")]
    UnaryViolation {
        /// Reference being resolved.
        reference: Reference,
        /// Outputs produced.
        produced: usize,
    },
    /// An expanding mutator's output count changed since its references were built.
    #[error(
        "mutator produced {produced} outputs for reference '{reference}' (index {index}), \
         differing from the count its references were built from"
    )]
    InconsistentMutation {
        /// Derived reference being resolved.
        reference: Reference,
        /// Output index the reference addresses.
        index: usize,
        /// Outputs produced on this call.
        produced: usize,
    },
    /// A parameter combination is out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// A resolver failed for a reason of its own, such as decoding.
    #[error("resolver failed for reference '{reference}': {reason}")]
    Resolver {
        /// Reference being resolved.
        reference: Reference,
        /// Resolver-supplied description.
        reason: String,
    },
    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CollectionError {
    /// `NotFound` error for `reference`, for resolvers reporting a missing key.
    pub fn not_found(reference: &Reference) -> Self {
        Self::NotFound {
            reference: reference.clone(),
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidParameter(reason.into())
    }

    /// Check that a batch resolution produced one item per reference.
    pub(crate) fn ensure_batch_len(expected: usize, actual: usize) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::Inconsistent { expected, actual })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_length_mismatch_is_inconsistent() {
        assert!(CollectionError::ensure_batch_len(3, 3).is_ok());
        let err = CollectionError::ensure_batch_len(3, 2).unwrap_err();
        assert!(matches!(
            err,
            CollectionError::Inconsistent {
                expected: 3,
                actual: 2
            }
        ));
        assert!(err.to_string().contains("2 items for 3 references"));
    }

    #[test]
    fn not_found_names_the_rendered_reference() {
        let reference = Reference::indexed(Reference::direct("rec-7"), 2);
        let err = CollectionError::not_found(&reference);
        assert!(err.to_string().contains("rec-7/2"));
    }
}
