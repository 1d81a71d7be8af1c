//! Pipeline error type.
//!
//! Each variant names the stage that failed. Storage errors are boxed so
//! the pipeline stays generic over the [`Warehouse`] backend.
//!
//! [`Warehouse`]: terrace_core::store::Warehouse

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ReconcileError {
  /// The snapshot or stored history does not fit the entity type.
  #[error("classification failed: {0}")]
  Classification(#[source] BoxError),

  /// Two natural codes resolved to one surrogate key. Raised before merge.
  #[error("surrogate key conflict: {0}")]
  KeyConflict(#[source] BoxError),

  #[error("surrogate key assignment failed: {0}")]
  KeyAssignment(#[source] BoxError),

  /// The merge transaction was rolled back; history is unchanged.
  #[error("merge failed: {0}")]
  MergeFailure(#[source] BoxError),

  #[error("projection failed: {0}")]
  Projection(#[source] BoxError),

  #[error("store error: {0}")]
  Store(#[source] BoxError),

  #[error("run state error: {0}")]
  State(#[from] terrace_core::Error),
}

impl ReconcileError {
  /// Classify a core error raised while planning or checking keys.
  pub(crate) fn from_core(err: terrace_core::Error) -> Self {
    use terrace_core::Error as Core;
    match err {
      Core::DuplicateKeyConflict { .. } => Self::KeyConflict(Box::new(err)),
      Core::UnresolvedKey { .. } => Self::KeyAssignment(Box::new(err)),
      Core::IllegalTransition { .. } => Self::State(err),
      Core::ClassificationInconsistency { .. }
      | Core::UnknownEntityType(_)
      | Core::Serialization(_) => Self::Classification(Box::new(err)),
    }
  }

  /// A storage failure while resolving keys. A duplicate key surfaced by the
  /// backend is still a key conflict.
  pub(crate) fn from_key_store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    let conflict = matches!(
      core_cause(&err),
      Some(terrace_core::Error::DuplicateKeyConflict { .. })
    );
    if conflict {
      Self::KeyConflict(Box::new(err))
    } else {
      Self::KeyAssignment(Box::new(err))
    }
  }
}

impl ReconcileError {
  /// A storage failure while reading what classification compares against.
  /// Stored rows that no longer fit their entity type are a classification
  /// failure.
  pub(crate) fn from_history_store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    let inconsistent = matches!(
      core_cause(&err),
      Some(terrace_core::Error::ClassificationInconsistency { .. })
    );
    if inconsistent {
      Self::Classification(Box::new(err))
    } else {
      Self::Store(Box::new(err))
    }
  }
}

/// First [`terrace_core::Error`] in `err`'s source chain.
fn core_cause<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a terrace_core::Error> {
  let mut current = Some(err);
  while let Some(e) = current {
    if let Some(core) = e.downcast_ref::<terrace_core::Error>() {
      return Some(core);
    }
    current = e.source();
  }
  None
}

pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use terrace_core::entity::{EntityType, SurrogateKey};

  use super::*;

  fn conflict() -> terrace_core::Error {
    terrace_core::Error::DuplicateKeyConflict {
      entity_type: EntityType::Player,
      key:         SurrogateKey(4),
      first:       "10".parse().unwrap(),
      second:      "11".parse().unwrap(),
    }
  }

  #[test]
  fn wrapped_conflict_is_still_a_key_conflict() {
    let store_err = terrace_store_sqlite::Error::Core(conflict());
    assert!(matches!(
      ReconcileError::from_key_store(store_err),
      ReconcileError::KeyConflict(_)
    ));

    let other = terrace_store_sqlite::Error::DateParse("nope".into());
    assert!(matches!(
      ReconcileError::from_key_store(other),
      ReconcileError::KeyAssignment(_)
    ));
  }

  #[test]
  fn undecodable_history_is_a_classification_failure() {
    let inconsistent = terrace_store_sqlite::Error::Core(
      terrace_core::Error::ClassificationInconsistency {
        entity_type: EntityType::Team,
        detail:      "stored payload does not decode".into(),
      },
    );
    assert!(matches!(
      ReconcileError::from_history_store(inconsistent),
      ReconcileError::Classification(_)
    ));

    let other = terrace_store_sqlite::Error::DateParse("nope".into());
    assert!(matches!(ReconcileError::from_history_store(other), ReconcileError::Store(_)));
  }

  #[test]
  fn core_errors_map_to_their_stage() {
    assert!(matches!(ReconcileError::from_core(conflict()), ReconcileError::KeyConflict(_)));
    let unresolved = terrace_core::Error::UnresolvedKey {
      entity_type: EntityType::Team,
      code:        "3".parse().unwrap(),
    };
    assert!(matches!(ReconcileError::from_core(unresolved), ReconcileError::KeyAssignment(_)));
  }
}
