//! Error types for `terrace-core`.

use thiserror::Error;

use crate::entity::{EntityType, NaturalCode, SurrogateKey};

#[derive(Debug, Error)]
pub enum Error {
  /// Two distinct natural codes resolved to the same surrogate key.
  #[error("{entity_type}: surrogate key {key} claimed by {first} and {second}")]
  DuplicateKeyConflict {
    entity_type: EntityType,
    key:         SurrogateKey,
    first:       NaturalCode,
    second:      NaturalCode,
  },

  /// Snapshot rows or stored history do not carry the attribute schema of
  /// the entity type being reconciled.
  #[error("{entity_type}: classification inconsistency: {detail}")]
  ClassificationInconsistency {
    entity_type: EntityType,
    detail:      String,
  },

  #[error("{entity_type}: no surrogate key resolved for natural code {code}")]
  UnresolvedKey {
    entity_type: EntityType,
    code:        NaturalCode,
  },

  #[error("illegal run transition {from} -> {to}")]
  IllegalTransition {
    from: crate::run::RunState,
    to:   crate::run::RunState,
  },

  #[error("unknown entity type: {0:?}")]
  UnknownEntityType(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
