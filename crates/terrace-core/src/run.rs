//! Per-entity-type run lifecycle.
//!
//! A run moves `SNAPSHOT_RECEIVED → CLASSIFIED → KEYS_RESOLVED → MERGED →
//! PROJECTED`. Any non-terminal state may drop to `FAILED`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

use crate::{Error, Result, entity::EntityType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
  SnapshotReceived,
  Classified,
  KeysResolved,
  Merged,
  Projected,
  Failed,
}

impl RunState {
  /// The successor on the success path, if any.
  pub fn successor(self) -> Option<Self> {
    match self {
      Self::SnapshotReceived => Some(Self::Classified),
      Self::Classified => Some(Self::KeysResolved),
      Self::KeysResolved => Some(Self::Merged),
      Self::Merged => Some(Self::Projected),
      Self::Projected | Self::Failed => None,
    }
  }

  pub fn is_terminal(self) -> bool { matches!(self, Self::Projected | Self::Failed) }

  /// Move to `to`, refusing anything but the success-path successor or
  /// `FAILED` from a non-terminal state.
  pub fn advance(self, to: Self) -> Result<Self> {
    let legal = self.successor() == Some(to) || (to == Self::Failed && !self.is_terminal());
    if legal {
      Ok(to)
    } else {
      Err(Error::IllegalTransition { from: self, to })
    }
  }
}

/// Identity and clock of one run over one entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
  pub run_id:      Uuid,
  pub entity_type: EntityType,
  /// Effective timestamp stamped on every record the run writes.
  pub started_at:  DateTime<Utc>,
}

impl RunContext {
  pub fn new(entity_type: EntityType, started_at: DateTime<Utc>) -> Self {
    Self { run_id: Uuid::new_v4(), entity_type, started_at }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn success_path_walks_every_state() {
    let mut state = RunState::SnapshotReceived;
    let mut seen = vec![state];
    while let Some(next) = state.successor() {
      state = state.advance(next).unwrap();
      seen.push(state);
    }
    assert_eq!(seen, [
      RunState::SnapshotReceived,
      RunState::Classified,
      RunState::KeysResolved,
      RunState::Merged,
      RunState::Projected,
    ]);
  }

  #[test]
  fn skipping_or_leaving_terminal_states_is_illegal() {
    assert!(RunState::Classified.advance(RunState::Merged).is_err());
    assert!(RunState::Projected.advance(RunState::Failed).is_err());
    assert!(RunState::Failed.advance(RunState::SnapshotReceived).is_err());
    assert_eq!(RunState::KeysResolved.advance(RunState::Failed).unwrap(), RunState::Failed);
  }

  #[test]
  fn states_render_in_screaming_snake_case() {
    assert_eq!(RunState::KeysResolved.to_string(), "KEYS_RESOLVED");
  }
}
