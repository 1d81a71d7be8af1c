//! [`RunReport`]: what one run over one entity type did.

use serde::Serialize;
use terrace_core::{
  detect::{ChangeKind, Classification},
  entity::EntityType,
  run::{RunContext, RunState},
};
use uuid::Uuid;

use crate::error::Result;

/// Counts and final state of one run. Serialised as a line of the
/// `terrace run` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
  pub run_id:               Uuid,
  pub entity_type:          EntityType,
  pub state:                RunState,
  /// Rows in the incoming snapshot, malformed and duplicate rows included.
  pub received:             usize,
  /// Rows left after dropping malformed rows and collapsing duplicates.
  pub canonical:            usize,
  pub new:                  usize,
  pub changed:              usize,
  pub unchanged:            usize,
  pub malformed:            usize,
  pub duplicates_collapsed: usize,
  pub keys_minted:          usize,
  /// Rows inserted by the merge.
  pub written:              usize,
  /// Rows in the dimension view after projection.
  pub projected_rows:       usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error:                Option<String>,
}

impl RunReport {
  pub fn new(run: &RunContext, received: usize) -> Self {
    Self {
      run_id: run.run_id,
      entity_type: run.entity_type,
      state: RunState::SnapshotReceived,
      received,
      canonical: 0,
      new: 0,
      changed: 0,
      unchanged: 0,
      malformed: 0,
      duplicates_collapsed: 0,
      keys_minted: 0,
      written: 0,
      projected_rows: 0,
      error: None,
    }
  }

  /// A report for a run whose task never returned.
  pub fn aborted(entity_type: EntityType, reason: impl Into<String>) -> Self {
    let mut report = Self::new(&RunContext::new(entity_type, chrono::Utc::now()), 0);
    report.state = RunState::Failed;
    report.error = Some(reason.into());
    report
  }

  pub fn is_success(&self) -> bool { self.state == RunState::Projected }

  pub(crate) fn advance(&mut self, to: RunState) -> Result<()> {
    self.state = self.state.advance(to)?;
    Ok(())
  }

  pub(crate) fn fail(&mut self, reason: String) {
    // FAILED is reachable from every non-terminal state.
    if let Ok(state) = self.state.advance(RunState::Failed) {
      self.state = state;
    }
    self.error = Some(reason);
  }

  pub(crate) fn record_classification(&mut self, classification: &Classification) {
    self.canonical = classification.rows.len();
    self.new = classification.count(ChangeKind::New);
    self.changed = classification.count(ChangeKind::Changed);
    self.unchanged = classification.count(ChangeKind::Unchanged);
    self.malformed = classification.malformed.len();
    self.duplicates_collapsed = classification.duplicates_collapsed;
  }
}
