//! Merge planning: classified rows + resolved keys → records to write.
//!
//! The plan is chosen by the entity type's [`MergePolicy`]. Storage backends
//! apply a plan atomically; planning itself never touches storage.

use std::collections::HashMap;

use crate::{
  Error, Result,
  detect::{Classification, ClassifiedRow},
  entity::{EntityType, MergePolicy, NaturalCode, SurrogateKey},
  history::{NewHistoricalRecord, NewVolatileRecord},
  keys::KeyAssignment,
  run::RunContext,
};

/// The writes for one entity type in one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergePlan {
  /// Append NEW and CHANGED rows to history.
  Append {
    entity_type: EntityType,
    records:     Vec<NewHistoricalRecord>,
  },
  /// Delete every volatile row of the type, then insert these.
  Replace {
    entity_type: EntityType,
    records:     Vec<NewVolatileRecord>,
  },
}

impl MergePlan {
  pub fn entity_type(&self) -> EntityType {
    match self {
      Self::Append { entity_type, .. } | Self::Replace { entity_type, .. } => *entity_type,
    }
  }

  /// Number of rows the plan inserts.
  pub fn len(&self) -> usize {
    match self {
      Self::Append { records, .. } => records.len(),
      Self::Replace { records, .. } => records.len(),
    }
  }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  /// An append plan with nothing to append writes nothing. A replace plan
  /// always writes, even when empty: it clears the volatile set.
  pub fn is_noop(&self) -> bool {
    matches!(self, Self::Append { records, .. } if records.is_empty())
  }
}

/// Build the merge plan for `classification` under `run`.
pub fn plan(
  classification: &Classification,
  keys: &KeyAssignment,
  run: &RunContext,
) -> Result<MergePlan> {
  let entity_type = classification.entity_type;
  if run.entity_type != entity_type {
    return Err(Error::ClassificationInconsistency {
      entity_type,
      detail: format!("run {} belongs to {}", run.run_id, run.entity_type),
    });
  }

  let mut claimed: HashMap<SurrogateKey, NaturalCode> = HashMap::new();
  let mut key_for = |row: &ClassifiedRow| -> Result<SurrogateKey> {
    let key = keys.get(&row.natural_code).ok_or_else(|| Error::UnresolvedKey {
      entity_type,
      code: row.natural_code.clone(),
    })?;
    if let Some(first) = claimed.insert(key, row.natural_code.clone())
      && first != row.natural_code
    {
      return Err(Error::DuplicateKeyConflict {
        entity_type,
        key,
        first,
        second: row.natural_code.clone(),
      });
    }
    Ok(key)
  };

  match entity_type.merge_policy() {
    MergePolicy::AppendIfChanged => {
      let records = classification
        .accepted()
        .map(|row| {
          Ok(NewHistoricalRecord {
            surrogate_key: key_for(row)?,
            natural_code:  row.natural_code.clone(),
            season:        row.attributes.season(),
            attributes:    row.attributes.clone(),
            fingerprint:   row.fingerprint.clone(),
            change:        row.kind,
            recorded_at:   run.started_at,
            ingested_at:   row.ingested_at,
            run_id:        run.run_id,
          })
        })
        .collect::<Result<Vec<_>>>()?;
      Ok(MergePlan::Append { entity_type, records })
    }
    MergePolicy::ReplaceWholesale => {
      let records = classification
        .rows
        .iter()
        .map(|row| {
          Ok(NewVolatileRecord {
            surrogate_key: key_for(row)?,
            natural_code:  row.natural_code.clone(),
            season:        row.attributes.season(),
            attributes:    row.attributes.clone(),
            fingerprint:   row.fingerprint.clone(),
            loaded_at:     run.started_at,
            ingested_at:   row.ingested_at,
            run_id:        run.run_id,
          })
        })
        .collect::<Result<Vec<_>>>()?;
      Ok(MergePlan::Replace { entity_type, records })
    }
  }
}
