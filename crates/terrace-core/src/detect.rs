//! Change detection: incoming snapshot → NEW / CHANGED / UNCHANGED.
//!
//! Classification is a pure function of the snapshot rows and the current
//! stored versions of the same entity type. It writes nothing.

use std::collections::{BTreeMap, HashSet, btree_map::Entry};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{
  Error, Result,
  entity::{EntityType, MalformedReason, NaturalCode},
  history::Versioned,
  row::{EntityAttributes, SnapshotRow},
};

/// The outcome of comparing one canonical incoming row against history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeKind {
  /// Natural code never seen for this entity type.
  New,
  /// Seen before, but the tracked attributes differ from the latest version.
  Changed,
  /// Identical tracked attributes to the latest version.
  Unchanged,
}

impl ChangeKind {
  /// Whether rows of this kind produce a write under append-if-changed.
  pub fn is_write(self) -> bool { !matches!(self, Self::Unchanged) }
}

/// A snapshot row dropped for lack of a usable natural code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedRow {
  /// Index of the row within the incoming snapshot.
  pub position: usize,
  pub reason:   MalformedReason,
}

/// The single surviving row for a natural code, with its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedRow {
  pub natural_code: NaturalCode,
  pub kind:         ChangeKind,
  pub attributes:   EntityAttributes,
  pub fingerprint:  String,
  pub ingested_at:  DateTime<Utc>,
}

/// Result of [`classify`]. Rows are ordered by natural code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
  pub entity_type:          EntityType,
  pub rows:                 Vec<ClassifiedRow>,
  pub malformed:            Vec<MalformedRow>,
  /// Incoming rows discarded because a later row shared their natural code.
  pub duplicates_collapsed: usize,
}

impl Classification {
  pub fn count(&self, kind: ChangeKind) -> usize {
    self.rows.iter().filter(|r| r.kind == kind).count()
  }

  /// Rows that the append-if-changed merge writes.
  pub fn accepted(&self) -> impl Iterator<Item = &ClassifiedRow> {
    self.rows.iter().filter(|r| r.kind.is_write())
  }

  pub fn codes(&self) -> impl Iterator<Item = &NaturalCode> {
    self.rows.iter().map(|r| &r.natural_code)
  }
}

/// Classify every row of an incoming snapshot against `current`.
///
/// - Rows without a natural code are reported in
///   [`Classification::malformed`] and go no further.
/// - Duplicate natural codes collapse to one canonical row: the latest
///   `ingested_at` wins, and an exact tie goes to the row that appears later
///   in the snapshot.
/// - The latest stored version is the one with the latest `ingested_at`. A
///   row captured before it is UNCHANGED when some stored version already
///   carries its attributes, and CHANGED otherwise; either way it never
///   becomes the current version.
/// - Any row, incoming or stored, whose payload does not belong to
///   `entity_type` fails the whole classification.
pub fn classify<V: Versioned>(
  entity_type: EntityType,
  rows: &[SnapshotRow],
  current: &[V],
) -> Result<Classification> {
  let latest = latest_versions(entity_type, current)?;
  let known: HashSet<(&NaturalCode, &str)> =
    current.iter().map(|v| (v.natural_code(), v.fingerprint())).collect();

  let mut canonical: BTreeMap<NaturalCode, &SnapshotRow> = BTreeMap::new();
  let mut malformed = Vec::new();
  let mut duplicates_collapsed = 0;

  for (position, row) in rows.iter().enumerate() {
    let found = row.attributes.entity_type();
    if found != entity_type {
      return Err(Error::ClassificationInconsistency {
        entity_type,
        detail: format!("snapshot row {position} carries a {found} payload"),
      });
    }

    let code = match NaturalCode::parse(row.natural_code.as_deref()) {
      Ok(code) => code,
      Err(reason) => {
        malformed.push(MalformedRow { position, reason });
        continue;
      }
    };

    match canonical.entry(code) {
      Entry::Vacant(slot) => {
        slot.insert(row);
      }
      Entry::Occupied(mut slot) => {
        duplicates_collapsed += 1;
        if row.ingested_at >= slot.get().ingested_at {
          slot.insert(row);
        }
      }
    }
  }

  let rows = canonical
    .into_iter()
    .map(|(natural_code, row)| {
      let fingerprint = row.attributes.fingerprint()?;
      let kind = match latest.get(&natural_code) {
        None => ChangeKind::New,
        Some(prev) if prev.fingerprint() == fingerprint => ChangeKind::Unchanged,
        Some(prev)
          if row.ingested_at < prev.ingested_at()
            && known.contains(&(&natural_code, fingerprint.as_str())) =>
        {
          ChangeKind::Unchanged
        }
        Some(_) => ChangeKind::Changed,
      };
      Ok(ClassifiedRow {
        natural_code,
        kind,
        attributes: row.attributes.clone(),
        fingerprint,
        ingested_at: row.ingested_at,
      })
    })
    .collect::<Result<Vec<_>>>()?;

  Ok(Classification { entity_type, rows, malformed, duplicates_collapsed })
}

/// The most recent stored version per natural code.
pub fn latest_versions<V: Versioned>(
  entity_type: EntityType,
  current: &[V],
) -> Result<BTreeMap<NaturalCode, &V>> {
  let mut latest: BTreeMap<NaturalCode, &V> = BTreeMap::new();
  for record in current {
    let found = record.attributes().entity_type();
    if record.entity_type() != entity_type || found != entity_type {
      return Err(Error::ClassificationInconsistency {
        entity_type,
        detail: format!(
          "stored version of {} carries a {found} payload",
          record.natural_code()
        ),
      });
    }
    match latest.entry(record.natural_code().clone()) {
      Entry::Vacant(slot) => {
        slot.insert(record);
      }
      Entry::Occupied(mut slot) => {
        if record.version_order() > slot.get().version_order() {
          slot.insert(record);
        }
      }
    }
  }
  Ok(latest)
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};
  use uuid::Uuid;

  use super::*;
  use crate::{
    entity::{Season, SurrogateKey},
    history::HistoricalRecord,
    row::{StatAttributes, TeamAttributes, Side},
  };

  fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 8, 1, 9, 0, 0).unwrap() }

  fn team(name: &str, logo: &str) -> EntityAttributes {
    EntityAttributes::Team(TeamAttributes {
      season:     Season::new(2024),
      team_id:    Some(1),
      name:       name.into(),
      short_name: name[..3].to_uppercase(),
      logo_url:   Some(logo.into()),
    })
  }

  fn row(code: &str, attrs: EntityAttributes, secs: i64) -> SnapshotRow {
    SnapshotRow::new(code, attrs, t0() + Duration::seconds(secs))
  }

  fn stored(code: &str, attrs: EntityAttributes, record_id: i64) -> HistoricalRecord {
    HistoricalRecord {
      record_id,
      entity_type: attrs.entity_type(),
      surrogate_key: SurrogateKey(record_id),
      natural_code: code.parse().unwrap(),
      season: attrs.season(),
      fingerprint: attrs.fingerprint().unwrap(),
      attributes: attrs,
      change: ChangeKind::New,
      recorded_at: t0(),
      ingested_at: t0(),
      run_id: Uuid::nil(),
    }
  }

  #[test]
  fn classifies_new_changed_and_unchanged() {
    let history = vec![
      stored("3", team("Arsenal", "a.png"), 1),
      stored("8", team("Chelsea", "c.png"), 2),
    ];
    let incoming = vec![
      row("3", team("Arsenal", "a2.png"), 0),
      row("8", team("Chelsea FC", "c.png"), 0),
      row("14", team("Liverpool", "l.png"), 0),
    ];

    let c = classify(EntityType::Team, &incoming, &history).unwrap();
    let kinds: Vec<_> =
      c.rows.iter().map(|r| (r.natural_code.as_str(), r.kind)).collect();
    assert_eq!(kinds, [
      ("3", ChangeKind::Unchanged),
      ("8", ChangeKind::Changed),
      ("14", ChangeKind::New),
    ]);
    assert_eq!(c.accepted().count(), 2);
  }

  #[test]
  fn compares_against_the_latest_stored_version() {
    let mut newer = stored("8", team("Chelsea FC", "c.png"), 5);
    newer.recorded_at = t0() + Duration::days(7);
    let history = vec![newer, stored("8", team("Chelsea", "c.png"), 2)];

    let incoming = vec![row("8", team("Chelsea FC", "c.png"), 0)];
    let c = classify(EntityType::Team, &incoming, &history).unwrap();
    assert_eq!(c.rows[0].kind, ChangeKind::Unchanged);
  }

  #[test]
  fn latest_version_is_the_latest_ingestion_not_the_latest_run() {
    // Recorded by a later run, but captured by the source earlier.
    let mut late = stored("8", team("Chelsea", "c.png"), 5);
    late.recorded_at = t0() + Duration::days(7);
    late.ingested_at = t0() - Duration::days(1);
    let fresh = stored("8", team("Chelsea FC", "c.png"), 2);
    let history = vec![fresh, late];

    let code: NaturalCode = "8".parse().unwrap();
    let latest = latest_versions(EntityType::Team, &history).unwrap();
    assert_eq!(latest[&code].record_id, 2);
  }

  #[test]
  fn late_rows_never_supersede_the_current_version() {
    let mut old = stored("8", team("Chelsea", "c.png"), 1);
    old.ingested_at = t0() - Duration::days(2);
    let current = stored("8", team("Chelsea FC", "c.png"), 2);
    let history = vec![old, current];

    // A late copy of a version already on record writes nothing.
    let replay = vec![row("8", team("Chelsea", "c.png"), -86_400)];
    let c = classify(EntityType::Team, &replay, &history).unwrap();
    assert_eq!(c.rows[0].kind, ChangeKind::Unchanged);

    // A late row carrying attributes never recorded is kept as history.
    let backfill = vec![row("8", team("Chelsea Football Club", "c.png"), -86_400)];
    let c = classify(EntityType::Team, &backfill, &history).unwrap();
    assert_eq!(c.rows[0].kind, ChangeKind::Changed);
  }

  #[test]
  fn duplicates_collapse_to_latest_ingestion() {
    let incoming = vec![
      row("3", team("Arsenal", "late.png"), 30),
      row("3", team("Arsenal", "early.png"), 10),
      row("3", team("Arsenal", "middle.png"), 20),
    ];
    let c = classify::<HistoricalRecord>(EntityType::Team, &incoming, &[]).unwrap();
    assert_eq!(c.rows.len(), 1);
    assert_eq!(c.duplicates_collapsed, 2);
    assert_eq!(c.rows[0].ingested_at, t0() + Duration::seconds(30));
    let EntityAttributes::Team(t) = &c.rows[0].attributes else { panic!() };
    assert_eq!(t.logo_url.as_deref(), Some("late.png"));
  }

  #[test]
  fn timestamp_ties_go_to_the_later_row() {
    let incoming = vec![
      row("3", team("Arsenal", "first.png"), 0),
      row("3", team("Arsenal", "second.png"), 0),
    ];
    let c = classify::<HistoricalRecord>(EntityType::Team, &incoming, &[]).unwrap();
    let EntityAttributes::Team(t) = &c.rows[0].attributes else { panic!() };
    assert_eq!(t.logo_url.as_deref(), Some("second.png"));
  }

  #[test]
  fn rows_without_code_are_reported_not_classified() {
    let mut missing = row("1", team("Brighton", "b.png"), 0);
    missing.natural_code = None;
    let blank = row("   ", team("Burnley", "b.png"), 0);
    let incoming = vec![missing, row("3", team("Arsenal", "a.png"), 0), blank];

    let c = classify::<HistoricalRecord>(EntityType::Team, &incoming, &[]).unwrap();
    assert_eq!(c.rows.len(), 1);
    assert_eq!(c.malformed, [
      MalformedRow { position: 0, reason: MalformedReason::MissingCode },
      MalformedRow { position: 2, reason: MalformedReason::BlankCode },
    ]);
  }

  #[test]
  fn foreign_payload_fails_the_whole_batch() {
    let stat = EntityAttributes::Stat(StatAttributes {
      game_code: Some("1".into()),
      game_id:   Some(1),
      player_id: 5,
      stat_type: "goals_scored".into(),
      side:      Side::Home,
      value:     1,
      finished:  true,
    });
    let incoming = vec![row("3", team("Arsenal", "a.png"), 0), row("9", stat, 0)];
    let err = classify::<HistoricalRecord>(EntityType::Team, &incoming, &[]).unwrap_err();
    assert!(matches!(err, Error::ClassificationInconsistency { .. }));
  }

  #[test]
  fn foreign_history_fails_the_whole_batch() {
    let mut bad = stored("3", team("Arsenal", "a.png"), 1);
    bad.entity_type = EntityType::Player;
    let incoming = vec![row("3", team("Arsenal", "a.png"), 0)];
    let err = classify(EntityType::Team, &incoming, &[bad]).unwrap_err();
    assert!(matches!(err, Error::ClassificationInconsistency { .. }));
  }
}
