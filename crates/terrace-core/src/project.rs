//! Reporting projections derived from stored records.
//!
//! Every view here is recomputed from its inputs on each call; the
//! projector holds no state of its own.

use std::collections::{BTreeMap, btree_map::Entry};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  entity::{EntityType, NaturalCode, Season, SurrogateKey},
  history::{HistoricalRecord, Versioned, VolatileRecord},
  row::EntityAttributes,
};

/// One surviving row of a deduplicated view. Validity windows follow the
/// source's ingestion timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionRow {
  pub surrogate_key: SurrogateKey,
  pub natural_code:  NaturalCode,
  pub season:        Option<Season>,
  pub attributes:    EntityAttributes,
  pub valid_from:    DateTime<Utc>,
  /// Start of the next distinct version, or `None` for the current one.
  pub valid_to:      Option<DateTime<Utc>>,
  pub ingested_at:   DateTime<Utc>,
}

impl DimensionRow {
  fn from_version<V: Versioned>(v: &V) -> Self {
    Self {
      surrogate_key: v.surrogate_key(),
      natural_code:  v.natural_code().clone(),
      season:        v.attributes().season(),
      attributes:    v.attributes().clone(),
      valid_from:    v.ingested_at(),
      valid_to:      None,
      ingested_at:   v.ingested_at(),
    }
  }

  pub fn is_current(&self) -> bool { self.valid_to.is_none() }
}

/// Season total of one statistic for one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatTotal {
  pub player_id: u32,
  pub stat_type: String,
  pub total:     i64,
  /// Number of distinct fixture-side entries that contributed.
  pub entries:   usize,
}

/// One team's record over a season, built from final scores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSeasonRecord {
  pub season:        Season,
  pub team_id:       u32,
  pub played:        u32,
  pub won:           u32,
  pub drawn:         u32,
  pub lost:          u32,
  pub goals_for:     u32,
  pub goals_against: u32,
  pub points:        u32,
}

impl TeamSeasonRecord {
  fn new(season: Season, team_id: u32) -> Self {
    Self {
      season,
      team_id,
      played: 0,
      won: 0,
      drawn: 0,
      lost: 0,
      goals_for: 0,
      goals_against: 0,
      points: 0,
    }
  }

  fn tally(&mut self, scored: u32, conceded: u32) {
    self.played += 1;
    self.goals_for += scored;
    self.goals_against += conceded;
    match scored.cmp(&conceded) {
      std::cmp::Ordering::Greater => {
        self.won += 1;
        self.points += 3;
      }
      std::cmp::Ordering::Equal => {
        self.drawn += 1;
        self.points += 1;
      }
      std::cmp::Ordering::Less => self.lost += 1,
    }
  }
}

/// Everything the reporting layer reads for one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectedViews {
  pub entity_type: EntityType,
  /// Exactly one row per natural code.
  pub dimension:   Vec<DimensionRow>,
  /// One row per distinct attribute tuple per natural code.
  pub versions:    Vec<DimensionRow>,
  /// Populated for [`EntityType::Stat`] only.
  pub stat_totals: Vec<StatTotal>,
  /// Populated for [`EntityType::MatchResult`] only.
  pub team_history: Vec<TeamSeasonRecord>,
}

/// Rank-1 row per natural code by latest version, ordered by surrogate key.
pub fn dimension<V: Versioned>(records: &[V]) -> Vec<DimensionRow> {
  let mut latest: BTreeMap<&NaturalCode, &V> = BTreeMap::new();
  for record in records {
    keep_latest(&mut latest, record.natural_code(), record);
  }

  let mut rows: Vec<DimensionRow> =
    latest.into_values().map(DimensionRow::from_version).collect();
  rows.sort_by_key(|r| r.surrogate_key);
  rows
}

/// Rank-1 row per `(natural code, tracked attribute tuple)`, with validity
/// windows chained per natural code.
pub fn versions<V: Versioned>(records: &[V]) -> Vec<DimensionRow> {
  let mut latest: BTreeMap<(&NaturalCode, &str), &V> = BTreeMap::new();
  for record in records {
    keep_latest(&mut latest, (record.natural_code(), record.fingerprint()), record);
  }

  let mut ranked: Vec<&V> = latest.into_values().collect();
  ranked.sort_by(|a, b| {
    a.surrogate_key()
      .cmp(&b.surrogate_key())
      .then_with(|| a.version_order().cmp(&b.version_order()))
  });

  let mut rows: Vec<DimensionRow> = ranked.iter().map(|v| DimensionRow::from_version(*v)).collect();
  for i in 1..rows.len() {
    if rows[i].natural_code == rows[i - 1].natural_code {
      rows[i - 1].valid_to = Some(rows[i].valid_from);
    }
  }
  rows
}

/// The current fixture schedule, ordered by kickoff. Fixtures without a
/// kickoff time sort last.
pub fn fixtures(records: &[VolatileRecord]) -> Vec<DimensionRow> {
  let mut rows = dimension(records);
  rows.sort_by_key(|r| {
    let kickoff = match &r.attributes {
      EntityAttributes::Fixture(f) => f.kickoff,
      _ => None,
    };
    (kickoff.is_none(), kickoff, r.surrogate_key)
  });
  rows
}

/// Sum the current value of every stat entry per player and stat type.
pub fn stat_totals(records: &[HistoricalRecord]) -> Vec<StatTotal> {
  let mut totals: BTreeMap<(u32, String), StatTotal> = BTreeMap::new();
  for row in dimension(records) {
    let EntityAttributes::Stat(stat) = row.attributes else {
      continue;
    };
    let total = totals
      .entry((stat.player_id, stat.stat_type.clone()))
      .or_insert_with(|| StatTotal {
        player_id: stat.player_id,
        stat_type: stat.stat_type,
        total:     0,
        entries:   0,
      });
    total.total += stat.value;
    total.entries += 1;
  }
  totals.into_values().collect()
}

/// Played, won, drawn, lost and goals per team and season, from the
/// current version of every result. Results missing a team or a score are
/// skipped.
pub fn team_history(records: &[HistoricalRecord]) -> Vec<TeamSeasonRecord> {
  let mut table: BTreeMap<(Season, u32), TeamSeasonRecord> = BTreeMap::new();
  for row in dimension(records) {
    let EntityAttributes::MatchResult(result) = row.attributes else {
      continue;
    };
    let (Some(home), Some(away), Some(home_score), Some(away_score)) = (
      result.home_team_id,
      result.away_team_id,
      result.home_score,
      result.away_score,
    ) else {
      continue;
    };
    let season = result.season;
    for (team_id, scored, conceded) in [(home, home_score, away_score), (away, away_score, home_score)] {
      table
        .entry((season, team_id))
        .or_insert_with(|| TeamSeasonRecord::new(season, team_id))
        .tally(scored, conceded);
    }
  }
  table.into_values().collect()
}

/// Build every view for `entity_type`. Volatile types read `volatile`;
/// all others read `history`.
pub fn project(
  entity_type: EntityType,
  history: &[HistoricalRecord],
  volatile: &[VolatileRecord],
) -> ProjectedViews {
  if entity_type.is_volatile() {
    return ProjectedViews {
      entity_type,
      dimension: fixtures(volatile),
      versions: Vec::new(),
      stat_totals: Vec::new(),
      team_history: Vec::new(),
    };
  }

  ProjectedViews {
    entity_type,
    dimension: dimension(history),
    versions: versions(history),
    stat_totals: if entity_type == EntityType::Stat {
      stat_totals(history)
    } else {
      Vec::new()
    },
    team_history: if entity_type == EntityType::MatchResult {
      team_history(history)
    } else {
      Vec::new()
    },
  }
}

fn keep_latest<'a, K: Ord, V: Versioned>(
  latest: &mut BTreeMap<K, &'a V>,
  key: K,
  record: &'a V,
) {
  match latest.entry(key) {
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

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};
  use uuid::Uuid;

  use super::*;
  use crate::{
    detect::ChangeKind,
    row::{MatchResultAttributes, PlayerAttributes, Side, StatAttributes},
  };

  fn t(days: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap() + Duration::days(days)
  }

  fn player(team_code: u64) -> EntityAttributes {
    EntityAttributes::Player(PlayerAttributes {
      season:      Season::new(2024),
      player_id:   Some(10),
      first_name:  "Cole".into(),
      second_name: "Palmer".into(),
      web_name:    "Palmer".into(),
      team_code:   Some(team_code),
      team_id:     None,
      position:    3,
      region:      Some(241),
      can_select:  None,
      photo_url:   None,
    })
  }

  fn record(
    record_id: i64,
    code: &str,
    key: i64,
    attributes: EntityAttributes,
    recorded_at: DateTime<Utc>,
    ingested_at: DateTime<Utc>,
  ) -> HistoricalRecord {
    HistoricalRecord {
      record_id,
      entity_type: attributes.entity_type(),
      surrogate_key: SurrogateKey(key),
      natural_code: code.parse().unwrap(),
      season: attributes.season(),
      fingerprint: attributes.fingerprint().unwrap(),
      attributes,
      change: ChangeKind::New,
      recorded_at,
      ingested_at,
      run_id: Uuid::nil(),
    }
  }

  #[test]
  fn identical_rows_dedup_to_latest_ingestion() {
    let records = vec![
      record(1, "10", 1, player(8), t(0), t(0) + Duration::hours(1)),
      record(2, "10", 1, player(8), t(0), t(0) + Duration::hours(3)),
      record(3, "10", 1, player(8), t(0), t(0) + Duration::hours(2)),
    ];
    let dim = dimension(&records);
    assert_eq!(dim.len(), 1);
    assert_eq!(dim[0].ingested_at, t(0) + Duration::hours(3));
  }

  #[test]
  fn latest_team_wins_and_history_keeps_both() {
    let records = vec![
      record(1, "10", 1, player(3), t(0), t(0)),
      record(2, "10", 1, player(8), t(7), t(7)),
    ];

    let dim = dimension(&records);
    assert_eq!(dim.len(), 1);
    assert!(matches!(&dim[0].attributes, EntityAttributes::Player(p) if p.team_code == Some(8)));

    let history = versions(&records);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].valid_to, Some(t(7)));
    assert!(history[1].is_current());
  }

  #[test]
  fn dimension_is_ordered_by_surrogate_key() {
    let records = vec![
      record(1, "99", 2, player(3), t(0), t(0)),
      record(2, "5", 1, player(3), t(0), t(0)),
    ];
    let keys: Vec<_> = dimension(&records).iter().map(|r| r.surrogate_key.0).collect();
    assert_eq!(keys, [1, 2]);
  }

  fn stat(player_id: u32, game_code: u64, value: i64) -> EntityAttributes {
    EntityAttributes::Stat(StatAttributes {
      game_code: Some(game_code.to_string()),
      game_id: None,
      player_id,
      stat_type: "goals_scored".into(),
      side: Side::Home,
      value,
      finished: true,
    })
  }

  #[test]
  fn stat_totals_use_the_corrected_value() {
    let records = vec![
      record(1, "100:7:goals_scored:h", 1, stat(7, 100, 1), t(0), t(0)),
      record(2, "101:7:goals_scored:h", 2, stat(7, 101, 2), t(0), t(0)),
      // Late correction of the first fixture.
      record(3, "100:7:goals_scored:h", 1, stat(7, 100, 2), t(1), t(1)),
    ];
    let totals = stat_totals(&records);
    assert_eq!(totals, [StatTotal {
      player_id: 7,
      stat_type: "goals_scored".into(),
      total:     4,
      entries:   2,
    }]);
  }

  #[test]
  fn late_arrival_does_not_displace_fresher_data() {
    let records = vec![
      record(1, "10", 1, player(2), t(10), t(5)),
      // Written by a later run, but captured before the first row.
      record(2, "10", 1, player(1), t(11), t(1)),
    ];
    let dim = dimension(&records);
    assert!(matches!(&dim[0].attributes, EntityAttributes::Player(p) if p.team_code == Some(2)));

    let history = versions(&records);
    assert_eq!(history[0].valid_from, t(1));
    assert_eq!(history[0].valid_to, Some(t(5)));
    assert!(history[1].is_current());
  }

  fn result(home: u32, away: u32, home_score: u32, away_score: u32) -> EntityAttributes {
    EntityAttributes::MatchResult(MatchResultAttributes {
      season:       Season::new(2024),
      game_id:      None,
      game_week:    Some(1),
      kickoff:      None,
      home_team_id: Some(home),
      away_team_id: Some(away),
      home_score:   Some(home_score),
      away_score:   Some(away_score),
    })
  }

  #[test]
  fn team_history_tallies_current_results() {
    let records = vec![
      record(1, "2444470", 1, result(1, 12, 0, 2), t(0), t(0)),
      record(2, "2444471", 2, result(12, 3, 1, 1), t(0), t(0)),
      // Corrected score for the first game.
      record(3, "2444470", 1, result(1, 12, 1, 2), t(1), t(1)),
    ];
    let table = team_history(&records);
    let liverpool = table.iter().find(|r| r.team_id == 12).unwrap();
    assert_eq!(
      (liverpool.played, liverpool.won, liverpool.drawn, liverpool.lost),
      (2, 1, 1, 0)
    );
    assert_eq!((liverpool.goals_for, liverpool.goals_against, liverpool.points), (3, 2, 4));

    let arsenal = table.iter().find(|r| r.team_id == 1).unwrap();
    assert_eq!((arsenal.lost, arsenal.goals_for, arsenal.points), (1, 1, 0));
    assert_eq!(table.len(), 3);
  }
}
