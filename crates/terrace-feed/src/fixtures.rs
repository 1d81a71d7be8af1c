//! `fixtures` payload → future-fixture, result and per-player stat
//! snapshots.
//!
//! Pipeline:
//!   raw &str
//!     └─ Vec<RawFixture>
//!          ├─ unfinished → fixture rows (volatile)
//!          └─ finished   ├─ result rows (final scores)
//!                        └─ stats blocks → one stat row per identifier,
//!                                          side and player

use chrono::{DateTime, Utc};
use serde::Deserialize;
use terrace_core::{
  entity::{EntityType, Season},
  row::{
    EntityAttributes, FixtureAttributes, MatchResultAttributes, Side, Snapshot, SnapshotRow,
    StatAttributes,
  },
};

use crate::{FixtureSnapshots, STAT_IDENTIFIERS, code_string, error::Result, parse_timestamp};

// ─── Wire shapes ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawFixture {
  code:              Option<serde_json::Value>,
  id:                Option<u32>,
  event:             Option<u32>,
  #[serde(default)]
  finished:          bool,
  kickoff_time:      Option<String>,
  team_a:            Option<u32>,
  team_h:            Option<u32>,
  team_a_score:      Option<u32>,
  team_h_score:      Option<u32>,
  team_a_difficulty: Option<u8>,
  team_h_difficulty: Option<u8>,
  #[serde(default)]
  stats:             Vec<RawStat>,
}

#[derive(Deserialize)]
struct RawStat {
  identifier: String,
  #[serde(default)]
  a:          Vec<RawEntry>,
  #[serde(default)]
  h:          Vec<RawEntry>,
}

#[derive(Deserialize)]
struct RawEntry {
  value:   i64,
  element: u32,
}

// ─── Decoding ────────────────────────────────────────────────────────────────

pub(crate) fn decode(
  input: &str,
  season: Season,
  ingested_at: DateTime<Utc>,
) -> Result<FixtureSnapshots> {
  let raw: Vec<RawFixture> = serde_json::from_str(input)?;

  let mut fixture_rows = Vec::new();
  for fixture in raw.iter().filter(|f| !f.finished) {
    fixture_rows.push(fixture_row(fixture, season, ingested_at)?);
  }

  let finished: Vec<&RawFixture> = raw.iter().filter(|f| f.finished).collect();
  let mut result_rows = Vec::with_capacity(finished.len());
  for fixture in &finished {
    result_rows.push(result_row(fixture, season, ingested_at)?);
  }

  let mut stat_rows = Vec::new();
  for identifier in STAT_IDENTIFIERS {
    for fixture in &finished {
      let game_code = code_string(fixture.code.as_ref());
      for stat in fixture.stats.iter().filter(|s| s.identifier == identifier) {
        for (side, entries) in [(Side::Away, &stat.a), (Side::Home, &stat.h)] {
          for entry in entries {
            stat_rows.push(stat_row(fixture, game_code.as_deref(), identifier, side, entry, ingested_at));
          }
        }
      }
    }
  }

  Ok(FixtureSnapshots {
    fixtures: Snapshot::new(EntityType::Fixture, ingested_at, fixture_rows),
    results:  Snapshot::new(EntityType::MatchResult, ingested_at, result_rows),
    stats:    Snapshot::new(EntityType::Stat, ingested_at, stat_rows),
  })
}

fn kickoff(raw: &RawFixture) -> Result<Option<DateTime<Utc>>> {
  raw
    .kickoff_time
    .as_deref()
    .map(|k| parse_timestamp("kickoff_time", k))
    .transpose()
}

fn fixture_row(
  raw: &RawFixture,
  season: Season,
  ingested_at: DateTime<Utc>,
) -> Result<SnapshotRow> {
  Ok(SnapshotRow {
    natural_code: code_string(raw.code.as_ref()),
    attributes: EntityAttributes::Fixture(FixtureAttributes {
      season,
      game_id: raw.id,
      game_week: raw.event,
      kickoff: kickoff(raw)?,
      home_team_id: raw.team_h,
      away_team_id: raw.team_a,
      home_difficulty: raw.team_h_difficulty,
      away_difficulty: raw.team_a_difficulty,
      home_score: raw.team_h_score,
      away_score: raw.team_a_score,
      finished: raw.finished,
    }),
    ingested_at,
  })
}

fn result_row(
  raw: &RawFixture,
  season: Season,
  ingested_at: DateTime<Utc>,
) -> Result<SnapshotRow> {
  Ok(SnapshotRow {
    natural_code: code_string(raw.code.as_ref()),
    attributes: EntityAttributes::MatchResult(MatchResultAttributes {
      season,
      game_id: raw.id,
      game_week: raw.event,
      kickoff: kickoff(raw)?,
      home_team_id: raw.team_h,
      away_team_id: raw.team_a,
      home_score: raw.team_h_score,
      away_score: raw.team_a_score,
    }),
    ingested_at,
  })
}

fn stat_row(
  fixture: &RawFixture,
  game_code: Option<&str>,
  identifier: &str,
  side: Side,
  entry: &RawEntry,
  ingested_at: DateTime<Utc>,
) -> SnapshotRow {
  // Without a fixture code the stat has no natural code either.
  let natural_code = game_code
    .map(|code| format!("{code}:{}:{identifier}:{}", entry.element, side.as_str()));

  SnapshotRow {
    natural_code,
    attributes: EntityAttributes::Stat(StatAttributes {
      game_code: game_code.map(str::to_owned),
      game_id: fixture.id,
      player_id: entry.element,
      stat_type: identifier.to_owned(),
      side,
      value: entry.value,
      finished: fixture.finished,
    }),
    ingested_at,
  }
}
