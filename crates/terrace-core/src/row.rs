//! Snapshot rows, the unit the source feed delivers on every run.
//!
//! A snapshot row carries a possibly-missing natural code and a typed
//! attribute payload. Only the *tracked* subset of the payload decides
//! whether a row is a new version of an entity; the rest is carried along
//! untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
  Result,
  entity::{EntityType, Season},
};

// ─── Per-entity payloads ─────────────────────────────────────────────────────

/// A club as listed in the season's bootstrap data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamAttributes {
  pub season:     Season,
  /// Per-season id used by fixtures to reference the team.
  pub team_id:    Option<u32>,
  pub name:       String,
  pub short_name: String,
  pub logo_url:   Option<String>,
}

/// A player registration. Team, position and region are the tracked
/// history; names and the photo are cosmetic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerAttributes {
  pub season:      Season,
  /// Per-season element id; stats reference players through it.
  pub player_id:   Option<u32>,
  pub first_name:  String,
  pub second_name: String,
  pub web_name:    String,
  pub team_code:   Option<u64>,
  pub team_id:     Option<u32>,
  /// Source `element_type`: 1 GK, 2 DEF, 3 MID, 4 FWD.
  pub position:    u8,
  pub region:      Option<u32>,
  pub can_select:  Option<bool>,
  pub photo_url:   Option<String>,
}

/// A scheduled fixture. Scores are present once a game has kicked off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureAttributes {
  pub season:          Season,
  pub game_id:         Option<u32>,
  pub game_week:       Option<u32>,
  pub kickoff:         Option<DateTime<Utc>>,
  pub home_team_id:    Option<u32>,
  pub away_team_id:    Option<u32>,
  pub home_difficulty: Option<u8>,
  pub away_difficulty: Option<u8>,
  pub home_score:      Option<u32>,
  pub away_score:      Option<u32>,
  pub finished:        bool,
}

/// The final score of a finished fixture. Team ids are the per-season ids
/// also carried by [`TeamAttributes::team_id`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResultAttributes {
  pub season:       Season,
  pub game_id:      Option<u32>,
  pub game_week:    Option<u32>,
  pub kickoff:      Option<DateTime<Utc>>,
  pub home_team_id: Option<u32>,
  pub away_team_id: Option<u32>,
  pub home_score:   Option<u32>,
  pub away_score:   Option<u32>,
}

/// Which side of a fixture a statistic was recorded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
  #[serde(rename = "h")]
  Home,
  #[serde(rename = "a")]
  Away,
}

impl Side {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Home => "h",
      Self::Away => "a",
    }
  }
}

/// One statistic for one player in one finished fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatAttributes {
  /// Source code of the fixture, kept verbatim.
  pub game_code: Option<String>,
  pub game_id:   Option<u32>,
  /// Per-season element id of the player.
  pub player_id: u32,
  pub stat_type: String,
  pub side:      Side,
  pub value:     i64,
  pub finished:  bool,
}

// ─── EntityAttributes ────────────────────────────────────────────────────────

/// The typed payload of a snapshot row. The variant name doubles as the
/// entity type discriminant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EntityAttributes {
  Team(TeamAttributes),
  Player(PlayerAttributes),
  Fixture(FixtureAttributes),
  MatchResult(MatchResultAttributes),
  Stat(StatAttributes),
}

impl EntityAttributes {
  pub fn entity_type(&self) -> EntityType {
    match self {
      Self::Team(_) => EntityType::Team,
      Self::Player(_) => EntityType::Player,
      Self::Fixture(_) => EntityType::Fixture,
      Self::MatchResult(_) => EntityType::MatchResult,
      Self::Stat(_) => EntityType::Stat,
    }
  }

  /// The season a row belongs to, for entity types that are season-scoped.
  pub fn season(&self) -> Option<Season> {
    match self {
      Self::Team(t) => Some(t.season),
      Self::Player(p) => Some(p.season),
      Self::Fixture(f) => Some(f.season),
      Self::MatchResult(r) => Some(r.season),
      Self::Stat(_) => None,
    }
  }

  /// The attribute subset whose change produces a new historical version.
  ///
  /// Serialised with sorted keys, so equal tracked sets always produce the
  /// same bytes.
  pub fn tracked(&self) -> serde_json::Value {
    match self {
      Self::Team(t) => serde_json::json!({
        "season":     t.season,
        "name":       t.name,
        "short_name": t.short_name,
      }),
      Self::Player(p) => serde_json::json!({
        "season":    p.season,
        "team_code": p.team_code,
        "position":  p.position,
        "region":    p.region,
      }),
      Self::Fixture(f) => serde_json::json!({
        "season":          f.season,
        "game_week":       f.game_week,
        "kickoff":         f.kickoff,
        "home_team_id":    f.home_team_id,
        "away_team_id":    f.away_team_id,
        "home_difficulty": f.home_difficulty,
        "away_difficulty": f.away_difficulty,
      }),
      Self::MatchResult(r) => serde_json::json!({
        "season":       r.season,
        "home_team_id": r.home_team_id,
        "away_team_id": r.away_team_id,
        "home_score":   r.home_score,
        "away_score":   r.away_score,
      }),
      Self::Stat(s) => serde_json::json!({ "value": s.value }),
    }
  }

  /// Lowercase hex SHA-256 of the tracked attribute set.
  pub fn fingerprint(&self) -> Result<String> {
    let bytes = serde_json::to_vec(&self.tracked())?;
    Ok(hex::encode(Sha256::digest(&bytes)))
  }

  /// Serialise the inner payload (without the type tag) for storage.
  pub fn to_json(&self) -> Result<serde_json::Value> {
    let full = serde_json::to_value(self)?;
    Ok(full.get("data").cloned().unwrap_or(serde_json::Value::Null))
  }

  /// Rebuild from the stored entity type discriminant and JSON payload.
  pub fn from_parts(entity_type: EntityType, data: serde_json::Value) -> Result<Self> {
    let wrapped =
      serde_json::json!({ "type": entity_type.discriminant(), "data": data });
    Ok(serde_json::from_value(wrapped)?)
  }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// One raw row as delivered by the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRow {
  /// Source identifier. `None` when the feed omitted it.
  pub natural_code: Option<String>,
  pub attributes:   EntityAttributes,
  /// When the ingestion layer captured this row.
  pub ingested_at:  DateTime<Utc>,
}

impl SnapshotRow {
  pub fn new(
    natural_code: impl Into<String>,
    attributes: EntityAttributes,
    ingested_at: DateTime<Utc>,
  ) -> Self {
    Self { natural_code: Some(natural_code.into()), attributes, ingested_at }
  }
}

/// A full batch of current-state rows for one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
  pub entity_type: EntityType,
  pub received_at: DateTime<Utc>,
  pub rows:        Vec<SnapshotRow>,
}

impl Snapshot {
  pub fn new(entity_type: EntityType, received_at: DateTime<Utc>, rows: Vec<SnapshotRow>) -> Self {
    Self { entity_type, received_at, rows }
  }

  pub fn is_empty(&self) -> bool { self.rows.is_empty() }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn player(team_code: u64, photo: &str) -> EntityAttributes {
    EntityAttributes::Player(PlayerAttributes {
      season:      Season::new(2024),
      player_id:   Some(7),
      first_name:  "Bukayo".into(),
      second_name: "Saka".into(),
      web_name:    "Saka".into(),
      team_code:   Some(team_code),
      team_id:     Some(1),
      position:    3,
      region:      Some(241),
      can_select:  Some(true),
      photo_url:   Some(photo.into()),
    })
  }

  #[test]
  fn photo_changes_do_not_move_the_fingerprint() {
    let a = player(3, "p1.png");
    let b = player(3, "p2.png");
    assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
  }

  #[test]
  fn team_changes_move_the_fingerprint() {
    let a = player(3, "p.png");
    let b = player(14, "p.png");
    assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
  }

  fn result(home_score: u32, kickoff_hour: u32) -> EntityAttributes {
    use chrono::TimeZone;
    EntityAttributes::MatchResult(MatchResultAttributes {
      season:       Season::new(2024),
      game_id:      Some(1),
      game_week:    Some(1),
      kickoff:      Some(Utc.with_ymd_and_hms(2024, 8, 16, kickoff_hour, 0, 0).unwrap()),
      home_team_id: Some(14),
      away_team_id: Some(9),
      home_score:   Some(home_score),
      away_score:   Some(0),
    })
  }

  #[test]
  fn score_corrections_move_the_fingerprint() {
    assert_ne!(result(1, 19).fingerprint().unwrap(), result(2, 19).fingerprint().unwrap());
    assert_eq!(result(1, 19).fingerprint().unwrap(), result(1, 20).fingerprint().unwrap());
  }

  #[test]
  fn payload_survives_storage_encoding() {
    let attrs = player(3, "p.png");
    let json = attrs.to_json().unwrap();
    assert!(json.get("type").is_none());
    let back = EntityAttributes::from_parts(EntityType::Player, json).unwrap();
    assert_eq!(back, attrs);
  }

  #[test]
  fn payload_under_wrong_entity_type_is_rejected() {
    let json = player(3, "p.png").to_json().unwrap();
    assert!(EntityAttributes::from_parts(EntityType::Stat, json).is_err());
  }
}
