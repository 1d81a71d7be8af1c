//! `bootstrap-static` payload → team and player snapshots.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use terrace_core::{
  entity::{EntityType, Season},
  row::{EntityAttributes, PlayerAttributes, Snapshot, SnapshotRow, TeamAttributes},
};

use crate::{
  BootstrapSnapshots, code_string,
  error::{Error, Result},
  parse_timestamp, player_photo_url, team_logo_url,
};

// ─── Wire shapes ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawBootstrap {
  teams:    Option<Vec<RawTeam>>,
  elements: Option<Vec<RawElement>>,
  #[serde(default)]
  events:   Vec<RawEvent>,
}

#[derive(Deserialize)]
struct RawEvent {
  deadline_time: Option<String>,
}

#[derive(Deserialize)]
struct RawTeam {
  id:         Option<u32>,
  code:       Option<serde_json::Value>,
  #[serde(default)]
  name:       String,
  #[serde(default)]
  short_name: String,
}

#[derive(Deserialize)]
struct RawElement {
  id:           Option<u32>,
  code:         Option<serde_json::Value>,
  #[serde(default)]
  first_name:   String,
  #[serde(default)]
  second_name:  String,
  #[serde(default)]
  web_name:     String,
  team_code:    Option<u64>,
  team:         Option<u32>,
  #[serde(default)]
  element_type: u8,
  region:       Option<u32>,
  can_select:   Option<bool>,
}

// ─── Decoding ────────────────────────────────────────────────────────────────

pub(crate) fn decode(input: &str, ingested_at: DateTime<Utc>) -> Result<BootstrapSnapshots> {
  let raw: RawBootstrap = serde_json::from_str(input)?;
  let teams = raw.teams.ok_or(Error::MissingSection("teams"))?;
  let elements = raw.elements.ok_or(Error::MissingSection("elements"))?;

  let deadlines = raw
    .events
    .iter()
    .filter_map(|e| e.deadline_time.as_deref())
    .map(|d| parse_timestamp("deadline_time", d))
    .collect::<Result<Vec<_>>>()?;
  let first_deadline = deadlines.iter().min().copied().ok_or(Error::NoDeadline)?;
  let last_deadline = deadlines.iter().max().copied().ok_or(Error::NoDeadline)?;
  let season = Season::from_first_deadline(first_deadline);

  let team_rows = teams
    .into_iter()
    .map(|t| team_row(t, season, ingested_at))
    .collect();
  let player_rows = elements
    .into_iter()
    .map(|p| player_row(p, season, ingested_at))
    .collect();

  Ok(BootstrapSnapshots {
    season,
    first_deadline,
    last_deadline,
    teams: Snapshot::new(EntityType::Team, ingested_at, team_rows),
    players: Snapshot::new(EntityType::Player, ingested_at, player_rows),
  })
}

fn team_row(raw: RawTeam, season: Season, ingested_at: DateTime<Utc>) -> SnapshotRow {
  let code = code_string(raw.code.as_ref());
  SnapshotRow {
    attributes: EntityAttributes::Team(TeamAttributes {
      season,
      team_id: raw.id,
      name: raw.name,
      short_name: raw.short_name,
      logo_url: code.as_deref().map(team_logo_url),
    }),
    natural_code: code,
    ingested_at,
  }
}

fn player_row(raw: RawElement, season: Season, ingested_at: DateTime<Utc>) -> SnapshotRow {
  let code = code_string(raw.code.as_ref());
  SnapshotRow {
    attributes: EntityAttributes::Player(PlayerAttributes {
      season,
      player_id: raw.id,
      first_name: raw.first_name,
      second_name: raw.second_name,
      web_name: raw.web_name,
      team_code: raw.team_code,
      team_id: raw.team,
      position: raw.element_type,
      region: raw.region,
      can_select: raw.can_select,
      photo_url: code.as_deref().map(player_photo_url),
    }),
    natural_code: code,
    ingested_at,
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn now() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 8, 10, 6, 0, 0).unwrap() }

  const PAYLOAD: &str = r#"{
    "events": [
      {"id": 2, "deadline_time": "2024-08-24T10:00:00Z"},
      {"id": 1, "deadline_time": "2024-08-16T17:30:00Z"},
      {"id": 38, "deadline_time": "2025-05-25T13:30:00Z"}
    ],
    "teams": [
      {"id": 1, "code": 3, "name": "Arsenal", "short_name": "ARS", "strength": 4},
      {"id": 2, "code": null, "name": "Aston Villa", "short_name": "AVL"}
    ],
    "elements": [
      {
        "id": 328, "code": 118748, "first_name": "Mohamed", "second_name": "Salah",
        "web_name": "M.Salah", "team_code": 14, "team": 12, "element_type": 3,
        "region": 65, "can_select": true, "now_cost": 125
      }
    ]
  }"#;

  #[test]
  fn decodes_teams_and_players() {
    let decoded = decode(PAYLOAD, now()).unwrap();
    assert_eq!(decoded.season, Season::new(2024));
    assert_eq!(decoded.first_deadline, Utc.with_ymd_and_hms(2024, 8, 16, 17, 30, 0).unwrap());
    assert_eq!(decoded.last_deadline, Utc.with_ymd_and_hms(2025, 5, 25, 13, 30, 0).unwrap());

    assert_eq!(decoded.teams.entity_type, EntityType::Team);
    assert_eq!(decoded.teams.rows.len(), 2);
    let arsenal = &decoded.teams.rows[0];
    assert_eq!(arsenal.natural_code.as_deref(), Some("3"));
    let EntityAttributes::Team(t) = &arsenal.attributes else {
      panic!("expected team attributes")
    };
    assert_eq!(t.short_name, "ARS");
    assert_eq!(t.logo_url.as_deref(), Some("https://resources.premierleague.com/premierleague/badges/t3.png"));

    let salah = &decoded.players.rows[0];
    assert_eq!(salah.natural_code.as_deref(), Some("118748"));
    assert_eq!(salah.ingested_at, now());
    let EntityAttributes::Player(p) = &salah.attributes else {
      panic!("expected player attributes")
    };
    assert_eq!(p.team_code, Some(14));
    assert_eq!(p.position, 3);
    assert!(p.photo_url.as_deref().is_some_and(|u| u.ends_with("p118748.png")));
  }

  #[test]
  fn missing_code_survives_as_none() {
    let decoded = decode(PAYLOAD, now()).unwrap();
    let villa = &decoded.teams.rows[1];
    assert_eq!(villa.natural_code, None);
    let EntityAttributes::Team(t) = &villa.attributes else {
      panic!("expected team attributes")
    };
    assert_eq!(t.logo_url, None);
  }

  #[test]
  fn payload_without_deadlines_is_rejected() {
    let payload = r#"{"events": [{"deadline_time": null}], "teams": [], "elements": []}"#;
    assert!(matches!(decode(payload, now()), Err(Error::NoDeadline)));
  }

  #[test]
  fn payload_without_elements_is_rejected() {
    let payload = r#"{"events": [{"deadline_time": "2024-08-16T17:30:00Z"}], "teams": []}"#;
    assert!(matches!(decode(payload, now()), Err(Error::MissingSection("elements"))));
  }
}
