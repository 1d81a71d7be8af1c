//! Decoders for the fantasy-league feed.
//!
//! Converts the `bootstrap-static` and `fixtures` JSON payloads into typed
//! per-entity [`Snapshot`]s. Pure synchronous; fetching the payloads is the
//! caller's concern.
//!
//! # Quick start
//!
//! ```no_run
//! use chrono::Utc;
//! use terrace_feed::{decode_bootstrap, decode_fixtures};
//!
//! let bootstrap = std::fs::read_to_string("bootstrap-static.json").unwrap();
//! let fixtures = std::fs::read_to_string("fixtures.json").unwrap();
//!
//! let now = Utc::now();
//! let base = decode_bootstrap(&bootstrap, now).unwrap();
//! let games = decode_fixtures(&fixtures, base.season, now).unwrap();
//! println!("{} teams, {} stat rows", base.teams.rows.len(), games.stats.rows.len());
//! ```

mod bootstrap;
pub mod error;
mod fixtures;

use chrono::{DateTime, Utc};
pub use error::{Error, Result};
use terrace_core::{entity::Season, row::Snapshot};

// ─── Public types ────────────────────────────────────────────────────────────

/// Team and player snapshots decoded from one `bootstrap-static` payload.
#[derive(Debug, Clone)]
pub struct BootstrapSnapshots {
  pub season:         Season,
  /// Earliest and latest gameweek deadlines in the payload.
  pub first_deadline: DateTime<Utc>,
  pub last_deadline:  DateTime<Utc>,
  pub teams:          Snapshot,
  pub players:        Snapshot,
}

/// Snapshots decoded from one `fixtures` payload.
#[derive(Debug, Clone)]
pub struct FixtureSnapshots {
  /// Fixtures not yet finished. Replaced wholesale on every run.
  pub fixtures: Snapshot,
  /// Final scores of finished fixtures.
  pub results:  Snapshot,
  /// Per-player statistics exploded from finished fixtures.
  pub stats:    Snapshot,
}

/// Statistic identifiers extracted from each fixture's `stats` block.
pub const STAT_IDENTIFIERS: [&str; 10] = [
  "goals_scored",
  "own_goals",
  "yellow_cards",
  "red_cards",
  "assists",
  "penalties_saved",
  "penalties_missed",
  "saves",
  "bonus",
  "bps",
];

const PHOTO_BASE: &str = "https://resources.premierleague.com/premierleague/photos/players/250x250/p";
const BADGE_BASE: &str = "https://resources.premierleague.com/premierleague/badges/t";

// ─── Public API ──────────────────────────────────────────────────────────────

/// Decode the `teams` and `elements` sections of a `bootstrap-static`
/// payload. The season is derived from the earliest event deadline.
///
/// Rows whose source `code` is missing are kept with no natural code so the
/// change detector can count them as malformed.
pub fn decode_bootstrap(input: &str, ingested_at: DateTime<Utc>) -> Result<BootstrapSnapshots> {
  bootstrap::decode(input, ingested_at)
}

/// Decode a `fixtures` payload for `season`.
pub fn decode_fixtures(
  input: &str,
  season: Season,
  ingested_at: DateTime<Utc>,
) -> Result<FixtureSnapshots> {
  fixtures::decode(input, season, ingested_at)
}

/// Headshot URL for a player code.
pub fn player_photo_url(code: &str) -> String { format!("{PHOTO_BASE}{code}.png") }

/// Badge URL for a team code.
pub fn team_logo_url(code: &str) -> String { format!("{BADGE_BASE}{code}.png") }

/// Source codes arrive as JSON numbers, occasionally as strings.
pub(crate) fn code_string(value: Option<&serde_json::Value>) -> Option<String> {
  match value? {
    serde_json::Value::Number(n) => Some(n.to_string()),
    serde_json::Value::String(s) => Some(s.clone()),
    _ => None,
  }
}

pub(crate) fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(value)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|_| Error::InvalidTimestamp { field, value: value.to_owned() })
}
