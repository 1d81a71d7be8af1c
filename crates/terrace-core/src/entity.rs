//! Entity catalogue and identifier types.
//!
//! Every reconciled row belongs to exactly one [`EntityType`]. Within a type,
//! rows are identified by a source-provided [`NaturalCode`] and joined
//! downstream through an internally minted [`SurrogateKey`].

use std::{cmp::Ordering, fmt, str::FromStr};

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::Error;

// ─── EntityType ──────────────────────────────────────────────────────────────

/// The entity classes delivered by the source feed.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityType {
  Team,
  Player,
  /// Upcoming fixtures. The schedule is volatile and carries no history.
  Fixture,
  /// Final scores of finished fixtures. Corrections append new versions.
  MatchResult,
  Stat,
}

/// How accepted rows of an entity type are written to the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
  /// NEW and CHANGED rows become fresh historical records; UNCHANGED rows
  /// are dropped.
  AppendIfChanged,
  /// The whole record set for the type is deleted and reloaded.
  ReplaceWholesale,
}

impl EntityType {
  pub fn merge_policy(self) -> MergePolicy {
    match self {
      Self::Fixture => MergePolicy::ReplaceWholesale,
      Self::Team | Self::Player | Self::MatchResult | Self::Stat => {
        MergePolicy::AppendIfChanged
      }
    }
  }

  pub fn is_volatile(self) -> bool {
    self.merge_policy() == MergePolicy::ReplaceWholesale
  }

  /// Parse the lowercase discriminant stored in the database.
  pub fn from_discriminant(s: &str) -> crate::Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownEntityType(s.to_owned()))
  }

  pub fn discriminant(self) -> &'static str { self.into() }
}

// ─── NaturalCode ─────────────────────────────────────────────────────────────

/// Why a snapshot row could not be given a natural code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedReason {
  MissingCode,
  BlankCode,
}

impl fmt::Display for MalformedReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::MissingCode => f.write_str("natural code is missing"),
      Self::BlankCode => f.write_str("natural code is blank"),
    }
  }
}

/// The source system's identifier for an entity.
///
/// Ordering is numeric when both codes are all digits and lexicographic
/// otherwise; numeric codes sort before non-numeric ones. This is the order
/// in which brand-new codes are given surrogate keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NaturalCode(String);

impl NaturalCode {
  pub fn parse(raw: Option<&str>) -> Result<Self, MalformedReason> {
    let raw = raw.ok_or(MalformedReason::MissingCode)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
      return Err(MalformedReason::BlankCode);
    }
    Ok(Self(trimmed.to_owned()))
  }

  pub fn as_str(&self) -> &str { &self.0 }

  fn numeric(&self) -> Option<u128> {
    if self.0.bytes().all(|b| b.is_ascii_digit()) {
      self.0.parse().ok()
    } else {
      None
    }
  }
}

impl Ord for NaturalCode {
  fn cmp(&self, other: &Self) -> Ordering {
    match (self.numeric(), other.numeric()) {
      (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
      (Some(_), None) => Ordering::Less,
      (None, Some(_)) => Ordering::Greater,
      (None, None) => self.0.cmp(&other.0),
    }
  }
}

impl PartialOrd for NaturalCode {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl fmt::Display for NaturalCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<u64> for NaturalCode {
  fn from(code: u64) -> Self { Self(code.to_string()) }
}

impl FromStr for NaturalCode {
  type Err = MalformedReason;

  fn from_str(s: &str) -> Result<Self, Self::Err> { Self::parse(Some(s)) }
}

// ─── SurrogateKey ────────────────────────────────────────────────────────────

/// Internally minted join key. Keys start at 1 and increase by one per newly
/// seen natural code within an entity type; they are never reused.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SurrogateKey(pub i64);

impl SurrogateKey {
  pub const FIRST: Self = Self(1);

  pub fn next(self) -> Self { Self(self.0 + 1) }
}

impl fmt::Display for SurrogateKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

// ─── Season ──────────────────────────────────────────────────────────────────

/// A league season, identified by the calendar year it starts in and
/// displayed as `"2024/25"`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Season {
  pub start_year: i32,
}

impl Season {
  pub fn new(start_year: i32) -> Self { Self { start_year } }

  /// Derive the season from the earliest game-week deadline in the feed.
  pub fn from_first_deadline(first: DateTime<Utc>) -> Self {
    Self::new(first.year())
  }
}

impl fmt::Display for Season {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{:02}", self.start_year, (self.start_year + 1).rem_euclid(100))
  }
}

impl FromStr for Season {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (start, end) = s
      .split_once('/')
      .ok_or_else(|| format!("season {s:?} is not of the form YYYY/YY"))?;
    let start_year: i32 =
      start.parse().map_err(|_| format!("invalid season start in {s:?}"))?;
    let end: i32 = end.parse().map_err(|_| format!("invalid season end in {s:?}"))?;
    if (start_year + 1).rem_euclid(100) != end {
      return Err(format!("season {s:?} does not span consecutive years"));
    }
    Ok(Self::new(start_year))
  }
}

impl TryFrom<String> for Season {
  type Error = String;

  fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

impl From<Season> for String {
  fn from(season: Season) -> Self { season.to_string() }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn numeric_codes_sort_by_value() {
    let mut codes: Vec<NaturalCode> =
      ["100", "20", "abc", "3"].iter().map(|s| s.parse().unwrap()).collect();
    codes.sort();
    let sorted: Vec<_> = codes.iter().map(NaturalCode::as_str).collect();
    assert_eq!(sorted, ["3", "20", "100", "abc"]);
  }

  #[test]
  fn blank_and_missing_codes_are_rejected() {
    assert_eq!(NaturalCode::parse(None), Err(MalformedReason::MissingCode));
    assert_eq!(NaturalCode::parse(Some("  ")), Err(MalformedReason::BlankCode));
    assert_eq!(NaturalCode::parse(Some(" 42 ")).unwrap().as_str(), "42");
  }

  #[test]
  fn season_display_and_parse() {
    let season = Season::new(2024);
    assert_eq!(season.to_string(), "2024/25");
    assert_eq!("2024/25".parse::<Season>().unwrap(), season);
    assert_eq!(Season::new(1999).to_string(), "1999/00");
    assert!("2024/27".parse::<Season>().is_err());

    let first = Utc.with_ymd_and_hms(2024, 8, 16, 17, 30, 0).unwrap();
    assert_eq!(Season::from_first_deadline(first), season);
  }

  #[test]
  fn entity_discriminants() {
    assert_eq!(EntityType::Fixture.discriminant(), "fixture");
    assert_eq!(EntityType::from_discriminant("stat").unwrap(), EntityType::Stat);
    assert!(EntityType::from_discriminant("league").is_err());
    assert_eq!(EntityType::MatchResult.discriminant(), "match_result");
    assert!(!EntityType::MatchResult.is_volatile());
    assert!(EntityType::Fixture.is_volatile());
    assert!(!EntityType::Player.is_volatile());
  }
}
