//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, seasons are `"2024/25"`, attribute
//! payloads are compact JSON without the type tag, UUIDs are hyphenated
//! lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use terrace_core::{
  detect::ChangeKind,
  entity::{EntityType, NaturalCode, Season, SurrogateKey},
  history::{HistoricalRecord, KeyMapping, VolatileRecord},
  row::{EntityAttributes, SnapshotRow},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

/// Fixed-width, so lexical order in SQL matches chronological order.
pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_season(season: Option<Season>) -> Option<String> {
  season.map(|s| s.to_string())
}

pub fn decode_season(s: Option<&str>) -> Result<Option<Season>> {
  match s {
    None | Some("") => Ok(None),
    Some(raw) => raw
      .parse()
      .map(Some)
      .map_err(|_| Error::Corrupt { column: "season", value: raw.to_owned() }),
  }
}

pub fn encode_change(kind: ChangeKind) -> &'static str {
  match kind {
    ChangeKind::New => "new",
    ChangeKind::Changed => "changed",
    ChangeKind::Unchanged => "unchanged",
  }
}

pub fn decode_change(s: &str) -> Result<ChangeKind> {
  match s {
    "new" => Ok(ChangeKind::New),
    "changed" => Ok(ChangeKind::Changed),
    "unchanged" => Ok(ChangeKind::Unchanged),
    other => Err(Error::Corrupt { column: "change_kind", value: other.to_owned() }),
  }
}

pub fn decode_code(s: &str) -> Result<NaturalCode> {
  s.parse()
    .map_err(|_| Error::Corrupt { column: "natural_code", value: s.to_owned() })
}

pub fn encode_attributes(attrs: &EntityAttributes) -> Result<String> {
  Ok(attrs.to_json()?.to_string())
}

/// A stored payload that no longer fits its entity type is a
/// classification inconsistency, not a storage fault.
pub fn decode_attributes(entity_type: EntityType, s: &str) -> Result<EntityAttributes> {
  let data: serde_json::Value = serde_json::from_str(s)?;
  EntityAttributes::from_parts(entity_type, data).map_err(|e| {
    Error::Core(terrace_core::Error::ClassificationInconsistency {
      entity_type,
      detail: format!("stored payload does not decode: {e}"),
    })
  })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from a `history` row.
pub struct RawHistory {
  pub record_id:     i64,
  pub entity_type:   String,
  pub surrogate_key: i64,
  pub natural_code:  String,
  pub season:        Option<String>,
  pub value_json:    String,
  pub fingerprint:   String,
  pub change_kind:   String,
  pub recorded_at:   String,
  pub ingested_at:   String,
  pub run_id:        String,
}

impl RawHistory {
  pub const COLUMNS: &'static str = "record_id, entity_type, surrogate_key, natural_code, \
     season, value_json, fingerprint, change_kind, recorded_at, ingested_at, run_id";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      record_id:     row.get(0)?,
      entity_type:   row.get(1)?,
      surrogate_key: row.get(2)?,
      natural_code:  row.get(3)?,
      season:        row.get(4)?,
      value_json:    row.get(5)?,
      fingerprint:   row.get(6)?,
      change_kind:   row.get(7)?,
      recorded_at:   row.get(8)?,
      ingested_at:   row.get(9)?,
      run_id:        row.get(10)?,
    })
  }

  pub fn into_record(self) -> Result<HistoricalRecord> {
    let entity_type = EntityType::from_discriminant(&self.entity_type)?;
    Ok(HistoricalRecord {
      record_id: self.record_id,
      entity_type,
      surrogate_key: SurrogateKey(self.surrogate_key),
      natural_code: decode_code(&self.natural_code)?,
      season: decode_season(self.season.as_deref())?,
      attributes: decode_attributes(entity_type, &self.value_json)?,
      fingerprint: self.fingerprint,
      change: decode_change(&self.change_kind)?,
      recorded_at: decode_dt(&self.recorded_at)?,
      ingested_at: decode_dt(&self.ingested_at)?,
      run_id: decode_uuid(&self.run_id)?,
    })
  }
}

/// Raw strings read directly from a `volatile_records` row.
pub struct RawVolatile {
  pub record_id:     i64,
  pub entity_type:   String,
  pub surrogate_key: i64,
  pub natural_code:  String,
  pub season:        String,
  pub value_json:    String,
  pub fingerprint:   String,
  pub loaded_at:     String,
  pub ingested_at:   String,
  pub run_id:        String,
}

impl RawVolatile {
  pub const COLUMNS: &'static str = "record_id, entity_type, surrogate_key, natural_code, \
     season, value_json, fingerprint, loaded_at, ingested_at, run_id";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      record_id:     row.get(0)?,
      entity_type:   row.get(1)?,
      surrogate_key: row.get(2)?,
      natural_code:  row.get(3)?,
      season:        row.get(4)?,
      value_json:    row.get(5)?,
      fingerprint:   row.get(6)?,
      loaded_at:     row.get(7)?,
      ingested_at:   row.get(8)?,
      run_id:        row.get(9)?,
    })
  }

  pub fn into_record(self) -> Result<VolatileRecord> {
    let entity_type = EntityType::from_discriminant(&self.entity_type)?;
    Ok(VolatileRecord {
      record_id: self.record_id,
      entity_type,
      surrogate_key: SurrogateKey(self.surrogate_key),
      natural_code: decode_code(&self.natural_code)?,
      season: decode_season(Some(&self.season))?,
      attributes: decode_attributes(entity_type, &self.value_json)?,
      fingerprint: self.fingerprint,
      loaded_at: decode_dt(&self.loaded_at)?,
      ingested_at: decode_dt(&self.ingested_at)?,
      run_id: decode_uuid(&self.run_id)?,
    })
  }
}

/// Raw strings read directly from a `key_mappings` row.
pub struct RawMapping {
  pub entity_type:   String,
  pub natural_code:  String,
  pub surrogate_key: i64,
  pub minted_at:     String,
}

impl RawMapping {
  pub fn into_mapping(self) -> Result<KeyMapping> {
    Ok(KeyMapping {
      entity_type:   EntityType::from_discriminant(&self.entity_type)?,
      natural_code:  decode_code(&self.natural_code)?,
      surrogate_key: SurrogateKey(self.surrogate_key),
      minted_at:     decode_dt(&self.minted_at)?,
    })
  }
}

/// Raw strings read directly from a `snapshot_rows` row.
pub struct RawSnapshotRow {
  pub natural_code: Option<String>,
  pub value_json:   String,
  pub ingested_at:  String,
}

impl RawSnapshotRow {
  pub fn into_row(self, entity_type: EntityType) -> Result<SnapshotRow> {
    Ok(SnapshotRow {
      natural_code: self.natural_code,
      attributes:   decode_attributes(entity_type, &self.value_json)?,
      ingested_at:  decode_dt(&self.ingested_at)?,
    })
  }
}
