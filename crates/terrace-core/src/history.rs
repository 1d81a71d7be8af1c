//! Persisted record types: key mappings, historical and volatile records.
//!
//! Historical records are append-only: once written no field is ever
//! updated and no row is ever deleted. Volatile records are the exception
//! and are replaced wholesale on every run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  detect::ChangeKind,
  entity::{EntityType, NaturalCode, Season, SurrogateKey},
  row::EntityAttributes,
};

// ─── Key mapping ─────────────────────────────────────────────────────────────

/// A persisted `(entity type, natural code) → surrogate key` assignment.
/// Created once per new natural code and held forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMapping {
  pub entity_type:   EntityType,
  pub natural_code:  NaturalCode,
  pub surrogate_key: SurrogateKey,
  pub minted_at:     DateTime<Utc>,
}

// ─── Historical records ──────────────────────────────────────────────────────

/// One accepted version of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalRecord {
  /// Store-assigned, strictly increasing insertion sequence.
  pub record_id:     i64,
  pub entity_type:   EntityType,
  pub surrogate_key: SurrogateKey,
  pub natural_code:  NaturalCode,
  pub season:        Option<Season>,
  pub attributes:    EntityAttributes,
  pub fingerprint:   String,
  /// Whether this version introduced the entity or changed it.
  pub change:        ChangeKind,
  /// Effective timestamp: the start of the run that accepted this version.
  pub recorded_at:   DateTime<Utc>,
  /// When the source row was captured by the ingestion layer.
  pub ingested_at:   DateTime<Utc>,
  pub run_id:        Uuid,
}

/// Input to [`crate::store::Warehouse::apply_merge`]; the store assigns
/// `record_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoricalRecord {
  pub surrogate_key: SurrogateKey,
  pub natural_code:  NaturalCode,
  pub season:        Option<Season>,
  pub attributes:    EntityAttributes,
  pub fingerprint:   String,
  pub change:        ChangeKind,
  pub recorded_at:   DateTime<Utc>,
  pub ingested_at:   DateTime<Utc>,
  pub run_id:        Uuid,
}

// ─── Volatile records ────────────────────────────────────────────────────────

/// The latest known state of a volatile entity. At most one row exists per
/// `(natural code, season)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolatileRecord {
  pub record_id:     i64,
  pub entity_type:   EntityType,
  pub surrogate_key: SurrogateKey,
  pub natural_code:  NaturalCode,
  pub season:        Option<Season>,
  pub attributes:    EntityAttributes,
  pub fingerprint:   String,
  pub loaded_at:     DateTime<Utc>,
  pub ingested_at:   DateTime<Utc>,
  pub run_id:        Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVolatileRecord {
  pub surrogate_key: SurrogateKey,
  pub natural_code:  NaturalCode,
  pub season:        Option<Season>,
  pub attributes:    EntityAttributes,
  pub fingerprint:   String,
  pub loaded_at:     DateTime<Utc>,
  pub ingested_at:   DateTime<Utc>,
  pub run_id:        Uuid,
}

// ─── Versioned ───────────────────────────────────────────────────────────────

/// Common view over stored rows that the change detector and projector
/// compare against.
pub trait Versioned {
  fn entity_type(&self) -> EntityType;
  fn natural_code(&self) -> &NaturalCode;
  fn surrogate_key(&self) -> SurrogateKey;
  fn attributes(&self) -> &EntityAttributes;
  fn fingerprint(&self) -> &str;
  /// When the warehouse accepted this version.
  fn effective_at(&self) -> DateTime<Utc>;
  fn ingested_at(&self) -> DateTime<Utc>;
  fn record_id(&self) -> i64;

  /// Later versions compare greater: source ingestion timestamp, then
  /// effective timestamp, then insertion order. A late-arriving row never
  /// outranks data the source captured after it.
  fn version_order(&self) -> (DateTime<Utc>, DateTime<Utc>, i64) {
    (self.ingested_at(), self.effective_at(), self.record_id())
  }
}

impl Versioned for HistoricalRecord {
  fn entity_type(&self) -> EntityType { self.entity_type }
  fn natural_code(&self) -> &NaturalCode { &self.natural_code }
  fn surrogate_key(&self) -> SurrogateKey { self.surrogate_key }
  fn attributes(&self) -> &EntityAttributes { &self.attributes }
  fn fingerprint(&self) -> &str { &self.fingerprint }
  fn effective_at(&self) -> DateTime<Utc> { self.recorded_at }
  fn ingested_at(&self) -> DateTime<Utc> { self.ingested_at }
  fn record_id(&self) -> i64 { self.record_id }
}

impl Versioned for VolatileRecord {
  fn entity_type(&self) -> EntityType { self.entity_type }
  fn natural_code(&self) -> &NaturalCode { &self.natural_code }
  fn surrogate_key(&self) -> SurrogateKey { self.surrogate_key }
  fn attributes(&self) -> &EntityAttributes { &self.attributes }
  fn fingerprint(&self) -> &str { &self.fingerprint }
  fn effective_at(&self) -> DateTime<Utc> { self.loaded_at }
  fn ingested_at(&self) -> DateTime<Utc> { self.ingested_at }
  fn record_id(&self) -> i64 { self.record_id }
}
