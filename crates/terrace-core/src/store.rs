//! The `Warehouse` trait.
//!
//! Implemented by storage backends (e.g. `terrace-store-sqlite`). The
//! reconciliation pipeline depends on this abstraction, not on any concrete
//! backend.

use std::future::Future;

use crate::{
  entity::{EntityType, NaturalCode},
  history::{HistoricalRecord, KeyMapping, VolatileRecord},
  keys::KeyAssignment,
  merge::MergePlan,
  row::Snapshot,
};

/// Counts reported by [`Warehouse::apply_merge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
  pub inserted: usize,
  /// Volatile rows removed before the reload; always zero for appends.
  pub deleted:  usize,
}

/// Abstraction over the persisted warehouse state.
///
/// History is append-only. The only destructive writes are snapshot
/// replacement and the wholesale reload of volatile entity types.
pub trait Warehouse: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Snapshot store ────────────────────────────────────────────────────

  /// Overwrite the stored raw snapshot for `snapshot.entity_type`.
  fn replace_snapshot<'a>(
    &'a self,
    snapshot: &'a Snapshot,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// The most recently stored raw snapshot, if any.
  fn load_snapshot(
    &self,
    entity_type: EntityType,
  ) -> impl Future<Output = Result<Option<Snapshot>, Self::Error>> + Send + '_;

  // ── Surrogate keys ────────────────────────────────────────────────────

  /// Resolve a key for every code, minting new keys in ascending
  /// natural-code order. Minted keys are committed before this returns and
  /// survive any later merge failure.
  fn resolve_keys(
    &self,
    entity_type: EntityType,
    codes: Vec<NaturalCode>,
  ) -> impl Future<Output = Result<KeyAssignment, Self::Error>> + Send + '_;

  /// Every mapping of an entity type, ordered by surrogate key.
  fn key_mappings(
    &self,
    entity_type: EntityType,
  ) -> impl Future<Output = Result<Vec<KeyMapping>, Self::Error>> + Send + '_;

  // ── Records ───────────────────────────────────────────────────────────

  /// All historical records of an entity type in insertion order.
  fn history(
    &self,
    entity_type: EntityType,
  ) -> impl Future<Output = Result<Vec<HistoricalRecord>, Self::Error>> + Send + '_;

  /// The current volatile record set of an entity type.
  fn volatile(
    &self,
    entity_type: EntityType,
  ) -> impl Future<Output = Result<Vec<VolatileRecord>, Self::Error>> + Send + '_;

  /// Apply a merge plan atomically: either every row is committed or none.
  fn apply_merge(
    &self,
    plan: MergePlan,
  ) -> impl Future<Output = Result<MergeOutcome, Self::Error>> + Send + '_;
}
