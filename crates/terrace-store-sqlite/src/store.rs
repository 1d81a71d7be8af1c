//! [`SqliteWarehouse`]: the SQLite implementation of [`Warehouse`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use terrace_core::{
  entity::{EntityType, NaturalCode, SurrogateKey},
  history::{HistoricalRecord, KeyMapping, VolatileRecord},
  keys::{KeyAssignment, KeyPartition},
  merge::MergePlan,
  row::Snapshot,
  store::{MergeOutcome, Warehouse},
};

use crate::{
  Result,
  encode::{
    RawHistory, RawMapping, RawSnapshotRow, RawVolatile, decode_code, decode_dt,
    encode_attributes, encode_change, encode_dt, encode_season, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Terrace warehouse backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. All calls
/// run on one background thread, so writes reach SQLite one at a time.
#[derive(Clone)]
pub struct SqliteWarehouse {
  conn: tokio_rusqlite::Connection,
}

impl SqliteWarehouse {
  /// Open (or create) a warehouse at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory warehouse, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  #[cfg(test)]
  pub(crate) fn connection(&self) -> &tokio_rusqlite::Connection { &self.conn }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Transaction bodies ──────────────────────────────────────────────────────
//
// Each runs on the connection thread inside `call`. Dropping a
// `rusqlite::Transaction` without committing rolls it back, so any `?` exit
// leaves the database untouched.

fn replace_snapshot_tx(
  conn: &mut rusqlite::Connection,
  entity_type: &'static str,
  received_at: String,
  rows: Vec<(Option<String>, String, String)>,
) -> Result<()> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  tx.execute("DELETE FROM snapshot_rows WHERE entity_type = ?1", rusqlite::params![entity_type])?;
  tx.execute(
    "INSERT INTO snapshot_batches (entity_type, received_at) VALUES (?1, ?2)
     ON CONFLICT (entity_type) DO UPDATE SET received_at = excluded.received_at",
    rusqlite::params![entity_type, received_at],
  )?;
  {
    let mut insert = tx.prepare(
      "INSERT INTO snapshot_rows (entity_type, position, natural_code, value_json, ingested_at)
       VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (position, (code, value_json, ingested_at)) in rows.into_iter().enumerate() {
      insert.execute(rusqlite::params![
        entity_type,
        position as i64,
        code,
        value_json,
        ingested_at,
      ])?;
    }
  }
  tx.commit()?;
  Ok(())
}

fn resolve_keys_tx(
  conn: &mut rusqlite::Connection,
  entity_type: EntityType,
  codes: Vec<NaturalCode>,
  minted_at: String,
) -> Result<KeyAssignment> {
  let et = entity_type.discriminant();
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

  let existing: Vec<(String, i64)> = {
    let mut stmt =
      tx.prepare("SELECT natural_code, surrogate_key FROM key_mappings WHERE entity_type = ?1")?;
    stmt
      .query_map(rusqlite::params![et], |row| Ok((row.get(0)?, row.get(1)?)))?
      .collect::<rusqlite::Result<Vec<_>>>()?
  };
  let mappings = existing
    .into_iter()
    .map(|(code, key)| Ok((decode_code(&code)?, SurrogateKey(key))))
    .collect::<Result<Vec<_>>>()?;

  let mut partition = KeyPartition::from_mappings(entity_type, mappings)?;
  let assignment = partition.assign(&codes)?;

  {
    let mut insert = tx.prepare(
      "INSERT INTO key_mappings (entity_type, natural_code, surrogate_key, minted_at)
       VALUES (?1, ?2, ?3, ?4)",
    )?;
    for (code, key) in &assignment.minted {
      insert.execute(rusqlite::params![et, code.as_str(), key.0, minted_at])?;
    }
  }
  tx.commit()?;

  if !assignment.minted.is_empty() {
    tracing::debug!(
      entity_type = et,
      minted = assignment.minted.len(),
      next_key = %partition.next_key(),
      "minted surrogate keys"
    );
  }
  Ok(assignment)
}

fn apply_merge_tx(conn: &mut rusqlite::Connection, plan: MergePlan) -> Result<MergeOutcome> {
  let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
  let et = plan.entity_type().discriminant();

  let outcome = match plan {
    MergePlan::Append { records, .. } => {
      let mut insert = tx.prepare(
        "INSERT INTO history (
           entity_type, surrogate_key, natural_code, season, value_json,
           fingerprint, change_kind, recorded_at, ingested_at, run_id
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
      )?;
      for r in &records {
        insert.execute(rusqlite::params![
          et,
          r.surrogate_key.0,
          r.natural_code.as_str(),
          encode_season(r.season),
          encode_attributes(&r.attributes)?,
          r.fingerprint,
          encode_change(r.change),
          encode_dt(r.recorded_at),
          encode_dt(r.ingested_at),
          encode_uuid(r.run_id),
        ])?;
      }
      MergeOutcome { inserted: records.len(), deleted: 0 }
    }
    MergePlan::Replace { records, .. } => {
      let deleted = tx.execute(
        "DELETE FROM volatile_records WHERE entity_type = ?1",
        rusqlite::params![et],
      )?;
      let mut insert = tx.prepare(
        "INSERT INTO volatile_records (
           entity_type, surrogate_key, natural_code, season, value_json,
           fingerprint, loaded_at, ingested_at, run_id
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
      )?;
      for r in &records {
        insert.execute(rusqlite::params![
          et,
          r.surrogate_key.0,
          r.natural_code.as_str(),
          encode_season(r.season).unwrap_or_default(),
          encode_attributes(&r.attributes)?,
          r.fingerprint,
          encode_dt(r.loaded_at),
          encode_dt(r.ingested_at),
          encode_uuid(r.run_id),
        ])?;
      }
      MergeOutcome { inserted: records.len(), deleted }
    }
  };

  tx.commit()?;
  Ok(outcome)
}

// ─── Warehouse impl ──────────────────────────────────────────────────────────

impl Warehouse for SqliteWarehouse {
  type Error = crate::Error;

  // ── Snapshot store ────────────────────────────────────────────────────────

  async fn replace_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
    let entity_type = snapshot.entity_type.discriminant();
    let received_at = encode_dt(snapshot.received_at);
    let rows = snapshot
      .rows
      .iter()
      .map(|row| {
        Ok((
          row.natural_code.clone(),
          encode_attributes(&row.attributes)?,
          encode_dt(row.ingested_at),
        ))
      })
      .collect::<Result<Vec<_>>>()?;

    self
      .conn
      .call(move |conn| Ok(replace_snapshot_tx(conn, entity_type, received_at, rows)))
      .await??;
    Ok(())
  }

  async fn load_snapshot(&self, entity_type: EntityType) -> Result<Option<Snapshot>> {
    let et = entity_type.discriminant();

    let loaded: Option<(String, Vec<RawSnapshotRow>)> = self
      .conn
      .call(move |conn| {
        let received_at: Option<String> = conn
          .query_row(
            "SELECT received_at FROM snapshot_batches WHERE entity_type = ?1",
            rusqlite::params![et],
            |row| row.get(0),
          )
          .optional()?;
        let Some(received_at) = received_at else {
          return Ok(None);
        };

        let mut stmt = conn.prepare(
          "SELECT natural_code, value_json, ingested_at FROM snapshot_rows
           WHERE entity_type = ?1 ORDER BY position",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![et], |row| {
            Ok(RawSnapshotRow {
              natural_code: row.get(0)?,
              value_json:   row.get(1)?,
              ingested_at:  row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Some((received_at, rows)))
      })
      .await?;

    let Some((received_at, raws)) = loaded else {
      return Ok(None);
    };
    Ok(Some(Snapshot {
      entity_type,
      received_at: decode_dt(&received_at)?,
      rows: raws
        .into_iter()
        .map(|raw| raw.into_row(entity_type))
        .collect::<Result<_>>()?,
    }))
  }

  // ── Surrogate keys ────────────────────────────────────────────────────────

  async fn resolve_keys(
    &self,
    entity_type: EntityType,
    codes: Vec<NaturalCode>,
  ) -> Result<KeyAssignment> {
    let minted_at = encode_dt(Utc::now());
    let assignment = self
      .conn
      .call(move |conn| Ok(resolve_keys_tx(conn, entity_type, codes, minted_at)))
      .await??;
    Ok(assignment)
  }

  async fn key_mappings(&self, entity_type: EntityType) -> Result<Vec<KeyMapping>> {
    let et = entity_type.discriminant();

    let raws: Vec<RawMapping> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT entity_type, natural_code, surrogate_key, minted_at
           FROM key_mappings WHERE entity_type = ?1 ORDER BY surrogate_key",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![et], |row| {
            Ok(RawMapping {
              entity_type:   row.get(0)?,
              natural_code:  row.get(1)?,
              surrogate_key: row.get(2)?,
              minted_at:     row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMapping::into_mapping).collect()
  }

  // ── Records ───────────────────────────────────────────────────────────────

  async fn history(&self, entity_type: EntityType) -> Result<Vec<HistoricalRecord>> {
    let et = entity_type.discriminant();

    let raws: Vec<RawHistory> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM history WHERE entity_type = ?1 ORDER BY record_id",
          RawHistory::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![et], RawHistory::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawHistory::into_record).collect()
  }

  async fn volatile(&self, entity_type: EntityType) -> Result<Vec<VolatileRecord>> {
    let et = entity_type.discriminant();

    let raws: Vec<RawVolatile> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM volatile_records WHERE entity_type = ?1 ORDER BY record_id",
          RawVolatile::COLUMNS
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![et], RawVolatile::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawVolatile::into_record).collect()
  }

  async fn apply_merge(&self, plan: MergePlan) -> Result<MergeOutcome> {
    let outcome = self
      .conn
      .call(move |conn| Ok(apply_merge_tx(conn, plan)))
      .await??;
    Ok(outcome)
  }
}
