//! Reconciliation pipeline for the Terrace warehouse.
//!
//! A [`Reconciler`] drives one snapshot per entity type through
//! `SNAPSHOT_RECEIVED → CLASSIFIED → KEYS_RESOLVED → MERGED → PROJECTED`
//! against any [`Warehouse`]. Everything from storing the snapshot through
//! the merge runs under that type's writer lock; different entity types
//! proceed in parallel and fail independently.

pub mod config;
pub mod error;
pub mod report;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::Instrument as _;

use terrace_core::{
  detect::{Classification, classify},
  entity::EntityType,
  merge,
  project::{self, ProjectedViews},
  row::Snapshot,
  run::{RunContext, RunState},
  store::{MergeOutcome, Warehouse},
};

pub use config::ReconcileConfig;
pub use error::{ReconcileError, Result};
pub use report::RunReport;

// ─── Writer locks ────────────────────────────────────────────────────────────

/// One single-writer lock per entity type.
#[derive(Default)]
struct WriterLocks {
  team:    Mutex<()>,
  player:  Mutex<()>,
  fixture: Mutex<()>,
  result:  Mutex<()>,
  stat:    Mutex<()>,
}

impl WriterLocks {
  fn get(&self, entity_type: EntityType) -> &Mutex<()> {
    match entity_type {
      EntityType::Team => &self.team,
      EntityType::Player => &self.player,
      EntityType::Fixture => &self.fixture,
      EntityType::MatchResult => &self.result,
      EntityType::Stat => &self.stat,
    }
  }
}

// ─── Reconciler ──────────────────────────────────────────────────────────────

/// Runs the reconciliation pipeline against a shared warehouse.
///
/// Cloning is cheap; clones share the store and the writer locks.
pub struct Reconciler<S: Warehouse> {
  store: Arc<S>,
  locks: Arc<WriterLocks>,
}

impl<S: Warehouse> Clone for Reconciler<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), locks: Arc::clone(&self.locks) }
  }
}

impl<S> Reconciler<S>
where
  S: Warehouse + 'static,
{
  pub fn new(store: S) -> Self { Self::from_shared(Arc::new(store)) }

  pub fn from_shared(store: Arc<S>) -> Self {
    Self { store, locks: Arc::new(WriterLocks::default()) }
  }

  pub fn store(&self) -> &S { &self.store }

  /// Reconcile one snapshot, stamping records with the current time.
  pub async fn reconcile(&self, snapshot: Snapshot) -> RunReport {
    self.reconcile_at(snapshot, Utc::now()).await
  }

  /// Reconcile one snapshot with `now` as the run's effective timestamp.
  ///
  /// Never returns an error: a failing stage leaves the report in
  /// [`RunState::Failed`] with the cause in [`RunReport::error`].
  pub async fn reconcile_at(&self, snapshot: Snapshot, now: DateTime<Utc>) -> RunReport {
    let run = RunContext::new(snapshot.entity_type, now);
    let mut report = RunReport::new(&run, snapshot.rows.len());
    let span = tracing::info_span!(
      "reconcile",
      entity_type = %run.entity_type,
      run_id = %run.run_id,
    );

    let result = async {
      // The stored snapshot must always be the one the merge consumed.
      let writer = self.locks.get(run.entity_type).lock().await;
      self
        .store
        .replace_snapshot(&snapshot)
        .await
        .map_err(|e| ReconcileError::Store(Box::new(e)))?;
      tracing::info!(rows = snapshot.rows.len(), state = %report.state, "snapshot stored");
      self.merge_stages(&run, &snapshot, &mut report).await?;
      drop(writer);

      self.project_stage(run.entity_type, &mut report).await
    }
    .instrument(span.clone())
    .await;

    finish(report, result, &span)
  }

  /// Re-run the pipeline over the snapshot already in the snapshot store.
  ///
  /// Safe after any failure: history only ever gained whole batches, and
  /// keys minted by the failed run are reused.
  pub async fn retry(&self, entity_type: EntityType) -> RunReport {
    let run = RunContext::new(entity_type, Utc::now());
    let mut report = RunReport::new(&run, 0);
    let span = tracing::info_span!("retry", entity_type = %entity_type, run_id = %run.run_id);

    let result = async {
      let writer = self.locks.get(entity_type).lock().await;
      let snapshot = self
        .store
        .load_snapshot(entity_type)
        .await
        .map_err(ReconcileError::from_history_store)?
        .ok_or_else(|| ReconcileError::Store(format!("no stored {entity_type} snapshot").into()))?;
      report.received = snapshot.rows.len();
      self.merge_stages(&run, &snapshot, &mut report).await?;
      drop(writer);

      self.project_stage(entity_type, &mut report).await
    }
    .instrument(span.clone())
    .await;

    finish(report, result, &span)
  }

  /// Reconcile several snapshots. Reports come back in input order.
  ///
  /// Each snapshot runs in its own task; a failure or panic in one never
  /// affects the others.
  pub async fn reconcile_all(&self, snapshots: Vec<Snapshot>) -> Vec<RunReport> {
    let now = Utc::now();
    let handles: Vec<_> = snapshots
      .into_iter()
      .map(|snapshot| {
        let entity_type = snapshot.entity_type;
        let this = self.clone();
        let handle = tokio::spawn(async move { this.reconcile_at(snapshot, now).await });
        (entity_type, handle)
      })
      .collect();

    let mut reports = Vec::with_capacity(handles.len());
    for (entity_type, handle) in handles {
      reports.push(match handle.await {
        Ok(report) => report,
        Err(e) => {
          tracing::error!(%entity_type, error = %e, "reconcile task aborted");
          RunReport::aborted(entity_type, e.to_string())
        }
      });
    }
    reports
  }

  /// Reconcile several snapshots one after another.
  pub async fn reconcile_sequential(&self, snapshots: Vec<Snapshot>) -> Vec<RunReport> {
    let now = Utc::now();
    let mut reports = Vec::with_capacity(snapshots.len());
    for snapshot in snapshots {
      reports.push(self.reconcile_at(snapshot, now).await);
    }
    reports
  }

  /// Derive every reporting view for `entity_type` from stored records.
  pub async fn project(&self, entity_type: EntityType) -> Result<ProjectedViews> {
    let projection = |e: S::Error| ReconcileError::Projection(Box::new(e));
    if entity_type.is_volatile() {
      let volatile = self.store.volatile(entity_type).await.map_err(projection)?;
      Ok(project::project(entity_type, &[], &volatile))
    } else {
      let history = self.store.history(entity_type).await.map_err(projection)?;
      Ok(project::project(entity_type, &history, &[]))
    }
  }

  // ── Stages ────────────────────────────────────────────────────────────────

  /// Classify, resolve keys and merge. Callers hold the writer lock.
  async fn merge_stages(
    &self,
    run: &RunContext,
    snapshot: &Snapshot,
    report: &mut RunReport,
  ) -> Result<()> {
    let entity_type = run.entity_type;

    let classification = self.classify(entity_type, snapshot).await?;
    for malformed in &classification.malformed {
      tracing::warn!(position = malformed.position, reason = %malformed.reason, "malformed row dropped");
    }
    report.record_classification(&classification);
    report.advance(RunState::Classified)?;
    tracing::info!(
      new = report.new,
      changed = report.changed,
      unchanged = report.unchanged,
      malformed = report.malformed,
      duplicates = report.duplicates_collapsed,
      state = %report.state,
      "snapshot classified"
    );

    let codes = classification.codes().cloned().collect();
    let keys = self
      .store
      .resolve_keys(entity_type, codes)
      .await
      .map_err(ReconcileError::from_key_store)?;
    keys.verify_injective(entity_type).map_err(ReconcileError::from_core)?;
    report.keys_minted = keys.minted.len();
    report.advance(RunState::KeysResolved)?;
    tracing::info!(minted = report.keys_minted, state = %report.state, "keys resolved");

    let plan = merge::plan(&classification, &keys, run).map_err(ReconcileError::from_core)?;
    let outcome = if plan.is_noop() {
      MergeOutcome::default()
    } else {
      self
        .store
        .apply_merge(plan)
        .await
        .map_err(|e| ReconcileError::MergeFailure(Box::new(e)))?
    };
    report.written = outcome.inserted;
    report.advance(RunState::Merged)?;
    tracing::info!(
      written = outcome.inserted,
      replaced = outcome.deleted,
      state = %report.state,
      "merge committed"
    );
    Ok(())
  }

  async fn project_stage(&self, entity_type: EntityType, report: &mut RunReport) -> Result<()> {
    let views = self.project(entity_type).await?;
    report.projected_rows = views.dimension.len();
    report.advance(RunState::Projected)?;
    tracing::info!(rows = report.projected_rows, state = %report.state, "projected");
    Ok(())
  }

  async fn classify(&self, entity_type: EntityType, snapshot: &Snapshot) -> Result<Classification> {
    let store = ReconcileError::from_history_store::<S::Error>;
    let classification = if entity_type.is_volatile() {
      let current = self.store.volatile(entity_type).await.map_err(store)?;
      classify(entity_type, &snapshot.rows, &current)
    } else {
      let current = self.store.history(entity_type).await.map_err(store)?;
      classify(entity_type, &snapshot.rows, &current)
    };
    classification.map_err(|e| ReconcileError::Classification(Box::new(e)))
  }
}

fn finish(mut report: RunReport, result: Result<()>, span: &tracing::Span) -> RunReport {
  if let Err(e) = result {
    let _entered = span.enter();
    tracing::error!(error = %e, from = %report.state, "run failed");
    report.fail(e.to_string());
  }
  report
}
