// ai
//! ⚙️ The Apply Engine — one cycle: poll, map, decide, build, apply, record.
//!
//! 🎬 COLD OPEN — INT. KITCHEN PASS — DINNER SERVICE
//!
//! Tickets come off the printer in order. Each one is read, cooked, plated and called.
//! A ticket nobody can read gets spiked with a note and the line moves on. A ticket the
//! kitchen *can* read but burns gets re-fired, and nothing behind it leaves the pass
//! until it does. That last rule is the whole reason the cursor can be trusted. 🦆
//!
//! ```text
//!   poll(cursor) ──▶ for each change ──▶ map ──▶ decide ──▶ plan ──▶ BEGIN; exec*; COMMIT
//!                          │              │malformed                    │failed
//!                          │              ▼                             ▼
//!                          │       advance + record failure     ROLLBACK, halt cycle,
//!                          │                                    cursor stays put
//!                          └──────────── commit ──▶ advance + record "Success"
//! ```
//!
//! 🧠 Knowledge graph:
//! - The existence check runs before the transaction opens. Single writer, so nobody
//!   sneaks an insert in between.
//! - Audit rows are written after commit and never block the cursor.
//! - `run_cycle` returns a [`CycleReport`] or a cycle-level [`SyncError`]. The supervisor
//!   decides what to do about either.

use tracing::{debug, error, info, warn};

use crate::backends::{Feed, Sink};
use crate::common::{Change, Position};
use crate::cursor_store::{CursorStore, Outcome};
use crate::decider::{OperationKind, decide, existing_children};
use crate::errors::SyncError;
use crate::statements::{ExistingChildren, plan_statements};
use crate::transforms::{MappingContext, map_change};

/// 📊 What one cycle did. Logged by the supervisor, asserted on by the tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub polled: usize,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped_malformed: usize,
    /// 🪦 Tombstones for orders the tables never had. Applied all the same, nothing to remove.
    pub unmatched_tombstones: usize,
    pub audit_failures: usize,
    /// 🛑 Why the cycle stopped before the end of the batch, if it did.
    pub halted: Option<String>,
    /// 🔖 The in-memory cursor after the cycle.
    pub cursor: Position,
    /// 📬 The feed's estimate of what is still waiting, when it offers one.
    pub pending: Option<u64>,
}

impl CycleReport {
    pub fn applied(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    fn count(&mut self, applied: &Applied) {
        match applied.kind {
            OperationKind::Insert => self.inserted += 1,
            OperationKind::Update => self.updated += 1,
            OperationKind::Delete => self.deleted += 1,
        }
        if applied.kind == OperationKind::Delete && applied.parent_rows == 0 {
            self.unmatched_tombstones += 1;
        }
    }
}

/// 🍽️ What one committed change did.
#[derive(Debug, Clone, Copy)]
struct Applied {
    kind: OperationKind,
    /// Rows the first statement (the parent's) touched.
    parent_rows: u64,
}

/// ⚙️ The single sequential worker. Owns the feed, the ledger and the in-memory cursor.
#[derive(Debug)]
pub struct ApplyEngine<F: Feed, S: Sink> {
    feed: F,
    store: CursorStore<S>,
    cursor: Position,
}

impl<F: Feed, S: Sink> ApplyEngine<F, S> {
    pub fn new(feed: F, store: CursorStore<S>, cursor: Position) -> Self {
        Self { feed, store, cursor }
    }

    /// 🌅 Startup: read the cursor from the ledger, then compact the ledger behind it.
    pub async fn resume(feed: F, store: CursorStore<S>) -> anyhow::Result<Self> {
        let the_cursor = store.current_cursor().await?;
        info!("🔖 Resuming from cursor {}", the_cursor.abbreviated());
        store.compact().await?;
        Ok(Self::new(feed, store, the_cursor))
    }

    pub fn cursor(&self) -> &Position {
        &self.cursor
    }

    pub fn store(&self) -> &CursorStore<S> {
        &self.store
    }

    /// 🔄 One poll, one pass over the batch.
    ///
    /// `Err` only for cycle-level trouble (the feed is down). Per-change trouble lands in
    /// the report: malformed documents are counted and skipped, anything else halts the
    /// cycle with `halted` set and the cursor parked on the last change that made it.
    pub async fn run_cycle(&mut self) -> Result<CycleReport, SyncError> {
        let the_batch = self
            .feed
            .poll_changes(&self.cursor)
            .await
            .map_err(SyncError::FeedUnavailable)?;

        let mut the_report = CycleReport {
            polled: the_batch.len(),
            pending: the_batch.pending,
            ..Default::default()
        };
        if the_batch.is_empty() {
            debug!("💤 No changes since {}", self.cursor.abbreviated());
            the_report.cursor = self.cursor.clone();
            return Ok(the_report);
        }
        debug!(
            "📦 Polled {} change(s) since {}, feed says last_seq {}",
            the_batch.len(),
            self.cursor.abbreviated(),
            the_batch.last_position.abbreviated()
        );

        let the_context = MappingContext::now();
        for change in &the_batch.changes {
            match self.apply_change(change, &the_context).await {
                Ok(the_applied) => {
                    the_report.count(&the_applied);
                    self.cursor = change.position.clone();
                    debug!("✅ {} '{}' at {}", the_applied.kind, change.document_id, change.position.abbreviated());
                    self.record(&mut the_report, change, &Outcome::Success).await;
                }
                Err(the_permanent) if the_permanent.is_permanent() => {
                    the_report.skipped_malformed += 1;
                    self.cursor = change.position.clone();
                    warn!("🗑️ Skipping {} at {}: {}", change.document_id, change.position.abbreviated(), the_permanent);
                    self.record(&mut the_report, change, &Outcome::Failed(the_permanent.to_string()))
                        .await;
                }
                Err(the_failure) => {
                    error!(
                        "💀 Halting the cycle at {} ('{}'): {}",
                        change.position.abbreviated(),
                        change.document_id,
                        the_failure
                    );
                    the_report.halted = Some(the_failure.to_string());
                    break;
                }
            }
        }

        the_report.cursor = self.cursor.clone();
        Ok(the_report)
    }

    /// 🍳 One change, start to finish. Returns what was done, or why it wasn't.
    async fn apply_change(
        &self,
        change: &Change,
        context: &MappingContext,
    ) -> Result<Applied, SyncError> {
        let the_mapped = map_change(change, context)?;
        let the_sink = self.store.sink();
        let transient = |source: anyhow::Error| SyncError::TransientApplyFailure {
            position: change.position.to_string(),
            document_id: change.document_id.clone(),
            source,
        };

        let the_kind = decide(the_sink, the_mapped.order_id(), the_mapped.deleted)
            .await
            .map_err(transient)?;
        // -- 🧠 read before BEGIN. nothing queries the pool while the transaction holds a connection.
        let the_existing = match the_kind {
            OperationKind::Update => existing_children(the_sink, the_mapped.order_id())
                .await
                .map_err(transient)?,
            OperationKind::Insert | OperationKind::Delete => ExistingChildren::default(),
        };
        let the_plan = plan_statements(the_kind, &the_mapped.order, &the_existing)?;
        debug!(
            "⚖️ '{}' → {} ({} statement(s))",
            the_mapped.order_id(),
            the_kind,
            the_plan.len()
        );

        let mut the_tx = the_sink.begin().await.map_err(transient)?;
        let mut the_parent_rows = None;
        for statement in &the_plan {
            match the_tx.exec(statement).await {
                Ok(the_rows) if the_parent_rows.is_none() => the_parent_rows = Some(the_rows),
                Ok(_) => {}
                Err(the_failure) => {
                    if let Err(the_rollback_failure) = the_tx.rollback().await {
                        warn!("↩️ Rollback also failed, the connection drop will finish it: {the_rollback_failure:#}");
                    }
                    return Err(transient(the_failure));
                }
            }
        }
        the_tx.commit().await.map_err(transient)?;

        let the_applied = Applied {
            kind: the_kind,
            parent_rows: the_parent_rows.unwrap_or_default(),
        };
        if the_applied.kind == OperationKind::Delete && the_applied.parent_rows == 0 {
            debug!(
                "🪦 Tombstone for '{}' matched no order, nothing was removed",
                the_mapped.order_id()
            );
        }
        Ok(the_applied)
    }

    /// 📒 Write the ledger line. Failure here is logged and counted, and that's all.
    async fn record(&self, report: &mut CycleReport, change: &Change, outcome: &Outcome) {
        if let Err(the_failure) = self
            .store
            .record_outcome(&change.position, &change.document_id, outcome)
            .await
        {
            report.audit_failures += 1;
            error!(
                "📒💀 Could not record {} for '{}': {}",
                change.position.abbreviated(),
                change.document_id,
                the_failure
            );
        }
    }
}
