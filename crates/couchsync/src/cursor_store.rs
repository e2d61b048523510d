// ai
//! 📒 Cursor Store — the audit log that doubles as a bookmark.
//!
//! 🎬 COLD OPEN — INT. LIBRARY — A BOOK LEFT FACE DOWN ON A TABLE
//!
//! Every change we finish gets one line in the ledger: its position, its document, and how
//! it went. The newest line is where we pick up after a restart. Everything older is history,
//! and history gets compacted once per startup because the ledger is not a museum.
//!
//! 🧠 Knowledge graph:
//! - One row per handled change, keyed by the position's integer prefix.
//! - Current cursor = the position on the highest-id row. Empty log → start of feed.
//! - Compaction deletes `id < max(id)`. The newest row is never touched.
//! - Writes go through [`Sink`], so anything relational can hold the ledger.
//!
//! 🦆

use std::fmt;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::backends::{Sink, SinkConfig, SqlArg, SqlSink};
use crate::common::Position;
use crate::errors::SyncError;
use crate::schema;

/// ✂️ The outcome column is `varchar(2048)` on MySQL. Leave room for multibyte regret.
const THE_OUTCOME_BUDGET: usize = 2000;

/// 📝 How a change turned out, as written to the `outcome` column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "Success"),
            Outcome::Failed(reason) => write!(f, "{reason}"),
        }
    }
}

/// 📜 One line of the ledger, for humans running `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorRecord {
    pub id: i64,
    pub position: Position,
    pub document_id: String,
    pub outcome: String,
    pub recorded_at: String,
}

/// 📒 The audit log, living in a table of the sink.
#[derive(Debug, Clone)]
pub struct CursorStore<S: Sink> {
    sink: S,
    table: String,
}

impl<S: Sink> CursorStore<S> {
    /// 🏗️ The table name ends up in SQL text, so it gets checked before anything else does.
    pub fn new(sink: S, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        schema::validate_identifier(&table)?;
        Ok(Self { sink, table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// 🔖 Where to resume: the position on the newest row, or the start of the feed.
    pub async fn current_cursor(&self) -> Result<Position> {
        let the_sql = format!("SELECT position FROM {} ORDER BY id DESC LIMIT 1", self.table);
        let the_newest = self
            .sink
            .query_scalar_text(&the_sql, &[])
            .await
            .with_context(|| format!("💀 Could not read the cursor from '{}'", self.table))?;
        Ok(the_newest.map(Position::from).unwrap_or_default())
    }

    /// ✍️ Append one line. The row id is the position's integer prefix.
    pub async fn record_outcome(
        &self,
        position: &Position,
        document_id: &str,
        outcome: &Outcome,
    ) -> Result<(), SyncError> {
        let the_id = position.numeric_prefix()?;
        let the_outcome = truncate_chars(outcome.to_string(), THE_OUTCOME_BUDGET);
        let the_sql = format!(
            "INSERT INTO {} (id, position, documentId, outcome) VALUES (?, ?, ?, ?)",
            self.table
        );
        self.sink
            .execute(
                &the_sql,
                &[
                    SqlArg::Int(the_id),
                    SqlArg::Text(position.as_str().to_string()),
                    SqlArg::Text(document_id.to_string()),
                    SqlArg::Text(the_outcome),
                ],
            )
            .await
            .map_err(|e| SyncError::SinkUnavailable(e.context(format!("💀 Could not record row {the_id} in '{}'", self.table))))?;
        debug!("📒 Recorded {} for '{}' at {}", outcome_label(outcome), document_id, position.abbreviated());
        Ok(())
    }

    /// 🧹 Delete every row older than the newest. Returns how many went.
    pub async fn compact(&self) -> Result<u64> {
        let Some(the_max) = self.max_id().await? else {
            debug!("🧹 Nothing to compact in '{}', the log is empty", self.table);
            return Ok(0);
        };
        let the_sql = format!("DELETE FROM {} WHERE id < ?", self.table);
        let the_swept = self
            .sink
            .execute(&the_sql, &[SqlArg::Int(the_max)])
            .await
            .with_context(|| format!("💀 Could not compact '{}'", self.table))?;
        info!("🧹 Compacted '{}': {} row(s) swept, row {} kept", self.table, the_swept, the_max);
        Ok(the_swept)
    }

    pub async fn count(&self) -> Result<i64> {
        let the_sql = format!("SELECT COUNT(*) FROM {}", self.table);
        self.sink
            .query_i64(&the_sql, &[])
            .await
            .with_context(|| format!("💀 Could not count '{}'", self.table))
    }

    /// 🔝 The newest row id, or `None` when the log is empty.
    pub async fn max_id(&self) -> Result<Option<i64>> {
        let the_sql = format!("SELECT id FROM {} ORDER BY id DESC LIMIT 1", self.table);
        self.sink
            .query_scalar_i64(&the_sql, &[])
            .await
            .with_context(|| format!("💀 Could not read the max id of '{}'", self.table))
    }
}

type RawRecord = (i64, String, Option<String>, Option<String>, Option<String>);

impl CursorStore<SqlSink> {
    /// 🔌 Build the store from config, sharing the sink's pool.
    pub fn for_sink(sink: SqlSink, config: &SinkConfig) -> Result<Self> {
        Self::new(sink, config.audit_table.clone())
    }

    /// 🔝 The newest ledger line, if there is one.
    pub async fn latest(&self) -> Result<Option<CursorRecord>> {
        Ok(self.recent(1).await?.into_iter().next())
    }

    /// 📜 Up to `limit` lines, newest first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<CursorRecord>> {
        let the_sql = format!(
            "SELECT id, position, documentId, outcome, CAST(timestamp AS CHAR) FROM {} ORDER BY id DESC LIMIT ?",
            self.table
        );
        let the_rows: Vec<RawRecord> = sqlx::query_as::<sqlx::Any, RawRecord>(&the_sql)
            .bind(i64::from(limit))
            .fetch_all(self.sink.pool())
            .await
            .with_context(|| format!("💀 Could not read recent rows of '{}'", self.table))?;
        Ok(the_rows
            .into_iter()
            .map(|(id, position, document_id, outcome, recorded_at)| CursorRecord {
                id,
                position: Position::from(position),
                document_id: document_id.unwrap_or_default(),
                outcome: outcome.unwrap_or_default(),
                recorded_at: recorded_at.unwrap_or_default(),
            })
            .collect())
    }
}

fn outcome_label(outcome: &Outcome) -> &'static str {
    match outcome {
        Outcome::Success => "✅ success",
        Outcome::Failed(_) => "💀 failure",
    }
}

fn truncate_chars(mut text: String, budget: usize) -> String {
    if let Some((byte_idx, _)) = text.char_indices().nth(budget) {
        text.truncate(byte_idx);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn the_fresh_ledger() -> Result<CursorStore<SqlSink>> {
        let the_sink = SqlSink::in_memory_sqlite().await?;
        the_sink.init_schema("order_seq").await?;
        CursorStore::new(the_sink, "order_seq")
    }

    #[tokio::test]
    async fn the_one_where_an_empty_log_means_the_beginning_of_time() -> Result<()> {
        let the_store = the_fresh_ledger().await?;
        assert!(the_store.current_cursor().await?.is_start());
        assert_eq!(the_store.max_id().await?, None);
        assert_eq!(the_store.count().await?, 0);
        assert_eq!(the_store.compact().await?, 0, "💀 compacting nothing sweeps nothing");
        assert!(the_store.latest().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_highest_id_is_the_bookmark() -> Result<()> {
        let the_store = the_fresh_ledger().await?;
        the_store.record_outcome(&"1-a".into(), "ord1", &Outcome::Success).await?;
        the_store.record_outcome(&"12-zz".into(), "ord2", &Outcome::Failed("Wrong JSON format".into())).await?;
        the_store.record_outcome(&"5-b".into(), "ord3", &Outcome::Success).await?;

        assert_eq!(the_store.current_cursor().await?, Position::from("12-zz"));
        assert_eq!(the_store.max_id().await?, Some(12));
        assert_eq!(the_store.count().await?, 3);

        let the_rows = the_store.recent(10).await?;
        assert_eq!(the_rows.iter().map(|r| r.id).collect::<Vec<_>>(), vec![12, 5, 1]);
        assert_eq!(the_rows[0].outcome, "Wrong JSON format");
        assert_eq!(the_rows[1].document_id, "ord3");
        assert_eq!(the_rows[2].outcome, "Success");
        assert_eq!(the_rows[2].document_id, "ord1");
        assert!(!the_rows[0].recorded_at.is_empty(), "💀 the timestamp should be auto-assigned");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_position_without_a_number_is_refused() -> Result<()> {
        let the_store = the_fresh_ledger().await?;
        let the_verdict = the_store.record_outcome(&"abc".into(), "ord1", &Outcome::Success).await;
        assert!(matches!(the_verdict, Err(SyncError::InvalidPosition(ref p)) if p == "abc"));
        assert_eq!(the_store.count().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_compaction_keeps_only_the_newest_row_and_can_repeat() -> Result<()> {
        let the_store = the_fresh_ledger().await?;
        for (the_pos, the_doc) in [("1-a", "o1"), ("2-b", "o2"), ("3-c", "o3")] {
            the_store.record_outcome(&the_pos.into(), the_doc, &Outcome::Success).await?;
        }
        assert_eq!(the_store.compact().await?, 2);
        assert_eq!(the_store.count().await?, 1);
        assert_eq!(the_store.current_cursor().await?, Position::from("3-c"));

        assert_eq!(the_store.compact().await?, 0, "💀 second compaction should be a no-op");
        assert_eq!(the_store.current_cursor().await?, Position::from("3-c"));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_novel_length_errors_get_abridged() -> Result<()> {
        let the_store = the_fresh_ledger().await?;
        let the_novel = "é".repeat(5000);
        the_store.record_outcome(&"9-i".into(), "o9", &Outcome::Failed(the_novel)).await?;
        let the_latest = the_store.latest().await?.expect("💀 one row was written");
        assert_eq!(the_latest.outcome.chars().count(), THE_OUTCOME_BUDGET);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_table_names_are_checked_at_the_door() -> Result<()> {
        let the_sink = SqlSink::in_memory_sqlite().await?;
        assert!(CursorStore::new(the_sink.clone(), "order_seq; DROP TABLE order_master").is_err());
        assert!(CursorStore::new(the_sink, "order_seq").is_ok());
        Ok(())
    }

    #[test]
    fn the_one_where_outcomes_render_as_the_log_expects() {
        assert_eq!(Outcome::Success.to_string(), "Success");
        assert_eq!(Outcome::Failed("boom".into()).to_string(), "boom");
    }
}
