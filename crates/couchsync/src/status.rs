// ai
//! 📊 status.rs — "Where are we?" asked by an operator, answered by the ledger.
//!
//! 🚀 Reads the audit log without touching the feed: current cursor, how many ledger lines
//! exist, and the newest few of them in a table so comfy it has lumbar support.
//!
//! 🦆 The duck is read-only here too.

use anyhow::Result;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};

use crate::backends::SqlSink;
use crate::common::Position;
use crate::cursor_store::{CursorRecord, CursorStore};

/// ✂️ Outcome text can run to 2000 chars. The terminal cannot.
const THE_OUTCOME_COLUMN_WIDTH: usize = 60;

/// 📋 A snapshot of the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub audit_table: String,
    pub cursor: Position,
    pub audit_rows: i64,
    pub recent: Vec<CursorRecord>,
}

impl StatusReport {
    /// 🔍 Read everything in three queries. Nothing is written.
    pub async fn gather(store: &CursorStore<SqlSink>, limit: u32) -> Result<Self> {
        Ok(Self {
            audit_table: store.table().to_string(),
            cursor: store.current_cursor().await?,
            audit_rows: store.count().await?,
            recent: store.recent(limit).await?,
        })
    }

    /// 🍽️ Summary lines on top, the newest ledger rows underneath.
    pub fn render(&self) -> String {
        let mut the_table = Table::new();
        the_table.load_preset(UTF8_FULL_CONDENSED);
        the_table.set_content_arrangement(ContentArrangement::Dynamic);
        the_table.set_header(vec!["id", "position", "document", "outcome", "recorded at"]);
        for record in &self.recent {
            the_table.add_row(vec![
                Cell::new(record.id).set_alignment(CellAlignment::Right),
                Cell::new(record.position.abbreviated()),
                Cell::new(&record.document_id),
                Cell::new(clip(&record.outcome, THE_OUTCOME_COLUMN_WIDTH)),
                Cell::new(&record.recorded_at),
            ]);
        }

        let the_rows = if self.recent.is_empty() {
            "(the ledger is empty)".to_string()
        } else {
            the_table.to_string()
        };
        format!(
            "🔖 cursor:      {}\n📒 audit table: {} ({} row(s))\n{}",
            self.cursor, self.audit_table, self.audit_rows, the_rows
        )
    }
}

fn clip(text: &str, width: usize) -> String {
    match text.char_indices().nth(width) {
        Some((byte_idx, _)) => format!("{}…", &text[..byte_idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor_store::Outcome;

    #[tokio::test]
    async fn the_one_where_the_operator_asks_where_we_are() -> Result<()> {
        let the_sink = SqlSink::in_memory_sqlite().await?;
        the_sink.init_schema("order_seq").await?;
        let the_store = CursorStore::new(the_sink, "order_seq")?;
        the_store.record_outcome(&"1-a".into(), "ord1", &Outcome::Success).await?;
        the_store
            .record_outcome(&"2-b".into(), "junk", &Outcome::Failed("malformed document 'junk'".into()))
            .await?;

        let the_report = StatusReport::gather(&the_store, 10).await?;
        assert_eq!(the_report.cursor, Position::from("2-b"));
        assert_eq!(the_report.audit_rows, 2);
        assert_eq!(the_report.recent.len(), 2);

        let the_screen = the_report.render();
        assert!(the_screen.contains("2-b"));
        assert!(the_screen.contains("order_seq (2 row(s))"));
        assert!(the_screen.contains("ord1"));
        assert!(the_screen.contains("Success"));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_fresh_install_has_nothing_to_say() -> Result<()> {
        let the_sink = SqlSink::in_memory_sqlite().await?;
        the_sink.init_schema("order_seq").await?;
        let the_store = CursorStore::new(the_sink, "order_seq")?;
        let the_screen = StatusReport::gather(&the_store, 5).await?.render();
        assert!(the_screen.contains("<start>"));
        assert!(the_screen.contains("the ledger is empty"));
        Ok(())
    }

    #[test]
    fn the_one_where_long_outcomes_are_clipped() {
        assert_eq!(clip("abcdef", 3), "abc…");
        assert_eq!(clip("abc", 3), "abc");
    }
}
