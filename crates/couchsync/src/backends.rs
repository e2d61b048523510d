//! 🔌 Backends — where the real I/O happens.
//!
//! 🚰 The feed pours changes in, the sink soaks rows up.
//! And in between, we panic! (kidding, we use anyhow. and catch_unwind. belt AND suspenders.)
//!
//! 🎭 This module is the casting agency. Need changes from a real CouchDB? From a Vec in RAM
//! because the test suite refuses to install Erlang? We've got a feed for that. Need a place
//! to put the rows? One sqlx pool, two dialects, zero ORMs.
//!
//! 🦆 The duck is here because every file must have one. This is law. Do not question the duck.

use anyhow::Result;
use async_trait::async_trait;

use crate::common::{ChangeBatch, Position};
use crate::statements::Statement;

pub mod couchdb;
pub mod in_mem;
pub mod sql;

pub use couchdb::{CouchDbFeed, FeedConfig};
pub use in_mem::InMemoryFeed;
pub use sql::{SinkConfig, SqlSink};

// ===== Feed Trait and Backend Enum =====

/// 🚰 A source of ordered document changes.
///
/// # Contract
/// - `poll_changes` returns the changes strictly after `since`, in feed order, at most one
///   batch's worth. An empty batch means "nothing new, ask again later".
/// - The start position means "from the beginning of time".
/// - `&mut self` because feeds have state. And feelings. Mostly state.
#[async_trait]
pub trait Feed: std::fmt::Debug + Send {
    /// 📦 One poll. `Err` means the feed itself is unreachable or spoke gibberish.
    async fn poll_changes(&mut self, since: &Position) -> Result<ChangeBatch>;
}

/// 🎭 The many faces of a Feed.
///
/// Dispatches via `impl Feed for FeedBackend`, so the engine never needs to know
/// whether it's talking to a cluster in a datacenter or a Vec in a test.
#[derive(Debug)]
pub enum FeedBackend {
    CouchDb(CouchDbFeed),
    InMemory(InMemoryFeed),
}

#[async_trait]
impl Feed for FeedBackend {
    async fn poll_changes(&mut self, since: &Position) -> Result<ChangeBatch> {
        match self {
            FeedBackend::CouchDb(feed) => feed.poll_changes(since).await,
            FeedBackend::InMemory(feed) => feed.poll_changes(since).await,
        }
    }
}

// ===== Sink Traits =====

/// 🎯 A bound parameter. Every value that reaches the sink travels as one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlArg {
    Int(i64),
    Text(String),
    Null,
}

/// 🕳️ A relational sink: transactions for applying changes, scalar queries for everything else.
#[async_trait]
pub trait Sink: Send + Sync {
    /// 🔒 Open one transaction. Dropping it without `commit` rolls back.
    async fn begin(&self) -> Result<Box<dyn SinkTransaction>>;

    /// 🔢 First column of the first row as an integer, `None` when there is no row.
    async fn query_scalar_i64(&self, sql: &str, args: &[SqlArg]) -> Result<Option<i64>>;

    /// 🔤 First column of the first row as text, `None` when there is no row or it is NULL.
    async fn query_scalar_text(&self, sql: &str, args: &[SqlArg]) -> Result<Option<String>>;

    /// 🗂️ Every row of a two-column `(integer, text)` result, in the order the query gives.
    async fn query_id_text_rows(&self, sql: &str, args: &[SqlArg]) -> Result<Vec<(i64, Option<String>)>>;

    /// 🧨 Run one statement outside any transaction. Returns rows affected.
    async fn execute(&self, sql: &str, args: &[SqlArg]) -> Result<u64>;

    /// 🔢 Like `query_scalar_i64`, but "no row" is zero. Made for `COUNT(*)`.
    async fn query_i64(&self, sql: &str, args: &[SqlArg]) -> Result<i64> {
        Ok(self.query_scalar_i64(sql, args).await?.unwrap_or(0))
    }
}

/// 🔒 One open transaction on the sink.
#[async_trait]
pub trait SinkTransaction: Send {
    /// 🧨 Execute one built statement inside the transaction. Returns rows affected.
    async fn exec(&mut self, statement: &Statement) -> Result<u64>;
    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Change;

    #[tokio::test]
    async fn the_one_where_the_enum_forwards_to_whoever_is_inside() -> Result<()> {
        let the_inner = InMemoryFeed::new(vec![Change::new("1-a", "ord1", None, true)], 10);
        let mut the_backend = FeedBackend::InMemory(the_inner.clone());

        let the_batch = the_backend.poll_changes(&Position::start()).await?;
        assert_eq!(the_batch.len(), 1);
        assert_eq!(the_batch.changes[0].document_id, "ord1");
        assert_eq!(the_inner.poll_count().await, 1, "💀 the poll should have reached the inner feed");
        Ok(())
    }
}
