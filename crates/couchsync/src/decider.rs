//! ⚖️ Convergence Decider — insert, update, or delete?
//!
//! One question, asked of the parent table before the change's transaction opens:
//! "have you seen this order before?" A tombstone doesn't even get to ask. 🦆
//!
//! When the answer is "yes", a follow-up: "which child rows does it already have?" Their
//! ids and `createTime`s let the update overwrite those rows in place instead of minting
//! new ones every time the same document is delivered again.
//!
//! The check is not inside the apply transaction. That is fine as long as this process
//! is the only writer to the order tables, which it is. Allegedly.

use std::fmt;

use anyhow::{Context, Result};
use tracing::{trace, warn};

use crate::backends::{Sink, SqlArg};
use crate::rows::{ChildRow, ComboItemRow, DiscountRow, LineItemRow, OcTime};
use crate::statements::{ChildSlot, ExistingChildren, ORDER_KEY};

/// 🎬 What the apply engine is about to do to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let the_word = match self {
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        };
        f.write_str(the_word)
    }
}

const THE_EXISTENCE_QUERY: &str = "SELECT COUNT(*) FROM order_master WHERE orderId = ?";

/// ⚖️ Deleted wins without a query. Otherwise a bound `COUNT(*)` picks update or insert.
pub async fn decide<S: Sink + ?Sized>(
    sink: &S,
    order_id: &str,
    deleted: bool,
) -> Result<OperationKind> {
    if deleted {
        return Ok(OperationKind::Delete);
    }

    let the_count = sink
        .query_i64(THE_EXISTENCE_QUERY, &[SqlArg::Text(order_id.to_string())])
        .await
        .with_context(|| format!("💀 Could not check whether order '{order_id}' already exists"))?;
    trace!("⚖️ order '{order_id}' appears {the_count} time(s) in order_master");

    Ok(if the_count > 0 {
        OperationKind::Update
    } else {
        OperationKind::Insert
    })
}

/// 👪 The child rows `order_id` already has in each child table, oldest id first.
pub async fn existing_children<S: Sink + ?Sized>(sink: &S, order_id: &str) -> Result<ExistingChildren> {
    Ok(ExistingChildren {
        line_items: child_slots::<S, LineItemRow>(sink, order_id).await?,
        combo_items: child_slots::<S, ComboItemRow>(sink, order_id).await?,
        discounts: child_slots::<S, DiscountRow>(sink, order_id).await?,
    })
}

async fn child_slots<S: Sink + ?Sized, T: ChildRow>(sink: &S, order_id: &str) -> Result<Vec<ChildSlot>> {
    let the_sql = format!(
        "SELECT {id}, CAST(createTime AS CHAR) FROM {table} WHERE {ORDER_KEY} = ? ORDER BY {id}",
        id = T::SURROGATE_KEY,
        table = T::TABLE,
    );
    let the_rows = sink
        .query_id_text_rows(&the_sql, &[SqlArg::Text(order_id.to_string())])
        .await
        .with_context(|| format!("💀 Could not list the {} rows of order '{order_id}'", T::TABLE))?;

    Ok(the_rows
        .into_iter()
        .map(|(id, raw_time)| {
            let create_time = match raw_time.as_deref().map(OcTime::parse) {
                None => OcTime::UNSET,
                Some(Ok(the_time)) => the_time,
                // -- someone else wrote this row. NULL is the least surprising thing to keep.
                Some(Err(e)) => {
                    warn!("🕰️ {} row {id} has a createTime we can't read ({e}), it becomes NULL", T::TABLE);
                    OcTime::UNSET
                }
            };
            ChildSlot { id, create_time }
        })
        .collect())
}
