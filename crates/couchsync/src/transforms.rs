// ai
//! 🔄 Transforms — the Document Mapper. JSON goes in, rows come out. 🎭🚀
//!
//! 🎬 COLD OPEN — INT. CUSTOMS HALL — ARRIVALS FROM THE COUCH
//!
//! Every change that walks off the feed gets the same interview. "Do you have a body?"
//! "Is it JSON?" "Which order are you?" "Are you dead?" Documents that answer sensibly
//! leave through the green channel as a [`MappedDocument`]. Documents that don't get a
//! `MalformedDocument` stamp and a seat in the audit log. Nobody gets detained forever.
//!
//! ## Architecture 📐
//!
//! ```text
//!   Change (raw JSON text)  ──▶  DocumentMapper  ──▶  MappedDocument
//!                                      │                ├─ deleted?
//!                                MappingContext         └─ NormalizedOrder
//!                               (processing time)           ├─ OrderRow
//!                                                            ├─ LineItemRow*
//!                                                            ├─ ComboItemRow*
//!                                                            └─ DiscountRow*
//! ```
//!
//! Every mapper is a zero-sized marker type with a static method. No vtables. The apply
//! engine only ever needs one document format, so dynamic dispatch would be ceremony.
//!
//! ## Knowledge Graph 🧠
//! - Depends on: `common::Change`, `rows::*`, `errors::SyncError`
//! - Used by: `supervisors::apply_engine`
//! - Pure: no I/O, no clock reads. The wall clock arrives via [`MappingContext`].
//!
//! 🦆

use crate::common::Change;
use crate::errors::SyncError;
use crate::rows::{NormalizedOrder, OcTime};

pub mod lenient;
pub mod order_document;

pub use order_document::OrderDocument;

/// ⏰ Everything the mapper needs from the outside world. Currently: what time it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingContext {
    /// Stamped into every child row's `createTime`.
    pub processed_at: OcTime,
}

impl MappingContext {
    pub fn now() -> Self {
        Self {
            processed_at: OcTime::now(),
        }
    }
}

/// 📦 The mapper's verdict on one change.
///
/// When `deleted` is true only `order.order.order_id` is meaningful. Tombstones carry
/// no business data and nobody should pretend they do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedDocument {
    pub deleted: bool,
    pub order: NormalizedOrder,
}

impl MappedDocument {
    pub fn order_id(&self) -> &str {
        self.order.order_id()
    }
}

/// 📥 DocumentMapper — one document format, one zero-sized implementor.
///
/// # Contract 📜
/// - Input: a borrowed [`Change`], because the engine still needs its position afterwards
/// - Output: a [`MappedDocument`] or `SyncError::MalformedDocument` naming the document
/// - MUST NOT touch the network, the database, or the clock
/// - MUST give every child row the parent's order id
pub trait DocumentMapper {
    fn map_change(change: &Change, context: &MappingContext) -> Result<MappedDocument, SyncError>;
}

/// 🔄 Map a change with the one document format we actually sync.
pub fn map_change(change: &Change, context: &MappingContext) -> Result<MappedDocument, SyncError> {
    OrderDocument::map_change(change, context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_the_free_function_speaks_for_the_order_format() {
        let the_change = Change::new(
            "1-a",
            "doc-1",
            Some(r#"{"order":{"orderInfo":{"orderid":"ord1","totalamount":500}}}"#.to_string()),
            false,
        );
        let the_mapped = map_change(&the_change, &MappingContext::now()).expect("💀 should map");
        assert_eq!(the_mapped.order_id(), "ord1");
        assert_eq!(the_mapped.order.order.total_amount, 500);
        assert!(!the_mapped.deleted);
    }

    #[test]
    fn the_one_where_the_context_clock_is_set() {
        assert!(MappingContext::now().processed_at.is_set());
    }
}
