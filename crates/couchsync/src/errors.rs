//! 💀 The error taxonomy — every way a sync cycle can disappoint us, sorted by how
//! much we should care.
//!
//! anyhow is still the duct tape at the I/O edges (HTTP, SQL, config). These variants
//! exist for the places where the engine has to *branch*: skip-and-advance, halt-and-retry,
//! or log-and-shrug. You can't `match` on a context string. Believe me, someone tried. 🦆

use crate::statements::StatementError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// 🗑️ Permanent. The document is not an order we can understand, and retrying will
    /// not teach it manners. Skip, record, advance.
    #[error("malformed document '{document_id}': {reason}")]
    MalformedDocument { document_id: String, reason: String },

    /// 🔄 Per-change and retryable. The transaction rolled back, the cursor stayed put.
    #[error("failed to apply change '{document_id}' at position '{position}': {source:#}")]
    TransientApplyFailure {
        position: String,
        document_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// 🎫 The feed handed us a token with no integer in front of it. Audit bookkeeping only.
    #[error("position '{0}' has no integer prefix to use as an audit row id")]
    InvalidPosition(String),

    /// 📡 Cycle-level. The couch is not answering the phone.
    #[error("change feed unavailable: {0:#}")]
    FeedUnavailable(#[source] anyhow::Error),

    /// 🗄️ Cycle-level. The database is not answering the phone either.
    #[error("sink unavailable: {0:#}")]
    SinkUnavailable(#[source] anyhow::Error),

    /// 🏗️ The statement builder refused to build. A programming error wearing a runtime costume.
    #[error(transparent)]
    Statement(#[from] StatementError),
}

impl SyncError {
    /// ✅ Permanent errors are the ones where retrying is just a slower way of failing.
    pub fn is_permanent(&self) -> bool {
        matches!(self, SyncError::MalformedDocument { .. })
    }
}
