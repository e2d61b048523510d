//! 📦 Common data structures — the building blocks of couchsync
//!
//! ---
//!
//! 🎬 COLD OPEN — INT. BACK OFFICE OF A FAST FOOD CHAIN — 3:47 AM
//!
//! 🌩️ The POS terminals have gone quiet. The CouchDB cluster has not. Somewhere a
//! `_changes` feed hums, handing out sequence tokens like deli counter tickets:
//! `"1-g1AAAA..."`, `"2-g1AAAA..."`, `"3-g1AAAA..."`. Nobody knows what the part
//! after the dash means. Nobody needs to. We only care about the number in front,
//! and about never, ever losing our place in line.
//!
//! 🦆
//!
//! This module defines the humble structs that ferry changes from the couch to the
//! tables: a [`Position`] (our ticket), a [`Change`] (one mutation of one document),
//! and a [`ChangeBatch`] (one poll's worth of them).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::SyncError;

/// 🎫 An opaque, ordered token issued by the change feed.
///
/// We treat it as a string for ordering and resumption. The only thing we ever
/// peek at is the integer prefix (everything before the first `-`), which doubles
/// as the audit log row id. The empty position means "from the beginning of time".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Position(String);

impl Position {
    /// 🏗️ Wrap a raw token. No validation: the feed is the authority on what a token looks like.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// 🌅 The start-of-feed sentinel. Polling since here means "give me everything".
    pub fn start() -> Self {
        Self(String::new())
    }

    pub fn is_start(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 🔢 The integer prefix of the token, parsed up to the first `-`.
    ///
    /// `"12345-abcde"` → `12345`, `"42"` → `42`, `"abc-1"` → 💀 `InvalidPosition`.
    pub fn numeric_prefix(&self) -> Result<i64, SyncError> {
        let the_prefix = self.0.split('-').next().unwrap_or_default();
        the_prefix
            .trim()
            .parse::<i64>()
            .map_err(|_| SyncError::InvalidPosition(self.0.clone()))
    }

    /// ✂️ A short, log-friendly rendering. CouchDB 2.x tokens are ~100 chars of base64
    /// after the dash, and nobody at 3am wants to read those.
    pub fn abbreviated(&self) -> &str {
        const THE_ATTENTION_SPAN: usize = 20;
        match self.0.char_indices().nth(THE_ATTENTION_SPAN) {
            Some((byte_idx, _)) => &self.0[..byte_idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_start() {
            // -- 🌅 the empty token prints as something a human can see in a log line
            write!(f, "<start>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<&str> for Position {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Position {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// 🔄 One mutation of one document, as delivered by the change feed.
///
/// `body` is the raw JSON text of the document (`include_docs=true`), kept as text
/// until the mapper decides what it thinks of it. `None` when the feed sent no doc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub position: Position,
    pub document_id: String,
    pub body: Option<String>,
    pub deleted: bool,
}

impl Change {
    pub fn new(
        position: impl Into<Position>,
        document_id: impl Into<String>,
        body: Option<String>,
        deleted: bool,
    ) -> Self {
        Self {
            position: position.into(),
            document_id: document_id.into(),
            body,
            deleted,
        }
    }
}

/// 📦 One poll's worth of changes, in feed order, plus the feed's opinion of where
/// to continue from. We log `last_position` and `pending` but the engine only ever
/// advances its cursor through changes it actually handled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    pub changes: Vec<Change>,
    pub last_position: Position,
    pub pending: Option<u64>,
}

impl ChangeBatch {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }
}
