//! # Previously, on couchsync...
//!
//! 🎬 The couch was unavailable. It was always unavailable, because it was never
//! installed on the CI runner. Someone had to pretend to be it. Someone had to hold a
//! `Vec<Change>` and hand out slices of it with a straight face.
//!
//! That someone was this module.
//!
//! [`InMemoryFeed`] keeps its changes behind an `Arc<Mutex<...>>` so a test can keep
//! appending to the "feed" between cycles, like a POS terminal that never sleeps.
//! It can also be told to fail the next N polls, for when a test needs an outage on demand.
//!
//! ⚠️ This is NOT for production. If you're deploying this to prod, please also deploy a therapist. 🦆

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::backends::Feed;
use crate::common::{Change, ChangeBatch, Position};

#[derive(Debug, Default)]
struct TheFakeCouch {
    changes: Vec<Change>,
    outages_remaining: usize,
    polls: usize,
}

/// 📦 A change feed that lives entirely in RAM. Cloning shares the same feed.
#[derive(Debug, Clone)]
pub struct InMemoryFeed {
    couch: Arc<Mutex<TheFakeCouch>>,
    batch_limit: usize,
}

impl InMemoryFeed {
    pub fn new(changes: Vec<Change>, batch_limit: usize) -> Self {
        Self {
            couch: Arc::new(Mutex::new(TheFakeCouch {
                changes,
                ..Default::default()
            })),
            batch_limit: batch_limit.max(1),
        }
    }

    /// ➕ Append a change to the end of the feed, as if a terminal just saved a doc.
    pub async fn push(&self, change: Change) {
        self.couch.lock().await.changes.push(change);
    }

    /// 💥 Make the next `polls` calls to `poll_changes` fail.
    pub async fn fail_next_polls(&self, polls: usize) {
        self.couch.lock().await.outages_remaining = polls;
    }

    /// 🔢 How many times anyone has asked for changes, outages included.
    pub async fn poll_count(&self) -> usize {
        self.couch.lock().await.polls
    }
}

/// 📍 Index of the first change strictly after `since`.
///
/// Exact token match first. A token the feed never issued falls back to its integer
/// prefix, the way a real couch treats a stale `since`.
fn first_index_after(changes: &[Change], since: &Position) -> usize {
    if since.is_start() {
        return 0;
    }
    if let Some(idx) = changes.iter().position(|c| &c.position == since) {
        return idx + 1;
    }
    match since.numeric_prefix() {
        Ok(floor) => changes
            .iter()
            .take_while(|c| c.position.numeric_prefix().map_or(true, |n| n <= floor))
            .count(),
        Err(_) => 0,
    }
}

#[async_trait]
impl Feed for InMemoryFeed {
    async fn poll_changes(&mut self, since: &Position) -> Result<ChangeBatch> {
        let mut couch = self.couch.lock().await;
        couch.polls += 1;
        if couch.outages_remaining > 0 {
            couch.outages_remaining -= 1;
            anyhow::bail!("💀 The in-memory couch is pretending to be down. It's very convincing.");
        }

        let the_start = first_index_after(&couch.changes, since);
        let changes: Vec<Change> = couch
            .changes
            .iter()
            .skip(the_start)
            .take(self.batch_limit)
            .cloned()
            .collect();
        let the_remaining = couch.changes.len().saturating_sub(the_start + changes.len());
        let last_position = changes
            .last()
            .map(|c| c.position.clone())
            .unwrap_or_else(|| since.clone());

        Ok(ChangeBatch {
            changes,
            last_position,
            pending: Some(the_remaining as u64),
        })
    }
}
