//! 🎬 *[camera pans across a dimly lit back office]*
//! 🎬 *[a single terminal blinks: `polling since 48213-g1AAAA...`]*
//! 🎬 "In a world where the couch never stops changing..."
//! 🎬 "One supervisor refused to go home."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor module — part night-shift manager, part smoke detector.
//! It runs one engine cycle, catches whatever that cycle throws (errors *and* panics),
//! writes it down, sleeps the fixed interval, and does it again. Forever. It does not
//! exit on operational failure. It has no off switch beyond the process being killed.
//!
//! Startup gets the same treatment: if the sink is down at boot, we wait and retry
//! rather than exiting and letting some init system guess what went wrong.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::backends::{Feed, Sink};
use crate::errors::SyncError;

pub mod apply_engine;

pub use apply_engine::{ApplyEngine, CycleReport};

/// ⚖️ How one supervised cycle ended.
#[derive(Debug)]
pub enum CycleVerdict {
    Completed(CycleReport),
    Failed(SyncError),
    /// 💥 The cycle panicked. The string is whatever the panic payload could be read as.
    Panicked(String),
}

/// 📦 The Supervisor: one engine, one interval, zero exits.
#[derive(Debug)]
pub struct Supervisor<F: Feed, S: Sink> {
    engine: ApplyEngine<F, S>,
    poll_interval: Duration,
}

impl<F: Feed, S: Sink> Supervisor<F, S> {
    pub fn new(engine: ApplyEngine<F, S>, poll_interval: Duration) -> Self {
        Self {
            engine,
            poll_interval,
        }
    }

    pub fn engine(&self) -> &ApplyEngine<F, S> {
        &self.engine
    }

    /// 🔄 Run exactly one cycle inside the blast shield.
    pub async fn tick(&mut self) -> CycleVerdict {
        let the_outcome = AssertUnwindSafe(self.engine.run_cycle()).catch_unwind().await;
        match the_outcome {
            Ok(Ok(the_report)) => {
                log_report(&the_report);
                CycleVerdict::Completed(the_report)
            }
            Ok(Err(the_failure)) => {
                error!("💀 Cycle failed, retrying in {:?}: {}", self.poll_interval, the_failure);
                CycleVerdict::Failed(the_failure)
            }
            Err(the_panic) => {
                let the_message = panic_message(&*the_panic);
                error!("💥 Cycle panicked, retrying in {:?}: {}", self.poll_interval, the_message);
                CycleVerdict::Panicked(the_message)
            }
        }
    }

    /// ♾️ tick, sleep, tick, sleep. Only returns if the runtime is torn down around it.
    pub async fn run_forever(mut self) -> anyhow::Result<()> {
        info!(
            "🚀 Supervisor on duty from {}, polling every {:?}",
            self.engine.cursor().abbreviated(),
            self.poll_interval
        );
        loop {
            self.tick().await;
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn log_report(report: &CycleReport) {
    if report.polled == 0 {
        debug!("💤 Nothing new. Cursor holds at {}", report.cursor.abbreviated());
        return;
    }
    info!(
        "📊 Cycle: {} polled, {} inserted, {} updated, {} deleted ({} unmatched), {} skipped, {} audit failure(s), cursor {}, pending {}",
        report.polled,
        report.inserted,
        report.updated,
        report.deleted,
        report.unmatched_tombstones,
        report.skipped_malformed,
        report.audit_failures,
        report.cursor.abbreviated(),
        report.pending.map_or_else(|| "?".to_string(), |n| n.to_string())
    );
    if let Some(the_reason) = &report.halted {
        warn!("🛑 Cycle halted early, the rest of the batch waits for next time: {the_reason}");
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(the_str) = payload.downcast_ref::<&str>() {
        (*the_str).to_string()
    } else if let Some(the_string) = payload.downcast_ref::<String>() {
        the_string.clone()
    } else {
        "a panic with a payload nobody can read".to_string()
    }
}

/// ⏳ Keep trying `attempt` every `poll_interval` until it succeeds.
///
/// Used for startup steps (connect, bootstrap, cursor read, compaction) so that a sink
/// that boots slower than we do doesn't take the process down with it.
pub async fn until_ready<T, A, Fut>(poll_interval: Duration, what: &str, mut attempt: A) -> T
where
    A: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut the_attempts: u64 = 0;
    loop {
        the_attempts += 1;
        match attempt().await {
            Ok(the_value) => {
                if the_attempts > 1 {
                    info!("✅ {what}: ready after {the_attempts} attempt(s)");
                }
                return the_value;
            }
            Err(the_failure) => {
                error!("💀 {what} failed (attempt {the_attempts}), retrying in {poll_interval:?}: {the_failure:#}");
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{InMemoryFeed, SqlSink};
    use crate::common::{Change, ChangeBatch, Position};
    use crate::cursor_store::CursorStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 💥 A feed with exactly one trick.
    #[derive(Debug)]
    struct TheCouchThatPanics;

    #[async_trait]
    impl Feed for TheCouchThatPanics {
        async fn poll_changes(&mut self, _since: &Position) -> Result<ChangeBatch> {
            panic!("the couch caught fire");
        }
    }

    async fn the_ledger() -> Result<CursorStore<SqlSink>> {
        let the_sink = SqlSink::in_memory_sqlite().await?;
        the_sink.init_schema("order_seq").await?;
        CursorStore::new(the_sink, "order_seq")
    }

    #[tokio::test]
    async fn the_one_where_a_panic_is_caught_and_the_next_tick_still_happens() -> Result<()> {
        let the_engine = ApplyEngine::new(TheCouchThatPanics, the_ledger().await?, Position::start());
        let mut the_supervisor = Supervisor::new(the_engine, Duration::from_millis(1));

        for _ in 0..2 {
            match the_supervisor.tick().await {
                CycleVerdict::Panicked(the_message) => assert!(the_message.contains("caught fire")),
                other => panic!("💀 expected a contained panic, got {other:?}"),
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_outage_is_survived_and_work_resumes() -> Result<()> {
        let the_feed = InMemoryFeed::new(
            vec![Change::new(
                "1-a",
                "ord1",
                Some(r#"{"order":{"orderInfo":{"orderid":"ord1"}}}"#.to_string()),
                false,
            )],
            10,
        );
        the_feed.fail_next_polls(2).await;
        let the_engine = ApplyEngine::resume(the_feed.clone(), the_ledger().await?).await?;
        let mut the_supervisor = Supervisor::new(the_engine, Duration::from_millis(1));

        assert!(matches!(the_supervisor.tick().await, CycleVerdict::Failed(SyncError::FeedUnavailable(_))));
        assert!(matches!(the_supervisor.tick().await, CycleVerdict::Failed(SyncError::FeedUnavailable(_))));
        match the_supervisor.tick().await {
            CycleVerdict::Completed(the_report) => assert_eq!(the_report.inserted, 1),
            other => panic!("💀 expected the third tick to work, got {other:?}"),
        }
        assert_eq!(the_supervisor.engine().cursor(), &Position::from("1-a"));
        assert_eq!(the_feed.poll_count().await, 3);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_startup_waits_for_the_database_to_wake_up() {
        let the_attempts = Arc::new(AtomicUsize::new(0));
        let the_counter = Arc::clone(&the_attempts);
        let the_answer = until_ready(Duration::from_millis(1), "wake the database", move || {
            let the_counter = Arc::clone(&the_counter);
            async move {
                let n = the_counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    anyhow::bail!("💤 still asleep ({n})");
                }
                Ok(n)
            }
        })
        .await;
        assert_eq!(the_answer, 3);
        assert_eq!(the_attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn the_one_where_panic_payloads_are_read_aloud() {
        assert_eq!(panic_message(&"static words"), "static words");
        assert_eq!(panic_message(&String::from("owned words")), "owned words");
        assert_eq!(panic_message(&42_u8), "a panic with a payload nobody can read");
    }
}
