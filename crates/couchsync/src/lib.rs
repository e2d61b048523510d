// This is pretty much across the whole world of couchsync
// anyhowwwww.... it's useful!
use anyhow::{Context, Result};

pub mod app_config;
pub mod backends;
pub mod common;
pub mod cursor_store;
pub mod decider;
pub mod errors;
pub mod rows;
pub mod schema;
pub mod statements;
pub mod status;
pub mod supervisors;
pub mod transforms;

use crate::app_config::AppConfig;
use crate::backends::{CouchDbFeed, FeedBackend, SqlSink};
use crate::cursor_store::CursorStore;
use crate::status::StatusReport;
use crate::supervisors::{ApplyEngine, Supervisor, until_ready};

/// 🚀 Boot and sync forever.
///
/// Config mistakes (bad URL scheme, bad audit table name) fail right away. Everything
/// operational (sink down, couch down) is retried on the poll interval instead.
pub async fn run(app_config: AppConfig, init_schema: bool) -> Result<()> {
    let poll_interval = app_config.runtime.poll_interval();
    let sink_config = &app_config.sink_config;
    sink_config.dialect()?;
    schema::validate_identifier(&sink_config.audit_table)?;

    let feed = CouchDbFeed::new(app_config.feed_config.clone())
        .context("💀 Could not build the CouchDB client from [feed_config]")?;

    let sink = until_ready(poll_interval, "🗄️ Connecting to the sink", move || {
        SqlSink::connect(sink_config)
    })
    .await;

    if init_schema {
        let the_sink = &sink;
        until_ready(poll_interval, "🧱 Bootstrapping the schema", move || {
            the_sink.init_schema(&sink_config.audit_table)
        })
        .await;
    }

    let store = CursorStore::for_sink(sink, sink_config)?;
    let engine = until_ready(poll_interval, "🔖 Resuming from the audit log", || {
        ApplyEngine::resume(FeedBackend::CouchDb(feed.clone()), store.clone())
    })
    .await;
    Supervisor::new(engine, poll_interval).run_forever().await
}

/// 📊 Connect to the sink once and describe the ledger. Never touches the couch.
pub async fn status(app_config: &AppConfig, limit: u32) -> Result<String> {
    let sink = SqlSink::connect(&app_config.sink_config).await?;
    let store = CursorStore::for_sink(sink, &app_config.sink_config)?;
    Ok(StatusReport::gather(&store, limit).await?.render())
}
