//! 🚀 couchsync-cli — the front door, the bouncer, the maitre d' of couchsync.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that loads config,
//! sets up logging, and then lets the real code do the heavy lifting.
//! Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 🛋️ Replicates order documents from a CouchDB `_changes` feed into relational tables.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// 🔧 TOML config file. Missing is fine: COUCHSYNC_* environment variables fill in.
    #[arg(long, short, default_value = "couchsync.toml")]
    config: PathBuf,

    /// 🧱 Drop and recreate the order tables and the audit table before syncing.
    #[arg(long)]
    init: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 📊 Print the current cursor and the newest audit log rows, then exit.
    Status {
        /// How many audit rows to show.
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
}

/// 🚀 main() — where it all begins. The genesis. The big bang.
///
/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Parse args
/// 3. Load config (the moment of truth)
/// 4. Run the thing, or just report status
/// 5. Handle errors (cry, then exit 1)
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 Set up tracing — because println! debugging is a lifestyle choice
    // we're trying to move past, like flip phones and cargo shorts
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    info!(
        "🛋️ couchsync {} ({}/{})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    );

    let result = run_cli(cli).await;

    // 💀 Error handling: the part where we find out what went wrong
    // and print it in a way that's helpful at 3am
    if let Err(err) = result {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion of sadness, one tear-jerking layer at a time
        let mut the_vibes_are_giving_connection_issues = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("error sending request")
                || cause_str.contains("connection refused")
                || cause_str.contains("Connection refused")
                || cause_str.contains("tcp connect error")
                || cause_str.contains("dns error")
                || cause_str.contains("error communicating with database")
            {
                the_vibes_are_giving_connection_issues = true;
            }
        }

        // -- 📡 if it smells like a connection problem, it's probably a connection problem
        if the_vibes_are_giving_connection_issues {
            error!(
                "🔧 hint: looks like a service isn't reachable. \
                Double-check that CouchDB and the database are actually running and that \
                the URLs in [feed_config] and [sink_config] point at them. If you're using \
                Docker, `docker ps` will tell you who showed up for work. ☕"
            );
        }

        std::process::exit(1);
    }

    Ok(())
}

async fn run_cli(cli: Cli) -> Result<()> {
    // 🔒 A missing file isn't an error, the environment may carry everything
    let the_file_is_there = cli.config.try_exists().with_context(|| {
        format!(
            "💀 Couldn't check whether the config file exists. If it's a relative path, \
             try an absolute one. Was checking here: '{}'",
            cli.config.display()
        )
    })?;
    let the_config_file = the_file_is_there.then_some(cli.config.as_path());

    let app_config = couchsync::app_config::load_config(the_config_file)
        .context("💀 In couchsync-cli, main, we couldn't load the config. Take a look at the file and the COUCHSYNC_* variables")?;

    match cli.command {
        Some(Command::Status { limit }) => {
            let the_screen = couchsync::status(&app_config, limit).await?;
            println!("{the_screen}");
            Ok(())
        }
        // 🚀 SEND IT. This only comes back if something truly unrecoverable happened.
        None => couchsync::run(app_config, cli.init).await,
    }
}
