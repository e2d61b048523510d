//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment: `COUCHSYNC_*` environment variables first, an optional TOML file
//! on top. Nested keys use a double underscore, so `COUCHSYNC_FEED_CONFIG__PASSWORD` lands
//! in `[feed_config] password`. Credentials never have to live in the file.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::{FeedConfig, SinkConfig};

/// 📦 The AppConfig: built once at startup, handed to the feed, the sink and the supervisor.
/// Nothing downstream reads the environment on its own.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 📡 Where the changes come from.
    pub feed_config: FeedConfig,
    /// 🗄️ Where the rows go, and where the ledger lives.
    pub sink_config: SinkConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// ⏱️ Knobs for the supervisor loop.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// 💤 Seconds between cycles, and between startup retries.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    5
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl RuntimeConfig {
    /// Zero would spin the CPU against an idle couch. One second is the floor.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

/// 🚀 Load the config — from a file, from env vars, or from the sheer power of hoping.
///
/// 📐 DESIGN NOTE:
///   - `config_file_name` is None  → env vars only.
///   - `config_file_name` is Some  → env vars + TOML file, merged. TOML wins on conflicts.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("COUCHSYNC_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (COUCHSYNC_*). \
             Both [feed_config] url and [sink_config] url are required.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (COUCHSYNC_*). \
                 No file was provided, so COUCHSYNC_FEED_CONFIG__URL and COUCHSYNC_SINK_CONFIG__URL have to be set."
            .to_string(),
    };

    config.extract().context(context_msg)
}
