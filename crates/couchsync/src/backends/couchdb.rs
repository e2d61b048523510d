//! # 📡 THE COUCHDB FEED
//!
//! 🎬 COLD OPEN — INT. A COUCH — INDETERMINATE HOUR
//!
//! The couch has been collecting orders all day. It does not know what a table is.
//! It does not want to know. It only knows `_changes`: an endless receipt roll of
//! "this document changed, here's the new version, here's your ticket number".
//!
//! We ask it, politely, every few seconds: "anything new since ticket N?"
//! It answers with up to `batch_limit` changes and the doc bodies attached.
//! Then we go away and do relational things to them. 🦆
//!
//! 🧠 Knowledge graph:
//! - Request: `GET {url}/{database}/_changes?feed=normal&include_docs=true&conflicts=true&limit=N[&since=S]`
//! - `seq` is a JSON string on CouchDB 2.x+, a JSON number on 1.x. Both become a [`Position`].
//! - `doc` stays raw JSON text ([`RawValue`]) until the mapper decides what it thinks of it.
//! - Non-2xx → error carrying status + body. No retries here: the supervisor owns retrying.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use serde_json::value::RawValue;
use tracing::{debug, trace};

use crate::backends::Feed;
use crate::common::{Change, ChangeBatch, Position};

// 📡 FeedConfig — lives next to the thing it configures. Socks near feet.
#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    /// 📡 Base URL of the CouchDB server, scheme and port included.
    pub url: String,
    #[serde(default = "default_database")]
    pub database: String,
    /// 🔒 Basic auth kicks in when a non-empty username is configured.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// 📦 Changes per poll.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    /// ⚠️ Self-signed certs on the POS network are a lifestyle. Off by default anyway.
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_database() -> String {
    "orders".to_string()
}

fn default_batch_limit() -> usize {
    100
}

// -- 🔧 10s to shake hands, 30s to hand over a batch with 100 fat docs in it
fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl FeedConfig {
    /// 🏗️ A config with every default filled in. Mostly for tests and the curious.
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            database: default_database(),
            username: None,
            password: None,
            batch_limit: default_batch_limit(),
            accept_invalid_certs: false,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

// -- 📨 the wire shapes. private, because nobody outside this file should care what CouchDB looks like.
#[derive(Debug, Deserialize)]
struct ChangesResponse {
    #[serde(default)]
    results: Vec<ChangeRow>,
    #[serde(default)]
    last_seq: Option<Value>,
    #[serde(default)]
    pending: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ChangeRow {
    seq: Value,
    id: String,
    #[serde(default)]
    doc: Option<Box<RawValue>>,
    #[serde(default)]
    deleted: bool,
}

/// 🎫 `"12-g1AAAA"` stays `"12-g1AAAA"`, `12` becomes `"12"`. Anything stranger is kept as its JSON text.
fn seq_to_position(seq: &Value) -> Position {
    match seq {
        Value::String(s) => Position::new(s.as_str()),
        Value::Null => Position::start(),
        other => Position::new(other.to_string()),
    }
}

/// 📡 A `_changes` poller for one database on one CouchDB server. Clones share the HTTP client.
#[derive(Debug, Clone)]
pub struct CouchDbFeed {
    client: reqwest::Client,
    config: FeedConfig,
}

impl CouchDbFeed {
    /// 🚀 Build the HTTP client. No network traffic yet: the first poll is the first handshake.
    pub fn new(config: FeedConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .context("💀 The HTTP client refused to be born. Probably the TLS stack having a moment.")?;
        Ok(Self { client, config })
    }

    /// 🔗 The full `_changes` URL for one poll.
    fn changes_url(&self, since: &Position) -> Result<reqwest::Url> {
        let the_base = format!(
            "{}/{}/_changes",
            self.config.url.trim_end_matches('/'),
            self.config.database.trim_matches('/')
        );
        let mut the_url = reqwest::Url::parse(&the_base)
            .with_context(|| format!("💀 '{the_base}' is not a URL. The couch has no address."))?;
        {
            let mut the_query = the_url.query_pairs_mut();
            the_query
                .append_pair("feed", "normal")
                .append_pair("include_docs", "true")
                .append_pair("conflicts", "true")
                .append_pair("limit", &self.config.batch_limit.to_string());
            if !since.is_start() {
                the_query.append_pair("since", since.as_str());
            }
        }
        Ok(the_url)
    }
}

#[async_trait]
impl Feed for CouchDbFeed {
    async fn poll_changes(&mut self, since: &Position) -> Result<ChangeBatch> {
        let the_url = self.changes_url(since)?;
        debug!("📡 Polling {} since {}", self.config.database, since.abbreviated());

        let mut request = self.client.get(the_url.clone());
        if let Some(username) = self.config.username.as_deref().filter(|u| !u.is_empty()) {
            request = request.basic_auth(username, self.config.password.as_ref());
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("💀 The couch at {} didn't pick up the phone", self.config.url))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("💀 The couch started talking and then trailed off mid-sentence")?;

        if !status.is_success() {
            anyhow::bail!(
                "💀 The couch answered _changes with '{}'. It said: '{}'",
                status,
                body
            );
        }
        trace!("📨 _changes said: {body}");

        let the_response: ChangesResponse = serde_json::from_str(&body)
            .context("💀 The _changes response was not the JSON we were promised")?;

        let changes = the_response
            .results
            .into_iter()
            .map(|row| {
                Change::new(
                    seq_to_position(&row.seq),
                    row.id,
                    row.doc.map(|raw| raw.get().to_string()),
                    row.deleted,
                )
            })
            .collect::<Vec<_>>();

        let last_position = match the_response.last_seq.as_ref() {
            Some(seq) => seq_to_position(seq),
            None => changes
                .last()
                .map(|c| c.position.clone())
                .unwrap_or_else(|| since.clone()),
        };

        debug!(
            "📦 {} change(s), last_seq {}, pending {:?}",
            changes.len(),
            last_position.abbreviated(),
            the_response.pending
        );

        Ok(ChangeBatch {
            changes,
            last_position,
            pending: the_response.pending,
        })
    }
}
