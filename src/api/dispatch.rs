//! Implements the `Store` trait for repositories whose writes are committed by a GitHub Action.
//!
//! Reads go straight to `raw.githubusercontent.com`. Writes send a `repository_dispatch` event
//! carrying the whole record as base64 JSON; the Action commits it some time later. Because the
//! commit is asynchronous, the revision check can only compare against what is visible at the time
//! of the write, and a read that follows a write may still return the older file.

use crate::api::{
    check_revision, http_client, join_url, RemoteSettings, Store, DISPATCH_EVENT, GITHUB_API,
    GITHUB_RAW,
};
use crate::model::Record;
use crate::Result;
use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, trace};
use url::Url;

/// Reads raw files and writes through `repository_dispatch`.
#[derive(Debug, Clone)]
pub struct DispatchStore {
    settings: RemoteSettings,
    client: reqwest::Client,
    api: String,
    raw: String,
}

#[derive(Debug, Serialize)]
struct DispatchEvent<'a> {
    event_type: &'a str,
    client_payload: ClientPayload<'a>,
}

/// The payload the Action reads: `data` is base64 of the pretty-printed record.
#[derive(Debug, Serialize)]
struct ClientPayload<'a> {
    username: &'a str,
    data: String,
}

impl DispatchStore {
    pub fn new(settings: RemoteSettings) -> Result<Self> {
        settings.validate()?;
        let client = http_client(settings.timeout)?;
        Ok(Self {
            settings,
            client,
            api: GITHUB_API.to_string(),
            raw: GITHUB_RAW.to_string(),
        })
    }

    /// Points the store at a different API root and raw-content host.
    pub fn with_hosts(mut self, api: impl Into<String>, raw: impl Into<String>) -> Self {
        self.api = api.into();
        self.raw = raw.into();
        self
    }

    /// `https://raw.githubusercontent.com/{owner}/{repo}/{branch}/{data_dir}/{username}.json`
    /// with a `ts` query parameter that defeats intermediate caches.
    fn raw_url(&self, username: &str, ts: i64) -> Result<Url> {
        let s = &self.settings;
        let mut segments = vec![s.owner.clone(), s.repo.clone(), s.branch.clone()];
        segments.extend(s.file_segments(username));
        let mut url = join_url(&self.raw, segments)?;
        url.query_pairs_mut().append_pair("ts", &ts.to_string());
        Ok(url)
    }

    fn dispatch_url(&self) -> Result<Url> {
        let s = &self.settings;
        join_url(
            &self.api,
            ["repos", s.owner.as_str(), s.repo.as_str(), "dispatches"],
        )
    }
}

#[async_trait::async_trait]
impl Store for DispatchStore {
    fn name(&self) -> &'static str {
        "dispatch"
    }

    async fn fetch(&self, username: &str) -> Result<Option<Record>> {
        let url = self.raw_url(username, chrono::Utc::now().timestamp_millis())?;
        trace!("GET {url}");
        let response = self
            .client
            .get(url)
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .context("Failed to reach raw.githubusercontent.com")?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            bail!("GitHub returned {status} when reading the record for '{username}'");
        }
        let record = response
            .json()
            .await
            .with_context(|| format!("The record for '{username}' on GitHub is unreadable"))?;
        Ok(Some(record))
    }

    async fn save(&self, username: &str, record: &Record) -> Result<Record> {
        let current = self.fetch(username).await?;
        let revision = check_revision(username, current.as_ref(), record)?;
        let stored = record.with_revision(revision);
        let event = dispatch_event(username, &stored)?;

        let url = self.dispatch_url()?;
        trace!("POST {url}");
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.settings.token)
            .header(ACCEPT, "application/vnd.github+json")
            .json(&event)
            .send()
            .await
            .context("Failed to send the repository_dispatch event")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "GitHub returned {status} for the repository_dispatch event. Check that the token \
                has the repo and workflow scopes, that owner/repo are correct and that Actions \
                are enabled: {body}"
            );
        }
        debug!("Dispatched revision {revision} of '{username}', the Action will commit it shortly");
        Ok(stored)
    }
}

fn dispatch_event<'a>(username: &'a str, record: &Record) -> Result<DispatchEvent<'a>> {
    let json = record
        .to_json()
        .context("Unable to serialize the record")?;
    Ok(DispatchEvent {
        event_type: DISPATCH_EVENT,
        client_payload: ClientPayload {
            username,
            data: B64.encode(json.as_bytes()),
        },
    })
}
