//! Implements the `Store` trait against a finsight proxy (see `crate::server`).
//!
//! - `GET {proxy}/api/users/{username}` returns the record, or 404.
//! - `POST {proxy}/api/update` with `{"username": .., "data": {record}}` writes it. The proxy
//!   answers 409 when the record's revision is stale.

use crate::api::{http_client, join_url, Store};
use crate::error::StaleRecord;
use crate::model::Record;
use crate::{utils, Result};
use anyhow::{bail, Context};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, trace};
use url::Url;

/// Body of `POST /api/update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct UpdateRequest {
    pub(crate) username: String,
    pub(crate) data: Record,
}

/// Success body of `POST /api/update`. Proxies that predate revisions answer without one.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct UpdateResponse {
    #[serde(default)]
    pub(crate) revision: Option<u64>,
}

/// Body of every non-2xx proxy response.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) expected: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) found: Option<u64>,
}

/// Talks to a proxy at `base`.
#[derive(Debug, Clone)]
pub struct ProxyStore {
    base: String,
    client: reqwest::Client,
}

impl ProxyStore {
    /// # Errors
    /// - Returns an error if `base` is empty or is not an http(s) URL.
    pub fn new(base: &str, timeout: Duration) -> Result<Self> {
        let base = base.trim();
        if base.is_empty() {
            bail!("The proxy URL is empty");
        }
        let parsed = Url::parse(base).with_context(|| format!("Invalid proxy URL '{base}'"))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            bail!("The proxy URL must be http or https, got '{base}'");
        }
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
        })
    }

    fn user_url(&self, username: &str) -> Result<Url> {
        let raw = format!(
            "{}/api/users/{}",
            self.base,
            utils::encode_username(username)
        );
        Url::parse(&raw).with_context(|| format!("Invalid proxy URL '{raw}'"))
    }

    fn update_url(&self) -> Result<Url> {
        join_url(&self.base, ["api", "update"])
    }
}

#[async_trait::async_trait]
impl Store for ProxyStore {
    fn name(&self) -> &'static str {
        "proxy"
    }

    async fn fetch(&self, username: &str) -> Result<Option<Record>> {
        let url = self.user_url(username)?;
        trace!("GET {url}");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to reach the proxy")?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("The proxy returned {status} when reading '{username}': {body}");
        }
        let record = response
            .json()
            .await
            .with_context(|| format!("The proxy returned an unreadable record for '{username}'"))?;
        Ok(Some(record))
    }

    async fn save(&self, username: &str, record: &Record) -> Result<Record> {
        let url = self.update_url()?;
        trace!("POST {url}");
        let body = UpdateRequest {
            username: username.to_string(),
            data: record.clone(),
        };
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .context("Failed to reach the proxy")?;
        let status = response.status();
        if status == StatusCode::CONFLICT {
            let error: ErrorResponse = response.json().await.unwrap_or_default();
            return Err(StaleRecord {
                username: username.to_string(),
                expected: error.expected.unwrap_or(record.revision()),
                found: error.found,
            }
            .into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("The proxy returned {status} when saving '{username}': {body}");
        }
        let reply: UpdateResponse = response.json().await.unwrap_or_default();
        let revision = reply.revision.unwrap_or(record.revision() + 1);
        debug!("The proxy stored revision {revision} of '{username}'");
        Ok(record.with_revision(revision))
    }
}
