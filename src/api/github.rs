//! Implements the `Store` trait with the GitHub Contents API.
//!
//! - Read: `GET /repos/{owner}/{repo}/contents/{path}?ref={branch}`, base64 `content`.
//! - Write: `PUT /repos/{owner}/{repo}/contents/{path}` with the blob `sha` that `fetch` put in
//!   `Record::version`. GitHub rejects the write with 409 (or 422) when the file has changed since
//!   that fetch, including changes by clients that never bump the revision. A record without a
//!   version can only create the file.

use crate::api::{check_revision, http_client, join_url, RemoteSettings, Store, GITHUB_API};
use crate::error::StaleRecord;
use crate::model::Record;
use crate::Result;
use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use reqwest::{RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};
use url::Url;

const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";

/// Reads and writes `{data_dir}/{username}.json` in a GitHub repository.
#[derive(Debug, Clone)]
pub struct GithubStore {
    settings: RemoteSettings,
    client: reqwest::Client,
    api: String,
}

/// The parts of a Contents API file response that are used here.
#[derive(Debug, Deserialize)]
struct ContentFile {
    sha: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

/// The parts of a successful `PUT` response that are used here.
#[derive(Debug, Deserialize)]
struct PutResponse {
    content: Option<FileRef>,
}

#[derive(Debug, Deserialize)]
struct FileRef {
    sha: String,
}

#[derive(Debug, Serialize)]
struct PutContent<'a> {
    message: String,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

impl GithubStore {
    pub fn new(settings: RemoteSettings) -> Result<Self> {
        settings.validate()?;
        let client = http_client(settings.timeout)?;
        Ok(Self {
            settings,
            client,
            api: GITHUB_API.to_string(),
        })
    }

    /// Points the store at a different API root, e.g. a GitHub Enterprise server's `/api/v3`.
    pub fn with_api_root(mut self, api: impl Into<String>) -> Self {
        self.api = api.into();
        self
    }

    fn contents_url(&self, username: &str) -> Result<Url> {
        let s = &self.settings;
        let mut segments = vec![
            "repos".to_string(),
            s.owner.clone(),
            s.repo.clone(),
            "contents".to_string(),
        ];
        segments.extend(s.file_segments(username));
        join_url(&self.api, segments)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.settings.token)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Reads the file. The record carries the blob sha as its version. `None` when the file does
    /// not exist.
    async fn get_file(&self, username: &str) -> Result<Option<Record>> {
        let mut url = self.contents_url(username)?;
        url.query_pairs_mut().append_pair("ref", &self.settings.branch);
        trace!("GET {url}");

        let response = self
            .authorized(self.client.get(url))
            .send()
            .await
            .context("Failed to reach the GitHub Contents API")?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("GitHub returned {status} when reading the record for '{username}': {body}");
        }

        let file: ContentFile = response
            .json()
            .await
            .context("Failed to parse the GitHub Contents API response")?;
        let mut record = decode_content(&file)
            .with_context(|| format!("The record for '{username}' on GitHub is unreadable"))?;
        record.version = Some(file.sha);
        Ok(Some(record))
    }
}

#[async_trait::async_trait]
impl Store for GithubStore {
    fn name(&self) -> &'static str {
        "github"
    }

    async fn fetch(&self, username: &str) -> Result<Option<Record>> {
        self.get_file(username).await
    }

    async fn save(&self, username: &str, record: &Record) -> Result<Record> {
        // With a version, GitHub's sha check is the revision check: an unchanged blob holds the
        // revision that was fetched.
        let revision = match record.version() {
            Some(_) => record.revision() + 1,
            None => {
                let current = self.get_file(username).await?;
                check_revision(username, current.as_ref(), record)?
            }
        };

        let mut stored = record.with_revision(revision);
        stored.version = None;
        let json = stored.to_json().context("Unable to serialize the record")?;
        let body = PutContent {
            message: format!("Update data for {username}"),
            content: B64.encode(json.as_bytes()),
            branch: &self.settings.branch,
            sha: record.version(),
        };

        let url = self.contents_url(username)?;
        trace!("PUT {url}");
        let response = self
            .authorized(self.client.put(url))
            .json(&body)
            .send()
            .await
            .context("Failed to reach the GitHub Contents API")?;
        let status = response.status();
        if status == StatusCode::CONFLICT || status == StatusCode::UNPROCESSABLE_ENTITY {
            debug!("GitHub rejected the write for '{username}' with {status}");
            return Err(StaleRecord {
                username: username.to_string(),
                expected: record.revision(),
                found: None,
            }
            .into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("GitHub returned {status} when saving the record for '{username}': {body}");
        }
        match response.json::<PutResponse>().await {
            Ok(reply) => stored.version = reply.content.map(|file| file.sha),
            Err(e) => warn!("GitHub saved '{username}' but its reply was unreadable: {e}"),
        }
        debug!(
            "Committed revision {revision} of '{username}' to {}/{}",
            self.settings.owner, self.settings.repo
        );
        Ok(stored)
    }
}

/// Decodes the base64 `content` of a Contents API response. GitHub wraps the base64 text at 60
/// columns.
fn decode_content(file: &ContentFile) -> Result<Record> {
    if !file.encoding.is_empty() && file.encoding != "base64" {
        bail!("Unsupported content encoding '{}'", file.encoding);
    }
    let compact: String = file
        .content
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = B64
        .decode(compact)
        .context("The file content is not valid base64")?;
    serde_json::from_slice(&bytes).context("The file content is not a valid record")
}
