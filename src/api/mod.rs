//! Persistence backends for user records.
//!
//! Every backend reads and writes a whole `Record`. Writes are compare-and-swap on the record's
//! `revision`: a save is only accepted when the stored revision equals the revision the caller
//! loaded, and a successful save stores `revision + 1`. Backends that keep their own document
//! version (the GitHub blob sha) carry it in `Record::version` from `fetch` to the next `save`.

mod dispatch;
mod github;
mod local;
mod memory;
pub(crate) mod proxy;

use crate::error::StaleRecord;
use crate::model::Record;
use crate::{Config, Result};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub use dispatch::DispatchStore;
pub use github::GithubStore;
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use proxy::ProxyStore;

/// GitHub REST API root.
pub(crate) const GITHUB_API: &str = "https://api.github.com";
/// Host serving raw file contents from GitHub repositories.
pub(crate) const GITHUB_RAW: &str = "https://raw.githubusercontent.com";
/// The `event_type` of the `repository_dispatch` event that the repository's Action listens for.
pub(crate) const DISPATCH_EVENT: &str = "update-data";
/// GitHub rejects requests without a User-Agent.
pub(crate) const USER_AGENT: &str = concat!("finsight/", env!("CARGO_PKG_VERSION"));

/// Which `Store` implementation a configuration uses.
#[derive(
    Debug, Default, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// JSON files in the local user database under `$FINSIGHT_HOME/users`.
    #[default]
    Local,
    /// A JSON file per user in a GitHub repository, written with the Contents API.
    Github,
    /// A JSON file per user in a GitHub repository, written by a GitHub Action that is triggered
    /// with a `repository_dispatch` event.
    Dispatch,
    /// A finsight proxy server (see `finsight serve`).
    Proxy,
}

serde_plain::derive_display_from_serialize!(Backend);
serde_plain::derive_fromstr_from_deserialize!(Backend);

/// Reads and writes whole user records.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// A short name for log messages.
    fn name(&self) -> &'static str;

    /// Reads the record for `username`. `Ok(None)` means the user has no record.
    async fn fetch(&self, username: &str) -> Result<Option<Record>>;

    /// Writes `record` for `username` if the stored revision equals `record.revision()`. Returns
    /// the record as stored, carrying the new revision and version. Fails with a `StaleRecord`
    /// error when the stored revision differs.
    async fn save(&self, username: &str, record: &Record) -> Result<Record>;

    /// Reads the record for `username`, degrading any failure to an empty record.
    ///
    /// A missing record, a network failure and an unreadable document all produce the same empty
    /// result. Use `fetch` when the difference matters.
    async fn load(&self, username: &str) -> Record {
        match self.fetch(username).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!("No {} record for '{username}', starting empty", self.name());
                Record::default()
            }
            Err(e) => {
                warn!(
                    "Unable to load the {} record for '{username}', starting empty: {e:#}",
                    self.name()
                );
                Record::default()
            }
        }
    }
}

/// Creates the `Store` selected by `config`.
///
/// # Errors
/// - Returns an error if the backend's required settings (owner, repo, token or proxy URL) are
///   missing. No network request is made in that case.
pub async fn store(config: &Config) -> Result<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match config.backend() {
        Backend::Local => Arc::new(LocalStore::new(config.users_dir())),
        Backend::Github => Arc::new(GithubStore::new(remote_settings(config).await?)?),
        Backend::Dispatch => Arc::new(DispatchStore::new(remote_settings(config).await?)?),
        Backend::Proxy => {
            let url = config
                .proxy_url()
                .context("No proxy URL is configured. Run 'finsight settings --proxy-url <URL>'")?;
            Arc::new(ProxyStore::new(url, config.request_timeout())?)
        }
    };
    debug!("Using the {} store", store.name());
    Ok(store)
}

/// Everything needed to address a user's file in a GitHub repository.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RemoteSettings {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Directory inside the repository holding `{username}.json` files.
    pub data_dir: String,
    pub token: String,
    pub timeout: Duration,
}

impl RemoteSettings {
    /// Validates that owner, repo and token are present.
    pub fn validate(&self) -> Result<()> {
        if self.owner.trim().is_empty() || self.repo.trim().is_empty() {
            bail!("The GitHub owner and repo must be set. Run 'finsight settings --owner <OWNER> --repo <REPO>'");
        }
        if self.token.trim().is_empty() {
            bail!(
                "No GitHub access token is configured. Run 'finsight settings --token <TOKEN>' \
                or set GITHUB_TOKEN"
            );
        }
        Ok(())
    }

    /// `{data_dir}/{username}.json` as it appears inside the repository.
    pub(crate) fn file_path(&self, username: &str) -> String {
        self.file_segments(username).join("/")
    }

    /// The path segments of `file_path`, unencoded. The username is always a single segment.
    pub(crate) fn file_segments(&self, username: &str) -> Vec<String> {
        self.data_dir
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .chain(std::iter::once(format!("{username}.json")))
            .collect()
    }
}

/// Appends `segments` to the path of `base`, percent-encoding each one.
pub(crate) fn join_url<I, S>(base: &str, segments: I) -> Result<Url>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut url = Url::parse(base).with_context(|| format!("Invalid URL '{base}'"))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| anyhow::anyhow!("'{base}' cannot be used as a base URL"))?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment.as_ref());
        }
    }
    Ok(url)
}

async fn remote_settings(config: &Config) -> Result<RemoteSettings> {
    let settings = RemoteSettings {
        owner: config.owner().to_string(),
        repo: config.repo().to_string(),
        branch: config.branch().to_string(),
        data_dir: config.data_dir().to_string(),
        token: config.token().await?.unwrap_or_default(),
        timeout: config.request_timeout(),
    };
    settings.validate()?;
    Ok(settings)
}

/// Builds the HTTP client shared by the remote stores.
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .context("Unable to create the HTTP client")
}

/// The revision a save must match: the stored record's revision, or 0 when there is none.
pub(crate) fn check_revision(
    username: &str,
    stored: Option<&Record>,
    record: &Record,
) -> Result<u64> {
    let found = stored.map(Record::revision).unwrap_or(0);
    if found != record.revision() {
        return Err(StaleRecord {
            username: username.to_string(),
            expected: record.revision(),
            found: Some(found),
        }
        .into());
    }
    Ok(found + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RemoteSettings {
        RemoteSettings {
            owner: "U-ARUN07".to_string(),
            repo: "FinSight".to_string(),
            branch: "main".to_string(),
            data_dir: "data/users/".to_string(),
            token: "ghp_x".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_file_path() {
        assert_eq!(settings().file_path("arun"), "data/users/arun.json");
        assert_eq!(settings().file_path("a b"), "data/users/a b.json");
        let mut s = settings();
        s.data_dir = String::new();
        assert_eq!(s.file_path("arun"), "arun.json");
    }

    #[test]
    fn test_join_url_encodes_each_segment() {
        let s = settings();
        let url = join_url(GITHUB_RAW, s.file_segments("a b/c")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://raw.githubusercontent.com/data/users/a%20b%2Fc.json"
        );
        let url = join_url("http://127.0.0.1:8080/", ["api", "update"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/api/update");
    }

    #[test]
    fn test_validate() {
        assert!(settings().validate().is_ok());
        let mut s = settings();
        s.token = " ".to_string();
        assert!(s.validate().unwrap_err().to_string().contains("token"));
        let mut s = settings();
        s.repo = String::new();
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_check_revision() {
        let record = Record::default();
        assert_eq!(check_revision("u", None, &record).unwrap(), 1);

        let stored = record.with_revision(3);
        let e = check_revision("u", Some(&stored), &record).unwrap_err();
        let stale = e.downcast_ref::<StaleRecord>().unwrap();
        assert_eq!(stale.expected, 0);
        assert_eq!(stale.found, Some(3));

        let loaded = stored.clone();
        assert_eq!(check_revision("u", Some(&stored), &loaded).unwrap(), 4);
    }

    #[test]
    fn test_backend_names() {
        assert_eq!(Backend::Dispatch.to_string(), "dispatch");
        assert_eq!("proxy".parse::<Backend>().unwrap(), Backend::Proxy);
    }
}
