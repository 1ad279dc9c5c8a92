//! Implements the `Store` trait with one JSON file per user in a local directory.

use crate::api::{check_revision, Store};
use crate::model::Record;
use crate::{utils, Result};
use anyhow::Context;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;

/// Keeps each user's record in `{dir}/{encoded username}.json`.
///
/// Saves within one process are serialized so the revision check and the write happen together.
/// Files are replaced atomically, so a concurrent reader sees either the old or the new record.
#[derive(Debug)]
pub struct LocalStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The file holding `username`'s record.
    pub fn path(&self, username: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", utils::encode_username(username)))
    }
}

#[async_trait::async_trait]
impl Store for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn fetch(&self, username: &str) -> Result<Option<Record>> {
        let path = self.path(username);
        if !path.is_file() {
            return Ok(None);
        }
        let record = utils::deserialize(&path).await?;
        Ok(Some(record))
    }

    async fn save(&self, username: &str, record: &Record) -> Result<Record> {
        let _guard = self.write_lock.lock().await;
        let current = self.fetch(username).await?;
        let revision = check_revision(username, current.as_ref(), record)?;

        utils::make_dir(&self.dir).await?;
        let stored = record.with_revision(revision);
        let json = stored.to_json().context("Unable to serialize the record")?;
        let path = self.path(username);
        utils::write_atomic(&path, json).await?;
        debug!("Saved revision {revision} of '{username}' to {}", path.display());
        Ok(stored)
    }
}
