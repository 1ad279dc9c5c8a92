//! Local snapshots of records, written before every save.
//!
//! A failed save leaves the record it attempted to write in the newest snapshot, so nothing typed
//! in is lost when the remote is unreachable.

use crate::model::Record;
use crate::{utils, Config, Result};
use anyhow::Context;
use chrono::NaiveDate;
use std::path::PathBuf;

/// Prefix for record snapshots. The full prefix is `record-{encoded username}`.
pub const RECORD: &str = "record";

/// Manages backup file creation and rotation.
///
/// The `Backup` struct is immutable and owns copies of the paths and settings it needs.
/// Create a new instance via `Config::backup()` or `Backup::new()`.
#[derive(Debug, Clone)]
pub struct Backup {
    backups_dir: PathBuf,
    backup_copies: u32,
}

impl Backup {
    /// Creates a new `Backup` instance from a `Config`.
    pub fn new(config: &Config) -> Self {
        Self {
            backups_dir: config.backups().to_path_buf(),
            backup_copies: config.backup_copies(),
        }
    }

    /// Creates a `Backup` that keeps `backup_copies` snapshots per user in `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>, backup_copies: u32) -> Self {
        Self {
            backups_dir: dir.into(),
            backup_copies,
        }
    }

    /// Saves `record` as a pretty-printed JSON backup file.
    ///
    /// The filename format is `record-{user}.YYYY-MM-DD-NNN.json` where NNN is a sequence number.
    /// Automatically rotates old backups, keeping only `backup_copies` files per user. Nothing is
    /// written when `backup_copies` is zero.
    ///
    /// Returns the path to the created backup file.
    pub async fn save_record(&self, username: &str, record: &Record) -> Result<Option<PathBuf>> {
        if self.backup_copies == 0 {
            return Ok(None);
        }
        let prefix = record_prefix(username);
        let date = utils::today();
        let seq = self.next_sequence_number(&prefix, &date).await?;
        let filename = format!("{prefix}.{date}-{seq:03}.json");
        let path = self.backups_dir.join(&filename);

        let json = record
            .to_json()
            .context("Failed to serialize the record to JSON")?;
        utils::make_dir(&self.backups_dir).await?;
        utils::write(&path, json).await?;

        self.rotate(&prefix).await?;

        Ok(Some(path))
    }

    /// Lists the backups of `username`, oldest first.
    pub async fn list(&self, username: &str) -> Result<Vec<PathBuf>> {
        let prefix = record_prefix(username);
        Ok(self
            .backup_files(&prefix)
            .await?
            .into_iter()
            .map(|(path, _)| path)
            .collect())
    }

    /// Scans the backups directory for existing files with the given prefix and date,
    /// and returns the next sequence number.
    async fn next_sequence_number(&self, prefix: &str, date: &str) -> Result<u32> {
        let max_seq = self
            .backup_files(prefix)
            .await?
            .iter()
            .filter_map(|(_, name)| parse_sequence_number(name, prefix, date))
            .max()
            .unwrap_or(0);
        Ok(max_seq + 1)
    }

    /// Rotates old backup files, keeping only `backup_copies` files with the given prefix.
    async fn rotate(&self, prefix: &str) -> Result<()> {
        let files = self.backup_files(prefix).await?;

        // Delete oldest files if we have more than backup_copies
        let to_delete = files.len().saturating_sub(self.backup_copies as usize);
        for (path, _) in files.into_iter().take(to_delete) {
            utils::remove(&path).await?;
        }

        Ok(())
    }

    /// All backup files with `prefix`, sorted by filename (which sorts by date and sequence
    /// number due to the format).
    async fn backup_files(&self, prefix: &str) -> Result<Vec<(PathBuf, String)>> {
        let mut files: Vec<(PathBuf, String)> = Vec::new();
        if !self.backups_dir.is_dir() {
            return Ok(files);
        }

        let mut dir = utils::read_dir(&self.backups_dir).await?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .context("Failed to read directory entry")?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if is_backup_file(&name, prefix) {
                files.push((entry.path(), name));
            }
        }

        files.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(files)
    }
}

fn record_prefix(username: &str) -> String {
    format!("{RECORD}-{}", utils::encode_username(username))
}

/// Splits `{prefix}.YYYY-MM-DD-NNN.json` into its date and sequence number.
fn parse_backup_name<'a>(filename: &'a str, prefix: &str) -> Option<(&'a str, u32)> {
    let rest = filename.strip_prefix(prefix)?.strip_prefix('.')?;
    let stem = rest.strip_suffix(".json")?;
    let (date, seq) = stem.rsplit_once('-')?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    if seq.len() < 3 || !seq.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((date, seq.parse().ok()?))
}

/// Parses the sequence number from a backup filename.
/// Returns None if the filename doesn't match the expected pattern.
fn parse_sequence_number(filename: &str, prefix: &str, date: &str) -> Option<u32> {
    parse_backup_name(filename, prefix)
        .filter(|(d, _)| *d == date)
        .map(|(_, seq)| seq)
}

/// Checks if a filename is a backup file with the given prefix.
fn is_backup_file(filename: &str, prefix: &str) -> bool {
    parse_backup_name(filename, prefix).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, HistoryEntry};
    use tempfile::TempDir;

    #[test]
    fn test_parse_sequence_number() {
        assert_eq!(
            parse_sequence_number(
                "record-arun.2025-12-14-001.json",
                "record-arun",
                "2025-12-14"
            ),
            Some(1)
        );
        assert_eq!(
            parse_sequence_number(
                "record-arun.2025-12-14-042.json",
                "record-arun",
                "2025-12-14"
            ),
            Some(42)
        );
        assert_eq!(
            parse_sequence_number(
                "record-arun.2025-12-14-1042.json",
                "record-arun",
                "2025-12-14"
            ),
            Some(1042)
        );
        // Wrong prefix
        assert_eq!(
            parse_sequence_number(
                "record-bob.2025-12-14-001.json",
                "record-arun",
                "2025-12-14"
            ),
            None
        );
        // Wrong date
        assert_eq!(
            parse_sequence_number(
                "record-arun.2025-12-13-001.json",
                "record-arun",
                "2025-12-14"
            ),
            None
        );
    }

    #[test]
    fn test_is_backup_file() {
        assert!(is_backup_file(
            "record-arun.2025-12-14-001.json",
            "record-arun"
        ));
        assert!(!is_backup_file(
            "record-arun.2025-12-14-001.json",
            "record-bob"
        ));
        assert!(!is_backup_file("record-arun.2025-12-14-001", "record-arun"));
        // A user whose name extends another user's name with a dot
        assert!(!is_backup_file(
            "record-a.b.2025-12-14-001.json",
            "record-a"
        ));
        assert!(is_backup_file("record-a.b.2025-12-14-001.json", "record-a.b"));
    }

    #[tokio::test]
    async fn test_save_record_rotates() {
        let dir = TempDir::new().unwrap();
        let backup = Backup::in_dir(dir.path().join(".backups"), 2);
        let mut record = Record::new();
        for _ in 0..4 {
            record.log(HistoryEntry::new(Action::TaskAdd));
            backup.save_record("arun", &record).await.unwrap().unwrap();
        }
        backup.save_record("bob", &record).await.unwrap();

        let files = backup.list("arun").await.unwrap();
        assert_eq!(files.len(), 2);
        let newest: Record = utils::deserialize(files.last().unwrap()).await.unwrap();
        assert_eq!(newest.history().len(), 4);
        assert!(files[1]
            .to_string_lossy()
            .ends_with(&format!("{}-004.json", utils::today())));
        assert_eq!(backup.list("bob").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_copies_disables_backups() {
        let dir = TempDir::new().unwrap();
        let backup = Backup::in_dir(dir.path(), 0);
        assert!(backup
            .save_record("arun", &Record::new())
            .await
            .unwrap()
            .is_none());
        assert!(backup.list("arun").await.unwrap().is_empty());
    }
}
