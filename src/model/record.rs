use crate::model::{HistoryEntry, Task, Transaction};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Everything stored for one user: the document kept in the local user database or in the remote
/// repository under `{username}.json`.
///
/// Missing arrays are read as empty. `revision` is 0 for documents that were never written by a
/// revision-aware client. Tasks and transactions stored without an id get one derived from their
/// content and position, so the same document always reads with the same ids.
#[derive(Default, Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredRecord")]
pub struct Record {
    pub(crate) revision: u64,
    pub(crate) tasks: Vec<Task>,
    /// Newest first.
    pub(crate) history: Vec<HistoryEntry>,
    pub(crate) transactions: Vec<Transaction>,
    #[serde(flatten)]
    pub(crate) other_fields: BTreeMap<String, Value>,
    /// The backend's version of the stored document, e.g. the GitHub blob sha. Never serialized.
    #[serde(skip)]
    pub(crate) version: Option<String>,
}

/// The record document as it is read.
#[derive(Deserialize)]
struct StoredRecord {
    #[serde(default)]
    revision: u64,
    #[serde(default)]
    tasks: Vec<Task>,
    #[serde(default)]
    history: Vec<HistoryEntry>,
    #[serde(default)]
    transactions: Vec<Transaction>,
    #[serde(flatten)]
    other_fields: BTreeMap<String, Value>,
}

impl From<StoredRecord> for Record {
    fn from(stored: StoredRecord) -> Self {
        let mut record = Record {
            revision: stored.revision,
            tasks: stored.tasks,
            history: stored.history,
            transactions: stored.transactions,
            other_fields: stored.other_fields,
            version: None,
        };
        record.fill_missing_ids();
        record
    }
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// True when there are no tasks, transactions or history entries.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty() && self.history.is_empty() && self.transactions.is_empty()
    }

    /// Prepends an entry so that the history stays newest-first.
    pub(crate) fn log(&mut self, entry: HistoryEntry) {
        self.history.insert(0, entry);
    }

    fn fill_missing_ids(&mut self) {
        for (position, task) in self.tasks.iter_mut().enumerate() {
            if task.id.trim().is_empty() {
                task.id = task.derived_id(position);
            }
        }
        for (position, txn) in self.transactions.iter_mut().enumerate() {
            if txn.id.trim().is_empty() {
                txn.id = txn.derived_id(position);
            }
        }
    }

    /// Returns a copy of this record carrying `revision`.
    pub(crate) fn with_revision(&self, revision: u64) -> Record {
        let mut copy = self.clone();
        copy.revision = revision;
        copy
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub(crate) fn task_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub(crate) fn remove_task(&mut self, id: &str) -> Option<Task> {
        let ix = self.tasks.iter().position(|t| t.id == id)?;
        Some(self.tasks.remove(ix))
    }

    pub fn transaction(&self, id: &str) -> Option<&Transaction> {
        self.transactions.iter().find(|t| t.id == id)
    }

    pub(crate) fn remove_transaction(&mut self, id: &str) -> Option<Transaction> {
        let ix = self.transactions.iter().position(|t| t.id == id)?;
        Some(self.transactions.remove(ix))
    }

    /// Serializes the record the way it is stored: pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, Amount, TxnType};
    use std::str::FromStr;

    #[test]
    fn test_missing_arrays_default_to_empty() {
        let r: Record = serde_json::from_str(r#"{"tasks":[]}"#).unwrap();
        assert!(r.is_empty());
        assert_eq!(r.revision(), 0);
    }

    #[test]
    fn test_shape_mismatch_is_an_error() {
        assert!(serde_json::from_str::<Record>(r#"{"tasks":"nope"}"#).is_err());
    }

    #[test]
    fn test_entries_without_ids_read_with_the_same_ids() {
        let json = r#"{
            "tasks": [
                {"text": "pay rent", "due": "", "done": false},
                {"text": "pay rent", "due": "", "done": false},
                {"id": "kept", "text": "call mom"}
            ],
            "transactions": [{"type": "expense", "amount": 50, "category": "food", "date": "2025-01-02"}]
        }"#;
        let first: Record = serde_json::from_str(json).unwrap();
        let second: Record = serde_json::from_str(json).unwrap();
        assert_eq!(first, second);

        let ids: Vec<&str> = first.tasks().iter().map(Task::id).collect();
        assert!(!ids[0].is_empty());
        assert_ne!(ids[0], ids[1]);
        assert_eq!(ids[2], "kept");
        assert!(!first.transactions()[0].id().is_empty());

        // Once written back, the ids are read as stored.
        let back: Record = serde_json::from_str(&first.to_json().unwrap()).unwrap();
        assert_eq!(back, first);
    }

    #[test]
    fn test_version_is_not_serialized() {
        let mut r = Record::new();
        r.version = Some("abc".to_string());
        let json = r.to_json().unwrap();
        assert!(!json.contains("abc"));
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back.version(), None);
    }

    #[test]
    fn test_log_prepends() {
        let mut r = Record::new();
        r.log(HistoryEntry::new(Action::TaskAdd));
        r.log(HistoryEntry::new(Action::TaskDone));
        assert_eq!(r.history()[0].action(), "task-done");
        assert_eq!(r.history()[1].action(), "task-add");
    }

    #[test]
    fn test_remove_by_id() {
        let mut r = Record::new();
        let a = Task::new("a", None);
        let b = Task::new("b", None);
        let b_id = b.id().to_string();
        r.tasks.push(a);
        r.tasks.push(b);
        let removed = r.remove_task(&b_id).unwrap();
        assert_eq!(removed.text(), "b");
        assert!(r.remove_task(&b_id).is_none());
        assert_eq!(r.tasks().len(), 1);
    }

    #[test]
    fn test_json_round_trip() {
        let mut r = Record::new();
        r.tasks.push(Task::new("a", None));
        r.transactions.push(Transaction::new(
            TxnType::Expense,
            Amount::from_str("10.5").unwrap(),
            "food",
            "2025-01-01",
            "lunch",
        ));
        r.log(HistoryEntry::new(Action::TxnExpense).with("amount", 10.5));
        r.other_fields
            .insert("theme".to_string(), Value::from("dark"));
        let json = r.to_json().unwrap();
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(r, back);
    }
}
