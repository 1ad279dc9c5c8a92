use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

/// The actions this crate records. Documents written by other clients may contain other action
/// strings, which is why `HistoryEntry::action` is a plain string.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Action {
    TaskAdd,
    TaskEdit,
    TaskDone,
    TaskUndo,
    TaskDelete,
    TaskDeleteAll,
    TxnIncome,
    TxnExpense,
    TxnDelete,
    FinanceReset,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::TaskAdd => "task-add",
            Action::TaskEdit => "task-edit",
            Action::TaskDone => "task-done",
            Action::TaskUndo => "task-undo",
            Action::TaskDelete => "task-delete",
            Action::TaskDeleteAll => "task-delete-all",
            Action::TxnIncome => "txn-income",
            Action::TxnExpense => "txn-expense",
            Action::TxnDelete => "txn-delete",
            Action::FinanceReset => "finance-reset",
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the audit log.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Human readable local timestamp, e.g. `6/15/2025, 9:05:00 AM`.
    #[serde(default)]
    pub(crate) when: String,
    #[serde(default)]
    pub(crate) action: String,
    /// Optional details such as the amount or the deleted item.
    #[serde(flatten)]
    pub(crate) context: BTreeMap<String, Value>,
}

impl HistoryEntry {
    /// Creates an entry stamped with the current local time.
    pub fn new(action: Action) -> Self {
        Self::at(action, Local::now())
    }

    pub fn at<Tz>(action: Action, when: DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        Self {
            when: when.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string(),
            action: action.as_str().to_string(),
            context: BTreeMap::new(),
        }
    }

    /// Adds a context value. Values that cannot be represented as JSON are skipped.
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.to_string(), v);
        }
        self
    }

    pub fn when(&self) -> &str {
        &self.when
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn context(&self) -> &BTreeMap<String, Value> {
        &self.context
    }
}

impl Display for HistoryEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.when, self.action)
    }
}
