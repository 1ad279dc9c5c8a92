use crate::model::Amount;
use crate::utils::{derive_id, generate_id};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The category used when a transaction has none.
pub const DEFAULT_CATEGORY: &str = "General";

/// Whether money came in or went out.
#[derive(
    Debug, Default, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[derive(clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TxnType {
    Income,
    Expense,
    /// Anything else found in a document. Ignored by all aggregates.
    #[default]
    #[serde(other)]
    #[value(skip)]
    Unknown,
}

serde_plain::derive_display_from_serialize!(TxnType);
serde_plain::derive_fromstr_from_deserialize!(TxnType);

impl TxnType {
    /// The multiplier applied to an amount of this type in a balance: +1, -1 or 0.
    pub(crate) fn sign(&self) -> i64 {
        match self {
            TxnType::Income => 1,
            TxnType::Expense => -1,
            TxnType::Unknown => 0,
        }
    }
}

/// A single income or expense entry.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Stable identifier. Empty for entries written by clients that do not assign ids; `Record`
    /// fills it in on read.
    #[serde(default)]
    pub(crate) id: String,
    #[serde(rename = "type", default)]
    pub(crate) kind: TxnType,
    #[serde(default)]
    pub(crate) amount: Amount,
    #[serde(default)]
    pub(crate) category: String,
    /// ISO date, `YYYY-MM-DD`.
    #[serde(default)]
    pub(crate) date: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) note: String,
    /// Keys written by other clients that we do not interpret but must not drop.
    #[serde(flatten)]
    pub(crate) other_fields: BTreeMap<String, Value>,
}

impl Transaction {
    /// Creates a transaction with a fresh id. An empty `category` becomes `General`.
    pub fn new(
        kind: TxnType,
        amount: Amount,
        category: impl Into<String>,
        date: impl Into<String>,
        note: impl Into<String>,
    ) -> Self {
        let category = category.into();
        let category = match category.trim() {
            "" => DEFAULT_CATEGORY.to_string(),
            trimmed => trimmed.to_string(),
        };
        Self {
            id: generate_id(),
            kind,
            amount,
            category,
            date: date.into(),
            note: note.into(),
            other_fields: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TxnType {
        self.kind
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// The category used for grouping: empty becomes `General`.
    pub fn category_or_default(&self) -> &str {
        match self.category.as_str() {
            "" => DEFAULT_CATEGORY,
            c => c,
        }
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    /// The parsed date, or `None` when the stored value is not an ISO date.
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        parse_date(&self.date)
    }

    pub fn note(&self) -> &str {
        &self.note
    }

    /// The id given to a transaction stored without one at `position` in its list.
    pub(crate) fn derived_id(&self, position: usize) -> String {
        derive_id(&[
            "transaction",
            &position.to_string(),
            &self.kind.to_string(),
            &self.amount.value().to_string(),
            &self.category,
            &self.date,
            &self.note,
        ])
    }
}

/// Parses `YYYY-MM-DD`, tolerating a trailing time component such as `2025-01-05T10:00:00Z`.
pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let date_part = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}
