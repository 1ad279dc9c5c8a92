use crate::model::transaction::parse_date;
use crate::utils::{derive_id, generate_id};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A to-do item.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Empty for tasks written by clients that do not assign ids. `Record` fills it in on read.
    #[serde(default)]
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) text: String,
    /// ISO date. Other clients write `""` for "no due date", which we read as `None`.
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub(crate) due: Option<String>,
    #[serde(default)]
    pub(crate) done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) created: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub(crate) other_fields: BTreeMap<String, Value>,
}

impl Task {
    pub fn new(text: impl Into<String>, due: Option<NaiveDate>) -> Self {
        Self {
            id: generate_id(),
            text: text.into(),
            due: due.map(|d| d.format("%Y-%m-%d").to_string()),
            done: false,
            created: Some(Utc::now()),
            other_fields: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn due(&self) -> Option<&str> {
        self.due.as_deref()
    }

    pub fn done(&self) -> bool {
        self.done
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }

    /// The moment the task falls due. A plain date means midnight UTC at the start of that day. A
    /// value that cannot be read as a date has no due moment.
    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        let due = self.due.as_deref()?.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(due) {
            return Some(dt.with_timezone(&Utc));
        }
        parse_date(due)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|ndt| ndt.and_utc())
    }

    /// The id given to a task stored without one at `position` in its list. It depends on the
    /// text, due date and creation time, not on `done`, so toggling elsewhere keeps it.
    pub(crate) fn derived_id(&self, position: usize) -> String {
        let created = self.created.map(|c| c.to_rfc3339()).unwrap_or_default();
        derive_id(&[
            "task",
            &position.to_string(),
            &self.text,
            self.due.as_deref().unwrap_or_default(),
            &created,
        ])
    }

    /// True when the task is not done and its due moment is strictly before `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.done && self.due_at().is_some_and(|due| due < now)
    }
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    fn task(due: Option<&str>, done: bool) -> Task {
        let mut t = Task::new("pay rent", None);
        t.due = due.map(str::to_string);
        t.done = done;
        t
    }

    #[test]
    fn test_overdue_when_due_in_past_and_not_done() {
        assert!(task(Some("2025-06-14"), false).is_overdue(now()));
        // Midnight UTC of today is already in the past at noon
        assert!(task(Some("2025-06-15"), false).is_overdue(now()));
    }

    #[test]
    fn test_not_overdue_when_done() {
        assert!(!task(Some("2020-01-01"), true).is_overdue(now()));
    }

    #[test]
    fn test_not_overdue_without_due() {
        assert!(!task(None, false).is_overdue(now()));
    }

    #[test]
    fn test_not_overdue_when_due_in_future() {
        assert!(!task(Some("2025-06-16"), false).is_overdue(now()));
    }

    #[test]
    fn test_unparseable_due_is_never_overdue() {
        assert!(!task(Some("someday"), false).is_overdue(now()));
    }

    #[test]
    fn test_overdue_flips_with_clock() {
        let t = task(Some("2025-06-16"), false);
        assert!(!t.is_overdue(now()));
        let later = Utc.with_ymd_and_hms(2025, 6, 16, 0, 0, 1).unwrap();
        assert!(t.is_overdue(later));
    }

    #[test]
    fn test_deserialize_legacy_task() {
        let json = r#"{"text":"buy milk","due":"","done":false,"created":"2025-01-01T09:30:00.000Z"}"#;
        let t: Task = serde_json::from_str(json).unwrap();
        assert_eq!(t.text(), "buy milk");
        assert_eq!(t.due(), None);
        assert!(t.id().is_empty());
        assert_eq!(t.derived_id(0), t.derived_id(0));
        assert_ne!(t.derived_id(0), t.derived_id(1));
        assert_eq!(
            t.created(),
            Some(Utc.with_ymd_and_hms(2025, 1, 1, 9, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_new_task_formats_due() {
        let t = Task::new("x", NaiveDate::from_ymd_opt(2025, 2, 3));
        assert_eq!(t.due(), Some("2025-02-03"));
        assert!(!t.done());
    }
}
