//! Projects a record into everything the user sees: task rows, badges, the finance summary, the
//! history list and chart series.
//!
//! A `Dashboard` is rebuilt from the record on every call, and its text form redraws every chart
//! from scratch.

use crate::aggregate::{self, TaskStats};
use crate::model::{Amount, Record, Task, Transaction, TxnType};
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Width of the longest bar in text charts.
const BAR_WIDTH: usize = 30;

/// How command output is printed.
#[derive(
    Debug, Default, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

serde_plain::derive_display_from_serialize!(OutputFormat);
serde_plain::derive_fromstr_from_deserialize!(OutputFormat);

/// One task as listed.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct TaskRow {
    pub id: String,
    pub text: String,
    pub due: Option<String>,
    pub done: bool,
    pub overdue: bool,
}

impl TaskRow {
    pub fn new(task: &Task, now: DateTime<Utc>) -> Self {
        Self {
            id: task.id().to_string(),
            text: task.text().to_string(),
            due: task.due().map(str::to_string),
            done: task.done(),
            overdue: task.is_overdue(now),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct FinanceSummary {
    pub income: Amount,
    pub expense: Amount,
    pub balance: Amount,
    pub negative: bool,
}

impl FinanceSummary {
    pub fn new(transactions: &[Transaction]) -> Self {
        let income = aggregate::sum_by_type(transactions, TxnType::Income);
        let expense = aggregate::sum_by_type(transactions, TxnType::Expense);
        let balance = income - expense;
        Self {
            income,
            expense,
            balance,
            negative: balance.is_negative(),
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Pie,
    Bar,
    Line,
}

/// Whether chart values are counts or money.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartUnit {
    Count,
    Money,
}

/// A labelled series, ready for any chart library or for `to_text`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Chart {
    pub kind: ChartKind,
    pub label: String,
    pub unit: ChartUnit,
    pub labels: Vec<String>,
    pub values: Vec<Amount>,
}

impl Chart {
    fn counts(kind: ChartKind, label: &str, points: &[(&str, usize)]) -> Self {
        Self {
            kind,
            label: label.to_string(),
            unit: ChartUnit::Count,
            labels: points.iter().map(|(l, _)| l.to_string()).collect(),
            values: points
                .iter()
                .map(|(_, v)| Amount::new(Decimal::from(*v as u64)))
                .collect(),
        }
    }

    fn money(kind: ChartKind, label: &str, labels: Vec<String>, values: Vec<Amount>) -> Self {
        Self {
            kind,
            label: label.to_string(),
            unit: ChartUnit::Money,
            labels,
            values,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Amount::is_zero)
    }

    /// Draws the chart as horizontal bars scaled to the largest absolute value.
    pub fn to_text(&self, currency: &str) -> String {
        let mut out = format!("{}\n", self.label);
        if self.labels.is_empty() {
            out.push_str("  (no data)\n");
            return out;
        }
        let max = self
            .values
            .iter()
            .map(|v| v.value().abs())
            .max()
            .unwrap_or_default();
        let label_width = self
            .labels
            .iter()
            .map(|l| l.chars().count())
            .max()
            .unwrap_or(0);
        for (label, value) in self.labels.iter().zip(&self.values) {
            let len = bar_len(value.value().abs(), max);
            let bar = if value.is_negative() { "-" } else { "#" }.repeat(len);
            let shown = match self.unit {
                ChartUnit::Count => value.value().normalize().to_string(),
                ChartUnit::Money => money(currency, *value),
            };
            let _ = writeln!(
                out,
                "  {label:<label_width$} |{bar:<width$}| {shown}",
                width = BAR_WIDTH
            );
        }
        out
    }
}

fn bar_len(value: Decimal, max: Decimal) -> usize {
    if max.is_zero() {
        return 0;
    }
    (value * Decimal::from(BAR_WIDTH as u64) / max)
        .round()
        .to_usize()
        .unwrap_or(0)
        .min(BAR_WIDTH)
}

/// Formats `amount` with a currency symbol, e.g. `₹1,250.00`.
pub fn money(currency: &str, amount: Amount) -> String {
    format!("{currency}{amount}")
}

/// Everything shown for one user at one moment.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub username: String,
    pub revision: u64,
    pub generated_at: DateTime<Utc>,
    pub tasks: Vec<TaskRow>,
    pub task_stats: TaskStats,
    pub completion_percent: u8,
    pub finance: FinanceSummary,
    /// `{when}: {action}`, newest first.
    pub history: Vec<String>,
    pub charts: Vec<Chart>,
}

/// Builds the dashboard for `record` as of `now`, keeping the newest `history_limit` history
/// entries.
pub fn dashboard(
    username: &str,
    record: &Record,
    now: DateTime<Utc>,
    history_limit: usize,
) -> Dashboard {
    let stats = aggregate::task_stats(record.tasks(), now);
    let finance = FinanceSummary::new(record.transactions());
    let by_category = aggregate::expense_by_category(record.transactions());
    let running = aggregate::running_balance(record.transactions());

    let charts = vec![
        Chart::counts(
            ChartKind::Pie,
            "Tasks",
            &[
                ("Done", stats.done),
                ("Pending", stats.pending),
                ("Overdue", stats.overdue),
            ],
        ),
        Chart::money(
            ChartKind::Pie,
            "Income vs Expense",
            vec!["Income".to_string(), "Expense".to_string()],
            vec![finance.income, finance.expense],
        ),
        Chart::money(
            ChartKind::Bar,
            "Expense by Category",
            by_category.iter().map(|c| c.category.clone()).collect(),
            by_category.iter().map(|c| c.total).collect(),
        ),
        Chart::money(
            ChartKind::Line,
            "Balance Over Time",
            running.dates,
            running.balances,
        ),
    ];

    Dashboard {
        username: username.to_string(),
        revision: record.revision(),
        generated_at: now,
        tasks: record
            .tasks()
            .iter()
            .map(|t| TaskRow::new(t, now))
            .collect(),
        completion_percent: stats.completion_percent(),
        task_stats: stats,
        finance,
        history: record
            .history()
            .iter()
            .take(history_limit)
            .map(ToString::to_string)
            .collect(),
        charts,
    }
}

impl Dashboard {
    /// The dashboard as terminal text.
    pub fn to_text(&self, currency: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Welcome, {}", self.username);
        out.push('\n');
        out.push_str(&task_badges(&self.task_stats, self.completion_percent));
        out.push('\n');
        out.push_str(&tasks_text(&self.tasks));
        out.push('\n');
        out.push_str(&finance_text(&self.finance, currency));
        out.push('\n');
        for chart in &self.charts {
            out.push('\n');
            out.push_str(&chart.to_text(currency));
        }
        out.push('\n');
        out.push_str(&history_text(&self.history));
        out
    }

    /// The dashboard as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Unable to serialize the dashboard")
    }
}

/// `Tasks  done 1 | pending 2 | overdue 1 | 33% complete`
pub fn task_badges(stats: &TaskStats, completion_percent: u8) -> String {
    format!(
        "Tasks  done {} | pending {} | overdue {} | {completion_percent}% complete\n",
        stats.done, stats.pending, stats.overdue
    )
}

/// One line per task: a checkbox, the text, the due date and the id.
pub fn tasks_text(rows: &[TaskRow]) -> String {
    if rows.is_empty() {
        return "  No tasks yet\n".to_string();
    }
    let width = rows
        .iter()
        .map(|r| r.text.chars().count())
        .max()
        .unwrap_or(0);
    let mut out = String::new();
    for row in rows {
        let check = if row.done { "x" } else { " " };
        let due = row
            .due
            .as_deref()
            .map(|d| format!(" • {d}"))
            .unwrap_or_default();
        let flag = if row.overdue { " OVERDUE" } else { "" };
        let _ = writeln!(
            out,
            "  [{check}] {:<width$}{due}{flag}  ({})",
            row.text, row.id
        );
    }
    out
}

/// `Income ₹100.50 | Expense ₹40.25 | Balance ₹60.25`
pub fn finance_text(finance: &FinanceSummary, currency: &str) -> String {
    let mut out = format!(
        "Income {} | Expense {} | Balance {}\n",
        money(currency, finance.income),
        money(currency, finance.expense),
        money(currency, finance.balance)
    );
    if finance.negative {
        out.push_str("Warning: the balance is negative\n");
    }
    out
}

pub fn history_text(lines: &[String]) -> String {
    if lines.is_empty() {
        return "History\n  (empty)\n".to_string();
    }
    let mut out = String::from("History\n");
    for line in lines {
        let _ = writeln!(out, "  {line}");
    }
    out
}

/// A table of transactions, oldest first as stored.
pub fn transactions_text(transactions: &[Transaction], currency: &str) -> String {
    if transactions.is_empty() {
        return "  No transactions yet\n".to_string();
    }
    let mut out = String::new();
    for t in transactions {
        let sign = match t.kind() {
            TxnType::Income => "+",
            TxnType::Expense => "-",
            TxnType::Unknown => "?",
        };
        let note = if t.note().is_empty() {
            String::new()
        } else {
            format!("  {}", t.note())
        };
        let _ = writeln!(
            out,
            "  {:<10} {sign}{:>14}  {:<16}{note}  ({})",
            t.date(),
            money(currency, t.amount()),
            t.category_or_default(),
            t.id()
        );
    }
    out
}

/// The transactions as CSV with a header row.
pub fn transactions_csv(transactions: &[Transaction]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["id", "type", "amount", "category", "date", "note"])
        .context("Unable to write the CSV header")?;
    for t in transactions {
        writer
            .write_record([
                t.id(),
                &t.kind().to_string(),
                &t.amount().value().to_string(),
                t.category_or_default(),
                t.date(),
                t.note(),
            ])
            .context("Unable to write a CSV row")?;
    }
    let bytes = writer
        .into_inner()
        .context("Unable to finish writing the CSV")?;
    String::from_utf8(bytes).context("The CSV output is not UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, HistoryEntry};
    use chrono::TimeZone;
    use std::str::FromStr;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
    }

    fn txn(kind: TxnType, amount: &str, category: &str, date: &str) -> Transaction {
        Transaction::new(kind, Amount::from_str(amount).unwrap(), category, date, "")
    }

    fn record() -> Record {
        let mut record = Record::new();
        let mut done = Task::new("done", None);
        done.done = true;
        let mut late = Task::new("late", None);
        late.due = Some("2025-06-01".to_string());
        record.tasks = vec![done, late, Task::new("open", None)];
        record.transactions = vec![
            txn(TxnType::Income, "100.50", "salary", "2025-06-01"),
            txn(TxnType::Expense, "40.25", "food", "2025-06-02"),
        ];
        for _ in 0..5 {
            record.log(HistoryEntry::at(Action::TaskAdd, now()));
        }
        record
    }

    #[test]
    fn test_dashboard() {
        let d = dashboard("arun", &record(), now(), 3);
        assert_eq!(d.tasks.len(), 3);
        assert!(d.tasks[1].overdue);
        assert!(!d.tasks[0].overdue);
        assert_eq!(
            d.task_stats,
            TaskStats {
                done: 1,
                pending: 2,
                overdue: 1
            }
        );
        assert_eq!(d.completion_percent, 33);
        assert_eq!(d.finance.balance.to_string(), "60.25");
        assert!(!d.finance.negative);
        assert_eq!(d.history.len(), 3);
        assert_eq!(d.history[0], "6/15/2025, 12:00:00 PM: task-add");

        let labels: Vec<_> = d.charts.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "Tasks",
                "Income vs Expense",
                "Expense by Category",
                "Balance Over Time"
            ]
        );
        assert_eq!(d.charts[2].labels, vec!["food"]);
        assert_eq!(d.charts[3].labels, vec!["2025-06-01", "2025-06-02"]);
    }

    #[test]
    fn test_overdue_is_evaluated_at_render_time() {
        let r = record();
        let earlier = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(dashboard("arun", &r, earlier, 30).task_stats.overdue, 0);
        assert_eq!(dashboard("arun", &r, now(), 30).task_stats.overdue, 1);
    }

    #[test]
    fn test_empty_record() {
        let d = dashboard("arun", &Record::new(), now(), 30);
        assert_eq!(d.completion_percent, 0);
        assert!(d.charts.iter().all(Chart::is_empty));
        let text = d.to_text("₹");
        assert!(text.contains("No tasks yet"));
        assert!(text.contains("Balance ₹0.00"));
        assert!(text.contains("(no data)"));
    }

    #[test]
    fn test_text_output() {
        let text = dashboard("arun", &record(), now(), 30).to_text("₹");
        assert!(text.contains("Welcome, arun"));
        assert!(text.contains("done 1 | pending 2 | overdue 1 | 33% complete"));
        assert!(text.contains("Income ₹100.50 | Expense ₹40.25 | Balance ₹60.25"));
        assert!(text.contains("[x] done"));
        assert!(text.contains("OVERDUE"));
        assert!(!text.contains("negative"));
    }

    #[test]
    fn test_chart_bars_scale_to_largest_value() {
        let chart = Chart::money(
            ChartKind::Bar,
            "Expense by Category",
            vec!["food".to_string(), "rent".to_string()],
            vec![
                Amount::from_str("10").unwrap(),
                Amount::from_str("20").unwrap(),
            ],
        );
        let text = chart.to_text("$");
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "Expense by Category");
        assert_eq!(lines[1].matches('#').count(), BAR_WIDTH / 2);
        assert_eq!(lines[2].matches('#').count(), BAR_WIDTH);
        assert!(lines[2].ends_with("$20.00"));
    }

    #[test]
    fn test_negative_balance_line() {
        let transactions = vec![txn(TxnType::Expense, "5", "", "2025-01-01")];
        let finance = FinanceSummary::new(&transactions);
        assert!(finance.negative);
        assert!(finance_text(&finance, "₹").contains("Balance ₹-5.00"));

        let mut r = Record::new();
        r.transactions = transactions;
        let d = dashboard("arun", &r, now(), 30);
        assert!(d.charts[3].to_text("₹").contains("-----"));
    }

    #[test]
    fn test_transactions_csv() {
        let mut t = txn(TxnType::Expense, "1250.5", "food, fancy", "2025-01-02");
        t.note = "dinner".to_string();
        let csv = transactions_csv(&[t.clone()]).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("id,type,amount,category,date,note"));
        assert_eq!(
            lines.next().unwrap(),
            format!("{},expense,1250.5,\"food, fancy\",2025-01-02,dinner", t.id())
        );
    }

    #[test]
    fn test_dashboard_json() {
        let json = dashboard("arun", &record(), now(), 30).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["finance"]["balance"], 60.25);
        assert_eq!(value["charts"][0]["kind"], "pie");
        assert_eq!(value["charts"][0]["values"][2], 1);
    }
}
