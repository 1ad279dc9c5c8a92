//! Pure summaries over a record's transactions and tasks.
//!
//! Nothing here is cached: every caller recomputes from the list it has, which keeps the overdue
//! count honest as the clock moves.

use crate::model::{Amount, Task, Transaction, TxnType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

/// Sums the amounts of all transactions of exactly `kind`. Zero for an empty list.
pub fn sum_by_type(transactions: &[Transaction], kind: TxnType) -> Amount {
    transactions
        .iter()
        .filter(|t| t.kind() == kind)
        .map(Transaction::amount)
        .sum()
}

/// Income minus expense.
pub fn balance(transactions: &[Transaction]) -> Amount {
    sum_by_type(transactions, TxnType::Income) - sum_by_type(transactions, TxnType::Expense)
}

/// Total expense for one category.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total: Amount,
}

/// Groups expenses by category (case-sensitive, empty is `General`), ordered by the first time
/// each category appears in `transactions`.
pub fn expense_by_category(transactions: &[Transaction]) -> Vec<CategoryTotal> {
    let mut totals: Vec<CategoryTotal> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for t in transactions.iter().filter(|t| t.kind() == TxnType::Expense) {
        let category = t.category_or_default();
        match index.get(category) {
            Some(&ix) => totals[ix].total = totals[ix].total + t.amount(),
            None => {
                index.insert(category, totals.len());
                totals.push(CategoryTotal {
                    category: category.to_string(),
                    total: t.amount(),
                });
            }
        }
    }
    totals
}

/// Cumulative net balance at the end of each distinct date.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize)]
pub struct RunningBalance {
    pub dates: Vec<String>,
    pub balances: Vec<Amount>,
}

impl RunningBalance {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// The balance after the last date, zero when there are no transactions.
    pub fn last(&self) -> Amount {
        self.balances.last().copied().unwrap_or_default()
    }
}

/// Sorts transactions ascending by date (stable, so same-day entries keep their list order) and
/// accumulates each day's signed total. Dated entries are grouped by calendar day and labelled
/// `YYYY-MM-DD` whatever form their date was stored in. Entries whose date cannot be parsed sort
/// after all dated entries, in list order, and are grouped by their stored text.
pub fn running_balance(transactions: &[Transaction]) -> RunningBalance {
    let mut sorted: Vec<&Transaction> = transactions.iter().collect();
    sorted.sort_by_key(|t| (t.parsed_date().is_none(), t.parsed_date()));

    let mut out = RunningBalance::default();
    let mut running = Amount::ZERO;
    for t in sorted {
        let signed = Amount::new(t.amount().value() * Decimal::from(t.kind().sign()));
        running = running + signed;
        let label = match t.parsed_date() {
            Some(date) => date.format("%Y-%m-%d").to_string(),
            None => t.date().to_string(),
        };
        match out.dates.last() {
            Some(last) if *last == label => {
                if let Some(b) = out.balances.last_mut() {
                    *b = running;
                }
            }
            _ => {
                out.dates.push(label);
                out.balances.push(running);
            }
        }
    }
    out
}

/// Counts of tasks by state. `pending` is every task that is not done, so overdue tasks are
/// counted in both `pending` and `overdue`.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct TaskStats {
    pub done: usize,
    pub pending: usize,
    pub overdue: usize,
}

impl TaskStats {
    pub fn total(&self) -> usize {
        self.done + self.pending
    }

    /// Share of done tasks as a whole percentage, rounded half up. Zero when there are no tasks.
    pub fn completion_percent(&self) -> u8 {
        let total = self.total();
        if total == 0 {
            return 0;
        }
        // round(done * 100 / total) without floating point
        let pct = (self.done * 200 + total) / (total * 2);
        pct.min(100) as u8
    }
}

/// Computes task statistics as of `now`.
pub fn task_stats(tasks: &[Task], now: DateTime<Utc>) -> TaskStats {
    let done = tasks.iter().filter(|t| t.done()).count();
    let overdue = tasks.iter().filter(|t| t.is_overdue(now)).count();
    TaskStats {
        done,
        pending: tasks.len() - done,
        overdue,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;

    fn txn(kind: TxnType, amount: &str, category: &str, date: &str) -> Transaction {
        let mut t = Transaction::new(kind, Amount::from_str(amount).unwrap(), "", date, "");
        // Bypass the constructor's defaulting so empty categories can be tested.
        t.category = category.to_string();
        t
    }

    fn amt(s: &str) -> Amount {
        Amount::from_str(s).unwrap()
    }

    #[test]
    fn test_empty_input_is_zero() {
        assert_eq!(sum_by_type(&[], TxnType::Income), Amount::ZERO);
        assert_eq!(balance(&[]), Amount::ZERO);
        assert!(expense_by_category(&[]).is_empty());
        assert!(running_balance(&[]).is_empty());
    }

    #[test]
    fn test_balance_is_exact() {
        let list = vec![
            txn(TxnType::Income, "100.50", "salary", "2025-01-01"),
            txn(TxnType::Expense, "40.25", "food", "2025-01-02"),
        ];
        assert_eq!(balance(&list), amt("60.25"));
        assert_eq!(balance(&list).to_string(), "60.25");
    }

    #[test]
    fn test_balance_equals_income_minus_expense() {
        let list = vec![
            txn(TxnType::Income, "0.1", "", "2025-01-01"),
            txn(TxnType::Income, "0.2", "", "2025-01-01"),
            txn(TxnType::Expense, "0.3", "", "2025-01-02"),
            txn(TxnType::Unknown, "99", "", "2025-01-02"),
        ];
        let income = sum_by_type(&list, TxnType::Income);
        let expense = sum_by_type(&list, TxnType::Expense);
        assert_eq!(income, amt("0.3"));
        assert_eq!(balance(&list), income - expense);
        assert!(balance(&list).is_zero());
    }

    #[test]
    fn test_non_numeric_amount_counts_as_zero() {
        let t: Transaction =
            serde_json::from_str(r#"{"type":"income","amount":"abc","date":"2025-01-01"}"#)
                .unwrap();
        let list = vec![t, txn(TxnType::Income, "5", "", "2025-01-01")];
        assert_eq!(sum_by_type(&list, TxnType::Income), amt("5"));
    }

    #[test]
    fn test_expense_by_category() {
        let list = vec![
            txn(TxnType::Expense, "50", "food", "2025-01-01"),
            txn(TxnType::Expense, "20", "food", "2025-01-02"),
            txn(TxnType::Expense, "10", "", "2025-01-03"),
            txn(TxnType::Income, "1000", "food", "2025-01-03"),
        ];
        let totals = expense_by_category(&list);
        assert_eq!(
            totals,
            vec![
                CategoryTotal {
                    category: "food".to_string(),
                    total: amt("70")
                },
                CategoryTotal {
                    category: "General".to_string(),
                    total: amt("10")
                },
            ]
        );
    }

    #[test]
    fn test_expense_by_category_is_case_sensitive_and_ordered() {
        let list = vec![
            txn(TxnType::Expense, "1", "Travel", "2025-01-01"),
            txn(TxnType::Expense, "2", "food", "2025-01-01"),
            txn(TxnType::Expense, "3", "Food", "2025-01-01"),
            txn(TxnType::Expense, "4", "Travel", "2025-01-01"),
        ];
        let labels: Vec<_> = expense_by_category(&list)
            .into_iter()
            .map(|c| (c.category, c.total))
            .collect();
        assert_eq!(
            labels,
            vec![
                ("Travel".to_string(), amt("5")),
                ("food".to_string(), amt("2")),
                ("Food".to_string(), amt("3")),
            ]
        );
    }

    #[test]
    fn test_running_balance() {
        let list = vec![
            txn(TxnType::Expense, "30", "", "2025-01-03"),
            txn(TxnType::Income, "100", "", "2025-01-01"),
            txn(TxnType::Expense, "20", "", "2025-01-01"),
            txn(TxnType::Income, "5", "", "2025-01-02"),
        ];
        let rb = running_balance(&list);
        assert_eq!(rb.dates, vec!["2025-01-01", "2025-01-02", "2025-01-03"]);
        assert_eq!(rb.balances, vec![amt("80"), amt("85"), amt("55")]);
        assert_eq!(rb.last(), balance(&list));
    }

    #[test]
    fn test_running_balance_steps_match_daily_net() {
        let list = vec![
            txn(TxnType::Income, "10.10", "", "2025-02-01"),
            txn(TxnType::Expense, "3.05", "", "2025-02-01"),
            txn(TxnType::Expense, "7", "", "2025-02-05"),
            txn(TxnType::Income, "1.5", "", "2025-02-03"),
        ];
        let rb = running_balance(&list);
        for i in 1..rb.len() {
            let date = &rb.dates[i];
            let net: Amount = list
                .iter()
                .filter(|t| t.date() == date)
                .map(|t| Amount::new(t.amount().value() * Decimal::from(t.kind().sign())))
                .sum();
            assert_eq!(rb.balances[i], rb.balances[i - 1] + net);
        }
    }

    #[test]
    fn test_running_balance_groups_date_forms_by_day() {
        let list = vec![
            txn(TxnType::Income, "10", "", "2025-01-05"),
            txn(TxnType::Income, "5", "", "2025-01-05T10:00:00Z"),
            txn(TxnType::Expense, "3", "", "2025-01-05"),
            txn(TxnType::Income, "1", "", "2025-01-04T23:00:00Z"),
        ];
        let rb = running_balance(&list);
        assert_eq!(rb.dates, vec!["2025-01-04", "2025-01-05"]);
        assert_eq!(rb.balances, vec![amt("1"), amt("13")]);
    }

    #[test]
    fn test_running_balance_undated_last() {
        let list = vec![
            txn(TxnType::Income, "1", "", "someday"),
            txn(TxnType::Income, "2", "", "2025-01-01"),
        ];
        let rb = running_balance(&list);
        assert_eq!(rb.dates, vec!["2025-01-01", "someday"]);
        assert_eq!(rb.balances, vec![amt("2"), amt("3")]);
    }

    #[test]
    fn test_task_stats() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap();
        let mut done = Task::new("done", None);
        done.done = true;
        let mut done_past_due = Task::new("done late", None);
        done_past_due.done = true;
        done_past_due.due = Some("2020-01-01".to_string());
        let mut overdue = Task::new("late", None);
        overdue.due = Some("2025-06-01".to_string());
        let pending = Task::new("open", None);
        let mut future = Task::new("later", None);
        future.due = Some("2025-07-01".to_string());

        let stats = task_stats(&[done, done_past_due, overdue, pending, future], now);
        assert_eq!(
            stats,
            TaskStats {
                done: 2,
                pending: 3,
                overdue: 1
            }
        );
        assert_eq!(stats.total(), 5);
        assert_eq!(stats.completion_percent(), 40);
    }

    #[test]
    fn test_completion_percent_rounding() {
        let s = TaskStats {
            done: 1,
            pending: 2,
            overdue: 0,
        };
        assert_eq!(s.completion_percent(), 33);
        let s = TaskStats {
            done: 2,
            pending: 1,
            overdue: 0,
        };
        assert_eq!(s.completion_percent(), 67);
        let s = TaskStats {
            done: 1,
            pending: 1,
            overdue: 0,
        };
        assert_eq!(s.completion_percent(), 50);
        assert_eq!(TaskStats::default().completion_percent(), 0);
    }
}
