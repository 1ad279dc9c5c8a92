//! The active user's record and every operation that changes it.
//!
//! A `Session` owns the record that was last loaded or saved for one user. Mutations are applied
//! to a copy which is snapshotted to the local backups, saved to the `Store`, and only committed to
//! the session when the save succeeds. Each load or save is a request tracked by a `Lifecycle`, so
//! a completion that arrives after it was cancelled or superseded is discarded.

use crate::api::Store;
use crate::backup::Backup;
use crate::error::{tag, ErrorType, IntoResult, StaleRecord};
use crate::model::{parse_date, Action, Amount, HistoryEntry, Record, Task, Transaction, TxnType};
use crate::{aggregate, utils, Error, Result};
use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Identifies one load or save request.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Ticket(u64);

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum RequestKind {
    Load,
    Save,
}

impl Display for RequestKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestKind::Load => f.write_str("load"),
            RequestKind::Save => f.write_str("save"),
        }
    }
}

/// Where the most recent request stands.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub enum RequestState {
    #[default]
    Idle,
    Pending {
        ticket: Ticket,
        kind: RequestKind,
    },
    Succeeded {
        ticket: Ticket,
        kind: RequestKind,
    },
    Failed {
        ticket: Ticket,
        kind: RequestKind,
        message: String,
    },
    /// Cancelled, or its future was dropped before it finished.
    Cancelled {
        ticket: Ticket,
        kind: RequestKind,
    },
}

impl RequestState {
    pub fn is_pending(&self) -> bool {
        matches!(self, RequestState::Pending { .. })
    }
}

/// Returned when a request cannot start because another one is still pending.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Busy {
    pub pending: RequestKind,
}

impl Display for Busy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "A {} is still in progress, try again when it finishes", self.pending)
    }
}

impl std::error::Error for Busy {}

/// The request state machine: `Idle -> Pending -> Succeeded | Failed | Cancelled`.
///
/// At most one request is pending. A save never starts while anything is pending. A load started
/// while another load is pending supersedes it, and the older load's completion is then ignored.
#[derive(Debug, Default)]
pub struct Lifecycle {
    last_ticket: u64,
    state: RequestState,
}

impl Lifecycle {
    pub fn state(&self) -> &RequestState {
        &self.state
    }

    /// Starts a request and returns its ticket, or a `Busy` error.
    pub fn begin(&mut self, kind: RequestKind) -> std::result::Result<Ticket, Busy> {
        if let RequestState::Pending { kind: pending, .. } = self.state {
            if pending == RequestKind::Save || kind == RequestKind::Save {
                return Err(Busy { pending });
            }
            debug!("Superseding the pending load");
        }
        self.last_ticket += 1;
        let ticket = Ticket(self.last_ticket);
        self.state = RequestState::Pending { ticket, kind };
        Ok(ticket)
    }

    /// Settles `ticket`. Returns false, changing nothing, when `ticket` is not the pending request.
    pub fn finish(&mut self, ticket: Ticket, outcome: std::result::Result<(), String>) -> bool {
        let kind = match self.state {
            RequestState::Pending { ticket: t, kind } if t == ticket => kind,
            _ => {
                debug!("Discarding the completion of stale request {ticket:?}");
                return false;
            }
        };
        self.state = match outcome {
            Ok(()) => RequestState::Succeeded { ticket, kind },
            Err(message) => RequestState::Failed {
                ticket,
                kind,
                message,
            },
        };
        true
    }

    /// Abandons the pending request, if any, and returns its ticket.
    pub fn cancel(&mut self) -> Option<Ticket> {
        match self.state {
            RequestState::Pending { ticket, kind } => {
                self.state = RequestState::Cancelled { ticket, kind };
                Some(ticket)
            }
            _ => None,
        }
    }

    fn abandon(&mut self, ticket: Ticket) {
        if let RequestState::Pending { ticket: t, kind } = self.state {
            if t == ticket {
                debug!("Request {ticket:?} was dropped before it finished");
                self.state = RequestState::Cancelled { ticket, kind };
            }
        }
    }
}

/// How `edit_task` treats the due date.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub enum DueEdit {
    #[default]
    Keep,
    Set(NaiveDate),
    Clear,
}

/// Input for `add_transaction`. Missing category and date take their defaults.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NewTransaction {
    pub kind: TxnType,
    pub amount: Amount,
    pub category: Option<String>,
    /// `YYYY-MM-DD`, defaults to today.
    pub date: Option<String>,
    pub note: Option<String>,
}

impl NewTransaction {
    pub fn new(kind: TxnType, amount: Amount) -> Self {
        Self {
            kind,
            amount,
            category: None,
            date: None,
            note: None,
        }
    }
}

/// The result of `add_transaction`.
#[derive(Debug, Clone)]
pub struct TransactionAdded {
    pub transaction: Transaction,
    /// The balance after adding the transaction.
    pub balance: Amount,
}

/// The result of `register`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Registration {
    /// An empty record was saved at this revision.
    Created(u64),
    /// A record already exists. Nothing was written.
    AlreadyExists,
}

/// Trims `username` and rejects it when empty.
pub fn validate_username(username: &str) -> Result<String> {
    let username = username.trim();
    if username.is_empty() {
        return Err(anyhow!("The username cannot be empty")).pub_result(ErrorType::Validation);
    }
    Ok(username.to_string())
}

/// Creates an empty record for `username` unless the store already has one, even an empty one.
///
/// # Errors
/// - Returns an error when the store cannot be read. A read failure is never taken to mean that
///   the user does not exist.
pub async fn register(store: &dyn Store, username: &str) -> Result<Registration> {
    let username = validate_username(username)?;
    let existing = store
        .fetch(&username)
        .await
        .with_context(|| format!("Unable to check whether '{username}' exists"))
        .pub_result(store_error_type(store))?;
    if existing.is_some() {
        return Ok(Registration::AlreadyExists);
    }
    let saved = store
        .save(&username, &Record::new())
        .await
        .map_err(|e| classify(store, e))?;
    info!("Registered '{username}'");
    Ok(Registration::Created(saved.revision()))
}

/// A cloneable handle to one user's record and its request lifecycle.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    username: String,
    store: Arc<dyn Store>,
    backup: Option<Backup>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    record: Record,
    lifecycle: Lifecycle,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.inner.username)
            .field("store", &self.inner.store.name())
            .finish()
    }
}

impl Session {
    /// Opens a session with whatever `Store::load` returns, which is an empty record when the
    /// store cannot be read.
    pub async fn open(
        username: &str,
        store: Arc<dyn Store>,
        backup: Option<Backup>,
    ) -> Result<Self> {
        let session = Self::new(username, store, backup)?;
        session.refresh().await?;
        Ok(session)
    }

    /// Opens a session, failing when the store cannot be read. Use this before changing a record
    /// so that an unreachable store is never mistaken for an empty record.
    pub async fn open_strict(
        username: &str,
        store: Arc<dyn Store>,
        backup: Option<Backup>,
    ) -> Result<Self> {
        let session = Self::new(username, store, backup)?;
        session.reload().await?;
        Ok(session)
    }

    /// Creates a session holding an empty record without touching the store.
    pub fn new(username: &str, store: Arc<dyn Store>, backup: Option<Backup>) -> Result<Self> {
        let username = validate_username(username)?;
        Ok(Self {
            inner: Arc::new(Inner {
                username,
                store,
                backup,
                state: Mutex::new(State::default()),
            }),
        })
    }

    pub fn username(&self) -> &str {
        &self.inner.username
    }

    /// A copy of the last committed record.
    pub fn record(&self) -> Record {
        self.inner.lock().record.clone()
    }

    pub fn revision(&self) -> u64 {
        self.inner.lock().record.revision()
    }

    pub fn request_state(&self) -> RequestState {
        self.inner.lock().lifecycle.state().clone()
    }

    /// Cancels the pending request. Its result is discarded when it arrives.
    pub fn cancel(&self) -> bool {
        self.inner.lock().lifecycle.cancel().is_some()
    }

    /// Reloads the record with `Store::load`, degrading read failures to an empty record.
    /// Returns false when this load was superseded or cancelled before it finished.
    pub async fn refresh(&self) -> Result<bool> {
        let flight = self.inner.begin(RequestKind::Load)?;
        let record = self.inner.store.load(&self.inner.username).await;
        Ok(flight.settle(Ok(()), |state| state.record = record))
    }

    /// Reloads the record with `Store::fetch`. A missing record is an empty one; a read failure is
    /// an error and leaves the session unchanged.
    pub async fn reload(&self) -> Result<bool> {
        let flight = self.inner.begin(RequestKind::Load)?;
        match self.inner.store.fetch(&self.inner.username).await {
            Ok(record) => {
                let record = record.unwrap_or_default();
                Ok(flight.settle(Ok(()), |state| state.record = record))
            }
            Err(e) => {
                flight.settle(Err(format!("{e:#}")), |_| {});
                Err(classify(self.inner.store.as_ref(), e))
            }
        }
    }

    /// Adds a task. `text` is trimmed and must not be empty.
    pub async fn add_task(&self, text: &str, due: Option<NaiveDate>) -> Result<Task> {
        let text = text.trim().to_string();
        self.mutate(move |record| {
            if text.is_empty() {
                return invalid("The task text cannot be empty");
            }
            let task = Task::new(text.clone(), due);
            record.tasks.push(task.clone());
            record.log(HistoryEntry::new(Action::TaskAdd).with("text", &text));
            Ok(task)
        })
        .await
    }

    /// Changes a task's text and due date. Empty or missing `text` keeps the current text.
    pub async fn edit_task(&self, id: &str, text: Option<&str>, due: DueEdit) -> Result<Task> {
        let id = id.to_string();
        let text = text.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string);
        self.mutate(move |record| {
            let task = record.task_mut(&id).ok_or_else(|| task_not_found(&id))?;
            if let Some(text) = text {
                task.text = text;
            }
            match due {
                DueEdit::Keep => {}
                DueEdit::Set(date) => task.due = Some(date.format("%Y-%m-%d").to_string()),
                DueEdit::Clear => task.due = None,
            }
            let task = task.clone();
            record.log(HistoryEntry::new(Action::TaskEdit).with("text", task.text()));
            Ok(task)
        })
        .await
    }

    /// Flips a task between done and not done.
    pub async fn toggle_task(&self, id: &str) -> Result<Task> {
        let id = id.to_string();
        self.mutate(move |record| {
            let task = record.task_mut(&id).ok_or_else(|| task_not_found(&id))?;
            task.done = !task.done;
            let task = task.clone();
            let action = if task.done() {
                Action::TaskDone
            } else {
                Action::TaskUndo
            };
            record.log(HistoryEntry::new(action).with("text", task.text()));
            Ok(task)
        })
        .await
    }

    pub async fn delete_task(&self, id: &str) -> Result<Task> {
        let id = id.to_string();
        self.mutate(move |record| {
            let task = record.remove_task(&id).ok_or_else(|| task_not_found(&id))?;
            record.log(HistoryEntry::new(Action::TaskDelete).with("item", &task));
            Ok(task)
        })
        .await
    }

    /// Deletes every task and returns how many there were.
    pub async fn clear_tasks(&self) -> Result<usize> {
        self.mutate(|record| {
            let items = std::mem::take(&mut record.tasks);
            let count = items.len();
            record.log(HistoryEntry::new(Action::TaskDeleteAll).with("items", &items));
            Ok(count)
        })
        .await
    }

    /// Records an income or expense. Warns when the resulting balance is negative.
    pub async fn add_transaction(&self, input: NewTransaction) -> Result<TransactionAdded> {
        let added = self
            .mutate(move |record| {
                let action = match input.kind {
                    TxnType::Income => Action::TxnIncome,
                    TxnType::Expense => Action::TxnExpense,
                    TxnType::Unknown => return invalid("The type must be income or expense"),
                };
                if !input.amount.is_positive() {
                    return invalid(format!(
                        "The amount must be greater than zero, got {}",
                        input.amount
                    ));
                }
                let date = match input.date.as_deref().map(str::trim) {
                    None | Some("") => utils::today(),
                    Some(date) => match parse_date(date) {
                        Some(parsed) => parsed.format("%Y-%m-%d").to_string(),
                        None => return invalid(format!("'{date}' is not a YYYY-MM-DD date")),
                    },
                };
                let category = input.category.unwrap_or_default();
                let transaction = Transaction::new(
                    input.kind,
                    input.amount,
                    category,
                    date,
                    input.note.unwrap_or_default().trim(),
                );
                record.transactions.push(transaction.clone());
                record.log(
                    HistoryEntry::new(action)
                        .with("amount", transaction.amount())
                        .with("category", transaction.category()),
                );
                Ok(TransactionAdded {
                    balance: aggregate::balance(record.transactions()),
                    transaction,
                })
            })
            .await?;
        if added.balance.is_negative() {
            warn!("The balance is negative: {}", added.balance);
        }
        Ok(added)
    }

    pub async fn delete_transaction(&self, id: &str) -> Result<Transaction> {
        let id = id.to_string();
        self.mutate(move |record| {
            let txn = record
                .remove_transaction(&id)
                .ok_or_else(|| not_found(format!("No transaction has the id '{id}'")))?;
            record.log(HistoryEntry::new(Action::TxnDelete).with("item", &txn));
            Ok(txn)
        })
        .await
    }

    /// Deletes every transaction and returns how many there were.
    pub async fn reset_finance(&self) -> Result<usize> {
        self.mutate(|record| {
            let items = std::mem::take(&mut record.transactions);
            let count = items.len();
            record.log(HistoryEntry::new(Action::FinanceReset).with("items", &items));
            Ok(count)
        })
        .await
    }

    /// Empties the history and returns how many entries it had.
    pub async fn clear_history(&self) -> Result<usize> {
        self.mutate(|record| {
            let count = record.history.len();
            record.history.clear();
            Ok(count)
        })
        .await
    }

    /// Overwrites the record with an empty one. The revision still advances.
    pub async fn wipe(&self) -> Result<()> {
        self.mutate(|record| {
            *record = Record {
                revision: record.revision,
                version: record.version.take(),
                ..Record::new()
            };
            Ok(())
        })
        .await
    }

    /// Applies `change` to a copy of the record, snapshots and saves the copy, then commits it.
    async fn mutate<T, F>(&self, change: F) -> Result<T>
    where
        F: FnOnce(&mut Record) -> Result<T> + Send,
        T: Send,
    {
        let username = &self.inner.username;
        let store = self.inner.store.as_ref();
        let flight = self.inner.begin(RequestKind::Save)?;
        let mut draft = self.inner.lock().record.clone();

        let value = match change(&mut draft) {
            Ok(value) => value,
            Err(e) => {
                flight.settle(Err(format!("{e:#}")), |_| {});
                return Err(e);
            }
        };

        if let Some(backup) = &self.inner.backup {
            match backup.save_record(username, &draft).await {
                Ok(Some(path)) => debug!("Saved backup to {}", path.display()),
                Ok(None) => {}
                Err(e) => warn!("Unable to back up the record for '{username}': {e:#}"),
            }
        }

        match store.save(username, &draft).await {
            Ok(committed) => {
                if flight.settle(Ok(()), |state| state.record = committed) {
                    Ok(value)
                } else {
                    Err(anyhow!(
                        "The save finished after it was cancelled, so its result was discarded. \
                        Reload before making further changes"
                    ))
                    .pub_result(ErrorType::Conflict)
                }
            }
            Err(e) => {
                flight.settle(Err(format!("{e:#}")), |_| {});
                Err(classify(store, e))
            }
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        // State is only ever replaced wholesale, so a poisoned lock still holds a consistent value.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin(&self, kind: RequestKind) -> Result<InFlight<'_>> {
        let ticket = self
            .lock()
            .lifecycle
            .begin(kind)
            .map_err(Error::from)
            .pub_result(ErrorType::Busy)?;
        Ok(InFlight {
            inner: self,
            ticket,
            settled: false,
        })
    }
}

/// A started request. Dropping it before `settle` marks the request cancelled.
struct InFlight<'a> {
    inner: &'a Inner,
    ticket: Ticket,
    settled: bool,
}

impl InFlight<'_> {
    /// Settles the request and, when it is still the current one, applies `commit` under the same
    /// lock. Returns false when the request was superseded or cancelled.
    fn settle(
        mut self,
        outcome: std::result::Result<(), String>,
        commit: impl FnOnce(&mut State),
    ) -> bool {
        self.settled = true;
        let mut state = self.inner.lock();
        let current = state.lifecycle.finish(self.ticket, outcome);
        if current {
            commit(&mut state);
        }
        current
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.inner.lock().lifecycle.abandon(self.ticket);
        }
    }
}

pub(crate) fn store_error_type(store: &dyn Store) -> ErrorType {
    if store.name() == "local" {
        ErrorType::Storage
    } else {
        ErrorType::Remote
    }
}

/// Tags a store error: a stale revision is a conflict, anything else is a storage or remote error.
fn classify(store: &dyn Store, e: Error) -> Error {
    let error_type = if e.downcast_ref::<StaleRecord>().is_some() {
        ErrorType::Conflict
    } else {
        store_error_type(store)
    };
    tag(e, error_type)
}

fn invalid<T>(message: impl Into<String>) -> Result<T> {
    Err(tag(anyhow!(message.into()), ErrorType::Validation))
}

fn not_found(message: String) -> Error {
    tag(anyhow!(message), ErrorType::NotFound)
}

fn task_not_found(id: &str) -> Error {
    not_found(format!("No task has the id '{id}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryStore;
    use crate::error::error_type;
    use std::str::FromStr;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Semaphore;

    fn amt(s: &str) -> Amount {
        Amount::from_str(s).unwrap()
    }

    async fn session() -> (Arc<MemoryStore>, Session) {
        let store = Arc::new(MemoryStore::new());
        let session = Session::open_strict("arun", store.clone(), None)
            .await
            .unwrap();
        (store, session)
    }

    #[test]
    fn test_lifecycle() {
        let mut lc = Lifecycle::default();
        assert_eq!(lc.state(), &RequestState::Idle);

        let first = lc.begin(RequestKind::Load).unwrap();
        let second = lc.begin(RequestKind::Load).unwrap();
        assert_ne!(first, second);
        // The superseded load's completion is discarded
        assert!(!lc.finish(first, Ok(())));
        assert!(lc.state().is_pending());
        // Nothing else may start while a load is pending except another load
        assert_eq!(
            lc.begin(RequestKind::Save).unwrap_err().pending,
            RequestKind::Load
        );
        assert!(lc.finish(second, Ok(())));
        assert_eq!(
            lc.state(),
            &RequestState::Succeeded {
                ticket: second,
                kind: RequestKind::Load
            }
        );

        let save = lc.begin(RequestKind::Save).unwrap();
        assert_eq!(
            lc.begin(RequestKind::Load).unwrap_err().pending,
            RequestKind::Save
        );
        assert_eq!(lc.cancel(), Some(save));
        assert!(!lc.finish(save, Ok(())));
        assert_eq!(lc.cancel(), None);

        let failing = lc.begin(RequestKind::Save).unwrap();
        assert!(lc.finish(failing, Err("offline".to_string())));
        assert!(matches!(lc.state(), RequestState::Failed { message, .. } if message == "offline"));
    }

    #[tokio::test]
    async fn test_task_crud_by_id() {
        let (store, session) = session().await;
        let a = session.add_task("  buy milk ", None).await.unwrap();
        let b = session.add_task("call mom", None).await.unwrap();
        assert_eq!(a.text(), "buy milk");

        let toggled = session.toggle_task(b.id()).await.unwrap();
        assert!(toggled.done());
        assert_eq!(session.record().history()[0].action(), "task-done");
        let toggled = session.toggle_task(b.id()).await.unwrap();
        assert!(!toggled.done());
        assert_eq!(session.record().history()[0].action(), "task-undo");

        let deleted = session.delete_task(a.id()).await.unwrap();
        assert_eq!(deleted.text(), "buy milk");
        let revision = session.revision();
        let e = session.delete_task(a.id()).await.unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::NotFound));
        assert_eq!(store.get("arun").unwrap().revision(), revision);

        let record = session.record();
        assert_eq!(record.tasks().len(), 1);
        assert_eq!(record.tasks()[0].id(), b.id());
        let entry = &record.history()[0];
        assert_eq!(entry.action(), "task-delete");
        assert_eq!(entry.context()["item"]["text"], "buy milk");
        assert_eq!(store.get("arun").unwrap(), record);
    }

    #[tokio::test]
    async fn test_edit_task() {
        let (_, session) = session().await;
        let due = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let task = session.add_task("draft", Some(due)).await.unwrap();

        let edited = session
            .edit_task(task.id(), Some(""), DueEdit::Keep)
            .await
            .unwrap();
        assert_eq!(edited.text(), "draft");
        assert_eq!(edited.due(), Some("2025-03-01"));

        let new_due = NaiveDate::from_ymd_opt(2025, 4, 2).unwrap();
        let edited = session
            .edit_task(task.id(), Some("final"), DueEdit::Set(new_due))
            .await
            .unwrap();
        assert_eq!(edited.text(), "final");
        assert_eq!(edited.due(), Some("2025-04-02"));

        let edited = session
            .edit_task(task.id(), None, DueEdit::Clear)
            .await
            .unwrap();
        assert!(edited.due().is_none());
        assert_eq!(session.record().history()[0].action(), "task-edit");

        let e = session
            .edit_task("nope", None, DueEdit::Clear)
            .await
            .unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::NotFound));
    }

    #[tokio::test]
    async fn test_empty_task_is_rejected() {
        let (store, session) = session().await;
        let e = session.add_task("   ", None).await.unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Validation));
        assert!(store.get("arun").is_none());
        assert!(matches!(
            session.request_state(),
            RequestState::Failed {
                kind: RequestKind::Save,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_clear_tasks_keeps_items_in_history() {
        let (_, session) = session().await;
        session.add_task("a", None).await.unwrap();
        session.add_task("b", None).await.unwrap();
        assert_eq!(session.clear_tasks().await.unwrap(), 2);
        let record = session.record();
        assert!(record.tasks().is_empty());
        assert_eq!(record.history()[0].action(), "task-delete-all");
        assert_eq!(
            record.history()[0].context()["items"]
                .as_array()
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_add_transaction() {
        let (_, session) = session().await;
        let mut input = NewTransaction::new(TxnType::Expense, amt("40.25"));
        input.category = Some("  ".to_string());
        input.date = Some("2025-01-02".to_string());
        let added = session.add_transaction(input).await.unwrap();
        assert_eq!(added.transaction.category(), "General");
        assert_eq!(added.transaction.date(), "2025-01-02");
        assert!(added.balance.is_negative());

        let added = session
            .add_transaction(NewTransaction::new(TxnType::Income, amt("100.50")))
            .await
            .unwrap();
        assert_eq!(added.transaction.date(), utils::today());
        assert_eq!(added.balance, amt("60.25"));

        let history = session.record().history().to_vec();
        assert_eq!(history[0].action(), "txn-income");
        assert_eq!(history[0].context()["amount"], 100.5);
        assert_eq!(history[1].action(), "txn-expense");
        assert_eq!(history[1].context()["category"], "General");
    }

    #[tokio::test]
    async fn test_add_transaction_validation() {
        let (store, session) = session().await;
        for input in [
            NewTransaction::new(TxnType::Income, Amount::ZERO),
            NewTransaction::new(TxnType::Income, amt("-5")),
            NewTransaction::new(TxnType::Unknown, amt("5")),
            NewTransaction {
                date: Some("yesterday".to_string()),
                ..NewTransaction::new(TxnType::Expense, amt("5"))
            },
        ] {
            let e = session.add_transaction(input).await.unwrap_err();
            assert_eq!(error_type(&e), Some(ErrorType::Validation));
        }
        assert!(store.get("arun").is_none());
    }

    #[tokio::test]
    async fn test_delete_and_reset_transactions() {
        let (_, session) = session().await;
        let first = session
            .add_transaction(NewTransaction::new(TxnType::Income, amt("10")))
            .await
            .unwrap()
            .transaction;
        let second = session
            .add_transaction(NewTransaction::new(TxnType::Expense, amt("3")))
            .await
            .unwrap()
            .transaction;

        let deleted = session.delete_transaction(first.id()).await.unwrap();
        assert_eq!(deleted.id(), first.id());
        assert_eq!(session.record().transactions()[0].id(), second.id());
        let e = session.delete_transaction(first.id()).await.unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::NotFound));

        assert_eq!(session.reset_finance().await.unwrap(), 1);
        let record = session.record();
        assert!(record.transactions().is_empty());
        assert_eq!(record.history()[0].action(), "finance-reset");
        assert_eq!(record.history()[1].action(), "txn-delete");

        assert_eq!(session.clear_history().await.unwrap(), 4);
        assert!(session.record().history().is_empty());
    }

    #[tokio::test]
    async fn test_wipe_advances_revision() {
        let (store, session) = session().await;
        session.add_task("a", None).await.unwrap();
        let before = session.revision();
        session.wipe().await.unwrap();
        let stored = store.get("arun").unwrap();
        assert!(stored.is_empty());
        assert_eq!(stored.revision(), before + 1);
    }

    #[tokio::test]
    async fn test_failed_save_is_not_committed_but_backed_up() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let backup = Backup::in_dir(dir.path(), 3);
        let session = Session::open_strict("arun", store.clone(), Some(backup.clone()))
            .await
            .unwrap();
        session.add_task("kept", None).await.unwrap();

        store.set_offline(true);
        let e = session.add_task("lost", None).await.unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Remote));
        assert_eq!(session.record().tasks().len(), 1);

        let backups = backup.list("arun").await.unwrap();
        let newest: Record = utils::deserialize(backups.last().unwrap()).await.unwrap();
        assert_eq!(newest.tasks().len(), 2);
        assert_eq!(newest.tasks()[1].text(), "lost");
    }

    #[tokio::test]
    async fn test_stale_session_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let a = Session::open_strict("arun", store.clone(), None).await.unwrap();
        let b = Session::open_strict("arun", store.clone(), None).await.unwrap();

        a.add_task("from a", None).await.unwrap();
        let e = b.add_task("from b", None).await.unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Conflict));
        assert!(e.downcast_ref::<StaleRecord>().is_some());

        assert!(b.refresh().await.unwrap());
        b.add_task("from b", None).await.unwrap();
        let texts: Vec<_> = store
            .get("arun")
            .unwrap()
            .tasks()
            .iter()
            .map(|t| t.text().to_string())
            .collect();
        assert_eq!(texts, vec!["from a", "from b"]);
    }

    #[tokio::test]
    async fn test_open_degrades_but_open_strict_fails() {
        let store = Arc::new(MemoryStore::new());
        store.insert("arun", Record::new().with_revision(7));
        store.set_offline(true);

        let session = Session::open("arun", store.clone(), None).await.unwrap();
        assert_eq!(session.revision(), 0);

        let e = Session::open_strict("arun", store.clone(), None)
            .await
            .unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Remote));
    }

    #[tokio::test]
    async fn test_register() {
        let store = MemoryStore::new();
        assert_eq!(
            register(&store, " arun ").await.unwrap(),
            Registration::Created(1)
        );
        // An empty record still counts as existing
        assert_eq!(
            register(&store, "arun").await.unwrap(),
            Registration::AlreadyExists
        );
        let e = register(&store, "  ").await.unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Validation));

        store.set_offline(true);
        let e = register(&store, "bob").await.unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Remote));
    }

    /// Holds every save until a permit is released.
    struct GatedStore {
        inner: MemoryStore,
        gate: Semaphore,
    }

    #[async_trait::async_trait]
    impl Store for GatedStore {
        fn name(&self) -> &'static str {
            "gated"
        }

        async fn fetch(&self, username: &str) -> Result<Option<Record>> {
            self.inner.fetch(username).await
        }

        async fn save(&self, username: &str, record: &Record) -> Result<Record> {
            let _permit = self.gate.acquire().await?;
            self.inner.save(username, record).await
        }
    }

    async fn gated() -> (Arc<GatedStore>, Session) {
        let store = Arc::new(GatedStore {
            inner: MemoryStore::new(),
            gate: Semaphore::new(0),
        });
        let session = Session::open("arun", store.clone(), None).await.unwrap();
        (store, session)
    }

    async fn wait_until_pending(session: &Session) {
        for _ in 0..1000 {
            if session.request_state().is_pending() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("the request never became pending");
    }

    #[tokio::test]
    async fn test_busy_while_save_is_pending() {
        let (store, session) = gated().await;
        let background = session.clone();
        let handle = tokio::spawn(async move { background.add_task("first", None).await });
        wait_until_pending(&session).await;

        let e = session.add_task("second", None).await.unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Busy));
        assert!(e.downcast_ref::<Busy>().is_some());
        let e = session.refresh().await.unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Busy));

        store.gate.add_permits(1);
        handle.await.unwrap().unwrap();
        assert!(matches!(
            session.request_state(),
            RequestState::Succeeded {
                kind: RequestKind::Save,
                ..
            }
        ));
        assert_eq!(session.record().tasks().len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_save_is_discarded() {
        let (store, session) = gated().await;
        let background = session.clone();
        let handle = tokio::spawn(async move { background.add_task("late", None).await });
        wait_until_pending(&session).await;

        assert!(session.cancel());
        store.gate.add_permits(1);
        let e = handle.await.unwrap().unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Conflict));
        assert!(session.record().tasks().is_empty());
        assert!(matches!(
            session.request_state(),
            RequestState::Cancelled { .. }
        ));
    }

    #[tokio::test]
    async fn test_dropped_request_is_abandoned() {
        let (store, session) = gated().await;
        let timed_out =
            tokio::time::timeout(Duration::from_millis(20), session.add_task("dropped", None))
                .await;
        assert!(timed_out.is_err());
        assert!(matches!(
            session.request_state(),
            RequestState::Cancelled { .. }
        ));

        // The next request is not blocked by the abandoned one
        store.gate.add_permits(1);
        session.add_task("next", None).await.unwrap();
        assert_eq!(session.record().tasks()[0].text(), "next");
    }
}
