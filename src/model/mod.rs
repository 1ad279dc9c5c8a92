//! Types that represent the data model: a per-user `Record` holding `Task`s, `Transaction`s and
//! `HistoryEntry`s.
mod amount;
mod history;
mod record;
mod task;
mod transaction;

pub use amount::{Amount, AmountError};
pub use history::{Action, HistoryEntry};
pub use record::Record;
pub use task::Task;
pub use transaction::{Transaction, TxnType, DEFAULT_CATEGORY};
pub(crate) use transaction::parse_date;
