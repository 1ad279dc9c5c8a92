//! Command handlers for the finsight CLI.
//!
//! This module contains implementations for all CLI subcommands. Each handler returns an `Out`
//! that `main` prints.

mod account;
mod history;
mod init;
mod serve;
mod settings;
mod summary;
mod task;
mod txn;

use crate::api::{self, Store};
use crate::error::{ErrorType, IntoResult};
use crate::session::Session;
use crate::{Config, Result};
use anyhow::anyhow;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, info};

pub use account::{delete_user, login, logout, register, whoami};
pub use history::history;
pub use init::init;
pub use serve::serve;
pub use settings::settings;
pub use summary::summary;
pub use task::{task_add, task_clear, task_delete, task_edit, task_list, task_toggle};
pub use txn::{txn_add, txn_delete, txn_list, txn_reset};

/// The output type for a command. This allows the command to return a consistent message,
/// optionally structured data, and optionally a view that is printed to stdout.
#[derive(Debug, Clone, Serialize)]
pub struct Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// A message that can be printed to the user regarding the outcome of the command execution.
    message: String,

    /// Any structured data that needs to be output from the call.
    structure: Option<T>,

    /// Text meant for stdout, e.g. a task list or the dashboard.
    #[serde(skip)]
    view: Option<String>,
}

impl<T, S> From<S> for Out<T>
where
    T: Debug + Clone + Serialize,
    S: Into<String>,
{
    fn from(value: S) -> Self {
        Out::new_message(value)
    }
}

impl<T> Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// Create a new `Out` object that has `Some(structure)`.
    pub fn new<S>(message: S, structure: T) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: Some(structure),
            view: None,
        }
    }

    /// Create a new `Out` object that has `None` for `structure`.
    pub fn new_message<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: None,
            view: None,
        }
    }

    /// Attaches text to print on stdout.
    pub fn with_view(mut self, view: impl Into<String>) -> Self {
        self.view = Some(view.into());
        self
    }

    /// Get the `message`.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the structured data stored in `structure`.
    pub fn structure(&self) -> Option<&T> {
        self.structure.as_ref()
    }

    pub fn view(&self) -> Option<&str> {
        self.view.as_deref()
    }

    /// Print the message to `info!`, the view (if it exists) to stdout and the structured data
    /// (if it exists) as JSON to `debug!`.
    pub fn print(&self) {
        if !self.message.is_empty() {
            info!("{}", self.message);
        }
        if let Some(view) = self.view() {
            print!("{view}");
            if !view.ends_with('\n') {
                println!();
            }
        }
        if let Some(structure) = self.structure() {
            if let Ok(json) = serde_json::to_string_pretty(structure) {
                debug!("Command output:\n\n{json}\n\n");
            }
        }
    }
}

/// The user a command acts on: `--user` when given, otherwise the user saved by `login`.
pub(crate) async fn current_user(config: &Config, user: Option<&str>) -> Result<String> {
    if let Some(user) = user.map(str::trim).filter(|u| !u.is_empty()) {
        return Ok(user.to_string());
    }
    config
        .active_user()
        .await
        .pub_result(ErrorType::Storage)?
        .ok_or_else(|| anyhow!("No user is logged in. Run 'finsight login <username>' first"))
        .pub_result(ErrorType::Config)
}

pub(crate) async fn open_store(config: &Config) -> Result<Arc<dyn Store>> {
    api::store(config).await.pub_result(ErrorType::Config)
}

/// Opens a session for reading. An unreadable store shows as an empty record.
pub(crate) async fn read_session(config: &Config, user: Option<&str>) -> Result<Session> {
    let username = current_user(config, user).await?;
    let store = open_store(config).await?;
    Session::open(&username, store, Some(config.backup())).await
}

/// Opens a session for changing the record. Fails when the store cannot be read, so a change is
/// never saved on top of a record that only looked empty.
pub(crate) async fn write_session(config: &Config, user: Option<&str>) -> Result<Session> {
    let username = current_user(config, user).await?;
    let store = open_store(config).await?;
    Session::open_strict(&username, store, Some(config.backup())).await
}
