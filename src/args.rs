//! These structs provide the CLI interface for the finsight CLI.

use crate::api::Backend;
use crate::model::TxnType;
use crate::render::OutputFormat;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// finsight: track your to-do tasks, income and expenses from the command line.
///
/// Each user has one JSON record holding their tasks, transactions and an activity history. The
/// record lives in a local directory by default. It can also be kept in a GitHub repository,
/// written through the GitHub Contents API, a repository_dispatch workflow, or a finsight proxy
/// (see `finsight serve`).
///
/// Start with `finsight init`, then `finsight register <name>` and `finsight login <name>`.
#[derive(Debug, Parser, Clone)]
#[command(version)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the data directory and initialize the configuration file.
    ///
    /// This is the first command you should run. By default the data directory is
    /// $HOME/finsight, pass --finsight-home to put it somewhere else.
    Init(InitArgs),
    /// Show the settings, or change them when any option is given.
    Settings(SettingsArgs),
    /// Create an empty record for a new user.
    Register(UserArgs),
    /// Make a user the active user. The user must already exist.
    Login(UserArgs),
    /// Forget the active user.
    Logout,
    /// Print the active user.
    Whoami,
    /// Add, edit, toggle, delete or list tasks.
    Task(TaskArgs),
    /// Add, delete or list income and expense transactions.
    Txn(TxnArgs),
    /// Show or clear the activity history.
    History(HistoryArgs),
    /// Show the dashboard: tasks, finances, charts and recent history.
    Summary(SummaryArgs),
    /// Erase everything stored for the active user and log out.
    DeleteUser(DeleteUserArgs),
    /// Serve the local user records over HTTP for `proxy` clients.
    Serve(ServeArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG. See the tracing-subscriber crate for instructions.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where finsight data and configuration is held. Defaults to ~/finsight
    #[arg(long, env = "FINSIGHT_HOME", default_value_t = default_finsight_home())]
    finsight_home: DisplayPath,

    /// Act as this user instead of the one saved by `finsight login`.
    #[arg(long, env = "FINSIGHT_USER")]
    user: Option<String>,

    /// A GitHub token to use instead of the one saved in the secrets directory.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: Option<String>,
}

impl Common {
    pub fn new(log_level: LevelFilter, finsight_home: PathBuf) -> Self {
        Self {
            log_level,
            finsight_home: finsight_home.into(),
            user: None,
            github_token: None,
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn finsight_home(&self) -> &DisplayPath {
        &self.finsight_home
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn github_token(&self) -> Option<&str> {
        self.github_token.as_deref()
    }
}

/// (Not shown): Args for the `finsight init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// Where user records are stored.
    #[arg(long, value_enum, default_value_t = Backend::Local)]
    backend: Backend,
}

impl InitArgs {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }
}

/// (Not shown): Args for the `finsight settings` command.
#[derive(Debug, Default, Parser, Clone)]
pub struct SettingsArgs {
    /// Where user records are stored.
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// The GitHub account that owns the data repository.
    #[arg(long)]
    pub owner: Option<String>,

    /// The GitHub repository that holds the records.
    #[arg(long)]
    pub repo: Option<String>,

    #[arg(long)]
    pub branch: Option<String>,

    /// The directory inside the repository that holds one JSON file per user.
    #[arg(long)]
    pub data_dir: Option<String>,

    /// The base URL of a finsight proxy. Pass an empty string to clear it.
    #[arg(long)]
    pub proxy_url: Option<String>,

    /// Save a GitHub token to the secrets directory. Pass an empty string to delete it.
    #[arg(long)]
    pub token: Option<String>,

    /// How many backup snapshots to keep per user. 0 disables backups.
    #[arg(long)]
    pub backup_copies: Option<u32>,

    /// How many history entries `summary` and `history` show.
    #[arg(long)]
    pub history_display: Option<usize>,

    /// The currency symbol shown before amounts.
    #[arg(long)]
    pub currency: Option<String>,

    #[arg(long)]
    pub request_timeout_secs: Option<u64>,
}

/// (Not shown): Args naming a user.
#[derive(Debug, Parser, Clone)]
pub struct UserArgs {
    username: String,
}

impl UserArgs {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }
}

/// (Not shown): Args for the `finsight task` command.
#[derive(Debug, Parser, Clone)]
pub struct TaskArgs {
    #[command(subcommand)]
    entity: TaskSubcommand,
}

impl TaskArgs {
    pub fn new(entity: TaskSubcommand) -> Self {
        Self { entity }
    }

    pub fn entity(&self) -> &TaskSubcommand {
        &self.entity
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum TaskSubcommand {
    /// Add a task.
    Add(TaskAddArgs),
    /// Change a task's text or due date.
    Edit(TaskEditArgs),
    /// Mark a task done, or not done if it already is.
    Toggle(IdArgs),
    /// Delete a task.
    Delete(IdArgs),
    /// Delete every task.
    Clear,
    /// List the tasks.
    List(ListArgs),
}

/// (Not shown): Args for `finsight task add`.
#[derive(Debug, Parser, Clone)]
pub struct TaskAddArgs {
    /// What needs doing.
    pub text: String,

    /// The due date, YYYY-MM-DD.
    #[arg(long)]
    pub due: Option<NaiveDate>,
}

/// (Not shown): Args for `finsight task edit`.
#[derive(Debug, Parser, Clone)]
pub struct TaskEditArgs {
    /// The task id, as shown by `finsight task list`.
    pub id: String,

    /// The new text. Empty keeps the current text.
    #[arg(long)]
    pub text: Option<String>,

    /// The new due date, YYYY-MM-DD.
    #[arg(long, conflicts_with = "clear_due")]
    pub due: Option<NaiveDate>,

    /// Remove the due date.
    #[arg(long)]
    pub clear_due: bool,
}

/// (Not shown): Args addressing a task or transaction by id.
#[derive(Debug, Parser, Clone)]
pub struct IdArgs {
    pub id: String,
}

/// (Not shown): Args for list commands.
#[derive(Debug, Default, Parser, Clone)]
pub struct ListArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// (Not shown): Args for the `finsight txn` command.
#[derive(Debug, Parser, Clone)]
pub struct TxnArgs {
    #[command(subcommand)]
    entity: TxnSubcommand,
}

impl TxnArgs {
    pub fn new(entity: TxnSubcommand) -> Self {
        Self { entity }
    }

    pub fn entity(&self) -> &TxnSubcommand {
        &self.entity
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum TxnSubcommand {
    /// Record an income or an expense.
    Add(TxnAddArgs),
    /// Delete a transaction.
    Delete(IdArgs),
    /// Delete every transaction.
    Reset,
    /// List the transactions.
    List(ListArgs),
}

/// (Not shown): Args for `finsight txn add`.
#[derive(Debug, Parser, Clone)]
pub struct TxnAddArgs {
    /// income or expense
    #[arg(value_enum)]
    pub kind: TxnType,

    /// The amount, greater than zero. A leading currency symbol and thousands separators are
    /// accepted.
    pub amount: String,

    /// Defaults to General.
    #[arg(long)]
    pub category: Option<String>,

    /// YYYY-MM-DD, defaults to today.
    #[arg(long)]
    pub date: Option<String>,

    #[arg(long)]
    pub note: Option<String>,
}

/// (Not shown): Args for the `finsight history` command.
#[derive(Debug, Default, Parser, Clone)]
pub struct HistoryArgs {
    /// How many entries to show. Defaults to the history_display setting.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Erase the history instead of showing it.
    #[arg(long)]
    pub clear: bool,
}

/// (Not shown): Args for the `finsight summary` command.
#[derive(Debug, Default, Parser, Clone)]
pub struct SummaryArgs {
    /// text or json
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// (Not shown): Args for the `finsight delete-user` command.
#[derive(Debug, Default, Parser, Clone)]
pub struct DeleteUserArgs {
    /// Confirm that everything stored for the user should be erased.
    #[arg(long)]
    pub yes: bool,
}

/// (Not shown): Args for the `finsight serve` command.
#[derive(Debug, Parser, Clone)]
pub struct ServeArgs {
    /// The address to listen on.
    #[arg(long, default_value = "127.0.0.1:8787")]
    pub addr: SocketAddr,
}

fn default_finsight_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("finsight"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --finsight-home or FINSIGHT_HOME instead of relying on the \
                default finsight home directory. If you continue using the program right now, \
                you may have problems!",
            );
            PathBuf::from("finsight")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("finsight").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_txn_add() {
        let args = parse(&[
            "--finsight-home",
            "/tmp/fs",
            "txn",
            "add",
            "expense",
            "₹1,250.50",
            "--category",
            "food",
        ]);
        assert_eq!(args.common().finsight_home().path(), Path::new("/tmp/fs"));
        let Command::Txn(txn) = args.command() else {
            panic!("expected txn, got {:?}", args.command());
        };
        let TxnSubcommand::Add(add) = txn.entity() else {
            panic!("expected add");
        };
        assert_eq!(add.kind, TxnType::Expense);
        assert_eq!(add.amount, "₹1,250.50");
        assert_eq!(add.category.as_deref(), Some("food"));
        assert!(add.date.is_none());
    }

    #[test]
    fn test_task_edit_due_conflicts_with_clear() {
        let result = Args::try_parse_from([
            "finsight",
            "task",
            "edit",
            "abc",
            "--due",
            "2025-01-01",
            "--clear-due",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(Args::try_parse_from(["finsight", "txn", "add", "unknown", "5"]).is_err());
    }

    #[test]
    fn test_summary_format() {
        let args = parse(&["--log-level", "debug", "summary", "--format", "json"]);
        assert_eq!(args.common().log_level(), LevelFilter::DEBUG);
        let Command::Summary(summary) = args.command() else {
            panic!("expected summary");
        };
        assert_eq!(summary.format, OutputFormat::Json);
    }
}
