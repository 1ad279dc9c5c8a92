use clap::Parser;
use finsight::args::{Args, Command, Common, TaskSubcommand, TxnSubcommand};
use finsight::error::{ErrorType, IntoResult};
use finsight::{commands, Config, Result};
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let common = args.common();
    let home = common.finsight_home().path();
    let user = common.user();

    // Route to appropriate command handler
    let _: () = match args.command() {
        Command::Init(init_args) => commands::init(home, init_args.backend()).await?.print(),

        Command::Settings(settings_args) => {
            let config = load_config(common).await?;
            commands::settings(config, settings_args.clone())
                .await?
                .print()
        }

        Command::Register(user_args) => {
            let config = load_config(common).await?;
            commands::register(config, user_args.clone()).await?.print()
        }

        Command::Login(user_args) => {
            let config = load_config(common).await?;
            commands::login(config, user_args.clone()).await?.print()
        }

        Command::Logout => commands::logout(load_config(common).await?)
            .await?
            .print(),

        Command::Whoami => commands::whoami(load_config(common).await?, user)
            .await?
            .print(),

        Command::Task(task_args) => {
            let config = load_config(common).await?;
            match task_args.entity() {
                TaskSubcommand::Add(args) => commands::task_add(config, user, args.clone())
                    .await?
                    .print(),
                TaskSubcommand::Edit(args) => commands::task_edit(config, user, args.clone())
                    .await?
                    .print(),
                TaskSubcommand::Toggle(args) => commands::task_toggle(config, user, args.clone())
                    .await?
                    .print(),
                TaskSubcommand::Delete(args) => commands::task_delete(config, user, args.clone())
                    .await?
                    .print(),
                TaskSubcommand::Clear => commands::task_clear(config, user).await?.print(),
                TaskSubcommand::List(args) => commands::task_list(config, user, args.clone())
                    .await?
                    .print(),
            }
        }

        Command::Txn(txn_args) => {
            let config = load_config(common).await?;
            match txn_args.entity() {
                TxnSubcommand::Add(args) => commands::txn_add(config, user, args.clone())
                    .await?
                    .print(),
                TxnSubcommand::Delete(args) => commands::txn_delete(config, user, args.clone())
                    .await?
                    .print(),
                TxnSubcommand::Reset => commands::txn_reset(config, user).await?.print(),
                TxnSubcommand::List(args) => commands::txn_list(config, user, args.clone())
                    .await?
                    .print(),
            }
        }

        Command::History(history_args) => {
            let config = load_config(common).await?;
            commands::history(config, user, history_args.clone())
                .await?
                .print()
        }

        Command::Summary(summary_args) => {
            let config = load_config(common).await?;
            commands::summary(config, user, summary_args.clone())
                .await?
                .print()
        }

        Command::DeleteUser(delete_args) => {
            let config = load_config(common).await?;
            commands::delete_user(config, user, delete_args.clone())
                .await?
                .print()
        }

        Command::Serve(serve_args) => {
            let config = load_config(common).await?;
            commands::serve(config, serve_args.clone()).await?.print()
        }
    };
    Ok(())
}

/// Loads the config from `--finsight-home`. A `--github-token` (or `GITHUB_TOKEN`) takes the place
/// of the saved token.
async fn load_config(common: &Common) -> Result<Config> {
    let config = Config::load(common.finsight_home().path())
        .await
        .pub_result(ErrorType::Config)?;
    Ok(config.with_token_override(common.github_token().map(str::to_string)))
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use default log level for this crate only.
            EnvFilter::new(format!(
                "{}={},{}={}",
                env!("CARGO_CRATE_NAME"),
                level,
                env!("CARGO_BIN_NAME"),
                level
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
