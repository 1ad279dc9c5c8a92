//! Income and expense commands.

use crate::args::{IdArgs, ListArgs, TxnAddArgs};
use crate::commands::{read_session, write_session, Out};
use crate::error::{ErrorType, IntoResult};
use crate::model::{Amount, Transaction};
use crate::render::{self, money, OutputFormat};
use crate::session::NewTransaction;
use crate::{Config, Result};
use anyhow::{anyhow, Context};
use std::str::FromStr;

/// Records an income or an expense and reports the resulting balance.
pub async fn txn_add(
    config: Config,
    user: Option<&str>,
    args: TxnAddArgs,
) -> Result<Out<Transaction>> {
    let amount = Amount::from_str(&args.amount)
        .map_err(|_| anyhow!("'{}' is not an amount", args.amount))
        .pub_result(ErrorType::Validation)?;
    let input = NewTransaction {
        category: args.category,
        date: args.date,
        note: args.note,
        ..NewTransaction::new(args.kind, amount)
    };
    let session = write_session(&config, user).await?;
    let added = session.add_transaction(input).await?;
    let t = &added.transaction;
    let currency = config.currency();
    let mut message = format!(
        "Added {} of {} in {} on {}. Balance {}",
        t.kind(),
        money(currency, t.amount()),
        t.category_or_default(),
        t.date(),
        money(currency, added.balance)
    );
    if added.balance.is_negative() {
        message.push_str(" (negative)");
    }
    Ok(Out::new(message, added.transaction))
}

pub async fn txn_delete(
    config: Config,
    user: Option<&str>,
    args: IdArgs,
) -> Result<Out<Transaction>> {
    let session = write_session(&config, user).await?;
    let t = session.delete_transaction(&args.id).await?;
    Ok(Out::new(
        format!(
            "Deleted the {} of {} on {}",
            t.kind(),
            money(config.currency(), t.amount()),
            t.date()
        ),
        t,
    ))
}

/// Deletes every transaction.
pub async fn txn_reset(config: Config, user: Option<&str>) -> Result<Out<usize>> {
    let session = write_session(&config, user).await?;
    let count = session.reset_finance().await?;
    Ok(Out::new(format!("Deleted {count} transactions"), count))
}

pub async fn txn_list(
    config: Config,
    user: Option<&str>,
    args: ListArgs,
) -> Result<Out<Vec<Transaction>>> {
    let session = read_session(&config, user).await?;
    let transactions = session.record().transactions().to_vec();
    let view = match args.format {
        OutputFormat::Text => render::transactions_text(&transactions, config.currency()),
        OutputFormat::Json => serde_json::to_string_pretty(&transactions)
            .context("Unable to serialize the transactions")
            .pub_result(ErrorType::Validation)?,
        OutputFormat::Csv => {
            render::transactions_csv(&transactions).pub_result(ErrorType::Validation)?
        }
    };
    Ok(Out::new("", transactions).with_view(view))
}
