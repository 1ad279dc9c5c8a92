//! Commands that create, select and erase users.

use crate::args::{DeleteUserArgs, UserArgs};
use crate::commands::{current_user, open_store, write_session, Out};
use crate::error::{tag, ErrorType, IntoResult};
use crate::session::{self, Registration};
use crate::{Config, Result};
use anyhow::{anyhow, Context};

/// Creates an empty record for a new user. An existing user is left untouched.
pub async fn register(config: Config, args: UserArgs) -> Result<Out<String>> {
    let store = open_store(&config).await?;
    let username = session::validate_username(args.username())?;
    match session::register(store.as_ref(), &username).await? {
        Registration::Created(_) => Ok(Out::new(
            format!("Registered '{username}'. Run 'finsight login {username}' to use it"),
            username,
        )),
        Registration::AlreadyExists => Err(anyhow!(
            "The user '{username}' already exists. Run 'finsight login {username}' instead"
        ))
        .pub_result(ErrorType::Validation),
    }
}

/// Makes an existing user the active user.
pub async fn login(config: Config, args: UserArgs) -> Result<Out<String>> {
    let store = open_store(&config).await?;
    let username = session::validate_username(args.username())?;
    let exists = store
        .fetch(&username)
        .await
        .with_context(|| format!("Unable to look up '{username}'"))
        .pub_result(session::store_error_type(store.as_ref()))?
        .is_some();
    if !exists {
        return Err(anyhow!(
            "The user '{username}' does not exist. Run 'finsight register {username}' first"
        ))
        .pub_result(ErrorType::NotFound);
    }
    config
        .set_active_user(Some(&username))
        .await
        .pub_result(ErrorType::Storage)?;
    Ok(Out::new(format!("Logged in as '{username}'"), username))
}

pub async fn logout(config: Config) -> Result<Out<()>> {
    let previous = config.active_user().await.pub_result(ErrorType::Storage)?;
    config
        .set_active_user(None)
        .await
        .pub_result(ErrorType::Storage)?;
    Ok(match previous {
        Some(username) => format!("Logged out '{username}'").into(),
        None => "Nobody was logged in".into(),
    })
}

/// Prints the user that commands act on.
pub async fn whoami(config: Config, user: Option<&str>) -> Result<Out<String>> {
    let username = current_user(&config, user).await?;
    Ok(Out::new("", username.clone()).with_view(username))
}

/// Overwrites the user's record with an empty one, then logs out if they were the active user.
pub async fn delete_user(
    config: Config,
    user: Option<&str>,
    args: DeleteUserArgs,
) -> Result<Out<String>> {
    let session = write_session(&config, user).await?;
    let username = session.username().to_string();
    if !args.yes {
        return Err(tag(
            anyhow!(
                "This erases every task, transaction and history entry of '{username}'. Pass \
                --yes to confirm"
            ),
            ErrorType::Validation,
        ));
    }
    session.wipe().await?;
    let active = config.active_user().await.pub_result(ErrorType::Storage)?;
    let mut message = format!("Deleted all data for '{username}'");
    if active.as_deref() == Some(username.as_str()) {
        config
            .set_active_user(None)
            .await
            .pub_result(ErrorType::Storage)?;
        message.push_str(" and logged out");
    }
    Ok(Out::new(message, username))
}
