use crate::api::Backend;
use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the data directory, its subdirectories and an initial `config.json` file with default
/// settings.
///
/// # Arguments
/// - `finsight_home` - The directory that will be the root of data directory, e.g.
///   `$HOME/finsight`
/// - `backend` - Where user records are stored. Remote backends need more settings, which
///   `finsight settings` can set afterwards.
///
/// # Errors
/// - Returns an error if a config already exists or if any file operations fail.
pub async fn init(finsight_home: &Path, backend: Backend) -> Result<Out<()>> {
    let config = Config::create(finsight_home, backend)
        .await
        .context("Unable to create the data directory and configs")
        .pub_result(ErrorType::Config)?;
    let next = match backend {
        Backend::Local => "",
        Backend::Github | Backend::Dispatch => {
            ". Set the repository with 'finsight settings --owner <OWNER> --repo <REPO> --token \
            <TOKEN>'"
        }
        Backend::Proxy => ". Set the proxy with 'finsight settings --proxy-url <URL>'",
    };
    Ok(format!(
        "Created the finsight directory at '{}' using the {backend} backend{next}",
        config.root().display()
    )
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_twice_fails() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("finsight");
        let out = init(&home, Backend::Local).await.unwrap();
        assert!(out.message().contains("local backend"));
        let e = init(&home, Backend::Local).await.unwrap_err();
        assert_eq!(crate::error::error_type(&e), Some(ErrorType::Config));
        assert!(Config::load(&home).await.is_ok());
    }
}
