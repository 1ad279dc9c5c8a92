//! Configuration file handling for finsight.
//!
//! The configuration file is stored at `$FINSIGHT_HOME/config.json` and contains settings for
//! the application including which storage backend to use, the GitHub repository that holds the
//! remote records, backup settings and display preferences.

use crate::api::Backend;
use crate::backup::Backup;
use crate::{utils, Result};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const APP_NAME: &str = "finsight";
const CONFIG_VERSION: u8 = 1;
const BACKUP_COPIES: u32 = 5;
const HISTORY_DISPLAY: usize = 30;
const REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_OWNER: &str = "U-ARUN07";
const DEFAULT_REPO: &str = "FinSight";
const DEFAULT_BRANCH: &str = "main";
const DEFAULT_DATA_DIR: &str = "data/users";
const DEFAULT_CURRENCY: &str = "₹";
const SECRETS: &str = ".secrets";
const BACKUPS: &str = ".backups";
const USERS: &str = "users";
const TOKEN: &str = "token";
const CONFIG_JSON: &str = "config.json";
const SESSION_JSON: &str = "session.json";

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$FINSIGHT_HOME` and from there it loads `$FINSIGHT_HOME/config.json`. It provides
/// paths to other items that are either configurable or are expected in a certain location within
/// the finsight home directory.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    backups: PathBuf,
    secrets: PathBuf,
    users: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    token_override: Option<String>,
}

impl Config {
    /// Creates the data directory, its subdirectories and an initial `config.json` file with
    /// default settings, using `backend` as the storage backend.
    ///
    /// # Arguments
    /// - `dir` - The directory that will be the root of data directory, e.g. `$HOME/finsight`
    /// - `backend` - Where user records are stored.
    ///
    /// # Errors
    /// - Returns an error if a config file already exists in `dir`.
    /// - Returns an error if any file operations fail.
    pub async fn create(dir: impl Into<PathBuf>, backend: Backend) -> Result<Self> {
        // Create the directory if it does not exist
        let maybe_relative = dir.into();
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the finsight home directory")?;

        // Canonicalize the directory path
        let root = utils::canonicalize(&maybe_relative).await?;
        let config_path = root.join(CONFIG_JSON);
        if config_path.is_file() {
            bail!(
                "A config file already exists at '{}', use 'finsight settings' to change it",
                config_path.display()
            );
        }

        // Create the subdirectories
        let backups = root.join(BACKUPS);
        utils::make_dir(&backups).await?;
        let secrets = root.join(SECRETS);
        utils::make_dir(&secrets).await?;
        let users = root.join(USERS);
        utils::make_dir(&users).await?;

        // Create and save an initial ConfigFile in the datastore
        let config_file = ConfigFile {
            backend,
            ..ConfigFile::default()
        };
        config_file.save(&config_path).await?;

        Ok(Self {
            root,
            backups,
            secrets,
            users,
            config_path,
            config_file,
            token_override: None,
        })
    }

    /// This will
    /// - validate that the `finsight_home` exists and that the config file exists
    /// - load the config file
    /// - create the backups, secrets and users directories if they went missing
    /// - return the loaded configuration object
    pub async fn load(finsight_home: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = finsight_home.into();
        let root = utils::canonicalize(&maybe_relative)
            .await
            .context("The finsight home directory is missing, run 'finsight init'")?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!(
                "The config file is missing '{}', run 'finsight init'",
                config_path.display()
            )
        }
        let config_file = ConfigFile::load(&config_path).await?;

        let config = Self {
            root: root.clone(),
            backups: root.join(BACKUPS),
            secrets: root.join(SECRETS),
            users: root.join(USERS),
            config_path,
            config_file,
            token_override: None,
        };
        for dir in [&config.backups, &config.secrets, &config.users] {
            if !dir.is_dir() {
                debug!("Recreating missing directory {}", dir.display());
                utils::make_dir(dir).await?;
            }
        }
        Ok(config)
    }

    /// Uses `token` instead of the token file when it is `Some` and not blank. This is how
    /// `GITHUB_TOKEN` takes precedence.
    pub fn with_token_override(mut self, token: Option<String>) -> Self {
        self.token_override = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn backups(&self) -> &Path {
        &self.backups
    }

    pub fn secrets(&self) -> &Path {
        &self.secrets
    }

    /// The local user database used by `LocalStore`.
    pub fn users_dir(&self) -> &Path {
        &self.users
    }

    pub fn session_path(&self) -> PathBuf {
        self.root.join(SESSION_JSON)
    }

    pub fn backend(&self) -> Backend {
        self.config_file.backend
    }

    pub fn owner(&self) -> &str {
        &self.config_file.owner
    }

    pub fn repo(&self) -> &str {
        &self.config_file.repo
    }

    pub fn branch(&self) -> &str {
        &self.config_file.branch
    }

    pub fn data_dir(&self) -> &str {
        &self.config_file.data_dir
    }

    pub fn proxy_url(&self) -> Option<&str> {
        self.config_file
            .proxy_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
    }

    pub fn backup_copies(&self) -> u32 {
        self.config_file.backup_copies
    }

    pub fn history_display(&self) -> usize {
        self.config_file.history_display
    }

    pub fn currency(&self) -> &str {
        &self.config_file.currency
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config_file.request_timeout_secs.max(1))
    }

    /// Creates a new `Backup` instance for managing backup files.
    pub fn backup(&self) -> Backup {
        Backup::new(self)
    }

    /// Returns the stored `token_path` if it is absolute, otherwise resolves the relative path.
    pub fn token_path(&self) -> PathBuf {
        let p = self.config_file.token_path();
        if p.is_absolute() {
            return p;
        }
        self.root.join(p)
    }

    /// The GitHub access token: the override if there is one, otherwise the token file.
    /// `None` when neither is set.
    pub async fn token(&self) -> Result<Option<String>> {
        if let Some(token) = &self.token_override {
            return Ok(Some(token.clone()));
        }
        let path = self.token_path();
        if !path.is_file() {
            return Ok(None);
        }
        let token = utils::read(&path).await?.trim().to_string();
        Ok(Some(token).filter(|t| !t.is_empty()))
    }

    /// Writes the token file, readable only by the owner. An empty `token` deletes it.
    pub async fn save_token(&self, token: &str) -> Result<()> {
        let path = self.token_path();
        let token = token.trim();
        if token.is_empty() {
            if path.is_file() {
                utils::remove(&path).await?;
            }
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            utils::make_dir(parent).await?;
        }
        utils::write(&path, "").await?;
        utils::restrict_permissions(&path)?;
        utils::write(&path, token).await
    }

    /// Applies `update` and saves the config file.
    pub async fn update(&mut self, update: &SettingsUpdate) -> Result<()> {
        let file = &mut self.config_file;
        if let Some(backend) = update.backend {
            file.backend = backend;
        }
        set_string(&mut file.owner, &update.owner);
        set_string(&mut file.repo, &update.repo);
        set_string(&mut file.branch, &update.branch);
        set_string(&mut file.data_dir, &update.data_dir);
        set_string(&mut file.currency, &update.currency);
        if let Some(url) = &update.proxy_url {
            let url = url.trim();
            file.proxy_url = (!url.is_empty()).then(|| url.to_string());
        }
        if let Some(copies) = update.backup_copies {
            file.backup_copies = copies;
        }
        if let Some(n) = update.history_display {
            file.history_display = n;
        }
        if let Some(secs) = update.request_timeout_secs {
            anyhow::ensure!(secs > 0, "The request timeout must be at least one second");
            file.request_timeout_secs = secs;
        }
        self.config_file.save(&self.config_path).await
    }

    /// The username stored by `login`, if any.
    pub async fn active_user(&self) -> Result<Option<String>> {
        let path = self.session_path();
        if !path.is_file() {
            return Ok(None);
        }
        let file: SessionFile = utils::deserialize(&path).await?;
        Ok(Some(file.username).filter(|u| !u.trim().is_empty()))
    }

    /// Stores `username` as the active user, or forgets the active user when `None`.
    pub async fn set_active_user(&self, username: Option<&str>) -> Result<()> {
        let path = self.session_path();
        match username {
            Some(username) => {
                let data = serde_json::to_string_pretty(&SessionFile {
                    username: username.to_string(),
                })
                .context("Unable to serialize the session file")?;
                utils::write(&path, data).await
            }
            None if path.is_file() => utils::remove(&path).await,
            None => Ok(()),
        }
    }

    /// The settings as shown by `finsight settings`. The token itself is never included.
    pub async fn summary(&self) -> Result<SettingsSummary> {
        Ok(SettingsSummary {
            home: self.root.clone(),
            backend: self.backend(),
            owner: self.owner().to_string(),
            repo: self.repo().to_string(),
            branch: self.branch().to_string(),
            data_dir: self.data_dir().to_string(),
            proxy_url: self.proxy_url().map(str::to_string),
            backup_copies: self.backup_copies(),
            history_display: self.history_display(),
            currency: self.currency().to_string(),
            request_timeout_secs: self.config_file.request_timeout_secs,
            token_set: self.token().await?.is_some(),
        })
    }
}

fn set_string(field: &mut String, value: &Option<String>) {
    if let Some(value) = value {
        *field = value.trim().to_string();
    }
}

/// Changes requested by `finsight settings`. `None` leaves a setting unchanged.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct SettingsUpdate {
    pub backend: Option<Backend>,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub data_dir: Option<String>,
    /// An empty string clears the proxy URL.
    pub proxy_url: Option<String>,
    pub backup_copies: Option<u32>,
    pub history_display: Option<usize>,
    pub currency: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self == &SettingsUpdate::default()
    }
}

/// The effective settings, printed by `finsight settings`.
#[derive(Debug, Clone, Serialize)]
pub struct SettingsSummary {
    pub home: PathBuf,
    pub backend: Backend,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub data_dir: String,
    pub proxy_url: Option<String>,
    pub backup_copies: u32,
    pub history_display: usize,
    pub currency: String,
    pub request_timeout_secs: u64,
    pub token_set: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionFile {
    username: String,
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "finsight",
///   "config_version": 1,
///   "backend": "dispatch",
///   "owner": "U-ARUN07",
///   "repo": "FinSight",
///   "branch": "main",
///   "data_dir": "data/users",
///   "backup_copies": 5,
///   "history_display": 30,
///   "currency": "₹",
///   "request_timeout_secs": 30,
///   "token_path": ".secrets/token"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
struct ConfigFile {
    /// Application name, should always be "finsight"
    app_name: String,

    /// Configuration file version
    config_version: u8,

    /// Where user records are stored
    backend: Backend,

    /// GitHub repository owner, used by the github and dispatch backends
    owner: String,

    /// GitHub repository name
    repo: String,

    /// Branch holding the records
    branch: String,

    /// Directory inside the repository holding `{username}.json` files
    data_dir: String,

    /// Base URL of a finsight proxy, used by the proxy backend
    #[serde(skip_serializing_if = "Option::is_none")]
    proxy_url: Option<String>,

    /// Number of backup copies to keep per user
    backup_copies: u32,

    /// Number of history entries to show
    history_display: usize,

    /// Currency symbol used when printing amounts
    currency: String,

    /// Timeout for each HTTP request
    request_timeout_secs: u64,

    /// Path to the GitHub token file (optional, relative to config.json or absolute)
    /// Defaults to $FINSIGHT_HOME/.secrets/token if not specified
    #[serde(skip_serializing_if = "Option::is_none")]
    token_path: Option<PathBuf>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            backend: Backend::default(),
            owner: DEFAULT_OWNER.to_string(),
            repo: DEFAULT_REPO.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
            data_dir: DEFAULT_DATA_DIR.to_string(),
            proxy_url: None,
            backup_copies: BACKUP_COPIES,
            history_display: HISTORY_DISPLAY,
            currency: DEFAULT_CURRENCY.to_string(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            token_path: None,
        }
    }
}

impl ConfigFile {
    /// Loads a ConfigFile asynchronously from the specified path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;

        let config: ConfigFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))?;

        // Validate app_name
        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );

        Ok(config)
    }

    /// Saves the ConfigFile to the specified path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let p = path.as_ref();
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(p, data)
            .await
            .context("Unable to write config file")
    }

    /// Gets the token path.
    ///
    /// If the path is relative, it should be interpreted as relative to the config.json file.
    /// If None, defaults to $FINSIGHT_HOME/.secrets/token
    pub fn token_path(&self) -> PathBuf {
        self.token_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(SECRETS).join(TOKEN))
    }
}
