//! Error types shared across the crate.
//!
//! Internally everything is an `anyhow::Error`. At the command boundary errors are tagged with an
//! `ErrorType` so that callers (and the exit path in `main`) can tell a configuration problem from
//! a conflict or a network failure without parsing messages.

use std::fmt::{Display, Formatter};

pub type Error = anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// The broad category of a failure that is surfaced to the user.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ErrorType {
    /// Missing or invalid settings, e.g. no owner/repo/token configured.
    Config,
    /// The user supplied something unusable, e.g. a zero amount or an empty username.
    Validation,
    /// A task or transaction id did not match anything in the record.
    NotFound,
    /// Reading or writing local files failed.
    Storage,
    /// A request to GitHub or the proxy failed.
    Remote,
    /// The record changed underneath us since it was loaded.
    Conflict,
    /// Another request is still in flight for this session.
    Busy,
    /// The proxy server failed.
    Server,
}

impl Display for ErrorType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorType::Config => "Configuration error",
            ErrorType::Validation => "Invalid input",
            ErrorType::NotFound => "Not found",
            ErrorType::Storage => "Storage error",
            ErrorType::Remote => "Remote error",
            ErrorType::Conflict => "Conflict",
            ErrorType::Busy => "Busy",
            ErrorType::Server => "Server error",
        };
        f.write_str(s)
    }
}

/// Tags a `Result` with an `ErrorType` so it can be recovered later with `error_type`.
pub trait IntoResult<T> {
    fn pub_result(self, error_type: ErrorType) -> Result<T>;
}

impl<T> IntoResult<T> for Result<T> {
    fn pub_result(self, error_type: ErrorType) -> Result<T> {
        self.map_err(|e| tag(e, error_type))
    }
}

/// Attaches `error_type` to `e` unless it already carries one.
pub fn tag(e: Error, error_type: ErrorType) -> Error {
    // Keep the innermost classification if one was already attached.
    if e.downcast_ref::<ErrorType>().is_some() {
        e
    } else {
        e.context(error_type)
    }
}

/// Returns the `ErrorType` attached by `pub_result`, if any.
pub fn error_type(e: &Error) -> Option<ErrorType> {
    e.downcast_ref::<ErrorType>().copied()
}

/// Returned by a `Store` when the record being saved was loaded at an older revision than the one
/// currently stored.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StaleRecord {
    pub username: String,
    /// The revision the caller loaded.
    pub expected: u64,
    /// The revision found in the store, when the store reports it.
    pub found: Option<u64>,
}

impl Display for StaleRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "The record for '{}' was changed elsewhere (loaded revision {}",
            self.username, self.expected
        )?;
        if let Some(found) = self.found {
            write!(f, ", stored revision {found}")?;
        }
        f.write_str("). Reload and try again.")
    }
}

impl std::error::Error for StaleRecord {}
