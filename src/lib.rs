pub mod aggregate;
pub mod api;
pub mod args;
mod backup;
pub mod commands;
mod config;
pub mod error;
pub mod model;
pub mod render;
pub mod server;
pub mod session;
mod utils;


pub use backup::Backup;
pub use config::{Config, SettingsSummary, SettingsUpdate};
pub use error::Error;
pub use error::Result;
