//! Environment handling for the customer service: `.env` loading, key lookup
//! and the typed [`AppConfig`].

pub mod config;

use std::{
    env,
    net::{AddrParseError, SocketAddr},
    path::PathBuf,
};

pub use config::{AppConfig, ConfigError, Environment};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_WRITE_DB_URL: &str = "sqlite://customers.db?mode=rwc";

/// Loads `.env` when one is found and returns its path.
///
/// A missing file is not an error; deployed builds configure the process environment directly.
pub fn load_env_file() -> Option<PathBuf> {
    dotenvy::dotenv().ok()
}

/// Resolves `APP_BIND_ADDR`, falling back to [`DEFAULT_BIND_ADDR`].
pub fn server_bind_address() -> Result<SocketAddr, AddrParseError> {
    first_env_value(&["APP_BIND_ADDR"])
        .as_deref()
        .unwrap_or(DEFAULT_BIND_ADDR)
        .parse()
}

/// Returns the first non-blank value among `keys`, trimmed.
///
/// Connection strings are accepted both as `WRITE_DB_CONNECTION_STRING` and in
/// the `WriteDbConnectionString` spelling.
pub fn first_env_value(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| env::var(key).ok())
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}
