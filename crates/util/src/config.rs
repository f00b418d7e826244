use std::{env, fmt, net::SocketAddr, time::Duration};

use super::{first_env_value, server_bind_address, DEFAULT_WRITE_DB_URL};

const DEFAULT_PROJECTION_INTERVAL_MS: u64 = 500;

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    /// Connection string of the write store (`WriteDbConnectionString`).
    pub write_db_url: String,
    /// Connection string of the read store; equals the write store unless overridden.
    pub read_db_url: String,
    pub projection_interval: Duration,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;

        let write_db_url = first_env_value(&[
            "WRITE_DB_CONNECTION_STRING",
            "WriteDbConnectionString",
        ])
        .unwrap_or_else(|| DEFAULT_WRITE_DB_URL.to_string());
        let read_db_url =
            first_env_value(&["READ_DB_CONNECTION_STRING", "ReadDbConnectionString"])
                .unwrap_or_else(|| write_db_url.clone());

        let projection_interval = match first_env_value(&["PROJECTION_INTERVAL_MS"]) {
            Some(raw) => parse_interval_ms(&raw)?,
            None => Duration::from_millis(DEFAULT_PROJECTION_INTERVAL_MS),
        };

        Ok(Self {
            bind_addr,
            environment,
            write_db_url,
            read_db_url,
            projection_interval,
        })
    }

    /// Returns `true` when reads are served from a different store than writes.
    pub fn has_separate_read_store(&self) -> bool {
        self.read_db_url != self.write_db_url
    }
}

fn parse_interval_ms(raw: &str) -> Result<Duration, ConfigError> {
    match raw.parse::<u64>() {
        Ok(0) | Err(_) => Err(ConfigError::InvalidProjectionInterval(raw.to_string())),
        Ok(value) => Ok(Duration::from_millis(value)),
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    InvalidProjectionInterval(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::InvalidProjectionInterval(value) => write!(
                f,
                "PROJECTION_INTERVAL_MS must be a positive number of milliseconds (got {value})"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
pub(crate) static ENV_GUARD: std::sync::LazyLock<std::sync::Mutex<()>> =
    std::sync::LazyLock::new(|| std::sync::Mutex::new(()));
