use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// PostgreSQL connection URL.
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    /// HS256 secret bearer tokens are verified with.
    pub jwt_secret: String,
    pub event_bus_capacity: usize,
    /// Log level (e.g., "info", "debug", "trace").
    pub log_level: String,
    /// Base URL of the page capture service.
    pub capture_url: String,
    /// Base URL pages are rendered from for capture.
    pub page_render_url: String,
    pub capture_timeout: Duration,
    /// Idle time before a project's thumbnail queue task retires.
    pub thumbnail_idle: Duration,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source, applying defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let or = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        Ok(Self {
            host: or("HOST", "0.0.0.0"),
            port: parse(&lookup, "PORT", 3030)?,
            database_url: lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            db_max_connections: parse(&lookup, "DB_MAX_CONNECTIONS", 20)?,
            db_min_connections: parse(&lookup, "DB_MIN_CONNECTIONS", 5)?,
            jwt_secret: or("JWT_SECRET", "dev-secret-change-me-in-production"),
            event_bus_capacity: parse(&lookup, "EVENT_BUS_CAPACITY", 1024)?,
            log_level: or("LOG_LEVEL", "info"),
            capture_url: or("CAPTURE_URL", "http://localhost:7777"),
            page_render_url: or("PAGE_RENDER_URL", "http://localhost:3000"),
            capture_timeout: Duration::from_secs(parse(&lookup, "CAPTURE_TIMEOUT_SECS", 30)?),
            thumbnail_idle: Duration::from_secs(parse(&lookup, "THUMBNAIL_IDLE_SECS", 60)?),
        })
    }

    /// Build the socket address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}
