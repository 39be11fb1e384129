//! Errors for the fish tracker
use thiserror::Error;

use crate::models::WeatherParam;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Configuration error")]
    ConfigError(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Serialization error")]
    SerdeError(#[from] serde_json::Error),

    #[error("IO error")]
    IoError(#[from] std::io::Error),

    #[error("HTTP client error")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid fix: {0}")]
    InvalidFix(String),

    #[error("Session {0} does not exist")]
    SessionNotFound(i64),

    #[error("Weather unavailable: all {failed} parameter requests failed")]
    WeatherUnavailable { failed: usize },

    #[error("Database migration error")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),
}

/// Failure to fetch a single weather parameter.
///
/// These never abort a refresh on their own; the parameter is recorded as
/// absent in the snapshot.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request for {param} failed")]
    Http {
        param: WeatherParam,
        #[source]
        origin: reqwest::Error,
    },

    #[error("API reported an error for {param}: {message}")]
    Api { param: WeatherParam, message: String },

    #[error("no samples returned for {param}")]
    NoData { param: WeatherParam },

    #[error("invalid sample timestamp {timestamp_ms} for {param}")]
    InvalidTimestamp {
        param: WeatherParam,
        timestamp_ms: i64,
    },
}

impl FetchError {
    pub fn param(&self) -> WeatherParam {
        match self {
            FetchError::Http { param, .. }
            | FetchError::Api { param, .. }
            | FetchError::NoData { param }
            | FetchError::InvalidTimestamp { param, .. } => *param,
        }
    }
}
