//! Application configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;
use tracing::warn;

use crate::errors::TrackerError;

pub const DEFAULT_WEATHER_URL: &str = "https://www.wqdatalive.com";
pub const DEFAULT_PROJECT_ID: u32 = 55;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub location: LocationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WeatherConfig {
    pub base_url: String,
    pub project_id: u32,
    /// Per-request timeout
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub timeout: Duration,
    /// Non-forced refreshes within this window reuse the cached snapshot
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub cache_interval: Duration,
    /// Unconditional refresh period
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub poll_interval: Duration,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_WEATHER_URL.to_string(),
            project_id: DEFAULT_PROJECT_ID,
            timeout: Duration::from_secs(10),
            cache_interval: Duration::from_secs(600),
            poll_interval: Duration::from_secs(1800),
        }
    }
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LocationConfig {
    /// Produce a synthetic spiral instead of waiting for a device feed
    pub simulate: bool,
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub min_interval: Duration,
    pub min_distance_m: f64,
    pub origin_lat: f64,
    pub origin_lon: f64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            simulate: true,
            min_interval: Duration::from_millis(1000),
            min_distance_m: 1.0,
            origin_lat: 45.0,
            origin_lon: -122.0,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(
                Environment::with_prefix("FISHTRACKER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), TrackerError> {
        self.database.validate()?;
        self.weather.validate()?;
        self.location.validate()?;
        Ok(())
    }
}

impl DatabaseConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), TrackerError> {
        self.validate_path()?;
        if let Some(parent) = self.path.parent() {
            // A bare file name has an empty parent: the working directory
            if !parent.as_os_str().is_empty() {
                self.ensure_directory_exists(parent)?;
            }
        }
        Ok(())
    }

    fn validate_path(&self) -> Result<(), TrackerError> {
        if self.path.as_os_str().is_empty() {
            return Err(TrackerError::ConfigurationError {
                message: "Database path cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    fn ensure_directory_exists(&self, dir: &Path) -> Result<(), TrackerError> {
        if !dir.exists() {
            warn!("Database directory does not exist, attempting to create it");
            std::fs::create_dir_all(dir).map_err(|e| TrackerError::ConfigurationError {
                message: format!("Could not create database directory: {}", e),
            })?;
        }
        Ok(())
    }
}

impl WeatherConfig {
    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.base_url.trim().is_empty() {
            return Err(TrackerError::ConfigurationError {
                message: "Weather base URL cannot be empty".to_string(),
            });
        }
        for (name, value) in [
            ("timeout", self.timeout),
            ("cache_interval", self.cache_interval),
            ("poll_interval", self.poll_interval),
        ] {
            if value.is_zero() {
                return Err(TrackerError::ConfigurationError {
                    message: format!("Weather {name} must be greater than zero"),
                });
            }
        }
        Ok(())
    }

    /// Data endpoint for the configured project
    pub fn data_url(&self) -> String {
        format!(
            "{}/public/{}/data",
            self.base_url.trim_end_matches('/'),
            self.project_id
        )
    }
}

impl LocationConfig {
    pub fn validate(&self) -> Result<(), TrackerError> {
        if !(-90.0..=90.0).contains(&self.origin_lat)
            || !(-180.0..=180.0).contains(&self.origin_lon)
        {
            return Err(TrackerError::ConfigurationError {
                message: "Simulator origin is not a valid position".to_string(),
            });
        }
        if self.min_interval.is_zero() {
            return Err(TrackerError::ConfigurationError {
                message: "Location min_interval must be greater than zero".to_string(),
            });
        }
        if !self.min_distance_m.is_finite() || self.min_distance_m < 0.0 {
            return Err(TrackerError::ConfigurationError {
                message: "Minimum displacement cannot be negative".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_load_config() {
        env::set_var("FISHTRACKER__DATABASE__PATH", "/tmp/fishtracker-test.db");
        env::set_var("FISHTRACKER__WEATHER__PROJECT_ID", "77");
        env::set_var("FISHTRACKER__WEATHER__CACHE_INTERVAL", "60");
        env::set_var("FISHTRACKER__LOCATION__MIN_INTERVAL", "250");
        env::set_var("FISHTRACKER__LOCATION__SIMULATE", "false");

        let config = AppConfig::load().unwrap();
        assert_eq!(
            config.database.path,
            PathBuf::from("/tmp/fishtracker-test.db")
        );
        assert_eq!(config.weather.project_id, 77);
        assert_eq!(config.weather.cache_interval, Duration::from_secs(60));
        assert_eq!(config.weather.poll_interval, Duration::from_secs(1800));
        assert_eq!(config.location.min_interval, Duration::from_millis(250));
        assert!(!config.location.simulate);
    }

    #[test]
    fn test_database_config_validate() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("nested").join("trips.db"),
        };

        assert!(config.validate().is_ok());
        assert!(dir.path().join("nested").is_dir());
    }

    #[test]
    fn test_database_config_validate_invalid_path() {
        let config = DatabaseConfig {
            path: PathBuf::from(""),
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_weather_config_rejects_zero_interval() {
        let config = WeatherConfig {
            poll_interval: Duration::ZERO,
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_weather_data_url() {
        let config = WeatherConfig {
            base_url: "http://localhost:8080/".to_string(),
            ..Default::default()
        };

        assert_eq!(config.data_url(), "http://localhost:8080/public/55/data");
    }

    #[test]
    fn test_location_config_rejects_bad_origin() {
        let config = LocationConfig {
            origin_lat: 123.0,
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_location_config_rejects_zero_interval() {
        let config = LocationConfig {
            min_interval: Duration::ZERO,
            ..Default::default()
        };

        assert!(config.validate().is_err());
        assert!(LocationConfig::default().validate().is_ok());
    }
}
