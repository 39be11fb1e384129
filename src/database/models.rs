// src/database/models.rs
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::WeatherParam;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Session {
    pub id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

impl Session {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct GpsLogEntry {
    pub id: i64,
    pub session_id: i64,
    pub timestamp: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub speed_mps: Option<f64>,
    pub est_depth_m: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct CatchEntry {
    pub id: i64,
    pub session_id: i64,
    pub timestamp: DateTime<Utc>,
    pub species: String,
    pub length_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub bait: Option<String>,
    pub notes: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct WeatherLogEntry {
    pub id: i64,
    pub session_id: i64,
    pub timestamp: DateTime<Utc>,
    pub observed_at: Option<DateTime<Utc>>,
    pub wind_speed_mph: Option<f64>,
    pub wind_gust_mph: Option<f64>,
    pub wind_direction_deg: Option<f64>,
    pub air_temp_f: Option<f64>,
    pub sig_wave_ft: Option<f64>,
    pub dominant_wave_period_s: Option<f64>,
    pub dominant_wave_direction_deg: Option<f64>,
    pub max_wave_ft: Option<f64>,
}

impl WeatherLogEntry {
    pub fn get(&self, param: WeatherParam) -> Option<f64> {
        match param {
            WeatherParam::WindSpeedMph => self.wind_speed_mph,
            WeatherParam::WindGustMph => self.wind_gust_mph,
            WeatherParam::WindDirectionDeg => self.wind_direction_deg,
            WeatherParam::AirTempF => self.air_temp_f,
            WeatherParam::SigWaveFt => self.sig_wave_ft,
            WeatherParam::DominantWavePeriodS => self.dominant_wave_period_s,
            WeatherParam::DominantWaveDirectionDeg => self.dominant_wave_direction_deg,
            WeatherParam::MaxWaveFt => self.max_wave_ft,
        }
    }
}
