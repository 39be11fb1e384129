//! Data models.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::TrackerError;

const KNOTS_PER_MPS: f64 = 1.94384;
const KMH_PER_MPS: f64 = 3.6;

/// Speed over ground, stored in metres per second.
///
/// Display units are derived on read and never stored.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Speed(f64);

impl Speed {
    pub const ZERO: Speed = Speed(0.0);

    /// Negative and non-finite readings clamp to zero.
    pub fn from_mps(mps: f64) -> Self {
        if mps.is_finite() && mps > 0.0 {
            Self(mps)
        } else {
            Self::ZERO
        }
    }

    pub fn mps(&self) -> f64 {
        self.0
    }

    pub fn knots(&self) -> f64 {
        self.0 * KNOTS_PER_MPS
    }

    pub fn kmh(&self) -> f64 {
        self.0 * KMH_PER_MPS
    }
}

/// One GPS sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    /// Latitude in WGS84 decimal degrees
    pub latitude: f64,
    /// Longitude in WGS84 decimal degrees
    pub longitude: f64,
    pub speed: Speed,
    pub timestamp: DateTime<Utc>,
}

impl Fix {
    /// Create a fix, rejecting coordinates that are not on the globe.
    pub fn new(
        latitude: f64,
        longitude: f64,
        speed_mps: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, TrackerError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(TrackerError::InvalidFix(format!(
                "latitude {latitude} out of range"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(TrackerError::InvalidFix(format!(
                "longitude {longitude} out of range"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
            speed: Speed::from_mps(speed_mps),
            timestamp,
        })
    }

    pub fn position(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

/// Buoy parameters polled from the remote data endpoint.
///
/// Declaration order is the polling order and the ordering of snapshot
/// values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherParam {
    WindSpeedMph,
    WindGustMph,
    WindDirectionDeg,
    AirTempF,
    SigWaveFt,
    DominantWavePeriodS,
    DominantWaveDirectionDeg,
    MaxWaveFt,
}

impl WeatherParam {
    pub const ALL: [WeatherParam; 8] = [
        WeatherParam::WindSpeedMph,
        WeatherParam::WindGustMph,
        WeatherParam::WindDirectionDeg,
        WeatherParam::AirTempF,
        WeatherParam::SigWaveFt,
        WeatherParam::DominantWavePeriodS,
        WeatherParam::DominantWaveDirectionDeg,
        WeatherParam::MaxWaveFt,
    ];

    /// Remote parameter id
    pub fn id(&self) -> u32 {
        match self {
            WeatherParam::WindSpeedMph => 56985,
            WeatherParam::WindGustMph => 56986,
            WeatherParam::WindDirectionDeg => 56987,
            WeatherParam::AirTempF => 56998,
            WeatherParam::SigWaveFt => 57009,
            WeatherParam::DominantWavePeriodS => 57010,
            WeatherParam::DominantWaveDirectionDeg => 57011,
            WeatherParam::MaxWaveFt => 57013,
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.id() == id)
    }

    /// Field name, also used as the weather log column name
    pub fn name(&self) -> &'static str {
        match self {
            WeatherParam::WindSpeedMph => "wind_speed_mph",
            WeatherParam::WindGustMph => "wind_gust_mph",
            WeatherParam::WindDirectionDeg => "wind_direction_deg",
            WeatherParam::AirTempF => "air_temp_f",
            WeatherParam::SigWaveFt => "sig_wave_ft",
            WeatherParam::DominantWavePeriodS => "dominant_wave_period_s",
            WeatherParam::DominantWaveDirectionDeg => "dominant_wave_direction_deg",
            WeatherParam::MaxWaveFt => "max_wave_ft",
        }
    }
}

impl fmt::Display for WeatherParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.id())
    }
}

/// The eight principal compass points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compass8 {
    N,
    NE,
    E,
    SE,
    S,
    SW,
    W,
    NW,
}

impl Compass8 {
    const POINTS: [Compass8; 8] = [
        Compass8::N,
        Compass8::NE,
        Compass8::E,
        Compass8::SE,
        Compass8::S,
        Compass8::SW,
        Compass8::W,
        Compass8::NW,
    ];

    /// Nearest compass point for any bearing, 0° included.
    ///
    /// Halfway bearings round to the even sector (22.5° is N, 67.5° is E).
    pub fn from_bearing(deg: f64) -> Self {
        let idx = (deg / 45.0).round_ties_even().rem_euclid(8.0) as usize;
        Self::POINTS[idx % 8]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Compass8::N => "N",
            Compass8::NE => "NE",
            Compass8::E => "E",
            Compass8::SE => "SE",
            Compass8::S => "S",
            Compass8::SW => "SW",
            Compass8::W => "W",
            Compass8::NW => "NW",
        }
    }
}

impl fmt::Display for Compass8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convert a buoy bearing to a compass point.
///
/// The buoy feed reports a missing direction as 0, so a bearing of exactly
/// 0° (or any multiple of 360°) is treated as unknown and yields `None`,
/// even though it is also a valid due-north reading. Use
/// [`Compass8::from_bearing`] where 0° must mean north.
pub fn deg_to_compass8(deg: Option<f64>) -> Option<Compass8> {
    let deg = deg.filter(|d| d.is_finite())?;
    if deg.rem_euclid(360.0) == 0.0 {
        return None;
    }
    Some(Compass8::from_bearing(deg))
}

/// Latest value of every buoy parameter
///
/// Parameters whose request failed are present with a `None` value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    values: BTreeMap<WeatherParam, Option<f64>>,
    /// Newest observation time across all populated parameters
    pub observed_at: Option<DateTime<Utc>>,
    /// When this snapshot was fetched
    pub fetched_at: DateTime<Utc>,
}

impl WeatherSnapshot {
    /// Snapshot with every parameter absent
    pub fn empty(fetched_at: DateTime<Utc>) -> Self {
        Self {
            values: WeatherParam::ALL.iter().map(|p| (*p, None)).collect(),
            observed_at: None,
            fetched_at,
        }
    }

    /// Record a sample, keeping `observed_at` at the newest timestamp seen
    pub fn record(&mut self, param: WeatherParam, observed_at: DateTime<Utc>, value: f64) {
        self.values.insert(param, Some(value));
        if self.observed_at.map_or(true, |t| observed_at > t) {
            self.observed_at = Some(observed_at);
        }
    }

    pub fn get(&self, param: WeatherParam) -> Option<f64> {
        self.values.get(&param).copied().flatten()
    }

    pub fn iter(&self) -> impl Iterator<Item = (WeatherParam, Option<f64>)> + '_ {
        self.values.iter().map(|(p, v)| (*p, *v))
    }

    /// Number of parameters with a value
    pub fn populated(&self) -> usize {
        self.values.values().filter(|v| v.is_some()).count()
    }

    pub fn wind_speed_mph(&self) -> Option<f64> {
        self.get(WeatherParam::WindSpeedMph)
    }

    pub fn wind_gust_mph(&self) -> Option<f64> {
        self.get(WeatherParam::WindGustMph)
    }

    pub fn wind_direction_deg(&self) -> Option<f64> {
        self.get(WeatherParam::WindDirectionDeg)
    }

    pub fn air_temp_f(&self) -> Option<f64> {
        self.get(WeatherParam::AirTempF)
    }

    pub fn sig_wave_ft(&self) -> Option<f64> {
        self.get(WeatherParam::SigWaveFt)
    }

    pub fn max_wave_ft(&self) -> Option<f64> {
        self.get(WeatherParam::MaxWaveFt)
    }

    pub fn dominant_wave_period_s(&self) -> Option<f64> {
        self.get(WeatherParam::DominantWavePeriodS)
    }

    pub fn dominant_wave_direction_deg(&self) -> Option<f64> {
        self.get(WeatherParam::DominantWaveDirectionDeg)
    }

    pub fn wind_direction_compass(&self) -> Option<Compass8> {
        deg_to_compass8(self.wind_direction_deg())
    }

    pub fn wave_direction_compass(&self) -> Option<Compass8> {
        deg_to_compass8(self.dominant_wave_direction_deg())
    }
}

/// GPS sample to append to a session's trace
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewGpsLog {
    pub latitude: f64,
    pub longitude: f64,
    pub speed_mps: Option<f64>,
    pub est_depth_m: Option<f64>,
    /// Defaults to now
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<&Fix> for NewGpsLog {
    fn from(fix: &Fix) -> Self {
        Self {
            latitude: fix.latitude,
            longitude: fix.longitude,
            speed_mps: Some(fix.speed.mps()),
            est_depth_m: None,
            timestamp: Some(fix.timestamp),
        }
    }
}

/// A fish caught
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewCatch {
    pub species: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub length_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub bait: Option<String>,
    pub notes: Option<String>,
    /// Defaults to now
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewCatch {
    pub fn new(species: impl Into<String>) -> Self {
        Self {
            species: species.into(),
            ..Default::default()
        }
    }

    pub fn at(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }

    pub fn bait(mut self, bait: impl Into<String>) -> Self {
        self.bait = Some(bait.into());
        self
    }
}

/// Totals for one session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_id: i64,
    pub catch_count: i64,
    /// Great-circle distance over the logged trace
    pub distance_km: f64,
    /// `None` while the session is open
    pub duration: Option<chrono::TimeDelta>,
}

impl SessionSummary {
    pub fn duration_hours(&self) -> Option<f64> {
        self.duration
            .map(|d| d.num_milliseconds() as f64 / 3_600_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn speed_units() {
        let speed = Speed::from_mps(1.5);
        assert!((speed.kmh() - 5.4).abs() < 1e-9);
        assert!((speed.knots() - 2.91576).abs() < 1e-9);
    }

    #[test]
    fn speed_never_negative() {
        assert_eq!(Speed::from_mps(-1.0), Speed::ZERO);
        assert_eq!(Speed::from_mps(f64::NAN), Speed::ZERO);
    }

    #[test]
    fn fix_rejects_off_globe_coordinates() {
        assert!(Fix::new(91.0, 0.0, 0.0, at(0)).is_err());
        assert!(Fix::new(0.0, -180.5, 0.0, at(0)).is_err());
        assert!(Fix::new(f64::NAN, 0.0, 0.0, at(0)).is_err());
        assert!(Fix::new(0.0, 0.0, 0.0, at(0)).is_ok());
    }

    #[test]
    fn param_ids_round_trip() {
        for param in WeatherParam::ALL {
            assert_eq!(WeatherParam::from_id(param.id()), Some(param));
        }
        assert_eq!(WeatherParam::from_id(1), None);
    }

    #[test]
    fn compass_northeast() {
        assert_eq!(deg_to_compass8(Some(45.0)), Some(Compass8::NE));
        assert_eq!(deg_to_compass8(Some(180.0)), Some(Compass8::S));
        assert_eq!(deg_to_compass8(Some(350.0)), Some(Compass8::N));
    }

    #[test]
    fn compass_zero_is_unknown() {
        assert_eq!(deg_to_compass8(Some(0.0)), None);
        assert_eq!(deg_to_compass8(Some(360.0)), None);
        assert_eq!(deg_to_compass8(None), None);
        assert_eq!(Compass8::from_bearing(0.0), Compass8::N);
    }

    #[test]
    fn compass_wraps_full_turns() {
        let mut deg = 0.0;
        while deg < 360.0 {
            let here = deg_to_compass8(Some(deg));
            assert_eq!(here, deg_to_compass8(Some(deg + 360.0)), "bearing {deg}");
            if deg > 0.0 {
                assert!(here.is_some(), "bearing {deg}");
            }
            deg += 7.5;
        }
    }

    #[test]
    fn compass_halfway_rounds_to_even() {
        assert_eq!(Compass8::from_bearing(22.5), Compass8::N);
        assert_eq!(Compass8::from_bearing(67.5), Compass8::E);
        assert_eq!(Compass8::from_bearing(-45.0), Compass8::NW);
    }

    #[test]
    fn snapshot_tracks_newest_observation() {
        let mut snapshot = WeatherSnapshot::empty(at(1000));
        snapshot.record(WeatherParam::SigWaveFt, at(500), 2.5);
        snapshot.record(WeatherParam::WindDirectionDeg, at(700), 90.0);
        snapshot.record(WeatherParam::AirTempF, at(600), 61.0);

        assert_eq!(snapshot.observed_at, Some(at(700)));
        assert_eq!(snapshot.populated(), 3);
        assert_eq!(snapshot.sig_wave_ft(), Some(2.5));
        assert_eq!(snapshot.max_wave_ft(), None);
        assert_eq!(snapshot.wind_direction_compass(), Some(Compass8::E));
        assert_eq!(snapshot.iter().count(), WeatherParam::ALL.len());
    }
}
