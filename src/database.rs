// src/database.rs
pub mod models;

use chrono::{DateTime, Utc};
use sqlx::{
    error::ErrorKind,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use tracing::{debug, error, info};

use crate::{
    config::DatabaseConfig,
    errors::TrackerError,
    geo,
    models::{Fix, NewCatch, NewGpsLog, SessionSummary, WeatherSnapshot},
};
pub use models::{CatchEntry, GpsLogEntry, Session, WeatherLogEntry};

const SESSION_COLUMNS: &str = "id, start_time, end_time, notes";

/// Append-only store for sessions and everything logged against them
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database file and apply migrations
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, TrackerError> {
        config.validate()?;
        info!("Opening database at {}", config.path.display());

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = match SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
        {
            Ok(pool) => pool,
            Err(e) => {
                error!("Failed to open database: {}", e);
                return Err(e.into());
            }
        };

        Self::new(pool).await
    }

    /// Wrap an existing pool, applying migrations.
    ///
    /// The pool must have foreign keys enabled for session references to be
    /// enforced.
    pub async fn new(pool: SqlitePool) -> Result<Self, TrackerError> {
        if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
            error!("Failed to create database tables: {}", e);
            return Err(e.into());
        }
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a new open session starting now
    pub async fn start_session(&self, notes: Option<&str>) -> Result<Session, TrackerError> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "INSERT INTO sessions (start_time, notes) VALUES (?1, ?2) RETURNING {SESSION_COLUMNS}"
        ))
        .bind(Utc::now())
        .bind(notes)
        .fetch_one(&self.pool)
        .await?;

        info!("Started session {}", session.id);
        Ok(session)
    }

    /// Set the session's end time to now
    pub async fn end_session(&self, session_id: i64) -> Result<Session, TrackerError> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "UPDATE sessions SET end_time = ?1 WHERE id = ?2 RETURNING {SESSION_COLUMNS}"
        ))
        .bind(Utc::now())
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(TrackerError::SessionNotFound(session_id))?;

        info!("Ended session {}", session.id);
        Ok(session)
    }

    pub async fn get_session(&self, session_id: i64) -> Result<Session, TrackerError> {
        sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(TrackerError::SessionNotFound(session_id))
    }

    /// All sessions, newest first
    pub async fn list_sessions(&self) -> Result<Vec<Session>, TrackerError> {
        let sessions = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY start_time DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    /// Delete a session together with its fixes, catches and weather rows.
    /// Returns false if it did not exist.
    pub async fn delete_session(&self, session_id: i64) -> Result<bool, TrackerError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Append a GPS sample
    pub async fn log_gps(&self, session_id: i64, entry: NewGpsLog) -> Result<i64, TrackerError> {
        let result = sqlx::query(
            "INSERT INTO gps_logs (
                session_id, timestamp, latitude, longitude, speed_mps, est_depth_m
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(session_id)
        .bind(entry.timestamp.unwrap_or_else(Utc::now))
        .bind(entry.latitude)
        .bind(entry.longitude)
        .bind(entry.speed_mps)
        .bind(entry.est_depth_m)
        .execute(&self.pool)
        .await
        .map_err(|e| reference_error(e, session_id))?;

        debug!("Logged GPS sample for session {}", session_id);
        Ok(result.last_insert_rowid())
    }

    /// Append a fix at its own timestamp
    pub async fn log_fix(&self, session_id: i64, fix: &Fix) -> Result<i64, TrackerError> {
        self.log_gps(session_id, NewGpsLog::from(fix)).await
    }

    /// Append a catch
    pub async fn log_catch(&self, session_id: i64, catch: NewCatch) -> Result<i64, TrackerError> {
        let result = sqlx::query(
            "INSERT INTO catches (
                session_id, timestamp, species, length_cm, weight_kg,
                bait, notes, latitude, longitude
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(session_id)
        .bind(catch.timestamp.unwrap_or_else(Utc::now))
        .bind(&catch.species)
        .bind(catch.length_cm)
        .bind(catch.weight_kg)
        .bind(&catch.bait)
        .bind(&catch.notes)
        .bind(catch.latitude)
        .bind(catch.longitude)
        .execute(&self.pool)
        .await
        .map_err(|e| reference_error(e, session_id))?;

        info!("Logged {} for session {}", catch.species, session_id);
        Ok(result.last_insert_rowid())
    }

    /// Append a weather sample, timestamped now
    pub async fn log_weather(
        &self,
        session_id: i64,
        snapshot: &WeatherSnapshot,
    ) -> Result<i64, TrackerError> {
        self.log_weather_at(session_id, snapshot, Utc::now()).await
    }

    pub async fn log_weather_at(
        &self,
        session_id: i64,
        snapshot: &WeatherSnapshot,
        timestamp: DateTime<Utc>,
    ) -> Result<i64, TrackerError> {
        let result = sqlx::query(
            "INSERT INTO weather_logs (
                session_id, timestamp, observed_at,
                wind_speed_mph, wind_gust_mph, wind_direction_deg, air_temp_f,
                sig_wave_ft, dominant_wave_period_s, dominant_wave_direction_deg, max_wave_ft
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(session_id)
        .bind(timestamp)
        .bind(snapshot.observed_at)
        .bind(snapshot.wind_speed_mph())
        .bind(snapshot.wind_gust_mph())
        .bind(snapshot.wind_direction_deg())
        .bind(snapshot.air_temp_f())
        .bind(snapshot.sig_wave_ft())
        .bind(snapshot.dominant_wave_period_s())
        .bind(snapshot.dominant_wave_direction_deg())
        .bind(snapshot.max_wave_ft())
        .execute(&self.pool)
        .await
        .map_err(|e| reference_error(e, session_id))?;

        debug!("Logged weather for session {}", session_id);
        Ok(result.last_insert_rowid())
    }

    /// Logged fixes in time order
    pub async fn gps_track(&self, session_id: i64) -> Result<Vec<GpsLogEntry>, TrackerError> {
        let rows = sqlx::query_as::<_, GpsLogEntry>(
            "SELECT id, session_id, timestamp, latitude, longitude, speed_mps, est_depth_m
             FROM gps_logs WHERE session_id = ?1 ORDER BY timestamp, id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn catches(&self, session_id: i64) -> Result<Vec<CatchEntry>, TrackerError> {
        let rows = sqlx::query_as::<_, CatchEntry>(
            "SELECT id, session_id, timestamp, species, length_cm, weight_kg,
                    bait, notes, latitude, longitude
             FROM catches WHERE session_id = ?1 ORDER BY timestamp, id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn weather_logs(&self, session_id: i64) -> Result<Vec<WeatherLogEntry>, TrackerError> {
        let rows = sqlx::query_as::<_, WeatherLogEntry>(
            "SELECT id, session_id, timestamp, observed_at,
                    wind_speed_mph, wind_gust_mph, wind_direction_deg, air_temp_f,
                    sig_wave_ft, dominant_wave_period_s, dominant_wave_direction_deg, max_wave_ft
             FROM weather_logs WHERE session_id = ?1 ORDER BY timestamp, id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Catch count, distance travelled and duration of one session
    pub async fn session_summary(&self, session_id: i64) -> Result<SessionSummary, TrackerError> {
        let session = self.get_session(session_id).await?;

        let catch_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM catches WHERE session_id = ?1")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await?;

        let track: Vec<(f64, f64)> = sqlx::query_as(
            "SELECT latitude, longitude FROM gps_logs
             WHERE session_id = ?1 ORDER BY timestamp, id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(SessionSummary {
            session_id,
            catch_count,
            distance_km: geo::track_length_km(track),
            duration: session.end_time.map(|end| end - session.start_time),
        })
    }

    /// Species logged so far, ordered ignoring case
    pub async fn distinct_species(&self) -> Result<Vec<String>, TrackerError> {
        let species = sqlx::query_scalar(
            "SELECT DISTINCT species FROM catches ORDER BY LOWER(species), species",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(species)
    }

    /// Baits logged so far, ordered ignoring case
    pub async fn distinct_baits(&self) -> Result<Vec<String>, TrackerError> {
        let baits = sqlx::query_scalar(
            "SELECT DISTINCT bait FROM catches WHERE bait IS NOT NULL
             ORDER BY LOWER(bait), bait",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(baits)
    }

    /// Checkpoint the write-ahead log into the main database file
    pub async fn checkpoint(&self) -> Result<(), TrackerError> {
        sqlx::query("PRAGMA wal_checkpoint(PASSIVE)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Checkpoint and close all connections
    pub async fn close(&self) -> Result<(), TrackerError> {
        self.checkpoint().await?;
        self.pool.close().await;
        Ok(())
    }
}

/// Map a foreign key violation on insert to the missing session
fn reference_error(e: sqlx::Error, session_id: i64) -> TrackerError {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.kind() == ErrorKind::ForeignKeyViolation
            || db_err.message().contains("FOREIGN KEY constraint failed")
        {
            return TrackerError::SessionNotFound(session_id);
        }
    }
    e.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use tempfile::tempdir;

    async fn open(dir: &tempfile::TempDir) -> Result<Database, TrackerError> {
        Database::connect(&DatabaseConfig {
            path: dir.path().join("test.db"),
        })
        .await
    }

    #[tokio::test]
    async fn test_start_and_end_session() -> Result<(), TrackerError> {
        let temp_dir = tempdir().unwrap();
        let db = open(&temp_dir).await?;

        let session = db.start_session(Some("debug session")).await?;
        assert!(session.is_open());
        assert_eq!(session.notes.as_deref(), Some("debug session"));

        let ended = db.end_session(session.id).await?;
        assert_eq!(ended.id, session.id);
        assert_eq!(ended.start_time, session.start_time);
        assert!(ended.end_time.unwrap() >= ended.start_time);
        Ok(())
    }

    #[tokio::test]
    async fn test_end_unknown_session() -> Result<(), TrackerError> {
        let temp_dir = tempdir().unwrap();
        let db = open(&temp_dir).await?;

        assert!(matches!(
            db.end_session(42).await,
            Err(TrackerError::SessionNotFound(42))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_wal_journal_mode() -> Result<(), TrackerError> {
        let temp_dir = tempdir().unwrap();
        let db = open(&temp_dir).await?;

        let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
            .fetch_one(db.pool())
            .await?;
        assert_eq!(mode.to_lowercase(), "wal");
        db.close().await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_log_catch() -> Result<(), TrackerError> {
        let temp_dir = tempdir().unwrap();
        let db = open(&temp_dir).await?;
        let session = db.start_session(None).await?;

        let mut catch = NewCatch::new("trout").at(45.0, -122.0).bait("Worm");
        catch.length_cm = Some(81.3);
        db.log_catch(session.id, catch).await?;

        let catches = db.catches(session.id).await?;
        assert_eq!(catches.len(), 1);
        assert_eq!(catches[0].species, "trout");
        assert_eq!(catches[0].length_cm, Some(81.3));
        assert_eq!(catches[0].bait.as_deref(), Some("Worm"));
        Ok(())
    }

    #[tokio::test]
    async fn test_distinct_species_and_baits() -> Result<(), TrackerError> {
        let temp_dir = tempdir().unwrap();
        let db = open(&temp_dir).await?;
        let session = db.start_session(None).await?;

        for (species, bait) in [
            ("walleye", Some("Minnow")),
            ("Bass", Some("crankbait")),
            ("perch", None),
            ("Bass", Some("Minnow")),
        ] {
            let mut catch = NewCatch::new(species);
            catch.bait = bait.map(str::to_string);
            db.log_catch(session.id, catch).await?;
        }

        assert_eq!(db.distinct_species().await?, vec!["Bass", "perch", "walleye"]);
        assert_eq!(db.distinct_baits().await?, vec!["crankbait", "Minnow"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_summary_of_open_session() -> Result<(), TrackerError> {
        let temp_dir = tempdir().unwrap();
        let db = open(&temp_dir).await?;
        let session = db.start_session(None).await?;
        db.log_catch(session.id, NewCatch::new("perch")).await?;

        let summary = db.session_summary(session.id).await?;
        assert_eq!(summary.catch_count, 1);
        assert_eq!(summary.distance_km, 0.0);
        assert_eq!(summary.duration, None);
        Ok(())
    }
}
