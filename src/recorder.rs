//! Persists a trip: fixes from the broadcaster and snapshots from the
//! weather cache are queued to a single writer task for the open session.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::{
    broadcaster::{LocationBroadcaster, SubscriptionId},
    database::{Database, Session},
    errors::TrackerError,
    models::{Fix, SessionSummary, WeatherSnapshot},
};

enum Record {
    Fix(Fix),
    Weather(WeatherSnapshot),
    Close,
}

/// Writer counts, returned when the recorder finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub fixes: usize,
    pub weather: usize,
    pub failed: usize,
}

pub struct TripRecorder {
    db: Database,
    session: Session,
    broadcaster: LocationBroadcaster,
    subscription: SubscriptionId,
    tx: mpsc::UnboundedSender<Record>,
    writer: JoinHandle<WriteStats>,
}

impl TripRecorder {
    /// Open a new session and start recording fixes published to `broadcaster`
    pub async fn start(
        db: Database,
        broadcaster: &LocationBroadcaster,
        notes: Option<&str>,
    ) -> Result<Self, TrackerError> {
        let session = db.start_session(notes).await?;
        let (tx, rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(Self::write(db.clone(), session.id, rx));

        let fix_tx = tx.clone();
        let subscription = broadcaster.subscribe(move |fix| {
            if fix_tx.send(Record::Fix(*fix)).is_err() {
                debug!("Recorder closed, dropping fix");
            }
        });

        Ok(Self {
            db,
            session,
            broadcaster: broadcaster.clone(),
            subscription,
            tx,
            writer,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Hook for [`crate::weather::WeatherCache::set_refresh_hook`] that
    /// records every new snapshot against this session
    pub fn weather_hook(&self) -> impl Fn(&WeatherSnapshot) + Send + Sync + 'static {
        let tx = self.tx.clone();
        move |snapshot| {
            if tx.send(Record::Weather(snapshot.clone())).is_err() {
                debug!("Recorder closed, dropping weather snapshot");
            }
        }
    }

    async fn write(
        db: Database,
        session_id: i64,
        mut rx: mpsc::UnboundedReceiver<Record>,
    ) -> WriteStats {
        let mut stats = WriteStats::default();

        while let Some(record) = rx.recv().await {
            let result = match record {
                Record::Fix(fix) => db.log_fix(session_id, &fix).await.map(|_| stats.fixes += 1),
                Record::Weather(snapshot) => db
                    .log_weather(session_id, &snapshot)
                    .await
                    .map(|_| stats.weather += 1),
                Record::Close => break,
            };
            if let Err(e) = result {
                stats.failed += 1;
                error!("Failed to record for session {}: {}", session_id, e);
            }
        }

        stats
    }

    /// Stop recording, write everything already queued, end the session and
    /// summarise it.
    pub async fn finish(self) -> Result<(SessionSummary, WriteStats), TrackerError> {
        self.broadcaster.unsubscribe(self.subscription);
        // Hooks may still hold senders, so the writer is told to stop explicitly
        let _ = self.tx.send(Record::Close);

        let stats = match self.writer.await {
            Ok(stats) => stats,
            Err(e) => {
                error!("Recorder writer task failed: {}", e);
                WriteStats::default()
            }
        };

        self.db.end_session(self.session.id).await?;
        let summary = self.db.session_summary(self.session.id).await?;
        info!(
            "Session {} finished: {} fixes, {} weather samples, {} failed writes",
            self.session.id, stats.fixes, stats.weather, stats.failed
        );
        Ok((summary, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::models::WeatherParam;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    #[tokio::test]
    async fn records_fixes_and_weather() -> Result<(), TrackerError> {
        let temp_dir = tempdir().unwrap();
        let db = Database::connect(&DatabaseConfig {
            path: temp_dir.path().join("trips.db"),
        })
        .await?;
        let broadcaster = LocationBroadcaster::new();

        let recorder = TripRecorder::start(db.clone(), &broadcaster, Some("test")).await?;
        let session_id = recorder.session().id;
        let hook = recorder.weather_hook();

        for (n, lat) in [45.0, 45.001, 45.002].into_iter().enumerate() {
            let at = Utc.timestamp_opt(1_700_000_000 + n as i64, 0).unwrap();
            broadcaster.publish(Fix::new(lat, -122.0, 1.0, at)?);
        }
        let mut snapshot = WeatherSnapshot::empty(Utc::now());
        snapshot.record(WeatherParam::SigWaveFt, Utc::now(), 2.0);
        hook(&snapshot);

        let (summary, stats) = recorder.finish().await?;
        assert_eq!(stats, WriteStats { fixes: 3, weather: 1, failed: 0 });
        assert_eq!(summary.session_id, session_id);
        assert!(summary.distance_km > 0.2);
        assert!(summary.duration.is_some());
        assert_eq!(broadcaster.observer_count(), 0);

        let weather = db.weather_logs(session_id).await?;
        assert_eq!(weather.len(), 1);
        assert_eq!(weather[0].sig_wave_ft, Some(2.0));
        assert_eq!(weather[0].air_temp_f, None);

        // After finishing, nothing more is recorded
        hook(&snapshot);
        assert_eq!(db.weather_logs(session_id).await?.len(), 1);
        Ok(())
    }
}
