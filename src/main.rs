//! Fish tracker utility

use std::sync::Arc;

use fish_tracker::{
    broadcaster::LocationBroadcaster,
    config::AppConfig,
    database::Database,
    errors::TrackerError,
    location::{DeviceSource, FixFilter, LocationSource, SimulatedSource},
    recorder::TripRecorder,
    weather::{spawn_poller, HttpWeatherClient, WeatherCache},
};
use tokio::signal;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> Result<(), TrackerError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load configuration, preferring environment variables over config files
    let config = AppConfig::load()?;
    config.validate()?;

    let db = Database::connect(&config.database).await?;
    let broadcaster = LocationBroadcaster::new();

    let mut source: Box<dyn LocationSource> = if config.location.simulate {
        Box::new(SimulatedSource::from_config(&config.location))
    } else {
        // No platform provider is linked into this binary; the feed is dropped
        // and the tracker runs without fixes.
        warn!("No platform location provider available");
        let (source, _feed) = DeviceSource::new(FixFilter::from_config(&config.location));
        Box::new(source)
    };

    let recorder = TripRecorder::start(db.clone(), &broadcaster, None).await?;

    let mut cache = WeatherCache::new(
        HttpWeatherClient::new(&config.weather)?,
        config.weather.cache_interval,
    );
    cache.set_refresh_hook(recorder.weather_hook());
    let weather_token = cache.cancellation_token();
    let cache = Arc::new(Mutex::new(cache));
    let poller = spawn_poller(
        Arc::clone(&cache),
        config.weather.poll_interval,
        weather_token.clone(),
    );

    let speed_log = broadcaster.subscribe(|fix| {
        debug!(
            "Fix {:.6}, {:.6} at {:.2} kn",
            fix.latitude,
            fix.longitude,
            fix.speed.knots()
        );
    });
    source.start(&broadcaster);

    info!("Recording session {}, press Ctrl-C to stop", recorder.session().id);
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Received shutdown signal");

    source.stop();
    broadcaster.unsubscribe(speed_log);
    weather_token.cancel();
    if let Err(e) = poller.await {
        error!("Weather poller failed: {}", e);
    }

    let (summary, _) = recorder.finish().await?;
    info!(
        "Session {}: {} catches, {:.2} km, {}",
        summary.session_id,
        summary.catch_count,
        summary.distance_km,
        summary
            .duration_hours()
            .map(|h| format!("{h:.2} h"))
            .unwrap_or_else(|| "open".to_string())
    );

    db.close().await?;
    Ok(())
}
