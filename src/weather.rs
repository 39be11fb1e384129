//! Buoy weather polling and caching
//!
//! Each refresh requests the newest sample of every [`WeatherParam`] from the
//! public data endpoint, one request per parameter. A parameter that fails is
//! recorded as absent; only a refresh that produces no data at all counts as
//! a failure, in which case the previous snapshot is kept.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::WeatherConfig,
    errors::{FetchError, TrackerError},
    models::{WeatherParam, WeatherSnapshot},
};

/// Newest reading of one parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub observed_at: DateTime<Utc>,
    pub value: f64,
}

#[async_trait]
pub trait WeatherClient: Send + Sync {
    async fn fetch_latest(&self, param: WeatherParam) -> Result<Sample, FetchError>;
}

/// Body returned by the data endpoint
///
/// `data` holds `[timestamp_ms, value]` pairs, oldest first. Values arrive
/// either as numbers or as numeric strings.
#[serde_as]
#[derive(Debug, Deserialize)]
struct DataResponse {
    #[serde(default)]
    #[serde_as(as = "Vec<(_, PickFirst<(_, DisplayFromStr)>)>")]
    data: Vec<(f64, f64)>,
    #[serde(default)]
    error: Option<String>,
}

impl DataResponse {
    fn latest(self, param: WeatherParam) -> Result<Sample, FetchError> {
        if let Some(message) = self.error.filter(|m| !m.is_empty()) {
            return Err(FetchError::Api { param, message });
        }
        let (timestamp_ms, value) = *self.data.last().ok_or(FetchError::NoData { param })?;
        let timestamp_ms = timestamp_ms as i64;
        let observed_at = DateTime::from_timestamp_millis(timestamp_ms)
            .ok_or(FetchError::InvalidTimestamp { param, timestamp_ms })?;
        Ok(Sample { observed_at, value })
    }
}

/// Client for the public buoy data endpoint
#[derive(Debug, Clone)]
pub struct HttpWeatherClient {
    client: Arc<Client>,
    url: String,
}

impl HttpWeatherClient {
    pub fn new(config: &WeatherConfig) -> Result<Self, TrackerError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client: Arc::new(client),
            url: config.data_url(),
        })
    }
}

#[async_trait]
impl WeatherClient for HttpWeatherClient {
    async fn fetch_latest(&self, param: WeatherParam) -> Result<Sample, FetchError> {
        debug!("Requesting {}", param);
        let http = |origin: reqwest::Error| FetchError::Http { param, origin };

        let response = self
            .client
            .post(&self.url)
            .form(&[("paramID", param.id())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(http)?;

        let body: DataResponse = response.json().await.map_err(http)?;
        body.latest(param)
    }
}

/// Called once with every newly stored snapshot
pub type RefreshHook = Box<dyn Fn(&WeatherSnapshot) + Send + Sync>;

/// Per-parameter results of a completed refresh
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub populated: usize,
    pub failures: Vec<FetchError>,
}

impl RefreshReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug)]
pub enum RefreshOutcome {
    /// Within the cache window, nothing was requested
    Cached,
    /// A new snapshot was stored and the hook invoked
    Refreshed(RefreshReport),
    /// The cache was shut down; any fetched data was thrown away
    Discarded,
}

/// Latest buoy conditions with a time-based cache
pub struct WeatherCache<C> {
    client: C,
    cache_interval: Duration,
    snapshot: Option<WeatherSnapshot>,
    last_success: Option<Instant>,
    hook: Option<RefreshHook>,
    token: CancellationToken,
}

impl<C: WeatherClient> WeatherCache<C> {
    pub fn new(client: C, cache_interval: Duration) -> Self {
        Self {
            client,
            cache_interval,
            snapshot: None,
            last_success: None,
            hook: None,
            token: CancellationToken::new(),
        }
    }

    /// Replace the post-refresh hook
    pub fn set_refresh_hook<F>(&mut self, hook: F)
    where
        F: Fn(&WeatherSnapshot) + Send + Sync + 'static,
    {
        self.hook = Some(Box::new(hook));
    }

    pub fn snapshot(&self) -> Option<&WeatherSnapshot> {
        self.snapshot.as_ref()
    }

    /// Time since the last stored snapshot
    pub fn age(&self) -> Option<Duration> {
        self.last_success.map(|t| t.elapsed())
    }

    /// Token cancelled by [`WeatherCache::shutdown`]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Stop accepting results. A refresh already in flight lets its current
    /// request finish, sends no further requests and stores nothing.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Fetch every parameter unless a snapshot younger than the cache window
    /// exists and `force` is false.
    pub async fn refresh(&mut self, force: bool) -> Result<RefreshOutcome, TrackerError> {
        if self.token.is_cancelled() {
            return Ok(RefreshOutcome::Discarded);
        }
        if !force && self.age().is_some_and(|age| age < self.cache_interval) {
            debug!("Weather snapshot still fresh, skipping refresh");
            return Ok(RefreshOutcome::Cached);
        }

        let now = Utc::now();
        let fetched_at = self
            .snapshot
            .as_ref()
            .map_or(now, |previous| previous.fetched_at.max(now));
        let mut snapshot = WeatherSnapshot::empty(fetched_at);
        let mut failures = Vec::new();

        for param in WeatherParam::ALL {
            if self.token.is_cancelled() {
                info!("Weather cache shut down during refresh, discarding results");
                return Ok(RefreshOutcome::Discarded);
            }
            match self.client.fetch_latest(param).await {
                Ok(sample) => snapshot.record(param, sample.observed_at, sample.value),
                Err(e) => {
                    warn!("Weather parameter unavailable: {}", e);
                    failures.push(e);
                }
            }
        }

        if self.token.is_cancelled() {
            info!("Weather cache shut down during refresh, discarding results");
            return Ok(RefreshOutcome::Discarded);
        }

        let populated = snapshot.populated();
        if populated == 0 {
            warn!("Weather refresh produced no data, keeping previous snapshot");
            return Err(TrackerError::WeatherUnavailable {
                failed: failures.len(),
            });
        }

        self.last_success = Some(Instant::now());
        let snapshot = self.snapshot.insert(snapshot);
        if let Some(hook) = &self.hook {
            hook(snapshot);
        }

        Ok(RefreshOutcome::Refreshed(RefreshReport {
            populated,
            failures,
        }))
    }
}

/// Refresh unconditionally every `poll_interval`, starting now, until
/// `token` is cancelled.
///
/// Pass [`WeatherCache::cancellation_token`] so that a refresh in flight at
/// shutdown is discarded.
pub fn spawn_poller<C>(
    cache: Arc<Mutex<WeatherCache<C>>>,
    poll_interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()>
where
    C: WeatherClient + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let mut cache = cache.lock().await;
                    match cache.refresh(true).await {
                        Ok(RefreshOutcome::Refreshed(report)) => info!(
                            "Weather refreshed: {}/{} parameters",
                            report.populated,
                            WeatherParam::ALL.len()
                        ),
                        Ok(_) => {}
                        Err(e) => warn!("Weather refresh failed: {}", e),
                    }
                }
            }
        }
        debug!("Weather poller stopped");
    })
}
