//! Latest-fix holder and observer fan-out

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::models::{Fix, Speed};

/// Observer invoked with every published fix
pub type FixCallback = Arc<dyn Fn(&Fix) + Send + Sync>;

/// Handle returned by [`LocationBroadcaster::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Inner {
    last_fix: RwLock<Option<Fix>>,
    observers: Mutex<Vec<(SubscriptionId, FixCallback)>>,
    next_id: AtomicU64,
}

/// Shared location state for one running tracker.
///
/// Cloning is cheap and every clone sees the same fix and observers.
#[derive(Clone, Default)]
pub struct LocationBroadcaster {
    inner: Arc<Inner>,
}

impl LocationBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Observers are notified in registration order.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Fix) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.observers.lock().push((id, Arc::new(callback)));
        debug!("Added location observer {:?}", id);
        id
    }

    /// Remove an observer. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.inner.observers.lock();
        let before = observers.len();
        observers.retain(|(sid, _)| *sid != id);
        observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().len()
    }

    /// Store `fix` as the latest and notify observers.
    ///
    /// Callbacks run outside the locks so they may subscribe, unsubscribe or
    /// read the latest fix themselves.
    pub fn publish(&self, fix: Fix) {
        *self.inner.last_fix.write() = Some(fix);

        let observers: Vec<FixCallback> = self
            .inner
            .observers
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in observers {
            callback(&fix);
        }
    }

    /// Most recent fix, `None` until the first one arrives
    pub fn last_fix(&self) -> Option<Fix> {
        *self.inner.last_fix.read()
    }

    pub fn has_fix(&self) -> bool {
        self.inner.last_fix.read().is_some()
    }

    pub fn position(&self) -> Option<(f64, f64)> {
        self.last_fix().map(|f| f.position())
    }

    /// Zero until the first fix
    pub fn speed(&self) -> Speed {
        self.last_fix().map(|f| f.speed).unwrap_or(Speed::ZERO)
    }

    pub fn speed_knots(&self) -> f64 {
        self.speed().knots()
    }

    pub fn speed_kmh(&self) -> f64 {
        self.speed().kmh()
    }
}

impl std::fmt::Debug for LocationBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationBroadcaster")
            .field("last_fix", &self.last_fix())
            .field("observers", &self.observer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;

    fn fix(lat: f64, lon: f64, speed: f64) -> Fix {
        Fix::new(lat, lon, speed, Utc::now()).unwrap()
    }

    #[test]
    fn no_fix_until_first_publish() {
        let broadcaster = LocationBroadcaster::new();
        assert_eq!(broadcaster.last_fix(), None);
        assert!(!broadcaster.has_fix());
        assert_eq!(broadcaster.speed_knots(), 0.0);
    }

    #[test]
    fn fix_at_null_island_is_a_fix() {
        let broadcaster = LocationBroadcaster::new();
        broadcaster.publish(fix(0.0, 0.0, 0.0));
        assert!(broadcaster.has_fix());
        assert_eq!(broadcaster.position(), Some((0.0, 0.0)));
    }

    #[test]
    fn derived_speed_units() {
        let broadcaster = LocationBroadcaster::new();
        broadcaster.publish(fix(45.0, -122.0, 10.0));
        assert!((broadcaster.speed_kmh() - 36.0).abs() < 1e-9);
        assert!((broadcaster.speed_knots() - 19.4384).abs() < 1e-9);
    }

    #[test]
    fn observers_called_in_registration_order() {
        let broadcaster = LocationBroadcaster::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = Arc::clone(&order);
            broadcaster.subscribe(move |_| order.lock().push(n));
        }
        broadcaster.publish(fix(45.0, -122.0, 1.0));

        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let broadcaster = LocationBroadcaster::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let id = broadcaster.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        broadcaster.publish(fix(45.0, -122.0, 1.0));
        assert!(broadcaster.unsubscribe(id));
        broadcaster.publish(fix(45.1, -122.0, 1.0));
        broadcaster.publish(fix(45.2, -122.0, 1.0));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!broadcaster.unsubscribe(id));
        assert_eq!(broadcaster.observer_count(), 0);
    }

    #[test]
    fn observer_can_unsubscribe_itself() {
        let broadcaster = LocationBroadcaster::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));

        let id = {
            let handle = broadcaster.clone();
            let slot = Arc::clone(&slot);
            let calls = Arc::clone(&calls);
            broadcaster.subscribe(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = *slot.lock() {
                    handle.unsubscribe(id);
                }
            })
        };
        *slot.lock() = Some(id);

        broadcaster.publish(fix(45.0, -122.0, 1.0));
        broadcaster.publish(fix(45.0, -122.1, 1.0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clones_share_state() {
        let broadcaster = LocationBroadcaster::new();
        let other = broadcaster.clone();
        other.publish(fix(42.177377, -80.034476, 2.0));
        assert_eq!(broadcaster.position(), Some((42.177377, -80.034476)));
    }
}
