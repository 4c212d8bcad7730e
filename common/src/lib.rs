pub mod config;
pub mod context;
pub mod refresh;
pub mod subscription;
pub mod telemetry;

pub use config::{ConfigError, ConnectionParams, DashboardConfig, DisplaySettings};
pub use context::AppContext;
pub use refresh::{RefreshLoop, StopFlag};
pub use subscription::{ConnectionStatus, SubscriptionError, SubscriptionManager};
pub use telemetry::{DashboardView, History, Sample};

use std::sync::{Arc, Mutex, PoisonError};

/// Convenience helper for passing the latest value of a setting between threads. For example
/// from the UI thread editing the display settings to the thread running the refresh loop.
#[derive(Clone, Debug, Default)]
pub struct ValueStore<T>(Arc<Mutex<Option<T>>>);

impl<T: Clone> ValueStore<T> {
    /// Creates a store already holding `value`.
    pub fn new(value: T) -> Self {
        Self(Arc::new(Mutex::new(Some(value))))
    }

    /// Sets `value` as the last value.
    pub fn set(&self, value: T) {
        let mut data = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = data.insert(value);
    }

    /// Gets a copy of the stored value. Unlike a channel, reading does not consume it.
    pub fn get(&self) -> Option<T> {
        let data = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        data.clone()
    }
}

#[test]
fn test_value_store_shares_latest_value() {
    let store = ValueStore::new(1);
    let other = store.clone();

    other.set(2);

    assert_eq!(store.get(), Some(2));
    assert_eq!(store.get(), Some(2));
    assert_eq!(ValueStore::<u8>::default().get(), None);
}
