// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

use crate::config::{ConnectionParams, DashboardConfig, DisplaySettings};
use crate::refresh::{RefreshLoop, StopFlag};
use crate::subscription::{
    ConnectionStatus, SubscriptionError, SubscriptionManager, TransportPointer,
};
use crate::telemetry::History;
use crate::ValueStore;

/// Everything a running dashboard owns: the sample history, the subscription feeding it and
/// the display settings the refresh loop reads.
pub struct AppContext {
    history: History,
    subscription: SubscriptionManager,
    display: ValueStore<DisplaySettings>,
}

impl AppContext {
    pub fn new(config: &DashboardConfig, transport: TransportPointer) -> Self {
        let history = History::new(config.retention);
        let subscription =
            SubscriptionManager::new(transport, history.clone(), config.connection.clone());

        Self {
            history,
            subscription,
            display: ValueStore::new(config.display),
        }
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn display(&self) -> DisplaySettings {
        self.display.get().unwrap_or_default()
    }

    pub fn connection(&self) -> &ConnectionParams {
        self.subscription.params()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.subscription.status()
    }

    /// Connects for the first time. A failure is logged and reported through
    /// [`AppContext::status`]; the dashboard keeps running without data.
    pub fn start(&mut self) {
        if let Err(e) = self.subscription.connect() {
            log::warn!("Starting without a subscription: {e}");
        }
    }

    /// Applies settings edited at runtime. Display settings always take effect, the connection
    /// is recreated when its parameters changed or it is not up.
    pub fn apply(
        &mut self,
        connection: ConnectionParams,
        display: DisplaySettings,
    ) -> Result<(), SubscriptionError> {
        self.display.set(display);
        self.subscription.reconfigure(connection)
    }

    /// A refresh loop over this context's history and display settings.
    pub fn refresh_loop(&self, stop: StopFlag) -> RefreshLoop {
        RefreshLoop::new(self.history.clone(), self.display.clone(), stop)
    }

    pub fn shutdown(&mut self) {
        self.subscription.disconnect();
    }
}

#[test]
fn test_context_lifecycle() {
    use crate::subscription::LoopbackBroker;

    let broker = LoopbackBroker::new();
    let config = DashboardConfig {
        retention: 3,
        ..Default::default()
    };
    let mut context = AppContext::new(&config, Box::new(broker.clone()));
    assert_eq!(context.status(), ConnectionStatus::Idle);

    context.start();
    let topic = context.connection().topic();
    for temperature in 0..5 {
        broker.publish(&topic, format!(r#"{{"temperature_c": {temperature}}}"#).as_bytes());
    }
    assert_eq!(context.history().len(), 3);

    let connection = ConnectionParams::new("localhost", 1883, "esp32-sim-9").unwrap();
    let display = DisplaySettings::new(100, 5).unwrap();
    context.apply(connection, display).unwrap();

    assert_eq!(context.display(), display);
    assert_eq!(
        context.status(),
        ConnectionStatus::Subscribed {
            topic: "iot/air/esp32-sim-9/telemetry".into()
        }
    );
    assert_eq!(broker.publish(&topic, br#"{"temperature_c": 9}"#), 0);

    context.shutdown();
    assert_eq!(context.status(), ConnectionStatus::Idle);
}

#[test]
fn test_context_starts_without_broker() {
    use crate::subscription::LoopbackBroker;

    let broker = LoopbackBroker::new();
    broker.refuse_connections(true);
    let mut context = AppContext::new(&DashboardConfig::default(), Box::new(broker));

    context.start();

    assert!(matches!(context.status(), ConnectionStatus::Failed { .. }));
    assert!(context.history().is_empty());
}
