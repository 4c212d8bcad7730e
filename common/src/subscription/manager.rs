// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

use chrono::Utc;
use std::fmt;
use std::sync::Arc;

use crate::config::ConnectionParams;
use crate::subscription::transport::{
    LinkPointer, MessageHandler, SubscriptionError, TransportPointer,
};
use crate::telemetry::{History, Sample};

/// What the subscription manager is currently doing, for display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Never connected, or deliberately disconnected.
    Idle,
    Subscribed { topic: String },
    /// The subscription was established but the connection dropped since.
    Lost { topic: String },
    /// The last connection attempt failed.
    Failed { reason: String },
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Idle => write!(f, "Not connected"),
            ConnectionStatus::Subscribed { topic } => write!(f, "Subscribed to {topic}"),
            ConnectionStatus::Lost { topic } => write!(f, "Connection lost ({topic})"),
            ConnectionStatus::Failed { reason } => write!(f, "Connection failed: {reason}"),
        }
    }
}

/// Keeps exactly one subscription to the device topic and feeds what arrives into the
/// [`History`].
pub struct SubscriptionManager {
    transport: TransportPointer,
    history: History,
    params: ConnectionParams,
    link: Option<LinkPointer>,
    last_error: Option<String>,
}

impl SubscriptionManager {
    pub fn new(transport: TransportPointer, history: History, params: ConnectionParams) -> Self {
        Self {
            transport,
            history,
            params,
            link: None,
            last_error: None,
        }
    }

    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// Connects with the current parameters, replacing any active subscription.
    ///
    /// A failure leaves the manager without a subscription; call again to retry.
    pub fn connect(&mut self) -> Result<(), SubscriptionError> {
        self.teardown();

        let topic = self.params.topic();
        log::info!(
            "Connecting to {}:{} and subscribing to {topic}",
            self.params.host,
            self.params.port
        );

        let history = self.history.clone();
        let handler: MessageHandler = Arc::new(move |raw: &[u8]| ingest(&history, raw));

        match self.transport.open(&self.params, handler) {
            Ok(link) => {
                self.link = Some(link);
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                log::warn!("No active subscription: {e}");
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Switches to `params`, tearing down the old subscription before the new one is attached.
    ///
    /// Unchanged parameters with a live subscription are a no-op. Otherwise the connection is
    /// recreated, which also retries after an earlier failure.
    pub fn reconfigure(&mut self, params: ConnectionParams) -> Result<(), SubscriptionError> {
        if params == self.params && self.is_connected() {
            log::debug!("Connection parameters unchanged, keeping {}", params.topic());
            return Ok(());
        }

        self.params = params;
        self.connect()
    }

    /// Drops the active subscription, if any.
    pub fn disconnect(&mut self) {
        self.teardown();
        self.last_error = None;
    }

    pub fn is_connected(&self) -> bool {
        self.link.as_ref().is_some_and(|link| link.is_connected())
    }

    pub fn status(&self) -> ConnectionStatus {
        match (&self.link, &self.last_error) {
            (Some(link), _) if link.is_connected() => ConnectionStatus::Subscribed {
                topic: link.topic().to_string(),
            },
            (Some(link), _) => ConnectionStatus::Lost {
                topic: link.topic().to_string(),
            },
            (None, Some(reason)) => ConnectionStatus::Failed {
                reason: reason.clone(),
            },
            (None, None) => ConnectionStatus::Idle,
        }
    }

    /// Handles one raw message payload as if it arrived on the subscription.
    pub fn on_message(&self, raw: &[u8]) {
        ingest(&self.history, raw);
    }

    fn teardown(&mut self) {
        if let Some(link) = self.link.take() {
            log::info!("Unsubscribing from {}", link.topic());
            link.close();
        }
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Decodes `raw` and appends it to `history`. Undecodable payloads are dropped without
/// affecting earlier or later samples.
pub fn ingest(history: &History, raw: &[u8]) {
    match Sample::decode(raw, Utc::now()) {
        Ok(sample) => history.append(sample),
        Err(e) => log::trace!("Dropping telemetry payload: {e}"),
    }
}

#[cfg(test)]
use crate::subscription::LoopbackBroker;

#[cfg(test)]
fn manager_on(broker: &LoopbackBroker, history: &History) -> SubscriptionManager {
    SubscriptionManager::new(
        Box::new(broker.clone()),
        history.clone(),
        ConnectionParams::default(),
    )
}

#[test]
fn test_manager_ingests_published_samples() {
    let broker = LoopbackBroker::new();
    let history = History::new(10);
    let mut manager = manager_on(&broker, &history);

    manager.connect().unwrap();
    let topic = manager.params().topic();
    broker.publish(&topic, br#"{"temperature_c": 21.5}"#);
    broker.publish(&topic, b"not valid json");
    broker.publish(&topic, br#"{"humidity_pct": 40.0, "aqi_proxy": 12}"#);

    assert_eq!(history.len(), 2);
    let first = history.window(2)[0].clone();
    assert_eq!(first.temperature_c, Some(21.5));
    assert_eq!(first.humidity_pct, None);
    assert_eq!(first.aqi_proxy, None);
    assert!(first.time().is_some());
    assert_eq!(history.latest().unwrap().aqi_proxy, Some(12.0));
}

#[test]
fn test_manager_drops_malformed_payloads() {
    let history = History::new(10);
    let manager = manager_on(&LoopbackBroker::new(), &history);

    manager.on_message(br#"{"temperature_c": 20.0}"#);
    manager.on_message(b"not valid json");
    manager.on_message(&[0xc3, 0x28]);
    manager.on_message(b"\"just a string\"");

    assert_eq!(history.len(), 1);
}

#[test]
fn test_manager_reconfigure_switches_topic() {
    let broker = LoopbackBroker::new();
    let history = History::new(10);
    let mut manager = manager_on(&broker, &history);
    manager.connect().unwrap();

    let old_topic = manager.params().topic();
    broker.publish(&old_topic, br#"{"temperature_c": 1.0}"#);

    let params = ConnectionParams::new("localhost", 1883, "esp32-sim-2").unwrap();
    manager.reconfigure(params).unwrap();
    let new_topic = manager.params().topic();
    assert_eq!(new_topic, "iot/air/esp32-sim-2/telemetry");

    assert_eq!(broker.publish(&old_topic, br#"{"temperature_c": 2.0}"#), 0);
    assert_eq!(broker.publish(&new_topic, br#"{"temperature_c": 3.0}"#), 1);

    let temperatures: Vec<_> = history.window(10).iter().map(|s| s.temperature_c).collect();
    assert_eq!(temperatures, [Some(1.0), Some(3.0)]);
    assert_eq!(broker.subscriber_count(&old_topic), 0);
    assert_eq!(
        manager.status(),
        ConnectionStatus::Subscribed { topic: new_topic }
    );
}

#[test]
fn test_manager_reconfigure_unchanged_keeps_link() {
    let broker = LoopbackBroker::new();
    let history = History::new(10);
    let mut manager = manager_on(&broker, &history);
    manager.connect().unwrap();

    // A refusing broker would fail any new connection, so success means nothing was recreated.
    broker.refuse_connections(true);
    manager.reconfigure(ConnectionParams::default()).unwrap();

    assert!(manager.is_connected());
    assert_eq!(broker.subscriber_count(&manager.params().topic()), 1);
}

#[test]
fn test_manager_connect_failure_is_recoverable() {
    let broker = LoopbackBroker::new();
    let history = History::new(10);
    let mut manager = manager_on(&broker, &history);

    broker.refuse_connections(true);
    assert!(manager.connect().is_err());
    assert!(!manager.is_connected());
    assert!(matches!(manager.status(), ConnectionStatus::Failed { .. }));

    broker.refuse_connections(false);
    manager.reconfigure(ConnectionParams::default()).unwrap();
    assert!(manager.is_connected());

    manager.disconnect();
    assert_eq!(manager.status(), ConnectionStatus::Idle);
    assert_eq!(broker.subscriber_count(&manager.params().topic()), 0);
}
