// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::config::ConnectionParams;
use crate::subscription::transport::{
    Link, LinkPointer, MessageHandler, SubscriptionError, Transport,
};

/// In-process broker delivering published payloads to subscribers of the exact same topic.
///
/// Works without any network, which makes it the transport of choice for tests and for feeding
/// the dashboard from a simulator living in the same process.
#[derive(Clone, Default)]
pub struct LoopbackBroker {
    state: Arc<Mutex<BrokerState>>,
}

#[derive(Default)]
struct BrokerState {
    next_id: u64,
    refuse_connections: bool,
    subscribers: Vec<Subscriber>,
}

/// Set while the subscriber may receive messages. Deliveries hold the read side, so closing
/// (write side) waits for deliveries in flight.
type AttachGate = Arc<RwLock<bool>>;

struct Subscriber {
    id: u64,
    topic: String,
    handler: MessageHandler,
    attached: AttachGate,
}

impl LoopbackBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following connection attempt fail, like an unreachable broker.
    pub fn refuse_connections(&self, refuse: bool) {
        self.lock().refuse_connections = refuse;
    }

    /// Publishes `payload` on `topic` and returns how many subscribers received it.
    pub fn publish(&self, topic: &str, payload: &[u8]) -> usize {
        // Handlers run outside the lock so they may publish or subscribe themselves.
        let receivers: Vec<(MessageHandler, AttachGate)> = self
            .lock()
            .subscribers
            .iter()
            .filter(|subscriber| subscriber.topic == topic)
            .map(|subscriber| (subscriber.handler.clone(), subscriber.attached.clone()))
            .collect();

        let mut delivered = 0;
        for (handler, attached) in receivers {
            let attached = attached.read().unwrap_or_else(PoisonError::into_inner);
            if *attached {
                handler(payload);
                delivered += 1;
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock()
            .subscribers
            .iter()
            .filter(|subscriber| subscriber.topic == topic)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for LoopbackBroker {
    fn open(
        &self,
        params: &ConnectionParams,
        handler: MessageHandler,
    ) -> Result<LinkPointer, SubscriptionError> {
        let mut state = self.lock();
        if state.refuse_connections {
            return Err(SubscriptionError::Connect {
                host: params.host.clone(),
                port: params.port,
                reason: "connection refused".into(),
            });
        }

        let id = state.next_id;
        state.next_id += 1;

        let topic = params.topic();
        let attached = Arc::new(RwLock::new(true));
        state.subscribers.push(Subscriber {
            id,
            topic: topic.clone(),
            handler,
            attached: attached.clone(),
        });

        Ok(Box::new(LoopbackLink {
            broker: self.clone(),
            id,
            topic,
            attached,
        }))
    }
}

struct LoopbackLink {
    broker: LoopbackBroker,
    id: u64,
    topic: String,
    attached: AttachGate,
}

impl Link for LoopbackLink {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn is_connected(&self) -> bool {
        *self.attached.read().unwrap_or_else(PoisonError::into_inner)
    }

    // Must not be called from inside this link's own handler: the delivery holds the gate.
    fn close(self: Box<Self>) {
        *self.attached.write().unwrap_or_else(PoisonError::into_inner) = false;
        self.broker
            .lock()
            .subscribers
            .retain(|subscriber| subscriber.id != self.id);
    }
}

#[cfg(test)]
fn counting_handler() -> (MessageHandler, Arc<Mutex<Vec<Vec<u8>>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();
    let handler: MessageHandler = Arc::new(move |payload: &[u8]| {
        sink.lock().unwrap().push(payload.to_vec());
    });
    (handler, received)
}

#[test]
fn test_loopback_delivers_to_exact_topic() {
    let broker = LoopbackBroker::new();
    let params = ConnectionParams::default();
    let (handler, received) = counting_handler();

    let link = broker.open(&params, handler).unwrap();
    assert_eq!(link.topic(), "iot/air/esp32-sim-1/telemetry");
    assert!(link.is_connected());

    assert_eq!(broker.publish("iot/air/esp32-sim-1/telemetry", b"one"), 1);
    assert_eq!(broker.publish("iot/air/other/telemetry", b"two"), 0);
    assert_eq!(*received.lock().unwrap(), vec![b"one".to_vec()]);

    link.close();
    assert_eq!(broker.subscriber_count("iot/air/esp32-sim-1/telemetry"), 0);
    assert_eq!(broker.publish("iot/air/esp32-sim-1/telemetry", b"three"), 0);
    assert_eq!(received.lock().unwrap().len(), 1);
}

#[test]
fn test_loopback_refuses_connections() {
    let broker = LoopbackBroker::new();
    broker.refuse_connections(true);
    let (handler, _) = counting_handler();

    let result = broker.open(&ConnectionParams::default(), handler);

    assert!(matches!(result, Err(SubscriptionError::Connect { port: 1883, .. })));
}

#[test]
fn test_loopback_close_waits_for_delivery_in_flight() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    let broker = LoopbackBroker::new();
    let params = ConnectionParams::default();
    let (started_tx, started_rx) = mpsc::channel();
    let finished = Arc::new(AtomicBool::new(false));

    let handler_finished = finished.clone();
    let started_tx = Mutex::new(started_tx);
    let handler: MessageHandler = Arc::new(move |_: &[u8]| {
        let _ = started_tx.lock().unwrap().send(());
        std::thread::sleep(Duration::from_millis(200));
        handler_finished.store(true, Ordering::SeqCst);
    });
    let link = broker.open(&params, handler).unwrap();

    let publisher = {
        let broker = broker.clone();
        let topic = params.topic();
        std::thread::spawn(move || broker.publish(&topic, b"slow"))
    };

    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    link.close();

    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(publisher.join().unwrap(), 1);
    assert_eq!(broker.publish(&params.topic(), b"late"), 0);
}
