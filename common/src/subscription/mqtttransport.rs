// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS, SubscribeReasonCode};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::config::ConnectionParams;
use crate::subscription::transport::{
    Link, LinkPointer, MessageHandler, SubscriptionError, Transport,
};

const KEEP_ALIVE: Duration = Duration::from_secs(60);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const TEARDOWN_TIMEOUT: Duration = Duration::from_millis(500);
const REQUEST_CAPACITY: usize = 10;

static NEXT_CLIENT: AtomicU64 = AtomicU64::new(0);

fn next_client_id() -> String {
    format!(
        "airq-dashboard-{}-{}",
        std::process::id(),
        NEXT_CLIENT.fetch_add(1, Ordering::Relaxed)
    )
}

/// Subscribes to an MQTT broker.
///
/// Every link owns a worker thread running a single-threaded tokio runtime that drives the
/// `rumqttc` event loop. `open` blocks until the broker acknowledged both the connection and
/// the subscription, or until the connect timeout expires.
pub struct MqttTransport {
    connect_timeout: Duration,
}

impl MqttTransport {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

impl Default for MqttTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MqttTransport {
    fn open(
        &self,
        params: &ConnectionParams,
        handler: MessageHandler,
    ) -> Result<LinkPointer, SubscriptionError> {
        let topic = params.topic();

        let mut options = MqttOptions::new(next_client_id(), params.host.clone(), params.port);
        options.set_keep_alive(KEEP_ALIVE);

        let session = Session {
            host: params.host.clone(),
            port: params.port,
            topic: topic.clone(),
            handler,
            connected: Arc::new(AtomicBool::new(false)),
            detached: Arc::new(AtomicBool::new(false)),
        };
        let connected = session.connected.clone();
        let detached = session.detached.clone();

        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let worker = std::thread::Builder::new()
            .name(format!("mqtt {topic}"))
            .spawn(move || {
                match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime.block_on(session.run(options, ready_tx, shutdown_rx)),
                    Err(e) => {
                        let _ = ready_tx.send(Err(SubscriptionError::Worker(e)));
                    }
                }
            })?;

        let link = Box::new(MqttLink {
            topic,
            connected,
            detached,
            shutdown: shutdown_tx,
            worker,
        });

        match ready_rx.recv_timeout(self.connect_timeout) {
            Ok(Ok(())) => Ok(link),
            Ok(Err(e)) => {
                link.close();
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                link.close();
                Err(SubscriptionError::Timeout {
                    host: params.host.clone(),
                    port: params.port,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                link.close();
                Err(SubscriptionError::Connect {
                    host: params.host.clone(),
                    port: params.port,
                    reason: "connection worker stopped".into(),
                })
            }
        }
    }
}

type ReadySender = mpsc::Sender<Result<(), SubscriptionError>>;

struct Session {
    host: String,
    port: u16,
    topic: String,
    handler: MessageHandler,
    connected: Arc<AtomicBool>,
    detached: Arc<AtomicBool>,
}

impl Session {
    async fn run(
        self,
        options: MqttOptions,
        ready: ReadySender,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let mut ready = Some(ready);

        // A dropped sender resolves the receiver too, so a link that is never closed still ends
        // the session.
        loop {
            let event = tokio::select! {
                _ = &mut shutdown => break,
                event = eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    log::debug!("Connected to {}:{}", self.host, self.port);
                    if let Err(e) = client.subscribe(self.topic.as_str(), QoS::AtMostOnce).await {
                        self.fail(&mut ready, e.to_string());
                        break;
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    if ack
                        .return_codes
                        .iter()
                        .any(|code| matches!(code, SubscribeReasonCode::Failure))
                    {
                        if let Some(ready) = ready.take() {
                            let _ = ready.send(Err(SubscriptionError::SubscribeRejected(
                                self.topic.clone(),
                            )));
                        }
                        break;
                    }
                    self.connected.store(true, Ordering::Release);
                    if let Some(ready) = ready.take() {
                        let _ = ready.send(Ok(()));
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if publish.topic == self.topic && !self.detached.load(Ordering::Acquire) {
                        (self.handler)(&publish.payload[..]);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    // No automatic reconnect: the session ends here.
                    self.connected.store(false, Ordering::Release);
                    self.fail(&mut ready, e.to_string());
                    return;
                }
            }
        }

        self.connected.store(false, Ordering::Release);
        self.teardown(client, eventloop).await;
    }

    fn fail(&self, ready: &mut Option<ReadySender>, reason: String) {
        match ready.take() {
            Some(ready) => {
                let _ = ready.send(Err(SubscriptionError::Connect {
                    host: self.host.clone(),
                    port: self.port,
                    reason,
                }));
            }
            None => log::warn!(
                "Lost connection to {}:{} ({}): {reason}",
                self.host,
                self.port,
                self.topic
            ),
        }
    }

    async fn teardown(&self, client: AsyncClient, mut eventloop: rumqttc::EventLoop) {
        if let Err(e) = client.unsubscribe(self.topic.as_str()).await {
            log::debug!("Unsubscribe from {} failed: {e}", self.topic);
        }
        if let Err(e) = client.disconnect().await {
            log::debug!("Disconnect from {}:{} failed: {e}", self.host, self.port);
        }

        let flush = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        log::debug!("Connection closed during teardown: {e}");
                        break;
                    }
                }
            }
        };
        if tokio::time::timeout(TEARDOWN_TIMEOUT, flush).await.is_err() {
            log::debug!("Gave up flushing the disconnect to {}:{}", self.host, self.port);
        }
    }
}

struct MqttLink {
    topic: String,
    connected: Arc<AtomicBool>,
    detached: Arc<AtomicBool>,
    shutdown: oneshot::Sender<()>,
    worker: JoinHandle<()>,
}

impl Link for MqttLink {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn close(self: Box<Self>) {
        let MqttLink {
            topic,
            detached,
            shutdown,
            worker,
            ..
        } = *self;

        detached.store(true, Ordering::Release);
        // The session may already have ended on its own.
        let _ = shutdown.send(());
        if worker.join().is_err() {
            log::warn!("MQTT worker for {topic} panicked");
        }
    }
}

#[test]
fn test_mqtt_connect_failure_is_not_fatal() {
    let params = ConnectionParams::new("127.0.0.1", 1, "esp32-sim-1").unwrap();
    let handler: MessageHandler = Arc::new(|_: &[u8]| {});

    let result = MqttTransport::new()
        .with_connect_timeout(Duration::from_secs(10))
        .open(&params, handler);

    assert!(matches!(
        result,
        Err(SubscriptionError::Connect { .. } | SubscriptionError::Timeout { .. })
    ));
}
