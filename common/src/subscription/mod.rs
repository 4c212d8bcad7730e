// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

mod transport;
mod loopbacktransport;
mod manager;

pub use transport::{Link, LinkPointer, MessageHandler, SubscriptionError, Transport, TransportPointer};

pub use loopbacktransport::LoopbackBroker;

pub use manager::{ingest, ConnectionStatus, SubscriptionManager};

#[cfg(feature = "mqtt")]
mod mqtttransport;

#[cfg(feature = "mqtt")]
pub use mqtttransport::MqttTransport;
