// Copyright © SixtyFPS GmbH <info@slint.dev>
// SPDX-License-Identifier: MIT

use std::sync::Arc;

use crate::config::ConnectionParams;

/// Callback invoked with the raw payload of every message received on a subscription.
pub type MessageHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Failures establishing a subscription. None of them are fatal: the caller is left without an
/// active subscription and may try again later.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("could not connect to {host}:{port}: {reason}")]
    Connect {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("timed out connecting to {host}:{port}")]
    Timeout { host: String, port: u16 },

    #[error("broker rejected the subscription to {0}")]
    SubscribeRejected(String),

    #[error("could not start the connection worker: {0}")]
    Worker(#[from] std::io::Error),
}

/// A live subscription to one topic.
pub trait Link {
    /// The subscribed topic.
    fn topic(&self) -> &str;

    /// Whether the underlying connection is still up.
    fn is_connected(&self) -> bool;

    /// Detaches the message handler, unsubscribes and disconnects.
    ///
    /// When this returns the handler is no longer invoked. Failures while tearing down are
    /// logged and otherwise ignored since the link is discarded anyway.
    fn close(self: Box<Self>);
}

pub type LinkPointer = Box<dyn Link + Send>;

/// Something that can connect to a broker and subscribe to a device topic.
pub trait Transport {
    /// Connects using `params` and subscribes to [`ConnectionParams::topic`] at the at-most-once
    /// delivery tier, feeding every received payload to `handler`.
    fn open(
        &self,
        params: &ConnectionParams,
        handler: MessageHandler,
    ) -> Result<LinkPointer, SubscriptionError>;
}

pub type TransportPointer = Box<dyn Transport + Send>;
