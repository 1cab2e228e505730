// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Publish/subscribe transport abstraction.
//!
//! Nodes talk to each other through topics with broker-style semantics:
//! - retained topics hand the last published value to every new subscriber
//! - at-least-once topics may redeliver, at-most-once topics may drop
//! - a publisher subscribed to its own topic receives its own messages back
//!
//! Publishing never blocks; delivery happens on the subscriber's event
//! channel.

pub mod memory;

use thiserror::Error;

pub use memory::{MemoryBroker, MemoryLink};

/// Delivery guarantee requested for a publication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    /// Fire and forget
    #[default]
    AtMostOnce,
    /// Redelivered until acknowledged; duplicates possible
    AtLeastOnce,
}

/// A message on a topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// Events delivered to a connected client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The broker acknowledged the connection
    Connected,
    /// A message arrived on a subscribed topic
    Message(Publication),
    /// The connection was lost
    Disconnected,
}

/// Transport failures visible to publishers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("client {0} is not connected")]
    NotConnected(String),
    #[error("broker is gone")]
    Closed,
}

/// Outbound half of a pub/sub connection
pub trait TransportLink: Send + Sync {
    /// Identity used by the broker for this connection
    fn client_id(&self) -> &str;

    /// Queue a publication; must not block on network I/O
    fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS, retain: bool) -> Result<(), TransportError>;
}
