// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! In-process broker with retained messages.
//!
//! Behaves like a single MQTT broker shared by every node in the process:
//! exact-match topics, retained last values, loop-back of a client's own
//! publications, and explicit disconnect/reconnect for exercising link loss.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use super::{Publication, QoS, TransportError, TransportEvent, TransportLink};

struct ClientEntry {
    topics: Vec<String>,
    sender: UnboundedSender<TransportEvent>,
    connected: bool,
}

#[derive(Default)]
struct BrokerState {
    retained: HashMap<String, Vec<u8>>,
    clients: HashMap<String, ClientEntry>,
}

/// Shared in-process broker
#[derive(Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Connect a client subscribed to `topics`.
    ///
    /// The client first receives `Connected`, then the retained value of each
    /// subscribed topic. Connecting with an id already in use takes the
    /// session over; the previous holder is told it was disconnected.
    pub fn connect(
        &self,
        client_id: &str,
        topics: &[&str],
    ) -> (MemoryLink, UnboundedReceiver<TransportEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let entry = ClientEntry {
            topics: topics.iter().map(|t| t.to_string()).collect(),
            sender,
            connected: true,
        };

        let mut state = self.lock();
        Self::deliver_session_start(&state.retained, &entry);
        if let Some(previous) = state.clients.insert(client_id.to_string(), entry) {
            let _ = previous.sender.send(TransportEvent::Disconnected);
        }
        info!("Client {} connected, subscribed to {:?}", client_id, topics);

        let link = MemoryLink {
            broker: self.clone(),
            client_id: client_id.to_string(),
        };
        (link, receiver)
    }

    /// Drop a client's connection; it stops receiving and cannot publish
    pub fn disconnect(&self, client_id: &str) {
        let mut state = self.lock();
        if let Some(entry) = state.clients.get_mut(client_id) {
            if entry.connected {
                entry.connected = false;
                let _ = entry.sender.send(TransportEvent::Disconnected);
                info!("Client {} disconnected", client_id);
            }
        }
    }

    /// Restore a dropped connection, replaying the session start
    pub fn reconnect(&self, client_id: &str) {
        let mut state = self.lock();
        let BrokerState { retained, clients } = &mut *state;
        if let Some(entry) = clients.get_mut(client_id) {
            if !entry.connected {
                entry.connected = true;
                Self::deliver_session_start(retained, entry);
                info!("Client {} reconnected", client_id);
            }
        }
    }

    /// Retained value of a topic
    pub fn retained(&self, topic: &str) -> Option<Vec<u8>> {
        self.lock().retained.get(topic).cloned()
    }

    /// Whether a client is currently connected
    pub fn is_connected(&self, client_id: &str) -> bool {
        self.lock()
            .clients
            .get(client_id)
            .map(|entry| entry.connected)
            .unwrap_or(false)
    }

    fn deliver_session_start(retained: &HashMap<String, Vec<u8>>, entry: &ClientEntry) {
        let _ = entry.sender.send(TransportEvent::Connected);
        for topic in &entry.topics {
            if let Some(payload) = retained.get(topic) {
                let _ = entry.sender.send(TransportEvent::Message(Publication {
                    topic: topic.clone(),
                    payload: payload.clone(),
                    qos: QoS::AtLeastOnce,
                    retain: true,
                }));
            }
        }
    }

    fn publish_from(
        &self,
        client_id: &str,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retain: bool,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();

        let connected = state
            .clients
            .get(client_id)
            .map(|entry| entry.connected)
            .unwrap_or(false);
        if !connected {
            return Err(TransportError::NotConnected(client_id.to_string()));
        }

        if retain {
            // An empty retained payload clears the topic
            if payload.is_empty() {
                state.retained.remove(topic);
            } else {
                state.retained.insert(topic.to_string(), payload.clone());
            }
        }

        let mut delivered = 0;
        for entry in state.clients.values() {
            if entry.connected && entry.topics.iter().any(|t| t == topic) {
                let message = TransportEvent::Message(Publication {
                    topic: topic.to_string(),
                    payload: payload.clone(),
                    qos,
                    // Live deliveries are not flagged as retained
                    retain: false,
                });
                if entry.sender.send(message).is_ok() {
                    delivered += 1;
                }
            }
        }
        debug!("{} published on {} to {} subscriber(s)", client_id, topic, delivered);
        Ok(())
    }
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryBroker")
            .field("clients", &state.clients.len())
            .field("retained", &state.retained.len())
            .finish()
    }
}

/// A client's outbound handle on a `MemoryBroker`
#[derive(Debug, Clone)]
pub struct MemoryLink {
    broker: MemoryBroker,
    client_id: String,
}

impl TransportLink for MemoryLink {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS, retain: bool) -> Result<(), TransportError> {
        self.broker.publish_from(&self.client_id, topic, payload, qos, retain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(receiver: &mut UnboundedReceiver<TransportEvent>) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    fn payloads(events: &[TransportEvent]) -> Vec<Vec<u8>> {
        events
            .iter()
            .filter_map(|event| match event {
                TransportEvent::Message(p) => Some(p.payload.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_connect_acknowledged() {
        let broker = MemoryBroker::new();
        let (_link, mut rx) = broker.connect("a", &["t"]);
        assert_eq!(drain(&mut rx), vec![TransportEvent::Connected]);
        assert!(broker.is_connected("a"));
    }

    #[test]
    fn test_publish_reaches_subscribers_and_self() {
        let broker = MemoryBroker::new();
        let (a, mut rx_a) = broker.connect("a", &["t"]);
        let (_b, mut rx_b) = broker.connect("b", &["t"]);
        let (_c, mut rx_c) = broker.connect("c", &["other"]);
        drain(&mut rx_a);
        drain(&mut rx_b);
        drain(&mut rx_c);

        a.publish("t", b"hello".to_vec(), QoS::AtMostOnce, false).unwrap();

        assert_eq!(payloads(&drain(&mut rx_a)), vec![b"hello".to_vec()]);
        assert_eq!(payloads(&drain(&mut rx_b)), vec![b"hello".to_vec()]);
        assert!(drain(&mut rx_c).is_empty());
    }

    #[test]
    fn test_retained_delivered_to_late_joiner() {
        let broker = MemoryBroker::new();
        let (a, _rx_a) = broker.connect("a", &["state"]);
        a.publish("state", b"v1".to_vec(), QoS::AtLeastOnce, true).unwrap();
        a.publish("state", b"v2".to_vec(), QoS::AtLeastOnce, true).unwrap();
        a.publish("state", b"live".to_vec(), QoS::AtLeastOnce, false).unwrap();

        let (_b, mut rx_b) = broker.connect("b", &["state"]);
        let events = drain(&mut rx_b);
        assert_eq!(events[0], TransportEvent::Connected);
        assert_eq!(payloads(&events), vec![b"v2".to_vec()]);
        match &events[1] {
            TransportEvent::Message(p) => assert!(p.retain),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_empty_retained_payload_clears() {
        let broker = MemoryBroker::new();
        let (a, _rx) = broker.connect("a", &["state"]);
        a.publish("state", b"v1".to_vec(), QoS::AtLeastOnce, true).unwrap();
        a.publish("state", Vec::new(), QoS::AtLeastOnce, true).unwrap();
        assert_eq!(broker.retained("state"), None);
    }

    #[test]
    fn test_disconnect_and_reconnect() {
        let broker = MemoryBroker::new();
        let (a, mut rx_a) = broker.connect("a", &["state"]);
        let (b, _rx_b) = broker.connect("b", &["state"]);
        drain(&mut rx_a);

        broker.disconnect("a");
        assert_eq!(drain(&mut rx_a), vec![TransportEvent::Disconnected]);
        assert_eq!(
            a.publish("state", b"x".to_vec(), QoS::AtLeastOnce, true),
            Err(TransportError::NotConnected("a".to_string()))
        );

        b.publish("state", b"while-away".to_vec(), QoS::AtLeastOnce, true).unwrap();
        assert!(drain(&mut rx_a).is_empty());

        broker.reconnect("a");
        let events = drain(&mut rx_a);
        assert_eq!(events[0], TransportEvent::Connected);
        assert_eq!(payloads(&events), vec![b"while-away".to_vec()]);
    }

    #[test]
    fn test_session_takeover() {
        let broker = MemoryBroker::new();
        let (_old, mut rx_old) = broker.connect("a", &["t"]);
        drain(&mut rx_old);
        let (_new, mut rx_new) = broker.connect("a", &["t"]);
        assert_eq!(drain(&mut rx_old), vec![TransportEvent::Disconnected]);
        assert_eq!(drain(&mut rx_new), vec![TransportEvent::Connected]);
    }
}
