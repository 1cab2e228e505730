// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Step-advance notifications.
//!
//! The node that fires triggers announces each step on a best-effort,
//! non-retained topic; followers (editing surfaces) track it to draw the
//! step cursor.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use super::messages::StepMessage;
use crate::transport::{QoS, TransportLink};

/// Announces step advances to followers
#[derive(Clone)]
pub struct StepPublisher {
    node_id: String,
    topic: String,
    link: Arc<dyn TransportLink>,
}

impl StepPublisher {
    pub fn new(node_id: impl Into<String>, link: Arc<dyn TransportLink>, topic: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            topic: topic.into(),
            link,
        }
    }

    /// Publish a step notification; failures are only logged
    pub fn publish(&self, step: usize) {
        let payload = match StepMessage::new(self.node_id.clone(), step).encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode step message: {}", e);
                return;
            }
        };
        if let Err(e) = self.link.publish(&self.topic, payload, QoS::AtMostOnce, false) {
            debug!("Step notification dropped: {}", e);
        }
    }
}

impl std::fmt::Debug for StepPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepPublisher")
            .field("node_id", &self.node_id)
            .field("topic", &self.topic)
            .finish()
    }
}

const NO_STEP: i64 = -1;

/// Most recent step announced on the channel
#[derive(Debug)]
pub struct StepCursor {
    step: AtomicI64,
}

impl Default for StepCursor {
    fn default() -> Self {
        Self {
            step: AtomicI64::new(NO_STEP),
        }
    }
}

impl StepCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current cursor position, if any step has been announced
    pub fn current(&self) -> Option<usize> {
        match self.step.load(Ordering::Acquire) {
            NO_STEP => None,
            step => Some(step as usize),
        }
    }

    /// Move the cursor; returns false if the step has no cursor position
    pub fn set(&self, step: usize) -> bool {
        match i64::try_from(step) {
            Ok(value) => {
                self.step.store(value, Ordering::Release);
                true
            }
            Err(_) => {
                debug!("Step {} out of cursor range", step);
                false
            }
        }
    }

    /// Handle a raw payload from the step topic; malformed payloads are dropped
    pub fn on_payload(&self, payload: &[u8]) -> Option<usize> {
        match StepMessage::decode(payload) {
            Ok(message) if self.set(message.step) => Some(message.step),
            Ok(_) => None,
            Err(e) => {
                debug!("Dropping step message: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryBroker, TransportEvent};

    #[test]
    fn test_cursor_follows_messages() {
        let cursor = StepCursor::new();
        assert_eq!(cursor.current(), None);

        assert_eq!(cursor.on_payload(br#"{"sender_id": "live", "step": 6}"#), Some(6));
        assert_eq!(cursor.current(), Some(6));

        assert_eq!(cursor.on_payload(b"{\"step\": \"six\"}"), None);
        assert_eq!(cursor.current(), Some(6));
    }

    #[test]
    fn test_oversized_step_rejected() {
        let cursor = StepCursor::new();
        assert!(cursor.set(3));

        assert!(!cursor.set(usize::MAX));
        assert_eq!(cursor.current(), Some(3));

        let payload = format!(r#"{{"sender_id": "live", "step": {}}}"#, usize::MAX);
        assert_eq!(cursor.on_payload(payload.as_bytes()), None);
        assert_eq!(cursor.current(), Some(3));

        let payload = format!(r#"{{"sender_id": "live", "step": {}}}"#, i64::MAX as u64 + 1);
        assert_eq!(cursor.on_payload(payload.as_bytes()), None);
        assert_eq!(cursor.current(), Some(3));
    }

    #[test]
    fn test_publisher_is_best_effort() {
        let broker = MemoryBroker::new();
        let (link, mut rx) = broker.connect("live", &["sequencer/step"]);
        let publisher = StepPublisher::new("live", Arc::new(link), "sequencer/step");
        let _ = rx.try_recv();

        publisher.publish(3);
        match rx.try_recv() {
            Ok(TransportEvent::Message(p)) => {
                assert!(!p.retain);
                assert_eq!(p.qos, QoS::AtMostOnce);
                assert_eq!(StepMessage::decode(&p.payload).unwrap().step, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(broker.retained("sequencer/step"), None);

        broker.disconnect("live");
        // Does not panic or error out
        publisher.publish(4);
    }
}
