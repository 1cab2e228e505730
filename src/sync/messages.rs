// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Wire messages exchanged between nodes.
//!
//! Payloads are JSON objects carrying the sender identity so a node can
//! recognize its own publications when the broker loops them back.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sequencer::StepGrid;

/// Failure to encode or decode a wire message
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Whole-grid snapshot: `{"sender_id": ..., "state": [[...], ...]}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMessage {
    pub sender_id: String,
    pub state: StepGrid,
}

impl SyncMessage {
    pub fn new(sender_id: impl Into<String>, state: StepGrid) -> Self {
        Self {
            sender_id: sender_id.into(),
            state,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, MessageError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

/// Step-advance notification: `{"sender_id": ..., "step": n}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepMessage {
    pub sender_id: String,
    pub step: usize,
}

impl StepMessage {
    pub fn new(sender_id: impl Into<String>, step: usize) -> Self {
        Self {
            sender_id: sender_id.into(),
            step,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, MessageError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_message_wire_format() {
        let mut grid = StepGrid::new(2, 4).unwrap();
        grid.set(1, 3, true).unwrap();

        let encoded = SyncMessage::new("A", grid).encode().unwrap();
        assert_eq!(
            String::from_utf8(encoded).unwrap(),
            r#"{"sender_id":"A","state":[[false,false,false,false],[false,false,false,true]]}"#
        );
    }

    #[test]
    fn test_decode_legacy_integer_state() {
        let message =
            SyncMessage::decode(br#"{"sender_id": "sequencer_ui", "state": [[1, 0], [0, 1]]}"#).unwrap();
        assert_eq!(message.sender_id, "sequencer_ui");
        assert!(message.state.is_active(0, 0));
        assert!(message.state.is_active(1, 1));
        assert!(!message.state.is_active(0, 1));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(SyncMessage::decode(b"{").is_err());
        assert!(SyncMessage::decode(br#"{"state": [[true]]}"#).is_err());
        assert!(SyncMessage::decode(br#"{"sender_id": "x", "state": [[true], []]}"#).is_err());
        assert!(SyncMessage::decode(br#"{"sender_id": "x", "step": 3}"#).is_err());
    }

    #[test]
    fn test_step_message() {
        let encoded = StepMessage::new("live_sequencer", 5).encode().unwrap();
        assert_eq!(
            StepMessage::decode(&encoded).unwrap(),
            StepMessage::new("live_sequencer", 5)
        );
        assert!(StepMessage::decode(br#"{"sender_id": "x", "step": -1}"#).is_err());
        assert!(StepMessage::decode(br#"{"sender_id": "x"}"#).is_err());
    }
}
