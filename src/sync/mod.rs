// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Multi-node state sharing.
//!
//! This module provides:
//! - Wire messages tagged with the sender identity
//! - The grid synchronizer with echo suppression and bootstrap
//! - Step-advance publishing and cursor following

pub mod cursor;
pub mod messages;
pub mod synchronizer;

pub use cursor::{StepCursor, StepPublisher};
pub use messages::{MessageError, StepMessage, SyncMessage};
pub use synchronizer::{GridSynchronizer, RemoteOutcome, SyncState};

/// Retained topic carrying the grid
pub const DEFAULT_STATE_TOPIC: &str = "sequencer/state";

/// Best-effort topic carrying step advances
pub const DEFAULT_STEP_TOPIC: &str = "sequencer/step";
