// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Beat-synchronized step-trigger engine.
//!
//! Several machines share one tempo/phase reference and one step grid. Each
//! node extrapolates musical time locally, fires the active steps of the grid
//! exactly once per step boundary, and keeps the grid consistent with its
//! peers over a retained publish/subscribe channel.

pub mod config;
pub mod midi;
pub mod node;
pub mod sequencer;
pub mod sync;
pub mod timing;
pub mod transport;

pub use config::NodeConfig;
pub use node::{Node, NodeHandle};
