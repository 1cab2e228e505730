// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Timing and clock module.
//!
//! This module provides the extrapolated musical clock, latency
//! compensation, wall-clock sources and a simulated link session.

pub mod clock;
pub mod latency;
pub mod link;
pub mod wall;

pub use clock::{ClockModel, ClockReference, ClockUpdate, DEFAULT_BPM, DEFAULT_QUANTUM};
pub use latency::{
    CalibrationError, LatencyCalibrator, DEFAULT_LATENCY_MICROS, DEFAULT_NUDGE_STEP_MICROS,
};
pub use link::{LinkSimulator, STATUS_POLL_MICROS};
pub use wall::{ManualClock, SystemClock, WallClock};
