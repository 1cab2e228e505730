// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Extrapolated musical clock.
//!
//! This module keeps the most recent tempo/phase reference reported by the
//! external link clock and projects it onto any local wall-clock instant,
//! assuming constant tempo since the reference was taken.

use std::sync::RwLock;

use serde::Deserialize;
use tracing::{debug, warn};

/// Tempo used before any reference has arrived
pub const DEFAULT_BPM: f64 = 120.0;

/// Microseconds per minute, the unit conversion between bpm and wall time
pub const MICROS_PER_MINUTE: f64 = 60_000_000.0;

/// Loop length in beats assumed for phase reports that do not carry one
pub const DEFAULT_QUANTUM: f64 = 8.0;

fn default_quantum() -> f64 {
    DEFAULT_QUANTUM
}

/// The last known mapping between local wall time and beat position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockReference {
    /// Beat position that was true at `wall_time_micros`
    pub beat: f64,
    /// Local wall-clock instant (microseconds) at which `beat` was true
    pub wall_time_micros: i64,
    /// Tempo in beats per minute
    pub bpm: f64,
}

impl ClockReference {
    /// Default reference: beat 0 at the given instant, 120 bpm
    pub fn initial(wall_time_micros: i64) -> Self {
        Self {
            beat: 0.0,
            wall_time_micros,
            bpm: DEFAULT_BPM,
        }
    }

    /// Project the reference onto a wall-clock instant shifted by `latency_micros`
    pub fn beat_at(&self, wall_time_micros: i64, latency_micros: i64) -> f64 {
        let elapsed = (wall_time_micros + latency_micros - self.wall_time_micros) as f64;
        self.beat + elapsed * self.bpm / MICROS_PER_MINUTE
    }
}

/// An update reported by the external tempo/phase source.
///
/// Both payload shapes the link bridge can produce are accepted; the shape
/// is detected from the fields present.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ClockUpdate {
    /// Full status report: beat position and tempo
    Tempo { beat: f64, bpm: f64 },
    /// Phase report: beat phase within a loop of `quantum` beats at the
    /// sender's timestamp `when`
    Phase {
        phase: f64,
        when: f64,
        #[serde(default = "default_quantum")]
        quantum: f64,
    },
}

impl ClockUpdate {
    /// Parse an update from its JSON form. Returns `None` for anything unusable.
    pub fn from_json(payload: &str) -> Option<Self> {
        match serde_json::from_str(payload) {
            Ok(update) => Some(update),
            Err(e) => {
                debug!("Ignoring unparseable clock update: {}", e);
                None
            }
        }
    }
}

/// Mutable part of the clock model, swapped as one unit
#[derive(Debug, Clone, Copy)]
struct ClockState {
    reference: ClockReference,
    /// Sender timestamp of the last accepted phase update
    last_phase_when: Option<f64>,
}

/// Shared clock model.
///
/// The reference is replaced wholesale under a write lock; readers copy it out
/// and extrapolate without holding the lock.
#[derive(Debug)]
pub struct ClockModel {
    state: RwLock<ClockState>,
}

impl ClockModel {
    /// Create a clock with the default reference anchored at `startup_micros`
    pub fn new(startup_micros: i64) -> Self {
        Self {
            state: RwLock::new(ClockState {
                reference: ClockReference::initial(startup_micros),
                last_phase_when: None,
            }),
        }
    }

    /// Replace the reference: `beat` was true at local time `at_wall_time_micros`
    pub fn update(&self, beat: f64, bpm: f64, at_wall_time_micros: i64) -> bool {
        if !beat.is_finite() || !bpm.is_finite() || bpm <= 0.0 {
            warn!("Ignoring tempo update with beat={} bpm={}", beat, bpm);
            return false;
        }

        let mut state = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.reference = ClockReference {
            beat,
            wall_time_micros: at_wall_time_micros,
            bpm,
        };
        true
    }

    /// Reduce an incoming update into a new reference.
    ///
    /// `received_at_micros` is the local time the update arrived; the sender's
    /// own timestamps are only used for ordering phase reports.
    /// Returns whether the update was accepted.
    pub fn apply(&self, update: ClockUpdate, received_at_micros: i64) -> bool {
        match update {
            ClockUpdate::Tempo { beat, bpm } => self.update(beat, bpm, received_at_micros),
            ClockUpdate::Phase { phase, when, quantum } => {
                if !phase.is_finite() || !when.is_finite() || !quantum.is_finite() || quantum <= 0.0 {
                    warn!(
                        "Ignoring phase update with phase={} when={} quantum={}",
                        phase, when, quantum
                    );
                    return false;
                }

                let mut state = match self.state.write() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if let Some(last) = state.last_phase_when {
                    if when <= last {
                        debug!("Dropping out-of-order phase update (when={} last={})", when, last);
                        return false;
                    }
                }
                let previous = state.reference;
                let beat = unwrap_phase(phase, quantum, previous.beat_at(received_at_micros, 0));
                state.reference = ClockReference {
                    beat,
                    wall_time_micros: received_at_micros,
                    bpm: previous.bpm,
                };
                state.last_phase_when = Some(when);
                true
            }
        }
    }

    /// Snapshot of the current reference
    pub fn reference(&self) -> ClockReference {
        match self.state.read() {
            Ok(guard) => guard.reference,
            Err(poisoned) => poisoned.into_inner().reference,
        }
    }

    /// Current tempo in BPM
    pub fn bpm(&self) -> f64 {
        self.reference().bpm
    }

    /// Beat position at `wall_time_micros`, shifted by `latency_micros`
    pub fn position_at(&self, wall_time_micros: i64, latency_micros: i64) -> f64 {
        self.reference().beat_at(wall_time_micros, latency_micros)
    }
}

/// Place `phase` on the continuous timeline: the beat congruent to it modulo
/// `quantum` that lies closest to `expected`
fn unwrap_phase(phase: f64, quantum: f64, expected: f64) -> f64 {
    let loops = ((expected - phase) / quantum).round();
    phase + loops * quantum
}
