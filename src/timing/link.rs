// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Stand-in for the external link session.
//!
//! Real rigs receive tempo status from a link bridge; this simulator models a
//! session timeline at constant tempo so nodes can be exercised without one.

use super::clock::{ClockUpdate, MICROS_PER_MINUTE};

/// Interval at which the link status is polled in the rig (100ms)
pub const STATUS_POLL_MICROS: i64 = 100_000;

/// A shared beat timeline: `origin_beat` at `origin_micros`, advancing at `bpm`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkSimulator {
    origin_micros: i64,
    origin_beat: f64,
    bpm: f64,
}

impl LinkSimulator {
    /// Start a session at beat 0
    pub fn new(origin_micros: i64, bpm: f64) -> Self {
        Self {
            origin_micros,
            origin_beat: 0.0,
            bpm,
        }
    }

    /// Current tempo
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Beat position of the session at `now_micros`
    pub fn beat_at(&self, now_micros: i64) -> f64 {
        self.origin_beat + (now_micros - self.origin_micros) as f64 * self.bpm / MICROS_PER_MINUTE
    }

    /// Change tempo at `now_micros` without moving the current beat
    pub fn set_bpm(&mut self, bpm: f64, now_micros: i64) {
        self.origin_beat = self.beat_at(now_micros);
        self.origin_micros = now_micros;
        self.bpm = bpm;
    }

    /// Relocate the transport to `beat` at `now_micros`
    pub fn relocate(&mut self, beat: f64, now_micros: i64) {
        self.origin_beat = beat;
        self.origin_micros = now_micros;
    }

    /// Tempo-style status report
    pub fn status(&self, now_micros: i64) -> ClockUpdate {
        ClockUpdate::Tempo {
            beat: self.beat_at(now_micros),
            bpm: self.bpm,
        }
    }

    /// Phase-style report within a loop of `quantum` beats
    pub fn phase_at_time(&self, now_micros: i64, quantum: f64) -> ClockUpdate {
        ClockUpdate::Phase {
            phase: self.beat_at(now_micros).rem_euclid(quantum),
            when: now_micros as f64,
            quantum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beat_timeline() {
        let link = LinkSimulator::new(0, 120.0);
        assert_eq!(link.beat_at(0), 0.0);
        assert!((link.beat_at(2_000_000) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_tempo_change_is_continuous() {
        let mut link = LinkSimulator::new(0, 120.0);
        link.set_bpm(60.0, 1_000_000);
        assert!((link.beat_at(1_000_000) - 2.0).abs() < 1e-9);
        assert!((link.beat_at(2_000_000) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_status_and_phase() {
        let mut link = LinkSimulator::new(0, 120.0);
        link.relocate(9.0, 0);
        assert_eq!(link.status(0), ClockUpdate::Tempo { beat: 9.0, bpm: 120.0 });
        assert_eq!(
            link.phase_at_time(0, 8.0),
            ClockUpdate::Phase { phase: 1.0, when: 0.0, quantum: 8.0 }
        );
    }
}
