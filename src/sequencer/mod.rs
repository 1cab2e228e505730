// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Sequencer core for deriving steps and firing triggers.
//!
//! This module provides the step-trigger pipeline:
//! - Step grid shared between nodes
//! - Step scheduler detecting boundary crossings exactly once
//! - Trigger dispatcher turning a step into output intents

pub mod grid;
pub mod scheduler;
pub mod trigger;

pub use grid::{GridError, StepGrid};
pub use scheduler::{StepAdvance, StepPosition, StepScheduler};
pub use trigger::{LoggingSink, OutputSink, RecordingSink, TrackId, TriggerDispatcher};

/// Step resolution of the sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTiming {
    /// Steps per beat (4 = sixteenth notes)
    pub steps_per_beat: u32,
    /// Steps in one pattern cycle
    pub steps_per_pattern: usize,
}

impl Default for StepTiming {
    fn default() -> Self {
        Self {
            steps_per_beat: 4,
            steps_per_pattern: 8,
        }
    }
}

impl StepTiming {
    /// Create timing, rejecting a zero resolution or an empty pattern
    pub fn new(steps_per_beat: u32, steps_per_pattern: usize) -> Result<Self, GridError> {
        if steps_per_beat == 0 {
            return Err(GridError::NoStepsPerBeat);
        }
        if steps_per_pattern == 0 {
            return Err(GridError::NoSteps);
        }
        Ok(Self {
            steps_per_beat,
            steps_per_pattern,
        })
    }

    /// Unwrapped step counter for a beat position
    pub fn raw_step(&self, beat: f64) -> i64 {
        (beat * self.steps_per_beat as f64).floor() as i64
    }

    /// Step index within the pattern for an unwrapped counter
    pub fn wrap(&self, raw_step: i64) -> usize {
        raw_step.rem_euclid(self.steps_per_pattern as i64) as usize
    }

    /// Duration of one step in microseconds at `bpm`
    pub fn step_micros(&self, bpm: f64) -> f64 {
        60_000_000.0 / (bpm * self.steps_per_beat as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_defaults() {
        let timing = StepTiming::default();
        assert_eq!(timing.steps_per_beat, 4);
        assert_eq!(timing.steps_per_pattern, 8);
    }

    #[test]
    fn test_timing_validation() {
        assert_eq!(StepTiming::new(0, 8), Err(GridError::NoStepsPerBeat));
        assert_eq!(StepTiming::new(4, 0), Err(GridError::NoSteps));
        assert!(StepTiming::new(3, 12).is_ok());
    }

    #[test]
    fn test_raw_step_and_wrap() {
        let timing = StepTiming::new(4, 8).unwrap();
        assert_eq!(timing.raw_step(0.0), 0);
        assert_eq!(timing.raw_step(0.999), 3);
        assert_eq!(timing.raw_step(1.0), 4);
        assert_eq!(timing.raw_step(-0.1), -1);

        assert_eq!(timing.wrap(9), 1);
        assert_eq!(timing.wrap(16), 0);
        assert_eq!(timing.wrap(-1), 7);
    }

    #[test]
    fn test_step_duration() {
        let timing = StepTiming::new(4, 16).unwrap();
        // 120 BPM: beat = 500ms, step = 125ms
        assert!((timing.step_micros(120.0) - 125_000.0).abs() < 1e-6);
    }
}
