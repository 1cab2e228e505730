// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Step boundary detection.
//!
//! The scheduler is polled at a short fixed interval. Each poll projects the
//! clock onto "now + latency", converts the beat position into an unwrapped
//! step counter and fires when that counter passes the last one fired.
//! Comparing the unwrapped counter means a looping pattern never re-fires
//! step 0 and a backward jump in the reference stays silent until time has
//! caught up with the last fired step again.

use std::sync::Arc;

use tracing::{debug, trace};

use super::StepTiming;
use crate::timing::{ClockModel, LatencyCalibrator};

/// Derived musical position at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepPosition {
    /// Step index within the pattern
    pub step: usize,
    /// Unwrapped step counter since beat 0
    pub raw_step: i64,
    /// Continuous beat position
    pub beat: f64,
}

/// Emitted once per step boundary crossing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepAdvance {
    /// Step index within the pattern
    pub step: usize,
    /// Unwrapped step counter
    pub raw_step: i64,
    /// Beat position at the poll that detected the crossing
    pub beat: f64,
    /// Wall-clock time of that poll
    pub at_micros: i64,
}

/// Polled step-boundary detector
#[derive(Debug)]
pub struct StepScheduler {
    clock: Arc<ClockModel>,
    latency: Arc<LatencyCalibrator>,
    timing: StepTiming,
    /// Unwrapped counter of the last fired step; `None` until the first fire
    last_fired: Option<i64>,
}

impl StepScheduler {
    pub fn new(clock: Arc<ClockModel>, latency: Arc<LatencyCalibrator>, timing: StepTiming) -> Self {
        Self {
            clock,
            latency,
            timing,
            last_fired: None,
        }
    }

    /// Step timing in use
    pub fn timing(&self) -> StepTiming {
        self.timing
    }

    /// Unwrapped counter of the last fired step
    pub fn last_fired(&self) -> Option<i64> {
        self.last_fired
    }

    /// Forget the last fired step so the next poll fires unconditionally
    pub fn reset(&mut self) {
        self.last_fired = None;
    }

    /// Position at `now_micros`, including the current latency offset
    pub fn position_at(&self, now_micros: i64) -> StepPosition {
        let beat = self.clock.position_at(now_micros, self.latency.current());
        let raw_step = self.timing.raw_step(beat);
        StepPosition {
            step: self.timing.wrap(raw_step),
            raw_step,
            beat,
        }
    }

    /// Evaluate one scheduling tick at `now_micros`.
    ///
    /// Returns a step advance if a new step boundary has been crossed since
    /// the last fire. At most one advance is produced per tick; steps skipped
    /// by a coarse poll or a forward jump are not replayed.
    pub fn tick_at(&mut self, now_micros: i64) -> Option<StepAdvance> {
        let position = self.position_at(now_micros);

        if let Some(last) = self.last_fired {
            if position.raw_step <= last {
                if position.raw_step < last - 1 {
                    trace!(
                        "Position {} behind last fired step {}, holding",
                        position.raw_step,
                        last
                    );
                }
                return None;
            }
            if position.raw_step > last + 1 {
                debug!(
                    "Skipped {} step(s) between {} and {}",
                    position.raw_step - last - 1,
                    last,
                    position.raw_step
                );
            }
        }

        self.last_fired = Some(position.raw_step);
        trace!("Step {} (raw {}) at beat {:.3}", position.step, position.raw_step, position.beat);

        Some(StepAdvance {
            step: position.step,
            raw_step: position.raw_step,
            beat: position.beat,
            at_micros: now_micros,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_000_000_000;

    fn scheduler(bpm: f64, latency: i64) -> (Arc<ClockModel>, Arc<LatencyCalibrator>, StepScheduler) {
        let clock = Arc::new(ClockModel::new(T0));
        clock.update(0.0, bpm, T0);
        let latency = Arc::new(LatencyCalibrator::new(latency));
        let timing = StepTiming::new(4, 8).unwrap();
        let scheduler = StepScheduler::new(Arc::clone(&clock), Arc::clone(&latency), timing);
        (clock, latency, scheduler)
    }

    fn run(scheduler: &mut StepScheduler, from: i64, to: i64, interval: i64) -> Vec<StepAdvance> {
        let mut fired = Vec::new();
        let mut now = from;
        while now <= to {
            if let Some(advance) = scheduler.tick_at(now) {
                fired.push(advance);
            }
            now += interval;
        }
        fired
    }

    #[test]
    fn test_one_beat_fires_five_boundaries() {
        let (_, _, mut scheduler) = scheduler(120.0, 0);
        // 120 BPM: one beat is 500ms, four steps per beat
        let fired = run(&mut scheduler, T0, T0 + 500_000, 10_000);
        let raw: Vec<i64> = fired.iter().map(|a| a.raw_step).collect();
        assert_eq!(raw, vec![0, 1, 2, 3, 4]);
        let steps: Vec<usize> = fired.iter().map(|a| a.step).collect();
        assert_eq!(steps, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_first_fire_times() {
        let (_, _, mut scheduler) = scheduler(120.0, 0);
        let fired = run(&mut scheduler, T0, T0 + 500_000, 10_000);
        // A step is 125ms at 120 BPM / 4 steps per beat
        let times: Vec<i64> = fired.iter().map(|a| a.at_micros - T0).collect();
        assert_eq!(times, vec![0, 130_000, 250_000, 380_000, 500_000]);
    }

    #[test]
    fn test_pattern_wraps_without_refiring() {
        let (_, _, mut scheduler) = scheduler(120.0, 0);
        // Three full 8-step patterns = 24 steps = 3 seconds
        let fired = run(&mut scheduler, T0, T0 + 2_999_000, 1_000);
        assert_eq!(fired.len(), 24);
        for (i, advance) in fired.iter().enumerate() {
            assert_eq!(advance.raw_step, i as i64);
            assert_eq!(advance.step, i % 8);
        }
    }

    #[test]
    fn test_repeated_poll_in_same_step_fires_once() {
        let (_, _, mut scheduler) = scheduler(120.0, 0);
        assert!(scheduler.tick_at(T0 + 1_000).is_some());
        for offset in [2_000, 50_000, 124_999] {
            assert!(scheduler.tick_at(T0 + offset).is_none());
        }
        assert_eq!(scheduler.tick_at(T0 + 125_000).map(|a| a.step), Some(1));
    }

    #[test]
    fn test_backward_jump_is_silent() {
        let (clock, _, mut scheduler) = scheduler(120.0, 0);
        let fired = run(&mut scheduler, T0, T0 + 1_000_000, 10_000);
        assert_eq!(fired.last().map(|a| a.raw_step), Some(8));

        // Relocate back to beat 0 at T0 + 1s
        clock.update(0.0, 120.0, T0 + 1_000_000);
        let after = run(&mut scheduler, T0 + 1_010_000, T0 + 2_000_000, 10_000);
        // Nothing fires until the counter passes 8 again (beat 2.25 = 1.125s later)
        assert!(after.iter().all(|a| a.raw_step > 8));
        assert!(after.is_empty());

        let resumed = run(&mut scheduler, T0 + 2_010_000, T0 + 2_200_000, 10_000);
        assert_eq!(resumed.first().map(|a| a.raw_step), Some(9));
    }

    #[test]
    fn test_coarse_poll_skips_without_duplicates() {
        let (_, _, mut scheduler) = scheduler(120.0, 0);
        // 300ms polls against 125ms steps
        let fired = run(&mut scheduler, T0, T0 + 1_500_000, 300_000);
        let raw: Vec<i64> = fired.iter().map(|a| a.raw_step).collect();
        assert_eq!(raw, vec![0, 2, 4, 7, 9, 12]);
        assert!(raw.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_latency_fires_earlier() {
        let (_, latency, mut scheduler) = scheduler(120.0, 0);
        let base: Vec<i64> = run(&mut scheduler, T0, T0 + 1_000_000, 1_000)
            .iter()
            .map(|a| a.at_micros)
            .collect();

        let (_, _, mut shifted) = self::scheduler(120.0, 20_000);
        let early: Vec<i64> = run(&mut shifted, T0, T0 + 1_000_000, 1_000)
            .iter()
            .map(|a| a.at_micros)
            .collect();

        // Step k fires at k*125ms without latency, 20ms earlier with it
        assert_eq!(base[1] - early[1], 20_000);
        assert_eq!(base[4] - early[4], 20_000);
        assert_eq!(latency.current(), 0);
    }

    #[test]
    fn test_negative_beat_wraps_into_pattern() {
        let (clock, _, mut scheduler) = scheduler(120.0, 0);
        clock.update(-0.25, 120.0, T0);
        let advance = scheduler.tick_at(T0).unwrap();
        assert_eq!(advance.raw_step, -1);
        assert_eq!(advance.step, 7);
    }

    #[test]
    fn test_reset_allows_refire() {
        let (_, _, mut scheduler) = scheduler(120.0, 0);
        assert!(scheduler.tick_at(T0).is_some());
        assert!(scheduler.tick_at(T0).is_none());
        scheduler.reset();
        assert_eq!(scheduler.last_fired(), None);
        assert!(scheduler.tick_at(T0).is_some());
    }

    #[test]
    fn test_position_at() {
        let (_, _, scheduler) = scheduler(120.0, 0);
        let position = scheduler.position_at(T0 + 1_250_000);
        assert_eq!(position.raw_step, 10);
        assert_eq!(position.step, 2);
        assert!((position.beat - 2.5).abs() < 1e-9);
    }
}
