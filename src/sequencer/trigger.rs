// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Trigger dispatch.
//!
//! Turns a step advance plus the current grid snapshot into trigger intents
//! for the output sink, and announces the step to followers.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::{info, trace, warn};

use super::StepGrid;
use crate::sync::StepPublisher;

/// Index of a track in the grid
pub type TrackId = usize;

/// Receiver of trigger intents (MIDI driver, sampler, ...)
pub trait OutputSink: Send {
    /// Fire the given tracks now
    fn fire(&mut self, tracks: &[TrackId]) -> Result<()>;
}

/// Sink that only logs what would be fired
#[derive(Debug, Default)]
pub struct LoggingSink;

impl OutputSink for LoggingSink {
    fn fire(&mut self, tracks: &[TrackId]) -> Result<()> {
        info!("Trigger tracks {:?}", tracks);
        Ok(())
    }
}

/// Sink that keeps every fired batch, shareable with an observer
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    fired: Arc<Mutex<Vec<Vec<TrackId>>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Batches fired so far
    pub fn fired(&self) -> Vec<Vec<TrackId>> {
        match self.fired.lock() {
            Ok(fired) => fired.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl OutputSink for RecordingSink {
    fn fire(&mut self, tracks: &[TrackId]) -> Result<()> {
        let mut fired = match self.fired.lock() {
            Ok(fired) => fired,
            Err(poisoned) => poisoned.into_inner(),
        };
        fired.push(tracks.to_vec());
        Ok(())
    }
}

/// Decides which tracks fire on a step and hands them to the sink
pub struct TriggerDispatcher {
    sink: Box<dyn OutputSink>,
    publisher: Option<StepPublisher>,
}

impl TriggerDispatcher {
    /// Dispatcher that only drives the output sink
    pub fn new(sink: Box<dyn OutputSink>) -> Self {
        Self {
            sink,
            publisher: None,
        }
    }

    /// Also announce each step to followers
    pub fn with_publisher(mut self, publisher: StepPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Handle a step advance, returning the tracks that were fired.
    ///
    /// Sink and publish failures are logged and swallowed; a missed note is
    /// better than a stalled scheduler.
    pub fn on_step_advance(&mut self, step: usize, grid: &StepGrid) -> Vec<TrackId> {
        let tracks = grid.active_tracks(step);

        if !tracks.is_empty() {
            trace!("Step {} fires {:?}", step, tracks);
            if let Err(e) = self.sink.fire(&tracks) {
                warn!("Output sink failed on step {}: {:#}", step, e);
            }
        }

        if let Some(publisher) = &self.publisher {
            publisher.publish(step);
        }

        tracks
    }
}

impl std::fmt::Debug for TriggerDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerDispatcher")
            .field("publisher", &self.publisher)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct FailingSink;

    impl OutputSink for FailingSink {
        fn fire(&mut self, _tracks: &[TrackId]) -> Result<()> {
            Err(anyhow!("device unplugged"))
        }
    }

    fn grid() -> StepGrid {
        let mut grid = StepGrid::new(4, 8).unwrap();
        grid.set(0, 0, true).unwrap();
        grid.set(2, 0, true).unwrap();
        grid.set(1, 4, true).unwrap();
        grid
    }

    #[test]
    fn test_fires_active_tracks() {
        let sink = RecordingSink::new();
        let mut dispatcher = TriggerDispatcher::new(Box::new(sink.clone()));
        let grid = grid();

        assert_eq!(dispatcher.on_step_advance(0, &grid), vec![0, 2]);
        assert_eq!(dispatcher.on_step_advance(4, &grid), vec![1]);
        assert_eq!(sink.fired(), vec![vec![0, 2], vec![1]]);
    }

    #[test]
    fn test_empty_step_does_not_call_sink() {
        let sink = RecordingSink::new();
        let mut dispatcher = TriggerDispatcher::new(Box::new(sink.clone()));

        assert!(dispatcher.on_step_advance(3, &grid()).is_empty());
        assert!(sink.fired().is_empty());
    }

    #[test]
    fn test_sink_failure_is_not_fatal() {
        let mut dispatcher = TriggerDispatcher::new(Box::new(FailingSink));
        assert_eq!(dispatcher.on_step_advance(0, &grid()), vec![0, 2]);
    }
}
