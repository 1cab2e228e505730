// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Step activation grid.
//!
//! A grid is an ordered list of tracks, each a fixed-length row of step
//! flags. Every track has the same length. The grid is treated as a single
//! document: nodes exchange and replace it whole.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors for grids with impossible dimensions or out-of-range cells
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("grid must have at least one track")]
    NoTracks,
    #[error("grid must have at least one step per track")]
    NoSteps,
    #[error("steps per beat must be at least one")]
    NoStepsPerBeat,
    #[error("track {track} has {found} steps, expected {expected}")]
    RaggedTrack {
        track: usize,
        expected: usize,
        found: usize,
    },
    #[error("track {track} out of range (grid has {tracks} tracks)")]
    TrackOutOfRange { track: usize, tracks: usize },
    #[error("step {step} out of range (pattern has {steps} steps)")]
    StepOutOfRange { step: usize, steps: usize },
    #[error("grid is {found_tracks}x{found_steps}, expected {tracks}x{steps}")]
    ShapeMismatch {
        tracks: usize,
        steps: usize,
        found_tracks: usize,
        found_steps: usize,
    },
}

/// A single cell as it may appear on the wire: `true`/`false` or `1`/`0`
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum StepCell {
    Flag(bool),
    Number(i64),
}

impl StepCell {
    fn is_active(self) -> bool {
        match self {
            StepCell::Flag(flag) => flag,
            StepCell::Number(n) => n != 0,
        }
    }
}

/// The shared step grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<StepCell>>", into = "Vec<Vec<bool>>")]
pub struct StepGrid {
    tracks: Vec<Vec<bool>>,
    steps_per_pattern: usize,
}

impl StepGrid {
    /// Create an all-inactive grid
    pub fn new(tracks: usize, steps_per_pattern: usize) -> Result<Self, GridError> {
        if tracks == 0 {
            return Err(GridError::NoTracks);
        }
        if steps_per_pattern == 0 {
            return Err(GridError::NoSteps);
        }
        Ok(Self {
            tracks: vec![vec![false; steps_per_pattern]; tracks],
            steps_per_pattern,
        })
    }

    /// Build a grid from explicit rows, checking they are rectangular
    pub fn from_rows(rows: Vec<Vec<bool>>) -> Result<Self, GridError> {
        let first = rows.first().ok_or(GridError::NoTracks)?;
        let steps_per_pattern = first.len();
        if steps_per_pattern == 0 {
            return Err(GridError::NoSteps);
        }
        for (track, row) in rows.iter().enumerate() {
            if row.len() != steps_per_pattern {
                return Err(GridError::RaggedTrack {
                    track,
                    expected: steps_per_pattern,
                    found: row.len(),
                });
            }
        }
        Ok(Self {
            tracks: rows,
            steps_per_pattern,
        })
    }

    /// Number of tracks
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// Steps per track
    pub fn steps_per_pattern(&self) -> usize {
        self.steps_per_pattern
    }

    /// Read-only view of the rows
    pub fn rows(&self) -> &[Vec<bool>] {
        &self.tracks
    }

    /// Whether the cell is active; out-of-range cells read as inactive
    pub fn is_active(&self, track: usize, step: usize) -> bool {
        self.tracks
            .get(track)
            .and_then(|row| row.get(step))
            .copied()
            .unwrap_or(false)
    }

    /// Set a cell
    pub fn set(&mut self, track: usize, step: usize, active: bool) -> Result<(), GridError> {
        self.check_cell(track, step)?;
        self.tracks[track][step] = active;
        Ok(())
    }

    /// Flip a cell, returning its new value
    pub fn toggle(&mut self, track: usize, step: usize) -> Result<bool, GridError> {
        self.check_cell(track, step)?;
        let cell = &mut self.tracks[track][step];
        *cell = !*cell;
        Ok(*cell)
    }

    /// Indices of tracks active on `step`
    pub fn active_tracks(&self, step: usize) -> Vec<usize> {
        self.tracks
            .iter()
            .enumerate()
            .filter(|(_, row)| row.get(step).copied().unwrap_or(false))
            .map(|(track, _)| track)
            .collect()
    }

    /// Check that `other` has the same dimensions as this grid
    pub fn check_shape(&self, other: &StepGrid) -> Result<(), GridError> {
        if self.track_count() == other.track_count()
            && self.steps_per_pattern == other.steps_per_pattern
        {
            Ok(())
        } else {
            Err(GridError::ShapeMismatch {
                tracks: self.track_count(),
                steps: self.steps_per_pattern,
                found_tracks: other.track_count(),
                found_steps: other.steps_per_pattern,
            })
        }
    }

    fn check_cell(&self, track: usize, step: usize) -> Result<(), GridError> {
        if track >= self.tracks.len() {
            return Err(GridError::TrackOutOfRange {
                track,
                tracks: self.tracks.len(),
            });
        }
        if step >= self.steps_per_pattern {
            return Err(GridError::StepOutOfRange {
                step,
                steps: self.steps_per_pattern,
            });
        }
        Ok(())
    }
}

impl TryFrom<Vec<Vec<StepCell>>> for StepGrid {
    type Error = GridError;

    fn try_from(rows: Vec<Vec<StepCell>>) -> Result<Self, Self::Error> {
        Self::from_rows(
            rows.into_iter()
                .map(|row| row.into_iter().map(StepCell::is_active).collect())
                .collect(),
        )
    }
}

impl From<StepGrid> for Vec<Vec<bool>> {
    fn from(grid: StepGrid) -> Self {
        grid.tracks
    }
}
