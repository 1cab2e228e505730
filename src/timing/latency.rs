// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Output latency compensation.
//!
//! The offset is added to "now" before projecting onto the clock, so a
//! positive value fires steps earlier to make up for MIDI driver and speaker
//! delay downstream.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Built-in offset used when nothing is configured or persisted (75ms)
pub const DEFAULT_LATENCY_MICROS: i64 = 75_000;

/// Default operator nudge granularity (5ms)
pub const DEFAULT_NUDGE_STEP_MICROS: i64 = 5_000;

/// Errors from reading or writing the calibration file
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("calibration file I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("calibration file is not valid: {0}")]
    Parse(String),
    #[error("failed to serialize calibration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// On-disk calibration document
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct CalibrationFile {
    latency_micros: i64,
}

/// Holds the signed microsecond offset applied before extrapolation
#[derive(Debug)]
pub struct LatencyCalibrator {
    offset_micros: AtomicI64,
    nudge_step_micros: i64,
    path: Option<PathBuf>,
}

impl LatencyCalibrator {
    /// Create a calibrator with a fixed starting offset and no persistence
    pub fn new(offset_micros: i64) -> Self {
        Self {
            offset_micros: AtomicI64::new(offset_micros),
            nudge_step_micros: DEFAULT_NUDGE_STEP_MICROS,
            path: None,
        }
    }

    /// Set the granularity used by `nudge_up` / `nudge_down`
    pub fn with_nudge_step(mut self, step_micros: i64) -> Self {
        self.nudge_step_micros = step_micros;
        self
    }

    /// Create a calibrator backed by a file.
    ///
    /// A missing or unreadable file is not an error: `default_micros` is used
    /// instead and the file is written on the next `save`.
    pub fn load<P: AsRef<Path>>(path: P, default_micros: i64) -> Self {
        let path = path.as_ref().to_path_buf();
        let offset = match read_calibration(&path) {
            Ok(offset) => {
                info!("Loaded latency calibration {}us from {:?}", offset, path);
                offset
            }
            Err(e) => {
                debug!("Using default latency {}us ({})", default_micros, e);
                default_micros
            }
        };

        Self {
            offset_micros: AtomicI64::new(offset),
            nudge_step_micros: DEFAULT_NUDGE_STEP_MICROS,
            path: Some(path),
        }
    }

    /// Current offset in microseconds
    pub fn current(&self) -> i64 {
        self.offset_micros.load(Ordering::Acquire)
    }

    /// Add `delta_micros` to the offset; returns the new value.
    ///
    /// Takes effect on the next scheduling evaluation, nothing is replayed.
    pub fn nudge(&self, delta_micros: i64) -> i64 {
        let new = self.offset_micros.fetch_add(delta_micros, Ordering::AcqRel) + delta_micros;
        info!("Latency correction: {}us", new);
        new
    }

    /// Raise the offset by one step; triggers fire earlier
    pub fn nudge_up(&self) -> i64 {
        self.nudge(self.nudge_step_micros)
    }

    /// Lower the offset by one step; triggers fire later
    pub fn nudge_down(&self) -> i64 {
        self.nudge(-self.nudge_step_micros)
    }

    /// Path of the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write the current offset to the backing file (no-op without one)
    pub fn save(&self) -> Result<(), CalibrationError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let doc = CalibrationFile {
            latency_micros: self.current(),
        };
        fs::write(path, toml::to_string(&doc)?)?;
        info!("Saved latency calibration {}us to {:?}", doc.latency_micros, path);
        Ok(())
    }
}

impl Default for LatencyCalibrator {
    fn default() -> Self {
        Self::new(DEFAULT_LATENCY_MICROS)
    }
}

/// Read a calibration file: a TOML document or a bare numeric scalar
fn read_calibration(path: &Path) -> Result<i64, CalibrationError> {
    let contents = fs::read_to_string(path)?;

    if let Ok(doc) = toml::from_str::<CalibrationFile>(&contents) {
        return Ok(doc.latency_micros);
    }

    // Legacy format: a single float such as "7.500000000000000000e+04"
    let trimmed = contents.trim();
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value.round() as i64),
        _ => {
            warn!("Calibration file {:?} is not readable", path);
            Err(CalibrationError::Parse(trimmed.chars().take(32).collect()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_offset() {
        let calibrator = LatencyCalibrator::default();
        assert_eq!(calibrator.current(), 75_000);
        assert!(calibrator.path().is_none());
    }

    #[test]
    fn test_nudge_accumulates() {
        let calibrator = LatencyCalibrator::new(0);
        assert_eq!(calibrator.nudge(1_500), 1_500);
        assert_eq!(calibrator.nudge(-4_000), -2_500);
        assert_eq!(calibrator.current(), -2_500);
    }

    #[test]
    fn test_nudge_steps() {
        let calibrator = LatencyCalibrator::new(75_000).with_nudge_step(2_000);
        assert_eq!(calibrator.nudge_up(), 77_000);
        assert_eq!(calibrator.nudge_down(), 75_000);
        assert_eq!(calibrator.nudge_down(), 73_000);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = tempdir().unwrap();
        let calibrator = LatencyCalibrator::load(dir.path().join("missing.toml"), 12_345);
        assert_eq!(calibrator.current(), 12_345);
    }

    #[test]
    fn test_garbage_file_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latency.toml");
        fs::write(&path, "definitely not a number").unwrap();

        let calibrator = LatencyCalibrator::load(&path, 75_000);
        assert_eq!(calibrator.current(), 75_000);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latency.toml");

        let calibrator = LatencyCalibrator::load(&path, 75_000);
        calibrator.nudge(-5_000);
        calibrator.save().unwrap();

        let reloaded = LatencyCalibrator::load(&path, 0);
        assert_eq!(reloaded.current(), 70_000);
    }

    #[test]
    fn test_legacy_scalar_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latency_config.dat");
        fs::write(&path, "8.000000000000000000e+04\n").unwrap();

        let calibrator = LatencyCalibrator::load(&path, 0);
        assert_eq!(calibrator.current(), 80_000);
    }

    #[test]
    fn test_save_without_path_is_noop() {
        let calibrator = LatencyCalibrator::new(1);
        assert!(calibrator.save().is_ok());
    }
}
