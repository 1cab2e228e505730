// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Local wall-clock sources.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the local wall-clock time in microseconds
pub trait WallClock: Send + Sync {
    /// Current time in microseconds since the Unix epoch
    fn now_micros(&self) -> i64;
}

/// The operating system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_micros(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_micros() as i64,
            // Clock set before 1970; report it as negative time
            Err(e) => -(e.duration().as_micros() as i64),
        }
    }
}

/// A clock that only moves when told to
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_micros: i64) -> Self {
        Self {
            now: AtomicI64::new(start_micros),
        }
    }

    /// Set the absolute time
    pub fn set(&self, micros: i64) {
        self.now.store(micros, Ordering::Release);
    }

    /// Move time forward (or backward, for negative values)
    pub fn advance(&self, micros: i64) -> i64 {
        self.now.fetch_add(micros, Ordering::AcqRel) + micros
    }
}

impl WallClock for ManualClock {
    fn now_micros(&self) -> i64 {
        self.now.load(Ordering::Acquire)
    }
}
