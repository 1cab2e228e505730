// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Performance benchmarks for STEPSYNC
//!
//! Run with: cargo bench
//!
//! These benchmarks measure:
//! - Scheduler tick cost (runs every poll interval)
//! - Trigger selection for one step
//! - Grid message encode/decode on the sync channel

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use stepsync::sequencer::{StepGrid, StepScheduler, StepTiming};
use stepsync::sync::SyncMessage;
use stepsync::timing::{ClockModel, LatencyCalibrator};

fn busy_grid(tracks: usize, steps: usize) -> StepGrid {
    let mut grid = StepGrid::new(tracks, steps).unwrap();
    for track in 0..tracks {
        for step in (track % 3..steps).step_by(3) {
            grid.set(track, step, true).unwrap();
        }
    }
    grid
}

/// Benchmark one scheduler evaluation (core timing operation)
fn bench_scheduler_tick(c: &mut Criterion) {
    let clock = Arc::new(ClockModel::new(0));
    let latency = Arc::new(LatencyCalibrator::default());
    let mut scheduler = StepScheduler::new(clock, latency, StepTiming::default());
    let mut now = 0i64;

    c.bench_function("scheduler_tick", |b| {
        b.iter(|| {
            now += 10_000;
            black_box(scheduler.tick_at(black_box(now)))
        })
    });
}

/// Benchmark selecting the tracks to fire on a step
fn bench_active_tracks(c: &mut Criterion) {
    let mut group = c.benchmark_group("active_tracks");

    for tracks in [4usize, 16, 64].iter() {
        let grid = busy_grid(*tracks, 16);
        group.bench_with_input(BenchmarkId::from_parameter(tracks), tracks, |b, _| {
            b.iter(|| black_box(grid.active_tracks(black_box(6))))
        });
    }

    group.finish();
}

/// Benchmark grid snapshot encoding and decoding
fn bench_sync_message(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync_message");

    for steps in [8usize, 32, 128].iter() {
        let message = SyncMessage::new("live_sequencer", busy_grid(8, *steps));
        let encoded = message.encode().unwrap();

        group.bench_with_input(BenchmarkId::new("encode", steps), steps, |b, _| {
            b.iter(|| black_box(message.encode().unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("decode", steps), steps, |b, _| {
            b.iter(|| black_box(SyncMessage::decode(black_box(&encoded)).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_scheduler_tick, bench_active_tracks, bench_sync_message);
criterion_main!(benches);
