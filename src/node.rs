// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Node runtime.
//!
//! Wires the clock model, latency calibrator, scheduler, dispatcher and grid
//! synchronizer together and runs them as two tasks:
//!
//! - the scheduling task polls the scheduler at a fixed interval and hands
//!   every step advance to the dispatcher with the current grid snapshot
//! - the transport task routes broker events to the synchronizer and the
//!   step cursor
//!
//! Everything the operator does (clock updates, edits, nudges) goes through
//! a `NodeHandle`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::sequencer::{GridError, OutputSink, StepGrid, StepScheduler, TriggerDispatcher};
use crate::sync::{GridSynchronizer, StepCursor, StepPublisher, SyncState};
use crate::timing::{ClockModel, ClockUpdate, LatencyCalibrator, WallClock};
use crate::transport::{TransportEvent, TransportLink};

/// A configured node, ready to be spawned
pub struct Node {
    node_id: String,
    state_topic: String,
    step_topic: String,
    poll_interval: Duration,
    save_on_shutdown: bool,
    wall: Arc<dyn WallClock>,
    clock: Arc<ClockModel>,
    latency: Arc<LatencyCalibrator>,
    sync: Arc<GridSynchronizer>,
    cursor: Arc<StepCursor>,
    scheduler: StepScheduler,
    dispatcher: TriggerDispatcher,
    events: UnboundedReceiver<TransportEvent>,
}

impl Node {
    /// Build a node on an established transport connection.
    ///
    /// The node publishes under the link's client id.
    pub fn new(
        config: &NodeConfig,
        link: Arc<dyn TransportLink>,
        events: UnboundedReceiver<TransportEvent>,
        sink: Box<dyn OutputSink>,
        wall: Arc<dyn WallClock>,
    ) -> Result<Self> {
        config.validate()?;
        let node_id = link.client_id().to_string();
        let timing = config.step_timing().context("Invalid sequencer timing")?;
        let grid = config.empty_grid().context("Invalid grid dimensions")?;

        let latency = match &config.latency.file {
            Some(path) => LatencyCalibrator::load(path, config.latency.default_micros),
            None => LatencyCalibrator::new(config.latency.default_micros),
        }
        .with_nudge_step(config.latency.nudge_step_micros);
        let latency = Arc::new(latency);

        let clock = Arc::new(ClockModel::new(wall.now_micros()));
        let scheduler = StepScheduler::new(Arc::clone(&clock), Arc::clone(&latency), timing);

        let sync = Arc::new(GridSynchronizer::new(
            node_id.clone(),
            grid,
            Arc::clone(&link),
            config.transport.state_topic.clone(),
        ));
        let publisher = StepPublisher::new(node_id.clone(), link, config.transport.step_topic.clone());
        let dispatcher = TriggerDispatcher::new(sink).with_publisher(publisher);

        info!(
            "Node {} ready: {} tracks x {} steps, latency {}us",
            node_id,
            config.sequencer.tracks,
            config.sequencer.steps_per_pattern,
            latency.current()
        );

        Ok(Self {
            node_id,
            state_topic: config.transport.state_topic.clone(),
            step_topic: config.transport.step_topic.clone(),
            poll_interval: Duration::from_millis(config.sequencer.poll_interval_ms),
            save_on_shutdown: config.latency.save_on_shutdown,
            wall,
            clock,
            latency,
            sync,
            cursor: Arc::new(StepCursor::new()),
            scheduler,
            dispatcher,
            events,
        })
    }

    /// Start the scheduling and transport tasks on the current runtime
    pub fn spawn(self) -> NodeHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);

        let scheduling = tokio::spawn(run_scheduler(
            self.scheduler,
            self.dispatcher,
            Arc::clone(&self.sync),
            Arc::clone(&self.wall),
            self.poll_interval,
            shutdown_rx.clone(),
        ));

        let routing = tokio::spawn(run_transport(
            self.events,
            EventRoutes {
                state_topic: self.state_topic,
                step_topic: self.step_topic,
                sync: Arc::clone(&self.sync),
                cursor: Arc::clone(&self.cursor),
            },
            shutdown_rx,
        ));

        NodeHandle {
            node_id: self.node_id,
            save_on_shutdown: self.save_on_shutdown,
            wall: self.wall,
            clock: self.clock,
            latency: self.latency,
            sync: self.sync,
            cursor: self.cursor,
            shutdown,
            tasks: vec![scheduling, routing],
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.node_id)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

async fn run_scheduler(
    mut scheduler: StepScheduler,
    mut dispatcher: TriggerDispatcher,
    sync: Arc<GridSynchronizer>,
    wall: Arc<dyn WallClock>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Some(advance) = scheduler.tick_at(wall.now_micros()) {
                    let grid = sync.snapshot();
                    dispatcher.on_step_advance(advance.step, &grid);
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    debug!("Scheduler stopped");
}

struct EventRoutes {
    state_topic: String,
    step_topic: String,
    sync: Arc<GridSynchronizer>,
    cursor: Arc<StepCursor>,
}

async fn run_transport(
    mut events: UnboundedReceiver<TransportEvent>,
    routes: EventRoutes,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(TransportEvent::Connected) => routes.sync.on_connected(),
                Some(TransportEvent::Disconnected) => routes.sync.on_disconnected(),
                Some(TransportEvent::Message(publication)) => {
                    if publication.topic == routes.state_topic {
                        routes.sync.on_publication(&publication);
                    } else if publication.topic == routes.step_topic {
                        routes.cursor.on_payload(&publication.payload);
                    } else {
                        debug!("Ignoring message on {}", publication.topic);
                    }
                }
                None => {
                    warn!("Transport event channel closed");
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }
    debug!("Transport router stopped");
}

/// Control surface of a running node
pub struct NodeHandle {
    node_id: String,
    save_on_shutdown: bool,
    wall: Arc<dyn WallClock>,
    clock: Arc<ClockModel>,
    latency: Arc<LatencyCalibrator>,
    sync: Arc<GridSynchronizer>,
    cursor: Arc<StepCursor>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Feed a tempo or phase observation from the clock source.
    ///
    /// Returns whether the clock reference changed.
    pub fn on_clock_update(&self, update: ClockUpdate) -> bool {
        self.clock.apply(update, self.wall.now_micros())
    }

    /// Shared clock model
    pub fn clock(&self) -> &Arc<ClockModel> {
        &self.clock
    }

    /// Toggle one cell and broadcast the grid
    pub fn toggle_step(&self, track: usize, step: usize) -> Result<bool, GridError> {
        self.sync.apply_local_edit(track, step)
    }

    /// Current grid snapshot
    pub fn grid(&self) -> Arc<StepGrid> {
        self.sync.snapshot()
    }

    /// Watch for grid replacements
    pub fn subscribe_grid(&self) -> watch::Receiver<Arc<StepGrid>> {
        self.sync.subscribe()
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync.state()
    }

    /// Last step announced on the channel
    pub fn cursor(&self) -> Option<usize> {
        self.cursor.current()
    }

    pub fn latency_micros(&self) -> i64 {
        self.latency.current()
    }

    /// Raise the latency offset by one nudge step so triggers fire earlier
    pub fn nudge_latency_up(&self) -> i64 {
        self.latency.nudge_up()
    }

    /// Lower the latency offset by one nudge step so triggers fire later
    pub fn nudge_latency_down(&self) -> i64 {
        self.latency.nudge_down()
    }

    /// Persist the current latency calibration
    pub fn save_latency(&self) -> Result<()> {
        self.latency
            .save()
            .context("Failed to save latency calibration")
    }

    /// Stop both tasks and wait for them to finish
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Node task ended abnormally: {}", e);
            }
        }
        if self.save_on_shutdown {
            self.latency
                .save()
                .context("Failed to save latency calibration")?;
        }
        info!("Node {} stopped", self.node_id);
        Ok(())
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("node_id", &self.node_id)
            .field("sync", &self.sync.state())
            .finish_non_exhaustive()
    }
}
