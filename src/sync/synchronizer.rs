// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Grid state synchronization between nodes.
//!
//! Each node owns one authoritative copy of the step grid. Local edits
//! replace it and publish the whole grid as a retained message; remote
//! snapshots replace it wholesale (last writer wins, no per-cell merge).
//!
//! Connection state drives echo handling:
//!
//! ```text
//! Disconnected --connected--> AwaitingBootstrap --first snapshot--> Live
//!      ^                              |                              |
//!      +---------disconnected---------+------------------------------+
//! ```
//!
//! While awaiting bootstrap the next snapshot is adopted whoever sent it,
//! since the retained value on the channel is the last agreed grid even when
//! this node published it. Once live, snapshots carrying this node's own
//! identity are echoes and are dropped.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::messages::SyncMessage;
use crate::sequencer::{GridError, StepGrid};
use crate::transport::{Publication, QoS, TransportLink};

/// Connection-driven echo-suppression state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No broker connection; the local grid keeps being used
    Disconnected,
    /// Connected, waiting for the retained snapshot
    AwaitingBootstrap,
    /// Bootstrapped; own echoes are dropped
    Live,
}

/// What happened to an incoming snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOutcome {
    /// Adopted as the bootstrap snapshot
    Bootstrapped,
    /// Adopted from a peer
    Adopted,
    /// Dropped as an echo of this node's own publication
    Echo,
    /// Dropped because it could not be decoded or has the wrong shape
    Malformed,
    /// Dropped retained value older than the local edits just republished
    Superseded,
}

impl RemoteOutcome {
    /// Whether the local grid was replaced
    pub fn adopted(self) -> bool {
        matches!(self, RemoteOutcome::Bootstrapped | RemoteOutcome::Adopted)
    }
}

struct SyncInner {
    grid: Arc<StepGrid>,
    state: SyncState,
    /// A local edit could not be published and is newer than the channel
    unpublished: bool,
    /// The retained replay of this session predates our republish
    stale_retained: bool,
    /// A local edit was made while disconnected and must win over the
    /// retained replay of the next session
    local_ahead: bool,
}

/// Owner of the shared step grid
pub struct GridSynchronizer {
    node_id: String,
    topic: String,
    link: Arc<dyn TransportLink>,
    inner: Mutex<SyncInner>,
    changes: watch::Sender<Arc<StepGrid>>,
}

impl GridSynchronizer {
    /// Create a synchronizer owning `grid`, publishing on `topic`
    pub fn new(
        node_id: impl Into<String>,
        grid: StepGrid,
        link: Arc<dyn TransportLink>,
        topic: impl Into<String>,
    ) -> Self {
        let grid = Arc::new(grid);
        let (changes, _) = watch::channel(Arc::clone(&grid));
        Self {
            node_id: node_id.into(),
            topic: topic.into(),
            link,
            inner: Mutex::new(SyncInner {
                grid,
                state: SyncState::Disconnected,
                unpublished: false,
                stale_retained: false,
                local_ahead: false,
            }),
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SyncInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// This node's identity on the channel
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Read-only snapshot of the current grid
    pub fn snapshot(&self) -> Arc<StepGrid> {
        Arc::clone(&self.lock().grid)
    }

    /// Current echo-suppression state
    pub fn state(&self) -> SyncState {
        self.lock().state
    }

    /// Watch the grid for replacements (UI redraws)
    pub fn subscribe(&self) -> watch::Receiver<Arc<StepGrid>> {
        self.changes.subscribe()
    }

    /// Toggle one cell locally and publish the whole grid.
    ///
    /// Returns the new value of the cell.
    pub fn apply_local_edit(&self, track: usize, step: usize) -> Result<bool, GridError> {
        let (value, grid) = {
            let mut inner = self.lock();
            let mut grid = (*inner.grid).clone();
            let value = grid.toggle(track, step)?;
            let grid = Arc::new(grid);
            inner.grid = Arc::clone(&grid);
            match inner.state {
                SyncState::AwaitingBootstrap => {
                    // The queued retained replay is older than this edit
                    debug!("Local edit before bootstrap, going live");
                    inner.state = SyncState::Live;
                    inner.stale_retained = true;
                }
                SyncState::Disconnected => inner.local_ahead = true,
                SyncState::Live => {}
            }
            (value, grid)
        };
        self.changes.send_replace(Arc::clone(&grid));

        debug!("Local edit: track {} step {} -> {}", track, step, value);
        let published = self.publish(&grid);
        self.lock().unpublished = !published;
        Ok(value)
    }

    /// Broker acknowledged the connection
    pub fn on_connected(&self) {
        let pending = {
            let mut inner = self.lock();
            let local_ahead = std::mem::take(&mut inner.local_ahead);
            if inner.unpublished || local_ahead {
                // Local state is newer than whatever is retained
                inner.state = SyncState::Live;
                inner.stale_retained = true;
                inner.unpublished.then(|| Arc::clone(&inner.grid))
            } else {
                inner.state = SyncState::AwaitingBootstrap;
                inner.stale_retained = false;
                info!("Connected, awaiting retained grid snapshot");
                return;
            }
        };

        match pending {
            Some(grid) => {
                info!("Connected, republishing local edits made while offline");
                let published = self.publish(&grid);
                self.lock().unpublished = !published;
            }
            None => info!("Connected with local edits already published, going live"),
        }
    }

    /// Connection lost; keep running on the local grid
    pub fn on_disconnected(&self) {
        self.lock().state = SyncState::Disconnected;
        warn!("Transport disconnected, continuing with local grid");
    }

    /// Handle a delivery on the grid topic
    pub fn on_publication(&self, publication: &Publication) -> RemoteOutcome {
        if publication.retain && std::mem::take(&mut self.lock().stale_retained) {
            debug!("Dropping retained grid superseded by local edits");
            return RemoteOutcome::Superseded;
        }
        self.on_payload(&publication.payload)
    }

    /// Handle a raw payload from the grid topic
    pub fn on_payload(&self, payload: &[u8]) -> RemoteOutcome {
        match SyncMessage::decode(payload) {
            Ok(message) => self.on_remote_message(&message.sender_id, message.state),
            Err(e) => {
                warn!("Dropping grid message: {}", e);
                RemoteOutcome::Malformed
            }
        }
    }

    /// Handle a decoded grid snapshot from `sender_id`
    pub fn on_remote_message(&self, sender_id: &str, grid: StepGrid) -> RemoteOutcome {
        let (outcome, grid) = {
            let mut inner = self.lock();

            if let Err(e) = inner.grid.check_shape(&grid) {
                warn!("Dropping grid from {}: {}", sender_id, e);
                return RemoteOutcome::Malformed;
            }

            let outcome = match inner.state {
                SyncState::AwaitingBootstrap => {
                    inner.state = SyncState::Live;
                    RemoteOutcome::Bootstrapped
                }
                _ if sender_id == self.node_id => {
                    debug!("Dropping own echo");
                    return RemoteOutcome::Echo;
                }
                _ => RemoteOutcome::Adopted,
            };

            let grid = Arc::new(grid);
            inner.grid = Arc::clone(&grid);
            inner.unpublished = false;
            (outcome, grid)
        };

        debug!("{:?} grid from {}", outcome, sender_id);
        self.changes.send_replace(grid);
        outcome
    }

    fn publish(&self, grid: &StepGrid) -> bool {
        let payload = match SyncMessage::new(self.node_id.clone(), grid.clone()).encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode grid: {}", e);
                return false;
            }
        };
        match self.link.publish(&self.topic, payload, QoS::AtLeastOnce, true) {
            Ok(()) => true,
            Err(e) => {
                warn!("Grid publish failed: {}", e);
                false
            }
        }
    }
}

impl std::fmt::Debug for GridSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridSynchronizer")
            .field("node_id", &self.node_id)
            .field("topic", &self.topic)
            .field("state", &self.state())
            .finish()
    }
}
