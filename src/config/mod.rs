// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Configuration system for a sync node.
//!
//! A node is described by one YAML document. Every field has a default so
//! an empty file (or no file at all) yields a working node.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::midi::{default_drum_map, MidiNote, DEFAULT_VELOCITY};
use crate::sequencer::{GridError, StepGrid, StepTiming};
use crate::sync::{DEFAULT_STATE_TOPIC, DEFAULT_STEP_TOPIC};
use crate::timing::{DEFAULT_LATENCY_MICROS, DEFAULT_NUDGE_STEP_MICROS};

/// Root configuration for a node
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    /// Node identity
    #[serde(default)]
    pub node: NodeSection,
    /// Grid dimensions and polling
    #[serde(default)]
    pub sequencer: SequencerConfig,
    /// Output latency compensation
    #[serde(default)]
    pub latency: LatencyConfig,
    /// Pub/sub topics
    #[serde(default)]
    pub transport: TransportConfig,
    /// Trigger output
    #[serde(default)]
    pub output: OutputConfig,
}

impl NodeConfig {
    /// Load a node configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_yaml(&contents)
    }

    /// Parse a node configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("Failed to parse YAML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize configuration to YAML")
    }

    /// Reject configurations that cannot produce a working node
    pub fn validate(&self) -> Result<()> {
        self.step_timing().context("Invalid sequencer timing")?;
        self.empty_grid().context("Invalid grid dimensions")?;
        if self.sequencer.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be at least 1");
        }
        if self.output.notes.len() < self.sequencer.tracks {
            bail!(
                "{} tracks configured but only {} MIDI notes mapped",
                self.sequencer.tracks,
                self.output.notes.len()
            );
        }
        Ok(())
    }

    /// Identity to publish under: configured or freshly generated
    pub fn node_id(&self) -> String {
        self.node
            .id
            .clone()
            .unwrap_or_else(|| format!("node-{:06x}", rand::thread_rng().gen_range(0..0x100_0000u32)))
    }

    /// Step resolution from the sequencer section
    pub fn step_timing(&self) -> Result<StepTiming, GridError> {
        StepTiming::new(self.sequencer.steps_per_beat, self.sequencer.steps_per_pattern)
    }

    /// An all-inactive grid with the configured dimensions
    pub fn empty_grid(&self) -> Result<StepGrid, GridError> {
        StepGrid::new(self.sequencer.tracks, self.sequencer.steps_per_pattern)
    }
}

/// Node identity section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeSection {
    /// Sender identity on the channel; generated when absent
    #[serde(default)]
    pub id: Option<String>,
}

/// Sequencer dimensions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SequencerConfig {
    /// Number of tracks
    #[serde(default = "default_tracks")]
    pub tracks: usize,
    /// Steps per pattern
    #[serde(default = "default_steps_per_pattern")]
    pub steps_per_pattern: usize,
    /// Steps per beat
    #[serde(default = "default_steps_per_beat")]
    pub steps_per_beat: u32,
    /// Scheduler polling interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_tracks() -> usize {
    4
}
fn default_steps_per_pattern() -> usize {
    8
}
fn default_steps_per_beat() -> u32 {
    4
}
fn default_poll_interval_ms() -> u64 {
    10
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            tracks: default_tracks(),
            steps_per_pattern: default_steps_per_pattern(),
            steps_per_beat: default_steps_per_beat(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Latency compensation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LatencyConfig {
    /// Offset used when no calibration file is readable
    #[serde(default = "default_latency_micros")]
    pub default_micros: i64,
    /// Operator nudge granularity
    #[serde(default = "default_nudge_step_micros")]
    pub nudge_step_micros: i64,
    /// Persisted calibration file
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Write the calibration back when the node stops
    #[serde(default)]
    pub save_on_shutdown: bool,
}

fn default_latency_micros() -> i64 {
    DEFAULT_LATENCY_MICROS
}
fn default_nudge_step_micros() -> i64 {
    DEFAULT_NUDGE_STEP_MICROS
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            default_micros: default_latency_micros(),
            nudge_step_micros: default_nudge_step_micros(),
            file: None,
            save_on_shutdown: false,
        }
    }
}

/// Pub/sub topics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransportConfig {
    /// Retained topic for the grid
    #[serde(default = "default_state_topic")]
    pub state_topic: String,
    /// Best-effort topic for step advances
    #[serde(default = "default_step_topic")]
    pub step_topic: String,
}

fn default_state_topic() -> String {
    DEFAULT_STATE_TOPIC.to_string()
}
fn default_step_topic() -> String {
    DEFAULT_STEP_TOPIC.to_string()
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            state_topic: default_state_topic(),
            step_topic: default_step_topic(),
        }
    }
}

/// Trigger output settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// MIDI output port index; triggers are only logged when absent
    #[serde(default)]
    pub midi_port: Option<usize>,
    /// Note On velocity
    #[serde(default = "default_velocity")]
    pub velocity: u8,
    /// Note per track, in track order
    #[serde(default = "default_drum_map")]
    pub notes: Vec<MidiNote>,
}

fn default_velocity() -> u8 {
    DEFAULT_VELOCITY
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            midi_port: None,
            velocity: default_velocity(),
            notes: default_drum_map(),
        }
    }
}
