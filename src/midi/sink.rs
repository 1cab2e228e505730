// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Output sink that plays triggers as MIDI notes.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{messages, MidiOutput};
use crate::sequencer::{OutputSink, TrackId};

/// Note played for one track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiNote {
    /// MIDI channel (0-15)
    pub channel: u8,
    /// Note number (0-127)
    pub note: u8,
}

impl MidiNote {
    pub const fn new(channel: u8, note: u8) -> Self {
        Self { channel, note }
    }

    /// Note On bytes at `velocity`
    pub fn note_on(&self, velocity: u8) -> [u8; 3] {
        [
            messages::NOTE_ON | (self.channel & 0x0F),
            self.note & 0x7F,
            velocity & 0x7F,
        ]
    }
}

/// Default drum map: kick, snare, closed hat, ride
pub fn default_drum_map() -> Vec<MidiNote> {
    vec![
        MidiNote::new(10, 36),
        MidiNote::new(10, 38),
        MidiNote::new(10, 42),
        MidiNote::new(10, 51),
    ]
}

/// Default trigger velocity
pub const DEFAULT_VELOCITY: u8 = 64;

/// Sends a Note On per fired track
pub struct MidiTriggerSink<O: MidiOutput> {
    output: O,
    notes: Vec<MidiNote>,
    velocity: u8,
}

impl<O: MidiOutput> MidiTriggerSink<O> {
    pub fn new(output: O, notes: Vec<MidiNote>, velocity: u8) -> Self {
        Self {
            output,
            notes,
            velocity,
        }
    }

    /// The underlying output
    pub fn output(&self) -> &O {
        &self.output
    }
}

impl<O: MidiOutput> OutputSink for MidiTriggerSink<O> {
    fn fire(&mut self, tracks: &[TrackId]) -> Result<()> {
        for &track in tracks {
            match self.notes.get(track) {
                Some(note) => self.output.send(&note.note_on(self.velocity))?,
                None => warn!("No MIDI note mapped for track {}", track),
            }
        }
        Ok(())
    }
}
