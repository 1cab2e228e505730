// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! MIDI output abstraction layer.
//!
//! This module provides a trait-based abstraction for MIDI output, a midir
//! backend, and the trigger sink that maps grid tracks onto notes.

pub mod midir_backend;
pub mod sink;

use anyhow::Result;

pub use midir_backend::{list_destinations, print_destinations, MidirOutput};
pub use sink::{default_drum_map, MidiNote, MidiTriggerSink, DEFAULT_VELOCITY};

/// A device that accepts raw MIDI bytes.
///
/// Sends are immediate; the scheduler applies latency compensation.
pub trait MidiOutput: Send {
    /// Send a MIDI message immediately.
    ///
    /// # Arguments
    /// * `message` - Raw MIDI bytes (e.g., `[0x90, 60, 127]` for Note On)
    fn send(&mut self, message: &[u8]) -> Result<()>;
}

/// MIDI message constants
pub mod messages {
    // Status byte upper nibble; the lower nibble is the channel (0-15)
    pub const NOTE_ON: u8 = 0x90;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Mock MIDI output for testing
    pub(crate) struct MockMidiOutput {
        messages: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl MockMidiOutput {
        pub(crate) fn new() -> Self {
            Self {
                messages: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub(crate) fn get_messages(&self) -> Vec<Vec<u8>> {
            self.messages.lock().unwrap().clone()
        }
    }

    impl MidiOutput for MockMidiOutput {
        fn send(&mut self, message: &[u8]) -> Result<()> {
            self.messages.lock().unwrap().push(message.to_vec());
            Ok(())
        }
    }
}
