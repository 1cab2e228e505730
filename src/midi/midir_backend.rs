// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! midir backend.
//!
//! Cross-platform implementation of the `MidiOutput` trait on top of midir
//! (ALSA, Core MIDI, WinMM).

use anyhow::{anyhow, Result};
use midir::{MidiOutput as MidirClient, MidiOutputConnection};
use tracing::info;

use super::MidiOutput;

const CLIENT_NAME: &str = "stepsync";

/// Output connection to one MIDI port
pub struct MidirOutput {
    connection: MidiOutputConnection,
    port_name: String,
}

impl MidirOutput {
    /// Connect to the output port at `port_index`
    pub fn new(port_index: usize) -> Result<Self> {
        let client = MidirClient::new(CLIENT_NAME)
            .map_err(|e| anyhow!("Failed to create MIDI client: {}", e))?;

        let ports = client.ports();
        let port = ports.get(port_index).ok_or_else(|| {
            anyhow!(
                "MIDI output {} not found (only {} available)",
                port_index,
                ports.len()
            )
        })?;
        let port_name = client
            .port_name(port)
            .unwrap_or_else(|_| format!("port {}", port_index));

        let connection = client
            .connect(port, "stepsync-out")
            .map_err(|e| anyhow!("Failed to connect to MIDI output {}: {}", port_name, e))?;

        info!("Connected to MIDI out \"{}\"", port_name);
        Ok(Self {
            connection,
            port_name,
        })
    }

    /// Name of the connected port
    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl MidiOutput for MidirOutput {
    fn send(&mut self, message: &[u8]) -> Result<()> {
        self.connection
            .send(message)
            .map_err(|e| anyhow!("MIDI send to {} failed: {}", self.port_name, e))
    }
}

/// Names of the available MIDI output ports
pub fn list_destinations() -> Result<Vec<String>> {
    let client = MidirClient::new(CLIENT_NAME)
        .map_err(|e| anyhow!("Failed to create MIDI client: {}", e))?;
    Ok(client
        .ports()
        .iter()
        .enumerate()
        .map(|(i, port)| {
            client
                .port_name(port)
                .unwrap_or_else(|_| format!("<unnamed {}>", i))
        })
        .collect())
}

/// Print available MIDI outputs
pub fn print_destinations() {
    match list_destinations() {
        Ok(names) if names.is_empty() => println!("No MIDI outputs found"),
        Ok(names) => {
            println!("MIDI outputs:");
            for (i, name) in names.iter().enumerate() {
                println!("  {}: {}", i, name);
            }
        }
        Err(e) => eprintln!("Error: {:#}", e),
    }
}
