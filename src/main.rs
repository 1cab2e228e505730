// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use stepsync::midi::{print_destinations, MidiTriggerSink, MidirOutput};
use stepsync::sequencer::{LoggingSink, OutputSink, RecordingSink};
use stepsync::timing::{LinkSimulator, SystemClock, WallClock, STATUS_POLL_MICROS};
use stepsync::transport::MemoryBroker;
use stepsync::{Node, NodeConfig, NodeHandle};
use tracing::info;
use tracing_subscriber::EnvFilter;

const UI_ID: &str = "sequencer_ui";
const DEFAULT_DEMO_SECS: u64 = 8;

fn print_usage() {
    println!("STEPSYNC - Beat-synchronized step sequencer node");
    println!();
    println!("Usage: stepsync [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --list-midi             List available MIDI destinations (outputs)");
    println!("  --print-config          Print the default node configuration as YAML");
    println!("  --demo [SECS]           Run a sequencer and an editing node on an in-process broker");
    println!("  --config <PATH>         Load node configuration from a YAML file");
    println!("  --help                  Show this help message");
    println!();
    println!("Log verbosity follows RUST_LOG (default: info)");
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

fn output_sink(config: &NodeConfig) -> Result<Box<dyn OutputSink>> {
    match config.output.midi_port {
        Some(port) => {
            let output = MidirOutput::new(port)?;
            info!("Triggers go to MIDI output {}", output.port_name());
            Ok(Box::new(MidiTriggerSink::new(
                output,
                config.output.notes.clone(),
                config.output.velocity,
            )))
        }
        None => Ok(Box::new(LoggingSink)),
    }
}

fn start_node(
    broker: &MemoryBroker,
    config: &NodeConfig,
    node_id: &str,
    sink: Box<dyn OutputSink>,
    wall: Arc<dyn WallClock>,
) -> Result<NodeHandle> {
    let topics = [
        config.transport.state_topic.as_str(),
        config.transport.step_topic.as_str(),
    ];
    let (link, events) = broker.connect(node_id, &topics);
    let node = Node::new(config, Arc::new(link), events, sink, wall)?;
    Ok(node.spawn())
}

/// Four-on-the-floor with backbeat and offbeat hats
fn demo_pattern(steps: usize) -> Vec<(usize, usize)> {
    let mut cells = Vec::new();
    for step in 0..steps {
        if step % 4 == 0 {
            cells.push((0, step));
        }
        if step % 4 == 2 {
            cells.push((2, step));
        }
        if step % 8 == 4 {
            cells.push((1, step));
        }
    }
    cells
}

async fn run_demo(config: NodeConfig, secs: u64) -> Result<()> {
    let broker = MemoryBroker::new();
    let wall: Arc<dyn WallClock> = Arc::new(SystemClock);

    let sequencer_id = config.node_id();
    let sequencer = start_node(&broker, &config, &sequencer_id, output_sink(&config)?, Arc::clone(&wall))?;
    let ui_sink = RecordingSink::new();
    let ui = start_node(&broker, &config, UI_ID, Box::new(ui_sink.clone()), Arc::clone(&wall))?;

    let tracks = config.sequencer.tracks;
    for (track, step) in demo_pattern(config.sequencer.steps_per_pattern) {
        if track < tracks {
            ui.toggle_step(track, step)?;
        }
    }

    let link = LinkSimulator::new(wall.now_micros(), 120.0);
    let mut poll = tokio::time::interval(Duration::from_micros(STATUS_POLL_MICROS as u64));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(secs);

    println!("Running for {}s at {} BPM (Ctrl+C to stop early)", secs, link.bpm());
    loop {
        tokio::select! {
            _ = poll.tick() => {
                let status = link.status(wall.now_micros());
                sequencer.on_clock_update(status);
                ui.on_clock_update(status);
                if tokio::time::Instant::now() >= deadline {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    println!();
    println!("Grid on {}:", sequencer.node_id());
    for (track, row) in sequencer.grid().rows().iter().enumerate() {
        let cells: String = row.iter().map(|&on| if on { 'x' } else { '.' }).collect();
        println!("  {}: {}", track, cells);
    }
    println!("Cursor seen by {}: {:?}", ui.node_id(), ui.cursor());
    println!("{} step batches rendered locally by {}", ui_sink.fired().len(), ui.node_id());

    ui.shutdown().await?;
    sequencer.shutdown().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("STEPSYNC - Beat-synchronized step sequencer node");
        println!("Run with --help for usage information");
        return Ok(());
    }

    let mut config_path: Option<String> = None;
    let mut command: Option<(String, Option<String>)> = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                let path = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow!("--config requires a path"))?;
                config_path = Some(path.clone());
                i += 2;
            }
            "--demo" => {
                let secs = args.get(i + 1).filter(|a| !a.starts_with("--")).cloned();
                i += if secs.is_some() { 2 } else { 1 };
                command = Some(("--demo".to_string(), secs));
            }
            other => {
                command = Some((other.to_string(), None));
                i += 1;
            }
        }
    }

    let config = match &config_path {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };

    let Some((command, argument)) = command else {
        eprintln!("Error: no command given");
        print_usage();
        std::process::exit(1);
    };

    match command.as_str() {
        "--list-midi" => {
            print_destinations();
        }
        "--print-config" => {
            print!("{}", config.to_yaml()?);
        }
        "--demo" => {
            let secs = match argument {
                Some(value) => value
                    .parse()
                    .map_err(|_| anyhow!("Invalid duration: {}", value))?,
                None => DEFAULT_DEMO_SECS,
            };
            run_demo(config, secs).await?;
        }
        "--help" | "-h" => {
            print_usage();
        }
        _ => {
            eprintln!("Unknown option: {}", command);
            print_usage();
            std::process::exit(1);
        }
    }

    Ok(())
}
