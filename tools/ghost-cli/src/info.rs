//! Info command - print a demo's header, length and events

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use demoghost_core::config::demo_file_name;
use demoghost_core::demo::read_header;
use demoghost_core::time::{format_time, ticks_to_duration};
use demoghost_core::{DemoParser, FileResolver, GhostConfig};

/// Arguments for the info command
#[derive(Args)]
pub struct InfoArgs {
    /// Demo name or path (the configured extension is optional)
    pub demo: String,

    /// List the demo's custom events
    #[arg(long)]
    pub events: bool,

    /// Simulation tick rate used to turn ticks into time
    #[arg(long, default_value = "60")]
    pub tick_rate: u32,
}

/// Execute the info command
pub fn execute(args: InfoArgs, config: &GhostConfig) -> Result<()> {
    let path = locate_demo(&args.demo, config);
    let interval = tick_interval(args.tick_rate)?;

    let file = File::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
    let header = read_header(&mut BufReader::new(file))
        .with_context(|| format!("Failed to read header of {}", path.display()))?;

    let parser = DemoParser::new().with_events(args.events);
    let mut record = parser
        .parse_file(&path)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    parser.adjust(&mut record);

    println!("Demo:      {}", path.display());
    println!("Client:    {}", record.client_name());
    println!("Map:       {}", record.map_name());
    println!("Game dir:  {}", record.game_directory());
    println!(
        "Protocol:  {} (network {})",
        header.demo_protocol, header.network_protocol
    );
    println!("Ticks:     {}", record.playback_ticks());
    println!(
        "Time:      {}",
        format_time(ticks_to_duration(interval, u64::from(record.playback_ticks())))
    );

    if args.events {
        println!("Events:    {}", record.events().len());
        for event in record.events() {
            println!("  [{:>6}] {}", event.tick, event);
        }
    }

    Ok(())
}

/// Resolve a demo name against the configured search paths
pub(crate) fn locate_demo(name: &str, config: &GhostConfig) -> PathBuf {
    config
        .resolver()
        .resolve(&demo_file_name(name, &config.demo_extension))
}

pub(crate) fn tick_interval(tick_rate: u32) -> Result<Duration> {
    anyhow::ensure!(tick_rate > 0, "Tick rate must be positive");
    Ok(Duration::from_nanos(
        1_000_000_000u64.div_ceil(u64::from(tick_rate)),
    ))
}
