//! Recap command - set up ghosts and print how long each run takes

use anyhow::{Context, Result};
use clap::Args;
use demoghost_core::demo::PoseSample;
use demoghost_core::host::{GhostAppearance, MapList, RenderHandle};
use demoghost_core::{DemoGhostPlayer, GhostConfig, GhostId, RenderTarget};

use crate::info::tick_interval;

/// Arguments for the recap command
#[derive(Args)]
pub struct RecapArgs {
    /// Demo names or paths, one ghost each
    #[arg(required = true)]
    pub demos: Vec<String>,

    /// Treat each demo as the first of a numbered sequence (`run`, `run_2`, ...)
    #[arg(long)]
    pub full_game: bool,

    /// Start numbered sequences at `<demo>_<N>`
    #[arg(long, requires = "full_game")]
    pub first_index: Option<u32>,

    /// Simulation tick rate used to turn ticks into time
    #[arg(long, default_value = "60")]
    pub tick_rate: u32,
}

/// Render target for commands that never draw
pub(crate) struct NullRender;

impl RenderTarget for NullRender {
    fn acquire(&mut self, _id: GhostId, _appearance: &GhostAppearance) -> Option<RenderHandle> {
        None
    }

    fn draw(&mut self, _handle: RenderHandle, _pose: &PoseSample) {}

    fn release(&mut self, _handle: RenderHandle) {}
}

/// Execute the recap command
pub fn execute(args: RecapArgs, config: &GhostConfig) -> Result<()> {
    for line in recap_lines(&args, config)? {
        println!("{}", line);
    }
    Ok(())
}

fn recap_lines(args: &RecapArgs, config: &GhostConfig) -> Result<Vec<String>> {
    let interval = tick_interval(args.tick_rate)?;
    let resolver = config.resolver();
    let menu = MapList::default();
    let mut player = DemoGhostPlayer::new(NullRender, config);

    for (id, demo) in args.demos.iter().enumerate() {
        let id = id as GhostId;
        let result = if args.full_game {
            player.setup_from_sequence(demo, args.first_index, id, &resolver, &menu)
        } else {
            player.setup_from_demo(demo, id, &resolver, &menu)
        };
        result.with_context(|| format!("Failed to set up ghost from {}", demo))?;
    }

    let mut lines = vec!["Recap of all ghosts:".to_string()];
    lines.extend(player.recap(interval).iter().map(ToString::to_string));
    Ok(lines)
}
