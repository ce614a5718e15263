// =============================================================================
// FCEUX bridge CLI
// =============================================================================
// Build & Run:
//   cargo build --release
//   cargo run --release -- baseline --rom MM2.nes --lua connector_screen_v2.lua --game mm2-boss
//   cargo run --release -- explore  --rom MM2.nes --lua connector_screen_v2.lua --block 6
//   cargo run --release -- dump-config --config bridge.json

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::Rng;

use fceux_bridge::{Action, BridgeConfig, ColorMode, FceuxEnv, GameKind, RamPage};

// =============================================================================
// Section 1: Random Baseline
// =============================================================================

fn baseline(args: &BaselineArgs) -> Result<()> {
    let config = args.common.load()?;
    eprintln!("Running random agent baseline on {}...", config.game.env_id());

    let mut env = FceuxEnv::launch(&config).context("Failed to start environment")?;
    let mut rng = rand::rng();
    let mut rewards = Vec::new();

    for ep in 0..args.episodes {
        let obs = env.reset()?;
        if obs.is_none() {
            eprintln!("  (no initial observation; emulator may be lagging)");
        }
        let mut missing_frames = 0u64;

        loop {
            let action = Action::from_index(rng.random_range(0..Action::COUNT))?;
            let result = env.step(action)?;
            if result.observation.is_none() {
                missing_frames += 1;
            }
            if result.done == Some(true) || env.steps() >= args.max_steps {
                break;
            }
        }

        eprintln!(
            "Random ep {}: reward={:.1}, steps={}, missing_frames={missing_frames}",
            ep + 1,
            env.total_reward(),
            env.steps(),
        );
        rewards.push(env.total_reward());
    }

    if rewards.is_empty() {
        return Ok(());
    }
    let mean = rewards.iter().sum::<f64>() / rewards.len() as f64;
    let max = rewards.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    eprintln!("\nBaseline: mean={mean:.1}, max={max:.1}");
    Ok(())
}

// =============================================================================
// Section 2: RAM Explorer
// =============================================================================

fn explore(args: &ExploreArgs) -> Result<()> {
    let config = args.common.load()?;
    let base = (args.block % 8) as usize * 256;
    eprintln!("═══════════════════════════════════════════════════════════");
    eprintln!("  RAM EXPLORER: 0x{:04X}..0x{:04X}", base, base + 255);
    eprintln!("═══════════════════════════════════════════════════════════");

    let mut env = FceuxEnv::launch(&config).context("Failed to start environment")?;
    env.reset()?;

    let mut prev: Option<RamPage> = None;
    let mut change_counts = [0u32; 256];
    let mut samples = 0u32;

    for i in 0..args.samples {
        env.control().advance_frame(args.every)?;
        let Some(page) = env.get_ram(args.block)? else {
            eprintln!("[{i:>4}] no RAM page this tick");
            continue;
        };
        samples += 1;
        if let Some(prev_page) = &prev {
            let changed = prev_page.diff(&page);
            for &offset in &changed {
                change_counts[offset as usize] += 1;
            }
            if !changed.is_empty() {
                let listed: Vec<String> = changed
                    .iter()
                    .map(|&o| {
                        format!(
                            "{:04X}:{:02x}->{:02x}",
                            base + o as usize,
                            prev_page.get(o),
                            page.get(o)
                        )
                    })
                    .collect();
                eprintln!("[{i:>4}] {}", listed.join(" "));
            }
        }
        if args.dump {
            eprintln!("{}", page.hex_dump());
        }
        prev = Some(page);
    }

    // Offsets that changed on every comparison are usually timers or counters.
    let comparisons = samples.saturating_sub(1);
    let mut ranked: Vec<(usize, u32)> = change_counts
        .iter()
        .copied()
        .enumerate()
        .filter(|&(_, n)| n > 0)
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    eprintln!("\nMost volatile addresses ({comparisons} comparisons):");
    for (offset, n) in ranked.iter().take(args.top) {
        let tag = if *n == comparisons { " (every sample)" } else { "" };
        eprintln!("  0x{:04X}: {n}{tag}", base + offset);
    }
    Ok(())
}

// =============================================================================
// Section 3: CLI
// =============================================================================

#[derive(Parser)]
#[command(name = "fceux-bridge", about = "FCEUX emulator bridge for RL control loops")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run random agent baseline
    Baseline(BaselineArgs),
    /// Watch a RAM page change as the game runs
    Explore(ExploreArgs),
    /// Print the effective configuration as JSON
    DumpConfig(DumpConfigArgs),
}

#[derive(Args)]
struct CommonArgs {
    /// JSON config file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    game: Option<String>,
    #[arg(long)]
    rom: Option<PathBuf>,
    #[arg(long)]
    lua: Option<PathBuf>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    color_mode: Option<String>,
    #[arg(long)]
    save_slot: Option<u8>,
    /// Connect to an already running emulator instead of spawning one
    #[arg(long, default_value_t = false)]
    no_launch: bool,
}

impl CommonArgs {
    fn load(&self) -> Result<BridgeConfig> {
        let config = self.unvalidated()?;
        config.validate()?;
        Ok(config)
    }

    fn unvalidated(&self) -> Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))?,
            None => BridgeConfig::default(),
        };
        if let Some(game) = &self.game {
            config.game = game.parse::<GameKind>()?;
        }
        if let Some(rom) = &self.rom {
            config.emulator.rom_path = Some(rom.clone());
        }
        if let Some(lua) = &self.lua {
            config.emulator.lua_path = lua.clone();
        }
        if let Some(host) = &self.host {
            config.endpoint.host = host.clone();
        }
        if let Some(mode) = &self.color_mode {
            config.protocol.color_mode = mode.parse::<ColorMode>()?;
        }
        if let Some(slot) = self.save_slot {
            // The emulator boots from the same slot episodes reload.
            config.episode.save_slot = slot;
            if config.emulator.load_state.is_some() {
                config.emulator.load_state = Some(slot);
            }
        }
        if self.no_launch {
            config.emulator.launch = false;
        }
        Ok(config)
    }
}

#[derive(Args)]
struct BaselineArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(long, default_value = "10")]
    episodes: usize,
    #[arg(long, default_value = "10000")]
    max_steps: u64,
}

#[derive(Args)]
struct ExploreArgs {
    #[command(flatten)]
    common: CommonArgs,
    #[arg(long, default_value = "6")]
    block: u8,
    /// Frames to advance between samples
    #[arg(long, default_value = "30")]
    every: u32,
    #[arg(long, default_value = "100")]
    samples: usize,
    #[arg(long, default_value = "16")]
    top: usize,
    #[arg(long, default_value_t = false)]
    dump: bool,
}

#[derive(Args)]
struct DumpConfigArgs {
    #[command(flatten)]
    common: CommonArgs,
}

// =============================================================================
// Main
// =============================================================================

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Baseline(args) => baseline(args),
        Commands::Explore(args) => explore(args),
        Commands::DumpConfig(args) => {
            let config = args.common.unvalidated()?;
            println!("{}", config.to_json_pretty()?);
            Ok(())
        }
    }
}
